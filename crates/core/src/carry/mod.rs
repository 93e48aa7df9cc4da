use crate::FramePlan;

/// Running sample budget owed to (positive) or borrowed from (negative) the
/// input stream.
///
/// The register absorbs the fractional part of `samples_per_frame` and the
/// ±1 sample parity corrections that keep stereo reads aligned on whole
/// channel-groups. Whenever it reaches a full channel-group in either
/// direction, the last exec of the frame reads one group more or less. Over
/// any number of frames the samples consumed stay within one channel-group of
/// `frames * samples_per_frame`.
///
/// The state is a plain value: each step takes it by value and hands back
/// the next one, so the drift logic can be driven without any I/O.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CarryState {
    accumulated_fraction: f64,
}

impl CarryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulated_fraction(&self) -> f64 {
        self.accumulated_fraction
    }

    /// Computes the length of exec `read_idx` within the current frame and
    /// the carry that follows it.
    pub fn exec_len(self, plan: &FramePlan, read_idx: usize) -> (Self, usize) {
        let group = plan.channels;
        let mut fraction = self.accumulated_fraction;
        let mut read_len = plan.base_exec_len(read_idx);

        // Odd stereo reads would split a channel-group. Alternate the
        // direction of the fix and book it against the carry.
        if group == 2 && read_len % 2 == 1 {
            if read_idx % 2 == 0 {
                read_len -= 1;
                fraction += 1.0;
            } else {
                read_len += 1;
                fraction -= 1.0;
            }
        }

        if plan.is_last_exec(read_idx) {
            fraction += plan.sample_fraction_per_frame;
            if fraction >= group as f64 {
                read_len += group;
                fraction -= group as f64;
            } else if fraction < -(group as f64) && read_len > group {
                read_len -= group;
                fraction += group as f64;
            }
        }

        (
            Self {
                accumulated_fraction: fraction,
            },
            read_len,
        )
    }

    /// Exec lengths for one whole frame, plus the carry for the next frame.
    pub fn plan_frame(self, plan: &FramePlan) -> (Self, Vec<usize>) {
        let mut lengths = Vec::with_capacity(plan.execs_per_frame);
        let carry = self.plan_frame_into(plan, &mut lengths);
        (carry, lengths)
    }

    /// Same as [`CarryState::plan_frame`], reusing `lengths`.
    pub fn plan_frame_into(self, plan: &FramePlan, lengths: &mut Vec<usize>) -> Self {
        lengths.clear();
        let mut carry = self;
        for read_idx in 0..plan.execs_per_frame {
            let (next, read_len) = carry.exec_len(plan, read_idx);
            lengths.push(read_len);
            carry = next;
        }
        carry
    }
}
