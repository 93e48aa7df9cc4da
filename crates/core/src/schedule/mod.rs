use crate::StreamConfig;

/// Fixed per-frame exec layout derived once from a [`StreamConfig`].
///
/// A frame of `samples_per_frame` interleaved samples is split into
/// `execs_per_frame` transform calls of `samples_per_exec` samples. The first
/// `samples_remainder` execs take one extra sample so that the frame covers
/// `floor(samples_per_frame)` samples before carry adjustments; the fractional
/// part is left to [`CarryState`](crate::CarryState).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePlan {
    pub channels: usize,
    pub samples_per_frame: f64,
    pub execs_per_frame: usize,
    pub samples_per_exec: usize,
    pub samples_remainder: usize,
    pub sample_fraction_per_frame: f64,
    /// Length every exec buffer is allocated with. Covers the nominal exec
    /// capacity plus the parity and carry adjustments.
    pub buffer_len: usize,
}

impl FramePlan {
    /// Derives the plan. Expects a validated config.
    pub fn new(config: &StreamConfig) -> Self {
        let channels = config.channels;
        let samples_per_frame = config.samples_per_frame();
        let capacity = config.exec_capacity as f64;

        // `+ channels` keeps a channel-group of slack under the capacity.
        let execs_per_frame = (((samples_per_frame + channels as f64) / capacity).ceil() as usize).max(1);
        let samples_per_exec = (samples_per_frame / execs_per_frame as f64).floor() as usize;
        let whole_samples = samples_per_frame.floor() as usize;
        let samples_remainder =
            whole_samples.saturating_sub(execs_per_frame.saturating_mul(samples_per_exec));
        let sample_fraction_per_frame = samples_per_frame - samples_per_frame.floor();

        let buffer_len = config.exec_capacity.max(samples_per_exec.saturating_add(2 + channels));

        let plan = Self {
            channels,
            samples_per_frame,
            execs_per_frame,
            samples_per_exec,
            samples_remainder,
            sample_fraction_per_frame,
            buffer_len,
        };

        tracing::debug!(
            samples_per_frame,
            execs_per_frame,
            samples_per_exec,
            samples_remainder,
            sample_fraction_per_frame,
            buffer_len,
            "derived frame plan"
        );

        plan
    }

    /// Exec length before parity and carry adjustments.
    pub fn base_exec_len(&self, read_idx: usize) -> usize {
        if read_idx < self.samples_remainder {
            self.samples_per_exec + 1
        } else {
            self.samples_per_exec
        }
    }

    pub fn is_last_exec(&self, read_idx: usize) -> bool {
        read_idx + 1 == self.execs_per_frame
    }

    /// True when a frame covers less than one channel-group, so some frames
    /// read nothing and repeat the previous result.
    pub fn is_oversampled(&self) -> bool {
        self.samples_per_frame < self.channels as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(sample_rate: u32, channels: usize, framerate: f64, capacity: usize) -> FramePlan {
        FramePlan::new(&StreamConfig::new(sample_rate, channels, framerate, capacity))
    }

    #[test]
    fn integer_frames_fit_in_one_exec() {
        let p = plan(44_100, 2, 25.0, 4096);
        assert_eq!(p.samples_per_frame, 3528.0);
        assert_eq!(p.execs_per_frame, 1);
        assert_eq!(p.samples_per_exec, 3528);
        assert_eq!(p.samples_remainder, 0);
        assert_eq!(p.sample_fraction_per_frame, 0.0);

        let p = plan(44_100, 2, 30.0, 4096);
        assert_eq!(p.samples_per_frame, 2940.0);
        assert_eq!(p.execs_per_frame, 1);
        assert_eq!(p.samples_per_exec, 2940);
    }

    #[test]
    fn fractional_frames_keep_the_fraction() {
        let p = plan(44_100, 1, 24.0, 4096);
        assert_eq!(p.samples_per_frame, 1837.5);
        assert_eq!(p.samples_per_exec, 1837);
        assert_eq!(p.samples_remainder, 0);
        assert!((p.sample_fraction_per_frame - 0.5).abs() < 1e-12);
    }

    #[test]
    fn splits_large_frames_into_execs() {
        let p = plan(44_100, 2, 24.0, 1024);
        assert_eq!(p.samples_per_frame, 3675.0);
        assert_eq!(p.execs_per_frame, 4);
        assert_eq!(p.samples_per_exec, 918);
        assert_eq!(p.samples_remainder, 3);

        let total: usize = (0..p.execs_per_frame).map(|i| p.base_exec_len(i)).sum();
        assert_eq!(total, 3675);
    }

    #[test]
    fn slack_term_adds_an_exec_at_the_boundary() {
        // 1024 samples would fill the buffer exactly; the channel-group of
        // slack pushes it to two execs.
        let p = plan(25_600, 2, 50.0, 1024);
        assert_eq!(p.samples_per_frame, 1024.0);
        assert_eq!(p.execs_per_frame, 2);
        assert_eq!(p.samples_per_exec, 512);
    }

    #[test]
    fn plan_bounds_hold_across_configs() {
        for &(rate, channels, framerate, capacity) in &[
            (44_100, 2, 25.0, 1024),
            (44_100, 2, 29.97, 1024),
            (48_000, 1, 23.976, 512),
            (8_000, 2, 7.0, 300),
            (96_000, 2, 60.0, 4096),
            (10, 2, 100.0, 64),
        ] {
            let p = plan(rate, channels, framerate, capacity);
            let e = p.execs_per_frame as f64;
            let b = p.samples_per_exec as f64;
            assert!(p.execs_per_frame >= 1);
            assert!(e * b <= p.samples_per_frame);
            assert!(p.samples_per_frame <= e * (b + 1.0));
            assert!(p.samples_remainder < p.execs_per_frame);
            assert!(p.buffer_len >= capacity);
            assert!(p.buffer_len >= p.samples_per_exec + 2 + channels);
        }
    }

    #[test]
    fn longest_supported_frame_plans_without_overflow() {
        let config = StreamConfig::new(67_108_864, 1, 1.0, StreamConfig::MAX_EXEC_CAPACITY);
        config.validate().unwrap();
        let p = FramePlan::new(&config);
        assert_eq!(p.samples_per_frame, StreamConfig::MAX_SAMPLES_PER_FRAME);
        assert_eq!(p.execs_per_frame, 5);
        assert_eq!(p.samples_per_exec, 13_421_772);
        assert_eq!(p.samples_remainder, 4);
        assert_eq!(p.buffer_len, StreamConfig::MAX_EXEC_CAPACITY);
    }

    #[test]
    fn oversampled_streams_use_a_single_exec() {
        let p = plan(10, 2, 100.0, 64);
        assert!(p.is_oversampled());
        assert_eq!(p.execs_per_frame, 1);
        assert_eq!(p.samples_per_exec, 0);
        assert!(!plan(44_100, 2, 25.0, 1024).is_oversampled());
    }
}
