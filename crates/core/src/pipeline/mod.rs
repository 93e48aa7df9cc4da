use std::io::{self, Read, Write};

use crate::{
    BarWriter, CarryState, FramePlan, FrameResult, PcmBarsError, PcmReader, Result,
    SpectrumAccumulator, SpectrumTransform, StreamConfig, Weighting,
};

/// How a run came to an end.
#[derive(Debug)]
pub enum StreamEnd {
    /// The input ran out. Any partial frame was dropped.
    Exhausted,
    /// Reading the input failed. Any partial frame was dropped.
    ReadFailed(io::Error),
}

impl StreamEnd {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub frames_emitted: u64,
    /// Samples that went into emitted frames.
    pub samples_consumed: u64,
    /// Samples read for the final, incomplete frame.
    pub discarded_samples: u64,
    pub end: StreamEnd,
}

impl RunSummary {
    /// Turns a failed read into [`PcmBarsError::Read`].
    pub fn into_result(self) -> Result<Self> {
        let RunSummary {
            frames_emitted,
            samples_consumed,
            discarded_samples,
            end,
        } = self;
        match end {
            StreamEnd::ReadFailed(err) => Err(PcmBarsError::Read(err)),
            StreamEnd::Exhausted => Ok(RunSummary {
                frames_emitted,
                samples_consumed,
                discarded_samples,
                end: StreamEnd::Exhausted,
            }),
        }
    }
}

/// Drives the read → transform → accumulate loop one frame at a time.
///
/// The pipeline owns the transform for the whole stream; it is released when
/// the pipeline is dropped, whichever way the run ended.
#[derive(Debug)]
pub struct FramePipeline<T> {
    plan: FramePlan,
    carry: CarryState,
    transform: T,
    accumulator: SpectrumAccumulator,
    lengths: Vec<usize>,
    raw: Vec<i16>,
    samples: Vec<f64>,
    exec_out: Vec<f64>,
    current: FrameResult,
    frames_emitted: u64,
    samples_consumed: u64,
    discarded_samples: u64,
    finished: bool,
}

impl<T: SpectrumTransform> FramePipeline<T> {
    pub fn new(stream: &StreamConfig, weighting: Weighting, transform: T) -> Result<Self> {
        stream.validate()?;
        let plan = FramePlan::new(stream);

        if transform.channels() != stream.channels {
            return Err(PcmBarsError::config(format!(
                "transform expects {} channels, stream has {}",
                transform.channels(),
                stream.channels
            )));
        }
        if transform.capacity() < plan.buffer_len {
            return Err(PcmBarsError::config(format!(
                "transform accepts {} samples per exec, frame plan needs {}",
                transform.capacity(),
                plan.buffer_len
            )));
        }
        if plan.is_oversampled() {
            tracing::warn!(
                samples_per_frame = plan.samples_per_frame,
                "framerate exceeds the sample rate, frames without samples repeat the previous spectrum"
            );
        }

        let bars = transform.bars_per_channel();
        let channels = transform.channels();
        Ok(Self {
            carry: CarryState::new(),
            accumulator: SpectrumAccumulator::new(weighting, bars, channels),
            lengths: Vec::with_capacity(plan.execs_per_frame),
            raw: vec![0; plan.buffer_len],
            samples: vec![0.0; plan.buffer_len],
            exec_out: vec![0.0; transform.output_len()],
            current: FrameResult::zeroed(bars, channels),
            frames_emitted: 0,
            samples_consumed: 0,
            discarded_samples: 0,
            finished: false,
            plan,
            transform,
        })
    }

    pub fn plan(&self) -> &FramePlan {
        &self.plan
    }

    pub fn carry(&self) -> CarryState {
        self.carry
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }

    /// True once the input has run short or failed. No further frames are
    /// read after that.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Reads and analyses one frame.
    ///
    /// Returns `Ok(None)` once the input runs short; the partial frame is
    /// dropped and the carry is left untouched. A failed read surfaces as
    /// [`PcmBarsError::Read`]. Either way the stream is finished and every
    /// later call returns `Ok(None)` without touching the reader. A frame
    /// whose execs are all empty repeats the previous result.
    pub fn next_frame<R: Read>(&mut self, reader: &mut PcmReader<R>) -> Result<Option<&FrameResult>> {
        if self.finished {
            return Ok(None);
        }

        let next_carry = self.carry.plan_frame_into(&self.plan, &mut self.lengths);
        self.accumulator.begin_frame(&self.lengths);

        let mut frame_samples = 0;
        for (read_idx, &read_len) in self.lengths.iter().enumerate() {
            if read_len == 0 {
                continue;
            }

            let raw = &mut self.raw[..read_len];
            let got = match reader.read(raw) {
                Ok(got) => got,
                Err(err) => {
                    self.discarded_samples = frame_samples as u64;
                    self.finished = true;
                    return Err(PcmBarsError::Read(err));
                }
            };
            frame_samples += got;
            if got < read_len {
                self.discarded_samples = frame_samples as u64;
                self.finished = true;
                return Ok(None);
            }

            for (sample, &value) in self.samples.iter_mut().zip(raw.iter()) {
                *sample = f64::from(value);
            }
            self.transform
                .execute(&self.samples[..read_len], &mut self.exec_out)?;
            self.accumulator.add_exec(read_idx, &self.exec_out);
        }

        self.carry = next_carry;
        self.frames_emitted += 1;
        self.samples_consumed += frame_samples as u64;
        if self.accumulator.has_samples() {
            self.current = self.accumulator.finish_frame();
        }
        Ok(Some(&self.current))
    }

    /// Runs until the input is exhausted, writing every complete frame.
    ///
    /// Read failures end the run like exhaustion does and are reported in
    /// [`RunSummary::end`]. Transform and write failures are returned as
    /// errors.
    pub fn run<R: Read, W: Write>(
        &mut self,
        reader: &mut PcmReader<R>,
        writer: &mut BarWriter<W>,
    ) -> Result<RunSummary> {
        tracing::info!(
            samples_per_frame = self.plan.samples_per_frame,
            execs_per_frame = self.plan.execs_per_frame,
            weighting = %self.accumulator.weighting(),
            "starting frame loop"
        );

        let end = loop {
            match self.next_frame(reader) {
                Ok(Some(frame)) => writer.write_frame(frame)?,
                Ok(None) => break StreamEnd::Exhausted,
                Err(PcmBarsError::Read(err)) => {
                    tracing::warn!(error = %err, "input read failed, stopping");
                    break StreamEnd::ReadFailed(err);
                }
                Err(err) => return Err(err),
            }
        };
        writer.flush()?;

        let summary = RunSummary {
            frames_emitted: self.frames_emitted,
            samples_consumed: self.samples_consumed,
            discarded_samples: self.discarded_samples,
            end,
        };
        tracing::info!(
            frames = summary.frames_emitted,
            samples = summary.samples_consumed,
            discarded = summary.discarded_samples,
            "frame loop finished"
        );
        Ok(summary)
    }
}
