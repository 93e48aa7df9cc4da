//! Core library for the pcm-bars spectrum filter.
//!
//! Turns a stream of interleaved s16le PCM samples into one bar spectrum per
//! output frame at an arbitrary, usually non-integer, frame rate. Each module
//! owns one stage of the pipeline: the frame plan, the fractional carry that
//! keeps long-run consumption exact, the spectrum transform, the per-frame
//! accumulator, and the reader and writer at either end.

pub mod accumulate;
pub mod carry;
pub mod config;
pub mod emit;
pub mod error;
pub mod pipeline;
pub mod schedule;
pub mod spectrum;
pub mod stream;

pub use accumulate::{FrameResult, SpectrumAccumulator, Weighting};
pub use carry::CarryState;
pub use config::{
    noise_reduction_from_smooth_factor, AppConfig, OutputFormat, OutputSettings, SensitivityMode,
    SpectrumSettings, StreamConfig,
};
pub use emit::BarWriter;
pub use error::{PcmBarsError, Result};
pub use pipeline::{FramePipeline, RunSummary, StreamEnd};
pub use schedule::FramePlan;
pub use spectrum::{BarSpectrum, SpectrumConfig, SpectrumTransform};
pub use stream::PcmReader;
