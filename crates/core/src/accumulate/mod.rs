use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{PcmBarsError, Result};

/// How the execs of one frame are weighted against each other.
///
/// Both schemes give every non-empty exec a positive weight and make the
/// weights of a frame sum to 1. They agree whenever every exec of the frame
/// has the same length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Weight by each exec's share of the samples actually read in the frame.
    #[default]
    Proportional,
    /// Equal weight for every non-empty exec.
    Uniform,
}

impl Weighting {
    /// Weights for a frame whose execs read `lengths` samples. Empty execs
    /// get weight 0; a frame with no samples gets all zeros.
    pub fn weights(&self, lengths: &[usize]) -> Vec<f64> {
        let mut weights = vec![0.0; lengths.len()];
        self.fill_weights(lengths, &mut weights);
        weights
    }

    fn fill_weights(&self, lengths: &[usize], weights: &mut [f64]) {
        match self {
            Self::Proportional => {
                let total: usize = lengths.iter().sum();
                for (weight, &len) in weights.iter_mut().zip(lengths) {
                    *weight = if total == 0 {
                        0.0
                    } else {
                        len as f64 / total as f64
                    };
                }
            }
            Self::Uniform => {
                let active = lengths.iter().filter(|&&len| len > 0).count();
                for (weight, &len) in weights.iter_mut().zip(lengths) {
                    *weight = if len == 0 { 0.0 } else { 1.0 / active as f64 };
                }
            }
        }
    }
}

impl FromStr for Weighting {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "proportional" => Ok(Self::Proportional),
            "uniform" => Ok(Self::Uniform),
            other => Err(format!(
                "unknown weighting `{other}` (expected proportional or uniform)"
            )),
        }
    }
}

impl fmt::Display for Weighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proportional => f.write_str("proportional"),
            Self::Uniform => f.write_str("uniform"),
        }
    }
}

/// Per-band magnitudes for one emitted frame, channel halves back to back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameResult {
    bars_per_channel: usize,
    bars: Vec<f64>,
}

impl FrameResult {
    pub fn zeroed(bars_per_channel: usize, channels: usize) -> Self {
        Self {
            bars_per_channel,
            bars: vec![0.0; bars_per_channel * channels],
        }
    }

    /// Wraps bars laid out channel half after channel half. Fails unless
    /// `bars` holds a whole, non-zero number of halves.
    pub fn from_bars(bars_per_channel: usize, bars: Vec<f64>) -> Result<Self> {
        if bars_per_channel == 0 || bars.is_empty() || bars.len() % bars_per_channel != 0 {
            return Err(PcmBarsError::Transform(format!(
                "{} bars do not split into halves of {bars_per_channel}",
                bars.len()
            )));
        }
        Ok(Self {
            bars_per_channel,
            bars,
        })
    }

    pub fn bars(&self) -> &[f64] {
        &self.bars
    }

    pub fn bars_per_channel(&self) -> usize {
        self.bars_per_channel
    }

    pub fn channels(&self) -> usize {
        if self.bars_per_channel == 0 {
            0
        } else {
            self.bars.len() / self.bars_per_channel
        }
    }

    /// Bars of a single channel half. Panics if `channel >= self.channels()`.
    pub fn channel(&self, channel: usize) -> &[f64] {
        let start = channel * self.bars_per_channel;
        &self.bars[start..start + self.bars_per_channel]
    }
}

/// Folds the per-exec transform outputs of a frame into one [`FrameResult`].
#[derive(Debug)]
pub struct SpectrumAccumulator {
    weighting: Weighting,
    weights: Vec<f64>,
    frame: FrameResult,
    channels: usize,
    has_samples: bool,
}

impl SpectrumAccumulator {
    pub fn new(weighting: Weighting, bars_per_channel: usize, channels: usize) -> Self {
        Self {
            weighting,
            weights: Vec::new(),
            frame: FrameResult::zeroed(bars_per_channel, channels),
            channels,
            has_samples: false,
        }
    }

    pub fn weighting(&self) -> Weighting {
        self.weighting
    }

    /// Resets the running sum and fixes the weights for a frame whose execs
    /// will read `lengths` samples.
    pub fn begin_frame(&mut self, lengths: &[usize]) {
        self.frame.bars.iter_mut().for_each(|bar| *bar = 0.0);
        self.weights.resize(lengths.len(), 0.0);
        self.weighting.fill_weights(lengths, &mut self.weights);
        self.has_samples = lengths.iter().any(|&len| len > 0);
    }

    /// Adds the transform output of exec `read_idx`.
    pub fn add_exec(&mut self, read_idx: usize, bars: &[f64]) {
        let weight = self.weights[read_idx];
        for (acc, &value) in self.frame.bars.iter_mut().zip(bars) {
            *acc += weight * value;
        }
    }

    /// False when every exec of the current frame is empty.
    pub fn has_samples(&self) -> bool {
        self.has_samples
    }

    /// Hands out the finished frame and leaves a zeroed one in its place.
    pub fn finish_frame(&mut self) -> FrameResult {
        let fresh = FrameResult::zeroed(self.frame.bars_per_channel, self.channels);
        std::mem::replace(&mut self.frame, fresh)
    }
}
