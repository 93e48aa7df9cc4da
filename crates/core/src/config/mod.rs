use std::{fmt, fs::File, io::BufReader, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{PcmBarsError, Result, SpectrumConfig, Weighting};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub spectrum: SpectrumSettings,
    pub output: OutputSettings,
    pub weighting: Weighting,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields keep their defaults.
    /// The result is not validated; call [`AppConfig::validate`] once every
    /// override has been applied.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.stream.validate()?;
        self.spectrum.validate()?;
        self.spectrum_config().validate()?;
        if self.output.stereo && self.stream.channels != 2 {
            return Err(PcmBarsError::config(
                "stereo output requires a two channel input stream",
            ));
        }
        Ok(())
    }

    /// Builds the transform initialisation record for this configuration.
    pub fn spectrum_config(&self) -> SpectrumConfig {
        SpectrumConfig::from_settings(&self.spectrum, &self.stream)
    }

    /// Number of channel halves written per output line.
    pub fn channels_out(&self) -> usize {
        if self.output.stereo {
            2
        } else {
            1
        }
    }
}

/// Immutable description of the incoming PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Input sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count, 1 or 2.
    pub channels: usize,
    /// Output frames per second. Need not be an integer.
    pub framerate: f64,
    /// Nominal maximum number of samples handed to one transform call.
    pub exec_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            framerate: 25.0,
            exec_capacity: 1024,
        }
    }
}

impl StreamConfig {
    /// Longest frame, in interleaved samples, a plan is derived for.
    pub const MAX_SAMPLES_PER_FRAME: f64 = 67_108_864.0;
    /// Most transform calls a single frame may be split into.
    pub const MAX_EXECS_PER_FRAME: usize = 65_536;
    pub const MAX_EXEC_CAPACITY: usize = 1 << 24;

    pub fn new(sample_rate: u32, channels: usize, framerate: f64, exec_capacity: usize) -> Self {
        Self {
            sample_rate,
            channels,
            framerate,
            exec_capacity,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(PcmBarsError::config("sample rate must be greater than 0"));
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(PcmBarsError::config(format!(
                "channel count must be 1 or 2, got {}",
                self.channels
            )));
        }
        if !self.framerate.is_finite() || self.framerate <= 0.0 {
            return Err(PcmBarsError::config(format!(
                "framerate must be a positive number, got {}",
                self.framerate
            )));
        }
        if self.exec_capacity <= self.channels {
            return Err(PcmBarsError::config(format!(
                "exec capacity must exceed one channel-group ({} samples), got {}",
                self.channels, self.exec_capacity
            )));
        }
        if self.exec_capacity > Self::MAX_EXEC_CAPACITY {
            return Err(PcmBarsError::config(format!(
                "exec capacity must be at most {} samples, got {}",
                Self::MAX_EXEC_CAPACITY,
                self.exec_capacity
            )));
        }

        let samples_per_frame = self.samples_per_frame();
        if !(samples_per_frame <= Self::MAX_SAMPLES_PER_FRAME) {
            return Err(PcmBarsError::config(format!(
                "framerate {} is too low: a frame would span {samples_per_frame} samples, at most {} are supported",
                self.framerate,
                Self::MAX_SAMPLES_PER_FRAME
            )));
        }
        let execs = ((samples_per_frame + self.channels as f64) / self.exec_capacity as f64).ceil();
        if execs > Self::MAX_EXECS_PER_FRAME as f64 {
            return Err(PcmBarsError::config(format!(
                "a frame would need {execs} transform calls of {} samples, at most {} are supported",
                self.exec_capacity,
                Self::MAX_EXECS_PER_FRAME
            )));
        }
        Ok(())
    }

    /// Real-valued number of interleaved samples covered by one frame.
    pub fn samples_per_frame(&self) -> f64 {
        f64::from(self.sample_rate) * self.channels as f64 / self.framerate
    }
}

/// How bar heights are scaled before smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SensitivityMode {
    /// Gain adapts so that the loudest bar stays just below the height.
    Auto,
    /// Constant gain.
    Fixed { gain: f64 },
}

impl Default for SensitivityMode {
    fn default() -> Self {
        Self::Fixed { gain: 1.0 }
    }
}

/// User-facing transform settings. Sample rate and channel count come from
/// the [`StreamConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumSettings {
    pub bars_per_channel: usize,
    pub sensitivity: SensitivityMode,
    /// Smoothing factor in `[0, 1)`; 0 disables smoothing.
    pub noise_reduction: f64,
    /// Lowest band edge in Hz. Left unset it follows
    /// [`SpectrumSettings::DEFAULT_LOW_CUTOFF`], lowered for very slow streams.
    pub low_cutoff: Option<f64>,
    /// Highest band edge in Hz. Left unset it follows
    /// [`SpectrumSettings::DEFAULT_HIGH_CUTOFF`], capped at the Nyquist
    /// frequency of the stream.
    pub high_cutoff: Option<f64>,
    /// Largest value a bar can take.
    pub height: f64,
}

impl Default for SpectrumSettings {
    fn default() -> Self {
        Self {
            bars_per_channel: 10,
            sensitivity: SensitivityMode::default(),
            noise_reduction: noise_reduction_from_smooth_factor(1.0),
            low_cutoff: None,
            high_cutoff: None,
            height: 100.0,
        }
    }
}

impl SpectrumSettings {
    pub const MIN_BARS: usize = 2;
    pub const MAX_BARS: usize = 200;
    pub const DEFAULT_LOW_CUTOFF: f64 = 50.0;
    pub const DEFAULT_HIGH_CUTOFF: f64 = 10_000.0;

    /// Band edges for a stream at `sample_rate`. Unset edges are fitted below
    /// the Nyquist frequency; explicit ones are taken as given.
    pub fn cutoffs(&self, sample_rate: u32) -> (f64, f64) {
        let nyquist = f64::from(sample_rate) / 2.0;
        let high = self
            .high_cutoff
            .unwrap_or(Self::DEFAULT_HIGH_CUTOFF.min(nyquist));
        let low = self
            .low_cutoff
            .unwrap_or(Self::DEFAULT_LOW_CUTOFF.min(high / 2.0));
        (low, high)
    }

    /// Range checks on the user-facing bar count. The remaining fields are
    /// checked by [`SpectrumConfig::validate`].
    pub fn validate(&self) -> Result<()> {
        if !(Self::MIN_BARS..=Self::MAX_BARS).contains(&self.bars_per_channel) {
            return Err(PcmBarsError::config(format!(
                "select between {} and {} bars",
                Self::MIN_BARS,
                Self::MAX_BARS
            )));
        }
        Ok(())
    }
}

/// Maps a user smoothing factor (>0, 1 is the default, larger is smoother)
/// onto the transform's `[0, 1)` noise-reduction factor.
pub fn noise_reduction_from_smooth_factor(smooth_factor: f64) -> f64 {
    smooth_factor / (1.0 + smooth_factor)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Write both channel halves instead of their average.
    pub stereo: bool,
    /// Emit the band cutoff line before the first frame.
    pub print_cutoffs: bool,
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Space padded, four character wide integers.
    #[default]
    Text,
    /// One JSON array per line.
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format `{other}` (expected text or json)")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_channel_counts() {
        let stream = StreamConfig::new(44_100, 3, 25.0, 1024);
        let err = stream.validate().unwrap_err();
        assert!(format!("{err}").contains("1 or 2"));

        let stream = StreamConfig::new(44_100, 0, 25.0, 1024);
        assert!(stream.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_rates() {
        assert!(StreamConfig::new(0, 2, 25.0, 1024).validate().is_err());
        assert!(StreamConfig::new(44_100, 2, 0.0, 1024).validate().is_err());
        assert!(StreamConfig::new(44_100, 2, -1.0, 1024).validate().is_err());
        assert!(StreamConfig::new(44_100, 2, f64::NAN, 1024).validate().is_err());
        assert!(StreamConfig::new(44_100, 2, 25.0, 2).validate().is_err());
    }

    #[test]
    fn frame_length_is_bounded() {
        let err = StreamConfig::new(44_100, 2, 1e-310, 1024).validate().unwrap_err();
        assert!(format!("{err}").contains("too low"));
        assert!(StreamConfig::new(44_100, 2, 1e-9, 1024).validate().is_err());

        // Exactly the longest supported frame.
        let longest = StreamConfig::new(67_108_864, 1, 1.0, StreamConfig::MAX_EXEC_CAPACITY);
        longest.validate().unwrap();
        assert!(StreamConfig::new(67_108_864, 1, 0.5, 1 << 24).validate().is_err());

        // Short transform calls cap the frame length too.
        assert!(StreamConfig::new(44_100, 1, 0.01, 2).validate().is_err());
        assert!(StreamConfig::new(44_100, 1, 1.0, (1 << 24) + 1).validate().is_err());
    }

    #[test]
    fn framerate_above_sample_rate_is_accepted() {
        StreamConfig::new(10, 1, 100.0, 64).validate().unwrap();
    }

    #[test]
    fn bar_count_is_bounded() {
        let mut config = AppConfig::default();
        config.spectrum.bars_per_channel = 1;
        assert!(config.validate().is_err());
        config.spectrum.bars_per_channel = 201;
        assert!(config.validate().is_err());
        config.spectrum.bars_per_channel = 200;
        config.validate().unwrap();
    }

    #[test]
    fn default_cutoffs_follow_slow_streams() {
        for rate in [8_000, 16_000] {
            let mut config = AppConfig::default();
            config.stream.sample_rate = rate;
            config.validate().unwrap();
            let spectrum = config.spectrum_config();
            assert_eq!(spectrum.high_cutoff, f64::from(rate) / 2.0);
            assert_eq!(spectrum.low_cutoff, 50.0);
        }

        let mut config = AppConfig::default();
        config.stream.sample_rate = 60;
        config.validate().unwrap();
        assert_eq!(config.spectrum.cutoffs(60), (15.0, 30.0));

        let defaults = AppConfig::default().spectrum;
        assert_eq!(defaults.cutoffs(22_050), (50.0, 10_000.0));
        assert_eq!(defaults.cutoffs(44_100), (50.0, 10_000.0));
    }

    #[test]
    fn explicit_cutoffs_are_checked_against_the_stream() {
        let mut config = AppConfig::default();
        config.stream.sample_rate = 16_000;
        config.spectrum.high_cutoff = Some(10_000.0);
        let err = config.validate().unwrap_err();
        assert!(format!("{err}").contains("Nyquist"));

        config.spectrum.high_cutoff = None;
        config.spectrum.low_cutoff = Some(9_000.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn stereo_output_needs_stereo_input() {
        let mut config = AppConfig::default();
        config.stream.channels = 1;
        config.output.stereo = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{
            "stream": { "framerate": 29.97 },
            "spectrum": { "sensitivity": { "mode": "auto" } },
            "output": { "format": "json" },
            "weighting": "uniform"
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.stream.sample_rate, 44_100);
        assert_eq!(config.stream.framerate, 29.97);
        assert_eq!(config.spectrum.sensitivity, SensitivityMode::Auto);
        assert_eq!(config.spectrum.bars_per_channel, 10);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.weighting, Weighting::Uniform);
    }

    #[test]
    fn smooth_factor_mapping_is_monotonic() {
        let low = noise_reduction_from_smooth_factor(0.1);
        let mid = noise_reduction_from_smooth_factor(1.0);
        let high = noise_reduction_from_smooth_factor(10.0);
        assert!(low < mid && mid < high && high < 1.0);
        assert!((mid - 0.5).abs() < 1e-12);
    }
}
