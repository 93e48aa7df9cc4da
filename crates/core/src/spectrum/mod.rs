use std::{f64::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex64, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{PcmBarsError, Result, SensitivityMode, SpectrumSettings, StreamConfig};

const MIN_FFT_SIZE: usize = 2048;
/// Magnitude of a full-scale s16 sample.
const FULL_SCALE: f64 = 32_768.0;
const AUTOSENS_INIT_STEP: f64 = 1.1;
const AUTOSENS_DECAY: f64 = 0.985;
const AUTOSENS_GROWTH: f64 = 1.001;

/// Black-box spectrum analysis used by the frame pipeline.
///
/// A transform is created once per stream and called once per exec with a
/// slice of interleaved samples. Each call writes `bars_per_channel *
/// channels` magnitudes into `out`, channel halves back to back.
pub trait SpectrumTransform {
    fn bars_per_channel(&self) -> usize;

    fn channels(&self) -> usize;

    /// Largest sample count accepted by [`SpectrumTransform::execute`].
    fn capacity(&self) -> usize;

    /// Cutoff frequency of each band, one entry per bar.
    fn cutoff_frequencies(&self) -> &[f64];

    fn execute(&mut self, samples: &[f64], out: &mut [f64]) -> Result<()>;

    fn output_len(&self) -> usize {
        self.bars_per_channel() * self.channels()
    }
}

/// Initialisation record for [`BarSpectrum`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumConfig {
    pub bars_per_channel: usize,
    pub sample_rate: u32,
    pub channels: usize,
    pub sensitivity: SensitivityMode,
    pub noise_reduction: f64,
    pub low_cutoff: f64,
    pub high_cutoff: f64,
    pub height: f64,
}

impl SpectrumConfig {
    pub fn from_settings(settings: &SpectrumSettings, stream: &StreamConfig) -> Self {
        let (low_cutoff, high_cutoff) = settings.cutoffs(stream.sample_rate);
        Self {
            bars_per_channel: settings.bars_per_channel,
            sample_rate: stream.sample_rate,
            channels: stream.channels,
            sensitivity: settings.sensitivity,
            noise_reduction: settings.noise_reduction,
            low_cutoff,
            high_cutoff,
            height: settings.height,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bars_per_channel == 0 {
            return Err(PcmBarsError::config("at least one bar is required"));
        }
        if self.sample_rate == 0 {
            return Err(PcmBarsError::config("sample rate must be greater than 0"));
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(PcmBarsError::config(format!(
                "channel count must be 1 or 2, got {}",
                self.channels
            )));
        }
        if !(0.0..1.0).contains(&self.noise_reduction) {
            return Err(PcmBarsError::config(format!(
                "noise reduction must be in [0, 1), got {}",
                self.noise_reduction
            )));
        }
        let nyquist = f64::from(self.sample_rate) / 2.0;
        if !(self.low_cutoff > 0.0 && self.low_cutoff < self.high_cutoff) {
            return Err(PcmBarsError::config(format!(
                "cutoffs must satisfy 0 < low < high, got {} and {}",
                self.low_cutoff, self.high_cutoff
            )));
        }
        if self.high_cutoff > nyquist {
            return Err(PcmBarsError::config(format!(
                "high cutoff {} Hz is above the Nyquist frequency {} Hz",
                self.high_cutoff, nyquist
            )));
        }
        if !(self.height > 0.0 && self.height.is_finite()) {
            return Err(PcmBarsError::config("bar height must be a positive number"));
        }
        if let SensitivityMode::Fixed { gain } = self.sensitivity {
            if !(gain > 0.0 && gain.is_finite()) {
                return Err(PcmBarsError::config("fixed gain must be a positive number"));
            }
        }
        Ok(())
    }
}

/// FFT based bar spectrum over log-spaced bands.
///
/// Keeps a sliding history window per channel so that execs shorter than the
/// FFT still produce a full-resolution spectrum.
pub struct BarSpectrum {
    config: SpectrumConfig,
    capacity: usize,
    cutoffs: Vec<f64>,
    band_bins: Vec<(usize, usize)>,
    history: Vec<Vec<f64>>,
    window: Vec<f64>,
    fft: FftResources,
    gain: f64,
    sens_init: bool,
    memory: Vec<f64>,
    raw: Vec<f64>,
}

impl BarSpectrum {
    /// Validates `config` and allocates every buffer up front. `capacity` is
    /// the largest interleaved sample count a single exec may pass.
    pub fn new(config: SpectrumConfig, capacity: usize) -> Result<Self> {
        config.validate()?;
        if capacity < config.channels {
            return Err(PcmBarsError::config(format!(
                "transform capacity {capacity} is smaller than one channel-group"
            )));
        }

        let fft_size = (capacity / config.channels)
            .next_power_of_two()
            .max(MIN_FFT_SIZE);
        let fft = FftResources::new(fft_size);
        let window = (0..fft_size).map(|i| hann_value(i, fft_size)).collect();
        let (cutoffs, band_bins) = log_bands(&config, fft_size);

        let gain = match config.sensitivity {
            SensitivityMode::Fixed { gain } => gain,
            SensitivityMode::Auto => 1.0,
        };
        let outputs = config.bars_per_channel * config.channels;

        tracing::debug!(
            bars = config.bars_per_channel,
            channels = config.channels,
            fft_size,
            capacity,
            "initialised bar spectrum"
        );

        Ok(Self {
            capacity,
            cutoffs,
            band_bins,
            history: vec![vec![0.0; fft_size]; config.channels],
            window,
            fft,
            gain,
            sens_init: true,
            memory: vec![0.0; outputs],
            raw: vec![0.0; outputs],
            config,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft.size
    }

    /// Current sensitivity gain. Only moves in [`SensitivityMode::Auto`].
    pub fn gain(&self) -> f64 {
        self.gain
    }

    fn push_history(&mut self, samples: &[f64]) {
        let channels = self.config.channels;
        let incoming = samples.len() / channels;
        let size = self.fft.size;

        for (channel, history) in self.history.iter_mut().enumerate() {
            let keep = size.saturating_sub(incoming);
            history.copy_within(size - keep.., 0);
            let skip = incoming.saturating_sub(size);
            let fresh = samples
                .chunks_exact(channels)
                .skip(skip)
                .map(|group| group[channel]);
            for (slot, sample) in history[keep..].iter_mut().zip(fresh) {
                *slot = sample;
            }
        }
    }

    fn analyse_channel(&mut self, channel: usize) -> Result<()> {
        let fft = &mut self.fft;
        for ((input, sample), weight) in fft
            .input
            .iter_mut()
            .zip(&self.history[channel])
            .zip(&self.window)
        {
            *input = sample * weight;
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let scale = self.config.height / (fft.size as f64 * 0.25 * FULL_SCALE);
        let bars = self.config.bars_per_channel;
        for (bar, &(lo, hi)) in self.band_bins.iter().enumerate() {
            let peak = fft.spectrum[lo..hi]
                .iter()
                .map(|bin| bin.norm())
                .fold(0.0, f64::max);
            self.raw[channel * bars + bar] = peak * scale;
        }
        Ok(())
    }

    fn update_gain(&mut self) {
        if self.config.sensitivity != SensitivityMode::Auto {
            return;
        }
        let height = self.config.height;
        let overshoot = self.raw.iter().any(|&value| value * self.gain > height);
        if overshoot {
            self.gain *= AUTOSENS_DECAY;
            self.sens_init = false;
        } else if self.sens_init {
            self.gain *= AUTOSENS_INIT_STEP;
        } else {
            self.gain *= AUTOSENS_GROWTH;
        }
    }
}

impl SpectrumTransform for BarSpectrum {
    fn bars_per_channel(&self) -> usize {
        self.config.bars_per_channel
    }

    fn channels(&self) -> usize {
        self.config.channels
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn cutoff_frequencies(&self) -> &[f64] {
        &self.cutoffs
    }

    fn execute(&mut self, samples: &[f64], out: &mut [f64]) -> Result<()> {
        if samples.len() > self.capacity {
            return Err(PcmBarsError::Transform(format!(
                "exec of {} samples exceeds capacity {}",
                samples.len(),
                self.capacity
            )));
        }
        if samples.len() % self.config.channels != 0 {
            return Err(PcmBarsError::Transform(format!(
                "exec of {} samples splits a channel-group",
                samples.len()
            )));
        }
        if out.len() != self.output_len() {
            return Err(PcmBarsError::Transform(format!(
                "output buffer holds {} bars, expected {}",
                out.len(),
                self.output_len()
            )));
        }

        self.push_history(samples);
        for channel in 0..self.config.channels {
            self.analyse_channel(channel)?;
        }

        let scaled_gain = self.gain;
        self.update_gain();

        let nr = self.config.noise_reduction;
        let height = self.config.height;
        for ((slot, memory), &raw) in out.iter_mut().zip(&mut self.memory).zip(&self.raw) {
            let value = (raw * scaled_gain).min(height);
            *memory = *memory * nr + value * (1.0 - nr);
            *slot = memory.clamp(0.0, height);
        }
        Ok(())
    }
}

impl fmt::Debug for BarSpectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BarSpectrum")
            .field("config", &self.config)
            .field("capacity", &self.capacity)
            .field("fft", &self.fft)
            .field("gain", &self.gain)
            .finish()
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f64>>,
    scratch: Vec<Complex64>,
    spectrum: Vec<Complex64>,
    input: Vec<f64>,
}

impl FftResources {
    fn new(size: usize) -> Self {
        let plan = RealFftPlanner::<f64>::new().plan_fft_forward(size);
        let scratch = plan.make_scratch_vec();
        let spectrum = plan.make_output_vec();
        let input = plan.make_input_vec();
        Self {
            size,
            plan,
            scratch,
            spectrum,
            input,
        }
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

/// Log-spaced band edges between the configured cutoffs. Returns the lower
/// cutoff of every bar and the `[lo, hi)` FFT bin range it reads.
fn log_bands(config: &SpectrumConfig, fft_size: usize) -> (Vec<f64>, Vec<(usize, usize)>) {
    let bars = config.bars_per_channel;
    let ratio = config.high_cutoff / config.low_cutoff;
    let bin_hz = f64::from(config.sample_rate) / fft_size as f64;
    let bins = fft_size / 2 + 1;

    let edges: Vec<f64> = (0..=bars)
        .map(|k| config.low_cutoff * ratio.powf(k as f64 / bars as f64))
        .collect();

    let band_bins = edges
        .windows(2)
        .map(|edge| {
            let lo = ((edge[0] / bin_hz).floor() as usize).min(bins - 1);
            let hi = ((edge[1] / bin_hz).floor() as usize).clamp(lo + 1, bins);
            (lo, hi)
        })
        .collect();

    (edges[..bars].to_vec(), band_bins)
}

/// Periodic Hann window.
fn hann_value(index: usize, len: usize) -> f64 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f64) / len as f64).cos()
}
