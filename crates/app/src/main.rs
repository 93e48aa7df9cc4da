use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use clap::Parser;
use pcm_bars_core::{
    noise_reduction_from_smooth_factor, AppConfig, BarSpectrum, BarWriter, FramePipeline,
    FramePlan, OutputFormat, PcmBarsError, PcmReader, SensitivityMode, SpectrumTransform,
    Weighting,
};
use tracing_subscriber::EnvFilter;

fn main() -> pcm_bars_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    config.validate()?;

    run(&cli, &config)
}

fn run(cli: &Cli, config: &AppConfig) -> pcm_bars_core::Result<()> {
    let plan = FramePlan::new(&config.stream);
    let transform = BarSpectrum::new(config.spectrum_config(), plan.buffer_len)?;
    let mut pipeline = FramePipeline::new(&config.stream, config.weighting, transform)?;

    let input = open_input(cli.input.as_deref())?;
    let output = open_output(cli.output.as_deref())?;
    tracing::info!(input = ?cli.input, output = ?cli.output, "streams opened");

    let mut reader = PcmReader::new(input);
    let mut writer = BarWriter::new(output, config.output.format, config.channels_out());

    if config.output.print_cutoffs {
        writer.write_cutoffs(pipeline.transform().cutoff_frequencies())?;
    }

    let summary = pipeline.run(&mut reader, &mut writer)?;
    summary.into_result()?;
    Ok(())
}

fn open_input(path: Option<&Path>) -> pcm_bars_core::Result<Box<dyn Read>> {
    match path {
        None => Ok(Box::new(io::stdin().lock())),
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdin().lock())),
        Some(path) => {
            let file = File::open(path).map_err(|err| {
                io::Error::new(
                    err.kind(),
                    format!("could not open file for reading '{}': {err}", path.display()),
                )
            })?;
            Ok(Box::new(BufReader::new(file)))
        }
    }
}

fn open_output(path: Option<&Path>) -> pcm_bars_core::Result<Box<dyn Write>> {
    match path {
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
        Some(path) if path == Path::new("-") => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
        Some(path) => {
            let file = File::create(path).map_err(|err| {
                io::Error::new(
                    err.kind(),
                    format!("could not open file for writing '{}': {err}", path.display()),
                )
            })?;
            Ok(Box::new(BufWriter::new(file)))
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .try_init();
}

/// Convert raw pcm_s16le audio into per-frame frequency spectrum bars.
///
/// Input can be produced with, e.g.
/// `ffmpeg -i file.wav -f s16le -ar 44100 -acodec pcm_s16le -ac 2 file.raw`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Raw PCM input file; reads standard input when omitted or `-`.
    input: Option<PathBuf>,

    /// Write output to this file instead of standard output.
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Number of bars per channel (2 to 200, default 10).
    #[arg(short = 'b', long)]
    bars: Option<usize>,

    /// Output frame rate in Hz (default 25).
    #[arg(short = 'f', long)]
    framerate: Option<f64>,

    /// Stereo output: both channels' bars on each line instead of their average.
    #[arg(short = 'S', long)]
    stereo: bool,

    /// Smooth factor, greater than 0; larger is smoother (default 1).
    #[arg(short = 's', long)]
    smooth: Option<f64>,

    /// Autosens setting; 0 keeps a fixed sensitivity.
    #[arg(short = 'a', long)]
    autosens: Option<u32>,

    /// Print the band cutoff frequencies as the first line.
    #[arg(short = 'F', long)]
    print_freq_bands: bool,

    /// Input sample rate in Hz (default 44100).
    #[arg(long)]
    rate: Option<u32>,

    /// Input channel count, 1 or 2 (default 2).
    #[arg(long)]
    channels: Option<usize>,

    /// Samples handed to the spectrum transform per call (default 1024).
    #[arg(long)]
    capacity: Option<usize>,

    /// Lowest band edge in Hz.
    #[arg(long)]
    low_cutoff: Option<f64>,

    /// Highest band edge in Hz.
    #[arg(long)]
    high_cutoff: Option<f64>,

    /// How execs of a frame are weighted: proportional or uniform.
    #[arg(long)]
    weighting: Option<Weighting>,

    /// Output format: text or json.
    #[arg(long)]
    format: Option<OutputFormat>,

    /// JSON configuration file; command line options take precedence.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn resolve_config(&self) -> pcm_bars_core::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let config = AppConfig::load(path)?;
                tracing::info!(path = %path.display(), "loaded config");
                config
            }
            None => AppConfig::default(),
        };

        if let Some(rate) = self.rate {
            config.stream.sample_rate = rate;
        }
        if let Some(channels) = self.channels {
            config.stream.channels = channels;
        }
        if let Some(framerate) = self.framerate {
            config.stream.framerate = framerate;
        }
        if let Some(capacity) = self.capacity {
            config.stream.exec_capacity = capacity;
        }
        if let Some(bars) = self.bars {
            config.spectrum.bars_per_channel = bars;
        }
        if let Some(smooth) = self.smooth {
            if !(smooth > 0.0 && smooth.is_finite()) {
                return Err(PcmBarsError::config(
                    "smooth factor must be a positive number",
                ));
            }
            config.spectrum.noise_reduction = noise_reduction_from_smooth_factor(smooth);
        }
        if let Some(autosens) = self.autosens {
            config.spectrum.sensitivity = if autosens == 0 {
                SensitivityMode::default()
            } else {
                SensitivityMode::Auto
            };
        }
        if let Some(low) = self.low_cutoff {
            config.spectrum.low_cutoff = Some(low);
        }
        if let Some(high) = self.high_cutoff {
            config.spectrum.high_cutoff = Some(high);
        }
        if let Some(weighting) = self.weighting {
            config.weighting = weighting;
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        config.output.stereo |= self.stereo;
        config.output.print_cutoffs |= self.print_freq_bands;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> AppConfig {
        let cli = Cli::try_parse_from(std::iter::once("pcm-bars").chain(args.iter().copied()))
            .unwrap();
        cli.resolve_config().unwrap()
    }

    #[test]
    fn defaults_without_flags() {
        let config = parse(&[]);
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.channels_out(), 1);
    }

    #[test]
    fn short_flags_override_defaults() {
        let config = parse(&["-b", "20", "-f", "29.97", "-S", "-s", "3", "-a", "1", "-F"]);
        assert_eq!(config.spectrum.bars_per_channel, 20);
        assert_eq!(config.stream.framerate, 29.97);
        assert!(config.output.stereo);
        assert!(config.output.print_cutoffs);
        assert_eq!(config.spectrum.sensitivity, SensitivityMode::Auto);
        assert!((config.spectrum.noise_reduction - 0.75).abs() < 1e-12);
        config.validate().unwrap();
    }

    #[test]
    fn long_flags_parse_enums() {
        let config = parse(&["--weighting", "uniform", "--format", "json", "--channels", "1"]);
        assert_eq!(config.weighting, Weighting::Uniform);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.stream.channels, 1);
        assert!(Cli::try_parse_from(["pcm-bars", "--format", "xml"]).is_err());
    }

    #[test]
    fn rejects_non_positive_smoothing() {
        let cli = Cli::try_parse_from(["pcm-bars", "-s", "0"]).unwrap();
        assert!(cli.resolve_config().is_err());
    }

    #[test]
    fn slow_sample_rates_work_with_default_cutoffs() {
        let config = parse(&["--rate", "16000"]);
        config.validate().unwrap();
        assert_eq!(config.spectrum.high_cutoff, None);

        let config = parse(&["--rate", "16000", "--high-cutoff", "10000"]);
        assert_eq!(config.spectrum.high_cutoff, Some(10_000.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_bars_fail_validation() {
        let config = parse(&["-b", "1"]);
        assert!(config.validate().is_err());
    }
}
