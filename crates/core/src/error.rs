/// Result alias that carries the custom [`PcmBarsError`] type.
pub type Result<T> = std::result::Result<T, PcmBarsError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum PcmBarsError {
    /// A stream, transform or output setting is out of range. Raised before
    /// any frame is processed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The spectrum transform rejected a call at runtime.
    #[error("spectrum transform: {0}")]
    Transform(String),
    #[error("fft: {0}")]
    Fft(#[from] realfft::FftError),
    /// Reading the PCM input failed. Kept apart from [`PcmBarsError::Io`] so
    /// callers can tell a failed read from a failed write.
    #[error("failed to read input: {0}")]
    Read(#[source] std::io::Error),
    /// Wrapper around standard IO errors (file setup, output sink).
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed configuration file.
    #[error("config file: {0}")]
    Config(#[from] serde_json::Error),
}

impl PcmBarsError {
    /// Creates a configuration error from the provided message.
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
