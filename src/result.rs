use thiserror::Error;

/// Error that can happen when creating a [`SampleSource`](crate::SampleSource)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SourceError {
    /// A sample needs at least one frame of data
    #[error("Sample data is empty")]
    Empty,
    /// The loop region doesn't fit into the sample data
    #[error("Loop region {start}+{len} exceeds sample length {total}")]
    LoopOutOfBounds {
        /// First sample of the loop
        start: u32,
        /// Number of samples in the loop
        len: u32,
        /// Number of samples in the data
        total: usize,
    },
    /// 16 bit PCM data needs an even number of bytes
    #[error("Odd number of bytes ({0}) in 16 bit PCM data")]
    OddPcm16Length(usize),
    /// Sample data longer than the hardware can address
    #[error("Sample data too long ({0} samples)")]
    TooLong(usize),
}

/// Error that can happen when validating or parsing a [`SynthConfig`](crate::SynthConfig)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Output sample rate outside of the supported range
    #[error("Unsupported output sample rate: {0} Hz")]
    SampleRate(u32),
    /// Interpolation name that doesn't name any mode
    #[error("Unknown interpolation mode: {0:?}")]
    UnknownInterpolation(String),
    /// Interpolation index past the last mode
    #[error("Interpolation index out of range: {0}")]
    InterpolationIndex(u8),
}

/// Result of attempting to create a sample source
pub type SourceResult<T = ()> = Result<T, SourceError>;

/// Result of attempting to validate or parse synth configuration
pub type ConfigResult<T = ()> = Result<T, ConfigError>;
