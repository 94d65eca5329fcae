/// Result alias that carries the custom [`MalaError`] type.
pub type Result<T> = std::result::Result<T, MalaError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum MalaError {
    /// A negative elapsed time reached the speed classifier. This is always a
    /// programming error (or a clock that ran backwards) and is never clamped.
    #[error("elapsed time must not be negative (got {millis} ms)")]
    InvalidDuration { millis: i64 },
    /// The timing track could not be read or contained no usable entries.
    #[error("timing data unavailable: {0}")]
    TimingDataUnavailable(String),
    /// Configuration values that parse but cannot drive a session.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Malformed TOML configuration.
    #[error("{0}")]
    Config(#[from] toml::de::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Internal failures such as poisoned locks.
    #[error("{0}")]
    Message(String),
}

impl MalaError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for MalaError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for MalaError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
