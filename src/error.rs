//! Error types for remote-importer.

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
///
/// Event-path operations on the importer are one-way notifications and never
/// fail synchronously; this enum covers construction and teardown only.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected importer configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Shutdown did not drain within the grace period and worker tasks were
    /// aborted.
    #[error("shutdown forced after grace period, {aborted} worker(s) aborted")]
    ShutdownForced {
        /// Number of worker tasks that were still running when aborted.
        aborted: usize,
    },
}

impl Error {
    /// Create an invalid-configuration error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
