//! Error types for the flashai-offline library.

use thiserror::Error;

/// Errors that can occur while running the offline agent.
#[derive(Error, Debug)]
pub enum Error {
    /// No response could be obtained from the network.
    #[error("Network error: {0}")]
    Network(String),

    /// The network answered, but not with a 2xx status.
    #[error("Unexpected status {status} for {url}")]
    Status {
        /// Absolute URL that was requested.
        url: String,
        /// HTTP status code of the response.
        status: u16,
    },

    /// A cache store operation failed.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration is missing or invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A path or URL could not be resolved against the origin.
    #[error("Invalid URL {url}: {reason}")]
    Url {
        /// The offending input.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing failed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Returns true if this error means no response was obtainable at all.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Http(_))
    }
}

/// A specialized `Result` type for flashai-offline operations.
pub type Result<T> = std::result::Result<T, Error>;
