use std::path::PathBuf;

use reqwest::header::InvalidHeaderValue;
use thiserror::Error;

/// Errors surfaced by the request bridge and the credential negotiator.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The endpoint could not be reached (DNS failure, refused connection, ...).
    #[error("end point cannot be reached: {0}")]
    Unreachable(#[source] reqwest::Error),

    /// A local file could not be opened or read while building an upload.
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("cannot decode response body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("cannot read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),

    /// Interactive input could not be read from the terminal.
    #[error("cannot read input: {0}")]
    Prompt(#[source] std::io::Error),
}

impl BridgeError {
    /// Whether the error means the remote service was never reached.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, BridgeError::Unreachable(_))
    }
}
