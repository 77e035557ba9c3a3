//! Error types for dotmesh

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Parse failure: {0}")]
    Parse(String),

    #[error("Invalid template {name}: {reason}")]
    InvalidTemplate { name: String, reason: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Daemon rejected config: HTTP {status}: {body}")]
    ApplyRejected { status: u16, body: String },

    #[error("Apply failed: {0}")]
    Apply(String),

    #[error("Restart failed: {0}")]
    Restart(String),
}

impl Error {
    /// True for failures of a required upstream input (registry or daemon read)
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::UpstreamUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
