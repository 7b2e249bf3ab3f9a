//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while decoding client traffic.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid entity id: {0:?}")]
    InvalidEntityId(String),

    #[error("Non-finite coordinates ({x}, {y})")]
    NonFinitePosition { x: f64, y: f64 },
}
