//! Client -> Server message parsing.

use crate::ProtocolError;
use serde::{Deserialize, Serialize};

/// Parsed client message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Self-reported avatar position.
    Move { x: f64, y: f64 },
}

impl ClientMessage {
    /// Parse a client message from a text frame.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let message: ClientMessage = serde_json::from_str(raw)?;
        match message {
            ClientMessage::Move { x, y } if !x.is_finite() || !y.is_finite() => {
                Err(ProtocolError::NonFinitePosition { x, y })
            }
            message => Ok(message),
        }
    }
}
