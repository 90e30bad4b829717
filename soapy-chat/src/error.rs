use thiserror::Error;
use tokio_tungstenite::tungstenite::{self, error::CapacityError};

use crate::registry::SessionId;

/// Every failure the relay can hit. Each one is scoped to a single
/// connection; none of them stop the process.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed or unrecognized inbound event.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Sending to one recipient failed. Swallowed by the broadcast that hit it.
    #[error("failed to deliver to session {session}: {reason}")]
    Delivery { session: SessionId, reason: String },

    #[error("inbound payload of {size} bytes exceeds the {limit} byte ceiling")]
    TransportOversize { size: usize, limit: usize },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("websocket transport error: {0}")]
    Transport(tungstenite::Error),

    #[error("failed to encode outbound event: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<tungstenite::Error> for RelayError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Capacity(CapacityError::MessageTooLong { size, max_size }) => {
                RelayError::TransportOversize {
                    size,
                    limit: max_size,
                }
            }
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                RelayError::ConnectionClosed
            }
            other => RelayError::Transport(other),
        }
    }
}

impl RelayError {
    /// Whether this is an ordinary hang-up rather than something worth a warning.
    pub fn is_closed(&self) -> bool {
        matches!(self, RelayError::ConnectionClosed)
    }
}
