//! # ERROR HANDLING

use crate::message::{ErrorRecord, ProtocolErrorCode};
use crate::wire::FramingError;

/// ## EPOXY ERROR
///
/// Everything a caller of [`crate::engine::Connection`] can observe. Internal
/// bookkeeping (which `ConnectionState` a protocol violation was captured in,
/// etc.) lives on `Connection` itself, not in this enum.
#[derive(Debug, thiserror::Error)]
pub enum EpoxyError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("local protocol violation: {code:?}")]
    ProtocolViolation { code: ProtocolErrorCode },

    #[error("peer reported protocol error: {code:?}: {details:?}")]
    PeerProtocolError {
        code: ProtocolErrorCode,
        details: Option<ErrorRecord>,
    },

    #[error("connection rejected by peer during handshake: {details:?}")]
    HandshakeRejected { details: Option<ErrorRecord> },

    #[error("operation requires the connection to be in state {expected}")]
    WrongState { expected: &'static str },

    #[error("conversation id space exhausted")]
    ConversationIdsExhausted,

    #[error("request timed out waiting for a response")]
    Timeout,

    #[error("connection is shutting down")]
    Disconnected,
}
