//! # CONFIGURATION
//!
//! Per-connection tunables: a framelet length cap, the connect-timeout used
//! by the `connect()` convenience helper, a handshake deadline, and an
//! optional per-request deadline. Which side opens the connection lives in
//! [`crate::message::Role`] instead of here: `connect`/`Acceptor` already
//! make that choice at the call site, so there's no separate connect-mode
//! field to keep in sync with it.

use std::time::Duration;

use crate::wire::DEFAULT_MAX_FRAMELET_LEN;

/// ## PARAMETER SETTINGS
#[derive(Clone, Debug)]
pub struct ParameterSettings {
    /// Upper bound on a single framelet body, enforced by [`crate::wire::read_frame`].
    pub max_framelet_len: u32,

    /// Deadline for `TcpStream::connect_timeout` in the [`crate::connect`]
    /// convenience helper. Not consulted by `Connection` itself, which only
    /// ever receives an already-connected stream.
    pub connect_timeout: Duration,

    /// Deadline for a peer to finish the `EpoxyConfig` handshake, armed as a
    /// socket read timeout from `start()` until the connection reaches
    /// `Connected` and cleared afterward. Without this a peer that accepts
    /// the TCP connection but never sends its `EpoxyConfig` framelet would
    /// block the engine thread forever.
    pub handshake_timeout: Duration,

    /// Deadline for `request_response` to receive its response. `None`
    /// means block indefinitely, leaving deadlines to the caller.
    pub request_timeout: Option<Duration>,
}

impl Default for ParameterSettings {
    fn default() -> Self {
        Self {
            max_framelet_len: DEFAULT_MAX_FRAMELET_LEN,
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            request_timeout: None,
        }
    }
}
