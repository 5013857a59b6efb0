//! # Epoxy connection core
//!
//! A bidirectional, framed, binary RPC transport that multiplexes
//! request/response exchanges and fire-and-forget events over a single
//! reliable byte stream. Both peers of a connection run the same
//! [`engine::Connection`] state machine; the only asymmetry between them is
//! [`message::Role`] — which side opened the channel.
//!
//! ## Frame layout
//!
//! Little-endian throughout: a frame is a `u16` framelet count followed by
//! that many framelets, each `u16 type_tag, u32 length, bytes`. See
//! [`wire`] for the codec and [`message`] for what goes inside the framelet
//! bodies this crate defines (`EpoxyHeaders`, `ProtocolError`, `ErrorRecord`).
//!
//! ## Layout
//!
//! - [`wire`] — frame/framelet encode and decode.
//! - [`message`] — headers, error records, conversation-id allocation, metrics.
//! - [`classify`] — pure frame-to-disposition classifier.
//! - [`correlator`] — pending-request map keyed by conversation id.
//! - [`socket`] — read/write-split `TcpStream` wrapper with idempotent shutdown.
//! - [`hooks`] — the `ServiceHost`, `LayerStack`, `ListenerHooks`, `MetricsSink`
//!   trait seams for collaborators this crate does not own.
//! - [`config`] — `ParameterSettings`.
//! - [`error`] — `EpoxyError`.
//! - [`engine`] — the connection state machine itself.
//!
//! ## Getting connected
//!
//! The connection engine consumes an already-connected `TcpStream`; it never
//! opens sockets itself. [`connect`] and [`Acceptor`] are thin convenience
//! wrappers over `std::net` for callers who don't already have their own
//! listener/connector — they own no retry or backoff policy, and a caller
//! is free to substitute their own stream source.
//!
//! ```no_run
//! use epoxy_core::{connect, engine::{Connection, ConnectionOptions}, message::Role};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = connect("127.0.0.1:9000", Duration::from_secs(5))?;
//! let connection = Connection::new(stream, Role::Client, ConnectionOptions::default())?;
//! connection.start()?;
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod correlator;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod message;
pub mod socket;
pub mod wire;

use std::io;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

pub use config::ParameterSettings;
pub use engine::{Connection, ConnectionOptions, ConnectionState};
pub use error::EpoxyError;
pub use message::{Message, Role};

/// ### CONNECT
///
/// Resolves `addr` and opens a TCP connection with `timeout`, mirroring the
/// connector collaborator's job (without owning any retry/backoff policy).
/// Hand the resulting stream to [`Connection::new`] with [`Role::Client`].
pub fn connect(addr: impl ToSocketAddrs, timeout: Duration) -> io::Result<TcpStream> {
    let addr = addr
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "address did not resolve"))?;
    TcpStream::connect_timeout(&addr, timeout)
}

/// ### ACCEPTOR
///
/// A thin wrapper over `TcpListener` that yields one stream per
/// [`Acceptor::accept_one`]. Hand each resulting stream to [`Connection::new`]
/// with [`Role::Server`].
pub struct Acceptor {
    listener: TcpListener,
}

impl Acceptor {
    pub fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
        })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Blocks until a peer connects, returning the raw stream. Accepting and
    /// constructing/starting the `Connection` are separate steps so a caller
    /// can run one `Acceptor` per listening socket while spawning one
    /// `Connection`/engine thread per accepted peer.
    pub fn accept_one(&self) -> io::Result<TcpStream> {
        Ok(self.listener.accept()?.0)
    }
}

// `connect`/`Acceptor` are exercised end-to-end, alongside `Connection`, by
// the loopback integration tests under tests/.
