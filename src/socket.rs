//! # SOCKET ADAPTER
//!
//! Splits a `TcpStream` into a read half owned exclusively by the engine
//! thread and a write half shared (via a mutex) by every sender thread, and
//! makes shutdown idempotent under concurrent callers.

use std::io;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// ## SOCKET ADAPTER
pub struct SocketAdapter {
    stream: TcpStream,
    read_half: Mutex<TcpStream>,
    write_half: Mutex<TcpStream>,
    shut_down: AtomicBool,
}

impl SocketAdapter {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let read_half = stream.try_clone()?;
        let write_half = stream.try_clone()?;
        Ok(Self {
            stream,
            read_half: Mutex::new(read_half),
            write_half: Mutex::new(write_half),
            shut_down: AtomicBool::new(false),
        })
    }

    /// The engine thread's exclusive read handle. Nothing else ever locks
    /// `read_half`, but the mutex still exists so the type is `Sync` and a
    /// future second reader (there should never be one) would deadlock loudly
    /// rather than corrupt the stream.
    pub fn lock_read(&self) -> MutexGuard<'_, TcpStream> {
        self.read_half.lock().unwrap()
    }

    /// Acquires the single-writer lock. Any thread may call this; frames are
    /// written and flushed while holding the guard, so writes from different
    /// callers never interleave.
    pub fn lock_write(&self) -> MutexGuard<'_, TcpStream> {
        self.write_half.lock().unwrap()
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.stream.local_addr()
    }

    pub fn peer_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    /// Sets (or clears, with `None`) the OS-level read timeout on the
    /// underlying socket. `read_half` and `write_half` are `try_clone`s of
    /// the same file description, so this affects every handle, not just
    /// the one it's called through.
    pub fn set_read_timeout(&self, duration: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(duration)
    }

    /// Idempotent half-close-and-dispose. The first caller performs the real
    /// shutdown; concurrent callers observe the flag already set and return
    /// immediately. Does not wait for outstanding I/O — in-flight reads/writes
    /// surface as EOF or an `io::Error`, which the engine interprets as
    /// "disconnecting" rather than propagating as a fresh failure.
    pub fn shutdown(&self) {
        if self
            .shut_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            if let Err(error) = self.stream.shutdown(Shutdown::Both) {
                tracing::debug!(%error, "socket shutdown observed an already-closed stream");
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn loopback_pair() -> (SocketAdapter, SocketAdapter) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (
            SocketAdapter::new(client).unwrap(),
            SocketAdapter::new(server).unwrap(),
        )
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (client, _server) = loopback_pair();
        client.shutdown();
        client.shutdown();
        assert!(client.is_shut_down());
    }

    #[test]
    fn shutdown_on_one_side_surfaces_as_eof_on_the_other() {
        use std::io::Read;
        let (client, server) = loopback_pair();
        client.shutdown();
        let mut buf = [0u8; 8];
        let n = server.lock_read().read(&mut buf).unwrap();
        assert_eq!(n, 0);
    }
}
