//! Client transport
//!
//! The socket abstraction the client consumes: `connect`/`disconnect`/
//! `send`, with received data and connectivity changes delivered as
//! [`TransportEvent`]s on a channel. The receive path only forwards
//! chunks; it never blocks on decoding or cache I/O.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Sender;
use parking_lot::Mutex;

use crate::error::{CacheError, Result};

/// Receive-side chunk size
const READ_BUF_LEN: usize = 8 * 1024;

/// Connectivity and data events emitted by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    /// A raw chunk exactly as the socket delivered it; framing is the
    /// stream decoder's job
    Data(Vec<u8>),
}

/// Socket abstraction consumed by the client
pub trait ClientTransport: Send + Sync {
    /// Open the connection; a no-op when already connected
    fn connect(&self) -> Result<()>;

    /// Close the connection and suppress automatic reconnection
    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Write raw bytes to the peer
    fn send(&self, bytes: &[u8]) -> Result<()>;
}

/// TCP transport with a background reader thread and optional
/// fixed-interval reconnection
pub struct TcpTransport {
    inner: Arc<Inner>,
}

struct Inner {
    addr: String,
    reconnect: bool,
    reconnect_interval: Duration,
    events: Sender<TransportEvent>,

    stream: Mutex<Option<TcpStream>>,
    connected: AtomicBool,
    closing: AtomicBool,

    /// Serializes connection attempts from callers and the reconnect loop
    connect_lock: Mutex<()>,
}

impl TcpTransport {
    /// `addr` is a `host:port` string; events are published to `events`
    pub fn new(
        addr: impl Into<String>,
        reconnect: bool,
        reconnect_interval: Duration,
        events: Sender<TransportEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                addr: addr.into(),
                reconnect,
                reconnect_interval,
                events,
                stream: Mutex::new(None),
                connected: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                connect_lock: Mutex::new(()),
            }),
        }
    }
}

impl ClientTransport for TcpTransport {
    fn connect(&self) -> Result<()> {
        Inner::open(&self.inner)
    }

    fn disconnect(&self) {
        let inner = &self.inner;
        inner.closing.store(true, Ordering::SeqCst);
        if let Some(stream) = inner.stream.lock().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        inner.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn send(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = self.inner.stream.lock();
        let stream = guard.as_mut().ok_or(CacheError::NotConnected)?;
        stream.write_all(bytes)?;
        Ok(())
    }
}

impl Inner {
    fn open(this: &Arc<Inner>) -> Result<()> {
        let _guard = this.connect_lock.lock();
        if this.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let stream = TcpStream::connect(&this.addr)?;

        // Low latency for small request/response packets
        stream.set_nodelay(true)?;

        let reader = stream.try_clone()?;
        *this.stream.lock() = Some(stream);
        this.closing.store(false, Ordering::SeqCst);
        this.connected.store(true, Ordering::SeqCst);
        let _ = this.events.send(TransportEvent::Connected);

        let inner = Arc::clone(this);
        std::thread::Builder::new()
            .name("transport-reader".into())
            .spawn(move || Inner::read_loop(inner, reader))?;

        Ok(())
    }

    /// Pump the socket until EOF or error, then run the reconnect loop
    fn read_loop(this: Arc<Inner>, mut reader: TcpStream) {
        let mut buf = [0u8; READ_BUF_LEN];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    tracing::debug!(addr = %this.addr, "server closed the connection");
                    break;
                }
                Ok(n) => {
                    let _ = this.events.send(TransportEvent::Data(buf[..n].to_vec()));
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(addr = %this.addr, "read error: {}", e);
                    break;
                }
            }
        }

        this.connected.store(false, Ordering::SeqCst);
        *this.stream.lock() = None;
        let _ = this.events.send(TransportEvent::Disconnected);

        if !this.reconnect {
            return;
        }
        while !this.closing.load(Ordering::SeqCst) && !this.connected.load(Ordering::SeqCst) {
            std::thread::sleep(this.reconnect_interval);
            if this.closing.load(Ordering::SeqCst) {
                return;
            }
            match Inner::open(&this) {
                Ok(()) => return,
                Err(e) => tracing::debug!(addr = %this.addr, "reconnect attempt failed: {}", e),
            }
        }
    }
}
