//! Cache server
//!
//! Listens for framed TCP connections and executes decoded requests
//! against the backing store.
//!
//! ## Pipeline
//!
//! ```text
//! socket reader threads ──► inbound queue ──► per-connection decoder
//!                                                      │
//!                             writer ◄── dispatch ◄── request queue
//! ```
//!
//! Socket reader threads only append chunks to the inbound queue; they
//! never decode or touch the store, so slow handlers cannot stall the
//! transport. Each handler execution races a fixed watchdog; when the
//! watchdog wins the response is dropped and the client's timeout sweep
//! surfaces the loss.

mod dispatch;
mod session;

pub use session::Session;

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::bounded;
use parking_lot::Mutex;

use crate::bus::EventBus;
use crate::config::ServerConfig;
use crate::error::{CacheError, Result};
use crate::protocol::{decode_request, encode_response, Request, Response, StreamDecoder};
use crate::store::{CacheStore, MemoryStore};

/// Receive-side chunk size
const READ_BUF_LEN: usize = 8 * 1024;

/// Per-request handler budget; a handler that overruns it loses its
/// response
const HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

/// Inbound queue items, one producer per connection
enum SocketEvent {
    Connected(u64),
    Data(u64, Vec<u8>),
    Disconnected(u64),
}

/// A decoded request waiting for the dispatch loop
struct PendingRequest {
    connection_id: u64,
    session: Arc<Session>,
    request: Request,
}

/// Distributed cache server
pub struct CacheServer {
    config: ServerConfig,
    store: Arc<dyn CacheStore>,

    sessions: Arc<Mutex<HashMap<u64, Arc<Session>>>>,
    writers: Arc<Mutex<HashMap<u64, TcpStream>>>,
    next_connection_id: Arc<AtomicU64>,

    local_addr: Mutex<Option<SocketAddr>>,
    listening: AtomicBool,
    stop: Arc<AtomicBool>,
    threads: Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl CacheServer {
    /// Create a server over an injected backing store
    pub fn new(config: ServerConfig, store: Arc<dyn CacheStore>) -> Self {
        Self {
            config,
            store,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            writers: Arc::new(Mutex::new(HashMap::new())),
            next_connection_id: Arc::new(AtomicU64::new(1)),
            local_addr: Mutex::new(None),
            listening: AtomicBool::new(false),
            stop: Arc::new(AtomicBool::new(false)),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Create a server with the in-process [`MemoryStore`]
    pub fn with_memory_store(config: ServerConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
    }

    /// Bound address once listening (useful with port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Bind the listener and start the accept, decode, and dispatch
    /// threads. Returns immediately; the threads run until
    /// [`stop`](Self::stop).
    pub fn start(&self) -> Result<()> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(CacheError::Config("server already listening".into()));
        }

        let listener = TcpListener::bind(&self.config.listen_addr)?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock() = Some(local_addr);
        tracing::info!(%local_addr, "server listening");

        let data_bus: EventBus<SocketEvent> = EventBus::new();
        let request_bus: EventBus<PendingRequest> = EventBus::new();
        let data_tx = data_bus.sender();
        let request_tx = request_bus.sender();

        let mut threads = self.threads.lock();
        threads.push(self.spawn_accept_loop(listener, data_tx)?);
        threads.push(self.spawn_data_consumer(data_bus, request_tx)?);
        threads.push(self.spawn_dispatch_loop(request_bus)?);
        Ok(())
    }

    /// Start and block until stopped
    pub fn run(&self) -> Result<()> {
        self.start()?;
        while !self.stop.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(500));
        }
        Ok(())
    }

    /// Shut everything down: wake the accept loop, drop every
    /// connection, join the worker threads.
    pub fn stop(&self) {
        if !self.listening.swap(false, Ordering::SeqCst) {
            return;
        }
        self.stop.store(true, Ordering::SeqCst);

        // Unblock the accept loop with a throwaway connection
        if let Some(addr) = self.local_addr() {
            let _ = TcpStream::connect(addr);
        }

        // Drop the live connections so their reader threads exit
        for (_, stream) in self.writers.lock().drain() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.sessions.lock().clear();

        for handle in self.threads.lock().drain(..) {
            let _ = handle.join();
        }
        tracing::info!("server stopped");
    }

    // =========================================================================
    // Worker Threads
    // =========================================================================

    /// Accept connections and start one reader thread per connection
    fn spawn_accept_loop(
        &self,
        listener: TcpListener,
        data_tx: crossbeam::channel::Sender<SocketEvent>,
    ) -> Result<std::thread::JoinHandle<()>> {
        let stop = Arc::clone(&self.stop);
        let sessions = Arc::clone(&self.sessions);
        let writers = Arc::clone(&self.writers);
        let next_id = Arc::clone(&self.next_connection_id);
        let auto_auth = !self.config.use_credentials;

        let handle = std::thread::Builder::new()
            .name("server-accept".into())
            .spawn(move || {
                for incoming in listener.incoming() {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let stream = match incoming {
                        Ok(stream) => stream,
                        Err(e) => {
                            tracing::warn!("accept failed: {}", e);
                            continue;
                        }
                    };

                    if let Err(e) = register_connection(
                        stream,
                        &next_id,
                        auto_auth,
                        &sessions,
                        &writers,
                        &data_tx,
                        &stop,
                    ) {
                        tracing::warn!("failed to register connection: {}", e);
                    }
                }
                tracing::debug!("accept loop exited");
            })?;
        Ok(handle)
    }

    /// Inbound queue consumer: reassemble packets per connection and
    /// queue decoded requests for dispatch
    fn spawn_data_consumer(
        &self,
        data_bus: EventBus<SocketEvent>,
        request_tx: crossbeam::channel::Sender<PendingRequest>,
    ) -> Result<std::thread::JoinHandle<()>> {
        let stop = Arc::clone(&self.stop);
        let sessions = Arc::clone(&self.sessions);
        let writers = Arc::clone(&self.writers);
        let checksum = self.config.checksum;

        let handle = std::thread::Builder::new()
            .name("server-decode".into())
            .spawn(move || {
                let mut decoders: HashMap<u64, StreamDecoder> = HashMap::new();
                data_bus.consume(&stop, |event| {
                    match event {
                        SocketEvent::Connected(id) => {
                            decoders.insert(id, StreamDecoder::new(checksum));
                        }
                        SocketEvent::Disconnected(id) => {
                            decoders.remove(&id);
                            sessions.lock().remove(&id);
                            writers.lock().remove(&id);
                            tracing::debug!(connection = id, "connection closed");
                        }
                        SocketEvent::Data(id, chunk) => {
                            let session = match sessions.lock().get(&id) {
                                Some(session) => Arc::clone(session),
                                None => return Ok(()),
                            };
                            let decoder = decoders
                                .entry(id)
                                .or_insert_with(|| StreamDecoder::new(checksum));
                            decoder.feed(&chunk, |content| match decode_request(content) {
                                Ok(request) => {
                                    let _ = request_tx.send(PendingRequest {
                                        connection_id: id,
                                        session: Arc::clone(&session),
                                        request,
                                    });
                                }
                                Err(e) => {
                                    // Undecodable payloads are consumed
                                    // and dropped without a response
                                    tracing::trace!(connection = id, "dropped packet: {}", e);
                                }
                            });
                        }
                    }
                    Ok(())
                });
                tracing::debug!("decode loop exited");
            })?;
        Ok(handle)
    }

    /// Dispatch loop: route each request through its handler under the
    /// watchdog and write the response back
    fn spawn_dispatch_loop(
        &self,
        request_bus: EventBus<PendingRequest>,
    ) -> Result<std::thread::JoinHandle<()>> {
        let stop = Arc::clone(&self.stop);
        let writers = Arc::clone(&self.writers);
        let store = Arc::clone(&self.store);
        let config = Arc::new(self.config.clone());

        let handle = std::thread::Builder::new()
            .name("server-dispatch".into())
            .spawn(move || {
                request_bus.consume(&stop, |pending| {
                    log_request(&pending, config.debug);

                    let response = execute_with_watchdog(&pending, &store, &config);
                    if let Some(response) = response {
                        send_response(&writers, pending.connection_id, &response, &config);
                    }
                    Ok(())
                });
                tracing::debug!("dispatch loop exited");
            })?;
        Ok(handle)
    }
}

impl Drop for CacheServer {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Connection Plumbing
// =============================================================================

/// Set up session, writer handle, and reader thread for one accepted
/// stream
fn register_connection(
    stream: TcpStream,
    next_id: &AtomicU64,
    auto_auth: bool,
    sessions: &Mutex<HashMap<u64, Arc<Session>>>,
    writers: &Mutex<HashMap<u64, TcpStream>>,
    data_tx: &crossbeam::channel::Sender<SocketEvent>,
    stop: &Arc<AtomicBool>,
) -> Result<()> {
    let id = next_id.fetch_add(1, Ordering::Relaxed);
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    stream.set_nodelay(true)?;
    let reader = stream.try_clone()?;

    sessions.lock().insert(id, Arc::new(Session::new(id, auto_auth)));
    writers.lock().insert(id, stream);
    let _ = data_tx.send(SocketEvent::Connected(id));
    tracing::debug!(connection = id, peer = %peer, "connection established");

    let data_tx = data_tx.clone();
    let stop = Arc::clone(stop);
    std::thread::Builder::new()
        .name(format!("server-reader-{id}"))
        .spawn(move || read_loop(id, reader, data_tx, stop))?;
    Ok(())
}

/// Pump one socket into the inbound queue until it drops
fn read_loop(
    id: u64,
    mut reader: TcpStream,
    data_tx: crossbeam::channel::Sender<SocketEvent>,
    stop: Arc<AtomicBool>,
) {
    let mut buf = [0u8; READ_BUF_LEN];
    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let _ = data_tx.send(SocketEvent::Data(id, buf[..n].to_vec()));
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!(connection = id, "read error: {}", e);
                break;
            }
        }
    }
    let _ = data_tx.send(SocketEvent::Disconnected(id));
}

// =============================================================================
// Dispatch Helpers
// =============================================================================

/// Run the handler on its own thread and race it against the watchdog.
/// `None` means the watchdog won and no response may be sent.
fn execute_with_watchdog(
    pending: &PendingRequest,
    store: &Arc<dyn CacheStore>,
    config: &Arc<ServerConfig>,
) -> Option<Response> {
    let (done_tx, done_rx) = bounded(1);
    let store = Arc::clone(store);
    let session = Arc::clone(&pending.session);
    let config = Arc::clone(config);
    let request = pending.request.clone();

    let spawned = std::thread::Builder::new()
        .name("server-handler".into())
        .spawn(move || {
            let response = dispatch::handle(&request, &session, store.as_ref(), &config);
            let _ = done_tx.send(response);
        });
    if let Err(e) = spawned {
        tracing::warn!("failed to spawn handler: {}", e);
        return None;
    }

    match done_rx.recv_timeout(HANDLER_TIMEOUT) {
        Ok(response) => Some(response),
        Err(_) => {
            // Abandon the handler; the client's sweep is the backstop
            tracing::warn!(
                connection = pending.connection_id,
                identifier = pending.request.identifier,
                "handler exceeded watchdog, response dropped"
            );
            None
        }
    }
}

/// Encode and write a response to the owning connection
fn send_response(
    writers: &Mutex<HashMap<u64, TcpStream>>,
    connection_id: u64,
    response: &Response,
    config: &ServerConfig,
) {
    let packet = match encode_response(response, config.checksum) {
        Ok(packet) => packet,
        Err(e) => {
            tracing::warn!(connection = connection_id, "response encode failed: {}", e);
            return;
        }
    };

    let mut writers = writers.lock();
    if let Some(stream) = writers.get_mut(&connection_id) {
        if let Err(e) = stream.write_all(&packet) {
            tracing::debug!(connection = connection_id, "response write failed: {}", e);
        }
    }
}

/// Per-request debug line, or a sampled summary at widening boundaries
fn log_request(pending: &PendingRequest, debug: bool) {
    let count = pending.session.count_request();
    if debug {
        tracing::debug!(
            connection = pending.connection_id,
            identifier = pending.request.identifier,
            operation = ?pending.request.operation,
            key = %pending.request.key,
            "request"
        );
    } else if session::sampling_boundary(count) {
        tracing::info!(
            connection = pending.connection_id,
            requests = count,
            "connection request count"
        );
    }
}
