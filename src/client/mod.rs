//! Cache client
//!
//! RPC facade over the framed protocol: get/set/remove/refresh against
//! a remote cache server, with per-call timeouts, automatic login, and
//! reconnection.
//!
//! ## Threads
//!
//! Construction starts two long-running threads that live for the
//! client's lifetime:
//! - the inbound consumer, draining transport events through the stream
//!   decoder and resolving the correlation table
//! - the timeout sweep, expiring overdue calls on a fixed cadence
//!
//! Every public cache operation ensures connectivity and authentication
//! before issuing its request.

mod pending;

pub use pending::{sweep_interval, CallTable, PendingReply};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::bus::EventBus;
use crate::config::ClientConfig;
use crate::error::{CacheError, Result};
use crate::protocol::{
    decode_response, encode_request, EntryOptions, Operation, Request, Response, SessionOptions,
    StreamDecoder,
};
use crate::transport::{ClientTransport, TcpTransport, TransportEvent};

/// Poll interval for connection/disconnection waits
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Extra slack on the blocking wait beyond the sweep's own deadline
const WAIT_GRACE: Duration = Duration::from_secs(1);

/// Client connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Authenticated,
}

struct Shared {
    state: Mutex<ConnectionState>,
    authenticated: AtomicBool,
}

/// Distributed cache client
pub struct CacheClient {
    config: ClientConfig,
    transport: Arc<dyn ClientTransport>,
    table: Arc<CallTable>,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
}

impl CacheClient {
    /// Create a client talking TCP to the configured server.
    ///
    /// Background threads start immediately; the connection itself is
    /// opened lazily by the first operation (or an explicit
    /// [`connect`](Self::connect)).
    pub fn new(config: ClientConfig) -> Self {
        let bus = EventBus::new();
        let transport = Arc::new(TcpTransport::new(
            config.server_addr(),
            config.reconnect,
            config.reconnect_interval,
            bus.sender(),
        ));
        Self::with_transport(config, transport, bus)
    }

    /// Create a client over an injected transport (tests, alternative
    /// sockets)
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn ClientTransport>,
        bus: EventBus<TransportEvent>,
    ) -> Self {
        let table = Arc::new(CallTable::new());
        let shared = Arc::new(Shared {
            state: Mutex::new(ConnectionState::Disconnected),
            authenticated: AtomicBool::new(false),
        });
        let stop = Arc::new(AtomicBool::new(false));

        // Inbound consumer: transport events -> decoder -> correlation
        {
            let table = Arc::clone(&table);
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            let transport = Arc::clone(&transport);
            let checksum = config.checksum;
            std::thread::Builder::new()
                .name("client-inbound".into())
                .spawn(move || {
                    let mut decoder = StreamDecoder::new(checksum);
                    bus.consume(&stop, |event| {
                        match event {
                            TransportEvent::Connected => {
                                let mut state = shared.state.lock();
                                if *state == ConnectionState::Disconnected
                                    || *state == ConnectionState::Connecting
                                {
                                    *state = ConnectionState::Connected;
                                }
                            }
                            TransportEvent::Disconnected => {
                                // The session dies with the socket; a
                                // fresh Login is always required
                                shared.authenticated.store(false, Ordering::SeqCst);
                                if !transport.is_connected() {
                                    *shared.state.lock() = ConnectionState::Disconnected;
                                    decoder.clear();
                                }
                                // In-flight calls surface through the
                                // timeout sweep
                            }
                            TransportEvent::Data(chunk) => {
                                decoder.feed(&chunk, |content| match decode_response(content) {
                                    Ok(response) => table.resolve(response),
                                    Err(e) => {
                                        tracing::trace!("undecodable response dropped: {}", e)
                                    }
                                });
                            }
                        }
                        Ok(())
                    });
                })
                .expect("spawn client-inbound thread");
        }

        // Timeout sweep
        {
            let table = Arc::clone(&table);
            let stop = Arc::clone(&stop);
            let interval = sweep_interval(config.query_timeout);
            std::thread::Builder::new()
                .name("client-sweep".into())
                .spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        std::thread::sleep(interval);
                        let expired = table.expire_due(Instant::now());
                        if expired > 0 {
                            tracing::debug!(expired, "calls resolved by timeout sweep");
                        }
                    }
                })
                .expect("spawn client-sweep thread");
        }

        Self {
            config,
            transport,
            table,
            shared,
            stop,
        }
    }

    // =========================================================================
    // Connection Lifecycle
    // =========================================================================

    /// Current state-machine position
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Open the transport; a no-op when already connected
    pub fn connect(&self) -> Result<()> {
        if self.transport.is_connected() {
            return Ok(());
        }
        *self.shared.state.lock() = ConnectionState::Connecting;
        match self.transport.connect() {
            Ok(()) => Ok(()),
            Err(e) => {
                *self.shared.state.lock() = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Poll until the transport reports connected, or fail with a
    /// connection timeout
    pub fn await_connected(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while !self.transport.is_connected() {
            if Instant::now() >= deadline {
                return Err(CacheError::ConnectionTimeout);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    /// Close the transport and forget the session
    pub fn disconnect(&self) {
        self.transport.disconnect();
        self.shared.authenticated.store(false, Ordering::SeqCst);
        *self.shared.state.lock() = ConnectionState::Disconnected;
    }

    /// Disconnect, wait for the drop to land, connect and
    /// re-authenticate
    pub fn reconnect(&self) -> Result<()> {
        self.disconnect();

        let deadline = Instant::now() + self.config.connection_timeout;
        while self.transport.is_connected() && Instant::now() < deadline {
            std::thread::sleep(POLL_INTERVAL);
        }

        self.ensure_session()
    }

    /// Make sure the transport is up and the session authenticated
    fn ensure_session(&self) -> Result<()> {
        if !self.transport.is_connected() {
            self.connect()?;
            self.await_connected(self.config.connection_timeout)?;
        }
        if !self.shared.authenticated.load(Ordering::SeqCst) {
            self.login()?;
        }
        Ok(())
    }

    /// Authenticate the connection with the configured credentials and
    /// bind the session options server-side
    pub fn login(&self) -> Result<()> {
        *self.shared.state.lock() = ConnectionState::Authenticating;

        let options = SessionOptions {
            username: self.config.username.clone(),
            password: self.config.password.clone(),
            instance: self.config.instance.clone(),
            use_compression: self.config.use_compression,
            defaults: self.config.default_options.clone(),
        };
        let payload = options.encode()?;

        let response = self.call(Operation::Login, String::new(), payload, None)?;
        if let Err(e) = interpret(response) {
            *self.shared.state.lock() = ConnectionState::Connected;
            return Err(e);
        }

        self.shared.authenticated.store(true, Ordering::SeqCst);
        *self.shared.state.lock() = ConnectionState::Authenticated;
        tracing::debug!("session authenticated");
        Ok(())
    }

    /// Clear the server-side session authentication
    pub fn logout(&self) -> Result<()> {
        let response = self.call(Operation::Logout, String::new(), Vec::new(), None)?;
        self.shared.authenticated.store(false, Ordering::SeqCst);
        *self.shared.state.lock() = ConnectionState::Connected;
        interpret(response).map(|_| ())
    }

    // =========================================================================
    // Cache Operations
    // =========================================================================

    /// Health check round trip
    pub fn ping(&self) -> Result<()> {
        self.ensure_session()?;
        interpret(self.call(Operation::Ping, String::new(), Vec::new(), None)?).map(|_| ())
    }

    /// Fetch the value at `key`. An absent key yields an empty vec.
    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.ensure_session()?;
        interpret(self.call(Operation::Get, key.to_string(), Vec::new(), None)?)
            .map(|response| response.value)
    }

    /// Store `value` under `key` with the configured default expiration
    /// policy
    pub fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.set_with_options(key, value, EntryOptions::default())
    }

    /// Store `value` under `key`; set fields in `options` override the
    /// session defaults field by field
    pub fn set_with_options(&self, key: &str, value: Vec<u8>, options: EntryOptions) -> Result<()> {
        self.ensure_session()?;
        interpret(self.call(Operation::Set, key.to_string(), value, Some(options))?).map(|_| ())
    }

    /// Touch `key`, extending a sliding expiration without fetching the
    /// value
    pub fn refresh(&self, key: &str) -> Result<()> {
        self.ensure_session()?;
        interpret(self.call(Operation::Refresh, key.to_string(), Vec::new(), None)?).map(|_| ())
    }

    /// Evict `key`
    pub fn remove(&self, key: &str) -> Result<()> {
        self.ensure_session()?;
        interpret(self.call(Operation::Remove, key.to_string(), Vec::new(), None)?).map(|_| ())
    }

    // =========================================================================
    // Low-level Request Plumbing
    // =========================================================================

    /// Register and transmit a request, returning the handle the caller
    /// blocks on. The deadline stretches to cover connection
    /// establishment when the transport is still down.
    pub fn request(
        &self,
        operation: Operation,
        key: String,
        value: Vec<u8>,
        options: Option<EntryOptions>,
    ) -> Result<(PendingReply, Duration)> {
        let budget = if self.transport.is_connected() {
            self.config.query_timeout
        } else {
            self.config.query_timeout + self.config.connection_timeout
        };

        let identifier = self.table.next_identifier();
        let mut request = Request::new(identifier, operation, key).with_value(value);
        if let Some(options) = options {
            request = request.with_options(options);
        }

        let packet = encode_request(&request, self.config.checksum)?;
        let reply = self.table.register(request, Instant::now() + budget);

        if let Err(e) = self.transport.send(&packet) {
            self.table.cancel(identifier);
            return Err(e);
        }
        Ok((reply, budget))
    }

    /// Drop an outstanding call without resolving it
    pub fn cancel(&self, identifier: u64) {
        self.table.cancel(identifier);
    }

    /// Number of calls currently awaiting a response
    pub fn in_flight(&self) -> usize {
        self.table.in_flight()
    }

    fn call(
        &self,
        operation: Operation,
        key: String,
        value: Vec<u8>,
        options: Option<EntryOptions>,
    ) -> Result<Response> {
        let (reply, budget) = self.request(operation, key, value, options)?;
        reply.wait(budget + sweep_interval(self.config.query_timeout) + WAIT_GRACE)
    }
}

impl Drop for CacheClient {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.transport.disconnect();
    }
}

/// Map a resolved response to the caller's result
fn interpret(response: Response) -> Result<Response> {
    if response.success {
        Ok(response)
    } else if response.operation == Operation::Timeout {
        Err(CacheError::Timeout)
    } else {
        Err(CacheError::Rejected)
    }
}
