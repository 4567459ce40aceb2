//! Configuration for nimbuscache
//!
//! Centralized client and server configuration with sensible defaults.

use std::time::Duration;

use crate::protocol::{ChecksumMode, EntryOptions};

/// A username/password pair the server accepts at login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for a [`CacheClient`](crate::CacheClient)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -------------------------------------------------------------------------
    // Connection Configuration
    // -------------------------------------------------------------------------
    /// Cache server hostname or IP
    pub host: String,

    /// Cache server port
    pub port: u16,

    /// How long to wait for the transport to come up before failing
    pub connection_timeout: Duration,

    /// Per-call deadline for request/response round trips
    pub query_timeout: Duration,

    /// Reconnect automatically after the socket drops
    pub reconnect: bool,

    /// Delay between reconnect attempts
    pub reconnect_interval: Duration,

    // -------------------------------------------------------------------------
    // Session Configuration
    // -------------------------------------------------------------------------
    /// Login username
    pub username: String,

    /// Login password
    pub password: String,

    /// Tenant instance name; non-empty values prefix every cache key
    pub instance: String,

    /// Compression preference forwarded to the server at login
    pub use_compression: bool,

    /// Default expiration policy applied when a Set carries no overrides
    pub default_options: EntryOptions,

    // -------------------------------------------------------------------------
    // Framing Configuration
    // -------------------------------------------------------------------------
    /// Packet integrity mode; must match the server's out-of-band setting
    pub checksum: ChecksumMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5566,
            connection_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(10),
            reconnect: true,
            reconnect_interval: Duration::from_secs(10),
            username: String::new(),
            password: String::new(),
            instance: String::new(),
            use_compression: true,
            default_options: EntryOptions::default(),
            checksum: ChecksumMode::Crc32,
        }
    }
}

impl ClientConfig {
    /// Create a new client config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// `host:port` string for the transport
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for ClientConfig
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the server hostname or IP
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set the per-call query timeout
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout = timeout;
        self
    }

    /// Enable or disable automatic reconnection
    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.config.reconnect = enabled;
        self
    }

    /// Set the delay between reconnect attempts
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.reconnect_interval = interval;
        self
    }

    /// Set the login credentials
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = username.into();
        self.config.password = password.into();
        self
    }

    /// Set the tenant instance name
    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.config.instance = instance.into();
        self
    }

    /// Set the compression preference
    pub fn use_compression(mut self, enabled: bool) -> Self {
        self.config.use_compression = enabled;
        self
    }

    /// Set the default expiration policy for Set operations
    pub fn default_options(mut self, options: EntryOptions) -> Self {
        self.config.default_options = options;
        self
    }

    /// Set the packet integrity mode
    pub fn checksum(mut self, mode: ChecksumMode) -> Self {
        self.config.checksum = mode;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for a [`CacheServer`](crate::CacheServer)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP listen address
    pub listen_addr: String,

    /// Require a valid credential pair at login
    pub use_credentials: bool,

    /// Accepted username/password pairs (only consulted when
    /// `use_credentials` is set)
    pub credentials: Vec<Credential>,

    /// Log every request instead of sampled summaries
    pub debug: bool,

    /// Packet integrity mode; must match the clients' out-of-band setting
    pub checksum: ChecksumMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:5566".to_string(),
            use_credentials: false,
            credentials: Vec::new(),
            debug: false,
            checksum: ChecksumMode::Crc32,
        }
    }
}

impl ServerConfig {
    /// Create a new server config builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

/// Builder for ServerConfig
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Require credential checking at login
    pub fn use_credentials(mut self, enabled: bool) -> Self {
        self.config.use_credentials = enabled;
        self
    }

    /// Add an accepted credential pair
    pub fn credential(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials.push(Credential::new(username, password));
        self
    }

    /// Enable per-request debug logging
    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    /// Set the packet integrity mode
    pub fn checksum(mut self, mode: ChecksumMode) -> Self {
        self.config.checksum = mode;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}
