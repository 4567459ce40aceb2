//! Message definitions
//!
//! Typed requests and responses exchanged between client and server,
//! plus the option payloads they carry.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Wire operation codes
///
/// The numbering is a protocol constant shared by both ends; 6..=10 are
/// reserved and never assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Operation {
    Ping = 1,
    Login = 2,
    Logout = 3,
    Failed = 4,
    Timeout = 5,

    Set = 11,
    Get = 12,
    Refresh = 13,
    Remove = 14,
}

impl Operation {
    /// Map a wire opcode byte back to an operation
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            1 => Some(Operation::Ping),
            2 => Some(Operation::Login),
            3 => Some(Operation::Logout),
            4 => Some(Operation::Failed),
            5 => Some(Operation::Timeout),
            11 => Some(Operation::Set),
            12 => Some(Operation::Get),
            13 => Some(Operation::Refresh),
            14 => Some(Operation::Remove),
            _ => None,
        }
    }

    /// Operations that touch the backing store and require an
    /// authenticated session
    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            Operation::Set | Operation::Get | Operation::Refresh | Operation::Remove
        )
    }
}

/// Expiration policy attached to a cache entry
///
/// At most a policy-defined subset applies; unset fields fall back to the
/// session defaults bound at login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOptions {
    /// Absolute expiration instant, unix milliseconds
    pub absolute_expiration: Option<u64>,

    /// Absolute expiration relative to the moment of the Set
    pub absolute_expiration_relative: Option<Duration>,

    /// Sliding window reset on each access
    pub sliding_expiration: Option<Duration>,
}

impl EntryOptions {
    /// Overlay these options on a set of defaults, field by field
    ///
    /// A field set on `self` wins; an unset field inherits the default.
    pub fn or_defaults(&self, defaults: &EntryOptions) -> EntryOptions {
        EntryOptions {
            absolute_expiration: self.absolute_expiration.or(defaults.absolute_expiration),
            absolute_expiration_relative: self
                .absolute_expiration_relative
                .or(defaults.absolute_expiration_relative),
            sliding_expiration: self.sliding_expiration.or(defaults.sliding_expiration),
        }
    }

    /// True if no field is set
    pub fn is_empty(&self) -> bool {
        self.absolute_expiration.is_none()
            && self.absolute_expiration_relative.is_none()
            && self.sliding_expiration.is_none()
    }
}

/// Session options carried by a Login request and bound to the
/// server-side session on success
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub username: String,
    pub password: String,

    /// Tenant instance namespace; non-empty values prefix every cache key
    pub instance: String,

    /// Compression preference (carried, not negotiated)
    pub use_compression: bool,

    /// Default expiration policy for Sets without explicit options
    pub defaults: EntryOptions,
}

impl SessionOptions {
    /// Serialize into a Login request payload
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| crate::CacheError::Serialization(e.to_string()))
    }

    /// Deserialize from a Login request payload
    pub fn decode(bytes: &[u8]) -> crate::Result<Self> {
        bincode::deserialize(bytes).map_err(|e| crate::CacheError::Serialization(e.to_string()))
    }
}

/// A request from client to server
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Monotonically assigned by the client; unique among in-flight
    /// calls on the connection
    pub identifier: u64,

    pub operation: Operation,

    pub key: String,

    pub value: Vec<u8>,

    /// Per-request expiration overrides (Set only)
    pub options: Option<EntryOptions>,
}

impl Request {
    pub fn new(identifier: u64, operation: Operation, key: impl Into<String>) -> Self {
        Self {
            identifier,
            operation,
            key: key.into(),
            value: Vec::new(),
            options: None,
        }
    }

    pub fn with_value(mut self, value: Vec<u8>) -> Self {
        self.value = value;
        self
    }

    pub fn with_options(mut self, options: EntryOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// A response from server to client
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Echoes the request identifier
    pub identifier: u64,

    pub operation: Operation,

    pub key: String,

    pub value: Vec<u8>,

    pub success: bool,
}

impl Response {
    /// Acknowledgement payload for operations without a data result
    pub const ACK: [u8; 1] = [0x01];

    /// Payload carried by Failed responses
    pub const NACK: [u8; 1] = [0x00];

    /// Successful response echoing the request operation
    pub fn success(identifier: u64, operation: Operation, key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            identifier,
            operation,
            key: key.into(),
            value,
            success: true,
        }
    }

    /// Rejection: the request was refused without touching the store
    pub fn failed(identifier: u64, key: impl Into<String>) -> Self {
        Self {
            identifier,
            operation: Operation::Failed,
            key: key.into(),
            value: Self::NACK.to_vec(),
            success: false,
        }
    }

    /// Synthetic response produced by the client-side timeout sweep;
    /// never travels the wire
    pub fn timeout(identifier: u64) -> Self {
        Self {
            identifier,
            operation: Operation::Timeout,
            key: String::new(),
            value: Vec::new(),
            success: false,
        }
    }
}
