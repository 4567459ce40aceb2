//! # nimbuscache
//!
//! A distributed in-memory cache over a private framed TCP protocol:
//! - Binary packet framing with selectable CRC-16/CRC-32 integrity
//! - Resyncing stream reassembly tolerant of fragmentation and garbage
//! - Client-side request/response correlation with per-call timeouts
//! - Authenticated per-connection sessions with tenant namespacing
//! - Automatic reconnection and login
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐ framed packets  ┌─────────────────────────────────┐
//! │  CacheClient │ ───────────────►│           CacheServer           │
//! │              │                 │                                 │
//! │ correlation  │                 │ reader threads ─► inbound queue │
//! │ table + sweep│◄─────────────── │   decoder ─► dispatch ─► store  │
//! └──────────────┘    responses    └─────────────────────────────────┘
//! ```
//!
//! Both ends share the same pipeline shape: socket callbacks only append
//! chunks to an inbound queue; a dedicated consumer reassembles packets
//! and hands them on, so transport I/O never waits on processing.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod bus;
pub mod store;
pub mod transport;
pub mod client;
pub mod server;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CacheError, Result};
pub use config::{ClientConfig, Credential, ServerConfig};
pub use client::{CacheClient, ConnectionState};
pub use server::CacheServer;
pub use store::{CacheStore, MemoryStore};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of nimbuscache
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
