//! Protocol Module
//!
//! The wire protocol for client-server communication: typed messages,
//! the packet codec, and the stream reassembler.
//!
//! ## Packet Format
//!
//! ```text
//! ┌───────────┬────────────┬───────────┬───────────┬───────────────┐
//! │ SYNC (2)  │ LENGTH (4) │ OPCODE(1) │  PAYLOAD  │ CRC (0|2|4)   │
//! └───────────┴────────────┴───────────┴───────────┴───────────────┘
//! ```
//!
//! ### Opcodes
//! - 1:  PING     - health check, 1-byte echo
//! - 2:  LOGIN    - payload: serialized session options
//! - 3:  LOGOUT   - clears session authentication
//! - 4:  FAILED   - response only: request rejected
//! - 5:  TIMEOUT  - client-synthesized, never on the wire
//! - 11: SET      - payload: key + value + expiration overrides
//! - 12: GET      - absent key answers success with empty payload
//! - 13: REFRESH  - touch without returning the value
//! - 14: REMOVE   - evict the key

mod message;
mod codec;
mod decoder;

pub use message::{EntryOptions, Operation, Request, Response, SessionOptions};
pub use codec::{
    decode_request, decode_response, encode_request, encode_response, ChecksumMode, HEADER_LEN,
    MAX_CONTENT_LEN, MIN_PACKET_LEN, SYNC_MARKER,
};
pub use decoder::StreamDecoder;
