//! Wire codec
//!
//! Packet assembly and parsing for the framed protocol.
//!
//! ## Packet Format
//!
//! ```text
//! ┌───────────┬────────────┬───────────┬───────────┬───────────────┐
//! │ SYNC (2)  │ LENGTH (4) │ OPCODE(1) │  PAYLOAD  │ CRC (0|2|4)   │
//! └───────────┴────────────┴───────────┴───────────┴───────────────┘
//! ```
//!
//! - SYNC is the fixed marker `F1 F2`
//! - LENGTH is little-endian and covers `OPCODE + PAYLOAD` only; the
//!   checksum region is never counted
//! - PAYLOAD is the bincode-serialized message body
//! - CRC is computed over `OPCODE + PAYLOAD` and appended little-endian;
//!   its width is fixed out-of-band on both ends

use serde::{Deserialize, Serialize};

use super::{EntryOptions, Operation, Request, Response};
use crate::error::{CacheError, Result};

/// Fixed two-byte packet marker
pub const SYNC_MARKER: [u8; 2] = [0xF1, 0xF2];

/// Sync marker + length field
pub const HEADER_LEN: usize = 6;

/// Smallest well-formed packet: sync(2) + length(4) + opcode(1) + one
/// payload byte, with checksumming disabled
pub const MIN_PACKET_LEN: usize = 8;

/// Upper bound on the LENGTH field (16 MB); anything larger is treated
/// as stream corruption
pub const MAX_CONTENT_LEN: usize = 16 * 1024 * 1024;

/// Packet integrity mode, agreed out-of-band by both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumMode {
    /// No trailer
    None,
    /// CRC-16/ARC, 2-byte trailer
    Crc16,
    /// CRC-32 (IEEE), 4-byte trailer
    #[default]
    Crc32,
}

impl ChecksumMode {
    /// Width of the checksum trailer in bytes
    pub fn width(&self) -> usize {
        match self {
            ChecksumMode::None => 0,
            ChecksumMode::Crc16 => 2,
            ChecksumMode::Crc32 => 4,
        }
    }

    /// Compute the trailer for `content` (`opcode + payload`)
    pub fn compute(&self, content: &[u8]) -> Vec<u8> {
        match self {
            ChecksumMode::None => Vec::new(),
            ChecksumMode::Crc16 => crc16(content).to_le_bytes().to_vec(),
            ChecksumMode::Crc32 => crc32fast::hash(content).to_le_bytes().to_vec(),
        }
    }

    /// Verify a trailer against `content`
    pub fn verify(&self, content: &[u8], trailer: &[u8]) -> bool {
        match self {
            ChecksumMode::None => true,
            ChecksumMode::Crc16 => {
                trailer.len() == 2 && crc16(content) == u16::from_le_bytes([trailer[0], trailer[1]])
            }
            ChecksumMode::Crc32 => {
                trailer.len() == 4
                    && crc32fast::hash(content)
                        == u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]])
            }
        }
    }
}

/// CRC-16/ARC (reflected polynomial 0xA001, zero init)
fn crc16(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in bytes {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

// =============================================================================
// Serialized body frames
// =============================================================================

/// On-wire body of a request; the operation travels as the opcode byte
#[derive(Serialize, Deserialize)]
struct RequestFrame {
    identifier: u64,
    key: String,
    value: Vec<u8>,
    options: Option<EntryOptions>,
}

/// On-wire body of a response
#[derive(Serialize, Deserialize)]
struct ResponseFrame {
    identifier: u64,
    key: String,
    value: Vec<u8>,
    success: bool,
}

// =============================================================================
// Encoding
// =============================================================================

/// Frame `opcode + body` into a complete packet
fn assemble(opcode: u8, body: &[u8], mode: ChecksumMode) -> Vec<u8> {
    let content_len = 1 + body.len();
    let mut packet = Vec::with_capacity(HEADER_LEN + content_len + mode.width());
    packet.extend_from_slice(&SYNC_MARKER);
    packet.extend_from_slice(&(content_len as u32).to_le_bytes());
    packet.push(opcode);
    packet.extend_from_slice(body);

    // Trailer covers opcode + payload, not the framing header
    let trailer = mode.compute(&packet[HEADER_LEN..]);
    packet.extend_from_slice(&trailer);
    packet
}

/// Encode a request into a framed packet
pub fn encode_request(request: &Request, mode: ChecksumMode) -> Result<Vec<u8>> {
    let frame = RequestFrame {
        identifier: request.identifier,
        key: request.key.clone(),
        value: request.value.clone(),
        options: request.options.clone(),
    };
    let body = bincode::serialize(&frame).map_err(|e| CacheError::Serialization(e.to_string()))?;
    Ok(assemble(request.operation as u8, &body, mode))
}

/// Encode a response into a framed packet
pub fn encode_response(response: &Response, mode: ChecksumMode) -> Result<Vec<u8>> {
    let frame = ResponseFrame {
        identifier: response.identifier,
        key: response.key.clone(),
        value: response.value.clone(),
        success: response.success,
    };
    let body = bincode::serialize(&frame).map_err(|e| CacheError::Serialization(e.to_string()))?;
    Ok(assemble(response.operation as u8, &body, mode))
}

// =============================================================================
// Decoding
// =============================================================================

/// Split verified content bytes into opcode + body
fn split_content(content: &[u8]) -> Result<(Operation, &[u8])> {
    if content.len() < 2 {
        return Err(CacheError::Frame(format!(
            "Content too short: {} bytes",
            content.len()
        )));
    }
    let operation = Operation::from_opcode(content[0])
        .ok_or_else(|| CacheError::Frame(format!("Unknown opcode: 0x{:02x}", content[0])))?;
    Ok((operation, &content[1..]))
}

/// Decode a request from verified content bytes (framing already
/// stripped and checked by the stream decoder)
pub fn decode_request(content: &[u8]) -> Result<Request> {
    let (operation, body) = split_content(content)?;
    let frame: RequestFrame =
        bincode::deserialize(body).map_err(|e| CacheError::Serialization(e.to_string()))?;
    Ok(Request {
        identifier: frame.identifier,
        operation,
        key: frame.key,
        value: frame.value,
        options: frame.options,
    })
}

/// Decode a response from verified content bytes
pub fn decode_response(content: &[u8]) -> Result<Response> {
    let (operation, body) = split_content(content)?;
    let frame: ResponseFrame =
        bincode::deserialize(body).map_err(|e| CacheError::Serialization(e.to_string()))?;
    Ok(Response {
        identifier: frame.identifier,
        operation,
        key: frame.key,
        value: frame.value,
        success: frame.success,
    })
}
