//! Stream decoder
//!
//! Stateful reassembler that turns a raw, possibly-fragmented byte
//! stream into discrete verified packets. One instance per connection;
//! the buffer is owned exclusively by the decoder and never shared.
//!
//! ## Failure policy
//!
//! - No sync marker anywhere in the buffer: the whole buffer is
//!   discarded. The stream is unrecoverable and data loss is accepted.
//! - Marker mid-buffer: bytes before it are dropped (resync).
//! - Checksum mismatch: the packet is consumed and silently dropped;
//!   the connection survives.
//! - Nonsensical length field: the whole buffer is discarded to
//!   guarantee forward progress.

use bytes::{Buf, BytesMut};

use super::codec::{ChecksumMode, HEADER_LEN, MAX_CONTENT_LEN, MIN_PACKET_LEN, SYNC_MARKER};

/// Per-connection packet reassembler
pub struct StreamDecoder {
    /// Undelivered bytes, appended on arrival and consumed from the front
    buffer: BytesMut,

    /// Integrity mode, fixed at construction
    checksum: ChecksumMode,
}

impl StreamDecoder {
    pub fn new(checksum: ChecksumMode) -> Self {
        Self {
            buffer: BytesMut::new(),
            checksum,
        }
    }

    /// Number of buffered, not-yet-consumed bytes
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop all buffered bytes (connection teardown)
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Append newly received bytes and extract every complete packet.
    ///
    /// `consume` is invoked once per verified packet with the content
    /// region (`opcode + payload`), in stream order. Returns the number
    /// of packets delivered.
    pub fn feed(&mut self, bytes: &[u8], mut consume: impl FnMut(&[u8])) -> usize {
        self.buffer.extend_from_slice(bytes);
        let mut delivered = 0;

        loop {
            // Step 1: too little data to even hold a minimal packet
            if self.buffer.len() < MIN_PACKET_LEN {
                return delivered;
            }

            // Step 2/3: locate the sync marker and resync onto it
            match find_sync(&self.buffer) {
                None => {
                    // Unrecoverable: nothing in the buffer frames a packet
                    tracing::trace!(discarded = self.buffer.len(), "no sync marker, discarding buffer");
                    self.buffer.clear();
                    return delivered;
                }
                Some(0) => {}
                Some(offset) => {
                    tracing::trace!(skipped = offset, "resyncing to marker");
                    self.buffer.advance(offset);
                    continue;
                }
            }

            // Step 4: length field, then wait for the full packet
            let length = u32::from_le_bytes([
                self.buffer[2],
                self.buffer[3],
                self.buffer[4],
                self.buffer[5],
            ]) as usize;

            if length == 0 || length > MAX_CONTENT_LEN {
                tracing::warn!(length, "implausible length field, discarding buffer");
                self.buffer.clear();
                return delivered;
            }

            let total = HEADER_LEN + length + self.checksum.width();
            if self.buffer.len() < total {
                return delivered;
            }

            // Step 5: verify and hand off the content region
            let content = &self.buffer[HEADER_LEN..HEADER_LEN + length];
            let trailer = &self.buffer[HEADER_LEN + length..total];
            if self.checksum.verify(content, trailer) {
                consume(content);
                delivered += 1;
            } else {
                tracing::debug!(length, "checksum mismatch, dropping packet");
            }

            // Step 6: consume the packet and scan for the next one
            self.buffer.advance(total);
        }
    }
}

/// Offset of the first sync marker, if any
fn find_sync(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == SYNC_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec;
    use crate::protocol::{Operation, Request};

    fn packet(mode: ChecksumMode) -> Vec<u8> {
        let request = Request::new(7, Operation::Ping, "p");
        codec::encode_request(&request, mode).unwrap()
    }

    #[test]
    fn whole_packet_single_feed() {
        let mut decoder = StreamDecoder::new(ChecksumMode::Crc32);
        let mut seen = Vec::new();
        let n = decoder.feed(&packet(ChecksumMode::Crc32), |c| seen.push(c.to_vec()));
        assert_eq!(n, 1);
        assert_eq!(seen.len(), 1);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn partial_packet_waits() {
        let bytes = packet(ChecksumMode::Crc32);
        let mut decoder = StreamDecoder::new(ChecksumMode::Crc32);
        let n = decoder.feed(&bytes[..bytes.len() - 1], |_| {});
        assert_eq!(n, 0);
        assert_eq!(decoder.buffered(), bytes.len() - 1);
    }
}
