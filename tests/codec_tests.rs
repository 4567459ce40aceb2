//! Codec Tests
//!
//! Framing round trips and wire-format verification for the packet
//! codec.

use std::time::Duration;

use nimbuscache::protocol::{
    decode_request, decode_response, encode_request, encode_response, ChecksumMode, EntryOptions,
    Operation, Request, Response, HEADER_LEN, SYNC_MARKER,
};

/// Strip framing (sync + length) and the checksum trailer, leaving the
/// content region the stream decoder would deliver
fn strip_framing(packet: &[u8], mode: ChecksumMode) -> &[u8] {
    &packet[HEADER_LEN..packet.len() - mode.width()]
}

// =============================================================================
// Round-Trip Tests
// =============================================================================

#[test]
fn test_request_round_trip_all_checksum_modes() {
    for mode in [ChecksumMode::None, ChecksumMode::Crc16, ChecksumMode::Crc32] {
        let request = Request::new(42, Operation::Set, "user:1")
            .with_value(vec![0x00, 0x01, 0xFF, 0xFE, 0x80])
            .with_options(EntryOptions {
                absolute_expiration: Some(1_900_000_000_000),
                absolute_expiration_relative: Some(Duration::from_secs(300)),
                sliding_expiration: Some(Duration::from_secs(30)),
            });

        let packet = encode_request(&request, mode).unwrap();
        let decoded = decode_request(strip_framing(&packet, mode)).unwrap();

        assert_eq!(decoded, request, "mode {mode:?}");
    }
}

#[test]
fn test_response_round_trip_all_checksum_modes() {
    for mode in [ChecksumMode::None, ChecksumMode::Crc16, ChecksumMode::Crc32] {
        let response = Response::success(7, Operation::Get, "k", (0..=255).collect());

        let packet = encode_response(&response, mode).unwrap();
        let decoded = decode_response(strip_framing(&packet, mode)).unwrap();

        assert_eq!(decoded, response, "mode {mode:?}");
    }
}

#[test]
fn test_round_trip_empty_key_and_value() {
    let request = Request::new(1, Operation::Ping, "");
    let packet = encode_request(&request, ChecksumMode::Crc32).unwrap();
    let decoded = decode_request(strip_framing(&packet, ChecksumMode::Crc32)).unwrap();

    assert!(decoded.key.is_empty());
    assert!(decoded.value.is_empty());
    assert_eq!(decoded.options, None);
}

#[test]
fn test_failed_and_timeout_constructors() {
    let failed = Response::failed(9, "k");
    assert!(!failed.success);
    assert_eq!(failed.operation, Operation::Failed);
    assert_eq!(failed.value, vec![0x00]);

    let timeout = Response::timeout(9);
    assert!(!timeout.success);
    assert_eq!(timeout.operation, Operation::Timeout);
    assert!(timeout.value.is_empty());
}

// =============================================================================
// Wire Format Verification Tests
// =============================================================================

#[test]
fn test_wire_format_header_layout() {
    let request = Request::new(1, Operation::Get, "test");
    let packet = encode_request(&request, ChecksumMode::Crc32).unwrap();

    // [F1 F2][length LE][opcode 12 = GET]...[crc32 LE]
    assert_eq!(&packet[0..2], &SYNC_MARKER);

    let length = u32::from_le_bytes([packet[2], packet[3], packet[4], packet[5]]) as usize;
    assert_eq!(packet[6], 12);

    // Length covers opcode + payload, never the checksum region
    assert_eq!(packet.len(), HEADER_LEN + length + 4);
}

#[test]
fn test_wire_format_checksum_coverage() {
    let request = Request::new(1, Operation::Ping, "");
    let packet = encode_request(&request, ChecksumMode::Crc32).unwrap();

    let content = &packet[HEADER_LEN..packet.len() - 4];
    let trailer = &packet[packet.len() - 4..];

    // Trailer is CRC-32 over opcode + payload, little-endian
    assert_eq!(trailer, crc32fast::hash(content).to_le_bytes());
}

#[test]
fn test_wire_format_no_checksum_mode_has_no_trailer() {
    let request = Request::new(1, Operation::Ping, "");
    let packet = encode_request(&request, ChecksumMode::None).unwrap();

    let length = u32::from_le_bytes([packet[2], packet[3], packet[4], packet[5]]) as usize;
    assert_eq!(packet.len(), HEADER_LEN + length);
}

#[test]
fn test_opcode_numbering_is_stable() {
    assert_eq!(Operation::Ping as u8, 1);
    assert_eq!(Operation::Login as u8, 2);
    assert_eq!(Operation::Logout as u8, 3);
    assert_eq!(Operation::Failed as u8, 4);
    assert_eq!(Operation::Timeout as u8, 5);
    assert_eq!(Operation::Set as u8, 11);
    assert_eq!(Operation::Get as u8, 12);
    assert_eq!(Operation::Refresh as u8, 13);
    assert_eq!(Operation::Remove as u8, 14);
}

// =============================================================================
// Error Handling Tests
// =============================================================================

#[test]
fn test_unknown_opcode_is_rejected() {
    let result = decode_request(&[0xAA, 0x00, 0x00]);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Unknown opcode"));
}

#[test]
fn test_reserved_opcode_range_is_rejected() {
    for opcode in 6..=10u8 {
        assert!(decode_request(&[opcode, 0x00]).is_err());
    }
}

#[test]
fn test_truncated_content_is_rejected() {
    assert!(decode_request(&[]).is_err());
    assert!(decode_request(&[12]).is_err());
}

#[test]
fn test_garbage_body_is_a_serialization_error() {
    // Valid opcode, body that is not a bincode frame
    let result = decode_response(&[12, 0xDE, 0xAD]);
    assert!(result.is_err());
}
