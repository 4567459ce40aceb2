//! Integration Tests
//!
//! Full client/server round trips over loopback TCP.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use nimbuscache::protocol::{
    decode_response, encode_request, ChecksumMode, EntryOptions, Operation, Request, StreamDecoder,
};
use nimbuscache::{CacheClient, CacheError, CacheServer, ClientConfig, ServerConfig};

fn start_server(
    configure: impl FnOnce(nimbuscache::config::ServerConfigBuilder) -> ServerConfig,
) -> CacheServer {
    let config = configure(ServerConfig::builder().listen_addr("127.0.0.1:0"));
    let server = CacheServer::with_memory_store(config);
    server.start().expect("server start");
    server
}

fn client_for(
    server: &CacheServer,
    configure: impl FnOnce(nimbuscache::config::ClientConfigBuilder) -> ClientConfig,
) -> CacheClient {
    let addr = server.local_addr().expect("server bound");
    let config = configure(
        ClientConfig::builder()
            .host(addr.ip().to_string())
            .port(addr.port())
            .connection_timeout(Duration::from_secs(2))
            .query_timeout(Duration::from_secs(2))
            .reconnect(false),
    );
    CacheClient::new(config)
}

// =============================================================================
// End-to-End Scenarios
// =============================================================================

#[test]
fn test_set_get_remove_round_trip() {
    let server = start_server(|b| b.build());
    let client = client_for(&server, |b| b.build());

    client.set("x", vec![1, 2, 3]).unwrap();
    assert_eq!(client.get("x").unwrap(), vec![1, 2, 3]);

    client.remove("x").unwrap();
    // Absent key answers success with an empty payload, not an error
    assert_eq!(client.get("x").unwrap(), Vec::<u8>::new());

    server.stop();
}

#[test]
fn test_ping() {
    let server = start_server(|b| b.build());
    let client = client_for(&server, |b| b.build());
    client.ping().unwrap();
    server.stop();
}

#[test]
fn test_round_trip_with_crc16_framing() {
    let server = start_server(|b| b.checksum(ChecksumMode::Crc16).build());
    let client = client_for(&server, |b| b.checksum(ChecksumMode::Crc16).build());

    client.set("k", b"crc16".to_vec()).unwrap();
    assert_eq!(client.get("k").unwrap(), b"crc16");

    server.stop();
}

#[test]
fn test_large_value_spans_many_chunks() {
    let server = start_server(|b| b.build());
    let client = client_for(&server, |b| b.build());

    // Larger than any single read buffer, forcing reassembly
    let value: Vec<u8> = (0..100_000u32).map(|i| i as u8).collect();
    client.set("big", value.clone()).unwrap();
    assert_eq!(client.get("big").unwrap(), value);

    server.stop();
}

// =============================================================================
// Authentication
// =============================================================================

#[test]
fn test_valid_credentials_unlock_operations() {
    let server = start_server(|b| {
        b.use_credentials(true)
            .credential("admin", "123456")
            .build()
    });
    let client = client_for(&server, |b| b.credentials("admin", "123456").build());

    client.set("k", b"v".to_vec()).unwrap();
    assert_eq!(client.get("k").unwrap(), b"v");

    server.stop();
}

#[test]
fn test_invalid_credentials_are_rejected() {
    let server = start_server(|b| {
        b.use_credentials(true)
            .credential("admin", "123456")
            .build()
    });
    let client = client_for(&server, |b| b.credentials("admin", "wrong").build());

    match client.get("k") {
        Err(CacheError::Rejected) => {}
        other => panic!("expected Rejected, got {other:?}"),
    }

    server.stop();
}

#[test]
fn test_unauthenticated_request_fails_without_store_effect() {
    let server = start_server(|b| {
        b.use_credentials(true)
            .credential("admin", "123456")
            .build()
    });
    let addr = server.local_addr().unwrap();

    // Raw connection, no Login: a Set must come back Failed
    let mut socket = TcpStream::connect(addr).unwrap();
    let request = Request::new(1, Operation::Set, "sneaky").with_value(b"v".to_vec());
    socket
        .write_all(&encode_request(&request, ChecksumMode::Crc32).unwrap())
        .unwrap();

    let mut decoder = StreamDecoder::new(ChecksumMode::Crc32);
    let mut buf = [0u8; 1024];
    let mut responses = Vec::new();
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    while responses.is_empty() {
        let n = socket.read(&mut buf).unwrap();
        assert!(n > 0, "server closed before responding");
        decoder.feed(&buf[..n], |content| {
            responses.push(decode_response(content).unwrap())
        });
    }

    let response = &responses[0];
    assert!(!response.success);
    assert_eq!(response.operation, Operation::Failed);
    assert_eq!(response.identifier, 1);

    // The honest client must not observe the rejected write
    let client = client_for(&server, |b| b.credentials("admin", "123456").build());
    assert_eq!(client.get("sneaky").unwrap(), Vec::<u8>::new());

    server.stop();
}

// =============================================================================
// Tenant Isolation
// =============================================================================

#[test]
fn test_instances_are_isolated() {
    let server = start_server(|b| b.build());
    let tenant_a = client_for(&server, |b| b.instance("A").build());
    let tenant_b = client_for(&server, |b| b.instance("B").build());

    tenant_a.set("k", b"secret".to_vec()).unwrap();
    assert_eq!(tenant_b.get("k").unwrap(), Vec::<u8>::new());
    assert_eq!(tenant_a.get("k").unwrap(), b"secret");

    server.stop();
}

// =============================================================================
// Timeouts
// =============================================================================

#[test]
fn test_silent_server_surfaces_query_timeout() {
    // A listener that accepts and then never answers
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let mute = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        std::thread::sleep(Duration::from_secs(2));
        drop(stream);
    });

    let config = ClientConfig::builder()
        .host(addr.ip().to_string())
        .port(addr.port())
        .connection_timeout(Duration::from_secs(1))
        .query_timeout(Duration::from_millis(300))
        .reconnect(false)
        .build();
    let client = CacheClient::new(config);

    let started = std::time::Instant::now();
    match client.ping() {
        Err(CacheError::Timeout) => {}
        other => panic!("expected Timeout, got {other:?}"),
    }
    // Resolved by the sweep within its cadence, not by the blocking
    // backstop
    assert!(started.elapsed() < Duration::from_secs(3));

    drop(client);
    mute.join().unwrap();
}

// =============================================================================
// Expiration Over the Wire
// =============================================================================

#[test]
fn test_refresh_keeps_sliding_entry_alive() {
    let server = start_server(|b| b.build());
    let client = client_for(&server, |b| b.build());

    client
        .set_with_options(
            "session",
            b"data".to_vec(),
            EntryOptions {
                sliding_expiration: Some(Duration::from_millis(400)),
                ..Default::default()
            },
        )
        .unwrap();

    // Refresh inside the window keeps the entry alive past it
    for _ in 0..3 {
        std::thread::sleep(Duration::from_millis(200));
        client.refresh("session").unwrap();
    }
    assert_eq!(client.get("session").unwrap(), b"data");

    // Without refreshes the window closes
    std::thread::sleep(Duration::from_millis(600));
    assert_eq!(client.get("session").unwrap(), Vec::<u8>::new());

    server.stop();
}

#[test]
fn test_session_default_policy_applies_to_plain_set() {
    let server = start_server(|b| b.build());
    let client = client_for(&server, |b| {
        b.default_options(EntryOptions {
            absolute_expiration_relative: Some(Duration::from_millis(200)),
            ..Default::default()
        })
        .build()
    });

    client.set("ephemeral", b"v".to_vec()).unwrap();
    assert_eq!(client.get("ephemeral").unwrap(), b"v");

    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(client.get("ephemeral").unwrap(), Vec::<u8>::new());

    server.stop();
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_reconnect_re_authenticates() {
    let server = start_server(|b| {
        b.use_credentials(true)
            .credential("admin", "123456")
            .build()
    });
    let client = client_for(&server, |b| b.credentials("admin", "123456").build());

    client.set("k", b"v".to_vec()).unwrap();
    client.reconnect().unwrap();
    assert_eq!(client.get("k").unwrap(), b"v");

    server.stop();
}

#[test]
fn test_connect_is_idempotent() {
    let server = start_server(|b| b.build());
    let client = client_for(&server, |b| b.build());

    client.connect().unwrap();
    client.await_connected(Duration::from_secs(2)).unwrap();
    client.connect().unwrap();
    client.ping().unwrap();

    server.stop();
}
