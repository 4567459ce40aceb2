//! Benchmarks for the nimbuscache wire protocol

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nimbuscache::protocol::{
    decode_request, encode_request, ChecksumMode, Operation, Request, StreamDecoder, HEADER_LEN,
};

fn bench_encode(c: &mut Criterion) {
    let request = Request::new(42, Operation::Set, "user:profile:42").with_value(vec![0xAB; 1024]);

    c.bench_function("encode_request_1k_crc32", |b| {
        b.iter(|| encode_request(black_box(&request), ChecksumMode::Crc32).unwrap())
    });
    c.bench_function("encode_request_1k_none", |b| {
        b.iter(|| encode_request(black_box(&request), ChecksumMode::None).unwrap())
    });
}

fn bench_decode(c: &mut Criterion) {
    let request = Request::new(42, Operation::Set, "user:profile:42").with_value(vec![0xAB; 1024]);
    let packet = encode_request(&request, ChecksumMode::Crc32).unwrap();
    let content = &packet[HEADER_LEN..packet.len() - 4];

    c.bench_function("decode_request_1k", |b| {
        b.iter(|| decode_request(black_box(content)).unwrap())
    });
}

fn bench_decoder_reassembly(c: &mut Criterion) {
    let stream: Vec<u8> = (0..100u64)
        .flat_map(|i| {
            let request = Request::new(i, Operation::Set, format!("key-{i}")).with_value(vec![0; 256]);
            encode_request(&request, ChecksumMode::Crc32).unwrap()
        })
        .collect();

    c.bench_function("stream_decode_100_packets", |b| {
        b.iter(|| {
            let mut decoder = StreamDecoder::new(ChecksumMode::Crc32);
            let mut count = 0;
            for chunk in stream.chunks(1400) {
                count += decoder.feed(black_box(chunk), |_| {});
            }
            assert_eq!(count, 100);
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_decoder_reassembly);
criterion_main!(benches);
