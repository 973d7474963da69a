use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use levin_p2p::core::codec::LevinCodec;
use levin_p2p::core::packet::{command, Packet};
use levin_p2p::core::storage::Section;
use tokio_util::codec::{Decoder, Encoder};

fn blob_packet(size: usize) -> Packet {
    Packet::request(
        command::TIMED_SYNC,
        true,
        Section::new().with("payload", vec![0u8; size]),
    )
}

#[allow(clippy::unwrap_used)]
fn bench_packet_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_encode_decode");
    let payload_sizes = [64usize, 512, 4096, 65536, 1024 * 1024];

    for &size in &payload_sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || blob_packet(size),
                |packet| {
                    let mut buf = BytesMut::with_capacity(size + 64);
                    let mut codec = LevinCodec::new(2 * 1024 * 1024);
                    codec.encode(packet, &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("decode_{size}b"), |b| {
            let wire = blob_packet(size).to_bytes().unwrap();
            b.iter_batched(
                || BytesMut::from(&wire[..]),
                |mut buf| {
                    let mut codec = LevinCodec::new(2 * 1024 * 1024);
                    let decoded = codec.decode(&mut buf).unwrap();
                    assert!(decoded.is_some());
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_packet_encode_decode);
criterion_main!(benches);
