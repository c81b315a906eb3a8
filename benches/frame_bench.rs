use bytes::{Bytes, BytesMut};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use machine_protocol::core::codec::{CompressionSettings, FrameCodec, FrameDecoder, FrameEncoder};
use machine_protocol::protocol::packets::{ClientboundPacket, KeepAlive, ServerboundPacket};
use machine_protocol::protocol::{ConnectionState, PacketCatalogue};
use machine_protocol::utils::compression::DEFAULT_LEVEL;
use machine_protocol::utils::crypto::{CipherSession, SharedSecret};
use tokio_util::codec::{Decoder, Encoder};

const SETTINGS: CompressionSettings = CompressionSettings {
    threshold: 256,
    level: DEFAULT_LEVEL,
};

/// A sender/receiver pair with compression and the cipher switched on.
#[allow(clippy::unwrap_used)]
fn secured_pair() -> (FrameCodec, FrameCodec) {
    let secret = SharedSecret::from_slice(&[0x5A; 16]).unwrap();
    let mut sender = FrameCodec::default();
    let mut receiver = FrameCodec::default();
    let (enc, dec) = CipherSession::new(&secret).unwrap().split();
    sender.enable_encryption(enc, dec);
    let (enc, dec) = CipherSession::new(&secret).unwrap().split();
    receiver.enable_encryption(enc, dec);
    sender.enable_compression(SETTINGS);
    receiver.enable_compression(SETTINGS.threshold);
    (sender, receiver)
}

#[allow(clippy::unwrap_used)]
fn bench_frame_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode_decode");
    let body_sizes = [64usize, 512, 4096, 65536, 1024 * 1024];

    for &size in &body_sizes {
        let body = Bytes::from(vec![0x42u8; size]);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("plain_encode_{size}b"), |b| {
            let mut encoder = FrameEncoder::new();
            b.iter_batched(
                || BytesMut::with_capacity(size + 8),
                |mut buf| encoder.encode(body.clone(), &mut buf).unwrap(),
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("plain_decode_{size}b"), |b| {
            let mut wire = BytesMut::new();
            FrameEncoder::new().encode(body.clone(), &mut wire).unwrap();
            let mut decoder = FrameDecoder::new(usize::MAX);
            b.iter_batched(
                || wire.clone(),
                |mut buf| {
                    let frame = decoder.decode(&mut buf).unwrap();
                    assert!(frame.is_some());
                },
                BatchSize::SmallInput,
            )
        });

        // the cipher state runs on, so each iteration has to encode and decode in lockstep
        group.bench_function(format!("secured_roundtrip_{size}b"), |b| {
            let (mut sender, mut receiver) = secured_pair();
            let mut buf = BytesMut::with_capacity(size + 16);
            b.iter(|| {
                sender.encode(body.clone(), &mut buf).unwrap();
                let frame = receiver.decode(&mut buf).unwrap().unwrap();
                assert_eq!(frame.len(), size);
            })
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_catalogue(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalogue");
    let catalogue = PacketCatalogue::standard().unwrap();

    group.bench_function("encode_keep_alive", |b| {
        let packet = ClientboundPacket::from(KeepAlive { id: 0x1234_5678 });
        b.iter(|| catalogue.encode_clientbound(ConnectionState::Play, &packet).unwrap())
    });

    group.bench_function("decode_keep_alive", |b| {
        let body = catalogue
            .encode_serverbound(
                ConnectionState::Play,
                &ServerboundPacket::from(KeepAlive { id: 0x1234_5678 }),
            )
            .unwrap();
        b.iter(|| catalogue.decode_serverbound(ConnectionState::Play, body.clone()).unwrap())
    });

    group.bench_function("decode_raw_passthrough", |b| {
        let body = Bytes::from(vec![0x7Fu8; 256]);
        b.iter(|| catalogue.decode_serverbound(ConnectionState::Play, body.clone()).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_frame_encode_decode, bench_catalogue);
criterion_main!(benches);
