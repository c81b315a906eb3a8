#![allow(clippy::unwrap_used, clippy::uninlined_format_args)]

use bytes::{Bytes, BytesMut};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use machine_protocol::core::codec::{CompressionSettings, FrameEncoder};
use machine_protocol::utils::compression::{compress, decompress_exact, DEFAULT_LEVEL};
use tokio_util::codec::Encoder;

fn bench_compression(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression");
    let sizes = [64usize, 512, 4096, 65536, 1024 * 1024];

    for &size in &sizes {
        // chunk data compresses well but not to nothing
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8 ^ (i / 1024) as u8).collect();
        group.throughput(Throughput::Bytes(size as u64));

        for level in [1u32, DEFAULT_LEVEL, 9] {
            group.bench_function(format!("zlib{}_compress_{}b", level, size), |b| {
                b.iter_batched(
                    || data.clone(),
                    |d| {
                        let _ = compress(&d, level).unwrap();
                    },
                    BatchSize::SmallInput,
                )
            });
        }

        group.bench_function(format!("zlib_decompress_{}b", size), |b| {
            let compressed = compress(&data, DEFAULT_LEVEL).unwrap();
            b.iter(|| {
                let out = decompress_exact(&compressed, data.len()).unwrap();
                assert_eq!(out.len(), data.len());
            })
        });

        group.bench_function(format!("frame_threshold_256_{}b", size), |b| {
            let mut encoder = FrameEncoder::new();
            encoder.enable_compression(CompressionSettings {
                threshold: 256,
                level: DEFAULT_LEVEL,
            });
            let body = Bytes::from(data.clone());
            let mut wire = BytesMut::with_capacity(size + 16);
            b.iter(|| {
                wire.clear();
                encoder.encode(body.clone(), &mut wire).unwrap();
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compression);
criterion_main!(benches);
