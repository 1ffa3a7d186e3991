//! Benchmarks for downsampling, partitioning and in-memory export.
//!
//! Run with: `cargo bench --bench pyramid`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use volpyramid::{
    downsample, partition, ArrayVolume, CellBuffer, ExportConfig, MemorySink, PyramidWriter,
    VolumeSeries, VolumeSource,
};

/// Deterministic speckle pattern, enough structure to defeat trivial averaging.
fn test_volume(dimensions: [usize; 3]) -> ArrayVolume<u16> {
    ArrayVolume::from_fn(dimensions, |[x, y, z]| {
        ((x * 31 + y * 17 + z * 7) % 4096) as u16
    })
}

fn bench_downsample(c: &mut Criterion) {
    let volume = test_volume([256, 256, 64]);
    let mut group = c.benchmark_group("downsample");
    group.throughput(Throughput::Elements(volume.len() as u64));

    for factor in [[2, 2, 1], [4, 4, 2], [8, 8, 4]] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}x{}", factor[0], factor[1], factor[2])),
            &factor,
            |b, &factor| b.iter(|| downsample::<u16>(black_box(&volume), factor)),
        );
    }
    group.finish();
}

fn bench_partition_copy(c: &mut Criterion) {
    let volume = test_volume([256, 256, 64]);
    let mut group = c.benchmark_group("partition_copy");
    group.throughput(Throughput::Elements(volume.len() as u64));

    for shape in [[32, 32, 4], [16, 16, 8], [64, 64, 64]] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}x{}", shape[0], shape[1], shape[2])),
            &shape,
            |b, &shape| {
                b.iter(|| {
                    let grid = partition(volume.dimensions(), shape).unwrap();
                    let mut total = 0;
                    for cell in &grid {
                        let mut buffer = CellBuffer::with_capacity::<u16>(cell.num_voxels());
                        volume.copy_cell(&cell, &mut buffer);
                        total += buffer.len();
                    }
                    black_box(total)
                })
            },
        );
    }
    group.finish();
}

fn bench_export(c: &mut Criterion) {
    let volume = test_volume([128, 128, 32]);
    let config = ExportConfig::default();

    c.bench_function("export_memory_sink", |b| {
        b.iter(|| {
            let mut source = VolumeSeries::single(volume.clone());
            let mut writer = PyramidWriter::new(MemorySink::new(), config.clone());
            black_box(writer.export(&mut source).unwrap())
        })
    });
}

criterion_group!(benches, bench_downsample, bench_partition_copy, bench_export);
criterion_main!(benches);
