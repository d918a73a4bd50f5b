//! Benchmarks for advertisement decoding and line protocol rendering
//!
//! Decoding runs on the radio callback path, so it has to stay well below the
//! advertisement interval of a busy environment.

use beaconbridge::decoder::decode;
use beaconbridge::storage::line_protocol::render_batch;
use beaconbridge::test_utils::{foreign_advertisement, sensor_values};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for fields in [1usize, 8, 64] {
        let values: Vec<i16> = (0..fields as i16).collect();
        let advert = sensor_values("C4:7C:8D:6A:10:01", 7, &values);
        group.throughput(Throughput::Bytes((fields * 2) as u64));
        group.bench_function(format!("recognized_{}_fields", fields), |b| {
            b.iter(|| black_box(decode(black_box(&advert))))
        });
    }

    let foreign = foreign_advertisement("C4:7C:8D:6A:10:02", &[1, 0, 2, 0]);
    group.bench_function("foreign_identifier", |b| b.iter(|| black_box(decode(black_box(&foreign)))));

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let readings: Vec<_> = (0..500)
        .filter_map(|i| decode(&sensor_values("C4:7C:8D:6A:10:01", (i % 4) as u16, &[i as i16, -1, 2])))
        .collect();

    let mut group = c.benchmark_group("line_protocol");
    group.throughput(Throughput::Elements(readings.len() as u64));
    group.bench_function("render_500_points", |b| b.iter(|| black_box(render_batch(black_box(&readings)))));
    group.finish();
}

criterion_group!(benches, bench_decode, bench_render);
criterion_main!(benches);
