//! Chunk-wise expression evaluation and mask scans.
//!
//! Run with: cargo bench --package carray_core

use std::sync::Arc;

use carray_codecs::{Lz4Codec, ZstdCodec};
use carray_core::{arange, eval, ArrayOptions, CArray, ScalarKind, Vars};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const LEN: usize = 1_000_000;

fn bench_polynomial(c: &mut Criterion) {
    let mut group = c.benchmark_group("eval_polynomial");
    group.throughput(Throughput::Elements(LEN as u64));

    let layouts: [(&str, ArrayOptions); 2] = [
        ("zstd", ArrayOptions::new(Arc::new(ZstdCodec))),
        ("lz4", ArrayOptions::new(Arc::new(Lz4Codec))),
    ];
    for (name, opts) in layouts {
        let x = arange(0.0, LEN as f64, 1.0, ScalarKind::Float64, &opts).unwrap();
        let vars = Vars::new().with("x", &x);
        group.bench_with_input(BenchmarkId::from_parameter(name), &vars, |b, vars| {
            b.iter(|| black_box(eval("((.25*x + .75)*x - 1.5)*x - 2", vars, &opts).unwrap()))
        });
    }
    group.finish();
}

fn bench_wheretrue(c: &mut Criterion) {
    let opts = ArrayOptions::new(Arc::new(Lz4Codec));
    let flags: Vec<bool> = (0..LEN).map(|i| i % 97 == 0).collect();
    let mask = CArray::from_slice(&flags, &opts).unwrap();

    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Elements(LEN as u64));
    group.bench_function("wheretrue", |b| {
        b.iter(|| black_box(mask.wheretrue().unwrap().count()))
    });
    group.bench_function("sequential_get", |b| {
        b.iter(|| {
            for i in (0..LEN).step_by(1000) {
                black_box(mask.get(i).unwrap());
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_polynomial, bench_wheretrue);
criterion_main!(benches);
