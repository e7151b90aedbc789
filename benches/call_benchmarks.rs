//! Call overhead benchmarks against the in-process engine.
//!
//! Compares the two calling conventions on the same engine method, plus the
//! codec costs that dominate the variant path:
//! - Pointer calls through a cached method bind
//! - Variant calls by name through `Object::call`
//! - String and variant conversions

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use extbind::frame::{self, CallFrame};
use extbind::prelude::*;
use std::hint::black_box;

#[path = "../tests/common/mod.rs"]
mod common;

use common::ValueBuffer;

fn call_conventions(c: &mut Criterion) {
    common::init();
    let buffer = Owned::<ValueBuffer>::construct().unwrap();
    let append = extbind::method_bind!("ValueBuffer", "append").unwrap();
    let size = extbind::method_bind!("ValueBuffer", "size").unwrap();

    let mut group = c.benchmark_group("calls/append");
    group.throughput(Throughput::Elements(1));

    group.bench_function("ptrcall", |b| {
        b.iter(|| frame::ptrcall::<_, ()>(append, buffer.raw(), (black_box(1.0f64),)).unwrap());
    });

    group.bench_function("frame", |b| {
        b.iter(|| {
            let mut frame = CallFrame::new();
            frame.arg(black_box(1.0f64));
            frame.invoke(append, buffer.raw()).unwrap();
            frame.free();
        });
    });

    let arg = [Variant::from(&1.0f64)];
    group.bench_function("varcall", |b| {
        b.iter(|| buffer.call("append", black_box(&arg)).unwrap());
    });
    group.finish();

    let mut group = c.benchmark_group("calls/size");
    group.bench_function("ptrcall", |b| {
        b.iter(|| black_box(frame::ptrcall::<_, i64>(size, buffer.raw(), ()).unwrap()));
    });
    group.bench_function("varcall", |b| {
        b.iter(|| black_box(buffer.call("size", &[]).unwrap()));
    });
    group.finish();
}

fn codec(c: &mut Criterion) {
    common::init();
    let mut group = c.benchmark_group("codec/string");
    for len in [8usize, 256, 4096] {
        let text = "αβγ".repeat(len / 6 + 1);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("to_variant", len), &text, |b, text| {
            b.iter(|| black_box(Variant::from(text.as_str())));
        });
        let variant = Variant::from(text.as_str());
        group.bench_with_input(BenchmarkId::new("from_variant", len), &variant, |b, variant| {
            b.iter(|| black_box(variant.to::<String>().unwrap()));
        });
    }
    group.finish();

    let mut group = c.benchmark_group("codec/names");
    group.bench_function("intern_existing", |b| {
        let _keep = StringName::new("emit_signal");
        b.iter(|| black_box(StringName::new(black_box("emit_signal"))));
    });
    group.finish();
}

criterion_group!(benches, call_conventions, codec);
criterion_main!(benches);
