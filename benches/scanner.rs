//! Benchmarks for discovery and weaving.
//!
//! Measures the hot paths a load hook sees for every unit:
//! - Parsing and re-encoding a class file
//! - Building both layers of the unit model from bytes
//! - Memoized scans of an already cached unit
//! - A full pipeline pass over a unit with nothing to weave

extern crate classweave;

use classweave::prelude::*;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

/// A unit with a handful of fields, methods and markers.
fn sample_unit() -> Vec<u8> {
    let mut builder = ClassBuilder::new("com/example/Sample")
        .signature("<T:Ljava/lang/Object;>Ljava/lang/Object;")
        .annotation(AnnotationSpec::new("Lcom/example/Component;"));
    for index in 0..16 {
        builder = builder
            .field(FieldSpec::new(
                FieldAccess::PRIVATE,
                &format!("field{index}"),
                "Ljava/lang/String;",
            ))
            .method(
                MethodSpec::new(
                    MethodAccess::PUBLIC | MethodAccess::ABSTRACT,
                    &format!("method{index}"),
                    "(ILjava/lang/Object;)Ljava/lang/Object;",
                )
                .signature("(ITT;)TT;"),
            );
    }
    builder.build().unwrap()
}

fn bench_classfile_roundtrip(c: &mut Criterion) {
    let data = sample_unit();

    let mut group = c.benchmark_group("classfile");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("parse", |b| {
        b.iter(|| black_box(ClassFile::parse(black_box(&data)).unwrap()));
    });
    let parsed = ClassFile::parse(&data).unwrap();
    group.bench_function("to_bytes", |b| {
        b.iter(|| black_box(black_box(&parsed).to_bytes().unwrap()));
    });
    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let data = sample_unit();

    c.bench_function("scan_from_bytes", |b| {
        b.iter(|| black_box(ScannedUnit::from_bytes(black_box(&data)).unwrap()));
    });

    let scanner = Scanner::new(MemorySource::new().with(data).unwrap());
    let unit = UnitRef::from("com/example/Sample");
    scanner.scan(&unit).unwrap();
    c.bench_function("scan_cached", |b| {
        b.iter(|| black_box(scanner.scan(black_box(&unit)).unwrap()));
    });
}

fn bench_pipeline_untouched(c: &mut Criterion) {
    let data = sample_unit();
    let pipeline = Pipeline::new(Scanner::new(MemorySource::new()), WeaveConfig::default());

    c.bench_function("pipeline_untouched", |b| {
        b.iter(|| black_box(pipeline.transform("bench", black_box(&data)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_classfile_roundtrip,
    bench_scan,
    bench_pipeline_untouched
);
criterion_main!(benches);
