//! Benchmarks for method body decoding and exception-flow analysis.
//!
//! - Header and exception-section parsing
//! - Full instruction decoding with token resolution
//! - Analysis of a decoded method, and of a whole declaring type from raw bodies

extern crate testkitchen;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;
use testkitchen::{
    analysis::{AnalyzerConfig, ExceptionFlowAnalyzer},
    assembly::InstructionStream,
    metadata::{
        method::MethodBody,
        token::Token,
        typeref::{MemberRef, TokenTable, TypeRef},
    },
};

/// `try { throw new ArgumentException(); } catch (ArgumentException) { }`
#[rustfmt::skip]
const GUARDED_THROW: [u8; 44] = [
    0x1B, 0x30, 0x02, 0x00,
    0x0D, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x00, 0x11,
    0x73, 0x01, 0x00, 0x00, 0x0A,
    0x7A,
    0x26,
    0x17,
    0x0A,
    0xDE, 0x00,
    0x06,
    0x2A,
    0x00, 0x00, 0x00,
    0x01, 0x10, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x06, 0x06, 0x00, 0x05, 0x02, 0x00, 0x00, 0x01,
];

/// `newobj InvalidOperationException::.ctor; throw`
const TINY_THROW: [u8; 7] = [0x1A, 0x73, 0x03, 0x00, 0x00, 0x0A, 0x7A];

fn tokens() -> TokenTable {
    let argument = TypeRef::new("System.ArgumentException")
        .with_base("System.SystemException")
        .with_base("System.Exception");
    let invalid = TypeRef::new("System.InvalidOperationException")
        .with_base("System.SystemException")
        .with_base("System.Exception");

    TokenTable::new()
        .with_type(Token::new(0x0100_0002), argument.clone())
        .with_member(Token::new(0x0A00_0001), MemberRef::constructor(argument))
        .with_member(Token::new(0x0A00_0003), MemberRef::constructor(invalid))
}

/// Benchmark parsing the fat header and its exception section.
fn bench_parse_guarded_body(c: &mut Criterion) {
    let mut group = c.benchmark_group("method_body_guarded");
    group.throughput(Throughput::Bytes(GUARDED_THROW.len() as u64));
    group.bench_function("parse", |b| {
        b.iter(|| {
            let body = MethodBody::from(black_box(&GUARDED_THROW)).unwrap();
            black_box(body)
        });
    });
    group.finish();
}

/// Benchmark decoding instructions and resolving operand and catch tokens.
fn bench_decode_stream(c: &mut Criterion) {
    let table = tokens();

    let mut group = c.benchmark_group("instruction_stream");
    group.throughput(Throughput::Bytes(GUARDED_THROW.len() as u64));
    group.bench_function("decode", |b| {
        b.iter(|| {
            let stream = InstructionStream::decode(black_box(&GUARDED_THROW), &table).unwrap();
            black_box(stream)
        });
    });
    group.finish();
}

/// Benchmark analysis of an already decoded method.
fn bench_analyze_stream(c: &mut Criterion) {
    let stream = InstructionStream::decode(&GUARDED_THROW, &tokens()).unwrap();
    let analyzer = ExceptionFlowAnalyzer::default();

    c.bench_function("analyze_stream", |b| {
        b.iter(|| {
            let result = analyzer.analyze(black_box(&stream));
            black_box(analyzer.verdict(&result))
        });
    });
}

/// Benchmark decoding and analyzing a declaring type of many methods, in both fold modes.
fn bench_analyze_type(c: &mut Criterion) {
    let table = tokens();
    let bodies: Vec<&[u8]> = (0..64)
        .map(|i| {
            if i % 2 == 0 {
                &GUARDED_THROW[..]
            } else {
                &TINY_THROW[..]
            }
        })
        .collect();

    let mut group = c.benchmark_group("analyze_type");
    for (name, config) in [
        ("declaring_type", AnalyzerConfig::default()),
        ("precise", AnalyzerConfig::precise()),
    ] {
        let analyzer = ExceptionFlowAnalyzer::new(config);
        group.bench_function(name, |b| {
            b.iter(|| {
                let result =
                    analyzer.analyze_bodies(black_box(&bodies).iter().copied().map(Some), &table);
                black_box(result)
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_parse_guarded_body,
    bench_decode_stream,
    bench_analyze_stream,
    bench_analyze_type
);
criterion_main!(benches);
