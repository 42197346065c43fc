use criterion::{black_box, BatchSize, BenchmarkId, Criterion};
use criterion::{criterion_group, criterion_main};

use bucket_merge::{format_minute, BucketStore, MinuteIndexer};

const LINES_PER_ITER: usize = 10_000;

fn sample_lines(minutes: i64) -> Vec<Vec<u8>> {
    (0..LINES_PER_ITER)
        .map(|seq| {
            let stamp = format_minute(26_297_280 + seq as i64 % minutes).expect("stamp");
            let host = seq % 255;
            let second = seq % 60;
            format!(
                "10.0.0.{host} - - [{stamp}:{second:02} +0000] \"GET /{seq} HTTP/1.1\" 200 2326\n"
            )
            .into_bytes()
        })
        .collect()
}

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");
    for &minutes in &[1_i64, 60, 1440] {
        let lines = sample_lines(minutes);
        group.bench_with_input(BenchmarkId::from_parameter(minutes), &lines, |b, lines| {
            b.iter_batched(
                MinuteIndexer::new,
                |mut indexer| {
                    for line in lines {
                        black_box(indexer.index(line).expect("index"));
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    let lines = sample_lines(5);
    for &block in &[64 * 1024_usize, 1024 * 1024, 8 * 1024 * 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(block), &block, |b, &block| {
            b.iter_batched(
                || (BucketStore::new(26_297_280, block), MinuteIndexer::new()),
                |(mut store, mut indexer)| {
                    for line in &lines {
                        let index = indexer.index(line).expect("index");
                        store.append(index, black_box(line));
                    }
                    for index in 26_297_280..26_297_285 {
                        black_box(store.drain(index));
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_index, bench_append);
criterion_main!(benches);
