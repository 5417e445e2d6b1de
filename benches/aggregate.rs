use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

use pgaggregate::catalog::AggRegistry;
use pgaggregate::exec::{sliding_window, FrameSpec, GroupedAggregate, ParallelAggregate, PartitionMode, StateBoundary};
use pgaggregate::Datum;

fn gen_rows(n: usize, groups: u32, seed: u64) -> Vec<(u32, Vec<Datum>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| (rng.gen_range(0..groups), vec![Datum::Int8(rng.gen_range(-1_000_000..1_000_000))])).collect()
}

fn bench_grouped(c: &mut Criterion) {
    let reg = AggRegistry::builtin().expect("builtin registry");
    let ns = [10_000usize, 100_000usize];
    let mut group = c.benchmark_group("grouped");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(20);

    for &n in &ns {
        let rows = gen_rows(n, 64, 0xBEEF_CAFE);
        group.throughput(Throughput::Elements(n as u64));
        // sum(int8), internal state
        group.bench_with_input(BenchmarkId::new("sum_int8", n.to_string()), &n, |b, _| {
            let desc = reg.lookup(2107).expect("sum(int8)");
            b.iter(|| {
                let mut g = GroupedAggregate::new(Arc::clone(&desc));
                g.consume_all(rows.iter().cloned());
                criterion::black_box(g.finish());
            });
        });
        // max(int8), by-value state
        group.bench_with_input(BenchmarkId::new("max_int8", n.to_string()), &n, |b, _| {
            let desc = reg.lookup(2115).expect("max(int8)");
            b.iter(|| {
                let mut g = GroupedAggregate::new(Arc::clone(&desc));
                g.consume_all(rows.iter().cloned());
                criterion::black_box(g.finish());
            });
        });
    }
    group.finish();
}

fn bench_parallel(c: &mut Criterion) {
    let reg = AggRegistry::builtin().expect("builtin registry");
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let n = 200_000usize;
    let rows = gen_rows(n, 256, 0xDEAD_BEEF);
    let desc = reg.lookup(2100).expect("avg(int8)");

    let mut group = c.benchmark_group("parallel_avg_int8");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(10);
    group.throughput(Throughput::Elements(n as u64));
    for (mode, boundary, label) in [
        (PartitionMode::ByGroup, StateBoundary::InProcess, "by_group"),
        (PartitionMode::Split, StateBoundary::InProcess, "split"),
        (PartitionMode::Split, StateBoundary::Serialized, "split_serialized"),
    ] {
        for workers in [1usize, 4] {
            group.bench_with_input(BenchmarkId::new(label, workers), &workers, |b, &workers| {
                b.iter(|| {
                    let p = ParallelAggregate::new(Arc::clone(&desc)).workers(workers).mode(mode).boundary(boundary);
                    let out = rt.block_on(p.run(rows.clone())).expect("parallel run");
                    criterion::black_box(out);
                });
            });
        }
    }
    group.finish();
}

fn bench_window(c: &mut Criterion) {
    let reg = AggRegistry::builtin().expect("builtin registry");
    let n = 20_000usize;
    let mut rng = StdRng::seed_from_u64(0xFACE_FEED);
    let rows: Vec<Vec<Datum>> = (0..n).map(|_| vec![Datum::Int4(rng.gen_range(-1000..1000))]).collect();

    let mut group = c.benchmark_group("sliding_window");
    group.sample_size(20);
    group.throughput(Throughput::Elements(n as u64));
    for width in [16usize, 256] {
        let frame = FrameSpec::Rows { preceding: Some(width), following: Some(0) };
        // sum(int4) has an inverse transition, max(int4) recomputes
        for (oid, label) in [(2108u32, "sum_int4"), (2116u32, "max_int4")] {
            let desc = reg.lookup(oid).expect("builtin aggregate");
            group.bench_with_input(BenchmarkId::new(label, width), &width, |b, _| {
                b.iter(|| criterion::black_box(sliding_window(&desc, &rows, frame).expect("window")));
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_grouped, bench_parallel, bench_window);
criterion_main!(benches);
