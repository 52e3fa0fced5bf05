use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use memtrace::{test_utils::fresh_session, ContainerConfig, TrackedList, TrackedMap};
use rand::{rngs::StdRng, Rng, SeedableRng};

const LIST_SIZE: usize = 1 << 12;
const ACCESS_COUNTS: [usize; 3] = [100, 1_000, 10_000];

fn bench_dense_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("Dense Reads");

    for &n in &ACCESS_COUNTS {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || {
                    let session = fresh_session();
                    let mut rng = StdRng::seed_from_u64(42);
                    let values = (0..LIST_SIZE)
                        .map(|_| rng.random_range(0..=u32::MAX))
                        .collect::<Vec<_>>();
                    let list = TrackedList::from_values(values, ContainerConfig::dense().pre_resident())
                        .unwrap();
                    let indices = (0..n)
                        .map(|_| rng.random_range(0..LIST_SIZE))
                        .collect::<Vec<_>>();
                    (session, list, indices)
                },
                |(_session, list, indices)| {
                    for i in &indices {
                        let _ = list.get(i).unwrap();
                    }
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_sparse_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("Sparse Writes");

    for &n in &ACCESS_COUNTS {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || {
                    let session = fresh_session();
                    let mut rng = StdRng::seed_from_u64(123);
                    let entries = (0..n)
                        .map(|_| (rng.random_range(0..=u64::MAX), rng.random_range(0..=u32::MAX)))
                        .collect::<Vec<_>>();
                    (session, TrackedMap::<u64, u32>::new(), entries)
                },
                |(_session, map, entries)| {
                    for (key, value) in entries {
                        let _ = map.set(key, value).unwrap();
                    }
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_dump(c: &mut Criterion) {
    let mut group = c.benchmark_group("Root Dump");

    for &n in &ACCESS_COUNTS {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || {
                    let session = fresh_session();
                    let list = TrackedList::<u64>::new();
                    for i in 0..n as u64 {
                        list.push(i).unwrap();
                    }
                    (session, list)
                },
                |(_session, _list)| {
                    let mut sink = Vec::with_capacity(n * 16);
                    memtrace::tracer::root_context().dump(&mut sink).unwrap();
                    sink
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(container_access, bench_dense_reads, bench_sparse_writes, bench_dump);
criterion_main!(container_access);
