//! Benchmarks for inventory insertion and cross-tree lookup.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dirsync_lib::FileInventory;

fn names(count: usize) -> Vec<String> {
    // 交错生成，避免总是走尾部快速路径
    (0..count)
        .map(|i| format!("dir{:03}/file{:05}.dat", (i * 7919) % 97, i))
        .collect()
}

fn bench_insert_ordered(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_ordered");

    for count in [100, 1_000, 5_000].iter() {
        let input = names(*count);
        group.bench_with_input(BenchmarkId::new("shuffled", count), &input, |b, input| {
            b.iter(|| {
                let mut inventory = FileInventory::new("/bench/source");
                for name in input {
                    let _ = inventory.insert_ordered(black_box(name));
                }
                inventory
            });
        });
    }

    group.finish();
}

fn bench_push_back_and_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_back_sort");

    for count in [100, 1_000, 5_000].iter() {
        let input = names(*count);
        group.bench_with_input(BenchmarkId::new("shuffled", count), &input, |b, input| {
            b.iter(|| {
                let mut inventory = FileInventory::new("/bench/source");
                for name in input {
                    let _ = inventory.push_back(black_box(name));
                }
                inventory.sort_by_path();
                inventory
            });
        });
    }

    group.finish();
}

fn bench_find_by_relative_name(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_by_relative_name");

    let mut source = FileInventory::new("/bench/source");
    let mut dest = FileInventory::new("/bench/destination/");
    for name in names(2_000) {
        let _ = source.insert_ordered(&name);
        let _ = dest.insert_ordered(&name);
    }

    group.bench_function("all_present", |b| {
        b.iter(|| {
            source
                .iter()
                .filter(|e| {
                    dest.find_by_relative_name(e.path(), source.prefix_len(), dest.prefix_len())
                        .is_some()
                })
                .count()
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_ordered,
    bench_push_back_and_sort,
    bench_find_by_relative_name
);
criterion_main!(benches);
