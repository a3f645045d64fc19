use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use memberlist_coordinator::memberlist::{Memberlist, NodeStatus};

fn memberlist_of(size: usize) -> Memberlist {
    (0..size).map(|i| format!("10.0.{}.{}", i / 256, i % 256)).collect()
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("memberlist_reconcile");

    for size in [10, 100, 1000] {
        let list = memberlist_of(size);
        let present = format!("10.0.{}.{}", (size / 2) / 256, (size / 2) % 256);

        group.bench_with_input(BenchmarkId::new("remove", size), &list, |b, list| {
            b.iter(|| black_box(list.reconcile(black_box(&present), NodeStatus::NotReady)))
        });
        group.bench_with_input(BenchmarkId::new("append", size), &list, |b, list| {
            b.iter(|| black_box(list.reconcile(black_box("192.168.0.1"), NodeStatus::Ready)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reconcile);
criterion_main!(benches);
