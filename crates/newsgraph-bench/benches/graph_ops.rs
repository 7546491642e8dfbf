use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use newsgraph_bench::{expand_synthetic, synthetic_store};
use newsgraph_core::EntityId;
use newsgraph_graph::{collapse, merge};
use std::hint::black_box;

fn bench_merge_into_hub(c: &mut Criterion) {
    let store = synthetic_store(5_000, 8);
    let absorbed: Vec<EntityId> = (1..200).map(EntityId).collect();

    c.bench_function("merge_200_nodes_5000_node_graph", |b| {
        b.iter_batched(
            || store.clone(),
            |mut store| {
                let outcome = merge(&mut store, EntityId(0), black_box(&absorbed));
                black_box(outcome.is_ok());
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_collapse_expansion(c: &mut Criterion) {
    let mut store = synthetic_store(5_000, 8);
    expand_synthetic(&mut store, 42, 500).expect("synthetic expansion");

    c.bench_function("collapse_500_children_5000_node_graph", |b| {
        b.iter_batched(
            || store.clone(),
            |mut store| {
                let delta = collapse(&mut store, EntityId(42));
                black_box(delta.is_ok());
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_merge_into_hub, bench_collapse_expansion);
criterion_main!(benches);
