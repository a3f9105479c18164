//! Benchmarks for tree construction and batch proofs.
#![allow(missing_docs)]
#![allow(unused_crate_dependencies)]

use std::rc::Rc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use strata_arena::Arena;
use strata_batch_merkle::prelude::*;
use strata_batch_merkle::ArenaLeaves;

type Hash32 = [u8; 32];

/// Sequential leaves of `size` bytes, hashed so they don't repeat.
fn generate_leaves(count: usize, size: usize) -> Vec<u8> {
    let hasher = Sha256Hasher::new();
    (0..count)
        .flat_map(|i| {
            let h = hasher.digest(&(i as u64).to_be_bytes());
            h.into_iter().cycle().take(size)
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    for count in [1 << 10, 1 << 14, 1 << 16] {
        let raw = generate_leaves(count, 32);

        for alg in HashAlgorithm::ALL {
            let hasher = create_hash(alg, &HashOptions::new()).unwrap();
            let leaves = OwnedLeaves::from_buffer(raw.clone(), 32).unwrap();
            group.bench_with_input(BenchmarkId::new(alg.name(), count), &leaves, |b, leaves| {
                b.iter(|| {
                    let tree = MerkleTree::<Hash32>::create(leaves.clone(), &hasher).unwrap();
                    black_box(*tree.root());
                });
            });
        }

        // Leaves already in the hasher's arena skip the copy in.
        let arena = Rc::new(Arena::default());
        let hasher = create_hash(
            HashAlgorithm::ArenaBlake2s256,
            &HashOptions::new().with_arena(arena.clone()),
        )
        .unwrap();
        let view = ArenaLeaves::from_buffer(&arena, &raw, 32).unwrap();
        group.bench_with_input(BenchmarkId::new("arena_in_place", count), &view, |b, view| {
            b.iter(|| {
                let tree = MerkleTree::create(*view, &hasher).unwrap();
                black_box(*tree.root());
            });
        });
        arena.release(view.region()).unwrap();
    }
    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let hasher = Sha256Hasher::new();
    let count = 1 << 14;
    let tree = MerkleTree::<Hash32>::create(
        OwnedLeaves::from_buffer(generate_leaves(count, 64), 64).unwrap(),
        &hasher,
    )
    .unwrap();

    let mut group = c.benchmark_group("batch");
    for queries in [8, 64, 256] {
        let indexes: Vec<usize> = (0..queries).map(|i| (i * 7919) % count).collect();

        group.bench_with_input(BenchmarkId::new("prove", queries), &indexes, |b, indexes| {
            b.iter(|| black_box(tree.prove_batch(indexes).unwrap()));
        });

        let proof = tree.prove_batch(&indexes).unwrap();
        group.bench_with_input(BenchmarkId::new("verify", queries), &indexes, |b, indexes| {
            b.iter(|| assert!(verify_batch(tree.root(), indexes, &proof, &hasher)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_batch);
criterion_main!(benches);
