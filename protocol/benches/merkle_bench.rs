//! Merkle tree benchmarks: root construction and proof verification at
//! the leaf counts a busy period actually produces.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use h3tag_protocol::merkle::MerkleTree;

fn leaves(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("vote-{i:08}")).collect()
}

fn bench_create_root(c: &mut Criterion) {
    let mut group = c.benchmark_group("merkle_create_root");
    for count in [16usize, 256, 2_048] {
        let data = leaves(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &data, |b, data| {
            b.iter(|| {
                let mut tree = MerkleTree::new();
                black_box(tree.create_root(data).unwrap())
            });
        });
    }
    group.finish();
}

fn bench_cached_rebuild(c: &mut Criterion) {
    // Rebuilding with overlapping content is the hot path during vote
    // ingestion; the digest cache should make it much cheaper.
    let data = leaves(1_024);
    let mut tree = MerkleTree::new();
    tree.create_root(&data).unwrap();
    c.bench_function("merkle_cached_rebuild_1024", |b| {
        b.iter(|| black_box(tree.create_root(&data).unwrap()));
    });
}

fn bench_verify_proof(c: &mut Criterion) {
    let data = leaves(2_048);
    let mut tree = MerkleTree::new();
    let root = tree.create_root(&data).unwrap();
    let proof = tree.generate_proof(1_000).unwrap();
    c.bench_function("merkle_verify_proof_2048", |b| {
        b.iter(|| black_box(tree.verify_proof(&proof, &data[1_000], &root).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_create_root,
    bench_cached_rebuild,
    bench_verify_proof
);
criterion_main!(benches);
