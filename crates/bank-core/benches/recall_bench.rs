//! Benchmarks for the search primitives recall leans on: vector scan,
//! FTS5 sanitization, and reciprocal rank fusion across retrievers.

use bank_core::embeddings::cosine_similarity;
use bank_core::search::{reciprocal_rank_fusion, sanitize_fts5_query, VectorIndex};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_vector_index_search(c: &mut Criterion) {
    let mut index = VectorIndex::new(256);
    for i in 0..2000 {
        let mut v = vec![0.0f32; 256];
        v[i % 256] = 1.0;
        v[(i * 7) % 256] += 0.5;
        index.upsert(&format!("mem-{i}"), v).unwrap();
    }
    let query: Vec<f32> = (0..256).map(|i| if i % 3 == 0 { 1.0 } else { 0.0 }).collect();

    c.bench_function("vector_index_search_top10_of_2000", |b| {
        b.iter(|| black_box(index.search(black_box(&query), 10)))
    });
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let a: Vec<f32> = (0..256).map(|i| (i as f32).sin()).collect();
    let b: Vec<f32> = (0..256).map(|i| (i as f32).cos()).collect();

    c.bench_function("cosine_similarity_256d", |bencher| {
        bencher.iter(|| black_box(cosine_similarity(black_box(&a), black_box(&b))))
    });
}

fn bench_reciprocal_rank_fusion(c: &mut Criterion) {
    let semantic: Vec<String> = (0..50).map(|i| format!("mem-{i}")).collect();
    let fts: Vec<String> = (0..50).map(|i| format!("mem-{}", 49 - i)).collect();
    let graph: Vec<String> = (0..20).map(|i| format!("mem-{}", i * 2)).collect();
    let lists = vec![semantic, fts, graph];

    c.bench_function("reciprocal_rank_fusion_three_lists", |b| {
        b.iter(|| black_box(reciprocal_rank_fusion(black_box(&lists))))
    });
}

fn bench_sanitize_fts5_query(c: &mut Criterion) {
    let query = "Peter\" works AND* at (Acme) OR \"unterminated";

    c.bench_function("sanitize_fts5_query", |b| {
        b.iter(|| black_box(sanitize_fts5_query(black_box(query))))
    });
}

criterion_group!(
    benches,
    bench_vector_index_search,
    bench_cosine_similarity,
    bench_reciprocal_rank_fusion,
    bench_sanitize_fts5_query
);
criterion_main!(benches);
