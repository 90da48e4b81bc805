//! HNSW graph recall sanity (spec §8 S3/S4, scaled down for test runtime).

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use vectorcore::distance::{DataType, MetricKind};
use vectorcore::index::hnsw::{HnswGraph, HnswParams};
use vectorcore::index::{IndexContext, IndexMeta};

const DIM: usize = 32;

fn to_bytes(v: &[f32]) -> Box<[u8]> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out.into_boxed_slice()
}

fn random_vector(rng: &mut ChaCha8Rng) -> Vec<f32> {
    (0..DIM).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

fn brute_force_nearest(dataset: &[Vec<f32>], query: &[f32]) -> u64 {
    dataset
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let dist: f32 = v.iter().zip(query).map(|(a, b)| (a - b) * (a - b)).sum();
            (dist, i as u64)
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, i)| i)
        .unwrap()
}

/// Exact nearest neighbour (rank 0) is found with high probability for a
/// query equal to an already-inserted vector plus a small offset.
#[test]
fn recall_finds_self_neighbour_with_small_offset() {
    let meta = IndexMeta::new(DataType::Fp32, DIM, MetricKind::SquaredEuclidean);
    let params = HnswParams { m: 16, ef_construction: 100, memory_budget_bytes: None };
    let graph = HnswGraph::new(meta, params, 7).unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let dataset: Vec<Vec<f32>> = (0..500).map(|_| random_vector(&mut rng)).collect();
    for (i, v) in dataset.iter().enumerate() {
        graph.insert(i as u64, to_bytes(v)).unwrap();
    }

    let mut hits = 0;
    for i in (0..500).step_by(10) {
        let mut query = dataset[i].clone();
        query[0] += 0.01;

        let mut ctx = IndexContext::new(50, 10);
        let results = graph.search(&mut ctx, &to_bytes(&query));
        let expected = brute_force_nearest(&dataset, &query);
        if results.first().map(|(k, _)| *k) == Some(expected) {
            hits += 1;
        }
    }
    assert!(hits > 0, "expected at least one exact-nearest hit among probed queries");
}

/// Average recall@50 over random queries stays well above chance.
#[test]
fn average_recall_exceeds_half() {
    let meta = IndexMeta::new(DataType::Fp32, DIM, MetricKind::SquaredEuclidean);
    let params = HnswParams { m: 16, ef_construction: 100, memory_budget_bytes: None };
    let graph = HnswGraph::new(meta, params, 11).unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let dataset: Vec<Vec<f32>> = (0..800).map(|_| random_vector(&mut rng)).collect();
    for (i, v) in dataset.iter().enumerate() {
        graph.insert(i as u64, to_bytes(v)).unwrap();
    }

    let queries: Vec<Vec<f32>> = (0..50).map(|_| random_vector(&mut rng)).collect();
    let mut total_recall = 0.0;
    for query in &queries {
        let mut exact: Vec<(f32, u64)> = dataset
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let dist: f32 = v.iter().zip(query).map(|(a, b)| (a - b) * (a - b)).sum();
                (dist, i as u64)
            })
            .collect();
        exact.sort_by(|a, b| a.0.total_cmp(&b.0));
        let truth: std::collections::HashSet<u64> = exact.iter().take(50).map(|(_, k)| *k).collect();

        let mut ctx = IndexContext::new(100, 50);
        let results = graph.search(&mut ctx, &to_bytes(query));
        let found = results.iter().filter(|(k, _)| truth.contains(k)).count();
        total_recall += found as f64 / 50.0;
    }
    let avg_recall = total_recall / queries.len() as f64;
    assert!(avg_recall > 0.5, "average recall@50 too low: {avg_recall}");
}
