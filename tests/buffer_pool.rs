//! Buffer pool capacity/eviction sanity (spec §8 S5, file-backed variant;
//! the concurrent ref-count property itself is covered in-crate by
//! `buffer_pool::pool::tests::concurrent_acquire_release_settles_at_zero`).

use std::io::Write;
use std::sync::Arc;
use vectorcore::buffer_pool::{FileBlockSource, VecBufferPool};
use vectorcore::metrics::Metrics;

const BLOCK_SIZE: usize = 16 * 1024;
const POOL_CAPACITY: usize = 1024 * 1024; // 64 blocks

fn backing_file(blocks: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let block = vec![0xABu8; BLOCK_SIZE];
    for _ in 0..blocks {
        file.write_all(&block).unwrap();
    }
    file.flush().unwrap();
    file
}

#[test]
fn sixty_four_blocks_fit_without_eviction() {
    let file = backing_file(100);
    let source = Arc::new(FileBlockSource::open(file.path()).unwrap());
    let metrics = Arc::new(Metrics::new());
    let pool = VecBufferPool::new(source, POOL_CAPACITY, BLOCK_SIZE, 4, 8, metrics.clone()).unwrap();

    let mut held = Vec::new();
    for i in 0..64u32 {
        held.push(pool.acquire(i).unwrap());
    }
    assert_eq!(metrics.snapshot().blocks_evicted, 0);

    for i in 0..64u32 {
        pool.release(i);
    }
    drop(held);
}

#[test]
fn the_65th_block_triggers_an_eviction() {
    let file = backing_file(100);
    let source = Arc::new(FileBlockSource::open(file.path()).unwrap());
    let metrics = Arc::new(Metrics::new());
    let pool = VecBufferPool::new(source, POOL_CAPACITY, BLOCK_SIZE, 8, 8, metrics.clone()).unwrap();

    for i in 0..64u32 {
        let buf = pool.acquire(i).unwrap();
        pool.release(i);
        drop(buf);
    }

    let buf = pool.acquire(64).unwrap();
    pool.release(64);
    drop(buf);

    let evicted = metrics.snapshot().blocks_evicted;
    assert!(evicted >= 1, "expected at least one eviction, got {evicted}");
}
