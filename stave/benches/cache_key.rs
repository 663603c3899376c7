//! Benchmarks for content-addressing a stavefile package (spec.md §4.C).

use std::fs;

use tempfile::TempDir;

fn main() {
    divan::main();
}

const FILE_COUNTS: &[usize] = &[1, 5, 20, 100];

#[divan::bench(args = FILE_COUNTS, sample_count = 20)]
fn hash_package(bencher: divan::Bencher, count: usize) {
    bencher
        .with_inputs(|| {
            let dir = TempDir::new().expect("create temp dir");
            let files = (0..count)
                .map(|i| {
                    let path = dir.path().join(format!("target_{i}.rs"));
                    fs::write(&path, format!("pub fn target_{i}() {{}}\n")).expect("write fixture");
                    path
                })
                .collect::<Vec<_>>();
            let cache_dir = dir.path().join("cache");
            (dir, files, cache_dir)
        })
        .bench_values(|(_dir, files, cache_dir)| {
            stave::cache::cache_key(&files, "cargo 1.80.0", &cache_dir).expect("compute cache key")
        });
}

#[divan::bench(sample_count = 20)]
fn binary_path(bencher: divan::Bencher) {
    let cache_dir = std::path::Path::new("/tmp/stave-bench-cache");
    let hash = blake3::hash(b"benchmark fixture");
    bencher.bench(|| stave::cache::binary_path(cache_dir, &hash));
}
