//! Benchmarks for the Source Scanner (spec.md §4.A).

use std::fs;

use tempfile::TempDir;

fn main() {
    divan::main();
}

const FILE_COUNTS: &[usize] = &[1, 10, 50, 200];

#[divan::bench(args = FILE_COUNTS, sample_count = 20)]
fn scan_tagged_directory(bencher: divan::Bencher, count: usize) {
    bencher
        .with_inputs(|| {
            let dir = TempDir::new().expect("create temp dir");
            for i in 0..count {
                fs::write(
                    dir.path().join(format!("target_{i}.rs")),
                    format!("{}\npub fn target_{i}() {{}}\n", stave::scan::BUILD_TAG),
                )
                .expect("write fixture");
            }
            dir
        })
        .bench_values(|dir| stave::scan::scan(dir.path()).expect("scan directory"));
}

#[divan::bench(sample_count = 20)]
fn scan_dedicated_subdirectory(bencher: divan::Bencher) {
    bencher
        .with_inputs(|| {
            let dir = TempDir::new().expect("create temp dir");
            let sub = dir.path().join(stave::scan::DEDICATED_SUBDIR);
            fs::create_dir(&sub).expect("create dedicated subdirectory");
            for i in 0..50 {
                fs::write(sub.join(format!("target_{i}.rs")), format!("pub fn target_{i}() {{}}\n"))
                    .expect("write fixture");
            }
            dir
        })
        .bench_values(|dir| stave::scan::scan(dir.path()).expect("scan directory"));
}
