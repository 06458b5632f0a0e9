use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use goobits_mirror::integrity::compute_tree_hash;
use goobits_mirror::probe::{ProbeResult, Prober};
use goobits_mirror::registry::RemoteTarget;
use goobits_mirror::sync::{CancelToken, DispatchOptions, PushFailure, Pusher, SyncDispatcher};
use std::fs;
use std::hint::black_box;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn setup_tree(files: usize) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    for i in 0..files {
        let dir = root.join(format!("dir-{}", i % 16));
        fs::create_dir_all(&dir).unwrap();
        let content = format!("file {} {}\n", i, "x".repeat(i % 512));
        fs::write(dir.join(format!("file-{}.txt", i)), content).unwrap();
    }
    // Excluded noise
    fs::create_dir_all(root.join("target")).unwrap();
    for i in 0..files / 4 {
        fs::write(root.join(format!("target/out-{}.o", i)), "obj").unwrap();
    }

    temp_dir
}

fn bench_tree_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_hash");
    let excludes = ["target/"];

    for files in [100, 1000] {
        let temp_dir = setup_tree(files);
        let path = temp_dir.path().to_path_buf();
        group.bench_with_input(BenchmarkId::from_parameter(files), &path, |b, path| {
            b.iter(|| black_box(compute_tree_hash(path, &excludes).unwrap()))
        });
    }

    group.finish();
}

struct InstantRemote;

#[async_trait]
impl Prober for InstantRemote {
    async fn probe(&self, _target: &RemoteTarget, _timeout: Duration) -> ProbeResult {
        ProbeResult::Reachable
    }
}

#[async_trait]
impl Pusher for InstantRemote {
    async fn push(&self, _target: &RemoteTarget, _local_root: &Path) -> Result<(), PushFailure> {
        tokio::task::yield_now().await;
        Ok(())
    }
}

fn bench_dispatch_overhead(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let targets: Vec<RemoteTarget> = (0..50)
        .map(|i| {
            RemoteTarget::new(&format!("remote-{}", i), "https://example.com/app.git").unwrap()
        })
        .collect();
    let remote = Arc::new(InstantRemote);
    let dispatcher = SyncDispatcher::new(remote.clone(), remote, DispatchOptions::default());
    let cancel = CancelToken::never();

    c.bench_function("dispatch_50_instant_remotes", |b| {
        b.to_async(&runtime)
            .iter(|| async { black_box(dispatcher.run(&targets, Path::new("."), &cancel).await) })
    });
}

criterion_group!(benches, bench_tree_hash, bench_dispatch_overhead);
criterion_main!(benches);
