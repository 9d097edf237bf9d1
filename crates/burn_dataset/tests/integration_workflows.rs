//! Integration tests for end-to-end burn_dataset workflows.
//!
//! These tests verify that the major workflows work correctly together:
//! 1. Shared dataset → worker cache mirror (miss, hit, forced refresh)
//! 2. Worker cache guards (nesting, role, quota) and path normalization
//! 3. Refreshes of one cache entry serialized by its lock
//! 4. Sharded sampling across every task of a run

use burn_dataset::{
    create_worker_cache, normalize_path, same_dirs_shallow, worker_cache_dir,
    worker_cache_lock_path, BurnDatasetError, RepeatSampler, SamplerConfig, ShardedSampler,
    WorkerCacheConfig,
};
use fs2::FileExt;
use run_contracts::ExecutionContext;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, SystemTime};

/// Helper to create a small dataset tree with nested directories.
fn create_synthetic_dataset(root: &Path) -> anyhow::Result<PathBuf> {
    let src = root.join("shared/datasets/seg");
    fs::create_dir_all(src.join("images"))?;
    fs::create_dir_all(src.join("masks/train"))?;
    for i in 0..3 {
        fs::write(src.join(format!("images/img_{i:03}.raw")), vec![i as u8; 64])?;
        fs::write(src.join(format!("masks/train/mask_{i:03}.raw")), vec![1u8; 16])?;
    }
    fs::write(src.join("meta.json"), br#"{"classes": 4}"#)?;
    Ok(src)
}

fn worker(cache_root: &Path) -> ExecutionContext {
    ExecutionContext::streaming_worker(0, 1)
        .unwrap()
        .with_worker_cache_root(cache_root)
}

fn expected_dest(cache_root: &Path, src: &Path) -> PathBuf {
    worker_cache_dir(
        &normalize_path(cache_root).unwrap(),
        &normalize_path(src).unwrap(),
    )
}

#[test]
fn workflow_cache_miss_then_hit() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = create_synthetic_dataset(tmp.path())?;
    let ctx = worker(&tmp.path().join("cache"));
    let cfg = WorkerCacheConfig::default();

    // Step 1: first call copies the tree.
    let dest = create_worker_cache(&src, &ctx, &cfg, false)?;
    assert_eq!(dest, expected_dest(&ctx.worker_cache_root, &src));
    assert!(dest.join("images/img_002.raw").exists());
    assert!(dest.join("masks/train/mask_000.raw").exists());
    assert!(same_dirs_shallow(&src, &dest)?);

    // Step 2: a hit leaves the mirror alone. Back-date one cached file; its
    // contents still match, and a refresh would have restored the mtime.
    let marker = dest.join("images/img_000.raw");
    let old = SystemTime::UNIX_EPOCH + Duration::from_secs(86_400);
    fs::File::options().write(true).open(&marker)?.set_modified(old)?;
    let again = create_worker_cache(&src, &ctx, &cfg, false)?;
    assert_eq!(again, dest);
    assert_eq!(fs::metadata(&marker)?.modified()?, old);

    // Step 3: a new source file invalidates the mirror.
    fs::write(src.join("images/img_999.raw"), [9u8; 8])?;
    assert!(!same_dirs_shallow(&src, &dest)?);
    create_worker_cache(&src, &ctx, &cfg, false)?;
    assert!(dest.join("images/img_999.raw").exists());
    Ok(())
}

#[test]
fn workflow_stale_entries_are_removed_on_refresh() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = create_synthetic_dataset(tmp.path())?;
    let ctx = worker(&tmp.path().join("cache"));
    let cfg = WorkerCacheConfig::default();
    let dest = create_worker_cache(&src, &ctx, &cfg, false)?;

    fs::write(dest.join("stale.tmp"), b"left over")?;
    assert!(!same_dirs_shallow(&src, &dest)?);
    create_worker_cache(&src, &ctx, &cfg, false)?;
    assert!(!dest.join("stale.tmp").exists());

    // Forced refresh rewrites even on a hit.
    fs::write(dest.join("meta.json"), br#"{"classes": 4}"#)?;
    create_worker_cache(&src, &ctx, &cfg, true)?;
    assert!(same_dirs_shallow(&src, &dest)?);
    Ok(())
}

#[cfg(unix)]
#[test]
fn workflow_broken_symlinks_are_skipped_and_tolerated() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = create_synthetic_dataset(tmp.path())?;
    std::os::unix::fs::symlink(tmp.path().join("nowhere"), src.join("dangling"))?;
    std::os::unix::fs::symlink(src.join("meta.json"), src.join("meta_link.json"))?;
    let ctx = worker(&tmp.path().join("cache"));

    let dest = create_worker_cache(&src, &ctx, &WorkerCacheConfig::default(), false)?;
    assert!(!dest.join("dangling").exists());
    assert!(fs::symlink_metadata(dest.join("dangling")).is_err());
    // Valid links are followed and copied as regular files.
    let copied = fs::symlink_metadata(dest.join("meta_link.json"))?;
    assert!(copied.file_type().is_file());
    assert!(same_dirs_shallow(&src, &dest)?);
    Ok(())
}

#[test]
fn workflow_guards_reject_bad_calls() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = create_synthetic_dataset(tmp.path())?;
    let cache_root = tmp.path().join("cache");
    let cfg = WorkerCacheConfig::default();

    let nested = cache_root.join("already/cached");
    fs::create_dir_all(&nested)?;
    let err = create_worker_cache(&nested, &worker(&cache_root), &cfg, false).unwrap_err();
    assert!(matches!(err, BurnDatasetError::NestedInCache { .. }));

    let coordinator = ExecutionContext::single_process().with_worker_cache_root(&cache_root);
    let err = create_worker_cache(&src, &coordinator, &cfg, false).unwrap_err();
    assert!(matches!(err, BurnDatasetError::NotWorker));
    assert!(!expected_dest(&cache_root, &src).exists());
    Ok(())
}

#[test]
fn workflow_parent_components_cannot_escape_guard() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let cache_root = tmp.path().join("cache");
    let cfg = WorkerCacheConfig::default();

    // Spelled outside the cache, resolves inside it.
    let sneaky = tmp.path().join("a/../cache/x");
    let err = create_worker_cache(&sneaky, &worker(&cache_root), &cfg, false).unwrap_err();
    match err {
        BurnDatasetError::NestedInCache { src, .. } => {
            assert_eq!(src, normalize_path(&cache_root.join("x"))?);
        }
        other => panic!("unexpected error: {other}"),
    }

    // A relative cache root is resolved against the working directory.
    let relative_root = Path::new("modelzoo-relative-cache-root");
    let inside = std::env::current_dir()?.join(relative_root).join("ds");
    let err = create_worker_cache(&inside, &worker(relative_root), &cfg, false).unwrap_err();
    assert!(matches!(err, BurnDatasetError::NestedInCache { .. }));
    assert!(!relative_root.exists());
    Ok(())
}

#[test]
fn workflow_distinct_sources_get_distinct_slots() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let abc = tmp.path().join("a/b/c");
    let ac = tmp.path().join("a/c");
    fs::create_dir_all(&abc)?;
    fs::create_dir_all(&ac)?;
    fs::write(abc.join("only_in_abc"), b"abc")?;
    fs::write(ac.join("only_in_ac"), b"ac")?;
    let ctx = worker(&tmp.path().join("cache"));
    let cfg = WorkerCacheConfig::default();

    let first = create_worker_cache(&abc, &ctx, &cfg, false)?;
    let second = create_worker_cache(&tmp.path().join("a/b/../c"), &ctx, &cfg, false)?;
    assert_ne!(first, second);
    assert_eq!(second, expected_dest(&ctx.worker_cache_root, &ac));
    assert!(first.join("only_in_abc").exists());
    assert!(second.join("only_in_ac").exists());
    assert!(!second.join("only_in_abc").exists());
    Ok(())
}

#[test]
fn workflow_refresh_waits_for_cache_lock() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = create_synthetic_dataset(tmp.path())?;
    let cache_root = tmp.path().join("cache");
    let dest = expected_dest(&cache_root, &src);
    fs::create_dir_all(&dest)?;

    // Another worker holds the entry.
    let held = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(worker_cache_lock_path(&dest))?;
    FileExt::lock_exclusive(&held)?;

    let (done_tx, done_rx) = mpsc::channel();
    let handle = {
        let (src, cache_root) = (src.clone(), cache_root.clone());
        thread::spawn(move || {
            let out = create_worker_cache(
                &src,
                &worker(&cache_root),
                &WorkerCacheConfig::default(),
                false,
            );
            let _ = done_tx.send(());
            out
        })
    };

    assert!(done_rx.recv_timeout(Duration::from_millis(300)).is_err());
    assert!(!dest.join("meta.json").exists());

    FileExt::unlock(&held)?;
    done_rx.recv_timeout(Duration::from_secs(30))?;
    let got = handle.join().expect("cache thread panicked")?;
    assert_eq!(got, dest);
    assert!(same_dirs_shallow(&src, &dest)?);
    Ok(())
}

#[test]
fn workflow_concurrent_refreshes_share_one_mirror() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = create_synthetic_dataset(tmp.path())?;
    let cache_root = tmp.path().join("cache");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let (src, cache_root) = (src.clone(), cache_root.clone());
            thread::spawn(move || {
                create_worker_cache(
                    &src,
                    &worker(&cache_root),
                    &WorkerCacheConfig::default(),
                    false,
                )
            })
        })
        .collect();
    let expected = expected_dest(&cache_root, &src);
    for handle in handles {
        assert_eq!(handle.join().expect("cache thread panicked")?, expected);
    }
    assert!(same_dirs_shallow(&src, &expected)?);
    Ok(())
}

#[test]
fn workflow_quota_blocks_oversized_copy() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = create_synthetic_dataset(tmp.path())?;
    let ctx = worker(&tmp.path().join("cache"));
    let mut cfg = WorkerCacheConfig {
        quota_bytes: Some(32),
        ..Default::default()
    };

    let err = create_worker_cache(&src, &ctx, &cfg, false).unwrap_err();
    match err {
        BurnDatasetError::QuotaExceeded { projected, quota } => {
            assert_eq!(quota, 32);
            assert!(projected > 32);
        }
        other => panic!("unexpected error: {other}"),
    }

    // The lock was released: a roomier quota succeeds right away.
    cfg.quota_bytes = Some(1 << 20);
    let dest = create_worker_cache(&src, &ctx, &cfg, false)?;
    assert!(same_dirs_shallow(&src, &dest)?);
    Ok(())
}

#[test]
fn workflow_all_tasks_cover_dataset() -> anyhow::Result<()> {
    let dataset: Vec<u32> = (0..10).collect();
    let num_tasks = 3;
    let cfg = SamplerConfig {
        shuffle: true,
        seed: Some(1234),
        drop_last: false,
    };

    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for task in 0..num_tasks {
        let ctx = ExecutionContext::streaming_worker(task, num_tasks)?;
        let mut sampler = ShardedSampler::for_items(&dataset, &ctx, cfg.clone())?;
        let shard = sampler.epoch_indices();
        assert_eq!(shard.len(), 4);
        for idx in shard {
            *counts.entry(idx).or_default() += 1;
        }
    }
    // Every index appears, two of them twice as padding.
    assert_eq!(counts.len(), 10);
    assert_eq!(counts.values().sum::<usize>(), 12);
    assert_eq!(counts.values().filter(|c| **c == 2).count(), 2);
    Ok(())
}

#[test]
fn workflow_passes_reapply_seeded_shuffle() -> anyhow::Result<()> {
    let ctx = ExecutionContext::streaming_worker(1, 2)?;
    let cfg = SamplerConfig {
        shuffle: true,
        seed: Some(99),
        drop_last: true,
    };
    let mut sampler = ShardedSampler::new(21, &ctx, cfg)?;
    let first = sampler.epoch_indices();
    let second = sampler.epoch_indices();
    assert_eq!(first.len(), 10);
    // Reseeding shuffles the already shuffled list again, so passes match
    // only across fresh samplers.
    let mut fresh = ShardedSampler::new(21, &ctx, sampler_cfg(99))?;
    assert_eq!(fresh.epoch_indices(), first);
    assert_eq!(second.len(), first.len());
    Ok(())
}

fn sampler_cfg(seed: u64) -> SamplerConfig {
    SamplerConfig {
        shuffle: true,
        seed: Some(seed),
        drop_last: true,
    }
}

#[test]
fn workflow_persistent_loader_epochs_match_sampler_len() -> anyhow::Result<()> {
    let ctx = ExecutionContext::streaming_worker(0, 4)?;
    let sampler = ShardedSampler::new(18, &ctx, sampler_cfg(5))?;
    let per_epoch = sampler.len();
    let mut loader = RepeatSampler::new(sampler);

    // The underlying iterator is never rebuilt; each epoch still sees
    // exactly one shard's worth of indices.
    for epoch in 1..=3 {
        let indices: Vec<usize> = loader.next_epoch().collect();
        assert_eq!(indices.len(), per_epoch);
        assert!(indices.iter().all(|i| *i < 18));
        assert_eq!(loader.passes(), epoch);
    }
    Ok(())
}
