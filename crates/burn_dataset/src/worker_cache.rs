//! Mirror a shared dataset directory into the worker-local cache.
//!
//! A refresh takes an exclusive lock on `<dest>.lock` so workers sharing a
//! node never race on the same cache entry.

use crate::types::{BurnDatasetError, DatasetResult, WorkerCacheConfig};
use fs2::FileExt;
use run_contracts::ExecutionContext;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// Return the cache mirror of `src_dir` under `ctx.worker_cache_root`,
/// refreshing it first unless it is already a shallow match (or
/// `force_overwrite` is set).
pub fn create_worker_cache(
    src_dir: &Path,
    ctx: &ExecutionContext,
    cfg: &WorkerCacheConfig,
    force_overwrite: bool,
) -> DatasetResult<PathBuf> {
    let src_dir = normalize_path(src_dir)?;
    let cache_root = normalize_path(&ctx.worker_cache_root)?;
    if src_dir.starts_with(&cache_root) {
        return Err(BurnDatasetError::NestedInCache {
            src: src_dir,
            cache_root,
        });
    }
    if !ctx.is_worker() {
        return Err(BurnDatasetError::NotWorker);
    }

    let dest_dir = worker_cache_dir(&cache_root, &src_dir);
    fs::create_dir_all(&dest_dir).map_err(BurnDatasetError::io(&dest_dir))?;

    let _lock = DirLock::acquire(&worker_cache_lock_path(&dest_dir))?;
    if !force_overwrite && same_dirs_shallow(&src_dir, &dest_dir)? {
        tracing::info!(dest = %dest_dir.display(), "worker cache hit: skipping overwrite");
        return Ok(dest_dir);
    }

    let quota = CacheQuota::new(&cache_root, cfg.quota_bytes);
    quota.check(&src_dir, &dest_dir)?;

    if dest_dir.exists() {
        fs::remove_dir_all(&dest_dir).map_err(BurnDatasetError::io(&dest_dir))?;
    }
    let total = count_files(&src_dir)?;
    tracing::info!(
        src = %src_dir.display(),
        dest = %dest_dir.display(),
        total,
        "overwriting worker cache"
    );
    let mut progress = CopyProgress {
        copied: 0,
        total,
        every: cfg.progress_every.max(1),
    };
    copy_tree(&src_dir, &dest_dir, &mut progress)?;
    tracing::info!(copied = progress.copied, total, "worker cache refreshed");
    Ok(dest_dir)
}

/// Cache location for an absolute source path: the source path re-rooted
/// under `cache_root`. Pass paths through [`normalize_path`] first; `..`
/// components are otherwise dropped rather than resolved.
pub fn worker_cache_dir(cache_root: &Path, src_dir: &Path) -> PathBuf {
    let relative: PathBuf = src_dir
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    cache_root.join(relative)
}

/// Absolute form of `path` with `.` and `..` resolved lexically, so two
/// spellings of one directory map to one cache slot.
pub fn normalize_path(path: &Path) -> DatasetResult<PathBuf> {
    let absolute = std::path::absolute(path).map_err(BurnDatasetError::io(path))?;
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

/// Lock file guarding refreshes of `dest_dir`: a `.lock` sibling.
pub fn worker_cache_lock_path(dest_dir: &Path) -> PathBuf {
    let mut name = OsString::from(dest_dir.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// Exclusive advisory lock, released when dropped.
struct DirLock {
    file: File,
    path: PathBuf,
}

impl DirLock {
    fn acquire(path: &Path) -> DatasetResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(BurnDatasetError::io(path))?;
        tracing::debug!(lock = %path.display(), "waiting for worker cache lock");
        FileExt::lock_exclusive(&file).map_err(|source| BurnDatasetError::Lock {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(lock = %self.path.display(), "failed to release lock: {e}");
        }
    }
}

/// Shallow recursive comparison: both trees exist, hold the same names, and
/// common files agree on size and modification time (falling back to a
/// content comparison when only the mtime differs). Source-only entries are
/// tolerated when they are broken symlinks.
pub fn same_dirs_shallow(src: &Path, dest: &Path) -> DatasetResult<bool> {
    if !src.exists() || !dest.exists() {
        return Ok(false);
    }
    let left = entry_names(src)?;
    let right = entry_names(dest)?;

    if right.difference(&left).next().is_some() {
        return Ok(false);
    }
    for name in left.difference(&right) {
        let path = src.join(name);
        // is_dir / is_file follow links, so a dangling link is neither.
        if path.is_dir() || path.is_file() {
            return Ok(false);
        }
    }
    for name in left.intersection(&right) {
        let (l, r) = (src.join(name), dest.join(name));
        match (l.is_dir(), r.is_dir()) {
            (true, true) => {
                if !same_dirs_shallow(&l, &r)? {
                    return Ok(false);
                }
            }
            (false, false) => {
                if !same_file_shallow(&l, &r)? {
                    return Ok(false);
                }
            }
            _ => return Ok(false),
        }
    }
    Ok(true)
}

fn entry_names(dir: &Path) -> DatasetResult<BTreeSet<OsString>> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(dir).map_err(BurnDatasetError::io(dir))? {
        let entry = entry.map_err(BurnDatasetError::io(dir))?;
        names.insert(entry.file_name());
    }
    Ok(names)
}

fn same_file_shallow(left: &Path, right: &Path) -> DatasetResult<bool> {
    // Broken links on both sides carry no content to compare.
    let (Ok(lm), Ok(rm)) = (fs::metadata(left), fs::metadata(right)) else {
        return Ok(!left.exists() && !right.exists());
    };
    if lm.len() != rm.len() {
        return Ok(false);
    }
    if let (Ok(a), Ok(b)) = (lm.modified(), rm.modified()) {
        if a == b {
            return Ok(true);
        }
    }
    same_contents(left, right)
}

fn same_contents(left: &Path, right: &Path) -> DatasetResult<bool> {
    let mut a = File::open(left).map_err(BurnDatasetError::io(left))?;
    let mut b = File::open(right).map_err(BurnDatasetError::io(right))?;
    let mut buf_a = vec![0u8; 64 * 1024];
    let mut buf_b = vec![0u8; 64 * 1024];
    loop {
        let n = a.read(&mut buf_a).map_err(BurnDatasetError::io(left))?;
        if n == 0 {
            let m = b.read(&mut buf_b).map_err(BurnDatasetError::io(right))?;
            return Ok(m == 0);
        }
        b.read_exact(&mut buf_b[..n])
            .map_err(BurnDatasetError::io(right))?;
        if buf_a[..n] != buf_b[..n] {
            return Ok(false);
        }
    }
}

/// Enforces the byte budget of the worker cache.
#[derive(Debug, Clone)]
pub struct CacheQuota {
    cache_root: PathBuf,
    quota_bytes: Option<u64>,
}

impl CacheQuota {
    pub fn new(cache_root: &Path, quota_bytes: Option<u64>) -> Self {
        Self {
            cache_root: cache_root.to_path_buf(),
            quota_bytes,
        }
    }

    /// Usage after replacing `dest` with a copy of `src`.
    pub fn projected_usage(&self, src: &Path, dest: &Path) -> DatasetResult<u64> {
        let current = tree_size(&self.cache_root)?;
        let replaced = tree_size(dest)?;
        let incoming = tree_size(src)?;
        Ok(current.saturating_sub(replaced) + incoming)
    }

    pub fn check(&self, src: &Path, dest: &Path) -> DatasetResult<()> {
        let Some(quota) = self.quota_bytes else {
            return Ok(());
        };
        let projected = self.projected_usage(src, dest)?;
        if projected > quota {
            return Err(BurnDatasetError::QuotaExceeded { projected, quota });
        }
        Ok(())
    }
}

/// Bytes held by regular files under `path`, following links. Missing paths
/// count as empty.
pub fn tree_size(path: &Path) -> DatasetResult<u64> {
    if path.is_file() {
        return fs::metadata(path)
            .map(|m| m.len())
            .map_err(BurnDatasetError::io(path));
    }
    if !path.is_dir() {
        return Ok(0);
    }
    let mut total = 0;
    for entry in fs::read_dir(path).map_err(BurnDatasetError::io(path))? {
        let entry = entry.map_err(BurnDatasetError::io(path))?;
        total += tree_size(&entry.path())?;
    }
    Ok(total)
}

fn count_files(path: &Path) -> DatasetResult<usize> {
    let mut total = 0;
    for entry in fs::read_dir(path).map_err(BurnDatasetError::io(path))? {
        let entry = entry.map_err(BurnDatasetError::io(path))?;
        let p = entry.path();
        if p.is_dir() {
            total += count_files(&p)?;
        } else if p.is_file() {
            total += 1;
        }
    }
    Ok(total)
}

struct CopyProgress {
    copied: usize,
    total: usize,
    every: usize,
}

impl CopyProgress {
    fn tick(&mut self) {
        self.copied += 1;
        if self.copied % self.every == 0 || self.copied == self.total {
            tracing::info!(
                copied = self.copied,
                total = self.total,
                "overwriting cache: {}/{} files",
                self.copied,
                self.total
            );
        }
    }
}

fn copy_tree(src: &Path, dest: &Path, progress: &mut CopyProgress) -> DatasetResult<()> {
    fs::create_dir_all(dest).map_err(BurnDatasetError::io(dest))?;
    for entry in fs::read_dir(src).map_err(BurnDatasetError::io(src))? {
        let entry = entry.map_err(BurnDatasetError::io(src))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if from.is_dir() {
            copy_tree(&from, &to, progress)?;
        } else if from.is_file() {
            copy_file(&from, &to)?;
            progress.tick();
        } else {
            tracing::warn!(path = %from.display(), "skipping broken symlink");
        }
    }
    Ok(())
}

/// Copy contents and carry over the modification time so later shallow
/// comparisons see a match.
fn copy_file(from: &Path, to: &Path) -> DatasetResult<()> {
    fs::copy(from, to).map_err(BurnDatasetError::io(from))?;
    let modified = fs::metadata(from)
        .and_then(|m| m.modified())
        .map_err(BurnDatasetError::io(from))?;
    let out = OpenOptions::new()
        .write(true)
        .open(to)
        .map_err(BurnDatasetError::io(to))?;
    out.set_modified(modified).map_err(BurnDatasetError::io(to))?;
    Ok(())
}
