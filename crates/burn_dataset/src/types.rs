//! Core types, error definitions, and configuration for burn_dataset.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, BurnDatasetError>;

#[derive(Debug, Error)]
pub enum BurnDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "total indices after dropping/padding must equal total_size: found {found}, expected {expected}"
    )]
    IndexCountMismatch { found: usize, expected: usize },
    #[error("fixed-batch targets do not support unequal batch sizes; set drop_last to true")]
    UnevenBatchesUnsupported,
    #[error("source {src} must not live under the worker cache root {cache_root}")]
    NestedInCache { src: PathBuf, cache_root: PathBuf },
    #[error("create_worker_cache must only be called on a worker process")]
    NotWorker,
    #[error(
        "copy would exceed the worker cache quota ({projected} > {quota} bytes); free space in the cache first"
    )]
    QuotaExceeded { projected: u64, quota: u64 },
    #[error("failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BurnDatasetError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| BurnDatasetError::Io { path, source }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Reshuffle the full index list at the start of every pass.
    pub shuffle: bool,
    /// Seed for padding and shuffling. Every pass reseeds with it before
    /// reshuffling the current order.
    pub seed: Option<u64>,
    /// Drop the tail instead of padding up to a multiple of the task count.
    pub drop_last: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            shuffle: true,
            seed: None,
            drop_last: false,
        }
    }
}

/// Tuning for worker cache refreshes. The cache location itself comes from
/// `ExecutionContext::worker_cache_root`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCacheConfig {
    /// Upper bound on bytes held under the cache root; `None` disables the check.
    pub quota_bytes: Option<u64>,
    /// Log copy progress every N files.
    pub progress_every: usize,
}

impl Default for WorkerCacheConfig {
    fn default() -> Self {
        Self {
            quota_bytes: None,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

impl WorkerCacheConfig {
    /// Defaults overlaid with `MODELZOO_WORKER_CACHE_QUOTA` and
    /// `MODELZOO_CACHE_PROGRESS_EVERY`.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Overlay values found through `lookup`; unparsable values are ignored.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(quota) = lookup("MODELZOO_WORKER_CACHE_QUOTA")
            .and_then(|s| s.trim().parse().ok())
        {
            self.quota_bytes = Some(quota);
        }
        if let Some(every) = lookup("MODELZOO_CACHE_PROGRESS_EVERY")
            .and_then(|s| s.trim().parse().ok())
            .filter(|v: &usize| *v > 0)
        {
            self.progress_every = every;
        }
        self
    }
}

pub const DEFAULT_PROGRESS_EVERY: usize = 1000;
