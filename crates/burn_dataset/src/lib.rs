//! Dataset sharding and worker-local caching for distributed training.
//!
//! This crate provides utilities for:
//! - Deterministic, equal-size sharding of dataset indices across tasks
//! - Repeating samplers for loaders that never rebuild their iterator
//! - Mirroring shared dataset directories into a worker cache under a lock

// Module declarations
pub mod sampler;
pub mod types;
pub mod worker_cache;

// Re-export public API
pub use sampler::{RepeatSampler, ShardedSampler};
pub use types::*;
pub use worker_cache::{
    create_worker_cache, normalize_path, same_dirs_shallow, worker_cache_dir,
    worker_cache_lock_path, CacheQuota,
};
