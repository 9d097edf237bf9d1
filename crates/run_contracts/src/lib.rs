//! Shared execution-context contracts for metrics, samplers, and worker caches.

pub mod context;

pub use context::{
    ContextError, ExecutionContext, ExecutionStrategy, ProcessRole, DEFAULT_WORKER_CACHE_ROOT,
};
