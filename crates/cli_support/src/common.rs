use burn_dataset::{SamplerConfig, WorkerCacheConfig};
use clap::{Args, ValueEnum};
use run_contracts::{ContextError, ExecutionContext, ExecutionStrategy, ProcessRole};
use std::path::PathBuf;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyArg {
    Pipeline,
    Streaming,
}

impl From<StrategyArg> for ExecutionStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Pipeline => ExecutionStrategy::Pipeline,
            StrategyArg::Streaming => ExecutionStrategy::Streaming,
        }
    }
}

/// Execution-context flags shared by every binary. Anything left unset falls
/// back to `ExecutionContext::from_env`.
#[derive(Debug, Clone, Default, Args)]
pub struct ExecutionArgs {
    /// Execution strategy (pipeline runs on the host, streaming on the device).
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,
    /// Index of this task within the run.
    #[arg(long)]
    pub task_id: Option<usize>,
    /// Number of tasks in the run.
    #[arg(long)]
    pub num_tasks: Option<usize>,
    /// Treat this process as a streaming worker.
    #[arg(long, default_value_t = false)]
    pub worker: bool,
    /// Require every task to see equally sized batches.
    #[arg(long, default_value_t = false)]
    pub fixed_batch: bool,
    /// Worker cache root (defaults to MODELZOO_WORKER_CACHE_ROOT or /n0/cache).
    #[arg(long)]
    pub cache_root: Option<PathBuf>,
}

impl ExecutionArgs {
    pub fn resolve(&self) -> Result<ExecutionContext, ContextError> {
        let base = ExecutionContext::from_env()?;
        self.apply(base)
    }

    /// Overlay the flags that were given onto `base`.
    pub fn apply(&self, base: ExecutionContext) -> Result<ExecutionContext, ContextError> {
        let strategy = self.strategy.map(Into::into).unwrap_or(base.strategy);
        let role = if self.worker {
            ProcessRole::Worker
        } else {
            base.role
        };
        let task_id = self.task_id.unwrap_or(base.task_id());
        let num_tasks = self.num_tasks.unwrap_or(base.num_tasks());
        let cache_root = self
            .cache_root
            .clone()
            .unwrap_or_else(|| base.worker_cache_root.clone());
        Ok(ExecutionContext::new(strategy, role, task_id, num_tasks)?
            .with_fixed_batch_target(self.fixed_batch || base.fixed_batch_target)
            .with_worker_cache_root(cache_root))
    }
}

/// Worker cache tuning flags.
#[derive(Debug, Clone, Default, Args)]
pub struct WorkerCacheArgs {
    /// Maximum bytes the worker cache may hold.
    #[arg(long)]
    pub quota_bytes: Option<u64>,
    /// Log copy progress every N files.
    #[arg(long)]
    pub progress_every: Option<usize>,
    /// Re-copy even when the cache already matches the source.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

impl WorkerCacheArgs {
    pub fn apply(&self, mut cfg: WorkerCacheConfig) -> WorkerCacheConfig {
        if self.quota_bytes.is_some() {
            cfg.quota_bytes = self.quota_bytes;
        }
        if let Some(every) = self.progress_every.filter(|v| *v > 0) {
            cfg.progress_every = every;
        }
        cfg
    }
}

/// Sampler flags; unset values keep the configured defaults.
#[derive(Debug, Clone, Default, Args)]
pub struct SamplerArgs {
    /// Seed for shuffling and padding.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Keep the natural order instead of shuffling each pass.
    #[arg(long, default_value_t = false)]
    pub no_shuffle: bool,
    /// Drop the tail instead of padding to a multiple of the task count.
    #[arg(long, default_value_t = false)]
    pub drop_last: bool,
}

impl SamplerArgs {
    pub fn apply(&self, mut cfg: SamplerConfig) -> SamplerConfig {
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        if self.no_shuffle {
            cfg.shuffle = false;
        }
        if self.drop_last {
            cfg.drop_last = true;
        }
        cfg
    }
}
