use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Worker cache root used when none is configured.
pub const DEFAULT_WORKER_CACHE_ROOT: &str = "/n0/cache";

/// How per-batch work is scheduled for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// Host-driven: every step runs on the control process.
    #[default]
    Pipeline,
    /// Device-driven: per-batch work runs on the accelerator, only reduced
    /// values come back to the host.
    Streaming,
}

impl ExecutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategy::Pipeline => "pipeline",
            ExecutionStrategy::Streaming => "streaming",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pipeline" => Some(ExecutionStrategy::Pipeline),
            "streaming" | "weight_streaming" | "ws" => Some(ExecutionStrategy::Streaming),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessRole {
    #[default]
    Coordinator,
    /// Input worker feeding a streaming device.
    Worker,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("num_tasks must be at least 1")]
    ZeroTasks,
    #[error("task_id {task_id} out of range for {num_tasks} tasks")]
    TaskOutOfRange { task_id: usize, num_tasks: usize },
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Everything a metric, sampler, or cache call needs to know about the
/// process it runs in. Passed explicitly instead of queried from globals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub strategy: ExecutionStrategy,
    pub role: ProcessRole,
    task_id: usize,
    num_tasks: usize,
    /// Target only accepts equally sized batches.
    pub fixed_batch_target: bool,
    pub worker_cache_root: PathBuf,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::single_process()
    }
}

impl ExecutionContext {
    pub fn new(
        strategy: ExecutionStrategy,
        role: ProcessRole,
        task_id: usize,
        num_tasks: usize,
    ) -> Result<Self, ContextError> {
        if num_tasks == 0 {
            return Err(ContextError::ZeroTasks);
        }
        if task_id >= num_tasks {
            return Err(ContextError::TaskOutOfRange { task_id, num_tasks });
        }
        Ok(Self {
            strategy,
            role,
            task_id,
            num_tasks,
            fixed_batch_target: false,
            worker_cache_root: PathBuf::from(DEFAULT_WORKER_CACHE_ROOT),
        })
    }

    /// Non-distributed host pipeline: rank 0 of 1.
    pub fn single_process() -> Self {
        Self {
            strategy: ExecutionStrategy::Pipeline,
            role: ProcessRole::Coordinator,
            task_id: 0,
            num_tasks: 1,
            fixed_batch_target: false,
            worker_cache_root: PathBuf::from(DEFAULT_WORKER_CACHE_ROOT),
        }
    }

    /// Streaming input worker `task_id` of `num_tasks`.
    pub fn streaming_worker(task_id: usize, num_tasks: usize) -> Result<Self, ContextError> {
        Self::new(
            ExecutionStrategy::Streaming,
            ProcessRole::Worker,
            task_id,
            num_tasks,
        )
    }

    pub fn with_fixed_batch_target(mut self, fixed: bool) -> Self {
        self.fixed_batch_target = fixed;
        self
    }

    pub fn with_worker_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.worker_cache_root = root.into();
        self
    }

    pub fn task_id(&self) -> usize {
        self.task_id
    }

    pub fn num_tasks(&self) -> usize {
        self.num_tasks
    }

    pub fn is_streamer(&self) -> bool {
        self.strategy == ExecutionStrategy::Streaming
    }

    pub fn is_worker(&self) -> bool {
        self.role == ProcessRole::Worker
    }

    /// Build from `MODELZOO_*` variables, falling back to the usual
    /// `RANK`/`WORLD_SIZE` pair and then to a single process.
    pub fn from_env() -> Result<Self, ContextError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ContextError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let strategy = match lookup("MODELZOO_EXECUTION_STRATEGY") {
            Some(raw) => {
                ExecutionStrategy::parse(&raw).ok_or(ContextError::InvalidEnv {
                    key: "MODELZOO_EXECUTION_STRATEGY",
                    value: raw,
                })?
            }
            None => ExecutionStrategy::Pipeline,
        };
        let role = match lookup("MODELZOO_PROCESS_ROLE").as_deref() {
            Some("worker") => ProcessRole::Worker,
            Some("coordinator") | None => ProcessRole::Coordinator,
            Some(other) => {
                return Err(ContextError::InvalidEnv {
                    key: "MODELZOO_PROCESS_ROLE",
                    value: other.to_string(),
                })
            }
        };
        let task_id = parse_with_fallback(&lookup, "MODELZOO_TASK_ID", "RANK")?.unwrap_or(0);
        let num_tasks =
            parse_with_fallback(&lookup, "MODELZOO_NUM_TASKS", "WORLD_SIZE")?.unwrap_or(1);
        let fixed_batch_target = lookup("MODELZOO_FIXED_BATCH")
            .map(|v| v.trim().to_ascii_lowercase())
            .map(|v| v == "1" || v == "true" || v == "on")
            .unwrap_or(false);
        let worker_cache_root = lookup("MODELZOO_WORKER_CACHE_ROOT")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKER_CACHE_ROOT));

        Ok(Self::new(strategy, role, task_id, num_tasks)?
            .with_fixed_batch_target(fixed_batch_target)
            .with_worker_cache_root(worker_cache_root))
    }
}

/// `fallback` is only consulted (and validated) when `primary` is unset.
fn parse_with_fallback<F>(
    lookup: &F,
    primary: &'static str,
    fallback: &'static str,
) -> Result<Option<usize>, ContextError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_usize(lookup, primary)? {
        Some(value) => Ok(Some(value)),
        None => parse_usize(lookup, fallback),
    }
}

fn parse_usize<F>(lookup: &F, key: &'static str) -> Result<Option<usize>, ContextError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ContextError::InvalidEnv { key, value: raw }),
        None => Ok(None),
    }
}
