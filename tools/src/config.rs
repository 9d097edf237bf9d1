use std::path::{Path, PathBuf};

use burn_dataset::{SamplerConfig, WorkerCacheConfig, DEFAULT_PROGRESS_EVERY};
use cli_support::WorkerCacheArgs;
use run_contracts::{ExecutionContext, DEFAULT_WORKER_CACHE_ROOT};
use serde::Deserialize;

const DEFAULT_CONFIG_NAME: &str = "modelzoo-tools.toml";

#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub cache_root: PathBuf,
    pub quota_bytes: Option<u64>,
    pub progress_every: usize,
    pub sampler: SamplerConfig,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from(DEFAULT_WORKER_CACHE_ROOT),
            quota_bytes: None,
            progress_every: DEFAULT_PROGRESS_EVERY,
            sampler: SamplerConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ToolConfigFile {
    cache: Option<CacheSection>,
    sampler: Option<SamplerSection>,
}

#[derive(Debug, Deserialize, Default)]
struct CacheSection {
    root: Option<String>,
    quota_bytes: Option<u64>,
    progress_every: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplerSection {
    seed: Option<u64>,
    shuffle: Option<bool>,
    drop_last: Option<bool>,
}

impl ToolConfig {
    pub fn load() -> Self {
        let path = std::env::var("MODELZOO_TOOLS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_NAME));
        let cfg = Self::from_path(&path).unwrap_or_default();
        cfg.warn_if_invalid();
        cfg
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        let raw = std::fs::read_to_string(path).ok()?;
        match Self::from_toml(&raw) {
            Ok(cfg) => Some(cfg),
            Err(err) => {
                tracing::warn!("tools config {}: {err}", path.display());
                None
            }
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        let file: ToolConfigFile = toml::from_str(raw)?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: ToolConfigFile) -> Self {
        let cache = file.cache.unwrap_or_default();
        let sampler = file.sampler.unwrap_or_default();
        let defaults = SamplerConfig::default();

        ToolConfig {
            cache_root: cache
                .root
                .map(|v| expand_path(&v))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKER_CACHE_ROOT)),
            quota_bytes: cache.quota_bytes,
            progress_every: cache
                .progress_every
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_PROGRESS_EVERY),
            sampler: SamplerConfig {
                shuffle: sampler.shuffle.unwrap_or(defaults.shuffle),
                seed: sampler.seed.or(defaults.seed),
                drop_last: sampler.drop_last.unwrap_or(defaults.drop_last),
            },
        }
    }

    /// Cache tuning from the `[cache]` section. The root travels separately,
    /// on the execution context (see [`ToolConfig::apply_cache_root`]).
    pub fn worker_cache_config(&self) -> WorkerCacheConfig {
        WorkerCacheConfig {
            quota_bytes: self.quota_bytes,
            progress_every: self.progress_every,
        }
    }

    /// Cache tuning in increasing precedence: the `[cache]` section,
    /// `MODELZOO_WORKER_CACHE_QUOTA` / `MODELZOO_CACHE_PROGRESS_EVERY` as
    /// seen through `lookup`, then command-line flags.
    pub fn layered_worker_cache_config<F>(
        &self,
        lookup: F,
        flags: &WorkerCacheArgs,
    ) -> WorkerCacheConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        flags.apply(self.worker_cache_config().with_overrides_from(lookup))
    }

    /// Give `ctx` the configured cache root unless `root_overridden` says a
    /// flag or `MODELZOO_WORKER_CACHE_ROOT` already chose one.
    pub fn apply_cache_root(
        &self,
        ctx: ExecutionContext,
        root_overridden: bool,
    ) -> ExecutionContext {
        if root_overridden {
            ctx
        } else {
            ctx.with_worker_cache_root(&self.cache_root)
        }
    }

    fn warn_if_invalid(&self) {
        if self.cache_root.as_os_str().is_empty() {
            tracing::warn!("tools config: cache.root is empty; worker caches will land in the cwd");
        }
        if self.quota_bytes == Some(0) {
            tracing::warn!("tools config: cache.quota_bytes is 0; every cache copy will be refused");
        }
    }
}

fn expand_path(raw: &str) -> PathBuf {
    let mut out = raw.to_string();
    if let Some(stripped) = out.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            out = format!("{home}{stripped}");
        }
    }
    PathBuf::from(expand_env(&out))
}

/// Replace `${VAR}` with its value; unknown variables are left as written.
fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let key = &rest[start + 2..start + 2 + len];
        match std::env::var(key) {
            Ok(val) => out.push_str(&val),
            Err(_) => out.push_str(&rest[start..start + len + 3]),
        }
        rest = &rest[start + len + 3..];
    }
    out.push_str(rest);
    out
}
