//! Mirror a shared dataset directory into this worker's local cache.

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn_dataset::create_worker_cache;
use clap::Parser;
use cli_support::{ExecutionArgs, WorkerCacheArgs};
use modelzoo_tools::ToolConfig;

#[derive(Parser, Debug)]
#[command(
    name = "worker_cache",
    about = "Copy a dataset directory into the worker cache unless it already matches"
)]
struct Args {
    /// Shared dataset directory to mirror.
    src: PathBuf,
    #[command(flatten)]
    exec: ExecutionArgs,
    #[command(flatten)]
    cache: WorkerCacheArgs,
}

fn main() -> Result<()> {
    cli_support::init_tracing();
    let args = Args::parse();
    let tools = ToolConfig::load();

    let root_overridden = args.exec.cache_root.is_some()
        || std::env::var_os("MODELZOO_WORKER_CACHE_ROOT").is_some();
    let ctx = args.exec.resolve().context("resolve execution context")?;
    let ctx = tools.apply_cache_root(ctx, root_overridden);
    let cfg = tools.layered_worker_cache_config(|key| std::env::var(key).ok(), &args.cache);
    tracing::debug!(
        cache_root = %ctx.worker_cache_root.display(),
        quota_bytes = ?cfg.quota_bytes,
        progress_every = cfg.progress_every,
        "worker cache settings"
    );

    let dest = create_worker_cache(&args.src, &ctx, &cfg, args.cache.force)
        .with_context(|| format!("caching {}", args.src.display()))?;
    println!("{}", dest.display());
    Ok(())
}
