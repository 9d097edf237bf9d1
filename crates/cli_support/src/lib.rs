//! Shared clap argument groups for the modelzoo binaries.

pub mod common;

pub use common::{ExecutionArgs, SamplerArgs, StrategyArg, WorkerCacheArgs};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the fmt subscriber used by every binary, honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
