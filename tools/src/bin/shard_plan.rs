//! Print the indices each task draws from a dataset of a given length.

use anyhow::{Context, Result};
use burn_dataset::ShardedSampler;
use clap::Parser;
use cli_support::{ExecutionArgs, SamplerArgs};
use modelzoo_tools::ToolConfig;
use run_contracts::ExecutionContext;

#[derive(Parser, Debug)]
#[command(
    name = "shard_plan",
    about = "Show how a dataset is split across tasks by the sharded sampler"
)]
struct Args {
    /// Number of items in the dataset.
    #[arg(long)]
    dataset_len: usize,
    /// Number of passes to print per task.
    #[arg(long, default_value_t = 1)]
    passes: usize,
    /// Print every task instead of only the one selected by --task-id.
    #[arg(long, default_value_t = false)]
    all_tasks: bool,
    #[command(flatten)]
    exec: ExecutionArgs,
    #[command(flatten)]
    sampler: SamplerArgs,
}

fn main() -> Result<()> {
    cli_support::init_tracing();
    let args = Args::parse();
    let tools = ToolConfig::load();
    let sampler_cfg = args.sampler.apply(tools.sampler.clone());
    let ctx = args.exec.resolve().context("resolve execution context")?;

    let tasks: Vec<usize> = if args.all_tasks {
        (0..ctx.num_tasks()).collect()
    } else {
        vec![ctx.task_id()]
    };
    for task_id in tasks {
        let task_ctx = ExecutionContext::new(ctx.strategy, ctx.role, task_id, ctx.num_tasks())?
            .with_fixed_batch_target(ctx.fixed_batch_target);
        let mut sampler = ShardedSampler::new(args.dataset_len, &task_ctx, sampler_cfg.clone())?;
        println!(
            "task {task_id}/{}: {} samples per pass (total_size {})",
            sampler.num_tasks(),
            sampler.len(),
            sampler.total_size()
        );
        for pass in 0..args.passes {
            let shard = sampler.epoch_indices();
            println!("  pass {pass}: {shard:?}");
        }
    }
    Ok(())
}
