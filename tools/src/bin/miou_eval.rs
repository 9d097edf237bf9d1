//! Evaluate mean IoU over JSON-lines batches of labels and predictions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cli_support::ExecutionArgs;
use modelzoo_tools::read_batches;
use seg_metrics::{mean_iou_metric, update_and_finalize, Metric};

#[cfg(feature = "backend-wgpu")]
type EvalBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
type EvalBackend = burn_ndarray::NdArray<f32>;

#[derive(Parser, Debug)]
#[command(
    name = "miou_eval",
    about = "Accumulate a confusion matrix over JSON-lines batches and report mean IoU"
)]
struct Args {
    /// JSON-lines file; each line holds {labels, predictions, weights?, shape}.
    #[arg(long)]
    batches: PathBuf,
    /// Number of segmentation classes.
    #[arg(long)]
    num_classes: usize,
    /// Metric name reported alongside the value.
    #[arg(long)]
    name: Option<String>,
    /// Print the accumulated confusion matrix.
    #[arg(long, default_value_t = false)]
    show_matrix: bool,
    #[command(flatten)]
    exec: ExecutionArgs,
}

fn main() -> Result<()> {
    cli_support::init_tracing();
    let args = Args::parse();
    let ctx = args.exec.resolve().context("resolve execution context")?;
    let records = read_batches(&args.batches)?;
    if records.is_empty() {
        println!("No batches found in {}", args.batches.display());
        return Ok(());
    }

    let device = <EvalBackend as burn::tensor::backend::Backend>::Device::default();
    let mut metric =
        mean_iou_metric::<EvalBackend>(&ctx, args.num_classes, args.name.as_deref(), &device)?;
    let total = records.len();
    for (i, record) in records.into_iter().enumerate() {
        let batch = record
            .into_tensors()
            .with_context(|| format!("batch {i}"))?;
        update_and_finalize(
            metric.as_mut(),
            &batch.labels,
            &batch.predictions,
            batch.weights.as_ref(),
        )
        .with_context(|| format!("update with batch {i}"))?;
        tracing::debug!(batch = i, running = metric.compute(), "batch accumulated");
    }

    println!(
        "{} ({}, {} batches): {:.4}",
        metric.name(),
        ctx.strategy.as_str(),
        total,
        metric.compute()
    );
    if args.show_matrix {
        let cm = metric.confusion_matrix();
        let n = cm.num_classes();
        for row in cm.counts().chunks(n.max(1)) {
            let cells: Vec<String> = row.iter().map(|v| format!("{v:>8.1}")).collect();
            println!("{}", cells.join(" "));
        }
    }
    Ok(())
}
