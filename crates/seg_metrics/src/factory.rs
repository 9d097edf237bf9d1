use burn::tensor::backend::Backend;
use run_contracts::{ExecutionContext, ExecutionStrategy};

use crate::metric::Metric;
use crate::pipeline::PipelineMeanIou;
use crate::streaming::StreamingMeanIou;
use crate::types::MetricResult;

/// Build the mIoU metric matching the active execution strategy.
///
/// Streaming processes get the device-accumulating variant on `device`;
/// everything else accumulates on the host and ignores `device`.
pub fn mean_iou_metric<B: Backend>(
    ctx: &ExecutionContext,
    num_classes: usize,
    name: Option<&str>,
    device: &B::Device,
) -> MetricResult<Box<dyn Metric<B>>> {
    match ctx.strategy {
        ExecutionStrategy::Streaming => {
            tracing::debug!(num_classes, "mean_iou_metric: device-accumulating variant");
            Ok(Box::new(StreamingMeanIou::<B>::new(
                num_classes,
                name,
                device,
            )?))
        }
        ExecutionStrategy::Pipeline => {
            tracing::debug!(num_classes, "mean_iou_metric: host-accumulating variant");
            Ok(Box::new(PipelineMeanIou::new(num_classes, name)?))
        }
    }
}
