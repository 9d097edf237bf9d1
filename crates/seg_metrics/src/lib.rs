//! Streaming mean-IoU for semantic segmentation.
//!
//! This crate provides:
//! - A confusion-matrix accumulator with host and device construction
//! - The mIoU reduction, on host slices and on device tensors
//! - A host-accumulating variant for pipeline execution
//! - A device-accumulating variant with an explicit device/host split
//! - A factory choosing between them from an `ExecutionContext`

pub mod confusion;
pub mod factory;
pub mod metric;
pub mod miou;
pub mod pipeline;
pub mod streaming;
pub mod types;

pub use confusion::{confusion_matrix_device, confusion_matrix_host, ConfusionMatrix};
pub use factory::mean_iou_metric;
pub use metric::{update_and_finalize, DeviceOutputs, HostOutputs, Metric, DEFAULT_NAME};
pub use miou::{mean_iou, mean_iou_tensor};
pub use pipeline::PipelineMeanIou;
pub use streaming::StreamingMeanIou;
pub use types::{MetricError, MetricResult};
