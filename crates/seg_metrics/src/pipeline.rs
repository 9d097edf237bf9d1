//! Host-accumulating mIoU for the pipeline execution strategy.

use burn::tensor::backend::Backend;
use burn::tensor::TensorData;

use crate::confusion::{confusion_matrix_host, ConfusionMatrix};
use crate::metric::{check_shapes, resolve_name, DeviceOutputs, Metric};
use crate::miou::mean_iou;
use crate::types::{MetricError, MetricResult};

/// Keeps the running confusion matrix on the control process and reduces it
/// on demand.
#[derive(Debug, Clone)]
pub struct PipelineMeanIou {
    name: String,
    confusion: ConfusionMatrix,
}

impl PipelineMeanIou {
    pub fn new(num_classes: usize, name: Option<&str>) -> MetricResult<Self> {
        if num_classes == 0 {
            return Err(MetricError::InvalidNumClasses);
        }
        Ok(Self {
            name: resolve_name(name),
            confusion: ConfusionMatrix::zeros(num_classes),
        })
    }
}

impl<B: Backend> Metric<B> for PipelineMeanIou {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_classes(&self) -> usize {
        self.confusion.num_classes()
    }

    fn reset(&mut self) {
        self.confusion = ConfusionMatrix::zeros(self.confusion.num_classes());
    }

    fn update(
        &mut self,
        labels: &TensorData,
        predictions: &TensorData,
        weights: Option<&TensorData>,
    ) -> MetricResult<Option<DeviceOutputs<B>>> {
        check_shapes(labels, predictions, weights)?;
        let batch = confusion_matrix_host(
            labels,
            predictions,
            weights,
            self.confusion.num_classes(),
        );
        self.confusion.add_assign(&batch);
        Ok(None)
    }

    fn compute(&self) -> f32 {
        mean_iou(&self.confusion)
    }

    fn confusion_matrix(&self) -> ConfusionMatrix {
        self.confusion.clone()
    }
}
