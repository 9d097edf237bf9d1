//! Device-accumulating mIoU for the streaming execution strategy.
//!
//! The running matrix lives on the device and is reduced there on every
//! update; only the f16 scalar crosses to the host, where it is stored as
//! the finalized result.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use half::f16;

use crate::confusion::{confusion_matrix_device, ConfusionMatrix};
use crate::metric::{check_shapes, resolve_name, DeviceOutputs, HostOutputs, Metric};
use crate::miou::mean_iou_tensor;
use crate::types::{MetricError, MetricResult};

#[derive(Debug, Clone)]
pub struct StreamingMeanIou<B: Backend> {
    name: String,
    num_classes: usize,
    device: B::Device,
    confusion: Tensor<B, 2>,
    result: Option<f16>,
}

impl<B: Backend> StreamingMeanIou<B> {
    pub fn new(num_classes: usize, name: Option<&str>, device: &B::Device) -> MetricResult<Self> {
        if num_classes == 0 {
            return Err(MetricError::InvalidNumClasses);
        }
        Ok(Self {
            name: resolve_name(name),
            num_classes,
            device: device.clone(),
            confusion: Tensor::zeros([num_classes, num_classes], device),
            result: None,
        })
    }

    /// Device-resident state, keyed by name.
    pub fn on_device_state(&self) -> Vec<(&'static str, Tensor<B, 2>)> {
        vec![("confusion_matrix", self.confusion.clone())]
    }

    /// Last finalized value at transfer precision.
    pub fn finalized(&self) -> Option<f16> {
        self.result
    }
}

impl<B: Backend> Metric<B> for StreamingMeanIou<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn reset(&mut self) {
        self.confusion = Tensor::zeros([self.num_classes, self.num_classes], &self.device);
        self.result = None;
    }

    fn update(
        &mut self,
        labels: &TensorData,
        predictions: &TensorData,
        weights: Option<&TensorData>,
    ) -> MetricResult<Option<DeviceOutputs<B>>> {
        check_shapes(labels, predictions, weights)?;
        let batch = confusion_matrix_device::<B>(
            labels,
            predictions,
            weights,
            self.num_classes,
            &self.device,
        );
        self.confusion = self.confusion.clone() + batch;
        let mean_iou = mean_iou_tensor(self.confusion.clone());
        Ok(Some(DeviceOutputs::new(vec![mean_iou])))
    }

    fn update_on_host(&mut self, outputs: HostOutputs) -> MetricResult<()> {
        let value = outputs
            .values
            .first()
            .copied()
            .ok_or_else(|| MetricError::MissingDeviceOutput {
                name: self.name.clone(),
            })?;
        self.result = Some(value);
        Ok(())
    }

    /// Last value delivered by the host phase; `0.0` before the first one.
    fn compute(&self) -> f32 {
        self.result.map(f16::to_f32).unwrap_or(0.0)
    }

    fn confusion_matrix(&self) -> ConfusionMatrix {
        ConfusionMatrix::from_tensor(self.confusion.clone())
    }
}
