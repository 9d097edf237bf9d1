//! The metric interface shared by host- and device-accumulating variants.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use half::f16;

use crate::confusion::ConfusionMatrix;
use crate::types::{MetricError, MetricResult};

/// Values computed on the device during `update`, waiting to be read back.
///
/// Holding one of these means the device phase of an update has committed
/// but the host phase has not run yet.
#[derive(Debug)]
pub struct DeviceOutputs<B: Backend> {
    pub values: Vec<Tensor<B, 1>>,
}

impl<B: Backend> DeviceOutputs<B> {
    pub fn new(values: Vec<Tensor<B, 1>>) -> Self {
        Self { values }
    }

    /// Read every pending scalar back to the host at reduced precision.
    pub fn transfer(self) -> MetricResult<HostOutputs> {
        let mut values = Vec::with_capacity(self.values.len());
        for tensor in self.values {
            let [len] = tensor.dims();
            if len != 1 {
                return Err(MetricError::Transfer(format!(
                    "expected a scalar device output, found {len} elements"
                )));
            }
            values.push(f16::from_f32(tensor.into_scalar().elem::<f32>()));
        }
        Ok(HostOutputs { values })
    }
}

/// Device outputs after the transfer, ready for the host phase.
#[derive(Debug, Clone, PartialEq)]
pub struct HostOutputs {
    pub values: Vec<f16>,
}

pub trait Metric<B: Backend> {
    fn name(&self) -> &str;

    fn num_classes(&self) -> usize;

    /// Zero the accumulated state. The matrix shape stays fixed.
    fn reset(&mut self);

    /// Accumulate one batch. Returns outputs that must go through
    /// [`DeviceOutputs::transfer`] and [`Metric::update_on_host`] when the
    /// metric runs its update on the device.
    fn update(
        &mut self,
        labels: &TensorData,
        predictions: &TensorData,
        weights: Option<&TensorData>,
    ) -> MetricResult<Option<DeviceOutputs<B>>>;

    /// Host phase of a device update.
    fn update_on_host(&mut self, outputs: HostOutputs) -> MetricResult<()> {
        let _ = outputs;
        Err(MetricError::NoDevicePhase {
            name: self.name().to_string(),
        })
    }

    /// Current metric value. Never mutates state.
    fn compute(&self) -> f32;

    /// Host copy of the accumulated confusion matrix.
    fn confusion_matrix(&self) -> ConfusionMatrix;
}

/// Run a full update: the device phase (if any), the transfer, and the host
/// phase, in that order.
pub fn update_and_finalize<B: Backend>(
    metric: &mut dyn Metric<B>,
    labels: &TensorData,
    predictions: &TensorData,
    weights: Option<&TensorData>,
) -> MetricResult<()> {
    if let Some(outputs) = metric.update(labels, predictions, weights)? {
        metric.update_on_host(outputs.transfer()?)?;
    }
    Ok(())
}

pub(crate) fn check_shapes(
    labels: &TensorData,
    predictions: &TensorData,
    weights: Option<&TensorData>,
) -> MetricResult<()> {
    if labels.shape != predictions.shape {
        return Err(MetricError::ShapeMismatch {
            operand: "predictions",
            expected: labels.shape.clone(),
            found: predictions.shape.clone(),
        });
    }
    if let Some(weights) = weights {
        if weights.shape != labels.shape {
            return Err(MetricError::ShapeMismatch {
                operand: "weights",
                expected: labels.shape.clone(),
                found: weights.shape.clone(),
            });
        }
    }
    Ok(())
}

pub(crate) fn resolve_name(name: Option<&str>) -> String {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_NAME)
        .to_string()
}

pub const DEFAULT_NAME: &str = "MeanIOU";
