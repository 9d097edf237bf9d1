//! Confusion-matrix state and per-batch construction on host and device.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use serde::{Deserialize, Serialize};

/// Square table of weighted counts. Rows index ground-truth labels, columns
/// index predicted labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    num_classes: usize,
    /// Row-major, `num_classes * num_classes` entries.
    counts: Vec<f32>,
}

impl ConfusionMatrix {
    pub fn zeros(num_classes: usize) -> Self {
        Self {
            num_classes,
            counts: vec![0.0; num_classes * num_classes],
        }
    }

    /// Build from row-major counts. Returns `None` when the length is not a
    /// perfect square of `num_classes`.
    pub fn from_counts(num_classes: usize, counts: Vec<f32>) -> Option<Self> {
        (counts.len() == num_classes * num_classes).then_some(Self {
            num_classes,
            counts,
        })
    }

    pub fn identity(num_classes: usize) -> Self {
        let mut cm = Self::zeros(num_classes);
        for c in 0..num_classes {
            cm.counts[c * num_classes + c] = 1.0;
        }
        cm
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn get(&self, truth: usize, predicted: usize) -> f32 {
        self.counts[truth * self.num_classes + predicted]
    }

    pub fn counts(&self) -> &[f32] {
        &self.counts
    }

    pub fn add_assign(&mut self, other: &ConfusionMatrix) {
        debug_assert_eq!(self.num_classes, other.num_classes);
        for (dst, src) in self.counts.iter_mut().zip(&other.counts) {
            *dst += *src;
        }
    }

    pub fn total(&self) -> f32 {
        self.counts.iter().sum()
    }

    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::from_data(
            TensorData::new(self.counts.clone(), [self.num_classes, self.num_classes]),
            device,
        )
    }

    pub fn from_tensor<B: Backend>(tensor: Tensor<B, 2>) -> Self {
        let [rows, _] = tensor.dims();
        let counts = tensor.into_data().iter::<f32>().collect();
        Self {
            num_classes: rows,
            counts,
        }
    }
}

/// Per-batch contribution computed on the host. Elements whose label or
/// prediction lies outside `[0, num_classes)` are not counted.
pub fn confusion_matrix_host(
    labels: &TensorData,
    predictions: &TensorData,
    weights: Option<&TensorData>,
    num_classes: usize,
) -> ConfusionMatrix {
    let mut cm = ConfusionMatrix::zeros(num_classes);
    let n = num_classes as i64;
    let weights: Box<dyn Iterator<Item = f32>> = match weights {
        Some(w) => Box::new(w.iter::<f32>()),
        None => Box::new(std::iter::repeat(1.0)),
    };
    for ((truth, pred), w) in labels
        .iter::<i64>()
        .zip(predictions.iter::<i64>())
        .zip(weights)
    {
        if !(0..n).contains(&truth) || !(0..n).contains(&pred) {
            continue;
        }
        cm.counts[truth as usize * num_classes + pred as usize] += w;
    }
    cm
}

/// Per-batch contribution computed on `device`.
///
/// Each element lands in cell `label * num_classes + prediction` of a flat
/// `num_classes^2` buffer through one scatter-add, with its weight (or 1) as
/// the value. Out-of-range classes are redirected to cell 0 with weight 0,
/// so they drop out the same way as on the host.
pub fn confusion_matrix_device<B: Backend>(
    labels: &TensorData,
    predictions: &TensorData,
    weights: Option<&TensorData>,
    num_classes: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let elements = labels.num_elements();
    if elements == 0 {
        return Tensor::zeros([num_classes, num_classes], device);
    }
    let n = num_classes as i64;
    let labels = flat_int::<B>(labels, device);
    let predictions = flat_int::<B>(predictions, device);
    let in_range = |t: &Tensor<B, 1, Int>| {
        t.clone().greater_equal_elem(0).int() * t.clone().lower_elem(n).int()
    };
    let valid = in_range(&labels) * in_range(&predictions);

    let cells = (labels.mul_scalar(n) + predictions) * valid.clone();
    let mut values = valid.float();
    if let Some(w) = weights {
        values = values
            * Tensor::<B, 1>::from_data(
                TensorData::new(w.iter::<f32>().collect::<Vec<_>>(), [elements]),
                device,
            );
    }
    Tensor::<B, 1>::zeros([num_classes * num_classes], device)
        .scatter(0, cells, values)
        .reshape([num_classes, num_classes])
}

fn flat_int<B: Backend>(data: &TensorData, device: &B::Device) -> Tensor<B, 1, Int> {
    let values: Vec<i64> = data.iter::<i64>().collect();
    let len = values.len();
    Tensor::from_data(TensorData::new(values, [len]), device)
}
