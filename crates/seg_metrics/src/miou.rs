//! Mean intersection-over-union reduction of a confusion matrix.
//!
//! For each class `c`, `iou[c] = M[c, c] / (Σ_r M[r, c] + Σ_k M[c, k] - M[c, c])`.
//! The mean runs only over classes present in either labels or predictions
//! (non-zero denominator); with no such class the result is `0`.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use crate::confusion::ConfusionMatrix;

pub fn mean_iou(cm: &ConfusionMatrix) -> f32 {
    let n = cm.num_classes();
    let mut iou_sum = 0.0f32;
    let mut num_valid = 0.0f32;
    for c in 0..n {
        // Summing over rows gives the predicted total for `c`, over columns
        // the ground-truth total.
        let sum_over_row: f32 = (0..n).map(|r| cm.get(r, c)).sum();
        let sum_over_col: f32 = (0..n).map(|k| cm.get(c, k)).sum();
        let diag = cm.get(c, c);
        let denominator = sum_over_row + sum_over_col - diag;
        if denominator != 0.0 {
            num_valid += 1.0;
        }
        let safe = if denominator > 0.0 { denominator } else { 1.0 };
        iou_sum += diag / safe;
    }
    if num_valid > 0.0 {
        iou_sum / num_valid
    } else {
        0.0
    }
}

/// Device-side [`mean_iou`]. Returns a one-element tensor on the matrix's
/// device so the caller decides when to pay for the transfer.
pub fn mean_iou_tensor<B: Backend>(cm: Tensor<B, 2>) -> Tensor<B, 1> {
    let [n, _] = cm.dims();
    let device = cm.device();

    let sum_over_row = cm.clone().sum_dim(0).reshape([n]);
    let sum_over_col = cm.clone().sum_dim(1).reshape([n]);
    let eye = Tensor::<B, 2>::from_data(TensorData::new(identity(n), [n, n]), &device);
    let diag = (eye * cm).sum_dim(1).reshape([n]);
    let denominator = sum_over_row + sum_over_col - diag.clone();

    let empty = denominator.clone().equal_elem(0.0);
    let num_valid = empty.clone().bool_not().float().sum();
    let iou = diag / denominator.mask_fill(empty, 1.0);

    // An empty class has a zero diagonal, so the sum is 0 whenever
    // num_valid is; dividing by 1 there yields the defined 0.
    let divisor = num_valid.clone().mask_fill(num_valid.equal_elem(0.0), 1.0);
    iou.sum() / divisor
}

fn identity(n: usize) -> Vec<f32> {
    let mut out = vec![0.0; n * n];
    for c in 0..n {
        out[c * n + c] = 1.0;
    }
    out
}
