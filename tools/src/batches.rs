//! JSON-lines batch records for offline mIoU evaluation.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use burn::tensor::TensorData;
use serde::{Deserialize, Serialize};

/// One evaluation batch: flattened class ids plus the shape they came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub labels: Vec<i64>,
    pub predictions: Vec<i64>,
    #[serde(default)]
    pub weights: Option<Vec<f32>>,
    pub shape: Vec<usize>,
}

/// Tensors ready to hand to a metric update.
#[derive(Debug, Clone)]
pub struct BatchTensors {
    pub labels: TensorData,
    pub predictions: TensorData,
    pub weights: Option<TensorData>,
}

impl BatchRecord {
    /// Number of elements `shape` describes.
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn into_tensors(self) -> Result<BatchTensors> {
        let n = self.num_elements();
        if self.labels.len() != n {
            bail!("labels hold {} values but shape {:?} needs {n}", self.labels.len(), self.shape);
        }
        // Predictions may disagree in length; the metric reports that as a
        // shape mismatch, so give them the shape their length implies.
        let pred_shape = if self.predictions.len() == n {
            self.shape.clone()
        } else {
            vec![self.predictions.len()]
        };
        let weights = match self.weights {
            Some(w) if w.len() == n => Some(TensorData::new(w, self.shape.clone())),
            Some(w) => {
                let len = w.len();
                Some(TensorData::new(w, vec![len]))
            }
            None => None,
        };
        Ok(BatchTensors {
            labels: TensorData::new(self.labels, self.shape),
            predictions: TensorData::new(self.predictions, pred_shape),
            weights,
        })
    }
}

/// Read every non-empty line of `path` as a [`BatchRecord`].
pub fn read_batches(path: &Path) -> Result<Vec<BatchRecord>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut out = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: BatchRecord = serde_json::from_str(&line)
            .with_context(|| format!("parse {}:{}", path.display(), lineno + 1))?;
        out.push(record);
    }
    Ok(out)
}
