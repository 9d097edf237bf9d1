//! Deterministic sharding of dataset indices across distributed tasks.

use crate::types::{BurnDatasetError, DatasetResult, SamplerConfig};
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::SeedableRng;
use run_contracts::ExecutionContext;

/// Restricts data loading to this task's share of a fixed-size dataset.
///
/// All tasks build the same padded or truncated index list (`total_size`
/// entries) and take the strided slice starting at their own id, so every
/// task sees exactly `num_samples` indices.
#[derive(Debug, Clone)]
pub struct ShardedSampler {
    indices: Vec<usize>,
    dataset_len: usize,
    task_id: usize,
    num_tasks: usize,
    num_samples: usize,
    total_size: usize,
    cfg: SamplerConfig,
}

impl ShardedSampler {
    pub fn for_items<T>(
        items: &[T],
        ctx: &ExecutionContext,
        cfg: SamplerConfig,
    ) -> DatasetResult<Self> {
        Self::new(items.len(), ctx, cfg)
    }

    pub fn new(dataset_len: usize, ctx: &ExecutionContext, cfg: SamplerConfig) -> DatasetResult<Self> {
        if ctx.fixed_batch_target && !cfg.drop_last {
            return Err(BurnDatasetError::UnevenBatchesUnsupported);
        }
        let num_tasks = ctx.num_tasks();
        let task_id = ctx.task_id();

        // An evenly divisible length needs no dropping even with drop_last.
        let num_samples = if cfg.drop_last && dataset_len % num_tasks != 0 {
            dataset_len / num_tasks
        } else {
            dataset_len.div_ceil(num_tasks)
        };
        let total_size = num_samples * num_tasks;

        let mut indices: Vec<usize> = (0..dataset_len).collect();
        if cfg.drop_last {
            indices.truncate(total_size);
        } else {
            let padding = padding_indices(dataset_len, total_size - dataset_len, cfg.seed);
            indices.extend(padding);
        }
        if indices.len() != total_size {
            return Err(BurnDatasetError::IndexCountMismatch {
                found: indices.len(),
                expected: total_size,
            });
        }
        tracing::debug!(
            dataset_len,
            num_tasks,
            task_id,
            num_samples,
            total_size,
            "sharded sampler plan"
        );

        Ok(Self {
            indices,
            dataset_len,
            task_id,
            num_tasks,
            num_samples,
            total_size,
            cfg,
        })
    }

    /// One pass over this task's shard. Reshuffles the shared index list
    /// first when shuffling is on.
    pub fn iter(&mut self) -> impl Iterator<Item = usize> + '_ {
        if self.cfg.shuffle {
            let mut rng = seeded_rng(self.cfg.seed);
            self.indices.shuffle(&mut rng);
        }
        debug_assert_eq!(
            self.indices[self.task_id.min(self.indices.len())..]
                .iter()
                .step_by(self.num_tasks)
                .count(),
            self.num_samples
        );
        self.indices[self.task_id.min(self.indices.len())..]
            .iter()
            .step_by(self.num_tasks)
            .copied()
    }

    pub fn epoch_indices(&mut self) -> Vec<usize> {
        self.iter().collect()
    }

    /// Indices this task yields per pass.
    pub fn len(&self) -> usize {
        self.num_samples
    }

    pub fn is_empty(&self) -> bool {
        self.num_samples == 0
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn dataset_len(&self) -> usize {
        self.dataset_len
    }

    pub fn task_id(&self) -> usize {
        self.task_id
    }

    pub fn num_tasks(&self) -> usize {
        self.num_tasks
    }

    /// Full padded/truncated index list shared by all tasks, in its current
    /// order.
    pub fn plan(&self) -> &[usize] {
        &self.indices
    }
}

/// Yields passes of a [`ShardedSampler`] back to back, forever.
#[derive(Debug, Clone)]
pub struct RepeatSampler {
    sampler: ShardedSampler,
    pass: Vec<usize>,
    cursor: usize,
    passes: usize,
}

impl RepeatSampler {
    pub fn new(sampler: ShardedSampler) -> Self {
        Self {
            sampler,
            pass: Vec::new(),
            cursor: 0,
            passes: 0,
        }
    }

    /// Length of one pass, which is what a loader built on this reports.
    pub fn epoch_len(&self) -> usize {
        self.sampler.len()
    }

    /// Passes started so far.
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// One epoch for a loader that keeps this iterator alive across epochs:
    /// exactly `epoch_len()` indices, continuing where the last epoch ended.
    pub fn next_epoch(&mut self) -> impl Iterator<Item = usize> + '_ {
        let len = self.epoch_len();
        self.by_ref().take(len)
    }
}

impl Iterator for RepeatSampler {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.sampler.is_empty() {
            return None;
        }
        if self.cursor >= self.pass.len() {
            self.pass = self.sampler.epoch_indices();
            self.cursor = 0;
            self.passes += 1;
        }
        let idx = self.pass[self.cursor];
        self.cursor += 1;
        Some(idx)
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

/// Draw `count` indices from `[0, dataset_len)` without replacement. When
/// more padding than data is needed, draws continue in fresh rounds.
fn padding_indices(dataset_len: usize, count: usize, seed: Option<u64>) -> Vec<usize> {
    if count == 0 || dataset_len == 0 {
        return Vec::new();
    }
    let mut rng = seeded_rng(seed);
    let base: Vec<usize> = (0..dataset_len).collect();
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let take = (count - out.len()).min(dataset_len);
        out.extend(base.choose_multiple(&mut rng, take).copied());
    }
    out
}
