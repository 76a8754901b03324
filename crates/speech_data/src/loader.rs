//! src/loader.rs
//!
//! Single-threaded glue between the sampler, the dataset and the collator.
//!
//! ```text
//!   DistributedBucketSampler ──(index batch)──> Dataset::fetch ──(samples)──> Collator
//!                                                                               │
//!                                                            SpeechBatch <──────┘
//! ```
//!
//! Any fetch or collate error is yielded once and ends the epoch; nothing is retried
//! or skipped.

use crate::collator::{Collator, SpeechCollator};
use crate::dataset::Dataset;
use crate::minibatch::SpeechBatch;
use crate::sample::SpeechSample;
use crate::sampler::{DistributedBucketSampler, DistributedConfig};
use anyhow::{Context, Result};

/// Produces padded batches for one replica.
///
/// # Example
/// ```ignore
/// let config = DistributedConfig::new(dataset.len(), world_size, rank);
/// let loader = SpeechLoader::new(dataset, &hparams.boundaries, hparams.batch_size, config)?;
/// for epoch in 0..num_epochs {
///     for batch in loader.iter(epoch) {
///         let batch = batch?.to_device(device);
///         // training step
///     }
/// }
/// ```
pub struct SpeechLoader<D, C = SpeechCollator> {
    dataset: D,
    sampler: DistributedBucketSampler,
    collator: C,
}

impl<D: Dataset> SpeechLoader<D, SpeechCollator> {
    /// Buckets the dataset's lengths and uses the default [`SpeechCollator`].
    pub fn new(
        dataset: D,
        boundaries: &[usize],
        batch_size: usize,
        config: DistributedConfig,
    ) -> Result<Self> {
        Self::new_with_collator(dataset, boundaries, batch_size, config, SpeechCollator::new())
    }
}

impl<D: Dataset, C: Collator> SpeechLoader<D, C> {
    pub fn new_with_collator(
        dataset: D,
        boundaries: &[usize],
        batch_size: usize,
        config: DistributedConfig,
        collator: C,
    ) -> Result<Self> {
        let sampler =
            DistributedBucketSampler::new(dataset.lengths(), boundaries, batch_size, config)
                .context("Failed to build the bucket sampler")?;
        Ok(Self {
            dataset,
            sampler,
            collator,
        })
    }

    pub fn sampler(&self) -> &DistributedBucketSampler {
        &self.sampler
    }

    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    /// Batches this replica yields per epoch.
    pub fn len(&self) -> usize {
        self.sampler.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sampler.is_empty()
    }

    /// Fetches and collates one batch of indices.
    pub fn load_batch(&self, indices: &[usize]) -> Result<SpeechBatch> {
        let samples = indices
            .iter()
            .map(|&i| {
                self.dataset
                    .fetch(i)
                    .with_context(|| format!("Failed to fetch sample {}", i))
            })
            .collect::<Result<Vec<SpeechSample>>>()?;
        self.collator.collate(&samples)
    }

    /// Iterates the padded batches of `epoch`. Stops after the first error.
    pub fn iter(&self, epoch: usize) -> impl Iterator<Item = Result<SpeechBatch>> + '_ {
        let mut failed = false;
        self.sampler
            .batches(epoch)
            .into_iter()
            .map_while(move |indices| {
                if failed {
                    return None;
                }
                let batch = self.load_batch(&indices);
                failed = batch.is_err();
                Some(batch)
            })
    }
}
