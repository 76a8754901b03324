use crate::bucket::{Bucket, LengthBuckets};
use anyhow::{ensure, Result};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use tracing::debug;

/// A `Sampler` defines the strategy for how to iterate and draw samples from
/// a dataset.
///
/// # Associated type
/// - `Item`: The handle yielded by the iterator. For the bucket sampler this is a
///   whole batch of sample indices (`Vec<usize>`).
///
/// # Method
/// - `iter(epoch)`: returns the sequence for that epoch. The epoch is an explicit
///   input, so the same sampler gives the same sequence for the same epoch no matter
///   how many times, or from which thread, it is asked.
///
/// Implementations must be `Send + Sync` so the same sampler instance can be
/// shared read-only between the training loop and loading threads.
pub trait Sampler: Send + Sync {
    type Item: Send + Sync;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send + '_>;
}

/// ============================================================================
/// Where this process sits in a distributed run.
///
/// # Arguments:
/// - `dataset_size`: Total number of samples in the dataset (including ones that the
///                   bucket boundaries will later discard).
/// - `num_replicas`: Total number of parallel training replicas.
/// - `rank`: Unique ID for this replica. Must satisfy `0 <= rank < num_replicas`.
/// - `shuffle`: Whether bucket contents and batch order are shuffled every epoch.
/// - `base_seed`: Added to the epoch to seed the RNG. Every replica must use the
///                same value. Defaults to 0, i.e. the epoch alone is the seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedConfig {
    pub dataset_size: usize,
    pub num_replicas: usize,
    pub rank: usize,
    pub shuffle: bool,
    pub base_seed: u64,
}

impl DistributedConfig {
    /// Shuffled configuration for `rank` out of `num_replicas`.
    pub fn new(dataset_size: usize, num_replicas: usize, rank: usize) -> Self {
        Self {
            dataset_size,
            num_replicas,
            rank,
            shuffle: true,
            base_seed: 0,
        }
    }

    /// Single-process configuration (`num_replicas = 1`, `rank = 0`).
    pub fn single(dataset_size: usize) -> Self {
        Self::new(dataset_size, 1, 0)
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_base_seed(mut self, base_seed: u64) -> Self {
        self.base_seed = base_seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.num_replicas > 0, "Number of replicas must be > 0");
        ensure!(
            self.rank < self.num_replicas,
            "Invalid rank {}, rank should be in the interval [0, {}]",
            self.rank,
            self.num_replicas.saturating_sub(1)
        );
        Ok(())
    }

    /// Derives a deterministic random number generator for the given epoch
    #[inline]
    fn derive_rng_for_epoch(&self, epoch: usize) -> StdRng {
        StdRng::seed_from_u64(self.base_seed.wrapping_add(epoch as u64))
    }
}

/// ============================================================================
/// Batches indices so that every batch holds samples of a single length class, and
/// every replica receives the same number of batches.
///
/// # Arguments:
/// - `lengths`: One bucketing length per sample (e.g. spectrogram frames).
/// - `boundaries`: Ascending thresholds; bucket `k` holds lengths in
///                 `(boundaries[k], boundaries[k + 1]]`. Samples outside the outer
///                 boundaries are never yielded. Empty buckets are pruned once, here.
/// - `batch_size`: Samples per batch on each replica.
/// - `config`: Replica layout and shuffle settings.
///
/// # Per-epoch layout
/// 1. Seed an RNG with `base_seed + epoch`. All replicas compute the same global
///    layout and only differ in step 4.
/// 2. Permute each bucket's local positions (identity when `shuffle = false`).
/// 3. Cyclically extend each permutation to the bucket's padded length.
/// 4. Keep every `num_replicas`-th entry starting at `rank`.
/// 5. Cut the rank-local list into batches of exactly `batch_size`.
/// 6. Concatenate all buckets' batches and, when shuffling, permute the batch order
///    with the same RNG.
///
/// ```text
/// bucket = [a, b, c, d, e], batch_size = 2, num_replicas = 2 -> padded to 8
///   extended: [a, b, c, d, e, a, b, c]
///   rank 0:   [a, c, e, b] -> [a, c], [e, b]
///   rank 1:   [b, d, a, c] -> [b, d], [a, c]
/// ```
///
/// # Example
/// ```ignore
/// let config = DistributedConfig::new(lengths.len(), world_size, rank);
/// let mut sampler = DistributedBucketSampler::new(&lengths, &boundaries, 16, config)?;
/// for epoch in 0..num_epochs {
///     sampler.set_epoch(epoch);
///     for batch in sampler.current_batches() {
///         // fetch and collate `batch`
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DistributedBucketSampler {
    config: DistributedConfig,
    batch_size: usize,
    buckets: LengthBuckets,
    epoch: usize,
}

impl DistributedBucketSampler {
    pub fn new(
        lengths: &[usize],
        boundaries: &[usize],
        batch_size: usize,
        config: DistributedConfig,
    ) -> Result<Self> {
        config.validate()?;
        ensure!(
            lengths.len() == config.dataset_size,
            "The number of lengths ({}) does not match the dataset size ({})",
            lengths.len(),
            config.dataset_size
        );
        let buckets =
            LengthBuckets::build(lengths, boundaries, batch_size, config.num_replicas)?;
        ensure!(
            buckets.buckets().iter().all(|b| b.padded_len > 0),
            "Bucket padded to zero samples"
        );

        Ok(Self {
            config,
            batch_size,
            buckets,
            epoch: 0,
        })
    }

    pub fn config(&self) -> &DistributedConfig {
        &self.config
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn buckets(&self) -> &[Bucket] {
        self.buckets.buckets()
    }

    /// Boundaries that survived empty-bucket pruning.
    pub fn boundaries(&self) -> &[usize] {
        self.buckets.boundaries()
    }

    /// Padded sample count over all replicas.
    pub fn total_size(&self) -> usize {
        self.buckets.total_size()
    }

    /// Samples this replica sees per epoch.
    pub fn num_samples(&self) -> usize {
        self.total_size() / self.config.num_replicas
    }

    /// Batches this replica sees per epoch.
    pub fn len(&self) -> usize {
        self.num_samples() / self.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Sets the epoch used by [`current_batches`](Self::current_batches).
    /// Every replica must be given the same value.
    pub fn set_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
    }

    /// Batches for the epoch last passed to [`set_epoch`](Self::set_epoch).
    pub fn current_batches(&self) -> Vec<Vec<usize>> {
        self.batches(self.epoch)
    }

    /// This replica's sample indices per bucket for `epoch`, after padding and
    /// subsampling but before batching.
    pub fn rank_local_buckets(&self, epoch: usize) -> Vec<Vec<usize>> {
        self.layout(&mut self.config.derive_rng_for_epoch(epoch))
    }

    /// This replica's batches for `epoch`.
    pub fn batches(&self, epoch: usize) -> Vec<Vec<usize>> {
        let mut rng = self.config.derive_rng_for_epoch(epoch);
        let per_bucket = self.layout(&mut rng);

        // Remainders cannot occur: padded lengths are multiples of
        // num_replicas * batch_size.
        let mut batches: Vec<Vec<usize>> = per_bucket
            .iter()
            .flat_map(|ids| ids.chunks_exact(self.batch_size).map(<[usize]>::to_vec))
            .collect();

        if self.config.shuffle {
            batches.shuffle(&mut rng);
        }

        assert_eq!(
            batches.len() * self.batch_size,
            self.num_samples(),
            "every replica must see num_samples indices per epoch"
        );
        debug!(
            epoch,
            rank = self.config.rank,
            batches = batches.len(),
            "generated bucketed batches"
        );
        batches
    }

    /// Steps 2-4 of the per-epoch layout, drawing from `rng` in bucket order.
    fn layout(&self, rng: &mut StdRng) -> Vec<Vec<usize>> {
        let buckets = self.buckets.buckets();

        let permutations: Vec<Vec<usize>> = buckets
            .iter()
            .map(|bucket| {
                let mut ids: Vec<usize> = (0..bucket.len()).collect();
                if self.config.shuffle {
                    ids.shuffle(&mut *rng);
                }
                ids
            })
            .collect();

        buckets
            .iter()
            .zip(permutations)
            .map(|(bucket, ids)| {
                extend_cyclic(ids, bucket.padded_len)
                    .into_iter()
                    .skip(self.config.rank)
                    .step_by(self.config.num_replicas)
                    .map(|local| bucket.indices[local])
                    .collect()
            })
            .collect()
    }
}

impl Sampler for DistributedBucketSampler {
    type Item = Vec<usize>;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Vec<usize>> + Send + '_> {
        Box::new(self.batches(epoch).into_iter())
    }
}

/// Repeats `ids` whole as often as it fits, then appends a prefix, to reach `target`.
fn extend_cyclic(ids: Vec<usize>, target: usize) -> Vec<usize> {
    let len = ids.len();
    if len == 0 || target <= len {
        return ids;
    }
    let rem = target - len;
    let mut extended = Vec::with_capacity(target);
    for _ in 0..=(rem / len) {
        extended.extend_from_slice(&ids);
    }
    extended.extend_from_slice(&ids[..rem % len]);
    extended
}
