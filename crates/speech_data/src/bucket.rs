use anyhow::{anyhow, ensure, Result};
use tracing::debug;

/// A group of sample indices sharing one length class.
///
/// The bucket covers lengths in `(lower, upper]`. `padded_len` is the smallest multiple
/// of `num_replicas * batch_size` that is `>= indices.len()`, i.e. how many entries the
/// bucket contributes to one epoch once it has been cyclically extended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub lower: usize,
    pub upper: usize,
    pub indices: Vec<usize>,
    pub padded_len: usize,
}

impl Bucket {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Whether `length` falls inside this bucket's interval.
    pub fn contains(&self, length: usize) -> bool {
        self.lower < length && length <= self.upper
    }
}

/// Sample indices partitioned by length, with empty buckets pruned.
///
/// Built once from a snapshot of the boundaries:
/// 1. Every sample is located with a binary search over the untouched boundaries.
///    Lengths `<= boundaries[0]` or `> boundaries[last]` are dropped.
/// 2. A separate pass discards empty buckets and derives a new boundary list in which
///    surviving bucket `k` covers `(boundaries[k], boundaries[k + 1]]`. The range of an
///    empty interior bucket is absorbed by the next surviving one.
///
/// ```text
/// boundaries = [0, 10, 20, 30], lengths all in (10, 20]
///   raw buckets:    (0,10]=[]  (10,20]=[..]  (20,30]=[]
///   pruned:         (10,20]=[..]
///   boundaries  ->  [10, 20]
/// ```
#[derive(Debug, Clone)]
pub struct LengthBuckets {
    buckets: Vec<Bucket>,
    boundaries: Vec<usize>,
}

impl LengthBuckets {
    /// Partition `lengths` into buckets padded for `num_replicas * batch_size`.
    ///
    /// # Errors
    /// - `batch_size` or `num_replicas` is 0, or their product overflows
    /// - fewer than two boundaries, or boundaries not strictly ascending
    /// - no sample falls inside the boundaries
    pub fn build(
        lengths: &[usize],
        boundaries: &[usize],
        batch_size: usize,
        num_replicas: usize,
    ) -> Result<Self> {
        ensure!(
            batch_size > 0,
            "batch_size must be > 0, but got batch_size={}",
            batch_size
        );
        ensure!(num_replicas > 0, "Number of replicas must be > 0");
        ensure!(
            boundaries.len() >= 2,
            "At least two boundaries are required, but got {}",
            boundaries.len()
        );
        ensure!(
            boundaries.windows(2).all(|w| w[0] < w[1]),
            "Boundaries must be strictly ascending: {:?}",
            boundaries
        );

        let mut raw: Vec<Vec<usize>> = vec![Vec::new(); boundaries.len() - 1];
        let mut dropped = 0usize;
        for (index, &length) in lengths.iter().enumerate() {
            match bucket_index(boundaries, length) {
                Some(b) => raw[b].push(index),
                None => dropped += 1,
            }
        }

        let multiple = batch_size.checked_mul(num_replicas).ok_or_else(|| {
            anyhow!(
                "batch_size ({}) * num_replicas ({}) overflows usize",
                batch_size,
                num_replicas
            )
        })?;
        let (buckets, pruned) = prune_empty(raw, boundaries, multiple);
        ensure!(
            !buckets.is_empty(),
            "None of the {} samples has a length inside boundaries {:?}",
            lengths.len(),
            boundaries
        );
        ensure!(
            buckets
                .iter()
                .try_fold(0usize, |total, b| total.checked_add(b.padded_len))
                .is_some(),
            "Padded bucket sizes overflow usize for batch_size={} and num_replicas={}",
            batch_size,
            num_replicas
        );

        debug!(
            buckets = buckets.len(),
            dropped,
            boundaries = ?pruned,
            "built length buckets"
        );
        Ok(Self {
            buckets,
            boundaries: pruned,
        })
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Boundaries after pruning; `len() == buckets().len() + 1`.
    pub fn boundaries(&self) -> &[usize] {
        &self.boundaries
    }

    /// Per-bucket padded counts, in bucket order.
    pub fn padded_counts(&self) -> Vec<usize> {
        self.buckets.iter().map(|b| b.padded_len).collect()
    }

    /// Sum of padded counts across buckets (all replicas together).
    pub fn total_size(&self) -> usize {
        self.buckets.iter().map(|b| b.padded_len).sum()
    }

    /// Number of samples kept (before padding).
    pub fn num_kept(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }
}

/// Locates the bucket `k` with `boundaries[k] < length <= boundaries[k + 1]`.
pub fn bucket_index(boundaries: &[usize], length: usize) -> Option<usize> {
    // First boundary that is >= length; the bucket ends there.
    let upper = boundaries.partition_point(|&b| b < length);
    if upper == 0 || upper == boundaries.len() {
        None
    } else {
        Some(upper - 1)
    }
}

/// Rounds `len` up to a multiple of `multiple`. An exact multiple stays as is.
pub fn padded_len(len: usize, multiple: usize) -> usize {
    let rem = (multiple - len % multiple) % multiple;
    len + rem
}

fn prune_empty(
    raw: Vec<Vec<usize>>,
    boundaries: &[usize],
    multiple: usize,
) -> (Vec<Bucket>, Vec<usize>) {
    let mut buckets: Vec<Bucket> = Vec::with_capacity(raw.len());
    let mut pruned = Vec::with_capacity(boundaries.len());

    for (k, indices) in raw.into_iter().enumerate() {
        if indices.is_empty() {
            continue;
        }
        if pruned.is_empty() {
            pruned.push(boundaries[k]);
        }
        let lower = *pruned.last().unwrap_or(&boundaries[k]);
        let upper = boundaries[k + 1];
        pruned.push(upper);
        buckets.push(Bucket {
            lower,
            upper,
            padded_len: padded_len(indices.len(), multiple),
            indices,
        });
    }
    (buckets, pruned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locates_half_open_intervals() {
        let boundaries = [0, 10, 20, 30];
        assert_eq!(bucket_index(&boundaries, 0), None);
        assert_eq!(bucket_index(&boundaries, 1), Some(0));
        assert_eq!(bucket_index(&boundaries, 10), Some(0));
        assert_eq!(bucket_index(&boundaries, 11), Some(1));
        assert_eq!(bucket_index(&boundaries, 20), Some(1));
        assert_eq!(bucket_index(&boundaries, 30), Some(2));
        assert_eq!(bucket_index(&boundaries, 31), None);
    }

    #[test]
    fn padded_len_rounds_up() {
        assert_eq!(padded_len(5, 4), 8);
        assert_eq!(padded_len(8, 4), 8);
        assert_eq!(padded_len(1, 6), 6);
    }

    #[test]
    fn prunes_all_empty_buckets() -> Result<()> {
        let lengths = vec![11, 15, 20, 12];
        let buckets = LengthBuckets::build(&lengths, &[0, 10, 20, 30], 2, 1)?;
        assert_eq!(buckets.buckets().len(), 1);
        assert_eq!(buckets.boundaries(), &[10, 20]);
        assert_eq!(buckets.buckets()[0].indices, vec![0, 1, 2, 3]);
        assert_eq!(buckets.padded_counts(), vec![4]);
        Ok(())
    }

    #[test]
    fn interior_gap_merges_into_next_bucket() -> Result<()> {
        let lengths = vec![5, 25, 7, 28];
        let buckets = LengthBuckets::build(&lengths, &[0, 10, 20, 30], 1, 1)?;
        assert_eq!(buckets.boundaries(), &[0, 10, 30]);

        let b = buckets.buckets();
        assert_eq!((b[0].lower, b[0].upper), (0, 10));
        assert_eq!((b[1].lower, b[1].upper), (10, 30));
        assert_eq!(b[0].indices, vec![0, 2]);
        assert_eq!(b[1].indices, vec![1, 3]);
        Ok(())
    }

    #[test]
    fn drops_out_of_range_lengths() -> Result<()> {
        let lengths = vec![0, 3, 100, 9];
        let buckets = LengthBuckets::build(&lengths, &[0, 10], 2, 2)?;
        assert_eq!(buckets.num_kept(), 2);
        assert_eq!(buckets.buckets()[0].indices, vec![1, 3]);
        // Padded to a multiple of batch_size * num_replicas = 4
        assert_eq!(buckets.total_size(), 4);
        Ok(())
    }

    #[test]
    fn exact_multiple_needs_no_padding() -> Result<()> {
        let lengths = vec![5; 12];
        let buckets = LengthBuckets::build(&lengths, &[0, 10], 3, 2)?;
        assert_eq!(buckets.padded_counts(), vec![12]);
        Ok(())
    }

    #[test]
    fn rejects_invalid_configuration() {
        let lengths = vec![5, 6];
        assert!(LengthBuckets::build(&lengths, &[0, 10], 0, 1).is_err());
        assert!(LengthBuckets::build(&lengths, &[0, 10], 1, 0).is_err());
        assert!(LengthBuckets::build(&lengths, &[10], 1, 1).is_err());
        assert!(LengthBuckets::build(&lengths, &[10, 0], 1, 1).is_err());
        assert!(LengthBuckets::build(&lengths, &[0, 10, 10], 1, 1).is_err());
        assert!(LengthBuckets::build(&lengths, &[0, 10], usize::MAX / 2 + 1, 2).is_err());
        // Every sample outside the boundaries
        assert!(LengthBuckets::build(&lengths, &[10, 20], 1, 1).is_err());
    }
}
