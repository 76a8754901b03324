//! Distributed bucket sampler properties across replicas and epochs.
//!
//! Tests cover:
//! - Same epoch → identical batches, for every rank
//! - Every batch is full and the padded size is covered exactly
//! - Every emitted index lies in the length interval of its bucket
//! - Empty buckets are pruned together with their boundaries
//! - Ranks split each bucket disjointly, padding included

use anyhow::Result;
use speech_data::{DistributedBucketSampler, DistributedConfig, Sampler};
use std::collections::HashMap;

const BOUNDARIES: [usize; 6] = [32, 100, 200, 300, 400, 500];
const BATCH_SIZE: usize = 3;

/// Deterministic spread of lengths, some of them outside the outer boundaries.
fn lengths() -> Vec<usize> {
    (0..211).map(|i| (i * 37) % 560).collect()
}

fn sampler_for(rank: usize, num_replicas: usize) -> Result<DistributedBucketSampler> {
    let lengths = lengths();
    let config = DistributedConfig::new(lengths.len(), num_replicas, rank);
    DistributedBucketSampler::new(&lengths, &BOUNDARIES, BATCH_SIZE, config)
}

#[test]
fn test_every_rank_is_deterministic() -> Result<()> {
    for rank in 0..4 {
        let first = sampler_for(rank, 4)?;
        let second = sampler_for(rank, 4)?;
        for epoch in [0, 1, 17] {
            assert_eq!(first.batches(epoch), second.batches(epoch));
            assert_eq!(
                first.iter(epoch).collect::<Vec<_>>(),
                first.batches(epoch)
            );
        }
    }
    Ok(())
}

#[test]
fn test_ranks_see_equal_batch_counts() -> Result<()> {
    let num_replicas = 4;
    let samplers: Vec<_> = (0..num_replicas)
        .map(|rank| sampler_for(rank, num_replicas))
        .collect::<Result<_>>()?;
    let total_size = samplers[0].total_size();
    assert_eq!(total_size % (num_replicas * BATCH_SIZE), 0);

    for epoch in 0..3 {
        for sampler in &samplers {
            let batches = sampler.batches(epoch);
            assert_eq!(batches.len(), sampler.len());
            assert!(batches.iter().all(|b| b.len() == BATCH_SIZE));
            let emitted: usize = batches.iter().map(Vec::len).sum();
            assert_eq!(emitted * num_replicas, total_size);
        }
    }
    Ok(())
}

#[test]
fn test_indices_respect_bucket_intervals() -> Result<()> {
    let lengths = lengths();
    let sampler = sampler_for(1, 3)?;
    let boundaries = sampler.boundaries();
    assert_eq!(boundaries.len(), sampler.buckets().len() + 1);

    for batch in sampler.batches(4) {
        let lo_hi: Vec<(usize, usize)> = batch
            .iter()
            .map(|&i| {
                let k = boundaries
                    .windows(2)
                    .position(|w| w[0] < lengths[i] && lengths[i] <= w[1])
                    .expect("emitted index inside the pruned boundaries");
                (boundaries[k], boundaries[k + 1])
            })
            .collect();
        // One length class per batch
        assert!(lo_hi.windows(2).all(|w| w[0] == w[1]));
    }
    Ok(())
}

#[test]
fn test_discarded_lengths_never_appear() -> Result<()> {
    let lengths = lengths();
    let sampler = sampler_for(0, 1)?;
    for batch in sampler.batches(0) {
        for i in batch {
            assert!(lengths[i] > BOUNDARIES[0]);
            assert!(lengths[i] <= BOUNDARIES[BOUNDARIES.len() - 1]);
        }
    }
    Ok(())
}

#[test]
fn test_empty_buckets_are_pruned() -> Result<()> {
    let lengths = vec![11, 12, 19, 20, 15];
    let config = DistributedConfig::single(lengths.len());
    let sampler = DistributedBucketSampler::new(&lengths, &[0, 10, 20, 30], 2, config)?;
    assert_eq!(sampler.buckets().len(), 1);
    assert_eq!(sampler.boundaries(), &[10, 20]);
    assert_eq!(sampler.buckets()[0].padded_len, 6);
    Ok(())
}

#[test]
fn test_ranks_split_padded_buckets() -> Result<()> {
    let num_replicas = 3;
    let epoch = 9;
    let per_rank: Vec<Vec<Vec<usize>>> = (0..num_replicas)
        .map(|rank| sampler_for(rank, num_replicas).map(|s| s.rank_local_buckets(epoch)))
        .collect::<Result<_>>()?;

    let reference = sampler_for(0, num_replicas)?;
    for (b, bucket) in reference.buckets().iter().enumerate() {
        let mut counts: HashMap<usize, usize> = HashMap::new();
        for rank_buckets in &per_rank {
            assert_eq!(rank_buckets[b].len(), bucket.padded_len / num_replicas);
            for &i in &rank_buckets[b] {
                *counts.entry(i).or_default() += 1;
            }
        }

        // The union covers the padded bucket: every member at least once, and only
        // the padding repeats members.
        assert_eq!(counts.values().sum::<usize>(), bucket.padded_len);
        assert_eq!(counts.len(), bucket.len());
        let repeats = bucket.padded_len / bucket.len();
        assert!(counts.values().all(|&c| c == repeats || c == repeats + 1));
    }
    Ok(())
}
