//! Seeded per-cluster sampling.
//!
//! Downstream collaborators (topic labeling, sentiment) are expensive per
//! item, so each cluster is represented by a uniform sample of at most `cap`
//! members, drawn without replacement.
//!
//! Every cluster draws from its own RNG stream derived from
//! `(seed, cluster_id)`: a cluster's sample depends only on its own members,
//! never on which other clusters exist. Sampled members keep input order.

use crate::error::{Error, Result};
use rand::prelude::*;
use std::collections::BTreeMap;

/// Default per-cluster sample cap.
pub const DEFAULT_SAMPLE_CAP: usize = 500;

/// Uniform sampler with a per-cluster cap.
#[derive(Debug, Clone)]
pub struct ClusterSampler {
    cap: usize,
    seed: Option<u64>,
}

impl Default for ClusterSampler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_CAP)
    }
}

impl ClusterSampler {
    /// Create a sampler keeping at most `cap` members per cluster.
    pub fn new(cap: usize) -> Self {
        Self { cap, seed: None }
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set an optional seed.
    pub fn with_seed_opt(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Sample each cluster independently.
    ///
    /// Each output list has `min(cap, members.len())` entries.
    ///
    /// # Errors
    ///
    /// Fails if `cap == 0`.
    pub fn sample<T: Clone>(&self, clusters: &BTreeMap<usize, Vec<T>>) -> Result<BTreeMap<usize, Vec<T>>> {
        if self.cap == 0 {
            return Err(Error::invalid("sample_cap", "must be at least 1"));
        }
        let sampled = clusters
            .iter()
            .map(|(&id, members)| (id, self.sample_one(id, members)))
            .collect();
        Ok(sampled)
    }

    fn sample_one<T: Clone>(&self, cluster_id: usize, members: &[T]) -> Vec<T> {
        if members.len() <= self.cap {
            return members.to_vec();
        }
        let mut rng: Box<dyn RngCore> = match self.seed {
            Some(s) => Box::new(StdRng::seed_from_u64(stream_seed(s, cluster_id))),
            None => Box::new(rand::rng()),
        };
        let mut picked = rand::seq::index::sample(&mut rng, members.len(), self.cap).into_vec();
        picked.sort_unstable();
        tracing::debug!(cluster_id, members = members.len(), sampled = picked.len(), "sampled cluster");
        picked.into_iter().map(|i| members[i].clone()).collect()
    }
}

/// Sample every cluster with [`ClusterSampler`].
pub fn sample<T: Clone>(
    clusters: &BTreeMap<usize, Vec<T>>,
    cap: usize,
    seed: Option<u64>,
) -> Result<BTreeMap<usize, Vec<T>>> {
    ClusterSampler::new(cap).with_seed_opt(seed).sample(clusters)
}

/// Derive an independent stream seed for one cluster (SplitMix64 finalizer).
fn stream_seed(seed: u64, cluster_id: usize) -> u64 {
    let mut z = seed ^ (cluster_id as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
