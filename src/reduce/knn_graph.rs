//! Fuzzy k-nearest-neighbor graph over cosine distance.
//!
//! Each point's neighborhood is turned into local membership strengths,
//! then the directed memberships are symmetrized into one undirected,
//! weighted graph (a fuzzy simplicial set).
//!
//! # Local calibration
//!
//! For point `i` with neighbor distances `d_1 <= ... <= d_k` (self excluded):
//!
//! ```text
//! ρ_i = distance to the nearest non-identical neighbor
//! σ_i solves Σ_j exp(−max(0, d_j − ρ_i) / σ_i) = log2(k) · bandwidth
//! w(i → j) = exp(−max(0, d_j − ρ_i) / σ_i)
//! ```
//!
//! so every point is fully connected to its nearest neighbor, and the
//! neighborhood carries the same total weight regardless of local density.
//!
//! # Symmetrization
//!
//! ```text
//! w_ij = mix · (a + b − a·b) + (1 − mix) · a·b,   a = w(i→j), b = w(j→i)
//! ```
//!
//! `mix = 1` is the fuzzy union, `mix = 0` the fuzzy intersection.
//!
//! # Performance Considerations
//!
//! Neighbor search is brute force, O(n²·d), row-parallel with the
//! `parallel` feature. The clusterer downstream is O(n²) in memory anyway.

use crate::distance::{cosine_distance_unit, normalize_rows};
use crate::error::{Error, Result};
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::BTreeMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const SMOOTH_K_ITERS: usize = 64;
const SMOOTH_K_TOLERANCE: f32 = 1e-5;
const MIN_K_DIST_SCALE: f32 = 1e-3;

/// Configuration for fuzzy graph construction.
#[derive(Debug, Clone)]
pub struct KnnGraphConfig {
    /// Neighborhood size, the point itself included (default: 15)
    pub k: usize,
    /// Number of neighbors assumed fully connected (default: 1.0)
    pub local_connectivity: f32,
    /// Union/intersection mix for symmetrization (default: 1.0)
    pub set_op_mix_ratio: f32,
    /// Scales the target neighborhood weight (default: 1.0)
    pub bandwidth: f32,
}

impl Default for KnnGraphConfig {
    fn default() -> Self {
        Self {
            k: 15,
            local_connectivity: 1.0,
            set_op_mix_ratio: 1.0,
            bandwidth: 1.0,
        }
    }
}

/// k nearest neighbors of every point, nearest first, self included.
#[derive(Debug, Clone)]
pub struct Neighbors {
    /// Neighbor indices per point.
    pub indices: Vec<Vec<usize>>,
    /// Matching cosine distances.
    pub distances: Vec<Vec<f32>>,
}

/// Brute-force cosine k-nearest neighbors.
///
/// The point itself is always first, at distance 0. Ties are broken by index.
pub fn nearest_neighbors(data: &[Vec<f32>], k: usize) -> Result<Neighbors> {
    let n = data.len();
    if n == 0 {
        return Err(Error::EmptyInput);
    }
    if k == 0 || k > n {
        return Err(Error::InsufficientItems {
            n_neighbors: k,
            n_items: n,
        });
    }
    let normed = normalize_rows(data);

    let search = |i: usize| -> (Vec<usize>, Vec<f32>) {
        let mut candidates: Vec<(f32, usize)> = (0..n)
            .map(|j| {
                let d = if i == j {
                    0.0
                } else {
                    cosine_distance_unit(&normed[i], &normed[j]) as f32
                };
                // Self sorts ahead of exact duplicates.
                (d, if j == i { 0 } else { j + 1 })
            })
            .collect();
        let by_distance = |a: &(f32, usize), b: &(f32, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
        if k < n {
            candidates.select_nth_unstable_by(k - 1, by_distance);
            candidates.truncate(k);
        }
        candidates.sort_unstable_by(by_distance);
        candidates
            .into_iter()
            .map(|(d, key)| (if key == 0 { i } else { key - 1 }, d))
            .unzip()
    };

    #[cfg(feature = "parallel")]
    let rows: Vec<(Vec<usize>, Vec<f32>)> = (0..n).into_par_iter().map(search).collect();
    #[cfg(not(feature = "parallel"))]
    let rows: Vec<(Vec<usize>, Vec<f32>)> = (0..n).map(search).collect();

    let (indices, distances) = rows.into_iter().unzip();
    Ok(Neighbors { indices, distances })
}

/// Per-point `(ρ, σ)` calibration.
pub fn smooth_knn_dist(
    distances: &[Vec<f32>],
    local_connectivity: f32,
    bandwidth: f32,
) -> (Vec<f32>, Vec<f32>) {
    let total: f32 = distances.iter().flatten().sum();
    let count = distances.iter().map(Vec::len).sum::<usize>().max(1);
    let mean_all = total / count as f32;

    distances
        .iter()
        .map(|row| {
            let k = row.len();
            let target = (k.max(2) as f32).log2() * bandwidth;
            let non_zero: Vec<f32> = row.iter().copied().filter(|&d| d > 0.0).collect();

            let mut rho = 0.0;
            let index = local_connectivity.floor() as usize;
            let interpolation = local_connectivity - index as f32;
            if non_zero.len() >= index.max(1) {
                if index > 0 {
                    rho = non_zero[index - 1];
                    if interpolation > SMOOTH_K_TOLERANCE && index < non_zero.len() {
                        rho += interpolation * (non_zero[index] - non_zero[index - 1]);
                    }
                } else {
                    rho = interpolation * non_zero[0];
                }
            } else if let Some(&max) = non_zero.iter().max_by(|a, b| a.total_cmp(b)) {
                rho = max;
            }

            let (mut lo, mut hi, mut mid) = (0.0f32, f32::INFINITY, 1.0f32);
            for _ in 0..SMOOTH_K_ITERS {
                let psum: f32 = row
                    .iter()
                    .skip(1)
                    .map(|&d| {
                        let gap = d - rho;
                        if gap > 0.0 {
                            (-gap / mid).exp()
                        } else {
                            1.0
                        }
                    })
                    .sum();
                if (psum - target).abs() < SMOOTH_K_TOLERANCE {
                    break;
                }
                if psum > target {
                    hi = mid;
                    mid = (lo + hi) / 2.0;
                } else {
                    lo = mid;
                    mid = if hi.is_infinite() { mid * 2.0 } else { (lo + hi) / 2.0 };
                }
            }

            let mean_row = row.iter().sum::<f32>() / k.max(1) as f32;
            let floor = if rho > 0.0 { mean_row } else { mean_all };
            (rho, mid.max(MIN_K_DIST_SCALE * floor))
        })
        .unzip()
}

/// Build the symmetrized fuzzy neighbor graph over `data`.
///
/// Node `i` of the returned graph is row `i` of `data`. Edge weights lie in
/// `(0, 1]`; there are no self loops.
pub fn fuzzy_knn_graph(data: &[Vec<f32>], config: &KnnGraphConfig) -> Result<UnGraph<(), f32>> {
    crate::error::validate_rows(data, "neighbor graph input")?;
    let neighbors = nearest_neighbors(data, config.k)?;
    Ok(fuzzy_graph_from_neighbors(&neighbors, config))
}

/// Build the fuzzy graph from precomputed neighbors.
pub fn fuzzy_graph_from_neighbors(neighbors: &Neighbors, config: &KnnGraphConfig) -> UnGraph<(), f32> {
    let n = neighbors.indices.len();
    let (rhos, sigmas) = smooth_knn_dist(
        &neighbors.distances,
        config.local_connectivity,
        config.bandwidth,
    );

    // (low, high) -> (w(low → high), w(high → low))
    let mut directed: BTreeMap<(usize, usize), (f32, f32)> = BTreeMap::new();
    for i in 0..n {
        for (&j, &d) in neighbors.indices[i].iter().zip(&neighbors.distances[i]) {
            if j == i {
                continue;
            }
            let gap = d - rhos[i];
            let w = if gap <= 0.0 || sigmas[i] == 0.0 {
                1.0
            } else {
                (-gap / sigmas[i]).exp()
            };
            let entry = directed.entry((i.min(j), i.max(j))).or_insert((0.0, 0.0));
            if i < j {
                entry.0 = w;
            } else {
                entry.1 = w;
            }
        }
    }

    let mix = config.set_op_mix_ratio;
    let mut graph = UnGraph::<(), f32>::with_capacity(n, directed.len());
    for _ in 0..n {
        graph.add_node(());
    }
    for ((u, v), (a, b)) in directed {
        let product = a * b;
        let w = mix * (a + b - product) + (1.0 - mix) * product;
        if w > 0.0 {
            graph.add_edge(NodeIndex::new(u), NodeIndex::new(v), w);
        }
    }
    tracing::debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "fuzzy neighbor graph"
    );
    graph
}
