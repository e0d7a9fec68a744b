//! HDBSCAN over a precomputed cosine distance matrix.
//!
//! # The Algorithm (Campello, Moulavi, Sander 2013)
//!
//! 1. **Core distance**: `core(x)` = distance to the `min_samples`-th nearest
//!    other point.
//! 2. **Mutual reachability**:
//!    `mr(a, b) = max(core(a), core(b), d(a, b))`. Sparse points are pushed
//!    away from everything, dense points keep their true distances.
//! 3. **Single linkage** over `mr` gives a dendrogram (kodama).
//! 4. **Condense**: walk the dendrogram top-down with `λ = 1 / distance`.
//!    A split where both sides have at least `min_cluster_size` points
//!    creates two new clusters; otherwise the small side "falls out" of its
//!    parent as individual points.
//! 5. **Stability**: `S(C) = Σ_{p ∈ C} (λ_p − λ_birth(C))`.
//! 6. **Excess of mass**: bottom-up, keep a cluster unless its children's
//!    combined stability is larger. Ties go to the parent, which favors
//!    larger, more persistent groups.
//! 7. Points are labeled with their selected ancestor cluster, or −1.
//!
//! ## Complexity
//!
//! O(n²) memory for the distance matrix and its condensed mutual-reachability
//! copy. This is the scaling limit of the whole pipeline.

use super::traits::Clustering;
use super::NOISE;
use crate::distance::pairwise_cosine;
use crate::error::{Error, Result};
use kodama::{linkage, Method};
use ndarray::Array2;
use std::collections::VecDeque;

/// Floor for merge distances so `λ = 1 / d` stays finite on duplicate points.
const MIN_DISTANCE: f64 = 1e-12;

/// HDBSCAN with excess-of-mass cluster selection.
#[derive(Debug, Clone)]
pub struct Hdbscan {
    min_cluster_size: usize,
    min_samples: usize,
    allow_single_cluster: bool,
}

/// One row of the condensed tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CondensedEdge {
    /// Parent cluster label (`>= n_points`).
    pub parent: usize,
    /// Child: a point index (`< n_points`) or a cluster label.
    pub child: usize,
    /// λ at which the child left the parent.
    pub lambda: f64,
    /// Number of points in the child.
    pub size: usize,
}

impl Hdbscan {
    /// Create a new clusterer.
    ///
    /// * `min_cluster_size` - smallest group reported as a cluster (>= 2).
    /// * `min_samples` - neighbor rank for core distances (>= 1).
    pub fn new(min_cluster_size: usize, min_samples: usize) -> Self {
        Self {
            min_cluster_size,
            min_samples,
            allow_single_cluster: false,
        }
    }

    /// Allow the root of the condensed tree to be selected.
    ///
    /// Points that leave the root before its densest members do stay noise.
    pub fn with_allow_single_cluster(mut self, allow: bool) -> Self {
        self.allow_single_cluster = allow;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.min_cluster_size < 2 {
            return Err(Error::invalid("min_cluster_size", "must be at least 2"));
        }
        if self.min_samples == 0 {
            return Err(Error::invalid("min_samples", "must be at least 1"));
        }
        Ok(())
    }

    /// Cluster from a square distance matrix.
    ///
    /// Returns one label per row; −1 marks noise. Cluster labels are dense,
    /// `0..k`.
    pub fn fit_predict_precomputed(&self, distances: &Array2<f64>) -> Result<Vec<i32>> {
        self.validate()?;
        let n = distances.nrows();
        if distances.ncols() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                found: distances.ncols(),
            });
        }
        if let Some(((i, _), _)) = distances.indexed_iter().find(|(_, d)| !d.is_finite()) {
            return Err(Error::NonFinite {
                what: "distance matrix",
                index: i,
            });
        }
        if n < self.min_cluster_size {
            tracing::debug!(n, min_cluster_size = self.min_cluster_size, "too few points, all noise");
            return Ok(vec![NOISE; n]);
        }

        let core = core_distances(distances, self.min_samples);
        let mut condensed_mr = Vec::with_capacity(n * (n - 1) / 2);
        for i in 0..n - 1 {
            for j in (i + 1)..n {
                condensed_mr.push(distances[[i, j]].max(core[i]).max(core[j]));
            }
        }

        // kodama labels leaves 0..n-1 and merge i as n+i.
        let dendrogram = linkage(&mut condensed_mr, n, Method::Single);
        let merges: Vec<(usize, usize, f64, usize)> = dendrogram
            .steps()
            .iter()
            .map(|s| (s.cluster1, s.cluster2, s.dissimilarity, s.size))
            .collect();

        let tree = condense_tree(&merges, n, self.min_cluster_size);
        let selected = self.select_clusters(&tree, n);
        let labels = label_points(&tree, n, &selected);

        let n_clusters = selected.iter().filter(|&&s| s).count();
        let n_noise = labels.iter().filter(|&&l| l == NOISE).count();
        tracing::debug!(n, n_clusters, n_noise, "hdbscan finished");
        Ok(labels)
    }

    /// Excess-of-mass selection. Returns `selected[c - n]` per cluster label.
    fn select_clusters(&self, tree: &[CondensedEdge], n: usize) -> Vec<bool> {
        let n_clusters = tree
            .iter()
            .map(|e| e.parent.max(e.child))
            .max()
            .map_or(1, |m| m + 1 - n)
            .max(1);

        let mut birth = vec![0.0f64; n_clusters];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n_clusters];
        for e in tree.iter().filter(|e| e.child >= n) {
            birth[e.child - n] = e.lambda;
            children[e.parent - n].push(e.child - n);
        }

        let mut stability = vec![0.0f64; n_clusters];
        for e in tree {
            let c = e.parent - n;
            stability[c] += (e.lambda - birth[c]) * e.size as f64;
        }

        let mut selected = vec![true; n_clusters];
        let lowest = if self.allow_single_cluster { 0 } else { 1 };
        if !self.allow_single_cluster {
            selected[0] = false;
        }

        // Children always carry larger labels than their parent, so
        // descending order is bottom-up.
        for c in (lowest..n_clusters).rev() {
            let subtree: f64 = children[c].iter().map(|&ch| stability[ch]).sum();
            if subtree > stability[c] {
                selected[c] = false;
                stability[c] = subtree;
            } else {
                let mut queue: VecDeque<usize> = children[c].iter().copied().collect();
                while let Some(d) = queue.pop_front() {
                    selected[d] = false;
                    queue.extend(children[d].iter().copied());
                }
            }
        }
        selected
    }
}

impl Default for Hdbscan {
    fn default() -> Self {
        Self::new(5, 5)
    }
}

impl Clustering for Hdbscan {
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<i32>> {
        crate::error::validate_rows(data, "reduced vectors")?;
        if data.is_empty() {
            self.validate()?;
            return Ok(Vec::new());
        }
        let distances = pairwise_cosine(data)?;
        self.fit_predict_precomputed(&distances)
    }
}

/// Distance from each point to its `k`-th nearest other point.
fn core_distances(distances: &Array2<f64>, k: usize) -> Vec<f64> {
    let n = distances.nrows();
    let k = k.min(n - 1);
    distances
        .rows()
        .into_iter()
        .map(|row| {
            let mut sorted: Vec<f64> = row.to_vec();
            // Index 0 is the point itself at distance 0.
            let (_, kth, _) = sorted.select_nth_unstable_by(k, f64::total_cmp);
            *kth
        })
        .collect()
}

/// Every node of the single-linkage subtree rooted at `root`, breadth-first.
fn subtree(merges: &[(usize, usize, f64, usize)], n: usize, root: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(node) = queue.pop_front() {
        out.push(node);
        if node >= n {
            let (left, right, _, _) = merges[node - n];
            queue.push_back(left);
            queue.push_back(right);
        }
    }
    out
}

/// Condense a single-linkage dendrogram with `min_cluster_size`.
///
/// Cluster labels start at `n` (the root) and grow in breadth-first order.
pub fn condense_tree(
    merges: &[(usize, usize, f64, usize)],
    n: usize,
    min_cluster_size: usize,
) -> Vec<CondensedEdge> {
    if n < 2 || merges.is_empty() {
        return Vec::new();
    }
    let root = 2 * n - 2;
    let size = |node: usize| if node < n { 1 } else { merges[node - n].3 };

    let mut relabel = vec![0usize; 2 * n - 1];
    relabel[root] = n;
    let mut next_label = n + 1;
    let mut ignore = vec![false; 2 * n - 1];
    let mut tree = Vec::with_capacity(2 * n);

    for node in subtree(merges, n, root) {
        if ignore[node] || node < n {
            continue;
        }
        let (left, right, distance, _) = merges[node - n];
        let lambda = 1.0 / distance.max(MIN_DISTANCE);
        let parent = relabel[node];
        let (left_count, right_count) = (size(left), size(right));

        let fall_out = |side: usize, tree: &mut Vec<CondensedEdge>, ignore: &mut [bool]| {
            for sub in subtree(merges, n, side) {
                if sub < n {
                    tree.push(CondensedEdge {
                        parent,
                        child: sub,
                        lambda,
                        size: 1,
                    });
                }
                ignore[sub] = true;
            }
        };

        match (left_count >= min_cluster_size, right_count >= min_cluster_size) {
            (true, true) => {
                for (side, count) in [(left, left_count), (right, right_count)] {
                    relabel[side] = next_label;
                    tree.push(CondensedEdge {
                        parent,
                        child: next_label,
                        lambda,
                        size: count,
                    });
                    next_label += 1;
                }
            }
            (false, false) => {
                fall_out(left, &mut tree, &mut ignore);
                fall_out(right, &mut tree, &mut ignore);
            }
            (false, true) => {
                relabel[right] = parent;
                fall_out(left, &mut tree, &mut ignore);
            }
            (true, false) => {
                relabel[left] = parent;
                fall_out(right, &mut tree, &mut ignore);
            }
        }
    }
    tree
}

/// Label each point with the dense index of its selected ancestor, or noise.
///
/// A selected root only keeps points that stay until its last fall-out λ;
/// anything that left it earlier is noise.
fn label_points(tree: &[CondensedEdge], n: usize, selected: &[bool]) -> Vec<i32> {
    let mut parent_of = vec![usize::MAX; n + selected.len()];
    let mut point_lambda = vec![0.0f64; n];
    for e in tree {
        parent_of[e.child] = e.parent;
        if e.child < n {
            point_lambda[e.child] = e.lambda;
        }
    }
    let root_max_lambda = tree
        .iter()
        .filter(|e| e.parent == n)
        .map(|e| e.lambda)
        .fold(0.0f64, f64::max);

    let mut dense = vec![NOISE; selected.len()];
    let mut next = 0;
    for (c, &is_selected) in selected.iter().enumerate() {
        if is_selected {
            dense[c] = next;
            next += 1;
        }
    }

    (0..n)
        .map(|p| {
            let mut node = parent_of[p];
            while node != usize::MAX {
                let c = node - n;
                if selected[c] {
                    if c == 0 && point_lambda[p] < root_max_lambda {
                        return NOISE;
                    }
                    return dense[c];
                }
                node = parent_of[node];
            }
            NOISE
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_distr::Normal;
    use std::collections::HashMap;

    /// Gaussian blobs around the given directions.
    fn blobs(centers: &[[f32; 3]], per: usize, sigma: f32, seed: u64) -> (Vec<Vec<f32>>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0f32, sigma).unwrap();
        let mut data = Vec::new();
        let mut truth = Vec::new();
        for (c, center) in centers.iter().enumerate() {
            for _ in 0..per {
                data.push(center.iter().map(|&x| x + noise.sample(&mut rng)).collect());
                truth.push(c);
            }
        }
        (data, truth)
    }

    fn cluster_sizes(labels: &[i32]) -> HashMap<i32, usize> {
        let mut sizes = HashMap::new();
        for &l in labels {
            *sizes.entry(l).or_insert(0) += 1;
        }
        sizes
    }

    /// Most common label among points of each ground-truth group.
    fn majority_labels(labels: &[i32], truth: &[usize], groups: usize) -> Vec<i32> {
        (0..groups)
            .map(|g| {
                let members: Vec<i32> = labels
                    .iter()
                    .zip(truth)
                    .filter(|(_, &t)| t == g)
                    .map(|(&l, _)| l)
                    .collect();
                let sizes = cluster_sizes(&members);
                sizes
                    .into_iter()
                    .max_by_key(|&(l, count)| (count, l))
                    .map(|(l, _)| l)
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_three_separated_groups() {
        let centers = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let (data, truth) = blobs(&centers, 40, 0.03, 7);
        let labels = Hdbscan::new(10, 5).fit_predict(&data).unwrap();
        assert_eq!(labels.len(), data.len());

        let majority = majority_labels(&labels, &truth, 3);
        assert!(majority.iter().all(|&l| l != NOISE));
        assert_ne!(majority[0], majority[1]);
        assert_ne!(majority[1], majority[2]);
        assert_ne!(majority[0], majority[2]);

        // No cluster mixes ground-truth groups.
        let mut owner: HashMap<i32, usize> = HashMap::new();
        for (l, t) in labels.iter().zip(&truth) {
            if *l != NOISE {
                assert_eq!(*owner.entry(*l).or_insert(*t), *t);
            }
        }
    }

    #[test]
    fn test_labels_are_dense_and_sized() {
        let centers = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let (data, _) = blobs(&centers, 25, 0.03, 11);
        let min_cluster_size = 6;
        let labels = Hdbscan::new(min_cluster_size, 4).fit_predict(&data).unwrap();
        let sizes = cluster_sizes(&labels);
        let mut ids: Vec<i32> = sizes.keys().copied().filter(|&l| l != NOISE).collect();
        ids.sort_unstable();
        let expected: Vec<i32> = (0..ids.len() as i32).collect();
        assert_eq!(ids, expected);
        assert!(!ids.is_empty());
        for id in ids {
            assert!(sizes[&id] >= min_cluster_size);
        }
    }

    #[test]
    fn test_outlier_is_noise() {
        let centers = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let (mut data, truth) = blobs(&centers, 30, 0.03, 3);
        data.push(vec![0.0, 0.0, 1.0]);
        let labels = Hdbscan::new(8, 4).fit_predict(&data).unwrap();
        assert_eq!(labels[60], NOISE);
        let majority = majority_labels(&labels[..60], &truth, 2);
        assert_ne!(majority[0], NOISE);
        assert_ne!(majority[1], NOISE);
        assert_ne!(majority[0], majority[1]);
    }

    #[test]
    fn test_single_group_without_root_selection_is_noise() {
        let data: Vec<Vec<f32>> = (0..20).map(|i| vec![1.0, 0.02 * i as f32]).collect();
        let labels = Hdbscan::new(5, 3).fit_predict(&data).unwrap();
        assert!(labels.iter().all(|&l| l == NOISE));

        let labels = Hdbscan::new(5, 3)
            .with_allow_single_cluster(true)
            .fit_predict(&data)
            .unwrap();
        assert!(labels.iter().all(|&l| l == 0 || l == NOISE));
        assert!(labels.contains(&0));
    }

    #[test]
    fn test_single_cluster_keeps_outlier_as_noise() {
        let mut data = vec![vec![1.0, 0.0]; 20];
        data.push(vec![-1.0, -0.2]);

        let labels = Hdbscan::new(5, 3)
            .with_allow_single_cluster(true)
            .fit_predict(&data)
            .unwrap();
        assert!(labels[..20].iter().all(|&l| l == 0));
        assert_eq!(labels[20], NOISE);

        let labels = Hdbscan::new(5, 3).fit_predict(&data).unwrap();
        assert_eq!(labels[20], NOISE);
    }

    #[test]
    fn test_too_few_points_all_noise() {
        let data = vec![vec![1.0, 0.0], vec![0.9, 0.1]];
        let labels = Hdbscan::new(5, 2).fit_predict(&data).unwrap();
        assert_eq!(labels, vec![NOISE, NOISE]);
    }

    #[test]
    fn test_empty_input() {
        let labels = Hdbscan::new(5, 2).fit_predict(&[]).unwrap();
        assert!(labels.is_empty());
    }

    #[test]
    fn test_duplicate_points_do_not_produce_nan() {
        let mut data: Vec<Vec<f32>> = vec![vec![1.0, 0.0]; 10];
        data.extend(vec![vec![0.0, 1.0]; 10]);
        let labels = Hdbscan::new(5, 3).fit_predict(&data).unwrap();
        assert_eq!(labels.len(), 20);
        assert_ne!(labels[0], NOISE);
        assert!(labels[..10].iter().all(|&l| l == labels[0]));
        assert!(labels[10..].iter().all(|&l| l == labels[10]));
        assert_ne!(labels[0], labels[10]);
    }

    #[test]
    fn test_invalid_params() {
        let data = vec![vec![1.0, 0.0]; 4];
        assert!(Hdbscan::new(1, 1).fit_predict(&data).is_err());
        assert!(Hdbscan::new(3, 0).fit_predict(&data).is_err());
    }

    #[test]
    fn test_precomputed_rejects_non_square() {
        let d = Array2::<f64>::zeros((3, 2));
        assert!(Hdbscan::new(2, 1).fit_predict_precomputed(&d).is_err());
    }

    #[test]
    fn test_condense_tree_small() {
        // Two pairs joined at distance 1.0: {0,1} at 0.1, {2,3} at 0.2.
        let merges = vec![(0, 1, 0.1, 2), (2, 3, 0.2, 2), (4, 5, 1.0, 4)];
        let tree = condense_tree(&merges, 4, 2);
        // Root (4) splits into two clusters (5, 6) at lambda 1.
        let clusters: Vec<_> = tree.iter().filter(|e| e.child >= 4).collect();
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|e| e.parent == 4 && (e.lambda - 1.0).abs() < 1e-12));
        // Each cluster loses its two points together.
        let points: Vec<_> = tree.iter().filter(|e| e.child < 4).collect();
        assert_eq!(points.len(), 4);
        assert!(points.iter().all(|e| e.parent == 5 || e.parent == 6));
    }
}
