//! UMAP-style layout of a fuzzy neighbor graph.
//!
//! Given the graph from [`fuzzy_knn_graph`](super::knn_graph::fuzzy_knn_graph),
//! find a low-dimensional layout whose pairwise similarities
//!
//! ```text
//! q(d) = 1 / (1 + a · d^(2b))
//! ```
//!
//! match the edge weights. Edges attract their endpoints; random pairs
//! (negative samples) repel. Optimization is plain SGD with a linearly
//! decaying learning rate and gradient clipping at ±4.
//!
//! `a` and `b` are fit so `q` approximates the offset exponential
//! `exp(−(d − min_dist) / spread)` ([`find_ab_params`]).
//!
//! The optimizer is sequential: with a seed, layouts are reproducible.

use super::knn_graph::{fuzzy_knn_graph, KnnGraphConfig};
use super::pca::Pca;
use crate::error::{Error, Result};
use petgraph::visit::EdgeRef;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

const GRADIENT_CLIP: f32 = 4.0;
const INIT_NOISE: f32 = 1e-4;
const LAYOUT_SCALE: f32 = 10.0;
const LARGE_CORPUS: usize = 10_000;

/// Layout initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Init {
    /// Leading principal components of the input.
    #[default]
    Pca,
    /// Uniform random coordinates.
    Random,
}

/// Neighbor-graph embedding into `n_components` dimensions.
#[derive(Debug, Clone)]
pub struct Umap {
    n_components: usize,
    n_neighbors: usize,
    min_dist: f32,
    spread: f32,
    n_epochs: Option<usize>,
    learning_rate: f32,
    negative_sample_rate: usize,
    repulsion_strength: f32,
    init: Init,
    seed: Option<u64>,
}

impl Umap {
    /// Create a new embedding with `n_components` output dimensions.
    pub fn new(n_components: usize, n_neighbors: usize) -> Self {
        Self {
            n_components,
            n_neighbors,
            min_dist: 0.1,
            spread: 1.0,
            n_epochs: None,
            learning_rate: 1.0,
            negative_sample_rate: 5,
            repulsion_strength: 1.0,
            init: Init::Pca,
            seed: None,
        }
    }

    /// Set the minimum distance between embedded points.
    pub fn with_min_dist(mut self, min_dist: f32) -> Self {
        self.min_dist = min_dist;
        self
    }

    /// Set the effective scale of embedded points.
    pub fn with_spread(mut self, spread: f32) -> Self {
        self.spread = spread;
        self
    }

    /// Set the number of optimization epochs.
    pub fn with_n_epochs(mut self, n_epochs: usize) -> Self {
        self.n_epochs = Some(n_epochs);
        self
    }

    /// Set the initial learning rate.
    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set negative samples drawn per positive sample.
    pub fn with_negative_sample_rate(mut self, rate: usize) -> Self {
        self.negative_sample_rate = rate;
        self
    }

    /// Set the weight of repulsive updates.
    pub fn with_repulsion_strength(mut self, gamma: f32) -> Self {
        self.repulsion_strength = gamma;
        self
    }

    /// Set the initialization strategy.
    pub fn with_init(mut self, init: Init) -> Self {
        self.init = init;
        self
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

    fn validate(&self, n: usize) -> Result<()> {
        if self.n_components == 0 {
            return Err(Error::invalid("n_components", "must be at least 1"));
        }
        if self.n_neighbors < 2 {
            return Err(Error::invalid("n_neighbors", "must be at least 2"));
        }
        if !(self.spread > 0.0 && self.spread.is_finite()) {
            return Err(Error::invalid("spread", "must be positive"));
        }
        if !(self.min_dist >= 0.0 && self.min_dist <= self.spread) {
            return Err(Error::invalid("min_dist", "must lie in [0, spread]"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(Error::invalid("learning_rate", "must be positive"));
        }
        if n < self.n_neighbors {
            return Err(Error::InsufficientItems {
                n_neighbors: self.n_neighbors,
                n_items: n,
            });
        }
        Ok(())
    }

    /// Embed `data`, one output row per input row.
    pub fn fit_transform(&self, data: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        crate::error::validate_rows(data, "umap input")?;
        let n = data.len();
        self.validate(n)?;

        let graph = fuzzy_knn_graph(
            data,
            &KnnGraphConfig {
                k: self.n_neighbors,
                ..Default::default()
            },
        )?;

        let n_epochs = self
            .n_epochs
            .unwrap_or(if n <= LARGE_CORPUS { 500 } else { 200 })
            .max(1);

        let mut rng: Box<dyn RngCore> = match self.seed {
            Some(s) => Box::new(StdRng::seed_from_u64(s)),
            None => Box::new(rand::rng()),
        };

        let mut embedding = self.initialize(data, &mut rng)?;

        // Both orientations of every edge, as in a symmetric sparse matrix.
        let max_weight = graph
            .edge_references()
            .map(|e| *e.weight())
            .fold(0.0f32, f32::max);
        let threshold = max_weight / n_epochs as f32;
        let mut heads = Vec::new();
        let mut tails = Vec::new();
        let mut epochs_per_sample = Vec::new();
        for e in graph.edge_references() {
            let w = *e.weight();
            if w < threshold || w <= 0.0 {
                continue;
            }
            let (u, v) = (e.source().index(), e.target().index());
            for (h, t) in [(u, v), (v, u)] {
                heads.push(h);
                tails.push(t);
                epochs_per_sample.push(max_weight / w);
            }
        }

        let (a, b) = find_ab_params(self.spread, self.min_dist);
        tracing::debug!(
            n,
            n_components = self.n_components,
            n_epochs,
            edges = heads.len(),
            a,
            b,
            "umap layout"
        );

        let layout = Layout {
            a,
            b,
            gamma: self.repulsion_strength,
            learning_rate: self.learning_rate,
            negative_sample_rate: self.negative_sample_rate,
            n_epochs,
        };
        layout.optimize(
            &mut embedding,
            &heads,
            &tails,
            &epochs_per_sample,
            &mut rng,
        );
        Ok(embedding)
    }

    /// Initial coordinates, each column min-max scaled to `[0, 10]`.
    fn initialize(&self, data: &[Vec<f32>], rng: &mut dyn RngCore) -> Result<Vec<Vec<f32>>> {
        let n = data.len();
        let dim = self.n_components;

        let pca_init = match self.init {
            Init::Pca => {
                let seed = rng.next_u64();
                let projected = Pca::new(dim).with_seed(seed).fit_transform(data)?;
                // Input too narrow (or too few rows) for `dim` components.
                if projected.first().map_or(0, Vec::len) == dim {
                    Some(projected)
                } else {
                    tracing::debug!(n, dim, "pca init unavailable, using random init");
                    None
                }
            }
            Init::Random => None,
        };

        let mut embedding = match pca_init {
            Some(mut projected) => {
                let max_abs = projected
                    .iter()
                    .flatten()
                    .fold(0.0f32, |m, &v| m.max(v.abs()));
                let expansion = if max_abs > 0.0 { LAYOUT_SCALE / max_abs } else { 1.0 };
                for row in &mut projected {
                    for v in row.iter_mut() {
                        *v = *v * expansion + rng.random_range(-INIT_NOISE..INIT_NOISE);
                    }
                }
                projected
            }
            None => (0..n)
                .map(|_| {
                    (0..dim)
                        .map(|_| rng.random_range(-LAYOUT_SCALE..LAYOUT_SCALE))
                        .collect()
                })
                .collect(),
        };

        for c in 0..dim {
            let (lo, hi) = embedding
                .iter()
                .map(|row| row[c])
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
            let range = hi - lo;
            for row in &mut embedding {
                row[c] = if range > 0.0 {
                    LAYOUT_SCALE * (row[c] - lo) / range
                } else {
                    0.0
                };
            }
        }
        Ok(embedding)
    }
}

/// SGD settings for one layout run.
struct Layout {
    a: f32,
    b: f32,
    gamma: f32,
    learning_rate: f32,
    negative_sample_rate: usize,
    n_epochs: usize,
}

impl Layout {
    fn optimize(
        &self,
        embedding: &mut [Vec<f32>],
        heads: &[usize],
        tails: &[usize],
        epochs_per_sample: &[f32],
        rng: &mut dyn RngCore,
    ) {
        let n = embedding.len();
        let dim = embedding.first().map_or(0, Vec::len);
        let (a, b) = (self.a, self.b);
        let neg_rate = self.negative_sample_rate.max(1) as f32;

        let epochs_per_negative: Vec<f32> = epochs_per_sample.iter().map(|e| e / neg_rate).collect();
        let mut next_sample = epochs_per_sample.to_vec();
        let mut next_negative = epochs_per_negative.clone();
        let mut grad = vec![0.0f32; dim];

        for epoch in 0..self.n_epochs {
            let alpha = self.learning_rate * (1.0 - epoch as f32 / self.n_epochs as f32);
            let now = epoch as f32;

            for i in 0..heads.len() {
                if next_sample[i] > now {
                    continue;
                }
                let (j, k) = (heads[i], tails[i]);

                let dist_sq = squared_distance(&embedding[j], &embedding[k]);
                let coeff = if dist_sq > 0.0 {
                    -2.0 * a * b * dist_sq.powf(b - 1.0) / (a * dist_sq.powf(b) + 1.0)
                } else {
                    0.0
                };
                for (d, g) in grad.iter_mut().enumerate() {
                    *g = clip(coeff * (embedding[j][d] - embedding[k][d])) * alpha;
                }
                for d in 0..dim {
                    embedding[j][d] += grad[d];
                    embedding[k][d] -= grad[d];
                }
                next_sample[i] += epochs_per_sample[i];

                let n_neg = ((now - next_negative[i]) / epochs_per_negative[i]).max(0.0) as usize;
                for _ in 0..n_neg {
                    let k = rng.random_range(0..n);
                    if k == j {
                        continue;
                    }
                    let dist_sq = squared_distance(&embedding[j], &embedding[k]);
                    let coeff = if dist_sq > 0.0 {
                        2.0 * self.gamma * b / ((0.001 + dist_sq) * (a * dist_sq.powf(b) + 1.0))
                    } else {
                        0.0
                    };
                    if coeff <= 0.0 {
                        continue;
                    }
                    for d in 0..dim {
                        let g = clip(coeff * (embedding[j][d] - embedding[k][d]));
                        embedding[j][d] += g * alpha;
                    }
                }
                next_negative[i] += n_neg as f32 * epochs_per_negative[i];
            }
        }
    }
}

#[inline]
fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[inline]
fn clip(v: f32) -> f32 {
    v.clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
}

/// Fit `a`, `b` so `1 / (1 + a·x^(2b))` matches the offset exponential
/// `exp(−(x − min_dist) / spread)` (1 below `min_dist`) on `[0, 3·spread]`.
///
/// Levenberg-Marquardt least squares from `a = b = 1`.
pub fn find_ab_params(spread: f32, min_dist: f32) -> (f32, f32) {
    const SAMPLES: usize = 300;
    const MAX_ITERS: usize = 500;
    let (spread, min_dist) = (f64::from(spread), f64::from(min_dist));

    let xs: Vec<f64> = (0..SAMPLES)
        .map(|i| 3.0 * spread * i as f64 / (SAMPLES - 1) as f64)
        .collect();
    let ys: Vec<f64> = xs
        .iter()
        .map(|&x| {
            if x < min_dist {
                1.0
            } else {
                (-(x - min_dist) / spread).exp()
            }
        })
        .collect();

    let cost = |a: f64, b: f64| -> f64 {
        xs.iter()
            .zip(&ys)
            .map(|(&x, &y)| {
                let r = 1.0 / (1.0 + a * x.powf(2.0 * b)) - y;
                r * r
            })
            .sum()
    };

    let (mut a, mut b) = (1.0f64, 1.0f64);
    let mut lambda = 1e-3;
    let mut current = cost(a, b);
    for _ in 0..MAX_ITERS {
        // Normal equations JᵀJ δ = −Jᵀr; x = 0 contributes nothing.
        let (mut h00, mut h01, mut h11, mut g0, mut g1) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for (&x, &y) in xs.iter().zip(&ys) {
            if x <= 0.0 {
                continue;
            }
            let xb = x.powf(2.0 * b);
            let denom = 1.0 + a * xb;
            let r = 1.0 / denom - y;
            let da = -xb / (denom * denom);
            let db = -2.0 * a * xb * x.ln() / (denom * denom);
            h00 += da * da;
            h01 += da * db;
            h11 += db * db;
            g0 += da * r;
            g1 += db * r;
        }

        let m00 = h00 * (1.0 + lambda);
        let m11 = h11 * (1.0 + lambda);
        let det = m00 * m11 - h01 * h01;
        if det.abs() < 1e-300 {
            break;
        }
        let step_a = -(m11 * g0 - h01 * g1) / det;
        let step_b = -(m00 * g1 - h01 * g0) / det;
        let (na, nb) = (a + step_a, b + step_b);

        let candidate = if na > 0.0 && nb > 0.0 { cost(na, nb) } else { f64::INFINITY };
        if candidate < current {
            a = na;
            b = nb;
            current = candidate;
            lambda = (lambda / 10.0).max(1e-12);
            if step_a.abs() < 1e-10 && step_b.abs() < 1e-10 {
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e12 {
                break;
            }
        }
    }
    (a as f32, b as f32)
}
