//! Dimensionality reduction: linear projection, then neighbor-graph layout.
//!
//! Embedding vectors from language models are wide (hundreds to thousands
//! of dimensions) and density-based clustering degrades quickly as width
//! grows. Reduction happens in two stages:
//!
//! ```text
//! vectors (n × d) → PCA → (n × intermediate_width) → UMAP → (n × n_components)
//! ```
//!
//! PCA is cheap and strips noise dimensions so the neighbor search works on a
//! compact representation. UMAP then preserves local neighborhoods in the
//! final low-dimensional space, which is what the clusterer consumes.
//!
//! ## Determinism
//!
//! Both stages draw random numbers. Runs are reproducible only when
//! [`ReduceOptions::seed`] is set.
//!
//! ## Usage
//!
//! ```rust
//! use narrative_map::reduce::{reduce, ReduceOptions};
//!
//! let vectors: Vec<Vec<f32>> = (0..30)
//!     .map(|i| vec![1.0, (i % 3) as f32, (i % 5) as f32, 0.5])
//!     .collect();
//! let options = ReduceOptions { seed: Some(7), n_epochs: Some(20), ..Default::default() };
//! let reduced = reduce(&vectors, 2, 5, &options).unwrap();
//! assert_eq!(reduced.len(), 30);
//! assert_eq!(reduced[0].len(), 2);
//! ```

mod knn_graph;
mod pca;
mod umap;

pub use knn_graph::{
    fuzzy_graph_from_neighbors, fuzzy_knn_graph, nearest_neighbors, smooth_knn_dist,
    KnnGraphConfig, Neighbors,
};
pub use pca::Pca;
pub use umap::{find_ab_params, Init, Umap};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Settings for [`reduce`] beyond the scaled hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReduceOptions {
    /// Width of the PCA stage (default: 100).
    pub intermediate_width: usize,
    /// Minimum distance between embedded points (default: 0.0).
    pub min_dist: f32,
    /// Effective scale of embedded points (default: 1.0).
    pub spread: f32,
    /// Optimization epochs; `None` picks 500 up to 10 000 items, else 200.
    pub n_epochs: Option<usize>,
    /// Layout initialization (default: PCA).
    pub init: Init,
    /// Random seed; `None` draws from the thread RNG.
    pub seed: Option<u64>,
    /// Initial SGD learning rate (default: 1.0).
    pub learning_rate: f32,
    /// Negative samples per positive sample (default: 5).
    pub negative_sample_rate: usize,
    /// Weight of repulsive updates (default: 1.0).
    pub repulsion_strength: f32,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            intermediate_width: 100,
            min_dist: 0.0,
            spread: 1.0,
            n_epochs: None,
            init: Init::Pca,
            seed: None,
            learning_rate: 1.0,
            negative_sample_rate: 5,
            repulsion_strength: 1.0,
        }
    }
}

impl ReduceOptions {
    /// Check value ranges without touching any data.
    pub fn validate(&self) -> Result<()> {
        if self.intermediate_width == 0 {
            return Err(Error::invalid("intermediate_width", "must be at least 1"));
        }
        if !(self.spread > 0.0 && self.spread.is_finite()) {
            return Err(Error::invalid("spread", "must be positive"));
        }
        if !(self.min_dist >= 0.0 && self.min_dist <= self.spread) {
            return Err(Error::invalid(
                "min_dist",
                format!("must lie in [0, {}]", self.spread),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(Error::invalid("learning_rate", "must be positive"));
        }
        if self.n_epochs == Some(0) {
            return Err(Error::invalid("n_epochs", "must be at least 1"));
        }
        Ok(())
    }
}

/// Reduce `vectors` to `n_components` dimensions, preserving row order.
///
/// # Errors
///
/// Fails before any computation if `n_neighbors < 2`, `n_components == 0`,
/// an option is out of range (see [`ReduceOptions::validate`]), there are
/// fewer vectors than `n_neighbors`, or the input is empty, ragged or
/// non-finite.
pub fn reduce(
    vectors: &[Vec<f32>],
    n_components: usize,
    n_neighbors: usize,
    options: &ReduceOptions,
) -> Result<Vec<Vec<f32>>> {
    let Some(dim) = crate::error::validate_rows(vectors, "embeddings")? else {
        return Err(Error::EmptyInput);
    };
    if n_neighbors < 2 {
        return Err(Error::invalid("n_neighbors", "must be at least 2"));
    }
    if n_components == 0 {
        return Err(Error::invalid("n_components", "must be at least 1"));
    }
    options.validate()?;
    if vectors.len() < n_neighbors {
        return Err(Error::InsufficientItems {
            n_neighbors,
            n_items: vectors.len(),
        });
    }

    let projected = Pca::new(options.intermediate_width)
        .with_seed_opt(options.seed)
        .fit_transform(vectors)?;
    tracing::debug!(
        n = vectors.len(),
        from = dim,
        to = projected.first().map_or(0, Vec::len),
        "linear stage done"
    );

    let mut umap = Umap::new(n_components, n_neighbors)
        .with_min_dist(options.min_dist)
        .with_spread(options.spread)
        .with_learning_rate(options.learning_rate)
        .with_negative_sample_rate(options.negative_sample_rate)
        .with_repulsion_strength(options.repulsion_strength)
        .with_init(options.init)
        .with_seed_opt(options.seed.map(|s| s.wrapping_add(1)));
    if let Some(epochs) = options.n_epochs {
        umap = umap.with_n_epochs(epochs);
    }
    umap.fit_transform(&projected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vectors(n: usize, dim: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| {
                (0..dim)
                    .map(|d| if d == i % 3 { 1.0 } else { 0.01 * ((i * 7 + d) % 11) as f32 })
                    .collect()
            })
            .collect()
    }

    fn quick() -> ReduceOptions {
        ReduceOptions {
            seed: Some(42),
            n_epochs: Some(30),
            ..Default::default()
        }
    }

    #[test]
    fn test_reduce_preserves_order_and_width() {
        let data = vectors(40, 16);
        let out = reduce(&data, 3, 5, &quick()).unwrap();
        assert_eq!(out.len(), 40);
        assert!(out.iter().all(|r| r.len() == 3));
    }

    #[test]
    fn test_reduce_through_pca_stage() {
        let data = vectors(40, 16);
        let options = ReduceOptions {
            intermediate_width: 8,
            ..quick()
        };
        let out = reduce(&data, 2, 5, &options).unwrap();
        assert_eq!(out.len(), 40);
    }

    #[test]
    fn test_reduce_seeded_is_reproducible() {
        let data = vectors(30, 10);
        let a = reduce(&data, 2, 5, &quick()).unwrap();
        let b = reduce(&data, 2, 5, &quick()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_reduce_fails_fast() {
        let data = vectors(5, 4);
        assert!(matches!(
            reduce(&data, 2, 10, &quick()),
            Err(Error::InsufficientItems {
                n_neighbors: 10,
                n_items: 5
            })
        ));
        assert!(reduce(&data, 0, 3, &quick()).is_err());
        assert!(reduce(&data, 2, 1, &quick()).is_err());
        assert!(matches!(reduce(&[], 2, 2, &quick()), Err(Error::EmptyInput)));

        let far = ReduceOptions {
            min_dist: 5.0,
            ..quick()
        };
        assert!(matches!(
            reduce(&vectors(20, 4), 2, 3, &far),
            Err(Error::InvalidParameter { name: "min_dist", .. })
        ));

        let mut ragged = vectors(6, 4);
        ragged[3].pop();
        assert!(matches!(
            reduce(&ragged, 2, 3, &quick()),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
