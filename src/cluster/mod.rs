//! Density-based clustering of reduced vectors.
//!
//! Items are grouped by HDBSCAN over cosine distance. Unlike k-means the
//! number of clusters is not fixed up front, and points that sit in sparse
//! regions are reported as noise rather than forced into the nearest group.
//!
//! ## Labels
//!
//! | Label | Meaning |
//! |-------|---------|
//! | `0..k` | dense cluster id |
//! | [`NOISE`] (`-1`) | outlier, excluded from every downstream stage |
//!
//! ## Usage
//!
//! ```rust
//! use narrative_map::cluster::{Clustering, Hdbscan, NOISE};
//!
//! let mut data = vec![vec![1.0, 0.0]; 10];
//! data.extend(vec![vec![0.0, 1.0]; 10]);
//!
//! let labels = Hdbscan::new(5, 3).fit_predict(&data).unwrap();
//! assert_eq!(labels.len(), 20);
//! assert_ne!(labels[0], NOISE);
//! assert_ne!(labels[0], labels[10]);
//! ```

mod hdbscan;
mod traits;

pub use hdbscan::{condense_tree, CondensedEdge, Hdbscan};
pub use traits::Clustering;

use crate::error::Result;

/// Label of points that belong to no cluster.
pub const NOISE: i32 = -1;

/// Cluster `reduced` with default HDBSCAN settings; one label per row.
pub fn cluster(reduced: &[Vec<f32>], min_cluster_size: usize, min_samples: usize) -> Result<Vec<i32>> {
    Hdbscan::new(min_cluster_size, min_samples).fit_predict(reduced)
}
