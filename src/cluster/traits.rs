//! Clustering traits.

use crate::error::Result;

/// Trait for flat clustering algorithms that may leave points unassigned.
pub trait Clustering {
    /// Fit the model to data and return cluster assignments.
    ///
    /// Returns one label per input point. Labels of real clusters are
    /// `0..k`; [`NOISE`](super::NOISE) marks points in no cluster.
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<i32>>;
}
