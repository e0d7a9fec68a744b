//! Cosine distance helpers shared by the neighbor graph and the clusterer.
//!
//! Rows are normalized once; a zero row stays zero and so sits at distance 1
//! from everything except itself. Distances are clamped to `[0, 2]`.

use crate::error::{Error, Result};
use ndarray::Array2;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// L2-normalize every row; zero rows are left as zeros.
pub fn normalize_rows(data: &[Vec<f32>]) -> Vec<Vec<f32>> {
    data.iter()
        .map(|row| {
            let norm = row
                .iter()
                .map(|&v| f64::from(v) * f64::from(v))
                .sum::<f64>()
                .sqrt();
            if norm == 0.0 {
                vec![0.0; row.len()]
            } else {
                row.iter().map(|&v| (f64::from(v) / norm) as f32).collect()
            }
        })
        .collect()
}

/// Cosine distance between two already-normalized vectors.
#[inline]
pub fn cosine_distance_unit(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum();
    (1.0 - dot).clamp(0.0, 2.0)
}

/// Cosine distance between two arbitrary vectors.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (na.sqrt() * nb.sqrt())).clamp(0.0, 2.0)
}

/// Full `n × n` cosine distance matrix with a zero diagonal.
///
/// O(n²) time and memory; rows are computed in parallel with the
/// `parallel` feature.
pub fn pairwise_cosine(data: &[Vec<f32>]) -> Result<Array2<f64>> {
    let n = data.len();
    let normed = normalize_rows(data);
    let row = |i: usize| -> Vec<f64> {
        (0..n)
            .map(|j| {
                if i == j {
                    0.0
                } else {
                    cosine_distance_unit(&normed[i], &normed[j])
                }
            })
            .collect()
    };

    #[cfg(feature = "parallel")]
    let rows: Vec<Vec<f64>> = (0..n).into_par_iter().map(row).collect();
    #[cfg(not(feature = "parallel"))]
    let rows: Vec<Vec<f64>> = (0..n).map(row).collect();

    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n, n), flat).map_err(|e| Error::invalid("distance_matrix", e.to_string()))
}
