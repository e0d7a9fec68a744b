//! Randomized PCA.
//!
//! Projects centered rows onto their leading principal directions using
//! randomized subspace iteration (Halko, Martinsson, Tropp 2011):
//!
//! ```text
//! Y = X Ω              Ω: d × l Gaussian, l = k + oversamples
//! Q = qr(Y).Q          repeated with power iterations (X Xᵀ)^q
//! B = Qᵀ X             l × d, small
//! B = U Σ Vᵀ           thin SVD
//! scores = Q U_k Σ_k
//! ```
//!
//! QR and SVD come from `faer`. The `n × d` products stay in `f32`; only the
//! small SVD of `B` runs in `f64`.

use crate::error::{Error, Result};
use faer::Mat;
use rand::prelude::*;
use rand_distr::StandardNormal;

const OVERSAMPLES: usize = 10;
const POWER_ITERS: usize = 4;

/// Randomized principal component projection.
#[derive(Debug, Clone)]
pub struct Pca {
    n_components: usize,
    seed: Option<u64>,
}

impl Pca {
    /// Project onto `n_components` principal directions.
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            seed: None,
        }
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

    /// Project `data` to at most `n_components` columns.
    ///
    /// Input no wider than `n_components` is returned unchanged. With fewer
    /// rows than `n_components` the output width is the row count.
    pub fn fit_transform(&self, data: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        if self.n_components == 0 {
            return Err(Error::invalid("n_components", "must be at least 1"));
        }
        let Some(d) = crate::error::validate_rows(data, "pca input")? else {
            return Ok(Vec::new());
        };
        if d <= self.n_components {
            return Ok(data.to_vec());
        }
        let n = data.len();
        let k = self.n_components.min(n);
        let l = (k + OVERSAMPLES).min(n).min(d);

        let mut mean = vec![0.0f32; d];
        for row in data {
            for (m, &v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n as f32);
        let x = Mat::<f32>::from_fn(n, d, |i, j| data[i][j] - mean[j]);
        let xt = x.transpose();

        let mut rng: Box<dyn RngCore> = match self.seed {
            Some(s) => Box::new(StdRng::seed_from_u64(s)),
            None => Box::new(rand::rng()),
        };
        let omega = Mat::<f32>::from_fn(d, l, |_, _| rng.sample::<f32, _>(StandardNormal));

        let mut q = thin_q(&x * &omega);
        for _ in 0..POWER_ITERS {
            let z = thin_q(&xt * &q);
            q = thin_q(&x * &z);
        }

        let qt = q.transpose();
        let b32 = &qt * &x;
        let b = Mat::<f64>::from_fn(l, d, |i, j| f64::from(b32[(i, j)]));
        let svd = b
            .thin_svd()
            .map_err(|e| Error::LinearAlgebra(format!("pca svd: {e:?}")))?;
        let u = svd.U();
        let sigma = svd.S().column_vector();

        let mut order: Vec<usize> = (0..l).collect();
        order.sort_by(|&i, &j| sigma[j].total_cmp(&sigma[i]));
        // scores = Q · U_k · Σ_k
        let u_sigma = Mat::<f32>::from_fn(l, k, |r, c| (u[(r, order[c])] * sigma[order[c]]) as f32);
        let mut scores = &q * &u_sigma;
        flip_signs(&mut scores);

        tracing::debug!(n, from = d, to = k, "pca projection");
        Ok((0..n)
            .map(|i| (0..k).map(|j| scores[(i, j)]).collect())
            .collect())
    }
}

/// Orthonormal basis of the column space of `m`.
fn thin_q(m: Mat<f32>) -> Mat<f32> {
    m.qr().compute_thin_Q()
}

/// Make the largest-magnitude entry of each column positive.
fn flip_signs(scores: &mut Mat<f32>) {
    for j in 0..scores.ncols() {
        let pivot = (0..scores.nrows())
            .map(|i| scores[(i, j)])
            .fold(0.0f32, |best, v| if v.abs() > best.abs() { v } else { best });
        if pivot < 0.0 {
            for i in 0..scores.nrows() {
                scores[(i, j)] = -scores[(i, j)];
            }
        }
    }
}
