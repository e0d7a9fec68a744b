//! Adaptive hyperparameters from corpus statistics.
//!
//! A [`ClusteringProfile`] fixes baseline values tuned for a reference corpus.
//! [`scale`] stretches them to the corpus at hand:
//!
//! ```text
//! size_scale           = max(1, total_tokens / baseline_tokens * 0.75)
//! length_inverse_scale = clamp(baseline_avg_tokens / avg_tokens, 0.6, 1.0)
//! verbosity_boost      = min(1.5, avg_tokens / baseline_avg_tokens)
//!
//! n_components     = clamp(⌊log2(num_texts) · verbosity_boost⌋, min_dim, max_dim)
//! n_neighbors      = ⌊base_n_neighbors · size_scale⌋
//! min_cluster_size = ⌊base_min_cluster_size · size_scale · length_inverse_scale⌋
//! min_samples      = ⌊base_min_samples · length_inverse_scale⌋
//! ```
//!
//! Larger corpora get wider neighborhoods and larger minimum clusters; longer
//! texts get fewer, larger clusters and more reduced dimensions.

use crate::corpus::CorpusStats;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SIZE_SCALE_FACTOR: f64 = 0.75;
const MIN_LENGTH_INVERSE: f64 = 0.6;
const MAX_LENGTH_INVERSE: f64 = 1.0;
const MAX_VERBOSITY_BOOST: f64 = 1.5;

/// Hyperparameters for reduction and clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// Neighborhood size for the neighbor graph.
    pub n_neighbors: usize,
    /// Width of the reduced space.
    pub n_components: usize,
    /// Smallest group the clusterer will report.
    pub min_cluster_size: usize,
    /// Neighbor rank used for core distances.
    pub min_samples: usize,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            n_neighbors: 20,
            n_components: 20,
            min_cluster_size: 40,
            min_samples: 15,
        }
    }
}

impl Hyperparameters {
    /// Reject values the reducer or clusterer would refuse.
    pub fn validate(&self) -> Result<()> {
        if self.n_neighbors < 2 {
            return Err(Error::invalid("n_neighbors", "must be at least 2"));
        }
        if self.n_components == 0 {
            return Err(Error::invalid("n_components", "must be at least 1"));
        }
        if self.min_cluster_size < 2 {
            return Err(Error::invalid("min_cluster_size", "must be at least 2"));
        }
        if self.min_samples == 0 {
            return Err(Error::invalid("min_samples", "must be at least 1"));
        }
        Ok(())
    }
}

/// Named preset selecting a [`ClusteringProfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusteringMode {
    /// Comments of typical length.
    #[default]
    Standard,
    /// Long posts.
    LongForm,
    /// Very short messages.
    ShortForm,
}

impl ClusteringMode {
    /// Every mode.
    pub const ALL: [ClusteringMode; 3] = [
        ClusteringMode::Standard,
        ClusteringMode::LongForm,
        ClusteringMode::ShortForm,
    ];

    /// Preset name.
    pub fn as_str(self) -> &'static str {
        match self {
            ClusteringMode::Standard => "standard",
            ClusteringMode::LongForm => "long_form",
            ClusteringMode::ShortForm => "short_form",
        }
    }

    /// The profile for this mode.
    pub fn profile(self) -> ClusteringProfile {
        match self {
            ClusteringMode::Standard => ClusteringProfile {
                name: "standard".into(),
                base_n_components: 10,
                base_n_neighbors: 20,
                base_min_cluster_size: 50,
                base_min_samples: 10,
                baseline_tokens: 25_000,
                baseline_avg_tokens: 40,
                min_dim: 5,
                max_dim: 50,
            },
            ClusteringMode::LongForm => ClusteringProfile {
                name: "long_form".into(),
                base_n_components: 20,
                base_n_neighbors: 15,
                base_min_cluster_size: 30,
                base_min_samples: 5,
                baseline_tokens: 50_000,
                baseline_avg_tokens: 100,
                min_dim: 5,
                max_dim: 50,
            },
            ClusteringMode::ShortForm => ClusteringProfile {
                name: "short_form".into(),
                base_n_components: 8,
                base_n_neighbors: 10,
                base_min_cluster_size: 10,
                base_min_samples: 5,
                baseline_tokens: 10_000,
                baseline_avg_tokens: 30,
                min_dim: 5,
                max_dim: 50,
            },
        }
    }
}

impl fmt::Display for ClusteringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusteringMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ClusteringMode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::invalid(
                    "mode",
                    format!("unknown clustering mode '{s}' (expected standard, long_form or short_form)"),
                )
            })
    }
}

/// Baseline hyperparameters for a reference corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusteringProfile {
    /// Preset name, used in logs.
    pub name: String,
    /// Reference reduced width; kept for reporting, the scaler derives width
    /// from corpus size instead.
    pub base_n_components: usize,
    /// Neighborhood size at the baseline corpus size.
    pub base_n_neighbors: usize,
    /// Minimum cluster size at the baseline corpus size.
    pub base_min_cluster_size: usize,
    /// Core-distance rank at the baseline text length.
    pub base_min_samples: usize,
    /// Corpus size (tokens) the baselines were tuned on.
    pub baseline_tokens: usize,
    /// Mean text length (tokens) the baselines were tuned on.
    pub baseline_avg_tokens: usize,
    /// Lower bound for `n_components`.
    pub min_dim: usize,
    /// Upper bound for `n_components`.
    pub max_dim: usize,
}

impl Default for ClusteringProfile {
    fn default() -> Self {
        ClusteringMode::Standard.profile()
    }
}

impl ClusteringProfile {
    /// Reject profiles the scaler cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.baseline_tokens == 0 {
            return Err(Error::invalid("baseline_tokens", "must be positive"));
        }
        if self.baseline_avg_tokens == 0 {
            return Err(Error::invalid("baseline_avg_tokens", "must be positive"));
        }
        if self.min_dim == 0 || self.min_dim > self.max_dim {
            return Err(Error::invalid(
                "min_dim",
                format!("need 1 <= min_dim <= max_dim, got {}..{}", self.min_dim, self.max_dim),
            ));
        }
        if self.base_n_neighbors == 0 || self.base_min_cluster_size == 0 || self.base_min_samples == 0 {
            return Err(Error::invalid("profile", "base values must be positive"));
        }
        Ok(())
    }
}

/// Scale `profile` to the corpus described by `stats`.
///
/// Never fails on degenerate statistics: `num_texts < 2` falls back to
/// `min_dim` and `avg_tokens == 0` falls back to a length scale of 1.
/// Results are floored at the smallest values the clusterer accepts
/// (`n_neighbors >= 2`, `min_cluster_size >= 2`, `min_samples >= 1`).
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if the profile itself is invalid.
pub fn scale(stats: &CorpusStats, profile: &ClusteringProfile) -> Result<Hyperparameters> {
    profile.validate()?;

    let baseline_tokens = profile.baseline_tokens as f64;
    let baseline_avg = profile.baseline_avg_tokens as f64;
    let avg_tokens = if stats.avg_tokens.is_finite() {
        stats.avg_tokens.max(0.0)
    } else {
        0.0
    };

    let size_scale = (stats.total_tokens as f64 / baseline_tokens * SIZE_SCALE_FACTOR).max(1.0);
    let length_inverse_scale = length_inverse_scale(baseline_avg, avg_tokens);
    let verbosity_boost = (avg_tokens / baseline_avg).min(MAX_VERBOSITY_BOOST);

    let n_components = if stats.num_texts < 2 {
        profile.min_dim
    } else {
        let dim_base = (stats.num_texts as f64).log2() * verbosity_boost;
        (dim_base as usize).clamp(profile.min_dim, profile.max_dim)
    };

    let params = Hyperparameters {
        n_neighbors: ((profile.base_n_neighbors as f64 * size_scale) as usize).max(2),
        n_components,
        min_cluster_size: ((profile.base_min_cluster_size as f64 * size_scale * length_inverse_scale)
            as usize)
            .max(2),
        min_samples: ((profile.base_min_samples as f64 * length_inverse_scale) as usize).max(1),
    };

    tracing::debug!(
        profile = %profile.name,
        total_tokens = stats.total_tokens,
        avg_tokens,
        num_texts = stats.num_texts,
        size_scale,
        length_inverse_scale,
        verbosity_boost,
        n_neighbors = params.n_neighbors,
        n_components = params.n_components,
        min_cluster_size = params.min_cluster_size,
        min_samples = params.min_samples,
        "scaled clustering parameters"
    );

    Ok(params)
}

fn length_inverse_scale(baseline_avg: f64, avg_tokens: f64) -> f64 {
    if avg_tokens == 0.0 {
        return MAX_LENGTH_INVERSE;
    }
    (baseline_avg / avg_tokens).clamp(MIN_LENGTH_INVERSE, MAX_LENGTH_INVERSE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_baseline_corpus() {
        // Exactly the baseline: 625 texts x 40 tokens = 25k tokens.
        let stats = CorpusStats::new(625, 25_000, 40.0);
        let p = scale(&stats, &ClusteringMode::Standard.profile()).unwrap();
        // size_scale = max(1, 0.75) = 1; length scale = 1; boost = 1
        assert_eq!(p.n_neighbors, 20);
        assert_eq!(p.min_cluster_size, 50);
        assert_eq!(p.min_samples, 10);
        // log2(625) = 9.29 -> 9
        assert_eq!(p.n_components, 9);
    }

    #[test]
    fn test_large_corpus_scales_up() {
        // 200k tokens: size_scale = 8 * 0.75 = 6
        let stats = CorpusStats::new(4000, 200_000, 50.0);
        let p = scale(&stats, &ClusteringMode::Standard.profile()).unwrap();
        assert_eq!(p.n_neighbors, 120);
        // length scale = 40 / 50 = 0.8
        assert_eq!(p.min_cluster_size, 240);
        assert_eq!(p.min_samples, 8);
        // log2(4000) * 1.25 = 14.95 -> 14
        assert_eq!(p.n_components, 14);
    }

    #[test]
    fn test_length_scale_clamped() {
        // Very long texts: 40 / 400 = 0.1 clamps to 0.6
        let stats = CorpusStats::new(100, 40_000, 400.0);
        let p = scale(&stats, &ClusteringMode::Standard.profile()).unwrap();
        assert_eq!(p.min_samples, 6);
        // Very short texts: 40 / 2 = 20 clamps to 1.0
        let stats = CorpusStats::new(100, 200, 2.0);
        let p = scale(&stats, &ClusteringMode::Standard.profile()).unwrap();
        assert_eq!(p.min_samples, 10);
    }

    #[test]
    fn test_single_text_falls_back_to_min_dim() {
        for mode in ClusteringMode::ALL {
            let profile = mode.profile();
            for num_texts in [0, 1] {
                let stats = CorpusStats::new(num_texts, 10, 10.0);
                let p = scale(&stats, &profile).unwrap();
                assert_eq!(p.n_components, profile.min_dim);
            }
        }
    }

    #[test]
    fn test_zero_average_does_not_divide_by_zero() {
        let stats = CorpusStats::new(500, 0, 0.0);
        let p = scale(&stats, &ClusteringMode::LongForm.profile()).unwrap();
        assert_eq!(p.min_samples, 5);
        assert_eq!(p.min_cluster_size, 30);
        assert_eq!(p.n_components, 5);
    }

    #[test]
    fn test_outputs_positive_and_bounded() {
        let corpora = [
            CorpusStats::new(2, 3, 1.5),
            CorpusStats::new(150, 900, 6.0),
            CorpusStats::new(10_000, 1_000_000, 100.0),
            CorpusStats::new(500_000, 20_000_000, 40.0),
            CorpusStats::new(1 << 40, 1 << 45, 32.0),
        ];
        for mode in ClusteringMode::ALL {
            let profile = mode.profile();
            for stats in &corpora {
                let p = scale(stats, &profile).unwrap();
                assert!(p.n_components >= profile.min_dim && p.n_components <= profile.max_dim);
                assert!(p.n_neighbors >= 2);
                assert!(p.min_cluster_size >= 2);
                assert!(p.min_samples >= 1);
            }
        }
    }

    #[test]
    fn test_scale_is_deterministic() {
        let stats = CorpusStats::new(1800, 72_000, 40.0);
        let profile = ClusteringMode::ShortForm.profile();
        let first = scale(&stats, &profile).unwrap();
        for _ in 0..10 {
            assert_eq!(scale(&stats, &profile).unwrap(), first);
        }
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let mut profile = ClusteringProfile::default();
        profile.baseline_tokens = 0;
        assert!(scale(&CorpusStats::new(10, 100, 10.0), &profile).is_err());

        let mut profile = ClusteringProfile::default();
        profile.min_dim = 60;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_hyperparameter_validation() {
        assert!(Hyperparameters::default().validate().is_ok());
        let bad = Hyperparameters {
            min_cluster_size: 1,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = Hyperparameters {
            n_neighbors: 1,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("long_form".parse::<ClusteringMode>().unwrap(), ClusteringMode::LongForm);
        assert_eq!(" Short_Form ".parse::<ClusteringMode>().unwrap(), ClusteringMode::ShortForm);
        assert!("medium".parse::<ClusteringMode>().is_err());
        for mode in ClusteringMode::ALL {
            assert_eq!(mode.to_string().parse::<ClusteringMode>().unwrap(), mode);
            assert_eq!(mode.profile().name, mode.as_str());
        }
    }
}
