//! Pipeline configuration.
//!
//! Uses Figment to merge, in increasing priority:
//!
//! 1. built-in defaults,
//! 2. `narrative.toml` in the working directory (optional),
//! 3. `NARRATIVE_*` environment variables (`__` separates nested keys, e.g.
//!    `NARRATIVE_HYPERPARAMETERS__N_NEIGHBORS=30`).
//!
//! ```toml
//! group_name = "r/rust"
//! mode = "short_form"
//! sample_cap = 200
//! seed = 42
//! ```

use crate::error::{Error, Result};
use crate::reduce::ReduceOptions;
use crate::sample::DEFAULT_SAMPLE_CAP;
use crate::scale::{ClusteringMode, ClusteringProfile, Hyperparameters};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "narrative.toml";
/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "NARRATIVE_";

/// Settings for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name of the community the corpus came from, copied into every view.
    pub group_name: String,
    /// Preset used to scale hyperparameters.
    pub mode: ClusteringMode,
    /// Explicit hyperparameters; skips scaling when set.
    pub hyperparameters: Option<Hyperparameters>,
    /// Per-cluster sample cap.
    pub sample_cap: usize,
    /// Seed for reduction and sampling; unseeded runs are not reproducible.
    pub seed: Option<u64>,
    /// Width of the PCA stage.
    pub intermediate_width: usize,
    /// UMAP epochs; `None` picks by corpus size.
    pub n_epochs: Option<usize>,
    /// UMAP minimum distance.
    pub min_dist: f32,
    /// Let a single dense group be reported as one cluster.
    pub allow_single_cluster: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let reduce = ReduceOptions::default();
        Self {
            group_name: String::new(),
            mode: ClusteringMode::Standard,
            hyperparameters: None,
            sample_cap: DEFAULT_SAMPLE_CAP,
            seed: None,
            intermediate_width: reduce.intermediate_width,
            n_epochs: reduce.n_epochs,
            min_dist: reduce.min_dist,
            allow_single_cluster: false,
        }
    }
}

impl PipelineConfig {
    /// Layered providers reading `path` as the TOML layer.
    pub fn figment_from(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(PipelineConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load from `narrative.toml` and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load from the given TOML file and the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = Self::figment_from(path).extract()?;
        config.validate()?;
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Check value ranges, including the reducer options derived from them.
    pub fn validate(&self) -> Result<()> {
        if self.sample_cap == 0 {
            return Err(Error::invalid("sample_cap", "must be at least 1"));
        }
        self.reduce_options().validate()?;
        if let Some(params) = &self.hyperparameters {
            params.validate()?;
        }
        Ok(())
    }

    /// The scaling profile of the configured mode.
    pub fn profile(&self) -> ClusteringProfile {
        self.mode.profile()
    }

    /// Reducer settings derived from this configuration.
    pub fn reduce_options(&self) -> ReduceOptions {
        ReduceOptions {
            intermediate_width: self.intermediate_width,
            min_dist: self.min_dist,
            n_epochs: self.n_epochs,
            seed: self.seed,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_min_dist_bounded_by_spread() {
        let spread = ReduceOptions::default().spread;
        let at_spread = PipelineConfig {
            min_dist: spread,
            ..Default::default()
        };
        assert!(at_spread.validate().is_ok());

        for min_dist in [5.0, -0.1, f32::NAN] {
            let config = PipelineConfig {
                min_dist,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(Error::InvalidParameter { name: "min_dist", .. })
            ));
        }
    }

    #[test]
    fn test_defaults_without_sources() {
        Jail::expect_with(|_jail| {
            let config = PipelineConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config, PipelineConfig::default());
            assert_eq!(config.sample_cap, 500);
            assert_eq!(config.intermediate_width, 100);
            assert_eq!(config.min_dist, 0.0);
            Ok(())
        });
    }

    #[test]
    fn test_toml_then_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "narrative.toml",
                r#"
                group_name = "r/rust"
                mode = "long_form"
                sample_cap = 200
                seed = 1
                "#,
            )?;
            jail.set_env("NARRATIVE_SEED", "99");
            jail.set_env("NARRATIVE_ALLOW_SINGLE_CLUSTER", "true");

            let config = PipelineConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.group_name, "r/rust");
            assert_eq!(config.mode, ClusteringMode::LongForm);
            assert_eq!(config.sample_cap, 200);
            assert_eq!(config.seed, Some(99));
            assert!(config.allow_single_cluster);
            assert_eq!(config.reduce_options().seed, Some(99));
            Ok(())
        });
    }

    #[test]
    fn test_explicit_hyperparameters() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                [hyperparameters]
                n_neighbors = 12
                n_components = 6
                min_cluster_size = 25
                min_samples = 5
                "#,
            )?;
            jail.set_env("NARRATIVE_HYPERPARAMETERS__MIN_SAMPLES", "7");
            let config = PipelineConfig::load_from("custom.toml").map_err(|e| e.to_string())?;
            let params = config.hyperparameters.ok_or("hyperparameters missing")?;
            assert_eq!(params.n_neighbors, 12);
            assert_eq!(params.min_samples, 7);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("narrative.toml", "sample_cap = 0")?;
            assert!(matches!(
                PipelineConfig::load(),
                Err(Error::InvalidParameter { name: "sample_cap", .. })
            ));
            jail.create_file("narrative.toml", "min_dist = 5.0")?;
            assert!(matches!(
                PipelineConfig::load(),
                Err(Error::InvalidParameter { name: "min_dist", .. })
            ));
            jail.create_file("narrative.toml", "mode = \"epic\"")?;
            assert!(matches!(PipelineConfig::load(), Err(Error::Config(_))));
            Ok(())
        });
    }
}
