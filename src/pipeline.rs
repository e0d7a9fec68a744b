//! End-to-end pipeline.
//!
//! ```text
//! items ─► CorpusStats ─► scale ─► Hyperparameters
//!   │                                   │
//!   └──► embeddings ─► reduce ─► Hdbscan ─► labels ─► sample ─► aggregate ─► NarrativeMap
//! ```
//!
//! Every configuration error surfaces before the first matrix product.
//! Noise items are dropped after clustering and never reach the
//! collaborators.

use crate::assemble::{ClusterRow, ItemRow, NarrativeReport, SummaryAssembler};
use crate::cluster::{Clustering, Hdbscan, NOISE};
use crate::config::PipelineConfig;
use crate::corpus::{CorpusStats, ItemId, TextItem, TokenCounter, WhitespaceTokenCounter};
use crate::error::{Error, Result};
use crate::reduce::reduce;
use crate::sample::ClusterSampler;
use crate::scale::{scale, Hyperparameters};
use crate::summarize::{ClusterAggregator, ClusterSummary, SentimentClassifier, TopicLabeler};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Cluster label of one item; `-1` is noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    /// Item identifier.
    pub item_id: ItemId,
    /// Dense cluster id, or `-1`.
    pub label: i32,
}

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeMap {
    /// Community or source the corpus came from.
    pub group_name: String,
    /// Corpus statistics the parameters were scaled from.
    pub stats: CorpusStats,
    /// Hyperparameters used for reduction and clustering.
    pub params: Hyperparameters,
    /// One assignment per input item, input order.
    pub assignments: Vec<ClusterAssignment>,
    /// One summary per cluster, in id order.
    pub summaries: Vec<ClusterSummary>,
}

impl NarrativeMap {
    /// Number of clusters found.
    pub fn n_clusters(&self) -> usize {
        self.summaries.len()
    }

    /// Number of items labeled noise.
    pub fn noise_count(&self) -> usize {
        self.assignments.iter().filter(|a| a.label == NOISE).count()
    }

    /// One row per sampled item; `items` supplies the texts.
    pub fn item_view(&self, items: &[TextItem]) -> Vec<ItemRow> {
        SummaryAssembler::new(&self.group_name, items).item_view(&self.summaries)
    }

    /// One row per cluster.
    pub fn cluster_view(&self) -> Vec<ClusterRow> {
        SummaryAssembler::new(&self.group_name, &[]).cluster_view(&self.summaries)
    }

    /// Compact report for JSON export.
    pub fn report(&self) -> NarrativeReport {
        SummaryAssembler::new(&self.group_name, &[]).report(&self.summaries)
    }
}

/// Clustering pipeline with explicit collaborators.
pub struct NarrativePipeline {
    config: PipelineConfig,
    labeler: Box<dyn TopicLabeler>,
    classifier: Box<dyn SentimentClassifier>,
    token_counter: Box<dyn TokenCounter>,
}

impl NarrativePipeline {
    /// Create a pipeline. Tokens are counted by whitespace until
    /// [`with_token_counter`](Self::with_token_counter) says otherwise.
    pub fn new(
        config: PipelineConfig,
        labeler: impl TopicLabeler + 'static,
        classifier: impl SentimentClassifier + 'static,
    ) -> Self {
        Self {
            config,
            labeler: Box::new(labeler),
            classifier: Box::new(classifier),
            token_counter: Box::new(WhitespaceTokenCounter),
        }
    }

    /// Set the tokenizer used for corpus statistics.
    pub fn with_token_counter(mut self, counter: impl TokenCounter + 'static) -> Self {
        self.token_counter = Box::new(counter);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Hyperparameters for `stats`: the explicit override, or scaled from
    /// the configured mode.
    pub fn hyperparameters(&self, stats: &CorpusStats) -> Result<Hyperparameters> {
        match self.config.hyperparameters {
            Some(params) => Ok(params),
            None => scale(stats, &self.config.profile()),
        }
    }

    /// Run every stage over `items`.
    ///
    /// An empty corpus yields an empty map rather than an error.
    ///
    /// # Errors
    ///
    /// Configuration errors (invalid settings, fewer items than
    /// `n_neighbors`, mixed embedding widths, duplicate ids) are returned
    /// before reduction starts.
    pub fn run(&self, items: &[TextItem]) -> Result<NarrativeMap> {
        self.config.validate()?;
        let stats = CorpusStats::from_items(items, self.token_counter.as_ref());
        let params = self.hyperparameters(&stats)?;
        params.validate()?;

        let mut map = NarrativeMap {
            group_name: self.config.group_name.clone(),
            stats,
            params,
            assignments: Vec::new(),
            summaries: Vec::new(),
        };
        if items.is_empty() {
            tracing::info!("empty corpus, nothing to cluster");
            return Ok(map);
        }
        check_items(items)?;
        if items.len() < params.n_neighbors {
            return Err(Error::InsufficientItems {
                n_neighbors: params.n_neighbors,
                n_items: items.len(),
            });
        }

        tracing::info!(
            n_items = items.len(),
            n_neighbors = params.n_neighbors,
            n_components = params.n_components,
            min_cluster_size = params.min_cluster_size,
            min_samples = params.min_samples,
            "reducing embeddings"
        );
        let vectors: Vec<Vec<f32>> = items.iter().map(|item| item.embedding().to_vec()).collect();
        let reduced = reduce(
            &vectors,
            params.n_components,
            params.n_neighbors,
            &self.config.reduce_options(),
        )?;

        let labels = Hdbscan::new(params.min_cluster_size, params.min_samples)
            .with_allow_single_cluster(self.config.allow_single_cluster)
            .fit_predict(&reduced)?;
        map.assignments = items
            .iter()
            .zip(&labels)
            .map(|(item, &label)| ClusterAssignment {
                item_id: item.id(),
                label,
            })
            .collect();

        let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (index, &label) in labels.iter().enumerate() {
            if let Ok(cluster_id) = usize::try_from(label) {
                members.entry(cluster_id).or_default().push(index);
            }
        }
        tracing::info!(
            n_clusters = members.len(),
            n_noise = map.noise_count(),
            "clustering finished"
        );

        let samples = ClusterSampler::new(self.config.sample_cap)
            .with_seed_opt(self.config.seed)
            .sample(&members)?;

        let aggregator = ClusterAggregator::new(self.labeler.as_ref(), self.classifier.as_ref());
        map.summaries = samples
            .iter()
            .map(|(&cluster_id, sampled)| {
                let sample: Vec<(ItemId, &str)> = sampled
                    .iter()
                    .map(|&i| (items[i].id(), items[i].text()))
                    .collect();
                aggregator.aggregate(cluster_id, members[&cluster_id].len(), &sample)
            })
            .collect();
        tracing::info!(n_summaries = map.summaries.len(), "summaries ready");
        Ok(map)
    }
}

/// Items must share one embedding width and have unique ids.
fn check_items(items: &[TextItem]) -> Result<()> {
    let dim = items.first().map_or(0, TextItem::dim);
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if item.dim() != dim {
            return Err(Error::DimensionMismatch {
                expected: dim,
                found: item.dim(),
            });
        }
        if !seen.insert(item.id()) {
            return Err(Error::invalid("items", format!("duplicate item id {}", item.id())));
        }
    }
    Ok(())
}
