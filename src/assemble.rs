//! Output views over cluster summaries.
//!
//! Three projections, all pure:
//!
//! - [`ItemRow`]: one row per sampled item with its sentiment.
//! - [`ClusterRow`]: one row per cluster with its tone.
//! - [`NarrativeReport`]: compact per-cluster report for JSON export.
//!
//! Cluster ids, labels and counts are copied from the summaries unchanged, so
//! grouping the item view by `cluster_id` reproduces the cluster view.

use crate::corpus::{ItemId, TextItem};
use crate::error::Result;
use crate::summarize::{ClusterSummary, Sentiment, Tone, TopicLabel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Keywords shown per cluster in the report.
pub const REPORT_HEADLINE_TERMS: usize = 3;

/// One sampled item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRow {
    /// Community or source the corpus came from.
    pub group_name: String,
    /// Dense cluster id.
    pub cluster_id: usize,
    /// Topic of the item's cluster.
    pub topic_label: TopicLabel,
    /// Full size of the item's cluster.
    pub cluster_member_count: usize,
    /// Item identifier.
    pub item_id: ItemId,
    /// Item text.
    pub text: String,
    /// Item sentiment.
    pub sentiment: Sentiment,
    /// Classifier confidence.
    pub score: f64,
}

/// One cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRow {
    /// Community or source the corpus came from.
    pub group_name: String,
    /// Dense cluster id.
    pub cluster_id: usize,
    /// Topic of the cluster.
    pub topic_label: TopicLabel,
    /// Full cluster size.
    pub member_count: usize,
    /// Number of sampled items.
    pub sample_count: usize,
    /// Aggregate tone.
    pub tone: Tone,
}

/// One cluster of a [`NarrativeReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportCluster {
    /// Short topic description.
    pub label: String,
    /// Aggregate tone.
    pub tone: Tone,
    /// Full cluster size.
    pub comment_count: usize,
}

/// Compact report over all clusters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeReport {
    /// Community or source the corpus came from.
    pub group_name: String,
    /// Clusters in id order.
    pub clusters: Vec<ReportCluster>,
}

impl NarrativeReport {
    /// Serialize as compact JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize as indented JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builds output views for one corpus.
pub struct SummaryAssembler<'a> {
    group_name: &'a str,
    texts: HashMap<ItemId, &'a str>,
}

impl<'a> SummaryAssembler<'a> {
    /// Create an assembler resolving item texts from `items`.
    pub fn new(group_name: &'a str, items: &'a [TextItem]) -> Self {
        let texts = items.iter().map(|item| (item.id(), item.text())).collect();
        Self { group_name, texts }
    }

    /// One row per sampled item, clusters in summary order.
    pub fn item_view(&self, summaries: &[ClusterSummary]) -> Vec<ItemRow> {
        summaries
            .iter()
            .flat_map(|summary| {
                summary.sentiment_records.iter().map(move |record| ItemRow {
                    group_name: self.group_name.to_string(),
                    cluster_id: summary.cluster_id,
                    topic_label: summary.topic_label.clone(),
                    cluster_member_count: summary.member_count,
                    item_id: record.item_id,
                    text: self
                        .texts
                        .get(&record.item_id)
                        .map(|t| t.to_string())
                        .unwrap_or_default(),
                    sentiment: record.label,
                    score: record.score,
                })
            })
            .collect()
    }

    /// One row per cluster.
    pub fn cluster_view(&self, summaries: &[ClusterSummary]) -> Vec<ClusterRow> {
        summaries
            .iter()
            .map(|summary| ClusterRow {
                group_name: self.group_name.to_string(),
                cluster_id: summary.cluster_id,
                topic_label: summary.topic_label.clone(),
                member_count: summary.member_count,
                sample_count: summary.sample_item_ids.len(),
                tone: summary.aggregated_tone,
            })
            .collect()
    }

    /// Compact report.
    pub fn report(&self, summaries: &[ClusterSummary]) -> NarrativeReport {
        NarrativeReport {
            group_name: self.group_name.to_string(),
            clusters: summaries
                .iter()
                .map(|summary| ReportCluster {
                    label: summary.topic_label.headline(REPORT_HEADLINE_TERMS),
                    tone: summary.aggregated_tone,
                    comment_count: summary.member_count,
                })
                .collect(),
        }
    }
}
