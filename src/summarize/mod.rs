//! Cluster-level aggregation of topic labels and sentiment.
//!
//! Labeling and sentiment classification are external (language models,
//! hosted classifiers). This module fixes their contracts as traits and
//! folds their per-item answers into one [`ClusterSummary`] per cluster.
//!
//! Collaborator failures never abort a run: a failed topic label becomes
//! [`TopicLabel::Unlabeled`] for that cluster, a failed sentiment call becomes
//! an `UNKNOWN` record for that item. Both are logged with `tracing::warn!`.
//!
//! Implementations can be plain closures via [`labeler_from_fn`] and
//! [`classifier_from_fn`], keeping this crate free of model dependencies.

mod keywords;
mod tone;

pub use keywords::{KeywordLabeler, DEFAULT_MAX_PHRASE_WORDS, DEFAULT_TOP_KEYWORDS};
pub use tone::{Tone, NEGATIVE_RATIO, POSITIVE_RATIO};

use crate::corpus::ItemId;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Describes what a cluster is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TopicLabel {
    /// Free-text summary.
    Summary(String),
    /// Keywords, most representative first.
    Keywords(Vec<String>),
    /// The labeler failed for this cluster.
    Unlabeled,
}

impl TopicLabel {
    /// Short display form: the summary, or the top `n` keywords joined.
    pub fn headline(&self, n: usize) -> String {
        match self {
            TopicLabel::Summary(text) => text.clone(),
            TopicLabel::Keywords(words) => words
                .iter()
                .take(n)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            TopicLabel::Unlabeled => String::new(),
        }
    }

    /// Whether the labeler produced anything.
    pub fn is_labeled(&self) -> bool {
        !matches!(self, TopicLabel::Unlabeled)
    }
}

impl fmt::Display for TopicLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.headline(usize::MAX))
    }
}

/// Per-item sentiment class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    /// Positive.
    Positive,
    /// Negative.
    Negative,
    /// Neither; ignored by the tone rule.
    Neutral,
    /// Classification failed; ignored by the tone rule.
    Unknown,
}

impl Sentiment {
    /// Upper-case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Positive => "POSITIVE",
            Sentiment::Negative => "NEGATIVE",
            Sentiment::Neutral => "NEUTRAL",
            Sentiment::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POSITIVE" | "POS" => Ok(Sentiment::Positive),
            "NEGATIVE" | "NEG" => Ok(Sentiment::Negative),
            "NEUTRAL" => Ok(Sentiment::Neutral),
            "UNKNOWN" => Ok(Sentiment::Unknown),
            other => Err(Error::invalid("sentiment", format!("unknown label '{other}'"))),
        }
    }
}

/// Classifier output for one text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    /// Predicted class.
    pub label: Sentiment,
    /// Classifier confidence.
    pub score: f64,
}

impl SentimentScore {
    /// Create a score.
    pub fn new(label: Sentiment, score: f64) -> Self {
        Self { label, score }
    }

    /// The record used when classification fails.
    pub fn unknown() -> Self {
        Self::new(Sentiment::Unknown, 0.0)
    }
}

/// Sentiment of one sampled item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentRecord {
    /// Item the record belongs to.
    pub item_id: ItemId,
    /// Predicted class.
    pub label: Sentiment,
    /// Classifier confidence.
    pub score: f64,
}

/// Summary of one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    /// Dense cluster id.
    pub cluster_id: usize,
    /// Full cluster size, before sampling.
    pub member_count: usize,
    /// Sampled items, input order.
    pub sample_item_ids: Vec<ItemId>,
    /// Topic of the cluster.
    pub topic_label: TopicLabel,
    /// One record per sampled item, same order as `sample_item_ids`.
    pub sentiment_records: Vec<SentimentRecord>,
    /// Aggregate tone of `sentiment_records`.
    pub aggregated_tone: Tone,
}

/// Labels a cluster from its sampled texts.
pub trait TopicLabeler: Send + Sync {
    /// Describe the cluster the `texts` were sampled from.
    fn label(&self, texts: &[&str]) -> anyhow::Result<TopicLabel>;
}

/// Classifies the sentiment of one text.
pub trait SentimentClassifier: Send + Sync {
    /// Classify `text`.
    fn classify(&self, text: &str) -> anyhow::Result<SentimentScore>;
}

/// A function-based topic labeler.
#[derive(Clone)]
pub struct FnLabeler<F> {
    f: F,
}

impl<F> TopicLabeler for FnLabeler<F>
where
    F: Fn(&[&str]) -> anyhow::Result<TopicLabel> + Send + Sync,
{
    fn label(&self, texts: &[&str]) -> anyhow::Result<TopicLabel> {
        (self.f)(texts)
    }
}

/// Create a topic labeler from a closure.
pub fn labeler_from_fn<F>(f: F) -> FnLabeler<F>
where
    F: Fn(&[&str]) -> anyhow::Result<TopicLabel> + Send + Sync,
{
    FnLabeler { f }
}

/// A function-based sentiment classifier.
#[derive(Clone)]
pub struct FnClassifier<F> {
    f: F,
}

impl<F> SentimentClassifier for FnClassifier<F>
where
    F: Fn(&str) -> anyhow::Result<SentimentScore> + Send + Sync,
{
    fn classify(&self, text: &str) -> anyhow::Result<SentimentScore> {
        (self.f)(text)
    }
}

/// Create a sentiment classifier from a closure.
pub fn classifier_from_fn<F>(f: F) -> FnClassifier<F>
where
    F: Fn(&str) -> anyhow::Result<SentimentScore> + Send + Sync,
{
    FnClassifier { f }
}

/// Turns sampled cluster members into [`ClusterSummary`] values.
pub struct ClusterAggregator<'a> {
    labeler: &'a dyn TopicLabeler,
    classifier: &'a dyn SentimentClassifier,
}

impl<'a> ClusterAggregator<'a> {
    /// Create an aggregator over the given collaborators.
    pub fn new(labeler: &'a dyn TopicLabeler, classifier: &'a dyn SentimentClassifier) -> Self {
        Self {
            labeler,
            classifier,
        }
    }

    /// Summarize one cluster from its `(item id, text)` sample.
    ///
    /// The labeler is called once with every sampled text; the classifier
    /// once per sampled text (concurrently with the `parallel` feature).
    pub fn aggregate(&self, cluster_id: usize, member_count: usize, sample: &[(ItemId, &str)]) -> ClusterSummary {
        let texts: Vec<&str> = sample.iter().map(|(_, text)| *text).collect();
        let topic_label = match self.labeler.label(&texts) {
            Ok(label) => label,
            Err(err) => {
                tracing::warn!(cluster_id, error = %err, "topic labeling failed");
                TopicLabel::Unlabeled
            }
        };

        let classify = |&(item_id, text): &(ItemId, &str)| -> SentimentRecord {
            let score = match self.classifier.classify(text) {
                Ok(s) if s.score.is_finite() => s,
                Ok(s) => {
                    tracing::warn!(cluster_id, %item_id, score = s.score, "non-finite sentiment score");
                    SentimentScore::unknown()
                }
                Err(err) => {
                    tracing::warn!(cluster_id, %item_id, error = %err, "sentiment classification failed");
                    SentimentScore::unknown()
                }
            };
            SentimentRecord {
                item_id,
                label: score.label,
                score: score.score,
            }
        };

        #[cfg(feature = "parallel")]
        let sentiment_records: Vec<SentimentRecord> = sample.par_iter().map(classify).collect();
        #[cfg(not(feature = "parallel"))]
        let sentiment_records: Vec<SentimentRecord> = sample.iter().map(classify).collect();

        let aggregated_tone = Tone::from_records(&sentiment_records);
        tracing::debug!(
            cluster_id,
            member_count,
            sampled = sample.len(),
            tone = %aggregated_tone,
            "cluster aggregated"
        );

        ClusterSummary {
            cluster_id,
            member_count,
            sample_item_ids: sample.iter().map(|(id, _)| *id).collect(),
            topic_label,
            sentiment_records,
            aggregated_tone,
        }
    }
}

/// Summarize one cluster with the given collaborators.
pub fn aggregate(
    cluster_id: usize,
    member_count: usize,
    sample: &[(ItemId, &str)],
    labeler: &dyn TopicLabeler,
    classifier: &dyn SentimentClassifier,
) -> ClusterSummary {
    ClusterAggregator::new(labeler, classifier).aggregate(cluster_id, member_count, sample)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn by_keyword() -> impl SentimentClassifier {
        classifier_from_fn(|text: &str| {
            if text.contains("fail") {
                anyhow::bail!("classifier unavailable");
            }
            let label = if text.contains("good") {
                Sentiment::Positive
            } else if text.contains("bad") {
                Sentiment::Negative
            } else {
                Sentiment::Neutral
            };
            Ok(SentimentScore::new(label, 0.9))
        })
    }

    fn sample(texts: &[&'static str]) -> Vec<(ItemId, &'static str)> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| (ItemId(i as u64 * 10), *t))
            .collect()
    }

    #[test]
    fn test_aggregate_counts_and_tone() {
        let labeler = labeler_from_fn(|texts: &[&str]| Ok(TopicLabel::Summary(format!("{} texts", texts.len()))));
        let classifier = by_keyword();
        let items = sample(&["good day", "good food", "good times", "bad traffic", "so so"]);
        let summary = aggregate(3, 40, &items, &labeler, &classifier);

        assert_eq!(summary.cluster_id, 3);
        assert_eq!(summary.member_count, 40);
        assert_eq!(summary.sample_item_ids.len(), 5);
        assert_eq!(summary.topic_label, TopicLabel::Summary("5 texts".into()));
        // 3 positive vs 1 negative: ratio 3 > 2
        assert_eq!(summary.aggregated_tone, Tone::Positive);
    }

    #[test]
    fn test_records_attributed_by_item_id() {
        let labeler = KeywordLabeler::default();
        let classifier = by_keyword();
        let items = sample(&["bad one", "good one", "neutral one"]);
        let summary = aggregate(0, 3, &items, &labeler, &classifier);
        let ids: Vec<ItemId> = summary.sentiment_records.iter().map(|r| r.item_id).collect();
        assert_eq!(ids, summary.sample_item_ids);
        assert_eq!(summary.sentiment_records[0].label, Sentiment::Negative);
        assert_eq!(summary.sentiment_records[1].label, Sentiment::Positive);
        assert_eq!(summary.sentiment_records[2].label, Sentiment::Neutral);
    }

    #[test]
    fn test_classifier_failure_records_unknown() {
        let labeler = KeywordLabeler::default();
        let classifier = by_keyword();
        let items = sample(&["good", "fail here", "bad"]);
        let summary = aggregate(1, 3, &items, &labeler, &classifier);
        let failed = &summary.sentiment_records[1];
        assert_eq!(failed.label, Sentiment::Unknown);
        assert_eq!(failed.score, 0.0);
        // 1 positive, 1 negative: ratio 1 is neutral
        assert_eq!(summary.aggregated_tone, Tone::Neutral);
    }

    #[test]
    fn test_non_finite_score_records_unknown() {
        let labeler = KeywordLabeler::default();
        let classifier = classifier_from_fn(|_: &str| Ok(SentimentScore::new(Sentiment::Positive, f64::NAN)));
        let items = sample(&["anything"]);
        let summary = aggregate(0, 1, &items, &labeler, &classifier);
        assert_eq!(summary.sentiment_records[0].label, Sentiment::Unknown);
        assert_eq!(summary.aggregated_tone, Tone::Neutral);
    }

    #[test]
    fn test_labeler_failure_is_unlabeled() {
        let labeler = labeler_from_fn(|_: &[&str]| -> anyhow::Result<TopicLabel> { anyhow::bail!("timeout") });
        let classifier = by_keyword();
        let items = sample(&["good"]);
        let summary = aggregate(2, 1, &items, &labeler, &classifier);
        assert_eq!(summary.topic_label, TopicLabel::Unlabeled);
        assert_eq!(summary.aggregated_tone, Tone::Positive);
    }

    #[test]
    fn test_labeler_called_once_per_cluster() {
        let calls = AtomicUsize::new(0);
        let labeler = labeler_from_fn(|texts: &[&str]| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(TopicLabel::Keywords(texts.iter().map(|t| t.to_string()).collect()))
        });
        let classifier = by_keyword();
        let items = sample(&["a", "b", "c"]);
        let summary = aggregate(0, 3, &items, &labeler, &classifier);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.topic_label.headline(2), "a, b");
    }

    #[test]
    fn test_topic_label_headline() {
        let label = TopicLabel::Keywords(vec!["rust".into(), "async".into(), "tokio".into(), "io".into()]);
        assert_eq!(label.headline(3), "rust, async, tokio");
        assert_eq!(label.to_string(), "rust, async, tokio, io");
        assert_eq!(TopicLabel::Summary("Build times".into()).headline(1), "Build times");
        assert_eq!(TopicLabel::Unlabeled.headline(3), "");
        assert!(!TopicLabel::Unlabeled.is_labeled());
    }

    #[test]
    fn test_sentiment_parse_and_serialize() {
        assert_eq!("positive".parse::<Sentiment>().unwrap(), Sentiment::Positive);
        assert_eq!(" NEGATIVE ".parse::<Sentiment>().unwrap(), Sentiment::Negative);
        assert!("LABEL_1".parse::<Sentiment>().is_err());
        assert_eq!(serde_json::to_string(&Sentiment::Unknown).unwrap(), "\"UNKNOWN\"");
    }
}
