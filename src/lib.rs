//! # narrative-map
//!
//! Turn a large pile of short texts (comments, posts, reviews) into a handful of labeled themes,
//! each with a topic description and an aggregate tone.
//!
//! ```text
//! corpus stats ─► scale ─► hyperparameters
//! embeddings ─► PCA ─► UMAP ─► HDBSCAN ─► clusters ─► sample ─► label + sentiment ─► views
//! ```
//!
//! Embedding, topic labeling and sentiment classification are collaborators supplied by the
//! caller ([`embed::EmbeddingProvider`], [`summarize::TopicLabeler`],
//! [`summarize::SentimentClassifier`]); this crate owns the numerics in between.
//!
//! With the default `parallel` feature, the distance matrix, the neighbor search and the
//! per-item sentiment calls run on rayon.

pub mod assemble;
pub mod cluster;
pub mod config;
pub mod corpus;
pub mod distance;
pub mod embed;
/// Error types used across `narrative-map`.
pub mod error;
pub mod pipeline;
pub mod reduce;
pub mod sample;
pub mod scale;
pub mod summarize;


pub use assemble::{ClusterRow, ItemRow, NarrativeReport, ReportCluster, SummaryAssembler};
pub use cluster::{cluster, Clustering, Hdbscan, NOISE};
pub use config::PipelineConfig;
pub use corpus::{CorpusStats, ItemId, TextItem, TokenCounter, WhitespaceTokenCounter};
pub use embed::{embed_in_batches, EmbeddingProvider};
pub use error::{Error, Result};
pub use pipeline::{ClusterAssignment, NarrativeMap, NarrativePipeline};
pub use reduce::{reduce, Init, ReduceOptions};
pub use sample::{sample, ClusterSampler};
pub use scale::{scale, ClusteringMode, ClusteringProfile, Hyperparameters};
pub use summarize::{
    aggregate, classifier_from_fn, labeler_from_fn, ClusterAggregator, ClusterSummary,
    KeywordLabeler, Sentiment, SentimentClassifier, SentimentRecord, SentimentScore, Tone,
    TopicLabel, TopicLabeler,
};
