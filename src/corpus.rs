//! Text items and corpus statistics.
//!
//! A [`TextItem`] pairs a text with its embedding. The embedding is validated
//! and L2-normalized once, at construction, so later stages can rely on unit
//! vectors without re-checking.
//!
//! [`CorpusStats`] summarizes token counts over the whole item set and is the
//! only input the parameter scaler sees.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a text item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ItemId {
    fn from(id: u64) -> Self {
        ItemId(id)
    }
}

/// A text with its unit-norm embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    id: ItemId,
    text: String,
    embedding: Vec<f32>,
}

impl TextItem {
    /// Create an item, normalizing `embedding` to unit L2 norm.
    ///
    /// # Errors
    ///
    /// Fails if the embedding is empty, contains NaN/infinity, or has zero norm.
    pub fn new(id: impl Into<ItemId>, text: impl Into<String>, embedding: Vec<f32>) -> Result<Self> {
        let id = id.into();
        if embedding.is_empty() {
            return Err(Error::EmptyInput);
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(Error::invalid("embedding", format!("non-finite value in item {id}")));
        }
        let norm = embedding
            .iter()
            .map(|&v| f64::from(v) * f64::from(v))
            .sum::<f64>()
            .sqrt();
        if norm == 0.0 {
            return Err(Error::invalid("embedding", "zero-norm vector"));
        }
        let embedding = embedding
            .into_iter()
            .map(|v| (f64::from(v) / norm) as f32)
            .collect();
        Ok(Self {
            id,
            text: text.into(),
            embedding,
        })
    }

    /// Item identifier.
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Raw text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Unit-norm embedding.
    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    /// Embedding width.
    pub fn dim(&self) -> usize {
        self.embedding.len()
    }
}

/// Counts tokens in a text (an external tokenizer in production).
pub trait TokenCounter: Send + Sync {
    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> usize;
}

/// Counts whitespace-separated words.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenCounter;

impl TokenCounter for WhitespaceTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Token statistics over a corpus.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CorpusStats {
    /// Number of texts.
    pub num_texts: usize,
    /// Sum of token counts.
    pub total_tokens: usize,
    /// Mean tokens per text, rounded to two decimals; 0 for an empty corpus.
    pub avg_tokens: f64,
}

impl CorpusStats {
    /// Build stats from explicit values.
    pub fn new(num_texts: usize, total_tokens: usize, avg_tokens: f64) -> Self {
        Self {
            num_texts,
            total_tokens,
            avg_tokens,
        }
    }

    /// Count tokens over `texts`.
    pub fn from_texts<'a, I, C>(texts: I, counter: &C) -> Self
    where
        I: IntoIterator<Item = &'a str>,
        C: TokenCounter + ?Sized,
    {
        let (num_texts, total_tokens) = texts
            .into_iter()
            .fold((0usize, 0usize), |(n, total), text| (n + 1, total + counter.count(text)));
        let avg_tokens = if num_texts == 0 {
            0.0
        } else {
            (total_tokens as f64 / num_texts as f64 * 100.0).round() / 100.0
        };
        Self {
            num_texts,
            total_tokens,
            avg_tokens,
        }
    }

    /// Count tokens over the texts of `items`.
    pub fn from_items<C: TokenCounter + ?Sized>(items: &[TextItem], counter: &C) -> Self {
        Self::from_texts(items.iter().map(TextItem::text), counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_item_normalizes() {
        let item = TextItem::new(1, "hello", vec![3.0, 4.0]).unwrap();
        assert!((item.embedding()[0] - 0.6).abs() < 1e-6);
        assert!((item.embedding()[1] - 0.8).abs() < 1e-6);
        assert_eq!(item.dim(), 2);
    }

    #[test]
    fn test_text_item_rejects_bad_embeddings() {
        assert!(TextItem::new(1, "a", vec![]).is_err());
        assert!(TextItem::new(1, "a", vec![0.0, 0.0]).is_err());
        assert!(TextItem::new(1, "a", vec![f32::INFINITY, 0.0]).is_err());
    }

    #[test]
    fn test_stats_from_texts() {
        let texts = ["one two three", "four five", "six"];
        let stats = CorpusStats::from_texts(texts.iter().copied(), &WhitespaceTokenCounter);
        assert_eq!(stats.num_texts, 3);
        assert_eq!(stats.total_tokens, 6);
        assert!((stats.avg_tokens - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_stats_rounds_average() {
        let texts = ["a b", "a", "a"];
        let stats = CorpusStats::from_texts(texts.iter().copied(), &WhitespaceTokenCounter);
        assert!((stats.avg_tokens - 1.33).abs() < 1e-12);
    }

    #[test]
    fn test_stats_empty_corpus() {
        let stats = CorpusStats::from_texts(std::iter::empty(), &WhitespaceTokenCounter);
        assert_eq!(stats, CorpusStats::default());
    }
}
