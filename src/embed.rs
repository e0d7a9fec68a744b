//! Embedding provider boundary.
//!
//! Embedding generation is external; this module only fixes the contract and
//! the token-budget batching a caller uses to stay under a provider's request
//! limit.

use crate::corpus::TokenCounter;

/// Default per-request token budget.
pub const DEFAULT_BATCH_TOKENS: usize = 8000;

/// Produces one vector per input text, in input order.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts.
    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Split `texts` into consecutive batches whose token sum stays within
/// `max_tokens`.
///
/// A single text over budget gets a batch of its own rather than being
/// dropped.
pub fn batch_by_tokens<'a, C>(texts: &'a [String], counter: &C, max_tokens: usize) -> Vec<&'a [String]>
where
    C: TokenCounter + ?Sized,
{
    let mut batches = Vec::new();
    let mut start = 0;
    let mut budget = 0;
    for (i, text) in texts.iter().enumerate() {
        let tokens = counter.count(text);
        if i > start && budget + tokens > max_tokens {
            batches.push(&texts[start..i]);
            start = i;
            budget = 0;
        }
        budget += tokens;
    }
    if start < texts.len() {
        batches.push(&texts[start..]);
    }
    batches
}

/// Embed `texts` batch by batch, concatenating results in input order.
///
/// # Errors
///
/// Propagates the first provider error, and fails if a batch returns a
/// different number of vectors than texts sent.
pub fn embed_in_batches<P, C>(
    provider: &P,
    texts: &[String],
    counter: &C,
    max_tokens: usize,
) -> anyhow::Result<Vec<Vec<f32>>>
where
    P: EmbeddingProvider + ?Sized,
    C: TokenCounter + ?Sized,
{
    let mut out = Vec::with_capacity(texts.len());
    for batch in batch_by_tokens(texts, counter, max_tokens) {
        let vectors = provider.embed(batch)?;
        anyhow::ensure!(
            vectors.len() == batch.len(),
            "provider returned {} vectors for {} texts",
            vectors.len(),
            batch.len()
        );
        out.extend(vectors);
    }
    tracing::debug!(n_texts = texts.len(), "embedded corpus");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::WhitespaceTokenCounter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    impl EmbeddingProvider for CountingProvider {
        fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    struct ShortProvider;

    impl EmbeddingProvider for ShortProvider {
        fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0]])
        }
    }

    fn texts() -> Vec<String> {
        ["a b c", "d e", "f", "g h i j", "k"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_batches_respect_budget() {
        let texts = texts();
        let batches = batch_by_tokens(&texts, &WhitespaceTokenCounter, 5);
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(batches.iter().map(|b| b.len()).sum::<usize>(), texts.len());
    }

    #[test]
    fn test_oversized_text_gets_own_batch() {
        let texts = vec!["a b c d e f".to_string(), "g".to_string()];
        let batches = batch_by_tokens(&texts, &WhitespaceTokenCounter, 3);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 1);
    }

    #[test]
    fn test_embed_in_batches_preserves_order() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
        };
        let texts = texts();
        let vectors = embed_in_batches(&provider, &texts, &WhitespaceTokenCounter, 5).unwrap();
        assert_eq!(vectors.len(), texts.len());
        for (t, v) in texts.iter().zip(&vectors) {
            assert_eq!(v[0], t.len() as f32);
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_embed_in_batches_rejects_short_response() {
        let texts = texts();
        let result = embed_in_batches(&ShortProvider, &texts, &WhitespaceTokenCounter, 100);
        assert!(result.is_err());
    }
}
