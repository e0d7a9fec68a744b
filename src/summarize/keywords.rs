//! Built-in keyword labeler.
//!
//! A model-free stand-in for keyphrase extraction. Sampled texts are joined
//! into one document and scored with RAKE (`keyword_extraction`), with the
//! English stop words of the `stop_words` crate as phrase delimiters.
//! Keyphrases of up to three words rank first, then single keywords fill
//! the remaining slots.

use super::{TopicLabel, TopicLabeler};
use keyword_extraction::rake::{Rake, RakeParams};
use stop_words::{get, LANGUAGE};

/// Default number of keywords per cluster.
pub const DEFAULT_TOP_KEYWORDS: usize = 10;

/// Longest keyphrase kept, in words.
pub const DEFAULT_MAX_PHRASE_WORDS: usize = 3;

/// Ranks keyphrases and keywords over a cluster sample.
#[derive(Debug, Clone)]
pub struct KeywordLabeler {
    top_keywords: usize,
    max_phrase_words: usize,
    min_term_len: usize,
    stop_words: Vec<String>,
}

impl Default for KeywordLabeler {
    fn default() -> Self {
        Self {
            top_keywords: DEFAULT_TOP_KEYWORDS,
            max_phrase_words: DEFAULT_MAX_PHRASE_WORDS,
            min_term_len: 2,
            stop_words: get(LANGUAGE::English),
        }
    }
}

impl KeywordLabeler {
    /// Create a labeler returning at most `top_keywords` entries.
    pub fn new(top_keywords: usize) -> Self {
        Self {
            top_keywords,
            ..Default::default()
        }
    }

    /// Keep keyphrases of at most `words` words.
    pub fn with_max_phrase_words(mut self, words: usize) -> Self {
        self.max_phrase_words = words.max(1);
        self
    }

    /// Ignore terms shorter than `len` characters.
    pub fn with_min_term_len(mut self, len: usize) -> Self {
        self.min_term_len = len;
        self
    }

    fn keep(&self, candidate: &str) -> bool {
        let words: Vec<&str> = candidate.split_whitespace().collect();
        !words.is_empty()
            && words.len() <= self.max_phrase_words
            && words.iter().all(|w| {
                w.chars().count() >= self.min_term_len && !w.chars().all(|c| c.is_numeric())
            })
    }

    /// Ranked keyphrases and keywords over `texts`.
    pub fn extract(&self, texts: &[&str]) -> Vec<String> {
        // Sentence breaks keep phrases from spanning two texts.
        let document = texts
            .iter()
            .map(|t| t.trim().to_lowercase())
            .collect::<Vec<_>>()
            .join(". ");
        let pool = document.split_whitespace().count();
        if pool == 0 {
            return Vec::new();
        }
        let rake = Rake::new(RakeParams::WithDefaults(document.as_str(), &self.stop_words));

        let mut phrases = rake.get_ranked_phrases_scores(pool);
        let mut words = rake.get_ranked_keyword_scores(pool);
        // RAKE ties come back in hash order.
        for ranked in [&mut phrases, &mut words] {
            ranked.sort_by(|(ta, a), (tb, b)| b.total_cmp(a).then_with(|| ta.cmp(tb)));
        }

        let mut keywords: Vec<String> = Vec::with_capacity(self.top_keywords);
        for (candidate, _) in phrases.into_iter().chain(words) {
            if keywords.len() == self.top_keywords {
                break;
            }
            if self.keep(&candidate) && !keywords.contains(&candidate) {
                keywords.push(candidate);
            }
        }
        keywords
    }
}

impl TopicLabeler for KeywordLabeler {
    fn label(&self, texts: &[&str]) -> anyhow::Result<TopicLabel> {
        let keywords = self.extract(texts);
        anyhow::ensure!(!keywords.is_empty(), "no keywords in {} texts", texts.len());
        Ok(TopicLabel::Keywords(keywords))
    }
}
