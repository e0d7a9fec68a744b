//! Aggregate tone of a cluster.
//!
//! Only polar records count. With `pos` positive and `neg` negative records:
//!
//! | condition | tone |
//! |-----------|------|
//! | `pos = neg = 0` | NEUTRAL |
//! | `neg = 0`, `pos > 0` | POSITIVE |
//! | `pos / neg > 2` | POSITIVE |
//! | `pos / neg < 0.5` | NEGATIVE |
//! | otherwise | NEUTRAL |

use super::{Sentiment, SentimentRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ratio above which a cluster reads as positive.
pub const POSITIVE_RATIO: f64 = 2.0;
/// Ratio below which a cluster reads as negative.
pub const NEGATIVE_RATIO: f64 = 0.5;

/// Cluster-level sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tone {
    /// Mostly positive.
    Positive,
    /// Mostly negative.
    Negative,
    /// Balanced, or nothing polar.
    Neutral,
}

impl Tone {
    /// Tone from polar counts.
    pub fn from_counts(pos: usize, neg: usize) -> Self {
        if neg == 0 {
            return if pos == 0 { Tone::Neutral } else { Tone::Positive };
        }
        let ratio = pos as f64 / neg as f64;
        if ratio > POSITIVE_RATIO {
            Tone::Positive
        } else if ratio < NEGATIVE_RATIO {
            Tone::Negative
        } else {
            Tone::Neutral
        }
    }

    /// Tone of a set of records; NEUTRAL and UNKNOWN records are ignored.
    pub fn from_records(records: &[SentimentRecord]) -> Self {
        let (pos, neg) = records.iter().fold((0, 0), |(pos, neg), r| match r.label {
            Sentiment::Positive => (pos + 1, neg),
            Sentiment::Negative => (pos, neg + 1),
            Sentiment::Neutral | Sentiment::Unknown => (pos, neg),
        });
        Self::from_counts(pos, neg)
    }

    /// Upper-case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Positive => "POSITIVE",
            Tone::Negative => "NEGATIVE",
            Tone::Neutral => "NEUTRAL",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
