use thiserror::Error;

/// Result alias for `narrative-map`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the clustering pipeline and its stages.
///
/// Collaborator failures (sentiment, topic labeling) never surface here: they
/// are recovered per item or per cluster by the aggregator.
#[derive(Debug, Error)]
pub enum Error {
    /// Input was empty where at least one item is required.
    #[error("empty input provided")]
    EmptyInput,

    /// Vector dimension mismatch.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Neighborhood larger than the corpus.
    #[error("n_neighbors = {n_neighbors} exceeds the {n_items} available items")]
    InsufficientItems {
        /// Requested neighborhood size.
        n_neighbors: usize,
        /// Number of items available.
        n_items: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: String,
    },

    /// A vector contained NaN or infinity.
    #[error("non-finite value in {what} at index {index}")]
    NonFinite {
        /// Which input carried the value.
        what: &'static str,
        /// Row index of the offending vector.
        index: usize,
    },

    /// A dense factorization failed.
    #[error("linear algebra failure: {0}")]
    LinearAlgebra(String),

    /// Configuration could not be loaded or extracted.
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Output serialization failed.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

/// Check that every row has the same width and only finite values.
///
/// Returns the shared width, or `None` for empty input.
pub(crate) fn validate_rows(rows: &[Vec<f32>], what: &'static str) -> Result<Option<usize>> {
    let Some(first) = rows.first() else {
        return Ok(None);
    };
    let dim = first.len();
    for (index, row) in rows.iter().enumerate() {
        if row.len() != dim {
            return Err(Error::DimensionMismatch {
                expected: dim,
                found: row.len(),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonFinite { what, index });
        }
    }
    Ok(Some(dim))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rows_reports_ragged_input() {
        let rows = vec![vec![1.0, 0.0], vec![1.0]];
        let err = validate_rows(&rows, "embeddings").unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn test_validate_rows_rejects_nan() {
        let rows = vec![vec![1.0, 0.0], vec![f32::NAN, 1.0]];
        let err = validate_rows(&rows, "embeddings").unwrap_err();
        assert!(matches!(err, Error::NonFinite { index: 1, .. }));
    }

    #[test]
    fn test_validate_rows_empty_is_none() {
        assert_eq!(validate_rows(&[], "embeddings").unwrap(), None);
    }

    #[test]
    fn test_display_messages() {
        let err = Error::InsufficientItems {
            n_neighbors: 20,
            n_items: 5,
        };
        assert_eq!(
            err.to_string(),
            "n_neighbors = 20 exceeds the 5 available items"
        );
        let err = Error::invalid("cap", "must be at least 1");
        assert_eq!(err.to_string(), "invalid parameter 'cap': must be at least 1");
    }
}
