use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The retry budget ran out.
    #[error("site did not reply successfully after {tries} tries")]
    Unavailable { tries: u32 },
    #[error("site replied inconsistently between retries at item {index}: {expected} vs {found}")]
    Inconsistent {
        index: usize,
        expected: String,
        found: String,
    },
    #[error("site replied fewer elements ({replayed}) than last iteration ({expected})")]
    Fewer { replayed: usize, expected: usize },
    /// A non-retryable error from the fetch callable, unchanged.
    #[error("{0}")]
    Source(#[source] E),
}

impl<E> RetryError<E> {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RetryError::Unavailable { .. })
    }

    pub fn source_error(&self) -> Option<&E> {
        match self {
            RetryError::Source(err) => Some(err),
            _ => None,
        }
    }
}
