use std::fmt::Debug;

use serde::Serialize;

use crate::RetryError;

/// Why a restarted sequence could not be caught up.
#[derive(Debug)]
pub enum ReplayError<E> {
    /// A retryable failure interrupted the replay; the caller may restart.
    Interrupted(E),
    Fewer { replayed: usize, expected: usize },
    Inconsistent {
        index: usize,
        expected: String,
        found: String,
    },
    Source(E),
}

impl<E> ReplayError<E> {
    /// The hard failure this replay error stands for, or the retryable
    /// error back when the replay was merely interrupted.
    pub fn into_retry_error(self) -> Result<RetryError<E>, E> {
        match self {
            ReplayError::Interrupted(err) => Err(err),
            ReplayError::Fewer { replayed, expected } => Ok(RetryError::Fewer { replayed, expected }),
            ReplayError::Inconsistent {
                index,
                expected,
                found,
            } => Ok(RetryError::Inconsistent {
                index,
                expected,
                found,
            }),
            ReplayError::Source(err) => Ok(RetryError::Source(err)),
        }
    }
}

/// Pull one item from `fresh` per already delivered item and compare them
/// pairwise with `same`. On success `fresh` is positioned right after the
/// delivered prefix.
pub fn replay<T, E, I, C, R>(
    fresh: &mut I,
    delivered: &[T],
    same: C,
    retryable: R,
) -> Result<(), ReplayError<E>>
where
    T: Debug,
    I: Iterator<Item = Result<T, E>>,
    C: Fn(&T, &T) -> bool,
    R: Fn(&E) -> bool,
{
    for (index, sent) in delivered.iter().enumerate() {
        match fresh.next() {
            Some(Ok(new)) if same(sent, &new) => {}
            Some(Ok(new)) => {
                return Err(ReplayError::Inconsistent {
                    index,
                    expected: format!("{sent:?}"),
                    found: format!("{new:?}"),
                })
            }
            Some(Err(err)) if retryable(&err) => return Err(ReplayError::Interrupted(err)),
            Some(Err(err)) => return Err(ReplayError::Source(err)),
            None => {
                return Err(ReplayError::Fewer {
                    replayed: index,
                    expected: delivered.len(),
                })
            }
        }
    }
    Ok(())
}

/// Equality of the serialised forms, for objects compared by their fields.
pub fn by_serialized<T: Serialize>(a: &T, b: &T) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
