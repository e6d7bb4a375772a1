use std::fmt::{Debug, Display};
use std::sync::Arc;

use gleaner_logging::{glean_debug, glean_warn};

use crate::{ResumableIter, RetryError};

#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Attempts per outer call, and restarts per resumed sequence.
    pub tries: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { tries: 4 }
    }
}

pub(crate) type Retryable<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Retries a fetch callable on the errors `retryable` accepts.
///
/// The callable must be safe to invoke again from scratch: sequences are
/// resumed by calling it anew and replaying what was already delivered.
pub struct Retry<E> {
    tries: u32,
    retryable: Retryable<E>,
}

impl<E> Clone for Retry<E> {
    fn clone(&self) -> Self {
        Self {
            tries: self.tries,
            retryable: Arc::clone(&self.retryable),
        }
    }
}

impl<E: Display> Retry<E> {
    pub fn new(settings: &RetrySettings, retryable: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        Self {
            tries: settings.tries,
            retryable: Arc::new(retryable),
        }
    }

    pub fn tries(&self) -> u32 {
        self.tries
    }

    /// Call `fetch` until it succeeds, fails with a non-retryable error or
    /// the budget is spent.
    pub fn call<T, F>(&self, mut fetch: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
    {
        self.attempt(&mut fetch).map(|(value, _)| value)
    }

    /// Like [`Retry::call`] for a callable returning a fallible sequence.
    /// Items are compared with `==` when a restarted sequence is replayed.
    pub fn iter<T, I, F>(
        &self,
        fetch: F,
    ) -> Result<ResumableIter<T, E, I, F, fn(&T, &T) -> bool>, RetryError<E>>
    where
        T: Clone + Debug + PartialEq,
        I: Iterator<Item = Result<T, E>>,
        F: FnMut() -> Result<I, E>,
    {
        self.iter_with(fetch, T::eq as fn(&T, &T) -> bool)
    }

    /// Like [`Retry::iter`] with a custom item comparison, such as
    /// [`crate::by_serialized`].
    pub fn iter_with<T, I, F, C>(
        &self,
        mut fetch: F,
        same: C,
    ) -> Result<ResumableIter<T, E, I, F, C>, RetryError<E>>
    where
        T: Clone + Debug,
        I: Iterator<Item = Result<T, E>>,
        F: FnMut() -> Result<I, E>,
        C: Fn(&T, &T) -> bool,
    {
        let (first, remaining) = self.attempt(&mut fetch)?;
        Ok(ResumableIter::new(
            fetch,
            first,
            remaining,
            self.tries,
            Arc::clone(&self.retryable),
            same,
        ))
    }

    /// Returns the value and the budget left when it was obtained.
    fn attempt<T, F>(&self, fetch: &mut F) -> Result<(T, u32), RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
    {
        for remaining in (1..=self.tries).rev() {
            match fetch() {
                Ok(value) => return Ok((value, remaining)),
                Err(err) if (self.retryable)(&err) => {
                    glean_debug!("{} raised, retrying", err);
                }
                Err(err) => return Err(RetryError::Source(err)),
            }
        }
        glean_warn!("site did not reply successfully after {} tries", self.tries);
        Err(RetryError::Unavailable { tries: self.tries })
    }
}
