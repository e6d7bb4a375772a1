use std::fmt::{Debug, Display};

use gleaner_logging::{glean_debug, glean_info, glean_warn};

use crate::replay::replay;
use crate::retry::Retryable;
use crate::RetryError;

/// A sequence that survives retryable failures of its source.
///
/// After a failure the fetch callable is invoked again and the fresh
/// sequence must reproduce every item already delivered, in order, before
/// the next item is returned. Each restart costs one unit of the budget.
pub struct ResumableIter<T, E, I, F, C> {
    fetch: F,
    live: Option<I>,
    delivered: Vec<T>,
    remaining: u32,
    tries: u32,
    retryable: Retryable<E>,
    same: C,
    finished: bool,
}

impl<T, E, I, F, C> ResumableIter<T, E, I, F, C>
where
    T: Clone + Debug,
    E: Display,
    I: Iterator<Item = Result<T, E>>,
    F: FnMut() -> Result<I, E>,
    C: Fn(&T, &T) -> bool,
{
    pub(crate) fn new(
        fetch: F,
        live: I,
        remaining: u32,
        tries: u32,
        retryable: Retryable<E>,
        same: C,
    ) -> Self {
        Self {
            fetch,
            live: Some(live),
            delivered: Vec::new(),
            remaining,
            tries,
            retryable,
            same,
            finished: false,
        }
    }

    /// Items delivered so far.
    pub fn delivered(&self) -> &[T] {
        &self.delivered
    }

    /// Restarts still allowed.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    fn restart_after(&mut self, err: &E) {
        glean_info!("{} raised, retrying", err);
        self.live = None;
        self.remaining = self.remaining.saturating_sub(1);
    }

    fn fail(&mut self, err: RetryError<E>) -> Option<Result<T, RetryError<E>>> {
        self.finished = true;
        Some(Err(err))
    }
}

impl<T, E, I, F, C> Iterator for ResumableIter<T, E, I, F, C>
where
    T: Clone + Debug,
    E: Display,
    I: Iterator<Item = Result<T, E>>,
    F: FnMut() -> Result<I, E>,
    C: Fn(&T, &T) -> bool,
{
    type Item = Result<T, RetryError<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if self.remaining == 0 {
                glean_warn!("site did not reply successfully after {} tries", self.tries);
                return self.fail(RetryError::Unavailable { tries: self.tries });
            }
            let live = match self.live.take() {
                Some(live) => live,
                None => {
                    let mut fresh = match (self.fetch)() {
                        Ok(fresh) => fresh,
                        Err(err) if (self.retryable)(&err) => {
                            self.restart_after(&err);
                            continue;
                        }
                        Err(err) => return self.fail(RetryError::Source(err)),
                    };
                    glean_debug!("sequence restarted, replaying {} items", self.delivered.len());
                    let retryable = &self.retryable;
                    match replay(&mut fresh, &self.delivered, &self.same, |err: &E| retryable(err)) {
                        Ok(()) => fresh,
                        Err(err) => match err.into_retry_error() {
                            Ok(hard) => return self.fail(hard),
                            Err(interrupted) => {
                                self.restart_after(&interrupted);
                                continue;
                            }
                        },
                    }
                }
            };
            let live = self.live.insert(live);
            match live.next() {
                Some(Ok(item)) => {
                    self.delivered.push(item.clone());
                    return Some(Ok(item));
                }
                Some(Err(err)) if (self.retryable)(&err) => self.restart_after(&err),
                Some(Err(err)) => return self.fail(RetryError::Source(err)),
                None => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }
}
