//! Gleaner retry: retry a side-effecting fetch and resume lazy sequences
//! after transient failures without losing or duplicating items.
mod replay;
mod resume;
mod retry;
mod types;

pub use replay::{by_serialized, replay, ReplayError};
pub use resume::ResumableIter;
pub use retry::{Retry, RetrySettings};
pub use types::RetryError;
