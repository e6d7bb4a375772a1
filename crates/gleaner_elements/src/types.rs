use serde_json::Value;
use thiserror::Error;

use crate::decode::DecodeError;

/// Failure of a single rule: a filter, a method, a loader or a condition.
#[derive(Debug, Error)]
pub enum FieldError {
    /// Abandon the current item; siblings are unaffected.
    #[error("item skipped: {0}")]
    Skip(String),
    #[error("no node matched `{0}`")]
    NodeNotFound(String),
    #[error("attribute `{0}` not found")]
    AttributeNotFound(String),
    #[error("key `{0}` not found")]
    KeyNotFound(String),
    #[error("column `{0}` not found")]
    ColumnNotFound(String),
    #[error("environment has no `{0}`")]
    EnvNotFound(String),
    #[error("field `{0}` is not resolved yet")]
    FieldNotResolved(String),
    #[error("`{pattern}` did not match {text:?}")]
    NoMatch { pattern: String, text: String },
    #[error("invalid selector `{selector}`: {message}")]
    InvalidSelector { selector: String, message: String },
    #[error("invalid pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("cannot parse {text:?} as {expected}")]
    Parse { text: String, expected: &'static str },
    #[error("expected a {expected} node")]
    WrongNodeKind { expected: &'static str },
    #[error("cannot convert value: {0}")]
    Convert(#[from] serde_json::Error),
    #[error(transparent)]
    Element(Box<ElementError>),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FieldError {
    pub fn skip(reason: impl Into<String>) -> Self {
        FieldError::Skip(reason.into())
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, FieldError::Skip(_))
    }

    /// Structural lookups that found nothing. A pagination rule failing this
    /// way means "no next page".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FieldError::NodeNotFound(_)
                | FieldError::AttributeNotFound(_)
                | FieldError::KeyNotFound(_)
        )
    }

    /// Failures a filter default may absorb.
    pub fn is_lookup_failure(&self) -> bool {
        self.is_not_found()
            || matches!(
                self,
                FieldError::ColumnNotFound(_)
                    | FieldError::EnvNotFound(_)
                    | FieldError::NoMatch { .. }
            )
    }
}

impl From<ElementError> for FieldError {
    fn from(err: ElementError) -> Self {
        FieldError::Element(Box::new(err))
    }
}

/// Hard failure of an element. Aborts the enclosing collection.
#[derive(Debug, Error)]
pub enum ElementError {
    #[error("{element}: field `{field}` failed: {source}")]
    Field {
        element: String,
        field: String,
        #[source]
        source: FieldError,
    },
    #[error("{element}: loader `{loader}` failed: {source}")]
    Loader {
        element: String,
        loader: String,
        #[source]
        source: FieldError,
    },
    #[error("{element}: parse hook failed: {source}")]
    Parse {
        element: String,
        #[source]
        source: FieldError,
    },
    #[error("{element}: condition failed: {source}")]
    Condition {
        element: String,
        #[source]
        source: FieldError,
    },
    #[error("{element}: cannot enumerate candidates: {source}")]
    Candidates {
        element: String,
        #[source]
        source: FieldError,
    },
    #[error("{element}: next page rule failed: {source}")]
    NextPage {
        element: String,
        #[source]
        source: FieldError,
    },
    /// Returned data from the page is incoherent.
    #[error("{element}: there are two objects with the same id {id}")]
    DuplicateId { element: String, id: String },
}

#[derive(Debug, Error)]
pub enum PageError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("invalid json document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid page url: {0}")]
    Url(#[from] url::ParseError),
}

/// Outcome of the forward-pagination check run after a collection drained.
#[derive(Debug, Clone, PartialEq)]
pub enum Pagination {
    /// Scraping continues on the page designated by this value.
    Continue(Value),
    Done,
}

impl Pagination {
    pub fn next_page(&self) -> Option<&Value> {
        match self {
            Pagination::Continue(value) => Some(value),
            Pagination::Done => None,
        }
    }
}
