use serde::{Deserialize, Serialize};

/// A domain object built by an item element.
pub trait Object {
    /// Identifier used to deduplicate objects inside one collection.
    /// Objects returning `None` (or an empty id) are never deduplicated.
    fn id(&self) -> Option<String> {
        None
    }
}

/// Parse-only elements build nothing.
impl Object for () {}

/// State of an optional field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Fetched<T> {
    #[default]
    NotLoaded,
    Loaded(T),
    /// The rule failed; the field is known to be unavailable.
    FetchError,
}

impl<T> Fetched<T> {
    pub fn loaded(&self) -> Option<&T> {
        match self {
            Fetched::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_fetch_error(&self) -> bool {
        matches!(self, Fetched::FetchError)
    }
}
