use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

/// Copy-on-write key/value environment handed down the element tree.
///
/// Cloning is cheap; the first write after a clone detaches the copy, so a
/// child can never change what its parent or siblings observe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Env {
    vars: Arc<BTreeMap<String, Value>>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        Arc::make_mut(&mut self.vars).insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        if !self.vars.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut self.vars).remove(key)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Entries of `other` override entries of `self`.
    pub fn overlay(&mut self, other: &Env) {
        for (key, value) in other.iter() {
            self.insert(key.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Env {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let vars = iter
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self {
            vars: Arc::new(vars),
        }
    }
}
