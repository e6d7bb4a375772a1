//! Path walking over JSON fragments, used by dict collections and the
//! `Dict` filter.

use serde_json::Value;

use crate::FieldError;

/// Segment that expands every current fragment into its children.
pub const WILDCARD: &str = "*";

/// A `/`-delimited key path such as `data/items/*/value`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    pub fn parse(path: &str) -> Self {
        if path.is_empty() {
            return Self::default();
        }
        Self {
            segments: path.split('/').map(str::to_string).collect(),
        }
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments.iter().any(|s| s == WILDCARD)
    }
}

impl From<&str> for Path {
    fn from(path: &str) -> Self {
        Path::parse(path)
    }
}

impl From<Vec<&str>> for Path {
    fn from(segments: Vec<&str>) -> Self {
        Path::from_segments(segments)
    }
}

/// Walk `path` from `start`. Keys and indices must exist, and wildcards
/// only expand arrays and objects.
pub(crate) fn walk<'a>(start: &'a Value, path: &Path) -> Result<Vec<&'a Value>, FieldError> {
    let mut bases = vec![start];
    for segment in path.segments() {
        bases = if segment == WILDCARD {
            bases
                .into_iter()
                .map(fan_out)
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .flatten()
                .collect()
        } else {
            bases
                .into_iter()
                .map(|base| step(base, segment))
                .collect::<Result<_, _>>()?
        };
    }
    Ok(bases)
}

/// Rows of a dict collection: the walked fragments, each expanded into its
/// elements (sequences) or values (mappings).
pub(crate) fn candidates<'a>(start: &'a Value, path: &Path) -> Result<Vec<&'a Value>, FieldError> {
    Ok(walk(start, path)?.into_iter().flat_map(children).collect())
}

fn children(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        scalar => vec![scalar],
    }
}

/// Wildcard expansion; only containers have children.
fn fan_out(value: &Value) -> Result<Vec<&Value>, FieldError> {
    match value {
        Value::Array(_) | Value::Object(_) => Ok(children(value)),
        _ => Err(FieldError::WrongNodeKind {
            expected: "array or object",
        }),
    }
}

fn step<'a>(base: &'a Value, segment: &str) -> Result<&'a Value, FieldError> {
    let found = match base {
        Value::Array(items) => segment.parse::<isize>().ok().and_then(|index| {
            let index = if index < 0 {
                items.len().checked_sub(index.unsigned_abs())?
            } else {
                index as usize
            };
            items.get(index)
        }),
        Value::Object(map) => map.get(segment),
        _ => None,
    };
    found.ok_or_else(|| FieldError::KeyNotFound(segment.to_string()))
}
