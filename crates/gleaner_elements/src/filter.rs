//! Rules that pull one value out of the current node.
//!
//! Selectors (`Select`) choose nodes; filters (`Filter`) turn nodes or other
//! values into a `serde_json::Value`. The engine only calls `Filter::apply`
//! and never looks inside.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::dict::{self, Path};
use crate::scope::{Css, Node};
use crate::{Context, FieldError};

pub trait Filter: Send + Sync {
    fn apply(&self, cx: &Context<'_>) -> Result<Value, FieldError>;
}

impl<F> Filter for F
where
    F: Fn(&Context<'_>) -> Result<Value, FieldError> + Send + Sync,
{
    fn apply(&self, cx: &Context<'_>) -> Result<Value, FieldError> {
        self(cx)
    }
}

/// Chooses nodes relative to the current one.
pub trait Select: Send + Sync {
    fn select<'a>(&self, cx: &Context<'a>) -> Result<Vec<Node<'a>>, FieldError>;

    /// Human-readable form used in "not found" errors.
    fn describe(&self) -> String;
}

impl Select for Css {
    fn select<'a>(&self, cx: &Context<'a>) -> Result<Vec<Node<'a>>, FieldError> {
        cx.scope().select(self)
    }

    fn describe(&self) -> String {
        self.as_str().to_string()
    }
}

impl Select for Path {
    fn select<'a>(&self, cx: &Context<'a>) -> Result<Vec<Node<'a>>, FieldError> {
        cx.scope().lookup(self)
    }

    fn describe(&self) -> String {
        self.segments().join("/")
    }
}

/// The bound node itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct Here;

impl Select for Here {
    fn select<'a>(&self, cx: &Context<'a>) -> Result<Vec<Node<'a>>, FieldError> {
        Ok(vec![cx.node()])
    }

    fn describe(&self) -> String {
        ".".to_string()
    }
}

fn select_non_empty<'a, S: Select + ?Sized>(
    selector: &S,
    cx: &Context<'a>,
) -> Result<Vec<Node<'a>>, FieldError> {
    let nodes = selector.select(cx)?;
    if nodes.is_empty() {
        return Err(FieldError::NodeNotFound(selector.describe()));
    }
    Ok(nodes)
}

/// Text form of a value, as read by text-level filters.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Visible text of the selected nodes, joined and whitespace-collapsed.
pub struct CleanText<S> {
    selector: S,
}

impl<S: Select> CleanText<S> {
    pub fn new(selector: S) -> Self {
        Self { selector }
    }
}

impl CleanText<Css> {
    pub fn css(selector: &str) -> Self {
        Self::new(Css::new(selector))
    }
}

impl CleanText<Here> {
    pub fn here() -> Self {
        Self::new(Here)
    }
}

impl<S: Select> Filter for CleanText<S> {
    fn apply(&self, cx: &Context<'_>) -> Result<Value, FieldError> {
        let text = select_non_empty(&self.selector, cx)?
            .iter()
            .map(Node::text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(Value::String(text))
    }
}

/// An attribute of the first selected element.
pub struct Attr<S> {
    selector: S,
    name: String,
}

impl<S: Select> Attr<S> {
    pub fn new(selector: S, name: impl Into<String>) -> Self {
        Self {
            selector,
            name: name.into(),
        }
    }
}

impl Attr<Css> {
    pub fn css(selector: &str, name: impl Into<String>) -> Self {
        Self::new(Css::new(selector), name)
    }
}

impl<S: Select> Filter for Attr<S> {
    fn apply(&self, cx: &Context<'_>) -> Result<Value, FieldError> {
        let node = select_non_empty(&self.selector, cx)?[0];
        let element = node.expect_element()?;
        element
            .value()
            .attr(&self.name)
            .map(|value| Value::String(value.trim().to_string()))
            .ok_or_else(|| FieldError::AttributeNotFound(self.name.clone()))
    }
}

/// `href` of the first selected element, made absolute against the page URL.
pub struct Link<S> {
    attr: Attr<S>,
}

impl<S: Select> Link<S> {
    pub fn new(selector: S) -> Self {
        Self {
            attr: Attr::new(selector, "href"),
        }
    }
}

impl Link<Css> {
    pub fn css(selector: &str) -> Self {
        Self::new(Css::new(selector))
    }
}

impl<S: Select> Filter for Link<S> {
    fn apply(&self, cx: &Context<'_>) -> Result<Value, FieldError> {
        let raw = value_text(&self.attr.apply(cx)?);
        let url = cx
            .page()
            .absolute_url(&raw)
            .map(String::from)
            .unwrap_or(raw);
        Ok(Value::String(url))
    }
}

/// Regular-expression extraction over the text of another filter.
///
/// The template uses `$1` / `${name}` syntax; it defaults to the first
/// capture group, or the whole match when the pattern has none.
pub struct Regexp<F> {
    inner: F,
    pattern: String,
    template: Option<String>,
    compiled: OnceLock<Result<Regex, String>>,
}

impl<F: Filter> Regexp<F> {
    pub fn new(inner: F, pattern: impl Into<String>) -> Self {
        Self {
            inner,
            pattern: pattern.into(),
            template: None,
            compiled: OnceLock::new(),
        }
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    fn regex(&self) -> Result<&Regex, FieldError> {
        self.compiled
            .get_or_init(|| Regex::new(&self.pattern).map_err(|err| err.to_string()))
            .as_ref()
            .map_err(|message| FieldError::InvalidPattern {
                pattern: self.pattern.clone(),
                message: message.clone(),
            })
    }
}

impl<F: Filter> Filter for Regexp<F> {
    fn apply(&self, cx: &Context<'_>) -> Result<Value, FieldError> {
        let regex = self.regex()?;
        let text = value_text(&self.inner.apply(cx)?);
        let captures = regex.captures(&text).ok_or_else(|| FieldError::NoMatch {
            pattern: self.pattern.clone(),
            text: text.clone(),
        })?;
        let template = match &self.template {
            Some(template) => template.as_str(),
            None if regex.captures_len() > 1 => "${1}",
            None => "${0}",
        };
        let mut out = String::new();
        captures.expand(template, &mut out);
        Ok(Value::String(out))
    }
}

/// Number formatting conventions understood by [`CleanDecimal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalStyle {
    /// `1 234,56` / `1.234,56`
    French,
    /// `1,234.56`
    English,
}

/// Amount parsing; yields the decimal as a string value to keep precision.
pub struct CleanDecimal<F> {
    inner: F,
    style: DecimalStyle,
}

impl<F: Filter> CleanDecimal<F> {
    pub fn french(inner: F) -> Self {
        Self {
            inner,
            style: DecimalStyle::French,
        }
    }

    pub fn english(inner: F) -> Self {
        Self {
            inner,
            style: DecimalStyle::English,
        }
    }
}

impl<F: Filter> Filter for CleanDecimal<F> {
    fn apply(&self, cx: &Context<'_>) -> Result<Value, FieldError> {
        let text = value_text(&self.inner.apply(cx)?);
        let decimal = parse_decimal(&text, self.style)?;
        Ok(serde_json::to_value(decimal)?)
    }
}

pub(crate) fn parse_decimal(text: &str, style: DecimalStyle) -> Result<Decimal, FieldError> {
    let trimmed = text.trim();
    let negative = trimmed.starts_with('-') || trimmed.ends_with('-');
    let (thousands, radix): (&[char], char) = match style {
        DecimalStyle::French => (&['.', ' ', '\u{a0}', '\u{202f}'], ','),
        DecimalStyle::English => (&[',', ' ', '\u{a0}'], '.'),
    };
    let mut digits = String::new();
    for ch in trimmed.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else if ch == radix {
            digits.push('.');
        } else if thousands.contains(&ch) {
            continue;
        }
    }
    let parsed = Decimal::from_str(&digits).map_err(|_| FieldError::Parse {
        text: text.to_string(),
        expected: "decimal",
    })?;
    Ok(if negative { -parsed } else { parsed })
}

/// Date parsing with `chrono` formats; yields an ISO `YYYY-MM-DD` string.
pub struct Date<F> {
    inner: F,
    formats: Vec<String>,
}

impl<F: Filter> Date<F> {
    /// Day-first formats (`31/12/24`, `31/12/2024`, `31-12-2024`). The
    /// two-digit year comes first: `%Y` would read `24` as year 24.
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            formats: vec!["%d/%m/%y".into(), "%d/%m/%Y".into(), "%d-%m-%Y".into()],
        }
    }

    pub fn formats(mut self, formats: &[&str]) -> Self {
        self.formats = formats.iter().map(|f| f.to_string()).collect();
        self
    }
}

impl<F: Filter> Filter for Date<F> {
    fn apply(&self, cx: &Context<'_>) -> Result<Value, FieldError> {
        let text = value_text(&self.inner.apply(cx)?);
        let trimmed = text.trim();
        self.formats
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
            .map(|date| Value::String(date.format("%Y-%m-%d").to_string()))
            .ok_or(FieldError::Parse {
                text,
                expected: "date",
            })
    }
}

/// Translate the text of another filter through a lookup table.
pub struct MapValue<F> {
    inner: F,
    table: BTreeMap<String, Value>,
}

impl<F: Filter> MapValue<F> {
    pub fn new<K, V>(inner: F, table: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            inner,
            table: table
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl<F: Filter> Filter for MapValue<F> {
    fn apply(&self, cx: &Context<'_>) -> Result<Value, FieldError> {
        let key = value_text(&self.inner.apply(cx)?);
        self.table
            .get(&key)
            .cloned()
            .ok_or(FieldError::KeyNotFound(key))
    }
}

/// A value from the element environment.
pub struct FromEnv(pub String);

impl FromEnv {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl Filter for FromEnv {
    fn apply(&self, cx: &Context<'_>) -> Result<Value, FieldError> {
        cx.env()
            .get(&self.0)
            .cloned()
            .ok_or_else(|| FieldError::EnvNotFound(self.0.clone()))
    }
}

/// A field already assigned on the object being built.
pub struct FieldRef(pub String);

impl FieldRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl Filter for FieldRef {
    fn apply(&self, cx: &Context<'_>) -> Result<Value, FieldError> {
        cx.field(&self.0)
            .cloned()
            .ok_or_else(|| FieldError::FieldNotResolved(self.0.clone()))
    }
}

/// A loader result of the current element.
pub struct LoaderRef(pub String);

impl LoaderRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl Filter for LoaderRef {
    fn apply(&self, cx: &Context<'_>) -> Result<Value, FieldError> {
        cx.loader(&self.0)
            .cloned()
            .ok_or_else(|| FieldError::KeyNotFound(self.0.clone()))
    }
}

/// JSON value at `path` below the bound fragment. Paths containing a
/// wildcard yield an array.
pub struct Dict {
    path: Path,
}

impl Dict {
    pub fn new(path: impl Into<Path>) -> Self {
        Self { path: path.into() }
    }
}

impl Filter for Dict {
    fn apply(&self, cx: &Context<'_>) -> Result<Value, FieldError> {
        let start = cx.node().expect_json()?;
        let found = dict::walk(start, &self.path)?;
        if self.path.has_wildcard() {
            return Ok(Value::Array(found.into_iter().cloned().collect()));
        }
        found
            .into_iter()
            .next()
            .cloned()
            .ok_or_else(|| FieldError::KeyNotFound(self.path.segments().join("/")))
    }
}

/// Falls back to a value when the inner filter's lookup comes up empty.
pub struct WithDefault<F> {
    inner: F,
    default: Value,
}

impl<F: Filter> Filter for WithDefault<F> {
    fn apply(&self, cx: &Context<'_>) -> Result<Value, FieldError> {
        match self.inner.apply(cx) {
            Err(err) if err.is_lookup_failure() => Ok(self.default.clone()),
            other => other,
        }
    }
}

pub struct Mapped<F, M> {
    inner: F,
    map: M,
}

impl<F, M> Filter for Mapped<F, M>
where
    F: Filter,
    M: Fn(Value) -> Result<Value, FieldError> + Send + Sync,
{
    fn apply(&self, cx: &Context<'_>) -> Result<Value, FieldError> {
        (self.map)(self.inner.apply(cx)?)
    }
}

pub trait FilterExt: Filter + Sized {
    fn default(self, value: impl Into<Value>) -> WithDefault<Self> {
        WithDefault {
            inner: self,
            default: value.into(),
        }
    }

    fn map<M>(self, map: M) -> Mapped<Self, M>
    where
        M: Fn(Value) -> Result<Value, FieldError> + Send + Sync,
    {
        Mapped { inner: self, map }
    }
}

impl<F: Filter> FilterExt for F {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn french_amounts_are_normalised() {
        let parsed = parse_decimal("-1 234,56 €", DecimalStyle::French).unwrap();
        assert_eq!(parsed, Decimal::from_str("-1234.56").unwrap());
        let parsed = parse_decimal("1.234,5", DecimalStyle::French).unwrap();
        assert_eq!(parsed, Decimal::from_str("1234.5").unwrap());
    }

    #[test]
    fn english_amounts_are_normalised() {
        let parsed = parse_decimal("$12,345.60", DecimalStyle::English).unwrap();
        assert_eq!(parsed, Decimal::from_str("12345.60").unwrap());
    }

    #[test]
    fn empty_amount_is_a_parse_error() {
        let err = parse_decimal("n/a", DecimalStyle::French).unwrap_err();
        assert!(matches!(err, FieldError::Parse { expected: "decimal", .. }));
    }
}
