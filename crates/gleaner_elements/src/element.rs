use gleaner_logging::glean_debug;
use serde_json::Value;

use crate::filter::Filter;
use crate::scope::Css;
use crate::{Context, ElementError, FieldError};

/// A rule evaluated against an element context: loaders and next-page links.
pub enum Rule {
    Constant(Value),
    Filter(Box<dyn Filter>),
}

impl Rule {
    pub fn constant(value: impl Into<Value>) -> Self {
        Rule::Constant(value.into())
    }

    pub fn filter(filter: impl Filter + 'static) -> Self {
        Rule::Filter(Box::new(filter))
    }

    pub(crate) fn evaluate(&self, cx: &Context<'_>) -> Result<Value, FieldError> {
        match self {
            Rule::Constant(value) => Ok(value.clone()),
            Rule::Filter(filter) => filter.apply(cx),
        }
    }
}

/// Whether an element proceeds at all.
#[derive(Default)]
pub enum Condition {
    #[default]
    Always,
    Never,
    /// Proceeds iff the filter's value is truthy.
    Filter(Box<dyn Filter>),
    Predicate(Box<dyn Fn(&Context<'_>) -> bool + Send + Sync>),
    /// Proceeds iff the selector matches below the bound node.
    Matches(Css),
}

impl Condition {
    pub fn filter(filter: impl Filter + 'static) -> Self {
        Condition::Filter(Box::new(filter))
    }

    pub fn predicate(predicate: impl Fn(&Context<'_>) -> bool + Send + Sync + 'static) -> Self {
        Condition::Predicate(Box::new(predicate))
    }

    pub fn matches(css: impl Into<Css>) -> Self {
        Condition::Matches(css.into())
    }

    pub(crate) fn check(&self, cx: &Context<'_>) -> Result<bool, FieldError> {
        match self {
            Condition::Always => Ok(true),
            Condition::Never => Ok(false),
            Condition::Filter(filter) => Ok(truthy(&filter.apply(cx)?)),
            Condition::Predicate(predicate) => Ok(predicate(cx)),
            Condition::Matches(css) => Ok(!cx.scope().select(css)?.is_empty()),
        }
    }
}

impl From<bool> for Condition {
    fn from(proceed: bool) -> Self {
        if proceed {
            Condition::Always
        } else {
            Condition::Never
        }
    }
}

/// Truthiness of a rule result.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

pub(crate) type ParseHook = Box<dyn Fn(&mut Context<'_>) -> Result<(), FieldError> + Send + Sync>;

/// Parts shared by item and collection elements.
pub(crate) struct ElementBase {
    pub(crate) name: String,
    pub(crate) condition: Condition,
    pub(crate) loaders: Vec<(String, Rule)>,
    pub(crate) parse: Option<ParseHook>,
}

impl ElementBase {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: Condition::Always,
            loaders: Vec::new(),
            parse: None,
        }
    }

    pub(crate) fn check_condition(&self, cx: &Context<'_>) -> Result<bool, ElementError> {
        self.condition
            .check(cx)
            .map_err(|source| ElementError::Condition {
                element: self.name.clone(),
                source,
            })
    }

    /// Evaluates every loader once per instance. `Ok(false)` means a loader
    /// asked to skip the item.
    pub(crate) fn handle_loaders(&self, cx: &mut Context<'_>) -> Result<bool, ElementError> {
        if cx.loaders_resolved() {
            return Ok(true);
        }
        for (name, rule) in &self.loaders {
            match rule.evaluate(cx) {
                Ok(value) => cx.store_loader(name, value),
                Err(err) if err.is_skip() => {
                    glean_debug!("{}: loader {} raises {}", self.name, name, err);
                    return Ok(false);
                }
                Err(source) => {
                    return Err(ElementError::Loader {
                        element: self.name.clone(),
                        loader: name.clone(),
                        source,
                    })
                }
            }
        }
        cx.mark_loaders_resolved();
        Ok(true)
    }

    /// Runs the parse hook. `Ok(false)` means the hook asked to skip.
    pub(crate) fn run_parse(&self, cx: &mut Context<'_>) -> Result<bool, ElementError> {
        let Some(parse) = &self.parse else {
            return Ok(true);
        };
        match parse(cx) {
            Ok(()) => Ok(true),
            Err(err) if err.is_skip() => {
                glean_debug!("{}: parse raises {}", self.name, err);
                Ok(false)
            }
            Err(source) => Err(ElementError::Parse {
                element: self.name.clone(),
                source,
            }),
        }
    }
}

/// Last path segment of a type name, used as the default element name.
pub(crate) fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
