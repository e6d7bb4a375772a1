//! Item elements: build one object from the node they are bound to.

use gleaner_logging::{glean_debug, glean_trace, glean_warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::dict::Path;
use crate::element::{short_type_name, Condition, ElementBase, Rule};
use crate::filter::Filter;
use crate::list::ListElement;
use crate::scope::Css;
use crate::{Context, ElementError, Env, FieldError, Fetched, Object, Page};

pub type MethodFn<O> = Box<dyn Fn(&Context<'_>, &O) -> Result<Value, FieldError> + Send + Sync>;

/// How one field of `O` gets its value.
pub enum FieldRule<O> {
    Constant(Value),
    Filter(Box<dyn Filter>),
    /// Sees the partially built object.
    Method(MethodFn<O>),
    /// A nested item element run on the current node.
    Item(Box<dyn Nested>),
    /// A nested collection run on the current node, collected to an array.
    List(Box<dyn Nested>),
}

/// Evaluation phase of a field rule. Fields run phase by phase, in
/// declaration order within a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Constant,
    Filter,
    Computed,
}

impl<O> FieldRule<O> {
    pub fn constant(value: impl Into<Value>) -> Self {
        FieldRule::Constant(value.into())
    }

    pub fn filter(filter: impl Filter + 'static) -> Self {
        FieldRule::Filter(Box::new(filter))
    }

    pub fn method(
        method: impl Fn(&Context<'_>, &O) -> Result<Value, FieldError> + Send + Sync + 'static,
    ) -> Self {
        FieldRule::Method(Box::new(method))
    }

    pub fn item<P: Object + Serialize + 'static>(element: ItemElement<P>) -> Self {
        FieldRule::Item(Box::new(element))
    }

    pub fn list<P: Object + Serialize + 'static>(element: ListElement<P>) -> Self {
        FieldRule::List(Box::new(element))
    }

    pub fn phase(&self) -> Phase {
        match self {
            FieldRule::Constant(_) => Phase::Constant,
            FieldRule::Filter(_) => Phase::Filter,
            FieldRule::Method(_) | FieldRule::Item(_) | FieldRule::List(_) => Phase::Computed,
        }
    }

    fn evaluate(&self, cx: &Context<'_>, obj: &O) -> Result<Value, FieldError> {
        match self {
            FieldRule::Constant(value) => Ok(value.clone()),
            FieldRule::Filter(filter) => filter.apply(cx),
            FieldRule::Method(method) => method(cx, obj),
            FieldRule::Item(nested) | FieldRule::List(nested) => nested.evaluate(cx),
        }
    }
}

/// An element usable as the value of a field of another element.
pub trait Nested: Send + Sync {
    fn evaluate(&self, cx: &Context<'_>) -> Result<Value, FieldError>;
}

impl<P: Object + Serialize + 'static> Nested for ItemElement<P> {
    fn evaluate(&self, cx: &Context<'_>) -> Result<Value, FieldError> {
        let built = self.run(cx.child(cx.node()), None)?;
        Ok(serde_json::to_value(built)?)
    }
}

#[derive(Debug)]
enum Resolved {
    Value(Value),
    FetchError,
}

type Assign<O> = Box<dyn Fn(&mut O, Resolved) -> Result<(), FieldError> + Send + Sync>;

struct FieldBinding<O> {
    name: String,
    rule: FieldRule<O>,
    optional: bool,
    assign: Assign<O>,
}

enum Reroot {
    Css(Css),
    Path(Path),
}

enum Outcome {
    Skip,
    Fail(ElementError),
}

/// Builds one `O` from the node it is bound to.
///
/// ```ignore
/// let contact = ItemElement::<Contact>::new()
///     .filter("name", CleanText::css("b"), |c, v: String| c.name = v)
///     .filter("phone", CleanText::css(".tel").default(""), |c, v: String| c.phone = v);
/// let found = contact.scrape(&page)?;
/// ```
pub struct ItemElement<O> {
    base: ElementBase,
    factory: Box<dyn Fn() -> O + Send + Sync>,
    fields: Vec<FieldBinding<O>>,
    validate: Option<Box<dyn Fn(&O) -> bool + Send + Sync>>,
    skip_optional_fields_errors: bool,
    reroot: Option<Reroot>,
}

impl<O: Object + Default + 'static> ItemElement<O> {
    pub fn new() -> Self {
        Self::with_factory(O::default)
    }
}

impl<O: Object + Default + 'static> Default for ItemElement<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Object + 'static> ItemElement<O> {
    pub fn with_factory(factory: impl Fn() -> O + Send + Sync + 'static) -> Self {
        Self {
            base: ElementBase::new(short_type_name::<O>()),
            factory: Box::new(factory),
            fields: Vec::new(),
            validate: None,
            skip_optional_fields_errors: false,
            reroot: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.base.name = name.into();
        self
    }

    pub fn condition(mut self, condition: impl Into<Condition>) -> Self {
        self.base.condition = condition.into();
        self
    }

    pub fn loader(mut self, name: impl Into<String>, rule: Rule) -> Self {
        self.base.loaders.push((name.into(), rule));
        self
    }

    /// Hook run once the object is created, before loaders and fields.
    /// It may write the environment; a `Skip` drops the item.
    pub fn parse(
        mut self,
        hook: impl Fn(&mut Context<'_>) -> Result<(), FieldError> + Send + Sync + 'static,
    ) -> Self {
        self.base.parse = Some(Box::new(hook));
        self
    }

    /// Objects failing `predicate` are dropped silently.
    pub fn validate(mut self, predicate: impl Fn(&O) -> bool + Send + Sync + 'static) -> Self {
        self.validate = Some(Box::new(predicate));
        self
    }

    /// Failing optional fields become `Fetched::FetchError` instead of
    /// failing the element.
    pub fn skip_optional_fields_errors(mut self, enabled: bool) -> Self {
        self.skip_optional_fields_errors = enabled;
        self
    }

    /// Bind to the first node matching `css` below the incoming one.
    pub fn reroot(mut self, css: impl Into<Css>) -> Self {
        self.reroot = Some(Reroot::Css(css.into()));
        self
    }

    pub fn reroot_path(mut self, path: impl Into<Path>) -> Self {
        self.reroot = Some(Reroot::Path(path.into()));
        self
    }

    pub fn field<T, F>(self, name: impl Into<String>, rule: FieldRule<O>, set: F) -> Self
    where
        T: DeserializeOwned,
        F: Fn(&mut O, T) + Send + Sync + 'static,
    {
        let assign: Assign<O> = Box::new(move |obj, resolved| {
            if let Resolved::Value(value) = resolved {
                set(obj, serde_json::from_value(value)?);
            }
            Ok(())
        });
        self.bind(name.into(), rule, false, assign)
    }

    pub fn optional_field<T, F>(self, name: impl Into<String>, rule: FieldRule<O>, set: F) -> Self
    where
        T: DeserializeOwned,
        F: Fn(&mut O, Fetched<T>) + Send + Sync + 'static,
    {
        let assign: Assign<O> = Box::new(move |obj, resolved| {
            let fetched = match resolved {
                Resolved::Value(value) => Fetched::Loaded(serde_json::from_value(value)?),
                Resolved::FetchError => Fetched::FetchError,
            };
            set(obj, fetched);
            Ok(())
        });
        self.bind(name.into(), rule, true, assign)
    }

    pub fn constant<T, F>(self, name: impl Into<String>, value: impl Into<Value>, set: F) -> Self
    where
        T: DeserializeOwned,
        F: Fn(&mut O, T) + Send + Sync + 'static,
    {
        self.field(name, FieldRule::constant(value), set)
    }

    pub fn filter<T, F>(self, name: impl Into<String>, filter: impl Filter + 'static, set: F) -> Self
    where
        T: DeserializeOwned,
        F: Fn(&mut O, T) + Send + Sync + 'static,
    {
        self.field(name, FieldRule::filter(filter), set)
    }

    pub fn method<T, F>(
        self,
        name: impl Into<String>,
        method: impl Fn(&Context<'_>, &O) -> Result<Value, FieldError> + Send + Sync + 'static,
        set: F,
    ) -> Self
    where
        T: DeserializeOwned,
        F: Fn(&mut O, T) + Send + Sync + 'static,
    {
        self.field(name, FieldRule::method(method), set)
    }

    fn bind(mut self, name: String, rule: FieldRule<O>, optional: bool, assign: Assign<O>) -> Self {
        let phase = rule.phase();
        let at = self
            .fields
            .iter()
            .position(|binding| binding.rule.phase() > phase)
            .unwrap_or(self.fields.len());
        self.fields.insert(
            at,
            FieldBinding {
                name,
                rule,
                optional,
                assign,
            },
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    /// Field names in evaluation order.
    pub fn field_order(&self) -> Vec<&str> {
        self.fields.iter().map(|binding| binding.name.as_str()).collect()
    }

    /// Build one object from the root of `page`. `None` when the condition
    /// is false, the item was skipped or validation rejected it.
    pub fn scrape(&self, page: &Page) -> Result<Option<O>, ElementError> {
        self.run(Context::root(page), None)
    }

    pub fn scrape_with(&self, page: &Page, params: &Env) -> Result<Option<O>, ElementError> {
        let mut cx = Context::root(page);
        cx.env_mut().overlay(params);
        self.run(cx, None)
    }

    /// Complete an existing object instead of creating one.
    pub fn fill(&self, page: &Page, obj: O) -> Result<Option<O>, ElementError> {
        self.run(Context::root(page), Some(obj))
    }

    pub(crate) fn base(&self) -> &ElementBase {
        &self.base
    }

    pub(crate) fn run<'a>(&self, cx: Context<'a>, obj: Option<O>) -> Result<Option<O>, ElementError> {
        match self.bind_context(cx)? {
            Some(cx) => self.populate(cx, obj),
            None => Ok(None),
        }
    }

    /// Reroots and checks the condition. `None` means the element does not
    /// proceed on this node.
    pub(crate) fn bind_context<'a>(&self, mut cx: Context<'a>) -> Result<Option<Context<'a>>, ElementError> {
        if let Some(reroot) = &self.reroot {
            let found = match reroot {
                Reroot::Css(css) => cx.scope().select(css),
                Reroot::Path(path) => cx.scope().lookup(path),
            };
            let node = found
                .and_then(|nodes| {
                    nodes.into_iter().next().ok_or_else(|| match reroot {
                        Reroot::Css(css) => FieldError::NodeNotFound(css.as_str().to_string()),
                        Reroot::Path(path) => FieldError::KeyNotFound(path.segments().join("/")),
                    })
                })
                .map_err(|source| ElementError::Candidates {
                    element: self.base.name.clone(),
                    source,
                })?;
            cx.rebind(node);
        }
        if !self.base.check_condition(&cx)? {
            glean_debug!("{}: condition is false", self.base.name);
            return Ok(None);
        }
        Ok(Some(cx))
    }

    pub(crate) fn populate(&self, mut cx: Context<'_>, obj: Option<O>) -> Result<Option<O>, ElementError> {
        let mut obj = obj.unwrap_or_else(|| (self.factory)());
        if !self.base.run_parse(&mut cx)? || !self.base.handle_loaders(&mut cx)? {
            return Ok(None);
        }
        for binding in &self.fields {
            match self.handle_field(&mut cx, &mut obj, binding) {
                Ok(()) => {}
                Err(Outcome::Skip) => return Ok(None),
                Err(Outcome::Fail(err)) => return Err(err),
            }
        }
        if let Some(validate) = &self.validate {
            if !validate(&obj) {
                glean_debug!("{}: object rejected by validation", self.base.name);
                return Ok(None);
            }
        }
        Ok(Some(obj))
    }

    fn handle_field(
        &self,
        cx: &mut Context<'_>,
        obj: &mut O,
        binding: &FieldBinding<O>,
    ) -> Result<(), Outcome> {
        let resolved = match binding.rule.evaluate(cx, obj) {
            Ok(value) => Resolved::Value(value),
            Err(err) if err.is_skip() => {
                glean_debug!("{}: field `{}` raises {}", self.base.name, binding.name, err);
                return Err(Outcome::Skip);
            }
            Err(source) => {
                glean_warn!("{}: field `{}` raises {}", self.base.name, binding.name, source);
                if !(binding.optional && self.skip_optional_fields_errors) {
                    return Err(Outcome::Fail(self.field_error(binding, source)));
                }
                Resolved::FetchError
            }
        };
        glean_trace!("{}.{} = {:?}", cx.instance(), binding.name, resolved);
        if let Resolved::Value(value) = &resolved {
            cx.record_field(&binding.name, value.clone());
        }
        (binding.assign)(obj, resolved).map_err(|source| Outcome::Fail(self.field_error(binding, source)))
    }

    fn field_error(&self, binding: &FieldBinding<O>, source: FieldError) -> ElementError {
        ElementError::Field {
            element: self.base.name.clone(),
            field: binding.name.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Probe;

    impl Object for Probe {}

    fn ignore(_: &mut Probe, _: Value) {}

    #[test]
    fn fields_are_ordered_by_phase_then_declaration() {
        let element = ItemElement::<Probe>::new()
            .method("m1", |_: &Context<'_>, _: &Probe| Ok(Value::Null), ignore)
            .filter("f1", |_: &Context<'_>| Ok::<_, FieldError>(Value::Null), ignore)
            .constant("c1", 1, ignore)
            .filter("f2", |_: &Context<'_>| Ok::<_, FieldError>(Value::Null), ignore)
            .constant("c2", 2, ignore)
            .method("m2", |_: &Context<'_>, _: &Probe| Ok(Value::Null), ignore);
        assert_eq!(element.field_order(), vec!["c1", "c2", "f1", "f2", "m1", "m2"]);
    }
}
