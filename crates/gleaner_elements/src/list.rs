//! Collection elements: enumerate candidate nodes and build one object per
//! candidate with the nested element definitions.

use std::collections::{HashSet, VecDeque};

use gleaner_logging::{glean_debug, glean_warn};
use scraper::ElementRef;
use serde::Serialize;
use serde_json::Value;

use crate::dict::{self, Path};
use crate::element::{short_type_name, Condition, ElementBase, Rule};
use crate::item::{ItemElement, Nested};
use crate::scope::{clean_text, Css, Node};
use crate::table::{self, Cleaner, ColumnSpec, Columns, Label};
use crate::{Context, ElementError, Env, FieldError, Object, Page, Pagination};

enum Candidates {
    /// The bound node itself is the only candidate.
    Bound,
    Css(Css),
    Dict(Path),
}

struct TableHeader {
    head: Css,
    columns: Vec<ColumnSpec>,
    cleaner: Option<Cleaner>,
}

impl TableHeader {
    fn resolve(&self, cx: &Context<'_>) -> Result<Columns, FieldError> {
        match &self.cleaner {
            Some(cleaner) => table::resolve_with(cx.scope(), &self.head, &self.columns, &**cleaner),
            None => table::resolve_with(cx.scope(), &self.head, &self.columns, &clean_text),
        }
    }
}

enum Child<O> {
    Item(ItemElement<O>),
    List(Box<ListElement<O>>),
}

/// Objects of one page plus the pagination verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct PageObjects<O> {
    pub objects: Vec<O>,
    pub next: Pagination,
}

/// Enumerates candidates and yields the objects built by its nested
/// elements, deduplicated by id.
pub struct ListElement<O> {
    base: ElementBase,
    candidates: Candidates,
    empty: Option<Css>,
    table: Option<TableHeader>,
    children: Vec<Child<O>>,
    ignore_duplicates: bool,
    flush_at_end: bool,
    flush_hook: Option<Box<dyn Fn(&mut Vec<O>) + Send + Sync>>,
    next_page: Option<Rule>,
}

impl<O: Object + 'static> Default for ListElement<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Object + 'static> ListElement<O> {
    /// A collection whose single candidate is the node it is bound to.
    pub fn new() -> Self {
        Self {
            base: ElementBase::new(format!("ListElement<{}>", short_type_name::<O>())),
            candidates: Candidates::Bound,
            empty: None,
            table: None,
            children: Vec::new(),
            ignore_duplicates: false,
            flush_at_end: false,
            flush_hook: None,
            next_page: None,
        }
    }

    /// A table collection whose header cells are matched by `head`.
    pub fn table(head: impl Into<Css>) -> Self {
        let mut element = Self::new();
        element.table = Some(TableHeader {
            head: head.into(),
            columns: Vec::new(),
            cleaner: None,
        });
        element
    }

    /// A collection over the structured-data nodes reached by `path`.
    pub fn dict(path: impl Into<Path>) -> Self {
        let mut element = Self::new();
        element.candidates = Candidates::Dict(path.into());
        element
    }

    pub fn items(mut self, css: impl Into<Css>) -> Self {
        self.candidates = Candidates::Css(css.into());
        self
    }

    /// Selector expected to match when the page legitimately lists nothing.
    /// Finding no candidates while it does not match either logs a warning.
    pub fn empty(mut self, css: impl Into<Css>) -> Self {
        self.empty = Some(css.into());
        self
    }

    /// Declare a table column. Ignored outside table collections.
    pub fn column<L: Into<Label>>(
        mut self,
        name: impl Into<String>,
        labels: impl IntoIterator<Item = L>,
    ) -> Self {
        match &mut self.table {
            Some(table) => table.columns.push(ColumnSpec::new(name, labels)),
            None => glean_debug!("{}: column ignored, not a table collection", self.base.name),
        }
        self
    }

    /// Text cleaner applied to header cells before matching labels.
    pub fn cleaner(mut self, cleaner: impl Fn(ElementRef<'_>) -> String + Send + Sync + 'static) -> Self {
        match &mut self.table {
            Some(table) => table.cleaner = Some(Box::new(cleaner)),
            None => glean_debug!("{}: cleaner ignored, not a table collection", self.base.name),
        }
        self
    }

    pub fn item(mut self, element: ItemElement<O>) -> Self {
        self.children.push(Child::Item(element));
        self
    }

    pub fn list(mut self, element: ListElement<O>) -> Self {
        self.children.push(Child::List(Box::new(element)));
        self
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

    /// Hook run before candidates are enumerated. A `Skip` yields nothing.
    pub fn parse(
        mut self,
        hook: impl Fn(&mut Context<'_>) -> Result<(), FieldError> + Send + Sync + 'static,
    ) -> Self {
        self.base.parse = Some(Box::new(hook));
        self
    }

    /// Drop duplicate ids with a warning instead of failing.
    pub fn ignore_duplicates(mut self, enabled: bool) -> Self {
        self.ignore_duplicates = enabled;
        self
    }

    /// Withhold every object until all candidates were processed.
    pub fn flush_at_end(mut self, enabled: bool) -> Self {
        self.flush_at_end = enabled;
        self
    }

    /// Withhold objects and pass them through `hook` before yielding.
    pub fn flush_with(mut self, hook: impl Fn(&mut Vec<O>) + Send + Sync + 'static) -> Self {
        self.flush_at_end = true;
        self.flush_hook = Some(Box::new(hook));
        self
    }

    /// Rule producing the next page designator. Not-found lookups and null
    /// mean there is no next page.
    pub fn next_page(mut self, rule: Rule) -> Self {
        self.next_page = Some(rule);
        self
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn iter<'a>(&'a self, page: &'a Page) -> ListIter<'a, O> {
        ListIter::new(self, Context::root(page), false)
    }

    /// Iterate with `params` layered over the page parameters.
    pub fn iter_with<'a>(&'a self, page: &'a Page, params: &Env) -> ListIter<'a, O> {
        let mut cx = Context::root(page);
        cx.env_mut().overlay(params);
        ListIter::new(self, cx, false)
    }

    /// Drain one page. Stops at the first error.
    pub fn collect_page(&self, page: &Page) -> Result<PageObjects<O>, ElementError> {
        let mut iter = self.iter(page);
        let objects = iter.by_ref().collect::<Result<Vec<_>, _>>()?;
        let next = iter.pagination().cloned().unwrap_or(Pagination::Done);
        Ok(PageObjects { objects, next })
    }

    /// Columns of this table collection as resolved on `page`.
    pub fn columns(&self, page: &Page) -> Result<Columns, ElementError> {
        let cx = Context::root(page);
        match &self.table {
            Some(table) => table.resolve(&cx).map_err(|source| self.candidates_error(source)),
            None => Ok(Columns::default()),
        }
    }

    pub(crate) fn iter_in<'a>(&'a self, cx: Context<'a>) -> ListIter<'a, O> {
        ListIter::new(self, cx, false)
    }

    /// Table columns, condition and loaders. `None` means this collection
    /// yields nothing on this node.
    fn prepare<'a>(&self, mut cx: Context<'a>) -> Result<Option<Context<'a>>, ElementError> {
        if let Some(table) = &self.table {
            let columns = table.resolve(&cx).map_err(|source| self.candidates_error(source))?;
            glean_debug!("{}: columns {:?}", self.base.name, columns);
            cx.set_columns(columns);
        }
        if !self.base.check_condition(&cx)? {
            glean_debug!("{}: condition is false", self.base.name);
            return Ok(None);
        }
        if !self.base.handle_loaders(&mut cx)? {
            return Ok(None);
        }
        Ok(Some(cx))
    }

    /// Runs the parse hook, enumerates candidates and instantiates the
    /// nested elements on each of them, in candidate then declaration order.
    fn discover<'a>(
        &'a self,
        mut cx: Context<'a>,
    ) -> Result<Option<(Context<'a>, VecDeque<Pending<'a, O>>)>, ElementError> {
        if !self.base.run_parse(&mut cx)? {
            return Ok(None);
        }
        let nodes = self.find_nodes(&cx)?;
        let mut pending = VecDeque::new();
        for node in nodes {
            for child in &self.children {
                match child {
                    Child::Item(item) => {
                        let Some(mut item_cx) = item.bind_context(cx.child(node))? else {
                            continue;
                        };
                        if !item.base().handle_loaders(&mut item_cx)? {
                            continue;
                        }
                        pending.push_back(Pending::Item(item, item_cx));
                    }
                    Child::List(list) => {
                        if let Some(list_cx) = list.prepare(cx.child(node))? {
                            pending.push_back(Pending::List(ListIter::new(list, list_cx, true)));
                        }
                    }
                }
            }
        }
        Ok(Some((cx, pending)))
    }

    fn find_nodes<'a>(&self, cx: &Context<'a>) -> Result<Vec<Node<'a>>, ElementError> {
        match &self.candidates {
            Candidates::Bound => Ok(vec![cx.node()]),
            Candidates::Css(items) => {
                let nodes = cx.scope().select(items).map_err(|source| self.candidates_error(source))?;
                if let (true, Some(empty)) = (nodes.is_empty(), &self.empty) {
                    let empty_state = cx.scope().select(empty).map_err(|source| self.candidates_error(source))?;
                    if empty_state.is_empty() {
                        glean_warn!("{}: no item found for `{}`", self.base.name, items.as_str());
                    }
                }
                Ok(nodes)
            }
            Candidates::Dict(path) => {
                let start = cx.node().expect_json().map_err(|source| self.candidates_error(source))?;
                let values = dict::candidates(start, path).map_err(|source| self.candidates_error(source))?;
                Ok(values.into_iter().map(Node::Json).collect())
            }
        }
    }

    fn check_next_page(&self, cx: &Context<'_>) -> Result<Pagination, ElementError> {
        let Some(rule) = &self.next_page else {
            return Ok(Pagination::Done);
        };
        match rule.evaluate(cx) {
            Ok(Value::Null) => Ok(Pagination::Done),
            Ok(next) => {
                glean_debug!("{}: next page {}", self.base.name, next);
                Ok(Pagination::Continue(next))
            }
            Err(err) if err.is_not_found() => Ok(Pagination::Done),
            Err(source) => Err(ElementError::NextPage {
                element: self.base.name.clone(),
                source,
            }),
        }
    }

    fn candidates_error(&self, source: FieldError) -> ElementError {
        ElementError::Candidates {
            element: self.base.name.clone(),
            source,
        }
    }
}

impl<P: Object + Serialize + 'static> Nested for ListElement<P> {
    /// Nested collections ignore their own pagination.
    fn evaluate(&self, cx: &Context<'_>) -> Result<Value, FieldError> {
        let objects = self
            .iter_in(cx.child(cx.node()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(serde_json::to_value(objects)?)
    }
}

enum Pending<'a, O> {
    Item(&'a ItemElement<O>, Context<'a>),
    List(ListIter<'a, O>),
}

enum State<'a, O> {
    Start {
        cx: Context<'a>,
        prepared: bool,
    },
    Draining {
        cx: Context<'a>,
        pending: VecDeque<Pending<'a, O>>,
        current: Option<Box<ListIter<'a, O>>>,
    },
    Flushing {
        cx: Context<'a>,
        withheld: std::vec::IntoIter<O>,
    },
    Finished,
}

/// Lazy iteration over a collection. Once it returned `None`,
/// [`ListIter::pagination`] holds the next-page verdict.
///
/// The iterator is fused after the first error.
pub struct ListIter<'a, O> {
    element: &'a ListElement<O>,
    state: State<'a, O>,
    seen: HashSet<String>,
    withheld: Vec<O>,
    pagination: Option<Pagination>,
}

impl<'a, O: Object + 'static> ListIter<'a, O> {
    fn new(element: &'a ListElement<O>, cx: Context<'a>, prepared: bool) -> Self {
        Self {
            element,
            state: State::Start { cx, prepared },
            seen: HashSet::new(),
            withheld: Vec::new(),
            pagination: None,
        }
    }

    /// `None` until the collection was fully drained, or after an error.
    pub fn pagination(&self) -> Option<&Pagination> {
        self.pagination.as_ref()
    }

    /// Deduplicates and withholds. `Ok(None)` means nothing to yield now.
    fn store(&mut self, obj: O) -> Result<Option<O>, ElementError> {
        if let Some(id) = obj.id().filter(|id| !id.is_empty()) {
            if !self.seen.insert(id.clone()) {
                if self.element.ignore_duplicates {
                    glean_warn!("{}: there are two objects with the same id {}", self.element.base.name, id);
                    return Ok(None);
                }
                return Err(ElementError::DuplicateId {
                    element: self.element.base.name.clone(),
                    id,
                });
            }
        }
        if self.element.flush_at_end {
            self.withheld.push(obj);
            return Ok(None);
        }
        Ok(Some(obj))
    }

    fn accept(&mut self, obj: O) -> Option<Result<O, ElementError>> {
        match self.store(obj) {
            Ok(Some(obj)) => Some(Ok(obj)),
            Ok(None) => None,
            Err(err) => {
                self.state = State::Finished;
                Some(Err(err))
            }
        }
    }

    fn finish(&mut self, cx: &Context<'_>) -> Option<Result<O, ElementError>> {
        match self.element.check_next_page(cx) {
            Ok(pagination) => {
                self.pagination = Some(pagination);
                None
            }
            Err(err) => Some(Err(err)),
        }
    }
}

impl<'a, O: Object + 'static> Iterator for ListIter<'a, O> {
    type Item = Result<O, ElementError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.state, State::Finished) {
                State::Start { cx, prepared } => {
                    let prepared_cx = if prepared {
                        Some(cx)
                    } else {
                        match self.element.prepare(cx) {
                            Ok(prepared_cx) => prepared_cx,
                            Err(err) => return Some(Err(err)),
                        }
                    };
                    let Some(cx) = prepared_cx else {
                        self.pagination = Some(Pagination::Done);
                        return None;
                    };
                    match self.element.discover(cx) {
                        Ok(Some((cx, pending))) => {
                            self.state = State::Draining {
                                cx,
                                pending,
                                current: None,
                            };
                        }
                        Ok(None) => {
                            self.pagination = Some(Pagination::Done);
                            return None;
                        }
                        Err(err) => return Some(Err(err)),
                    }
                }
                State::Draining {
                    cx,
                    pending,
                    current: Some(mut sub),
                } => match sub.next() {
                    Some(Ok(obj)) => {
                        self.state = State::Draining {
                            cx,
                            pending,
                            current: Some(sub),
                        };
                        if let Some(step) = self.accept(obj) {
                            return Some(step);
                        }
                    }
                    Some(Err(err)) => return Some(Err(err)),
                    None => {
                        if let Some(Pagination::Continue(next)) = sub.pagination.take() {
                            // A nested collection asking for another page
                            // stops this one.
                            self.pagination = Some(Pagination::Continue(next));
                            return None;
                        }
                        self.state = State::Draining {
                            cx,
                            pending,
                            current: None,
                        };
                    }
                },
                State::Draining {
                    cx,
                    mut pending,
                    current: None,
                } => match pending.pop_front() {
                    Some(Pending::Item(item, item_cx)) => {
                        let built = item.populate(item_cx, None);
                        self.state = State::Draining {
                            cx,
                            pending,
                            current: None,
                        };
                        match built {
                            Ok(Some(obj)) => {
                                if let Some(step) = self.accept(obj) {
                                    return Some(step);
                                }
                            }
                            Ok(None) => {}
                            Err(err) => {
                                self.state = State::Finished;
                                return Some(Err(err));
                            }
                        }
                    }
                    Some(Pending::List(sub)) => {
                        self.state = State::Draining {
                            cx,
                            pending,
                            current: Some(Box::new(sub)),
                        };
                    }
                    None if self.element.flush_at_end => {
                        let mut withheld = std::mem::take(&mut self.withheld);
                        if let Some(hook) = &self.element.flush_hook {
                            hook(&mut withheld);
                        }
                        self.state = State::Flushing {
                            cx,
                            withheld: withheld.into_iter(),
                        };
                    }
                    None => return self.finish(&cx),
                },
                State::Flushing { cx, mut withheld } => match withheld.next() {
                    Some(obj) => {
                        self.state = State::Flushing { cx, withheld };
                        return Some(Ok(obj));
                    }
                    None => return self.finish(&cx),
                },
                State::Finished => return None,
            }
        }
    }
}
