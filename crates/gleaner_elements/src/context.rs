use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::page::Page;
use crate::scope::{Node, Scope};
use crate::table::Columns;
use crate::Env;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(0);

/// Everything a rule may look at while one element instance runs.
///
/// A child context gets its own copy of the environment and reads the
/// table columns and loader results of its ancestors. Nothing written to it
/// reaches the parent.
#[derive(Debug, Clone)]
pub struct Context<'a> {
    instance: u64,
    scope: Scope<'a>,
    env: Env,
    columns: Option<Rc<Columns>>,
    loaders: Rc<BTreeMap<String, Value>>,
    loaders_resolved: bool,
    fields: BTreeMap<String, Value>,
}

impl<'a> Context<'a> {
    /// Root context on `page`, seeded with the page parameters.
    pub fn root(page: &'a Page) -> Self {
        Self::with_env(page.root(), page.params().clone())
    }

    pub(crate) fn with_env(scope: Scope<'a>, env: Env) -> Self {
        Self {
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            scope,
            env,
            columns: None,
            loaders: Rc::default(),
            loaders_resolved: false,
            fields: BTreeMap::new(),
        }
    }

    /// Context for a child element bound to `node`.
    pub(crate) fn child(&self, node: Node<'a>) -> Self {
        let mut child = Self::with_env(self.scope.rescope(node), self.env.clone());
        child.columns = self.columns.clone();
        child.loaders = Rc::clone(&self.loaders);
        child
    }

    /// Debug-only ordering number of this instance.
    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn scope(&self) -> Scope<'a> {
        self.scope
    }

    pub fn node(&self) -> Node<'a> {
        self.scope.node()
    }

    pub fn page(&self) -> &'a Page {
        self.scope.page()
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Env {
        &mut self.env
    }

    /// Position of a table column resolved by the nearest table collection.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.as_ref().and_then(|columns| columns.get(name))
    }

    /// Result of the loader `name`, declared on this element or an ancestor.
    /// The nearest declaration wins.
    pub fn loader(&self, name: &str) -> Option<&Value> {
        self.loaders.get(name)
    }

    /// Value already assigned to `name` on the object being built.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub(crate) fn rebind(&mut self, node: Node<'a>) {
        self.scope = self.scope.rescope(node);
    }

    pub(crate) fn set_columns(&mut self, columns: Columns) {
        self.columns = Some(Rc::new(columns));
    }

    pub(crate) fn loaders_resolved(&self) -> bool {
        self.loaders_resolved
    }

    pub(crate) fn store_loader(&mut self, name: &str, value: Value) {
        Rc::make_mut(&mut self.loaders).insert(name.to_string(), value);
    }

    pub(crate) fn mark_loaders_resolved(&mut self) {
        self.loaders_resolved = true;
    }

    pub(crate) fn record_field(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }
}
