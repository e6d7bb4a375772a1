use std::fmt;
use std::sync::OnceLock;

use ego_tree::NodeRef;
use scraper::node::Node as HtmlNode;
use scraper::{ElementRef, Selector};
use serde_json::Value;

use crate::dict::{self, Path};
use crate::page::Page;
use crate::FieldError;

/// One position inside a document: an HTML element or a JSON fragment.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Element(ElementRef<'a>),
    Json(&'a Value),
}

impl<'a> Node<'a> {
    pub fn as_element(&self) -> Option<ElementRef<'a>> {
        match self {
            Node::Element(element) => Some(*element),
            Node::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&'a Value> {
        match *self {
            Node::Json(value) => Some(value),
            Node::Element(_) => None,
        }
    }

    pub(crate) fn expect_element(&self) -> Result<ElementRef<'a>, FieldError> {
        self.as_element()
            .ok_or(FieldError::WrongNodeKind { expected: "html" })
    }

    pub(crate) fn expect_json(&self) -> Result<&'a Value, FieldError> {
        self.as_json()
            .ok_or(FieldError::WrongNodeKind { expected: "json" })
    }

    /// Visible text with whitespace runs collapsed to single spaces.
    pub fn text(&self) -> String {
        match self {
            Node::Element(element) => clean_text(*element),
            Node::Json(Value::String(text)) => collapse_whitespace(text),
            Node::Json(Value::Null) => String::new(),
            Node::Json(other) => other.to_string(),
        }
    }
}

/// A node together with the page it belongs to.
///
/// Scopes are immutable; narrowing to a sub-node produces a new scope.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    node: Node<'a>,
    page: &'a Page,
}

impl<'a> Scope<'a> {
    pub fn new(node: Node<'a>, page: &'a Page) -> Self {
        Self { node, page }
    }

    pub fn node(&self) -> Node<'a> {
        self.node
    }

    pub fn page(&self) -> &'a Page {
        self.page
    }

    pub fn rescope(&self, node: Node<'a>) -> Scope<'a> {
        Scope::new(node, self.page)
    }

    /// Descendants of the bound element matching `css`, in document order.
    pub fn select(&self, css: &Css) -> Result<Vec<Node<'a>>, FieldError> {
        let element = self.node.expect_element()?;
        let selector = css.selector()?;
        Ok(element.select(selector).map(Node::Element).collect())
    }

    /// Fragments reached by walking `path` from the bound JSON fragment.
    pub fn lookup(&self, path: &Path) -> Result<Vec<Node<'a>>, FieldError> {
        let value = self.node.expect_json()?;
        Ok(dict::walk(value, path)?
            .into_iter()
            .map(Node::Json)
            .collect())
    }
}

/// A CSS selector, compiled on first use.
pub struct Css {
    source: String,
    compiled: OnceLock<Result<Selector, String>>,
}

impl Css {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            compiled: OnceLock::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub(crate) fn selector(&self) -> Result<&Selector, FieldError> {
        self.compiled
            .get_or_init(|| Selector::parse(&self.source).map_err(|err| err.to_string()))
            .as_ref()
            .map_err(|message| FieldError::InvalidSelector {
                selector: self.source.clone(),
                message: message.clone(),
            })
    }
}

impl Clone for Css {
    fn clone(&self) -> Self {
        Css::new(self.source.clone())
    }
}

impl fmt::Debug for Css {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Css").field(&self.source).finish()
    }
}

impl From<&str> for Css {
    fn from(source: &str) -> Self {
        Css::new(source)
    }
}

impl From<String> for Css {
    fn from(source: String) -> Self {
        Css::new(source)
    }
}

/// Text of an element, skipping scripting sections, whitespace collapsed.
pub fn clean_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for child in element.children() {
        append_node_text(child, &mut out);
    }
    collapse_whitespace(&out)
}

fn append_node_text(node: NodeRef<'_, HtmlNode>, out: &mut String) {
    match node.value() {
        HtmlNode::Text(text) => out.push_str(text),
        HtmlNode::Element(element) => {
            let tag = element.name();
            if matches!(tag, "script" | "style" | "noscript" | "template") {
                return;
            }
            if tag == "br" {
                out.push(' ');
            }
            for child in node.children() {
                append_node_text(child, out);
            }
        }
        _ => {
            for child in node.children() {
                append_node_text(child, out);
            }
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_skips_scripts_and_collapses_spaces() {
        let page = Page::html("<div id='x'>  Virement <script>var a;</script>\n  SEPA<br>reçu </div>");
        let scope = page.root();
        let nodes = scope.select(&Css::new("#x")).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].text(), "Virement SEPA reçu");
    }

    #[test]
    fn invalid_selector_is_reported_not_panicking() {
        let page = Page::html("<p>x</p>");
        let err = page.root().select(&Css::new("p[")).unwrap_err();
        assert!(matches!(err, FieldError::InvalidSelector { .. }));
    }

    #[test]
    fn css_query_on_json_is_a_kind_error() {
        let page = Page::from_json(serde_json::json!({"a": 1}));
        let err = page.root().select(&Css::new("p")).unwrap_err();
        assert!(matches!(err, FieldError::WrongNodeKind { expected: "html" }));
    }
}
