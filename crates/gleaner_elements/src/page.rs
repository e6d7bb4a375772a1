use scraper::Html;
use serde_json::Value;
use url::Url;

use crate::decode::decode_text;
use crate::scope::{Node, Scope};
use crate::{Env, PageError};

/// Parsed response body.
#[derive(Debug)]
pub enum Document {
    Html(Html),
    Json(Value),
}

/// A parsed response plus the page-level parameters elements start from.
#[derive(Debug)]
pub struct Page {
    document: Document,
    url: Option<Url>,
    params: Env,
}

impl Page {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            url: None,
            params: Env::new(),
        }
    }

    pub fn html(text: &str) -> Self {
        Self::new(Document::Html(Html::parse_document(text)))
    }

    pub fn json(text: &str) -> Result<Self, PageError> {
        Ok(Self::from_json(serde_json::from_str(text)?))
    }

    pub fn from_json(value: Value) -> Self {
        Self::new(Document::Json(value))
    }

    /// Decode raw response bytes and parse them as HTML.
    pub fn decode_html(bytes: &[u8], content_type: Option<&str>) -> Result<Self, PageError> {
        let decoded = decode_text(bytes, content_type)?;
        Ok(Self::html(&decoded.text))
    }

    pub fn with_url(mut self, url: &str) -> Result<Self, PageError> {
        self.url = Some(Url::parse(url)?);
        Ok(self)
    }

    pub fn with_params(mut self, params: Env) -> Self {
        self.params = params;
        self
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn params(&self) -> &Env {
        &self.params
    }

    /// Scope bound to the document root.
    pub fn root(&self) -> Scope<'_> {
        let node = match &self.document {
            Document::Html(html) => Node::Element(html.root_element()),
            Document::Json(value) => Node::Json(value),
        };
        Scope::new(node, self)
    }

    /// Resolve `reference` against the page URL, if the page has one.
    pub fn absolute_url(&self, reference: &str) -> Option<Url> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(url) = Url::parse(trimmed) {
            return Some(url);
        }
        self.url.as_ref().and_then(|base| base.join(trimmed).ok())
    }
}
