//! Header-driven column resolution for table collections.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use regex::Regex;
use scraper::ElementRef;

use crate::filter::Select;
use crate::scope::{clean_text, Css, Node, Scope};
use crate::{Context, FieldError, Page};

/// Symbolic column name → position, as resolved from one header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Columns {
    positions: BTreeMap<String, usize>,
}

impl Columns {
    pub fn get(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.positions.iter().map(|(name, index)| (name.as_str(), *index))
    }
}

/// One accepted header label. Text labels compare case-insensitively;
/// patterns must match at the start of the cleaned header text.
#[derive(Debug, Clone)]
pub enum Label {
    Text(String),
    Pattern(Regex),
}

impl Label {
    fn matches(&self, title: &str, title_lower: &str) -> bool {
        match self {
            Label::Text(label) => label == title_lower,
            Label::Pattern(regex) => regex.find(title).is_some_and(|m| m.start() == 0),
        }
    }
}

impl From<&str> for Label {
    fn from(label: &str) -> Self {
        Label::Text(label.to_lowercase())
    }
}

impl From<String> for Label {
    fn from(label: String) -> Self {
        Label::Text(label.to_lowercase())
    }
}

impl From<Regex> for Label {
    fn from(regex: Regex) -> Self {
        Label::Pattern(regex)
    }
}

/// A declared column: its symbolic name and the header labels that denote it.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    name: String,
    labels: Vec<Label>,
}

impl ColumnSpec {
    pub fn new<L: Into<Label>>(name: impl Into<String>, labels: impl IntoIterator<Item = L>) -> Self {
        Self {
            name: name.into(),
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) type Cleaner = Box<dyn Fn(ElementRef<'_>) -> String + Send + Sync>;

/// Resolve `columns` against the header cells matched by `head`, using the
/// default text cleaner.
pub fn resolve_columns(
    scope: Scope<'_>,
    head: &Css,
    columns: &[ColumnSpec],
) -> Result<Columns, FieldError> {
    resolve_with(scope, head, columns, &clean_text)
}

pub(crate) fn resolve_with(
    scope: Scope<'_>,
    head: &Css,
    columns: &[ColumnSpec],
    cleaner: &dyn Fn(ElementRef<'_>) -> String,
) -> Result<Columns, FieldError> {
    let mut resolved = Columns::default();
    let mut colnum = 0;
    for node in scope.select(head)? {
        let Some(cell) = node.as_element() else {
            continue;
        };
        let title = cleaner(cell);
        let title_lower = title.to_lowercase();
        for spec in columns {
            if resolved.positions.contains_key(&spec.name) {
                continue;
            }
            if spec.labels.iter().any(|label| label.matches(&title, &title_lower)) {
                resolved.positions.insert(spec.name.clone(), colnum);
            }
        }
        colnum += colspan(cell);
    }
    Ok(resolved)
}

fn colspan(cell: ElementRef<'_>) -> usize {
    cell.value()
        .attr("colspan")
        .and_then(|span| span.trim().parse().ok())
        .unwrap_or(1)
}

/// The cell of the current row under the first column of `names` that is
/// resolved and present in the row.
pub struct TableCell {
    names: Vec<String>,
    cell_tag: String,
    colspan_aware: bool,
}

impl TableCell {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            cell_tag: "td".to_string(),
            colspan_aware: false,
        }
    }

    /// Row cells carry this tag instead of `td`.
    pub fn cell_tag(mut self, tag: impl Into<String>) -> Self {
        self.cell_tag = tag.into();
        self
    }

    /// Count row cells by their span instead of one per cell.
    pub fn colspan_aware(mut self) -> Self {
        self.colspan_aware = true;
        self
    }

    fn cell_at<'a>(&self, row: ElementRef<'a>, index: usize) -> Option<ElementRef<'a>> {
        let mut cells = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|cell| cell.value().name().eq_ignore_ascii_case(&self.cell_tag));
        if !self.colspan_aware {
            return cells.nth(index);
        }
        let mut start = 0;
        for cell in cells {
            let end = start + colspan(cell);
            if (start..end).contains(&index) {
                return Some(cell);
            }
            start = end;
        }
        None
    }
}

impl Select for TableCell {
    fn select<'a>(&self, cx: &Context<'a>) -> Result<Vec<Node<'a>>, FieldError> {
        let row = cx.node().expect_element()?;
        self.names
            .iter()
            .filter_map(|name| cx.column(name))
            .find_map(|index| self.cell_at(row, index))
            .map(|cell| vec![Node::Element(cell)])
            .ok_or_else(|| FieldError::ColumnNotFound(self.describe()))
    }

    fn describe(&self) -> String {
        self.names.join("|")
    }
}

/// Development helper: a builder skeleton declaring one column per header
/// cell of `head`.
pub fn table_skeleton(page: &Page, head: &str) -> Result<String, FieldError> {
    let css = Css::new(head);
    let mut names = Vec::new();
    for node in page.root().select(&css)? {
        let title = node.text();
        let name: String = title
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        names.push((name, title));
    }

    let mut out = String::new();
    let _ = writeln!(out, "ListElement::table({head:?})");
    let _ = writeln!(out, "    .items(\"...\")");
    for (name, title) in &names {
        let _ = writeln!(out, "    .column({name:?}, [{title:?}])");
    }
    let _ = writeln!(out, "    .item(");
    let _ = writeln!(out, "        ItemElement::new()");
    for (name, _) in &names {
        let _ = writeln!(
            out,
            "            .filter({name:?}, CleanText::new(TableCell::new([{name:?}])), |obj, v: String| obj.{name} = v)"
        );
    }
    let _ = writeln!(out, "    )");
    Ok(out)
}
