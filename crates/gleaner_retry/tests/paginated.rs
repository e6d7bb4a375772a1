//! A resumable scrape over paginated pages whose loader fails transiently.

use std::cell::Cell;
use std::sync::Once;

use gleaner_elements::{
    paginate, value_text, Attr, CleanText, ItemElement, ListElement, Object, Page, PaginateError,
    Rule,
};
use gleaner_retry::{Retry, RetryError, RetrySettings};
use pretty_assertions::assert_eq;
use serde_json::Value;
use thiserror::Error;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(gleaner_logging::initialize_for_tests);
}

#[derive(Debug, Error)]
enum NetError {
    #[error("timed out")]
    Timeout,
    #[error("no such page {0}")]
    Missing(String),
}

type ScrapeError = PaginateError<NetError>;

#[derive(Debug, Default, Clone, PartialEq)]
struct Operation {
    id: String,
    label: String,
}

impl Object for Operation {
    fn id(&self) -> Option<String> {
        Some(self.id.clone())
    }
}

fn operations() -> ListElement<Operation> {
    ListElement::new()
        .items("tr")
        .item(
            ItemElement::<Operation>::new()
                .filter("id", Attr::css("td.id", "data-id"), |o, v: String| o.id = v)
                .filter("label", CleanText::css("td.label"), |o, v: String| o.label = v),
        )
        .next_page(Rule::filter(Attr::css("a.next", "href")))
}

fn page(rows: &[(&str, &str)], next: Option<&str>) -> Page {
    let rows: String = rows
        .iter()
        .map(|(id, label)| format!(r#"<tr><td class="id" data-id="{id}"></td><td class="label">{label}</td></tr>"#))
        .collect();
    let link = next
        .map(|href| format!(r#"<a class="next" href="{href}">next</a>"#))
        .unwrap_or_default();
    Page::html(&format!("<table>{rows}</table>{link}"))
}

fn retryable(err: &ScrapeError) -> bool {
    matches!(err, PaginateError::Load(NetError::Timeout))
}

#[test]
fn transient_page_failure_resumes_without_duplicates() {
    init_logging();
    let element = operations();
    let timeouts_left = Cell::new(1);
    let load = |next: &Value| -> Result<Page, NetError> {
        match value_text(next).as_str() {
            "p2" if timeouts_left.get() > 0 => {
                timeouts_left.set(timeouts_left.get() - 1);
                Err(NetError::Timeout)
            }
            "p2" => Ok(page(&[("3", "rent")], None)),
            other => Err(NetError::Missing(other.to_string())),
        }
    };
    let fetch = || -> Result<_, ScrapeError> {
        let first = page(&[("1", "coffee"), ("2", "salary")], Some("p2"));
        Ok(paginate(&element, first, |_, next| load(next)))
    };

    let retry = Retry::new(&RetrySettings::default(), retryable);
    let labels: Vec<_> = retry
        .iter(fetch)
        .unwrap()
        .map(|op| op.map(|op| op.label))
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(labels, vec!["coffee", "salary", "rent"]);
    assert_eq!(timeouts_left.get(), 0);
}

#[test]
fn persistent_page_failure_ends_unavailable() {
    init_logging();
    let element = operations();
    let fetch = || -> Result<_, ScrapeError> {
        let first = page(&[("1", "coffee")], Some("p2"));
        Ok(paginate(&element, first, |_, _| -> Result<Page, NetError> { Err(NetError::Timeout) }))
    };

    let results: Vec<_> = Retry::new(&RetrySettings { tries: 3 }, retryable)
        .iter(fetch)
        .unwrap()
        .collect();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().map(|op| op.label.as_str()).ok(), Some("coffee"));
    assert!(matches!(results[1], Err(RetryError::Unavailable { tries: 3 })));
}

#[test]
fn missing_page_is_not_retried() {
    init_logging();
    let element = operations();
    let fetch = || -> Result<_, ScrapeError> {
        let first = page(&[("1", "coffee")], Some("p9"));
        Ok(paginate(&element, first, |_, next| -> Result<Page, NetError> {
            Err(NetError::Missing(value_text(next)))
        }))
    };

    let results: Vec<_> = Retry::new(&RetrySettings::default(), retryable)
        .iter(fetch)
        .unwrap()
        .collect();

    assert!(matches!(
        &results[1],
        Err(RetryError::Source(PaginateError::Load(NetError::Missing(link)))) if link == "p9"
    ));
}
