use std::cell::RefCell;
use std::sync::Once;

use gleaner_elements::{
    paginate, value_text, Attr, CleanText, ElementError, ItemElement, ListElement, Object, Page,
    PaginateError, Rule,
};
use pretty_assertions::assert_eq;
use serde_json::Value;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(gleaner_logging::initialize_for_tests);
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Row {
    id: String,
    name: String,
}

impl Object for Row {
    fn id(&self) -> Option<String> {
        Some(self.id.clone())
    }
}

#[derive(Debug, PartialEq)]
struct NotFound(String);

fn rows() -> ListElement<Row> {
    ListElement::new()
        .items("li")
        .item(
            ItemElement::<Row>::new()
                .filter("id", Attr::css("span", "data-id"), |r, v: String| r.id = v)
                .filter("name", CleanText::css("span"), |r, v: String| r.name = v),
        )
        .next_page(Rule::filter(Attr::css("a.next", "href")))
}

fn page(number: u32, ids: &[&str], next: Option<u32>) -> Page {
    let items: String = ids
        .iter()
        .map(|id| format!(r#"<li><span data-id="{id}">row {id}</span></li>"#))
        .collect();
    let link = next
        .map(|n| format!(r#"<a class="next" href="/rows?page={n}">next</a>"#))
        .unwrap_or_default();
    Page::html(&format!("<ul>{items}</ul>{link}"))
        .with_url(&format!("https://example.org/rows?page={number}"))
        .unwrap()
}

fn load(next: &Value) -> Result<Page, NotFound> {
    match value_text(next).as_str() {
        "/rows?page=2" => Ok(page(2, &["3", "4"], Some(3))),
        "/rows?page=3" => Ok(page(3, &["5"], None)),
        other => Err(NotFound(other.to_string())),
    }
}

fn names(rows: &[Row]) -> Vec<&str> {
    rows.iter().map(|r| r.name.as_str()).collect()
}

#[test]
fn follows_next_links_until_the_last_page() {
    init_logging();
    let element = rows();
    let first = page(1, &["1", "2"], Some(2));

    let all = paginate(&element, first, |_, next| load(next))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(names(&all), vec!["row 1", "row 2", "row 3", "row 4", "row 5"]);
}

#[test]
fn next_page_is_loaded_lazily() {
    init_logging();
    let element = rows();
    let loads = RefCell::new(Vec::new());
    let first = page(1, &["1", "2"], Some(2));

    let mut objects = paginate(&element, first, |previous, next| {
        loads
            .borrow_mut()
            .push(previous.url().map(|u| u.to_string()).unwrap_or_default());
        load(next)
    });

    assert_eq!(objects.next().unwrap().unwrap().name, "row 1");
    assert_eq!(objects.next().unwrap().unwrap().name, "row 2");
    assert!(loads.borrow().is_empty());
    assert_eq!(objects.next().unwrap().unwrap().name, "row 3");
    assert_eq!(*loads.borrow(), vec!["https://example.org/rows?page=1".to_string()]);
}

#[test]
fn max_pages_bounds_the_walk() {
    init_logging();
    let element = rows();
    let first = page(1, &["1", "2"], Some(2));

    let mut walk = paginate(&element, first, |_, next| load(next)).max_pages(2);
    let all = walk.by_ref().collect::<Result<Vec<_>, _>>().unwrap();

    assert_eq!(names(&all), vec!["row 1", "row 2", "row 3", "row 4"]);
    assert_eq!(walk.visited(), 2);
}

#[test]
fn loader_failure_ends_the_walk() {
    init_logging();
    let element = rows();
    let first = page(1, &["1"], Some(9));

    let results: Vec<_> = paginate(&element, first, |_, next| load(next)).collect();

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    match &results[1] {
        Err(PaginateError::Load(NotFound(link))) => assert_eq!(link, "/rows?page=9"),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn element_error_is_reported_after_the_page_prefix() {
    init_logging();
    let element = rows();
    let first = page(1, &["1", "2", "1"], Some(2));

    let results: Vec<_> = paginate(&element, first, |_, next| load(next)).collect();

    assert_eq!(results.len(), 3);
    assert!(matches!(
        results[2],
        Err(PaginateError::Element(ElementError::DuplicateId { .. }))
    ));
}
