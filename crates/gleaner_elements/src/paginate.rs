//! Forward pagination over successive pages of one collection.

use std::collections::VecDeque;

use gleaner_logging::glean_debug;
use serde_json::Value;
use thiserror::Error;

use crate::{ElementError, ListElement, Object, Page, Pagination};

#[derive(Debug, Error)]
pub enum PaginateError<E> {
    #[error(transparent)]
    Element(#[from] ElementError),
    #[error("cannot load the next page: {0}")]
    Load(E),
}

/// Iterator over the objects of every page, following the collection's
/// next-page rule. Each page is fully drained before its objects are
/// yielded; the next page is only loaded once they were all consumed.
pub struct Paginate<'s, O, F> {
    element: &'s ListElement<O>,
    page: Option<Page>,
    previous: Option<Page>,
    next: Option<Value>,
    load_next: F,
    buffer: VecDeque<O>,
    error: Option<ElementError>,
    visited: usize,
    max_pages: Option<usize>,
    done: bool,
}

/// Scrape `first` with `element`, then every page `load_next` returns for
/// the designator the previous page produced.
pub fn paginate<O, E, F>(element: &ListElement<O>, first: Page, load_next: F) -> Paginate<'_, O, F>
where
    O: Object + 'static,
    F: FnMut(&Page, &Value) -> Result<Page, E>,
{
    Paginate {
        element,
        page: Some(first),
        previous: None,
        next: None,
        load_next,
        buffer: VecDeque::new(),
        error: None,
        visited: 0,
        max_pages: None,
        done: false,
    }
}

impl<O, F> Paginate<'_, O, F> {
    /// Stop after `pages` pages even if more are announced.
    pub fn max_pages(mut self, pages: usize) -> Self {
        self.max_pages = Some(pages);
        self
    }

    /// Pages scraped so far.
    pub fn visited(&self) -> usize {
        self.visited
    }
}

impl<O, E, F> Iterator for Paginate<'_, O, F>
where
    O: Object + 'static,
    F: FnMut(&Page, &Value) -> Result<Page, E>,
{
    type Item = Result<O, PaginateError<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(obj) = self.buffer.pop_front() {
                return Some(Ok(obj));
            }
            if let Some(err) = self.error.take() {
                self.done = true;
                return Some(Err(err.into()));
            }
            if self.done {
                return None;
            }
            if let Some(page) = self.page.take() {
                self.visited += 1;
                let mut objects = self.element.iter(&page);
                for result in objects.by_ref() {
                    match result {
                        Ok(obj) => self.buffer.push_back(obj),
                        Err(err) => {
                            self.error = Some(err);
                            break;
                        }
                    }
                }
                self.next = match objects.pagination() {
                    Some(Pagination::Continue(next)) => Some(next.clone()),
                    _ => None,
                };
                drop(objects);
                self.previous = Some(page);
                continue;
            }
            match (self.next.take(), self.previous.take()) {
                (Some(next), Some(previous)) => {
                    if self.max_pages.is_some_and(|max| self.visited >= max) {
                        glean_debug!("{}: page limit {} reached", self.element.name(), self.visited);
                        self.done = true;
                        continue;
                    }
                    match (self.load_next)(&previous, &next) {
                        Ok(page) => self.page = Some(page),
                        Err(err) => {
                            self.done = true;
                            return Some(Err(PaginateError::Load(err)));
                        }
                    }
                }
                _ => self.done = true,
            }
        }
    }
}
