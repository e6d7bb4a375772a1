//! Gleaner elements: declarative extraction of typed objects from HTML and
//! JSON pages.
mod context;
mod decode;
mod dict;
mod element;
mod env;
mod filter;
mod item;
mod list;
mod object;
mod page;
mod paginate;
mod scope;
mod table;
mod types;

pub use context::Context;
pub use decode::{decode_text, DecodeError, DecodedText};
pub use dict::{Path, WILDCARD};
pub use element::{truthy, Condition, Rule};
pub use env::Env;
pub use filter::{
    value_text, Attr, CleanDecimal, CleanText, Date, DecimalStyle, Dict, FieldRef, Filter,
    FilterExt, FromEnv, Here, Link, LoaderRef, MapValue, Mapped, Regexp, Select, WithDefault,
};
pub use item::{FieldRule, ItemElement, MethodFn, Nested, Phase};
pub use list::{ListElement, ListIter, PageObjects};
pub use object::{Fetched, Object};
pub use page::{Document, Page};
pub use paginate::{paginate, Paginate, PaginateError};
pub use scope::{clean_text, Css, Node, Scope};
pub use table::{resolve_columns, table_skeleton, ColumnSpec, Columns, Label, TableCell};
pub use types::{ElementError, FieldError, PageError, Pagination};
