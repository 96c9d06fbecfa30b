//! List-query pipeline shared by the catalog shop and My Books.
//!
//! Both sources run the same steps: search gate, category filter, inclusive
//! price filter, stable title sort, total, then pagination. Two steps depend
//! on the source:
//!
//! * the catalog gate refuses empty or short terms before anything is fetched,
//!   and text matching is left to the upstream search;
//! * catalog pagination is a plain `limit` cut of the single upstream page
//!   that was fetched, while owned pagination is a true offset window over
//!   the whole collection.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::error::{BookshelfError, FieldError};
use crate::modules::books::models::{BookCard, BookSource, Category};

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 100;
/// Upstream catalog search refuses shorter terms.
pub const MIN_CATALOG_TERM_CHARS: usize = 3;
pub const SHORT_TERM_MESSAGE: &str = "Search query must be at least 3 characters";

/// Query-string parameters exactly as received.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawListParams {
    pub q: Option<String>,
    pub page: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Normalised list criteria.
#[derive(Debug, Clone, PartialEq)]
pub struct ListParams {
    pub q: String,
    pub page: usize,
    pub sort: SortOrder,
    pub limit: usize,
    pub category: Option<Category>,
    pub min_price: f64,
    pub max_price: f64,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            q: String::new(),
            page: 1,
            sort: SortOrder::Asc,
            limit: DEFAULT_LIMIT,
            category: None,
            min_price: 0.0,
            max_price: f64::INFINITY,
        }
    }
}

impl ListParams {
    /// Normalise raw parameters. Numbers that do not parse fall back to their
    /// defaults; only an unknown category is rejected.
    pub fn from_raw(raw: RawListParams) -> Result<Self, BookshelfError> {
        let defaults = Self::default();

        let category = match non_blank(raw.category.as_deref()) {
            Some(text) => Some(
                text.parse::<Category>()
                    .map_err(|_| BookshelfError::Validation(vec![FieldError::new("category", "unknown")]))?,
            ),
            None => None,
        };

        let page = non_blank(raw.page.as_deref())
            .and_then(|p| p.parse::<i64>().ok())
            .map(|p| p.max(1) as usize)
            .unwrap_or(defaults.page);

        let limit = non_blank(raw.limit.as_deref())
            .and_then(|l| l.parse::<i64>().ok())
            .filter(|l| *l > 0)
            .map(|l| (l as usize).min(MAX_LIMIT))
            .unwrap_or(defaults.limit);

        let sort = match non_blank(raw.sort.as_deref()) {
            Some(s) if s.eq_ignore_ascii_case("desc") => SortOrder::Desc,
            _ => SortOrder::Asc,
        };

        Ok(Self {
            q: raw.q.unwrap_or_default(),
            page,
            sort,
            limit,
            category,
            min_price: parse_price(raw.min_price.as_deref()).unwrap_or(defaults.min_price),
            max_price: parse_price(raw.max_price.as_deref()).unwrap_or(defaults.max_price),
        })
    }

    /// Search term with surrounding whitespace removed.
    pub fn term(&self) -> &str {
        self.q.trim()
    }
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_price(raw: Option<&str>) -> Option<f64> {
    non_blank(raw)
        .and_then(|p| p.parse::<f64>().ok())
        .filter(|p| !p.is_nan())
}

/// Anything the pipeline can filter and sort.
pub trait Queryable {
    fn title(&self) -> &str;
    fn author(&self) -> &str;
    fn description(&self) -> &str {
        ""
    }
    fn category(&self) -> Category;
    fn price(&self) -> f64;
}

impl Queryable for BookCard {
    fn title(&self) -> &str {
        &self.title
    }

    fn author(&self) -> &str {
        &self.author
    }

    fn category(&self) -> Category {
        self.category
    }

    fn price(&self) -> f64 {
        self.price
    }
}

/// Outcome of the catalog search gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogGate {
    /// Forward the term upstream.
    Search,
    /// Answer with an empty page without calling upstream.
    Empty { message: Option<&'static str> },
}

/// Term length is measured in UTF-16 code units, like the mock price.
pub fn catalog_gate(term: &str) -> CatalogGate {
    let term = term.trim();
    if term.is_empty() {
        CatalogGate::Empty { message: None }
    } else if term.encode_utf16().count() < MIN_CATALOG_TERM_CHARS {
        CatalogGate::Empty {
            message: Some(SHORT_TERM_MESSAGE),
        }
    } else {
        CatalogGate::Search
    }
}

/// One page of results plus the filtered total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Page<T> {
    pub fn empty(params: &ListParams, message: Option<&str>) -> Self {
        Self {
            data: Vec::new(),
            total: 0,
            page: params.page,
            limit: params.limit,
            message: message.map(str::to_string),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            message: self.message,
        }
    }
}

/// Run filter, sort and pagination over `records` for the given source.
pub fn run<T: Queryable>(records: Vec<T>, params: &ListParams, source: BookSource) -> Page<T> {
    let needle = match source {
        BookSource::Owned if !params.term().is_empty() => Some(params.term().to_lowercase()),
        _ => None,
    };

    let mut filtered: Vec<T> = records
        .into_iter()
        .filter(|r| needle.as_deref().map_or(true, |n| matches_term(r, n)))
        .filter(|r| params.category.map_or(true, |c| r.category() == c))
        .filter(|r| r.price() >= params.min_price && r.price() <= params.max_price)
        .collect();

    // `sort_by` is stable, so equal titles keep their incoming order.
    match params.sort {
        SortOrder::Asc => filtered.sort_by(|a, b| collate(a.title(), b.title())),
        SortOrder::Desc => filtered.sort_by(|a, b| collate(b.title(), a.title())),
    }

    let total = filtered.len();

    let data = match source {
        BookSource::Catalog => {
            filtered.truncate(params.limit);
            filtered
        }
        BookSource::Owned => {
            let start = params.page.saturating_sub(1).saturating_mul(params.limit);
            filtered.into_iter().skip(start).take(params.limit).collect()
        }
    };

    Page {
        data,
        total,
        page: params.page,
        limit: params.limit,
        message: None,
    }
}

fn matches_term<T: Queryable>(record: &T, needle: &str) -> bool {
    [record.title(), record.author(), record.description()]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Locale-style title ordering: accents and case are ignored first, then
/// lowercase sorts before uppercase, then raw text breaks any remaining tie.
pub fn collate(a: &str, b: &str) -> Ordering {
    primary_key(a)
        .cmp(&primary_key(b))
        .then_with(|| case_key(a).cmp(&case_key(b)))
        .then_with(|| a.cmp(b))
}

fn primary_key(s: &str) -> Vec<char> {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

fn case_key(s: &str) -> Vec<u8> {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| u8::from(c.is_uppercase()))
        .collect()
}
