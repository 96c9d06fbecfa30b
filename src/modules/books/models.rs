use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Prefix reserved for identifiers of owned books.
pub const OWNED_ID_PREFIX: &str = "mb_";

/// Closed set of shelf categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Category {
    Technology,
    Science,
    History,
    Fantasy,
    Biography,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Technology,
        Category::Science,
        Category::History,
        Category::Fantasy,
        Category::Biography,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Technology => "Technology",
            Category::Science => "Science",
            Category::History => "History",
            Category::Fantasy => "Fantasy",
            Category::Biography => "Biography",
            Category::Other => "Other",
        }
    }

    /// Parse user-supplied text, falling back to `Other` for anything unknown.
    pub fn coerce(raw: Option<&str>) -> Category {
        raw.and_then(|s| s.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownCategory(trimmed.to_string()))
    }
}

/// Where a card or detail payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSource {
    Owned,
    Catalog,
}

/// List projection shared by owned and catalog books.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookCard {
    pub id: String,
    pub title: String,
    pub price: f64,
    pub thumbnail: String,
    pub author: String,
    pub category: Category,
    pub source: BookSource,
}

/// A book identifier, classified once from its literal text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BookId {
    /// `mb_<random>`: lives in the owned store.
    Owned(String),
    /// Open Library key such as `OL45804W`.
    Catalog(String),
    /// Neither shape; resolution has to try both sources.
    Unclassified(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyBookId;

impl BookId {
    pub fn parse(raw: &str) -> Result<Self, EmptyBookId> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(EmptyBookId);
        }

        if is_owned_id(raw) {
            Ok(BookId::Owned(raw.to_string()))
        } else if is_open_library_key(raw) {
            Ok(BookId::Catalog(raw.to_string()))
        } else {
            Ok(BookId::Unclassified(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BookId::Owned(id) | BookId::Catalog(id) | BookId::Unclassified(id) => id,
        }
    }
}

/// `mb_` followed by one or more ASCII alphanumerics.
fn is_owned_id(raw: &str) -> bool {
    raw.strip_prefix(OWNED_ID_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_alphanumeric()))
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `OL` + digits + kind suffix (W work, M edition, A author).
fn is_open_library_key(raw: &str) -> bool {
    let Some(rest) = raw.strip_prefix("OL") else {
        return false;
    };
    let Some(digits) = rest.strip_suffix(&['W', 'M', 'A'][..]) else {
        return false;
    };
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parsing_is_case_insensitive() {
        assert_eq!("fantasy".parse::<Category>(), Ok(Category::Fantasy));
        assert_eq!(" Science ".parse::<Category>(), Ok(Category::Science));
        assert!("Cooking".parse::<Category>().is_err());
    }

    #[test]
    fn unknown_categories_coerce_to_other() {
        assert_eq!(Category::coerce(Some("Cooking")), Category::Other);
        assert_eq!(Category::coerce(None), Category::Other);
        assert_eq!(Category::coerce(Some("History")), Category::History);
    }

    #[test]
    fn book_ids_classify_by_shape() {
        assert_eq!(BookId::parse("mb_x"), Ok(BookId::Owned("mb_x".into())));
        assert_eq!(
            BookId::parse("OL45804W"),
            Ok(BookId::Catalog("OL45804W".into()))
        );
        assert_eq!(BookId::parse("OL7353617M"), Ok(BookId::Catalog("OL7353617M".into())));
        assert_eq!(BookId::parse("mb_"), Ok(BookId::Unclassified("mb_".into())));
        assert_eq!(BookId::parse("mb_ !"), Ok(BookId::Unclassified("mb_ !".into())));
        assert_eq!(BookId::parse("mb_é"), Ok(BookId::Unclassified("mb_é".into())));
        assert_eq!(BookId::parse("mb_a-b"), Ok(BookId::Unclassified("mb_a-b".into())));
        assert_eq!(BookId::parse("OLW"), Ok(BookId::Unclassified("OLW".into())));
        assert_eq!(
            BookId::parse("legacy-42"),
            Ok(BookId::Unclassified("legacy-42".into()))
        );
        assert_eq!(BookId::parse("  "), Err(EmptyBookId));
    }

    #[test]
    fn cards_serialize_with_lowercase_source() {
        let card = BookCard {
            id: "OL1W".into(),
            title: "Dune".into(),
            price: 9.0,
            thumbnail: "https://placehold.co/300x400".into(),
            author: "Frank Herbert".into(),
            category: Category::Fantasy,
            source: BookSource::Catalog,
        };
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["source"], "catalog");
        assert_eq!(json["category"], "Fantasy");
    }
}
