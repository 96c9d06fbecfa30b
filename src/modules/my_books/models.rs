use bookshelf_db::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::{BookshelfError, FieldError};
use crate::modules::books::models::{BookCard, BookSource, Category};
use crate::query::Queryable;

/// A book owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub category: Category,
    pub owner_id: String,
    pub owner_display_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl BookRecord {
    pub fn to_card(&self, placeholder_url: &str) -> BookCard {
        BookCard {
            id: self.id.clone(),
            title: self.title.clone(),
            price: self.price,
            thumbnail: self
                .cover_image
                .clone()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| placeholder_url.to_string()),
            author: self.author.clone(),
            category: self.category,
            source: BookSource::Owned,
        }
    }
}

impl Row for BookRecord {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Queryable for BookRecord {
    fn title(&self) -> &str {
        &self.title
    }

    fn author(&self) -> &str {
        &self.author
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn category(&self) -> Category {
        self.category
    }

    fn price(&self) -> f64 {
        self.price
    }
}

/// Creation payload. Everything is optional at the wire level so that
/// missing fields surface as validation errors rather than parse failures.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBook {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub price: Option<Value>,
    pub cover_image: Option<String>,
    /// Accepted in place of `coverImage`, as sent by catalog cards.
    pub thumbnail: Option<String>,
    pub category: Option<String>,
}

/// A creation payload that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidBook {
    pub title: String,
    pub author: String,
    pub description: String,
    pub price: f64,
    pub cover_image: Option<String>,
    pub category: Category,
}

impl NewBook {
    pub fn validate(self) -> Result<ValidBook, BookshelfError> {
        let title = required_text(self.title.as_deref());
        let author = required_text(self.author.as_deref());

        let mut errors = Vec::new();
        if title.is_none() {
            errors.push(FieldError::new("title", "required"));
        }
        if author.is_none() {
            errors.push(FieldError::new("author", "required"));
        }

        match (title, author) {
            (Some(title), Some(author)) => Ok(ValidBook {
                title,
                author,
                description: self.description.unwrap_or_default(),
                price: coerce_price(self.price.as_ref()),
                cover_image: non_empty(self.cover_image).or_else(|| non_empty(self.thumbnail)),
                category: Category::coerce(self.category.as_deref()),
            }),
            _ => Err(BookshelfError::Validation(errors)),
        }
    }
}

/// Partial update. Fields that are absent stay as they are; identity and
/// ownership fields are not part of the payload at all.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub price: Option<Value>,
    pub cover_image: Option<String>,
    pub category: Option<String>,
}

impl BookPatch {
    /// Validate, then merge into `record`. Nothing is written when
    /// validation fails.
    pub fn apply_to(&self, record: &mut BookRecord, now: OffsetDateTime) -> Result<(), BookshelfError> {
        let mut errors = Vec::new();
        let title = self.title.as_deref().map(|t| required_text(Some(t)));
        let author = self.author.as_deref().map(|a| required_text(Some(a)));
        if matches!(title, Some(None)) {
            errors.push(FieldError::new("title", "required"));
        }
        if matches!(author, Some(None)) {
            errors.push(FieldError::new("author", "required"));
        }
        if !errors.is_empty() {
            return Err(BookshelfError::Validation(errors));
        }

        if let Some(Some(title)) = title {
            record.title = title;
        }
        if let Some(Some(author)) = author {
            record.author = author;
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(price) = &self.price {
            record.price = coerce_price(Some(price));
        }
        if let Some(cover_image) = &self.cover_image {
            record.cover_image = non_empty(Some(cover_image.clone()));
        }
        if let Some(category) = &self.category {
            record.category = Category::coerce(Some(category));
        }
        record.updated_at = now;
        Ok(())
    }
}

/// A catalog card the caller wants copied into My Books.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBook {
    pub title: Option<String>,
    pub author: Option<String>,
    pub price: Option<Value>,
    pub thumbnail: Option<String>,
    pub category: Option<String>,
}

impl From<ImportBook> for NewBook {
    fn from(card: ImportBook) -> Self {
        NewBook {
            title: card.title,
            author: card.author,
            description: Some(String::new()),
            price: card.price,
            cover_image: None,
            thumbnail: card.thumbnail,
            category: card.category,
        }
    }
}

fn required_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.filter(|s| !s.trim().is_empty())
}

/// Numbers and numeric strings are accepted; anything else, and anything
/// negative or non-finite, becomes 0.
pub fn coerce_price(raw: Option<&Value>) -> f64 {
    let price = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    price.filter(|p| p.is_finite() && *p >= 0.0).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> BookRecord {
        let at = OffsetDateTime::UNIX_EPOCH;
        BookRecord {
            id: "mb_test".into(),
            title: "Foo".into(),
            author: "Bar".into(),
            description: String::new(),
            price: 12.5,
            cover_image: None,
            category: Category::Other,
            owner_id: "1".into(),
            owner_display_name: "Admin".into(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn price_coercion() {
        assert_eq!(coerce_price(Some(&json!(12.5))), 12.5);
        assert_eq!(coerce_price(Some(&json!("7"))), 7.0);
        assert_eq!(coerce_price(Some(&json!("seven"))), 0.0);
        assert_eq!(coerce_price(Some(&json!(-3))), 0.0);
        assert_eq!(coerce_price(Some(&json!(true))), 0.0);
        assert_eq!(coerce_price(None), 0.0);
    }

    #[test]
    fn new_book_requires_trimmed_title_and_author() {
        let err = NewBook {
            title: Some("   ".into()),
            author: None,
            ..NewBook::default()
        }
        .validate()
        .unwrap_err();
        match err {
            BookshelfError::Validation(fields) => {
                assert_eq!(
                    fields,
                    vec![
                        FieldError::new("title", "required"),
                        FieldError::new("author", "required")
                    ]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn new_book_defaults() {
        let book: NewBook = serde_json::from_value(json!({
            "title": "  Foo ",
            "author": "Bar",
            "price": "oops",
            "thumbnail": "https://covers.example/1.jpg",
            "category": "Cooking"
        }))
        .unwrap();
        let valid = book.validate().unwrap();
        assert_eq!(valid.title, "Foo");
        assert_eq!(valid.description, "");
        assert_eq!(valid.price, 0.0);
        assert_eq!(valid.cover_image.as_deref(), Some("https://covers.example/1.jpg"));
        assert_eq!(valid.category, Category::Other);
    }

    #[test]
    fn cover_image_wins_over_thumbnail() {
        let book: NewBook = serde_json::from_value(json!({
            "title": "Foo",
            "author": "Bar",
            "coverImage": "https://a/cover.jpg",
            "thumbnail": "https://b/thumb.jpg"
        }))
        .unwrap();
        assert_eq!(
            book.validate().unwrap().cover_image.as_deref(),
            Some("https://a/cover.jpg")
        );
    }

    #[test]
    fn patch_merges_only_provided_fields() {
        let mut rec = record();
        let patch: BookPatch = serde_json::from_value(json!({
            "price": 20,
            "category": "Science",
            "ownerId": "intruder",
            "id": "mb_other",
            "createdAt": "2030-01-01T00:00:00Z"
        }))
        .unwrap();
        let now = OffsetDateTime::UNIX_EPOCH + time::Duration::hours(1);
        patch.apply_to(&mut rec, now).unwrap();

        assert_eq!(rec.price, 20.0);
        assert_eq!(rec.category, Category::Science);
        assert_eq!(rec.title, "Foo");
        assert_eq!(rec.owner_id, "1");
        assert_eq!(rec.id, "mb_test");
        assert_eq!(rec.created_at, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(rec.updated_at, now);
    }

    #[test]
    fn invalid_patch_writes_nothing() {
        let mut rec = record();
        let patch = BookPatch {
            title: Some(" ".into()),
            price: Some(json!(99)),
            ..BookPatch::default()
        };
        let err = patch.apply_to(&mut rec, OffsetDateTime::now_utc()).unwrap_err();
        assert!(matches!(err, BookshelfError::Validation(_)));
        assert_eq!(rec, record());
    }

    #[test]
    fn owned_cards_use_placeholder_without_cover() {
        let card = record().to_card("https://placehold.co/300x400");
        assert_eq!(card.thumbnail, "https://placehold.co/300x400");
        assert_eq!(card.source, BookSource::Owned);

        let mut rec = record();
        rec.cover_image = Some("https://x/c.jpg".into());
        assert_eq!(rec.to_card("p").thumbnail, "https://x/c.jpg");
    }

    #[test]
    fn records_serialize_camel_case_rfc3339() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["ownerId"], "1");
        assert_eq!(json["ownerDisplayName"], "Admin");
        assert_eq!(json["createdAt"], "1970-01-01T00:00:00Z");
        assert!(json.get("coverImage").is_none());
    }
}
