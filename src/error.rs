//! Domain errors shared by the bookshelf modules.

use bookshelf_authz::AuthzError;
use bookshelf_db::DbError;
use bookshelf_http::AppError;
use serde_json::json;
use thiserror::Error;

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub error: &'static str,
}

impl FieldError {
    pub const fn new(field: &'static str, error: &'static str) -> Self {
        Self { field, error }
    }
}

#[derive(Error, Debug)]
pub enum BookshelfError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("caller does not own this book")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid input")]
    Validation(Vec<FieldError>),

    #[error("'{title}' by {author} is already in the collection")]
    AlreadyAdded { title: String, author: String },

    #[error("catalog request failed: {message}")]
    UpstreamUnavailable { status: Option<u16>, message: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BookshelfError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<AuthzError> for BookshelfError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Unauthenticated => Self::Unauthenticated,
            AuthzError::Forbidden => Self::Forbidden,
        }
    }
}

impl From<DbError> for BookshelfError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Missing { key, .. } => Self::NotFound(key),
            other => Self::Internal(other.into()),
        }
    }
}

impl From<BookshelfError> for AppError {
    fn from(err: BookshelfError) -> Self {
        match err {
            BookshelfError::Unauthenticated => AppError::unauthorized("Unauthorized"),
            BookshelfError::Forbidden => AppError::forbidden("Forbidden"),
            BookshelfError::NotFound(_) => AppError::not_found("Not found"),
            BookshelfError::Validation(fields) => AppError::validation(
                fields
                    .iter()
                    .map(|f| json!({ "field": f.field, "error": f.error }))
                    .collect(),
                "Validation failed",
            ),
            BookshelfError::AlreadyAdded { title, author } => AppError::conflict(
                "already_added",
                vec![json!({ "title": title, "author": author })],
                "Book is already in My Books",
            ),
            BookshelfError::UpstreamUnavailable { status, message } => {
                AppError::upstream(status, message)
            }
            BookshelfError::Internal(e) => AppError::Internal(e),
        }
    }
}
