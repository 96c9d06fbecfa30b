//! Detail lookup across both sources.
//!
//! An identifier's shape decides where it is looked up. Owned ids are never
//! sent to the catalog; catalog ids never touch the store. Ids of neither
//! shape try the caller's own books first and fall back to the catalog only
//! when the store has nothing under that id.

use bookshelf_authz::{require_identity, Identity};
use serde::Serialize;

use super::catalog::{CatalogDetail, CatalogProvider};
use super::models::BookId;
use crate::error::BookshelfError;
use crate::modules::my_books::models::BookRecord;
use crate::modules::my_books::service::MyBooksService;

/// Detail payload tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum BookDetail {
    Owned {
        #[serde(flatten)]
        book: BookRecord,
        editable: bool,
    },
    Catalog {
        #[serde(flatten)]
        book: CatalogDetail,
        editable: bool,
    },
}

impl BookDetail {
    fn owned(book: BookRecord) -> Self {
        BookDetail::Owned {
            book,
            editable: true,
        }
    }

    fn catalog(book: CatalogDetail) -> Self {
        BookDetail::Catalog {
            book,
            editable: false,
        }
    }

    pub fn editable(&self) -> bool {
        match self {
            BookDetail::Owned { editable, .. } | BookDetail::Catalog { editable, .. } => *editable,
        }
    }
}

pub async fn resolve_detail(
    id: &BookId,
    caller: Option<Identity>,
    owned: &MyBooksService,
    catalog: &dyn CatalogProvider,
) -> Result<BookDetail, BookshelfError> {
    match id {
        BookId::Owned(raw) => {
            let caller = require_identity(caller)?;
            let book = owned.get(Some(caller), raw).await?;
            Ok(BookDetail::owned(book))
        }
        BookId::Catalog(raw) => Ok(BookDetail::catalog(catalog.detail(raw).await?)),
        BookId::Unclassified(raw) => {
            if caller.is_some() {
                match owned.get(caller, raw).await {
                    Ok(book) => return Ok(BookDetail::owned(book)),
                    Err(err) if err.is_not_found() => {
                        tracing::debug!(
                            target: "bookshelf::books",
                            id = %raw,
                            "not in the store, trying the catalog"
                        );
                    }
                    Err(err) => return Err(err),
                }
            }
            Ok(BookDetail::catalog(catalog.detail(raw).await?))
        }
    }
}
