use std::collections::HashMap;

use async_trait::async_trait;
use bookshelf_authz::{assert_owner, Identity};
use bookshelf_db::MemoryTable;
use time::OffsetDateTime;

use super::models::{BookPatch, BookRecord};
use crate::error::BookshelfError;

/// Storage backend for owned books.
///
/// Ownership checks happen inside `update` and `delete` so that the
/// lookup, the check and the write are one atomic step.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// All records owned by `owner_id`, in insertion order.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<BookRecord>, BookshelfError>;

    async fn insert(&self, record: BookRecord) -> Result<(), BookshelfError>;

    async fn contains(&self, id: &str) -> bool;

    async fn get(&self, id: &str) -> Result<BookRecord, BookshelfError>;

    async fn update(
        &self,
        id: &str,
        caller: &Identity,
        patch: &BookPatch,
        now: OffsetDateTime,
    ) -> Result<BookRecord, BookshelfError>;

    async fn delete(&self, id: &str, caller: &Identity) -> Result<BookRecord, BookshelfError>;

    /// Number of records per owner.
    async fn owner_counts(&self) -> HashMap<String, usize>;

    async fn clear(&self);
}

pub struct InMemoryBookStore {
    table: MemoryTable<BookRecord>,
}

impl InMemoryBookStore {
    pub fn new() -> Self {
        Self {
            table: MemoryTable::new("my_books"),
        }
    }
}

impl Default for InMemoryBookStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookStore for InMemoryBookStore {
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<BookRecord>, BookshelfError> {
        Ok(self.table.scan(|r| r.owner_id == owner_id).await)
    }

    async fn insert(&self, record: BookRecord) -> Result<(), BookshelfError> {
        Ok(self.table.insert(record).await?)
    }

    async fn contains(&self, id: &str) -> bool {
        self.table.contains(id).await
    }

    async fn get(&self, id: &str) -> Result<BookRecord, BookshelfError> {
        self.table
            .get(id)
            .await
            .ok_or_else(|| BookshelfError::not_found(id))
    }

    async fn update(
        &self,
        id: &str,
        caller: &Identity,
        patch: &BookPatch,
        now: OffsetDateTime,
    ) -> Result<BookRecord, BookshelfError> {
        self.table
            .update(id, |record: &mut BookRecord| -> Result<BookRecord, BookshelfError> {
                assert_owner(&record.owner_id, caller)?;
                patch.apply_to(record, now)?;
                Ok(record.clone())
            })
            .await
    }

    async fn delete(&self, id: &str, caller: &Identity) -> Result<BookRecord, BookshelfError> {
        self.table
            .remove_if(id, |record| {
                assert_owner(&record.owner_id, caller).map_err(BookshelfError::from)
            })
            .await
    }

    async fn owner_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for record in self.table.scan(|_| true).await {
            *counts.entry(record.owner_id).or_insert(0) += 1;
        }
        counts
    }

    async fn clear(&self) {
        self.table.clear().await;
    }
}
