use std::sync::Arc;

use bookshelf_authz::{assert_owner, require_identity, Identity};
use bookshelf_events::EventBus;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::events::{BookEvent, InvalidationLog, OwnedCounts};
use super::models::{BookPatch, BookRecord, NewBook};
use super::store::BookStore;
use crate::error::BookshelfError;
use crate::modules::books::models::{BookCard, BookSource, OWNED_ID_PREFIX};
use crate::modules::users::directory::UserDirectory;
use crate::query::{self, ListParams, Page};

const ID_SUFFIX_LEN: usize = 12;
const ID_ATTEMPTS: usize = 8;

/// Owned-book operations: authorization, validation, persistence and the
/// events every committed mutation publishes.
pub struct MyBooksService {
    store: Arc<dyn BookStore>,
    users: Arc<UserDirectory>,
    counts: Arc<OwnedCounts>,
    events: EventBus<BookEvent>,
    placeholder_url: String,
}

impl MyBooksService {
    pub fn new(
        store: Arc<dyn BookStore>,
        users: Arc<UserDirectory>,
        placeholder_url: impl Into<String>,
    ) -> Self {
        let counts = Arc::new(OwnedCounts::new());
        let events = EventBus::new()
            .with_listener(counts.clone())
            .with_listener(Arc::new(InvalidationLog));
        Self {
            store,
            users,
            counts,
            events,
            placeholder_url: placeholder_url.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn BookStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookEvent> {
        self.events.subscribe()
    }

    /// Rebuild the per-owner counters from what the store holds.
    pub async fn sync_counts(&self) {
        self.counts.reset(self.store.owner_counts().await);
    }

    pub fn count(&self, caller: Option<Identity>) -> Result<usize, BookshelfError> {
        let caller = require_identity(caller)?;
        Ok(self.counts.get(&caller.user_id))
    }

    pub async fn list(
        &self,
        caller: Option<Identity>,
        params: &ListParams,
    ) -> Result<Page<BookCard>, BookshelfError> {
        let caller = require_identity(caller)?;
        let records = self.store.list_by_owner(&caller.user_id).await?;
        let page = query::run(records, params, BookSource::Owned);
        Ok(page.map(|record| record.to_card(&self.placeholder_url)))
    }

    pub async fn create(
        &self,
        caller: Option<Identity>,
        input: NewBook,
    ) -> Result<BookRecord, BookshelfError> {
        let caller = require_identity(caller)?;
        let book = input.validate()?;

        let now = OffsetDateTime::now_utc();
        let record = BookRecord {
            id: self.next_id().await?,
            title: book.title,
            author: book.author,
            description: book.description,
            price: book.price,
            cover_image: book.cover_image,
            category: book.category,
            owner_display_name: self.users.display_name(&caller.user_id).await,
            owner_id: caller.user_id,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(record.clone()).await?;

        tracing::info!(
            target: "bookshelf::my_books",
            book_id = %record.id,
            owner_id = %record.owner_id,
            "book created"
        );
        self.events.publish(BookEvent::Created {
            owner_id: record.owner_id.clone(),
            book_id: record.id.clone(),
        });
        Ok(record)
    }

    /// Create from a catalog card unless the caller already owns a book with
    /// the same title and author.
    pub async fn import(
        &self,
        caller: Option<Identity>,
        input: NewBook,
    ) -> Result<BookRecord, BookshelfError> {
        let identity = require_identity(caller)?;
        if let (Some(title), Some(author)) = (input.title.as_deref(), input.author.as_deref()) {
            match self.store.list_by_owner(&identity.user_id).await {
                Ok(owned) => {
                    if owned
                        .iter()
                        .any(|r| same_text(&r.title, title) && same_text(&r.author, author))
                    {
                        return Err(BookshelfError::AlreadyAdded {
                            title: title.trim().to_string(),
                            author: author.trim().to_string(),
                        });
                    }
                }
                // The duplicate check is advisory; a failed scan does not block the import.
                Err(err) => {
                    tracing::warn!(target: "bookshelf::my_books", error = %err, "duplicate check skipped");
                }
            }
        }
        self.create(Some(identity), input).await
    }

    pub async fn get(&self, caller: Option<Identity>, id: &str) -> Result<BookRecord, BookshelfError> {
        let caller = require_identity(caller)?;
        let record = self.store.get(id).await?;
        assert_owner(&record.owner_id, &caller)?;
        Ok(record)
    }

    pub async fn update(
        &self,
        caller: Option<Identity>,
        id: &str,
        patch: BookPatch,
    ) -> Result<BookRecord, BookshelfError> {
        let caller = require_identity(caller)?;
        let record = self
            .store
            .update(id, &caller, &patch, OffsetDateTime::now_utc())
            .await?;

        tracing::info!(target: "bookshelf::my_books", book_id = %record.id, "book updated");
        self.events.publish(BookEvent::Updated {
            owner_id: record.owner_id.clone(),
            book_id: record.id.clone(),
        });
        Ok(record)
    }

    pub async fn delete(&self, caller: Option<Identity>, id: &str) -> Result<(), BookshelfError> {
        let caller = require_identity(caller)?;
        let removed = self.store.delete(id, &caller).await?;

        tracing::info!(target: "bookshelf::my_books", book_id = %removed.id, "book deleted");
        self.events.publish(BookEvent::Deleted {
            owner_id: removed.owner_id,
            book_id: removed.id,
        });
        Ok(())
    }

    pub async fn clear(&self) {
        self.store.clear().await;
        self.counts.reset(Default::default());
    }

    async fn next_id(&self) -> Result<String, BookshelfError> {
        for _ in 0..ID_ATTEMPTS {
            let suffix = Uuid::new_v4().simple().to_string();
            let id = format!("{OWNED_ID_PREFIX}{}", &suffix[..ID_SUFFIX_LEN]);
            if !self.store.contains(&id).await {
                return Ok(id);
            }
        }
        Err(anyhow::anyhow!("could not allocate a unique book id").into())
    }
}

fn same_text(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::modules::books::models::Category;
    use std::collections::HashMap;

    use crate::modules::my_books::store::InMemoryBookStore;
    use crate::query::RawListParams;
    use async_trait::async_trait;
    use bookshelf_kernel::settings::SeedUser;
    use serde_json::json;

    pub(crate) async fn service() -> MyBooksService {
        service_over(Arc::new(InMemoryBookStore::new())).await
    }

    async fn service_over(store: Arc<dyn BookStore>) -> MyBooksService {
        let users = UserDirectory::from_seed(&[
            SeedUser {
                id: "A".into(),
                name: "Alice".into(),
                email: "alice@books.com".into(),
                password: "pw".into(),
            },
            SeedUser {
                id: "B".into(),
                name: "Bob".into(),
                email: "bob@books.com".into(),
                password: "pw".into(),
            },
        ])
        .await;
        MyBooksService::new(
            store,
            Arc::new(users),
            "https://placehold.co/300x400",
        )
    }

    /// Store whose owner scan always fails; everything else is in memory.
    #[derive(Default)]
    struct ScanFails(InMemoryBookStore);

    #[async_trait]
    impl BookStore for ScanFails {
        async fn list_by_owner(&self, _owner_id: &str) -> Result<Vec<BookRecord>, BookshelfError> {
            Err(BookshelfError::Internal(anyhow::anyhow!("scan unavailable")))
        }

        async fn insert(&self, record: BookRecord) -> Result<(), BookshelfError> {
            self.0.insert(record).await
        }

        async fn contains(&self, id: &str) -> bool {
            self.0.contains(id).await
        }

        async fn get(&self, id: &str) -> Result<BookRecord, BookshelfError> {
            self.0.get(id).await
        }

        async fn update(
            &self,
            id: &str,
            caller: &Identity,
            patch: &BookPatch,
            now: OffsetDateTime,
        ) -> Result<BookRecord, BookshelfError> {
            self.0.update(id, caller, patch, now).await
        }

        async fn delete(&self, id: &str, caller: &Identity) -> Result<BookRecord, BookshelfError> {
            self.0.delete(id, caller).await
        }

        async fn owner_counts(&self) -> HashMap<String, usize> {
            self.0.owner_counts().await
        }

        async fn clear(&self) {
            self.0.clear().await
        }
    }

    fn alice() -> Option<Identity> {
        Some(Identity::new("A"))
    }

    fn bob() -> Option<Identity> {
        Some(Identity::new("B"))
    }

    fn foo_bar() -> NewBook {
        NewBook {
            title: Some("Foo".into()),
            author: Some("Bar".into()),
            price: Some(json!(12.5)),
            ..NewBook::default()
        }
    }

    #[tokio::test]
    async fn create_stamps_owner_and_defaults() {
        let svc = service().await;
        let mut events = svc.subscribe();

        let record = svc.create(alice(), foo_bar()).await.unwrap();
        assert!(record.id.starts_with("mb_"));
        assert_eq!(record.id.len(), OWNED_ID_PREFIX.len() + ID_SUFFIX_LEN);
        assert_eq!(record.owner_id, "A");
        assert_eq!(record.owner_display_name, "Alice");
        assert_eq!(record.category, Category::Other);
        assert_eq!(record.description, "");
        assert_eq!(record.created_at, record.updated_at);

        let page = svc.list(alice(), &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(svc.count(alice()).unwrap(), 1);
        assert_eq!(
            events.recv().await.unwrap(),
            BookEvent::Created {
                owner_id: "A".into(),
                book_id: record.id.clone()
            }
        );
    }

    #[tokio::test]
    async fn empty_title_persists_nothing() {
        let svc = service().await;
        let err = svc
            .create(
                alice(),
                NewBook {
                    title: Some(String::new()),
                    ..foo_bar()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookshelfError::Validation(_)));
        assert_eq!(svc.list(alice(), &ListParams::default()).await.unwrap().total, 0);
        assert_eq!(svc.count(alice()).unwrap(), 0);
    }

    #[tokio::test]
    async fn anonymous_callers_are_rejected_first() {
        let svc = service().await;
        assert!(matches!(
            svc.create(None, NewBook::default()).await,
            Err(BookshelfError::Unauthenticated)
        ));
        assert!(matches!(
            svc.list(None, &ListParams::default()).await,
            Err(BookshelfError::Unauthenticated)
        ));
        assert!(matches!(
            svc.delete(None, "mb_ghost").await,
            Err(BookshelfError::Unauthenticated)
        ));
        assert!(matches!(svc.count(None), Err(BookshelfError::Unauthenticated)));
    }

    #[tokio::test]
    async fn other_owner_cannot_touch_a_book() {
        let svc = service().await;
        let record = svc.create(alice(), foo_bar()).await.unwrap();

        let patch = BookPatch {
            title: Some("Hijacked".into()),
            ..BookPatch::default()
        };
        assert!(matches!(
            svc.update(bob(), &record.id, patch).await,
            Err(BookshelfError::Forbidden)
        ));
        assert!(matches!(
            svc.get(bob(), &record.id).await,
            Err(BookshelfError::Forbidden)
        ));
        assert!(matches!(
            svc.delete(bob(), &record.id).await,
            Err(BookshelfError::Forbidden)
        ));

        assert_eq!(svc.get(alice(), &record.id).await.unwrap(), record);
        assert_eq!(svc.count(alice()).unwrap(), 1);
    }

    #[tokio::test]
    async fn owner_updates_and_deletes() {
        let svc = service().await;
        let record = svc.create(alice(), foo_bar()).await.unwrap();

        let updated = svc
            .update(
                alice(),
                &record.id,
                BookPatch {
                    category: Some("History".into()),
                    ..BookPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.category, Category::History);
        assert_eq!(updated.title, "Foo");
        assert_eq!(updated.created_at, record.created_at);
        assert!(updated.updated_at >= record.updated_at);

        svc.delete(alice(), &record.id).await.unwrap();
        assert!(svc.get(alice(), &record.id).await.unwrap_err().is_not_found());
        assert_eq!(svc.count(alice()).unwrap(), 0);
    }

    #[tokio::test]
    async fn deleting_missing_book_is_not_found() {
        let svc = service().await;
        let err = svc.delete(alice(), "mb_ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn import_rejects_case_insensitive_duplicates() {
        let svc = service().await;
        svc.import(alice(), foo_bar()).await.unwrap();

        let err = svc
            .import(
                alice(),
                NewBook {
                    title: Some("  foo ".into()),
                    author: Some("BAR".into()),
                    ..NewBook::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookshelfError::AlreadyAdded { .. }));

        // Another owner may import the same book.
        svc.import(bob(), foo_bar()).await.unwrap();
        assert_eq!(svc.count(alice()).unwrap(), 1);
        assert_eq!(svc.count(bob()).unwrap(), 1);
    }

    #[tokio::test]
    async fn import_proceeds_when_duplicate_scan_fails() {
        let svc = service_over(Arc::new(ScanFails::default())).await;

        let first = svc.import(alice(), foo_bar()).await.unwrap();
        let second = svc.import(alice(), foo_bar()).await.unwrap();

        assert_ne!(first.id, second.id);
        assert!(svc.store().contains(&first.id).await);
        assert!(svc.store().contains(&second.id).await);
        assert_eq!(svc.count(alice()).unwrap(), 2);
    }

    #[tokio::test]
    async fn list_applies_query_and_projects_cards() {
        let svc = service().await;
        for (title, category) in [("Dune", "Fantasy"), ("Cosmos", "Science"), ("Emma", "Other")] {
            svc.create(
                alice(),
                NewBook {
                    title: Some(title.into()),
                    author: Some("Someone".into()),
                    category: Some(category.into()),
                    ..NewBook::default()
                },
            )
            .await
            .unwrap();
        }

        let params = ListParams::from_raw(RawListParams {
            sort: Some("desc".into()),
            limit: Some("2".into()),
            ..RawListParams::default()
        })
        .unwrap();
        let page = svc.list(alice(), &params).await.unwrap();
        assert_eq!(page.total, 3);
        let titles: Vec<_> = page.data.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Emma", "Dune"]);
        assert!(page.data.iter().all(|c| c.source == BookSource::Owned));
        assert_eq!(page.data[0].thumbnail, "https://placehold.co/300x400");
    }

    #[tokio::test]
    async fn sync_counts_reads_the_store() {
        let svc = service().await;
        svc.create(alice(), foo_bar()).await.unwrap();
        svc.clear().await;
        assert_eq!(svc.count(alice()).unwrap(), 0);

        svc.store()
            .insert(BookRecord {
                id: "mb_seeded".into(),
                title: "Seeded".into(),
                author: "Someone".into(),
                description: String::new(),
                price: 0.0,
                cover_image: None,
                category: Category::Other,
                owner_id: "B".into(),
                owner_display_name: "Bob".into(),
                created_at: OffsetDateTime::UNIX_EPOCH,
                updated_at: OffsetDateTime::UNIX_EPOCH,
            })
            .await
            .unwrap();
        svc.sync_counts().await;
        assert_eq!(svc.count(bob()).unwrap(), 1);
    }
}
