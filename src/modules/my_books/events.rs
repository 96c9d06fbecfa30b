use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use bookshelf_events::Listener;
use serde::Serialize;

/// Emitted after an owned-book mutation has been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BookEvent {
    Created { owner_id: String, book_id: String },
    Updated { owner_id: String, book_id: String },
    Deleted { owner_id: String, book_id: String },
}

/// Cached views a mutation makes stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum CacheKey {
    OwnedList { owner_id: String },
    OwnedDetail { book_id: String },
}

impl BookEvent {
    pub fn owner_id(&self) -> &str {
        match self {
            BookEvent::Created { owner_id, .. }
            | BookEvent::Updated { owner_id, .. }
            | BookEvent::Deleted { owner_id, .. } => owner_id,
        }
    }

    pub fn book_id(&self) -> &str {
        match self {
            BookEvent::Created { book_id, .. }
            | BookEvent::Updated { book_id, .. }
            | BookEvent::Deleted { book_id, .. } => book_id,
        }
    }

    /// Every mutation stales the owner's list and the detail view of the book.
    pub fn invalidations(&self) -> Vec<CacheKey> {
        vec![
            CacheKey::OwnedList {
                owner_id: self.owner_id().to_string(),
            },
            CacheKey::OwnedDetail {
                book_id: self.book_id().to_string(),
            },
        ]
    }
}

/// Per-owner count of owned books, kept current by the event bus.
#[derive(Default)]
pub struct OwnedCounts {
    counts: Mutex<HashMap<String, usize>>,
}

impl OwnedCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, owner_id: &str) -> usize {
        self.lock().get(owner_id).copied().unwrap_or(0)
    }

    /// Replace every count, e.g. from a store scan at startup.
    pub fn reset(&self, counts: HashMap<String, usize>) {
        *self.lock() = counts;
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        // A panicking listener cannot leave the map half-written.
        self.counts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Listener<BookEvent> for OwnedCounts {
    fn on_event(&self, event: &BookEvent) {
        let mut counts = self.lock();
        let count = counts.entry(event.owner_id().to_string()).or_insert(0);
        match event {
            BookEvent::Created { .. } => *count += 1,
            BookEvent::Deleted { .. } => *count = count.saturating_sub(1),
            BookEvent::Updated { .. } => {}
        }
    }
}

/// Logs the cached views each event invalidates.
pub struct InvalidationLog;

impl Listener<BookEvent> for InvalidationLog {
    fn on_event(&self, event: &BookEvent) {
        for key in event.invalidations() {
            tracing::debug!(target: "bookshelf::my_books", ?key, "cache view invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(owner: &str, id: &str) -> BookEvent {
        BookEvent::Created {
            owner_id: owner.into(),
            book_id: id.into(),
        }
    }

    #[test]
    fn invalidations_cover_list_and_detail() {
        let expected = vec![
            CacheKey::OwnedList { owner_id: "1".into() },
            CacheKey::OwnedDetail { book_id: "mb_a".into() },
        ];
        assert_eq!(created("1", "mb_a").invalidations(), expected);

        let deleted = BookEvent::Deleted {
            owner_id: "1".into(),
            book_id: "mb_a".into(),
        };
        assert_eq!(deleted.invalidations(), expected);
    }

    #[test]
    fn counts_track_creates_and_deletes() {
        let counts = OwnedCounts::new();
        counts.on_event(&created("1", "mb_a"));
        counts.on_event(&created("1", "mb_b"));
        counts.on_event(&created("2", "mb_c"));
        counts.on_event(&BookEvent::Updated {
            owner_id: "1".into(),
            book_id: "mb_a".into(),
        });
        counts.on_event(&BookEvent::Deleted {
            owner_id: "1".into(),
            book_id: "mb_a".into(),
        });

        assert_eq!(counts.get("1"), 1);
        assert_eq!(counts.get("2"), 1);
        assert_eq!(counts.get("nobody"), 0);
    }

    #[test]
    fn decrement_saturates_at_zero() {
        let counts = OwnedCounts::new();
        counts.on_event(&BookEvent::Deleted {
            owner_id: "1".into(),
            book_id: "mb_a".into(),
        });
        assert_eq!(counts.get("1"), 0);
    }

    #[test]
    fn reset_replaces_counts() {
        let counts = OwnedCounts::new();
        counts.on_event(&created("1", "mb_a"));
        counts.reset(HashMap::from([("2".to_string(), 4)]));
        assert_eq!(counts.get("1"), 0);
        assert_eq!(counts.get("2"), 4);
    }
}
