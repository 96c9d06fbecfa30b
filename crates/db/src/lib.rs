//! In-memory tables for the bookshelf stores.
//!
//! A [`MemoryTable`] keeps rows in insertion order behind a single
//! `RwLock`: reads share the lock, every mutation takes it exclusively, so a
//! reader never observes a row halfway through a change.

use thiserror::Error;
use tokio::sync::RwLock;

/// A row addressable by a string key.
pub trait Row: Clone + Send + Sync {
    fn key(&self) -> &str;
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DbError {
    #[error("duplicate key '{key}' in table '{table}'")]
    DuplicateKey { table: &'static str, key: String },

    #[error("no row '{key}' in table '{table}'")]
    Missing { table: &'static str, key: String },
}

pub struct MemoryTable<R> {
    name: &'static str,
    rows: RwLock<Vec<R>>,
}

impl<R: Row> MemoryTable<R> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rows: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn insert(&self, row: R) -> Result<(), DbError> {
        let mut rows = self.rows.write().await;
        if rows.iter().any(|r| r.key() == row.key()) {
            return Err(DbError::DuplicateKey {
                table: self.name,
                key: row.key().to_string(),
            });
        }
        tracing::debug!(target: "bookshelf-db", table = self.name, key = row.key(), "insert");
        rows.push(row);
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Option<R> {
        self.rows.read().await.iter().find(|r| r.key() == key).cloned()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.rows.read().await.iter().any(|r| r.key() == key)
    }

    /// Rows matching `pred`, in insertion order.
    pub async fn scan<F>(&self, pred: F) -> Vec<R>
    where
        F: Fn(&R) -> bool,
    {
        self.rows
            .read()
            .await
            .iter()
            .filter(|r| pred(r))
            .cloned()
            .collect()
    }

    /// Run `f` against the row under the write lock.
    ///
    /// `f` may reject the change by returning `Err`; the row is only
    /// modified by whatever `f` did before returning. Callers that validate
    /// must therefore validate before touching the row.
    pub async fn update<T, E, F>(&self, key: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut R) -> Result<T, E>,
        E: From<DbError>,
    {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.key() == key)
            .ok_or_else(|| DbError::Missing {
                table: self.name,
                key: key.to_string(),
            })?;
        tracing::debug!(target: "bookshelf-db", table = self.name, key, "update");
        f(row)
    }

    /// Remove the row once `check` accepts it, atomically.
    pub async fn remove_if<E, F>(&self, key: &str, check: F) -> Result<R, E>
    where
        F: FnOnce(&R) -> Result<(), E>,
        E: From<DbError>,
    {
        let mut rows = self.rows.write().await;
        let index = rows
            .iter()
            .position(|r| r.key() == key)
            .ok_or_else(|| DbError::Missing {
                table: self.name,
                key: key.to_string(),
            })?;
        check(&rows[index])?;
        tracing::debug!(target: "bookshelf-db", table = self.name, key, "remove");
        Ok(rows.remove(index))
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    pub async fn clear(&self) {
        let mut rows = self.rows.write().await;
        tracing::info!(target: "bookshelf-db", table = self.name, rows = rows.len(), "clearing table");
        rows.clear();
    }
}
