use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bookshelf_authz::SessionRegistry;
use bookshelf_kernel::settings::Settings;

use crate::modules::books::catalog::{CatalogProvider, OpenLibraryClient};
use crate::modules::my_books::service::MyBooksService;
use crate::modules::my_books::store::InMemoryBookStore;
use crate::modules::users::directory::UserDirectory;

/// Shared handles every module router is built with.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub users: Arc<UserDirectory>,
    pub my_books: Arc<MyBooksService>,
    pub catalog: Arc<dyn CatalogProvider>,
    pub session_cookie: Arc<str>,
}

impl AppState {
    /// Production wiring: in-memory store, Open Library catalog.
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let catalog = OpenLibraryClient::new(&settings.catalog)
            .context("failed to build catalog client")?;
        Ok(Self::with_catalog(settings, Arc::new(catalog)).await)
    }

    pub async fn with_catalog(settings: &Settings, catalog: Arc<dyn CatalogProvider>) -> Self {
        let users = Arc::new(UserDirectory::from_seed(&settings.auth.users).await);
        let my_books = Arc::new(MyBooksService::new(
            Arc::new(InMemoryBookStore::new()),
            users.clone(),
            settings.catalog.placeholder_url.clone(),
        ));
        Self {
            sessions: Arc::new(SessionRegistry::with_ttl(Duration::from_secs(
                settings.auth.session_ttl_secs,
            ))),
            users,
            my_books,
            catalog,
            session_cookie: Arc::from(settings.auth.session_cookie.as_str()),
        }
    }
}
