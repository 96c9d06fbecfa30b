//! Bookshelf application library.
//!
//! Owned books, Open Library search and the session layer, packaged as
//! kernel modules mounted under `/api/{name}`.

pub mod error;
pub mod extract;
pub mod modules;
pub mod query;
pub mod state;

use anyhow::Context;
use bookshelf_kernel::{settings::Settings, InitCtx, ModuleRegistry};

pub use error::BookshelfError;
pub use state::AppState;

/// Registry with every module registered against `state`.
pub fn build_registry(state: &AppState) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, state);
    registry
}

/// Serve until ctrl-c, then stop modules in reverse order.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let state = AppState::from_settings(&settings).await?;
    let registry = build_registry(&state);
    let ctx = InitCtx { settings: &settings };

    registry.init_all(&ctx).await?;
    registry.start_all(&ctx).await?;

    let served = bookshelf_http::start_server(&registry, &settings, shutdown_signal()).await;
    registry.stop_all().await.context("module shutdown failed")?;
    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
