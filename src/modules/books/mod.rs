pub mod catalog;
pub mod models;
pub mod resolve;

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::{routing::get, Json, Router};
use bookshelf_http::AppError;
use bookshelf_kernel::{InitCtx, Module};
use serde_json::json;

use crate::error::BookshelfError;
use crate::extract::Caller;
use crate::query::{ListParams, Page, RawListParams};
use crate::state::AppState;
use models::{BookCard, BookId};
use resolve::BookDetail;

/// Catalog search and detail lookup for any book id.
pub struct BooksModule {
    state: AppState,
}

impl BooksModule {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            catalog = %ctx.settings.catalog.base_url,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/", get(search_books))
            .route("/{id}", get(book_detail))
            .with_state(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "Search the catalog",
                        "tags": ["Books"],
                        "parameters": list_parameters(),
                        "responses": {
                            "200": {
                                "description": "One page of catalog cards",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/BookPage" }
                                    }
                                }
                            },
                            "422": error_response("Unknown category"),
                            "502": error_response("Catalog unavailable")
                        }
                    }
                },
                "/{id}": {
                    "get": {
                        "summary": "Book detail, owned or catalog",
                        "tags": ["Books"],
                        "parameters": [{
                            "name": "id",
                            "in": "path",
                            "required": true,
                            "schema": { "type": "string" }
                        }],
                        "responses": {
                            "200": {
                                "description": "Detail tagged with its source",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/BookDetail" }
                                    }
                                }
                            },
                            "401": error_response("Owned id without a session"),
                            "403": error_response("Owned by someone else"),
                            "404": error_response("No such book")
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "BookCard": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "title": { "type": "string" },
                            "price": { "type": "number" },
                            "thumbnail": { "type": "string", "format": "uri" },
                            "author": { "type": "string" },
                            "category": { "$ref": "#/components/schemas/Category" },
                            "source": { "type": "string", "enum": ["owned", "catalog"] }
                        },
                        "required": ["id", "title", "price", "thumbnail", "author", "category", "source"]
                    },
                    "BookPage": {
                        "type": "object",
                        "properties": {
                            "data": {
                                "type": "array",
                                "items": { "$ref": "#/components/schemas/BookCard" }
                            },
                            "total": { "type": "integer" },
                            "page": { "type": "integer" },
                            "limit": { "type": "integer" },
                            "message": { "type": "string" }
                        },
                        "required": ["data", "total", "page", "limit"]
                    },
                    "BookDetail": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "title": { "type": "string" },
                            "description": { "type": "string" },
                            "price": { "type": "number" },
                            "category": { "$ref": "#/components/schemas/Category" },
                            "source": { "type": "string", "enum": ["owned", "catalog"] },
                            "editable": { "type": "boolean" }
                        },
                        "required": ["id", "title", "source", "editable"]
                    },
                    "Category": {
                        "type": "string",
                        "enum": ["Technology", "Science", "History", "Fantasy", "Biography", "Other"]
                    }
                }
            }
        }))
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

pub(crate) fn list_parameters() -> serde_json::Value {
    let param = |name: &str, kind: &str| {
        json!({ "name": name, "in": "query", "required": false, "schema": { "type": kind } })
    };
    json!([
        param("q", "string"),
        param("page", "integer"),
        param("limit", "integer"),
        param("sort", "string"),
        param("category", "string"),
        param("minPrice", "number"),
        param("maxPrice", "number"),
    ])
}

pub(crate) fn error_response(description: &str) -> serde_json::Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/ErrorResponse" }
            }
        }
    })
}

async fn search_books(
    State(state): State<AppState>,
    Query(raw): Query<RawListParams>,
) -> Result<Json<Page<BookCard>>, AppError> {
    let params = ListParams::from_raw(raw)?;
    let page = catalog::search_page(state.catalog.as_ref(), &params).await?;
    Ok(Json(page))
}

async fn book_detail(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<BookDetail>, AppError> {
    let id = BookId::parse(&id).map_err(|_| BookshelfError::not_found("book"))?;
    let detail =
        resolve::resolve_detail(&id, caller, &state.my_books, state.catalog.as_ref()).await?;
    Ok(Json(detail))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use bookshelf_kernel::settings::Settings;
    use tower::ServiceExt;

    use super::*;
    use crate::modules::books::catalog::fake::{self, FakeCatalog};
    use crate::modules::books::models::Category;

    async fn router(catalog: FakeCatalog) -> (Router, Arc<FakeCatalog>) {
        let catalog = Arc::new(catalog);
        let state = AppState::with_catalog(&Settings::default(), catalog.clone()).await;
        (BooksModule::new(state).routes(), catalog)
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn short_terms_never_reach_the_catalog() {
        let (router, catalog) = router(FakeCatalog::default()).await;
        let (status, body) = get_json(router, "/?q=ab").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));
        assert_eq!(body["total"], 0);
        assert_eq!(body["message"], "Search query must be at least 3 characters");
        assert_eq!(catalog.searches(), 0);
    }

    #[tokio::test]
    async fn search_filters_and_sorts_one_upstream_page() {
        let cards = vec![
            fake::card("OL3W", "Dune", "Frank Herbert", Category::Fantasy),
            fake::card("OL1W", "Cosmos", "Carl Sagan", Category::Science),
            fake::card("OL2W", "Anathem", "Neal Stephenson", Category::Fantasy),
        ];
        let (router, catalog) = router(FakeCatalog::with_cards(cards)).await;
        let (status, body) = get_json(router, "/?q=space&category=fantasy&limit=5").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["data"][0]["title"], "Anathem");
        assert_eq!(body["data"][1]["title"], "Dune");
        assert_eq!(body["data"][0]["source"], "catalog");
        assert_eq!(catalog.searches(), 1);
    }

    #[tokio::test]
    async fn unknown_category_is_a_validation_error() {
        let (router, _) = router(FakeCatalog::default()).await;
        let (status, body) = get_json(router, "/?q=space&category=Cooking").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["details"][0]["field"], "category");
    }

    #[tokio::test]
    async fn upstream_failures_surface_their_status() {
        let catalog = FakeCatalog {
            fail_with: Some(503),
            ..FakeCatalog::default()
        };
        let (router, _) = router(catalog).await;
        let (status, _) = get_json(router, "/?q=space").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn detail_by_catalog_id() {
        let catalog = FakeCatalog::default().with_detail(fake::detail("OL45804W", "Dune"));
        let (router, _) = router(catalog).await;

        let (status, body) = get_json(router.clone(), "/OL45804W").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "catalog");
        assert_eq!(body["editable"], false);

        let (status, _) = get_json(router, "/OL1W").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn owned_detail_requires_a_session() {
        let (router, catalog) = router(FakeCatalog::default()).await;
        let (status, body) = get_json(router, "/mb_abc123").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");
        assert_eq!(catalog.lookups(), 0);
    }
}
