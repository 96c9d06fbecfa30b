pub mod events;
pub mod models;
pub mod service;
pub mod store;

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::get, routing::post, Json, Router};
use bookshelf_http::AppError;
use bookshelf_kernel::{InitCtx, Module};
use serde_json::json;

use crate::extract::Caller;
use crate::modules::books::models::BookCard;
use crate::modules::books::{error_response, list_parameters};
use crate::query::{ListParams, Page, RawListParams};
use crate::state::AppState;
use models::{BookPatch, BookRecord, ImportBook, NewBook};

/// The caller's own books.
pub struct MyBooksModule {
    state: AppState,
}

impl MyBooksModule {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Module for MyBooksModule {
    fn name(&self) -> &'static str {
        "my-books"
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/", get(list_books).post(create_book))
            .route("/import", post(import_book))
            .route("/count", get(count_books))
            .route(
                "/{id}",
                get(get_book).put(update_book).delete(delete_book),
            )
            .with_state(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let record = json!({
            "description": "The stored book",
            "content": {
                "application/json": {
                    "schema": { "$ref": "#/components/schemas/OwnedBook" }
                }
            }
        });
        let id_param = json!([{
            "name": "id",
            "in": "path",
            "required": true,
            "schema": { "type": "string" }
        }]);
        let body = |schema: &str| {
            json!({
                "required": true,
                "content": {
                    "application/json": {
                        "schema": { "$ref": format!("#/components/schemas/{schema}") }
                    }
                }
            })
        };

        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List my books",
                        "tags": ["My Books"],
                        "parameters": list_parameters(),
                        "responses": {
                            "200": {
                                "description": "One page of owned cards",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/BookPage" }
                                    }
                                }
                            },
                            "401": error_response("No session")
                        }
                    },
                    "post": {
                        "summary": "Add a book",
                        "tags": ["My Books"],
                        "requestBody": body("NewBook"),
                        "responses": {
                            "201": record.clone(),
                            "401": error_response("No session"),
                            "422": error_response("Missing title or author")
                        }
                    }
                },
                "/import": {
                    "post": {
                        "summary": "Copy a catalog card into my books",
                        "tags": ["My Books"],
                        "requestBody": body("BookCard"),
                        "responses": {
                            "201": record.clone(),
                            "401": error_response("No session"),
                            "409": error_response("Already in my books")
                        }
                    }
                },
                "/count": {
                    "get": {
                        "summary": "Number of books I own",
                        "tags": ["My Books"],
                        "responses": {
                            "200": {
                                "description": "Owned count",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "object",
                                            "properties": { "count": { "type": "integer" } }
                                        }
                                    }
                                }
                            },
                            "401": error_response("No session")
                        }
                    }
                },
                "/{id}": {
                    "get": {
                        "summary": "Get one of my books",
                        "tags": ["My Books"],
                        "parameters": id_param.clone(),
                        "responses": {
                            "200": record.clone(),
                            "403": error_response("Owned by someone else"),
                            "404": error_response("No such book")
                        }
                    },
                    "put": {
                        "summary": "Update one of my books",
                        "tags": ["My Books"],
                        "parameters": id_param.clone(),
                        "requestBody": body("NewBook"),
                        "responses": {
                            "200": record,
                            "403": error_response("Owned by someone else"),
                            "404": error_response("No such book"),
                            "422": error_response("Blank title or author")
                        }
                    },
                    "delete": {
                        "summary": "Remove one of my books",
                        "tags": ["My Books"],
                        "parameters": id_param,
                        "responses": {
                            "200": { "description": "Deleted" },
                            "403": error_response("Owned by someone else"),
                            "404": error_response("No such book")
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "OwnedBook": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "description": { "type": "string" },
                            "price": { "type": "number" },
                            "coverImage": { "type": "string", "format": "uri" },
                            "category": { "$ref": "#/components/schemas/Category" },
                            "ownerId": { "type": "string" },
                            "ownerDisplayName": { "type": "string" },
                            "createdAt": { "type": "string", "format": "date-time" },
                            "updatedAt": { "type": "string", "format": "date-time" }
                        },
                        "required": ["id", "title", "author", "price", "category", "ownerId", "createdAt", "updatedAt"]
                    },
                    "NewBook": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "description": { "type": "string" },
                            "price": { "type": "number" },
                            "coverImage": { "type": "string", "format": "uri" },
                            "category": { "$ref": "#/components/schemas/Category" }
                        },
                        "required": ["title", "author"]
                    }
                }
            }
        }))
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        self.state.my_books.sync_counts().await;
        tracing::info!(module = self.name(), "my-books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.state.my_books.clear().await;
        tracing::info!(module = self.name(), "my-books module stopped");
        Ok(())
    }
}

async fn list_books(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Query(raw): Query<RawListParams>,
) -> Result<Json<Page<BookCard>>, AppError> {
    let params = ListParams::from_raw(raw)?;
    Ok(Json(state.my_books.list(caller, &params).await?))
}

async fn create_book(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(input): Json<NewBook>,
) -> Result<(StatusCode, Json<BookRecord>), AppError> {
    let record = state.my_books.create(caller, input).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn import_book(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(card): Json<ImportBook>,
) -> Result<(StatusCode, Json<BookRecord>), AppError> {
    let record = state.my_books.import(caller, card.into()).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn count_books(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = state.my_books.count(caller)?;
    Ok(Json(json!({ "count": count })))
}

async fn get_book(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<BookRecord>, AppError> {
    Ok(Json(state.my_books.get(caller, &id).await?))
}

async fn update_book(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(patch): Json<BookPatch>,
) -> Result<Json<BookRecord>, AppError> {
    Ok(Json(state.my_books.update(caller, &id, patch).await?))
}

async fn delete_book(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.my_books.delete(caller, &id).await?;
    Ok(Json(json!({ "ok": true })))
}
