pub mod directory;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{AppendHeaders, IntoResponse};
use axum::{routing::get, routing::post, Json, Router};
use bookshelf_authz::require_identity;
use bookshelf_http::AppError;
use bookshelf_kernel::{InitCtx, Module};
use serde::Deserialize;
use serde_json::json;

use crate::error::{BookshelfError, FieldError};
use crate::extract::{session_token, Caller};
use crate::modules::books::error_response;
use crate::state::AppState;
use directory::{ProfileUpdate, User};

/// Login and logout. Issues the session token every other module reads.
pub struct AuthModule {
    state: AppState,
}

impl AuthModule {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Module for AuthModule {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            seeded_users = ctx.settings.auth.users.len(),
            "auth module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/login", post(login))
            .route("/logout", post(logout))
            .with_state(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/login": {
                    "post": {
                        "summary": "Start a session",
                        "tags": ["Auth"],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": {
                                            "email": { "type": "string", "format": "email" },
                                            "password": { "type": "string" }
                                        },
                                        "required": ["email", "password"]
                                    }
                                }
                            }
                        },
                        "responses": {
                            "200": {
                                "description": "Session token, also set as a cookie",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "object",
                                            "properties": {
                                                "user": { "$ref": "#/components/schemas/User" },
                                                "token": { "type": "string" }
                                            }
                                        }
                                    }
                                }
                            },
                            "401": error_response("Invalid credentials"),
                            "422": error_response("Missing email or password")
                        }
                    }
                },
                "/logout": {
                    "post": {
                        "summary": "End the current session",
                        "tags": ["Auth"],
                        "responses": {
                            "200": { "description": "Session cleared" }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "User": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "name": { "type": "string" },
                            "email": { "type": "string", "format": "email" }
                        },
                        "required": ["id", "name", "email"]
                    }
                }
            }
        }))
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let active = self.state.sessions.active_count().await;
        self.state.sessions.clear().await;
        tracing::info!(module = self.name(), dropped_sessions = active, "auth module stopped");
        Ok(())
    }
}

/// The signed-in user's own account.
pub struct ProfileModule {
    state: AppState,
}

impl ProfileModule {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Module for ProfileModule {
    fn name(&self) -> &'static str {
        "profile"
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/", get(get_profile).patch(update_profile))
            .with_state(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let user = json!({
            "description": "Current user",
            "content": {
                "application/json": {
                    "schema": { "$ref": "#/components/schemas/User" }
                }
            }
        });
        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "Get my profile",
                        "tags": ["Profile"],
                        "responses": {
                            "200": user.clone(),
                            "401": error_response("No session")
                        }
                    },
                    "patch": {
                        "summary": "Update my name or email",
                        "tags": ["Profile"],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": {
                                            "name": { "type": "string", "minLength": 2 },
                                            "email": { "type": "string", "format": "email" }
                                        }
                                    }
                                }
                            }
                        },
                        "responses": {
                            "200": user,
                            "401": error_response("No session"),
                            "422": error_response("Name too short or email malformed")
                        }
                    }
                }
            }
        }))
    }
}

#[derive(Debug, Default, Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = request.email.filter(|e| !e.trim().is_empty());
    let password = request.password.filter(|p| !p.is_empty());
    let (Some(email), Some(password)) = (email.as_deref(), password.as_deref()) else {
        let mut fields = Vec::new();
        if email.is_none() {
            fields.push(FieldError::new("email", "required"));
        }
        if password.is_none() {
            fields.push(FieldError::new("password", "required"));
        }
        return Err(BookshelfError::Validation(fields).into());
    };

    let Some(user) = state.users.authenticate(email, password).await else {
        tracing::warn!(target: "bookshelf::auth", "login rejected");
        return Err(AppError::unauthorized("Invalid credentials"));
    };

    let token = state.sessions.issue(&user.id).await;
    let max_age = state.sessions.ttl().as_secs();
    let cookie = session_cookie(&state.session_cookie, &token, Some(max_age))?;
    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(json!({ "user": user, "token": token })),
    ))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
    if let Some(token) = session_token(&headers, &state.session_cookie) {
        state.sessions.revoke(&token).await;
    }
    let cookie = session_cookie(&state.session_cookie, "", Some(0))?;
    Ok((AppendHeaders([(SET_COOKIE, cookie)]), Json(json!({ "ok": true }))))
}

fn session_cookie(name: &str, value: &str, max_age: Option<u64>) -> Result<HeaderValue, AppError> {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax");
    if let Some(max_age) = max_age {
        cookie.push_str(&format!("; Max-Age={max_age}"));
    }
    HeaderValue::from_str(&cookie).map_err(|e| AppError::Internal(e.into()))
}

async fn get_profile(State(state): State<AppState>, Caller(caller): Caller) -> Result<Json<User>, AppError> {
    let caller = require_identity(caller).map_err(BookshelfError::from)?;
    let user = state
        .users
        .get(&caller.user_id)
        .await
        .ok_or_else(|| BookshelfError::not_found("user"))?;
    Ok(Json(user))
}

async fn update_profile(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>, AppError> {
    let caller = require_identity(caller).map_err(BookshelfError::from)?;
    Ok(Json(state.users.update_profile(&caller.user_id, update).await?))
}
