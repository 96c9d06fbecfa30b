//! Session identities and ownership guards.
//!
//! Callers present an opaque session token; [`SessionRegistry`] turns it
//! into an [`Identity`]. Protected operations call [`require_identity`]
//! before doing anything and [`assert_owner`] once the resource is found.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// The resolved caller principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("caller does not own this resource")]
    Forbidden,
}

/// Fail with [`AuthzError::Unauthenticated`] when no identity was resolved.
pub fn require_identity(identity: Option<Identity>) -> Result<Identity, AuthzError> {
    identity.ok_or(AuthzError::Unauthenticated)
}

/// Fail with [`AuthzError::Forbidden`] unless `identity` owns the resource.
pub fn assert_owner(owner_id: &str, identity: &Identity) -> Result<(), AuthzError> {
    if owner_id == identity.user_id {
        Ok(())
    } else {
        tracing::warn!(
            target: "bookshelf-authz",
            caller = %identity.user_id,
            "ownership check failed"
        );
        Err(AuthzError::Forbidden)
    }
}

/// Sessions live this long unless configured otherwise.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Opaque session tokens issued at login.
///
/// Each token expires `ttl` after issue. Expired entries stop resolving at
/// once and are swept out on the next login.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

struct Session {
    identity: Identity,
    issued_at: Instant,
}

impl Session {
    fn is_live(&self, ttl: Duration, now: Instant) -> bool {
        now.duration_since(self.issued_at) < ttl
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh token for `user_id`, sweeping expired sessions first.
    pub async fn issue(&self, user_id: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.is_live(self.ttl, now));
        let expired = before - sessions.len();
        sessions.insert(
            token.clone(),
            Session {
                identity: Identity::new(user_id),
                issued_at: now,
            },
        );
        drop(sessions);

        tracing::info!(target: "bookshelf-authz", user_id, expired, "session issued");
        token
    }

    /// Resolve a token into the caller identity, if any.
    pub async fn current_identity(&self, token: Option<&str>) -> Option<Identity> {
        let token = token?.trim();
        if token.is_empty() {
            return None;
        }
        self.sessions
            .read()
            .await
            .get(token)
            .filter(|session| session.is_live(self.ttl, Instant::now()))
            .map(|session| session.identity.clone())
    }

    /// Drop a token. Returns whether it was live.
    pub async fn revoke(&self, token: &str) -> bool {
        let revoked = self
            .sessions
            .write()
            .await
            .remove(token)
            .is_some_and(|session| session.is_live(self.ttl, Instant::now()));
        if revoked {
            tracing::info!(target: "bookshelf-authz", "session revoked");
        }
        revoked
    }

    /// Sessions held in memory, expired ones not yet swept included.
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }
}
