use bookshelf_db::{MemoryTable, Row};
use bookshelf_kernel::settings::SeedUser;
use serde::{Deserialize, Serialize};

use crate::error::{BookshelfError, FieldError};

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
struct Account {
    user: User,
    password: String,
}

impl Row for Account {
    fn key(&self) -> &str {
        &self.user.id
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
}

const MIN_NAME_CHARS: usize = 2;

/// Accounts known to the app, seeded from configuration.
pub struct UserDirectory {
    accounts: MemoryTable<Account>,
}

impl UserDirectory {
    pub async fn from_seed(seed: &[SeedUser]) -> Self {
        let accounts = MemoryTable::new("users");
        for entry in seed {
            let account = Account {
                user: User {
                    id: entry.id.clone(),
                    name: entry.name.clone(),
                    email: entry.email.clone(),
                },
                password: entry.password.clone(),
            };
            if let Err(err) = accounts.insert(account).await {
                tracing::warn!(target: "bookshelf::users", error = %err, "skipping seed user");
            }
        }
        Self { accounts }
    }

    /// Match credentials. Emails compare case-insensitively.
    pub async fn authenticate(&self, email: &str, password: &str) -> Option<User> {
        let email = email.trim();
        self.accounts
            .scan(|a| a.user.email.eq_ignore_ascii_case(email) && a.password == password)
            .await
            .into_iter()
            .next()
            .map(|a| a.user)
    }

    pub async fn get(&self, id: &str) -> Option<User> {
        self.accounts.get(id).await.map(|a| a.user)
    }

    pub async fn display_name(&self, id: &str) -> String {
        self.get(id)
            .await
            .map(|u| u.name)
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub async fn update_profile(&self, id: &str, update: ProfileUpdate) -> Result<User, BookshelfError> {
        let name = update.name.map(|n| n.trim().to_string());
        let email = update.email.map(|e| e.trim().to_string());

        let mut errors = Vec::new();
        if name.as_deref().is_some_and(|n| n.chars().count() < MIN_NAME_CHARS) {
            errors.push(FieldError::new("name", "too_short"));
        }
        if email.as_deref().is_some_and(|e| !looks_like_email(e)) {
            errors.push(FieldError::new("email", "invalid"));
        }
        if !errors.is_empty() {
            return Err(BookshelfError::Validation(errors));
        }

        let user = self
            .accounts
            .update(id, |account: &mut Account| -> Result<User, BookshelfError> {
                if let Some(name) = name {
                    account.user.name = name;
                }
                if let Some(email) = email {
                    account.user.email = email;
                }
                Ok(account.user.clone())
            })
            .await?;
        tracing::info!(target: "bookshelf::users", user_id = %user.id, "profile updated");
        Ok(user)
    }
}

fn looks_like_email(raw: &str) -> bool {
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        && !raw.chars().any(char::is_whitespace)
}
