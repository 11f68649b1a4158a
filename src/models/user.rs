use crate::db::DbResult;
use crate::error::{AppResult, DomainError};
use crate::models::types::UserId;
use crate::username;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;

pub const PASSWORD_MIN_LEN: usize = 3;
pub const PASSWORD_MAX_LEN: usize = 20;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Debug, Clone)]
pub struct User {
    /// Unique user ID
    pub id: UserId,
    /// Display name as entered at signup
    pub name: Option<String>,
    /// Email address (distinct)
    pub email: String,
    /// Handle (distinct). Rows created by the auth provider may not have one yet.
    pub username: Option<String>,
    /// Argon2 PHC string, absent for users that only sign in through a provider
    pub password_hash: Option<String>,
    pub image: Option<String>,
    pub email_verified: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn try_from_row(row: &Row) -> DbResult<Self> {
        Ok(Self {
            id: row.try_get::<_, UserId>("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            image: row.try_get("image")?,
            email_verified: row.try_get("email_verified")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Row to insert on signup. The username comes from the allocator.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl SignupRequest {
    pub fn validate(&self) -> AppResult<()> {
        if !EMAIL_RE.is_match(&self.email) {
            return Err(DomainError::validation("email", "invalid email address"));
        }

        let len = self.password.chars().count();
        if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
            return Err(DomainError::validation(
                "password",
                format!("must be between {PASSWORD_MIN_LEN} and {PASSWORD_MAX_LEN} characters"),
            ));
        }

        Ok(())
    }
}

/// Partial profile update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub username: Option<String>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(name) = &self.name {
            if name.is_empty() {
                return Err(DomainError::validation("name", "cannot be empty"));
            }
        }
        if let Some(username) = &self.username {
            username::validate(username)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: UserId,
    pub name: Option<String>,
    pub email: String,
    pub username: Option<String>,
    pub image: Option<String>,
    pub email_verified: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for CurrentUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            username: u.username,
            image: u.image,
            email_verified: u.email_verified,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub id: UserId,
    pub name: Option<String>,
    pub email: String,
    pub username: Option<String>,
    pub image: Option<String>,
}

impl From<User> for ProfileView {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            username: u.username,
            image: u.image,
        }
    }
}
