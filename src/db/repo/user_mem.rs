use crate::db::DbResult;
use crate::db::error::DbError;
use crate::db::repo::{EMAIL_CONSTRAINT, USERNAME_CONSTRAINT, UserRepo};
use crate::models::types::UserId;
use crate::models::user::{NewUser, ProfileUpdate, User};
use async_trait::async_trait;
use dashmap::DashMap;

/// In-process user store with the same uniqueness rules as the `users` table.
///
/// The username and email indexes are claimed with `entry().or_insert()`, so
/// two concurrent inserts of the same handle behave like the unique index:
/// exactly one wins, the other gets a [`DbError::UniqueViolation`].
#[derive(Default)]
pub struct MemoryUserRepo {
    users: DashMap<UserId, User>,
    usernames: DashMap<String, UserId>,
    emails: DashMap<String, UserId>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Claims `key` for `id` in `index`. Fails if somebody else holds it.
    fn claim(index: &DashMap<String, UserId>, key: &str, id: UserId, constraint: &str) -> DbResult<()> {
        let holder = *index.entry(key.to_string()).or_insert(id);
        if holder != id {
            return Err(DbError::UniqueViolation {
                constraint: Some(constraint.to_string()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn get_by_id(&self, id: UserId) -> DbResult<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn get_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let Some(id) = self.emails.get(email).map(|r| *r) else {
            return Ok(None);
        };
        self.get_by_id(id).await
    }

    async fn username_taken(&self, username: &str, except: Option<UserId>) -> DbResult<bool> {
        Ok(self
            .usernames
            .get(username)
            .is_some_and(|holder| Some(*holder) != except))
    }

    async fn insert_user(&self, user: NewUser) -> DbResult<User> {
        Self::claim(&self.emails, &user.email, user.id, EMAIL_CONSTRAINT)?;
        if let Err(e) = Self::claim(&self.usernames, &user.username, user.id, USERNAME_CONSTRAINT) {
            self.emails.remove(&user.email);
            return Err(e);
        }

        let record = User {
            id: user.id,
            name: Some(user.name),
            email: user.email,
            username: Some(user.username),
            password_hash: Some(user.password_hash),
            image: None,
            email_verified: None,
            created_at: user.created_at,
        };
        self.users.insert(record.id, record.clone());

        Ok(record)
    }

    async fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> DbResult<Option<User>> {
        let Some(current) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        if let Some(new_name) = &update.username {
            if current.username.as_deref() != Some(new_name.as_str()) {
                Self::claim(&self.usernames, new_name, id, USERNAME_CONSTRAINT)?;
                if let Some(old) = &current.username {
                    self.usernames.remove(old);
                }
            }
        }

        let Some(mut entry) = self.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &update.name {
            entry.name = Some(name.clone());
        }
        if let Some(username) = &update.username {
            entry.username = Some(username.clone());
        }

        Ok(Some(entry.value().clone()))
    }
}
