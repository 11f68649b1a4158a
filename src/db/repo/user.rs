use crate::db::DbResult;
use crate::models::types::UserId;
use crate::models::user::{NewUser, ProfileUpdate, User};

/// Names of the unique constraints on `users`, as reported in unique violations.
pub const USERNAME_CONSTRAINT: &str = "users_username_key";
pub const EMAIL_CONSTRAINT: &str = "users_email_key";

#[async_trait::async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_by_id(&self, id: UserId) -> DbResult<Option<User>>;
    async fn get_by_email(&self, email: &str) -> DbResult<Option<User>>;

    /// Whether `username` is held by any user other than `except`
    async fn username_taken(&self, username: &str, except: Option<UserId>) -> DbResult<bool>;

    /// Inserts the user. Fails with a unique violation naming
    /// [`USERNAME_CONSTRAINT`] or [`EMAIL_CONSTRAINT`] on conflict.
    async fn insert_user(&self, user: NewUser) -> DbResult<User>;

    /// Applies the fields present in `update`. Returns `None` when no row matched.
    async fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> DbResult<Option<User>>;
}
