use crate::db::repo::UserRepo;
use crate::db::{Db, DbResult, map_row_opt};
use crate::models::types::UserId;
use crate::models::user::{NewUser, ProfileUpdate, User};
use std::sync::Arc;

const USER_COLUMNS: &str = "id, name, email, username, password_hash, image, email_verified, created_at";

pub struct UserRepository {
    db: Arc<Db>,
}

impl UserRepository {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db: db.clone() }
    }
}

#[async_trait::async_trait]
impl UserRepo for UserRepository {
    async fn get_by_id(&self, id: UserId) -> DbResult<Option<User>> {
        let client = self.db.get_client().await?;

        let stmt = client
            .prepare_cached(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .await?;

        let row_opt = client.query_opt(&stmt, &[&id]).await?;
        map_row_opt(row_opt, User::try_from_row, &format!("UserRepo::get_by_id id={}", id))
    }

    async fn get_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let client = self.db.get_client().await?;

        let stmt = client
            .prepare_cached(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .await?;

        let row_opt = client.query_opt(&stmt, &[&email]).await?;
        map_row_opt(
            row_opt,
            User::try_from_row,
            &format!("UserRepo::get_by_email email={}", email),
        )
    }

    async fn username_taken(&self, username: &str, except: Option<UserId>) -> DbResult<bool> {
        let client = self.db.get_client().await?;

        let stmt = client
            .prepare_cached(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM users
                    WHERE username = $1 AND ($2::uuid IS NULL OR id <> $2)
                )
                "#,
            )
            .await?;

        let row = client.query_one(&stmt, &[&username, &except]).await?;
        Ok(row.try_get(0)?)
    }

    async fn insert_user(&self, user: NewUser) -> DbResult<User> {
        let client = self.db.get_client().await?;

        let stmt = client
            .prepare_cached(&format!(
                r#"
                INSERT INTO users (id, name, email, password_hash, username, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING {USER_COLUMNS}
                "#
            ))
            .await?;

        let row = client
            .query_one(
                &stmt,
                &[
                    &user.id,
                    &user.name,
                    &user.email,
                    &user.password_hash,
                    &user.username,
                    &user.created_at,
                ],
            )
            .await?;

        User::try_from_row(&row)
    }

    async fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> DbResult<Option<User>> {
        let client = self.db.get_client().await?;

        let stmt = client
            .prepare_cached(&format!(
                r#"
                UPDATE users
                SET name = COALESCE($2, name),
                    username = COALESCE($3, username)
                WHERE id = $1
                RETURNING {USER_COLUMNS}
                "#
            ))
            .await?;

        let row_opt = client
            .query_opt(&stmt, &[&id, &update.name, &update.username])
            .await?;
        map_row_opt(
            row_opt,
            User::try_from_row,
            &format!("UserRepo::update_profile id={}", id),
        )
    }
}
