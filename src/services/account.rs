use crate::db::error::DbError;
use crate::db::repo::{EMAIL_CONSTRAINT, USERNAME_CONSTRAINT, UserRepo};
use crate::error::{AppResult, DomainError};
use crate::models::types::UserId;
use crate::models::user::{NewUser, ProfileUpdate, SignupRequest, User};
use crate::username::UsernameAllocator;
use argon2::Argon2;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHasher, SaltString};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct AccountSettings {
    /// Probe cap handed to the username allocator (`None` = unbounded)
    pub username_max_probes: Option<u32>,
    /// How often signup re-allocates after losing a username race
    pub signup_max_attempts: u32,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            username_max_probes: None,
            signup_max_attempts: 3,
        }
    }
}

pub struct AccountService {
    repo: Arc<dyn UserRepo>,
    argon: Argon2<'static>,
    allocator: UsernameAllocator,
    signup_max_attempts: u32,
}

impl AccountService {
    pub fn new(repo: Arc<dyn UserRepo>, settings: AccountSettings) -> Self {
        let argon = Argon2::default();
        Self {
            repo,
            argon,
            allocator: UsernameAllocator::new(settings.username_max_probes),
            signup_max_attempts: settings.signup_max_attempts.max(1),
        }
    }

    /// Swaps the password hasher, e.g. for cheaper parameters.
    pub fn with_argon(mut self, argon: Argon2<'static>) -> Self {
        self.argon = argon;
        self
    }

    /// Creates an account with a freshly allocated username.
    ///
    /// Allocation and insert are not atomic. When the insert loses a race on
    /// the username constraint the whole allocation is repeated, up to
    /// `signup_max_attempts` times.
    pub async fn signup(&self, req: &SignupRequest) -> AppResult<User> {
        req.validate()?;

        if self.repo.get_by_email(&req.email).await?.is_some() {
            return Err(DomainError::EmailInUse);
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .argon
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(DomainError::Password)?
            .to_string();

        let mut attempt = 0;
        loop {
            attempt += 1;

            let username = self.allocator.allocate(&req.name, self.repo.as_ref()).await?;
            let new_user = NewUser {
                id: UserId::new(),
                name: req.name.clone(),
                email: req.email.clone(),
                password_hash: password_hash.clone(),
                username: username.clone(),
                created_at: chrono::Utc::now(),
            };

            match self.repo.insert_user(new_user).await {
                Ok(user) => {
                    tracing::info!(user_id = %user.id, %username, attempt, "account created");
                    return Ok(user);
                }
                Err(e) if e.violates(USERNAME_CONSTRAINT) => {
                    if attempt >= self.signup_max_attempts {
                        tracing::warn!(%username, attempt, "giving up on username allocation");
                        return Err(DomainError::SignupFailed { attempts: attempt });
                    }
                    tracing::warn!(%username, attempt, "username claimed concurrently, allocating again");
                }
                Err(e) if e.violates(EMAIL_CONSTRAINT) => return Err(DomainError::EmailInUse),
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn current(&self, user_id: UserId) -> AppResult<User> {
        self.repo
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("user".into()))
    }

    pub async fn update_profile(&self, user_id: UserId, update: &ProfileUpdate) -> AppResult<User> {
        update.validate()?;

        if let Some(username) = &update.username {
            if self.repo.username_taken(username, Some(user_id)).await? {
                return Err(DomainError::UsernameTaken);
            }
        }

        let updated = match self.repo.update_profile(user_id, update).await {
            Ok(Some(user)) => user,
            Ok(None) => return Err(DomainError::ProfileUpdateFailed),
            Err(DbError::UniqueViolation { .. }) => return Err(DomainError::UsernameTaken),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(user_id = %updated.id, username = ?updated.username, "profile updated");
        Ok(updated)
    }

    /// The username a signup with this display name would get right now.
    /// Nothing is reserved.
    pub async fn suggest_username(&self, name: &str) -> AppResult<String> {
        Ok(self.allocator.allocate(name, self.repo.as_ref()).await?)
    }
}
