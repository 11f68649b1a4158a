use crate::db::error::DbError;
use crate::username::AllocError;
use thiserror::Error;

pub type AppResult<T> = Result<T, DomainError>;

#[derive(Debug, Error)]
pub enum DomainError {
    /// Another account already registered this email address
    #[error("email already in use")]
    EmailInUse,

    /// Requested username belongs to a different account
    #[error("username already taken")]
    UsernameTaken,

    /// Username allocation kept losing the race against concurrent signups
    #[error("signup failed after {attempts} attempts")]
    SignupFailed { attempts: u32 },

    /// Update matched no row
    #[error("failed to update profile")]
    ProfileUpdateFailed,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error(transparent)]
    Alloc(#[from] AllocError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Infra(#[from] InfraError),

    #[error(transparent)]
    Password(#[from] password_hash::Error),
}

impl DomainError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        DomainError::Validation {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigErrorKind {
    #[error("failed to read file: {0}")]
    Read(std::io::Error),

    #[error("failed to parse file: {0}")]
    Parse(toml::de::Error),

    #[error("invalid environment variable {0}: {1}")]
    InvalidEnv(String, String),
}

#[derive(Debug, Error)]
pub enum InfraError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("invalid configuration in {path}: {source}")]
    Config {
        path: std::path::PathBuf,
        #[source]
        source: ConfigErrorKind,
    },

    #[error("invalid environment: {0}")]
    Env(#[from] ConfigErrorKind),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
