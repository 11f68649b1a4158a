use crate::config::Config;
use crate::db::repo::{MemoryUserRepo, UserRepo, UserRepository};
use crate::db::{Db, MEMORY_DSN};
use crate::error::AppResult;
use crate::services::AccountService;
use std::sync::Arc;

pub struct Repos {
    pub user: Arc<dyn UserRepo>,
}

pub struct Services {
    pub account: Arc<AccountService>,
}

pub struct Registry {
    pub repos: Arc<Repos>,
    pub services: Arc<Services>,
    pub config: Arc<Config>,
}

impl Registry {
    pub fn new(user_repo: Arc<dyn UserRepo>, config: Arc<Config>) -> Self {
        let repos = Arc::new(Repos { user: user_repo });

        let services = Arc::new(Services {
            account: Arc::new(AccountService::new(repos.user.clone(), config.account_settings())),
        });

        Self {
            repos,
            services,
            config,
        }
    }

    /// Connects the store named by `database_url`: PostgreSQL (migrated on
    /// connect) or, for [`MEMORY_DSN`], an in-process map.
    pub async fn connect(config: Arc<Config>) -> AppResult<Self> {
        let user_repo: Arc<dyn UserRepo> = if config.database_url == MEMORY_DSN {
            tracing::warn!("using in-memory user store, nothing will be persisted");
            Arc::new(MemoryUserRepo::new())
        } else {
            let db = Arc::new(Db::new(&config.database_url, config.db_pool_size)?);
            db.init().await?;
            Arc::new(UserRepository::new(db))
        };

        Ok(Self::new(user_repo, config))
    }
}
