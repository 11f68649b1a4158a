use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use canvas_accounts::db::DbResult;
use canvas_accounts::db::repo::{MemoryUserRepo, UserRepo};
use canvas_accounts::error::DomainError;
use canvas_accounts::models::types::UserId;
use canvas_accounts::models::user::{NewUser, ProfileUpdate, SignupRequest, User};
use canvas_accounts::services::{AccountService, AccountSettings};
use canvas_accounts::username::AllocError;
use password_hash::{PasswordHash, PasswordVerifier};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

fn cheap_argon() -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::new(8, 1, 1, None).unwrap())
}

fn service(repo: Arc<dyn UserRepo>, settings: AccountSettings) -> AccountService {
    AccountService::new(repo, settings).with_argon(cheap_argon())
}

fn req(name: &str, email: &str) -> SignupRequest {
    SignupRequest {
        name: name.into(),
        email: email.into(),
        password: "hunter2".into(),
    }
}

/// Wraps the memory store but reports every username as free for the first
/// `stale_reads` lookups, like a read that happened before a concurrent commit.
struct StaleReadRepo {
    inner: MemoryUserRepo,
    stale_reads: AtomicU32,
}

impl StaleReadRepo {
    fn new(inner: MemoryUserRepo, stale_reads: u32) -> Self {
        Self {
            inner,
            stale_reads: AtomicU32::new(stale_reads),
        }
    }
}

#[async_trait]
impl UserRepo for StaleReadRepo {
    async fn get_by_id(&self, id: UserId) -> DbResult<Option<User>> {
        self.inner.get_by_id(id).await
    }

    async fn get_by_email(&self, email: &str) -> DbResult<Option<User>> {
        self.inner.get_by_email(email).await
    }

    async fn username_taken(&self, username: &str, except: Option<UserId>) -> DbResult<bool> {
        let stale = self
            .stale_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(false);
        }
        self.inner.username_taken(username, except).await
    }

    async fn insert_user(&self, user: NewUser) -> DbResult<User> {
        self.inner.insert_user(user).await
    }

    async fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> DbResult<Option<User>> {
        self.inner.update_profile(id, update).await
    }
}

#[tokio::test]
async fn same_display_name_gets_sequential_handles() {
    let repo = Arc::new(MemoryUserRepo::new());
    let svc = service(repo.clone(), AccountSettings::default());

    let mut handles = Vec::new();
    for i in 0..4 {
        let user = svc
            .signup(&req("Ada Lovelace", &format!("ada{i}@example.com")))
            .await
            .unwrap();
        handles.push(user.username.unwrap());
    }

    assert_eq!(
        handles,
        vec!["ada_lovelace", "ada_lovelace1", "ada_lovelace2", "ada_lovelace3"]
    );
    assert_eq!(repo.len(), 4);
}

#[tokio::test]
async fn short_and_symbol_only_names_are_padded() {
    let repo = Arc::new(MemoryUserRepo::new());
    let svc = service(repo, AccountSettings::default());

    let ab = svc.signup(&req("AB", "ab@example.com")).await.unwrap();
    assert_eq!(ab.username.as_deref(), Some("ab_user"));

    let bangs = svc.signup(&req("!!!", "bang@example.com")).await.unwrap();
    assert_eq!(bangs.username.as_deref(), Some("_user"));

    let empty = svc.signup(&req("", "empty@example.com")).await.unwrap();
    assert_eq!(empty.username.as_deref(), Some("_user1"));
}

#[tokio::test]
async fn duplicate_email_is_rejected_before_allocation() {
    let repo = Arc::new(MemoryUserRepo::new());
    let svc = service(repo.clone(), AccountSettings::default());

    svc.signup(&req("Ada", "ada@example.com")).await.unwrap();
    let err = svc.signup(&req("Someone Else", "ada@example.com")).await.unwrap_err();

    assert!(matches!(err, DomainError::EmailInUse));
    assert_eq!(repo.len(), 1);
    assert!(!repo.username_taken("someone_else", None).await.unwrap());
}

#[tokio::test]
async fn invalid_signup_input_is_rejected() {
    let repo = Arc::new(MemoryUserRepo::new());
    let svc = service(repo.clone(), AccountSettings::default());

    let mut bad_pw = req("Ada", "ada@example.com");
    bad_pw.password = "no".into();
    assert!(matches!(
        svc.signup(&bad_pw).await,
        Err(DomainError::Validation { field: "password", .. })
    ));

    assert!(matches!(
        svc.signup(&req("Ada", "ada-at-example")).await,
        Err(DomainError::Validation { field: "email", .. })
    ));
    assert!(repo.is_empty());
}

#[tokio::test]
async fn password_is_stored_as_argon_hash() {
    let repo = Arc::new(MemoryUserRepo::new());
    let svc = service(repo, AccountSettings::default());

    let user = svc.signup(&req("Ada", "ada@example.com")).await.unwrap();
    let stored = user.password_hash.unwrap();
    assert!(stored.starts_with("$argon2id$"));

    let parsed = PasswordHash::new(&stored).unwrap();
    assert!(Argon2::default().verify_password(b"hunter2", &parsed).is_ok());
    assert!(Argon2::default().verify_password(b"hunter3", &parsed).is_err());
}

#[tokio::test]
async fn lost_username_race_is_retried() {
    // "ada" is already committed, but the first probe reads stale data
    let repo = Arc::new(StaleReadRepo::new(MemoryUserRepo::new(), 1));
    let svc = service(repo.clone(), AccountSettings::default());
    repo.inner
        .insert_user(NewUser {
            id: UserId::new(),
            name: "Ada".into(),
            email: "first@example.com".into(),
            password_hash: "x".into(),
            username: "ada".into(),
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let user = svc.signup(&req("Ada", "second@example.com")).await.unwrap();
    assert_eq!(user.username.as_deref(), Some("ada1"));
    assert_eq!(repo.inner.len(), 2);
}

#[tokio::test]
async fn retry_budget_is_bounded() {
    let repo = Arc::new(StaleReadRepo::new(MemoryUserRepo::new(), u32::MAX));
    let svc = service(
        repo.clone(),
        AccountSettings {
            username_max_probes: None,
            signup_max_attempts: 2,
        },
    );

    svc.signup(&req("Ada", "first@example.com")).await.unwrap();
    let err = svc.signup(&req("Ada", "second@example.com")).await.unwrap_err();

    assert!(matches!(err, DomainError::SignupFailed { attempts: 2 }));
    assert_eq!(repo.inner.len(), 1);
    // the losing signup must not keep its email reserved
    assert!(repo.inner.get_by_email("second@example.com").await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_signups_get_distinct_gap_free_handles() {
    const N: usize = 8;

    let repo = Arc::new(MemoryUserRepo::new());
    let svc = Arc::new(service(
        repo.clone(),
        AccountSettings {
            username_max_probes: None,
            signup_max_attempts: N as u32 + 2,
        },
    ));

    let mut tasks = Vec::new();
    for i in 0..N {
        let svc = svc.clone();
        tasks.push(tokio::spawn(async move {
            svc.signup(&req("Grace Hopper", &format!("grace{i}@example.com"))).await
        }));
    }

    let mut handles = BTreeSet::new();
    for task in tasks {
        let user = task.await.unwrap().unwrap();
        assert!(handles.insert(user.username.unwrap()), "handle handed out twice");
    }

    let expected: BTreeSet<String> = (0..N)
        .map(|i| if i == 0 { "grace_hopper".to_string() } else { format!("grace_hopper{i}") })
        .collect();
    assert_eq!(handles, expected);
    assert_eq!(repo.len(), N);
}

#[tokio::test]
async fn probe_limit_fails_signup_loudly() {
    let repo = Arc::new(MemoryUserRepo::new());
    let svc = service(
        repo.clone(),
        AccountSettings {
            username_max_probes: Some(2),
            signup_max_attempts: 3,
        },
    );

    svc.signup(&req("Ada", "a@example.com")).await.unwrap();
    svc.signup(&req("Ada", "b@example.com")).await.unwrap();
    let err = svc.signup(&req("Ada", "c@example.com")).await.unwrap_err();

    assert!(matches!(
        err,
        DomainError::Alloc(AllocError::Exhausted { ref base, probes: 2 }) if base == "ada"
    ));
    assert_eq!(repo.len(), 2);
}

#[tokio::test]
async fn suggestion_does_not_reserve() {
    let repo = Arc::new(MemoryUserRepo::new());
    let svc = service(repo.clone(), AccountSettings::default());

    assert_eq!(svc.suggest_username("Ada Lovelace").await.unwrap(), "ada_lovelace");
    assert_eq!(svc.suggest_username("Ada Lovelace").await.unwrap(), "ada_lovelace");
    assert!(repo.is_empty());

    svc.signup(&req("Ada Lovelace", "ada@example.com")).await.unwrap();
    assert_eq!(svc.suggest_username("Ada Lovelace").await.unwrap(), "ada_lovelace1");
}

#[tokio::test]
async fn profile_fetch_and_update() {
    let repo = Arc::new(MemoryUserRepo::new());
    let svc = service(repo.clone(), AccountSettings::default());

    let ada = svc.signup(&req("Ada Lovelace", "ada@example.com")).await.unwrap();
    let grace = svc.signup(&req("Grace Hopper", "grace@example.com")).await.unwrap();

    let fetched = svc.current(ada.id).await.unwrap();
    assert_eq!(fetched.email, "ada@example.com");
    assert_eq!(fetched.username.as_deref(), Some("ada_lovelace"));

    // someone else's handle
    let steal = ProfileUpdate {
        name: None,
        username: Some("grace_hopper".into()),
    };
    assert!(matches!(
        svc.update_profile(ada.id, &steal).await,
        Err(DomainError::UsernameTaken)
    ));

    // re-submitting your own handle is fine
    let keep = ProfileUpdate {
        name: Some("Augusta Ada King".into()),
        username: Some("ada_lovelace".into()),
    };
    let kept = svc.update_profile(ada.id, &keep).await.unwrap();
    assert_eq!(kept.name.as_deref(), Some("Augusta Ada King"));
    assert_eq!(kept.username.as_deref(), Some("ada_lovelace"));

    let rename = ProfileUpdate {
        name: None,
        username: Some("countess".into()),
    };
    let renamed = svc.update_profile(ada.id, &rename).await.unwrap();
    assert_eq!(renamed.username.as_deref(), Some("countess"));
    assert_eq!(renamed.name.as_deref(), Some("Augusta Ada King"));

    // the released handle goes back to the pool
    assert_eq!(svc.suggest_username("Ada Lovelace").await.unwrap(), "ada_lovelace");
    assert_eq!(svc.current(grace.id).await.unwrap().username.as_deref(), Some("grace_hopper"));
}

#[tokio::test]
async fn profile_errors() {
    let repo = Arc::new(MemoryUserRepo::new());
    let svc = service(repo, AccountSettings::default());

    assert!(matches!(svc.current(UserId::new()).await, Err(DomainError::NotFound(_))));

    let update = ProfileUpdate {
        name: Some("Nobody".into()),
        username: None,
    };
    assert!(matches!(
        svc.update_profile(UserId::new(), &update).await,
        Err(DomainError::ProfileUpdateFailed)
    ));

    let invalid = ProfileUpdate {
        name: None,
        username: Some("Not Valid".into()),
    };
    assert!(matches!(
        svc.update_profile(UserId::new(), &invalid).await,
        Err(DomainError::Validation { field: "username", .. })
    ));
}
