//! Username derivation and allocation.
//!
//! A display name is turned into a base handle by [`normalize`]. The
//! [`UsernameAllocator`] then probes the store for `base`, `base1`, `base2`, ...
//! and hands back the first candidate nobody holds.
//!
//! The probe and the insert that follows are two separate round trips. Two
//! signups deriving the same base can both see a candidate as free; the
//! unique index on `users.username` decides which insert wins, and the loser
//! has to allocate again (see `AccountService::signup`).

use crate::db::DbResult;
use crate::db::error::DbError;
use crate::db::repo::UserRepo;
use crate::error::{AppResult, DomainError};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Handles shorter than this get [`SHORT_SUFFIX`] appended.
pub const MIN_LEN: usize = 3;
pub const SHORT_SUFFIX: &str = "_user";

/// Bounds for handles chosen by the user on profile update.
pub const CHOSEN_MIN_LEN: usize = 3;
pub const CHOSEN_MAX_LEN: usize = 20;

/// Whitespace as browsers and Node see it (ECMAScript `\s`). Unlike Unicode
/// White_Space this includes U+FEFF and leaves out U+0085.
const SPACE_CLASS: &str = r"\t\n\x0B\x0C\r \xA0\x{1680}\x{2000}-\x{200A}\x{2028}\x{2029}\x{202F}\x{205F}\x{3000}\x{FEFF}";

static DISALLOWED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(&format!("[^a-z0-9{SPACE_CLASS}]")).unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(&format!("[{SPACE_CLASS}]+")).unwrap());
static CHOSEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").unwrap());

/// Derives the base handle for a display name.
///
/// Lowercases, drops everything outside `[a-z0-9\s]`, turns each whitespace
/// run into a single `_`, trims the `_` left by leading and trailing runs and
/// pads results shorter than [`MIN_LEN`] with [`SHORT_SUFFIX`]. Total over all
/// inputs.
///
/// Underscores are not in the kept set, so a handle that already contains one
/// does not survive a second pass unchanged: `normalize("ada_lovelace")` is
/// `"adalovelace"`.
pub fn normalize(name: &str) -> String {
    let lowered = name.to_lowercase();
    let kept = DISALLOWED_RE.replace_all(&lowered, "");
    let joined = WHITESPACE_RE.replace_all(&kept, "_");

    let mut handle = joined.trim_matches('_').to_string();
    if handle.len() < MIN_LEN {
        handle.push_str(SHORT_SUFFIX);
    }
    handle
}

/// Checks a handle picked by the user (profile update), as opposed to one
/// derived by [`normalize`].
pub fn validate(username: &str) -> AppResult<()> {
    let len = username.chars().count();
    if !(CHOSEN_MIN_LEN..=CHOSEN_MAX_LEN).contains(&len) {
        return Err(DomainError::validation(
            "username",
            format!("must be between {CHOSEN_MIN_LEN} and {CHOSEN_MAX_LEN} characters"),
        ));
    }
    if !CHOSEN_RE.is_match(username) {
        return Err(DomainError::validation(
            "username",
            "Username can only contain lowercase letters, numbers, and underscores",
        ));
    }
    Ok(())
}

/// "Is this username already taken?" against the persistent store.
/// Case-sensitive exact match.
#[async_trait::async_trait]
pub trait UsernameLookup: Send + Sync {
    async fn exists(&self, candidate: &str) -> DbResult<bool>;
}

#[async_trait::async_trait]
impl UsernameLookup for dyn UserRepo {
    async fn exists(&self, candidate: &str) -> DbResult<bool> {
        self.username_taken(candidate, None).await
    }
}

#[derive(Debug, Error)]
pub enum AllocError {
    /// The lookup failed; passed through untouched
    #[error(transparent)]
    Lookup(#[from] DbError),

    /// Every candidate up to the probe limit was taken
    #[error("no free username for base '{base}' after {probes} probes")]
    Exhausted { base: String, probes: u32 },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UsernameAllocator {
    max_probes: Option<u32>,
}

impl UsernameAllocator {
    /// `None` searches until a free candidate turns up. `Some(n)` gives up
    /// after `n` taken candidates (at least one probe is always made).
    pub fn new(max_probes: Option<u32>) -> Self {
        Self {
            max_probes: max_probes.map(|n| n.max(1)),
        }
    }

    pub fn max_probes(&self) -> Option<u32> {
        self.max_probes
    }

    /// Returns the first of `base`, `base1`, `base2`, ... for which `lookup`
    /// reports no existing holder. Probes are issued one at a time.
    pub async fn allocate<L>(&self, name: &str, lookup: &L) -> Result<String, AllocError>
    where
        L: UsernameLookup + ?Sized,
    {
        let base = normalize(name);
        let mut candidate = base.clone();
        let mut suffix: u64 = 0;
        let mut probes: u32 = 0;

        loop {
            probes = probes.saturating_add(1);
            if !lookup.exists(&candidate).await? {
                tracing::debug!(%base, %candidate, probes, "username allocated");
                return Ok(candidate);
            }
            tracing::debug!(%candidate, "username taken");

            if let Some(max) = self.max_probes {
                if probes >= max {
                    tracing::warn!(%base, probes, "username probe limit reached");
                    return Err(AllocError::Exhausted { base, probes });
                }
            }

            suffix += 1;
            candidate = format!("{base}{suffix}");
        }
    }
}
