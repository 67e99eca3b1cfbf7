//! Account persistence
//!
//! Account rows live in two physical stores while the MySQL -> Postgres
//! migration is in flight. Everything above this module talks to the
//! [`AccountStore`] port; [`DualAccountStore`] fans writes out to both
//! backends with log-and-continue semantics on partial failure.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod account;
pub mod ban;
pub mod memory;
pub mod mysql;
pub mod postgres;

pub use account::{Account, Gender, Hwid, LoginState, NewAccount};
pub use ban::BanList;

/// Error types for account store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid stored login state: {0}")]
    InvalidLoginState(i16),

    #[error("invalid stored gender: {0}")]
    InvalidGender(i16),

    #[error("account not found: id={0}")]
    AccountNotFound(i32),

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence port for account rows.
///
/// Writers return `Ok(false)` when no row matched; callers log that and
/// move on - there is no automatic retry.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert(&self, account: &NewAccount) -> Result<i32, StoreError>;

    async fn find_by_id(&self, id: i32) -> Result<Option<Account>, StoreError>;

    /// Name lookup is case-insensitive.
    async fn find_by_name(&self, name: &str) -> Result<Option<Account>, StoreError>;

    /// Login state and last-login always move together so a transition
    /// stamp can never go stale against the state it belongs to.
    async fn set_login_state(
        &self,
        id: i32,
        state: LoginState,
        last_login: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn set_pin(&self, id: i32, pin: &str) -> Result<bool, StoreError>;

    async fn set_pic(&self, id: i32, pic: &str) -> Result<bool, StoreError>;

    async fn set_gender(&self, id: i32, gender: Gender) -> Result<bool, StoreError>;

    async fn set_chr_slots(&self, id: i32, slots: u8) -> Result<bool, StoreError>;

    async fn set_tos(&self, id: i32, accepted: bool) -> Result<bool, StoreError>;

    async fn set_hwid(&self, id: i32, hwid: &Hwid) -> Result<bool, StoreError>;
}

/// Migration-era fan-out over the two physical stores.
///
/// Reads are served by the primary (Postgres) store. Writes hit the legacy
/// store first, then the primary; a legacy failure is logged and never
/// rolled back or retried - the primary result is authoritative. Staleness
/// recovery bounds the window in which the stores can disagree about login
/// state.
pub struct DualAccountStore {
    primary: Arc<dyn AccountStore>,
    legacy: Option<Arc<dyn AccountStore>>,
}

impl DualAccountStore {
    pub fn new(primary: Arc<dyn AccountStore>, legacy: Option<Arc<dyn AccountStore>>) -> Self {
        Self { primary, legacy }
    }
}

/// Log a legacy-store write outcome. Partial failure is deliberate
/// log-and-continue; the primary result decides what the caller sees.
fn log_legacy_write(op: &str, id: i32, result: Result<bool, StoreError>) {
    match result {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("[store] [legacy_no_rows] op={} account={}", op, id);
        }
        Err(e) => {
            tracing::warn!("[store] [legacy_write_failed] op={} account={} err={}", op, id, e);
        }
    }
}

#[async_trait]
impl AccountStore for DualAccountStore {
    async fn insert(&self, account: &NewAccount) -> Result<i32, StoreError> {
        // Primary first: its generated id is the canonical one.
        let id = self.primary.insert(account).await?;
        if let Some(legacy) = &self.legacy {
            if let Err(e) = legacy.insert(account).await {
                tracing::warn!(
                    "[store] [legacy_insert_failed] name={} err={}",
                    account.name,
                    e
                );
            }
        }
        Ok(id)
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Account>, StoreError> {
        self.primary.find_by_id(id).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Account>, StoreError> {
        self.primary.find_by_name(name).await
    }

    async fn set_login_state(
        &self,
        id: i32,
        state: LoginState,
        last_login: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if let Some(legacy) = &self.legacy {
            log_legacy_write(
                "set_login_state",
                id,
                legacy.set_login_state(id, state, last_login).await,
            );
        }
        self.primary.set_login_state(id, state, last_login).await
    }

    async fn set_pin(&self, id: i32, pin: &str) -> Result<bool, StoreError> {
        if let Some(legacy) = &self.legacy {
            log_legacy_write("set_pin", id, legacy.set_pin(id, pin).await);
        }
        self.primary.set_pin(id, pin).await
    }

    async fn set_pic(&self, id: i32, pic: &str) -> Result<bool, StoreError> {
        if let Some(legacy) = &self.legacy {
            log_legacy_write("set_pic", id, legacy.set_pic(id, pic).await);
        }
        self.primary.set_pic(id, pic).await
    }

    async fn set_gender(&self, id: i32, gender: Gender) -> Result<bool, StoreError> {
        if let Some(legacy) = &self.legacy {
            log_legacy_write("set_gender", id, legacy.set_gender(id, gender).await);
        }
        self.primary.set_gender(id, gender).await
    }

    async fn set_chr_slots(&self, id: i32, slots: u8) -> Result<bool, StoreError> {
        if let Some(legacy) = &self.legacy {
            log_legacy_write("set_chr_slots", id, legacy.set_chr_slots(id, slots).await);
        }
        self.primary.set_chr_slots(id, slots).await
    }

    async fn set_tos(&self, id: i32, accepted: bool) -> Result<bool, StoreError> {
        if let Some(legacy) = &self.legacy {
            log_legacy_write("set_tos", id, legacy.set_tos(id, accepted).await);
        }
        self.primary.set_tos(id, accepted).await
    }

    async fn set_hwid(&self, id: i32, hwid: &Hwid) -> Result<bool, StoreError> {
        if let Some(legacy) = &self.legacy {
            log_legacy_write("set_hwid", id, legacy.set_hwid(id, hwid).await);
        }
        self.primary.set_hwid(id, hwid).await
    }
}
