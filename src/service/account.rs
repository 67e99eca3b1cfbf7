//! Account orchestration
//!
//! The sole writer path for account rows. Each operation is a small
//! transaction over the account store; persistence failures surface as
//! boolean results here, never as errors thrown through the dispatcher.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::coordinator::SessionRegistry;
use crate::database::{Account, AccountStore, Gender, LoginState, NewAccount, StoreError};
use crate::session::{Session, MAX_CHR_SLOTS};

/// Character slots a fresh account starts with.
pub const INITIAL_CHR_SLOTS: u8 = 3;

/// Birthdate seeded on new accounts: the service launch date.
fn default_birthdate() -> NaiveDate {
    NaiveDate::from_ymd_opt(2005, 5, 11).unwrap_or_default()
}

pub struct AccountService {
    store: Arc<dyn AccountStore>,
    registry: Arc<SessionRegistry>,
}

impl AccountService {
    pub fn new(store: Arc<dyn AccountStore>, registry: Arc<SessionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Create an account with seeded defaults. The returned row is
    /// re-read from the store so database-generated fields are real, not
    /// whatever the insert payload claimed.
    pub async fn create_account(&self, name: &str, password: &str) -> Result<Account, StoreError> {
        let account = NewAccount {
            name: name.to_string(),
            password: bcrypt::hash(password, bcrypt::DEFAULT_COST)?,
            pin: String::new(),
            pic: String::new(),
            birthdate: default_birthdate(),
            gender: None,
            chr_slots: INITIAL_CHR_SLOTS,
            login_state: LoginState::NotLoggedIn,
        };

        let id = self.store.insert(&account).await?;
        tracing::info!("[account] [created] account={} name={}", id, name);

        self.store
            .find_by_id(id)
            .await?
            .ok_or(StoreError::AccountNotFound(id))
    }

    /// Case-insensitive name lookup, with stale-transition healing applied
    /// to whatever comes back.
    pub async fn account_by_name(&self, name: &str) -> Result<Option<Account>, StoreError> {
        match self.store.find_by_name(name).await? {
            Some(account) => Ok(Some(self.heal_stale_transition(account).await)),
            None => Ok(None),
        }
    }

    pub async fn account_by_id(&self, id: i32) -> Result<Option<Account>, StoreError> {
        match self.store.find_by_id(id).await? {
            Some(account) => Ok(Some(self.heal_stale_transition(account).await)),
            None => Ok(None),
        }
    }

    /// Opportunistic staleness recovery: any load that observes a
    /// `ServerTransition` past its window rewrites it to `NotLoggedIn`
    /// before handing the row on.
    async fn heal_stale_transition(&self, mut account: Account) -> Account {
        if account.login_state == LoginState::ServerTransition
            && account.transition_expired(Utc::now())
        {
            tracing::info!(
                "[account] [transition_healed] account={} last_login={:?}",
                account.id,
                account.last_login
            );
            if let Err(e) = self
                .store
                .set_login_state(account.id, LoginState::NotLoggedIn, Utc::now())
                .await
            {
                tracing::warn!(
                    "[account] [transition_heal_failed] account={} err={}",
                    account.id,
                    e
                );
            }
            account.login_state = LoginState::NotLoggedIn;
        }
        account
    }

    /// Accept the terms of service. Idempotent: false when already
    /// accepted (or the account is gone), true when this call flipped it.
    pub async fn accept_tos(&self, account_id: i32) -> bool {
        let account = match self.store.find_by_id(account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!("[account] [tos_read_failed] account={} err={}", account_id, e);
                return false;
            }
        };
        if account.tos_accepted {
            return false;
        }
        match self.store.set_tos(account_id, true).await {
            Ok(true) => true,
            Ok(false) => false,
            Err(e) => {
                tracing::warn!("[account] [tos_write_failed] account={} err={}", account_id, e);
                false
            }
        }
    }

    pub async fn set_gender(&self, session: &Session, gender: Gender) -> bool {
        let account_id = session.account_id();
        let ok = match self.store.set_gender(account_id, gender).await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(
                    "[account] [set_gender_failed] account={} err={}",
                    account_id,
                    e
                );
                false
            }
        };
        if ok {
            session.cache_gender(gender);
        }
        ok
    }

    pub async fn set_pin(&self, session: &Session, pin: &str) -> bool {
        let account_id = session.account_id();
        let ok = match self.store.set_pin(account_id, pin).await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!("[account] [set_pin_failed] account={} err={}", account_id, e);
                false
            }
        };
        if ok {
            session.cache_pin(pin);
        }
        ok
    }

    pub async fn set_pic(&self, session: &Session, pic: &str) -> bool {
        let account_id = session.account_id();
        let ok = match self.store.set_pic(account_id, pic).await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!("[account] [set_pic_failed] account={} err={}", account_id, e);
                false
            }
        };
        if ok {
            session.cache_pic(pic);
        }
        ok
    }

    /// Grant one more character slot, up to the account cap.
    pub async fn add_chr_slot(&self, session: &Session) -> bool {
        let current = session.chr_slots();
        if current >= MAX_CHR_SLOTS {
            return false;
        }

        let account_id = session.account_id();
        let slots = current + 1;
        match self.store.set_chr_slots(account_id, slots).await {
            Ok(true) => {
                session.cache_chr_slots(slots);
                true
            }
            Ok(false) => {
                tracing::warn!("[account] [chr_slot_no_rows] account={}", account_id);
                false
            }
            Err(e) => {
                tracing::warn!(
                    "[account] [chr_slot_write_failed] account={} err={}",
                    account_id,
                    e
                );
                false
            }
        }
    }

    /// Move the session's account to `LoggedIn`. Refused when the
    /// persisted state says the account is already live somewhere else -
    /// the data-layer half of the single-session guarantee, behind the
    /// registry's in-memory half.
    pub async fn log_in(&self, session: &Session) -> bool {
        let state = match session.fetch_login_state().await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(
                    "[account] [login_state_read_failed] account={} err={}",
                    session.account_id(),
                    e
                );
                return false;
            }
        };

        if state != LoginState::NotLoggedIn && state != LoginState::ServerTransition {
            return false;
        }

        session.update_login_state(LoginState::LoggedIn).await;
        true
    }

    /// Log the session's account out. Never refused: the registry drops
    /// the mapping and the stores get `NotLoggedIn` whatever the prior
    /// state was.
    pub async fn log_out(&self, session: &Session) {
        let account_id = session.account_id();
        self.registry.close_session(session, false).await;

        if account_id > 0 {
            if let Err(e) = self
                .store
                .set_login_state(account_id, LoginState::NotLoggedIn, Utc::now())
                .await
            {
                tracing::warn!(
                    "[account] [logout_write_failed] account={} err={}",
                    account_id,
                    e
                );
            }
        }
        session.apply_login_state(LoginState::NotLoggedIn);
    }
}
