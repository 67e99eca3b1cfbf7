//! In-memory store implementations
//!
//! Back the test suite and offline tooling; no database required. The
//! account map mimics both SQL stores closely enough that the service and
//! session layers cannot tell the difference.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::account::{Account, Gender, Hwid, LoginState, NewAccount};
use super::ban::BanList;
use super::{AccountStore, StoreError};

pub struct MemoryAccountStore {
    rows: Mutex<HashMap<i32, Account>>,
    next_id: AtomicI32,
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            next_id: AtomicI32::new(1),
        }
    }

    /// Insert a fully-formed row under its own id, for seeding test state.
    pub fn seed(&self, account: Account) {
        self.next_id.fetch_max(account.id + 1, Ordering::SeqCst);
        self.rows.lock().unwrap().insert(account.id, account);
    }

    fn update<F: FnOnce(&mut Account)>(&self, id: i32, apply: F) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(account) => {
                apply(account);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn insert(&self, account: &NewAccount) -> Result<i32, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let row = Account {
            id,
            name: account.name.clone(),
            password: account.password.clone(),
            pin: account.pin.clone(),
            pic: account.pic.clone(),
            birthdate: account.birthdate,
            gender: account.gender,
            tos_accepted: false,
            chr_slots: account.chr_slots,
            login_state: account.login_state,
            last_login: None,
            banned: false,
            ban_reason: 0,
            ban_description: None,
            temp_banned_until: None,
        };
        self.rows.lock().unwrap().insert(id, row);
        Ok(id)
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Account>, StoreError> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn set_login_state(
        &self,
        id: i32,
        state: LoginState,
        last_login: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.update(id, |a| {
            a.login_state = state;
            a.last_login = Some(last_login);
        })
    }

    async fn set_pin(&self, id: i32, pin: &str) -> Result<bool, StoreError> {
        self.update(id, |a| a.pin = pin.to_string())
    }

    async fn set_pic(&self, id: i32, pic: &str) -> Result<bool, StoreError> {
        self.update(id, |a| a.pic = pic.to_string())
    }

    async fn set_gender(&self, id: i32, gender: Gender) -> Result<bool, StoreError> {
        self.update(id, |a| a.gender = Some(gender))
    }

    async fn set_chr_slots(&self, id: i32, slots: u8) -> Result<bool, StoreError> {
        self.update(id, |a| a.chr_slots = slots)
    }

    async fn set_tos(&self, id: i32, accepted: bool) -> Result<bool, StoreError> {
        self.update(id, |a| a.tos_accepted = accepted)
    }

    async fn set_hwid(&self, id: i32, _hwid: &Hwid) -> Result<bool, StoreError> {
        // The memory schema does not keep the fingerprint; report whether
        // the row exists so callers see the same success signal.
        self.update(id, |_| {})
    }
}

#[derive(Default)]
pub struct MemoryBanList {
    ips: Mutex<HashSet<String>>,
    hwids: Mutex<HashSet<String>>,
    macs: Mutex<HashSet<String>>,
}

impl MemoryBanList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ban_ip(&self, ip: &str) {
        self.ips.lock().unwrap().insert(ip.to_string());
    }

    pub fn ban_hwid(&self, hwid: &Hwid) {
        self.hwids.lock().unwrap().insert(hwid.as_str().to_string());
    }

    pub fn ban_mac(&self, mac: &str) {
        self.macs.lock().unwrap().insert(mac.to_string());
    }
}

#[async_trait]
impl BanList for MemoryBanList {
    async fn is_ip_banned(&self, ip: &str) -> bool {
        self.ips.lock().unwrap().contains(ip)
    }

    async fn is_hwid_banned(&self, hwid: &Hwid) -> bool {
        self.hwids.lock().unwrap().contains(hwid.as_str())
    }

    async fn is_mac_banned(&self, macs: &HashSet<String>) -> bool {
        let banned = self.macs.lock().unwrap();
        macs.iter().any(|mac| banned.contains(mac))
    }

    async fn save_mac_ban(&self, _account_id: i32, mac: &str) -> bool {
        self.macs.lock().unwrap().insert(mac.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids() {
        let store = MemoryAccountStore::new();
        let account = NewAccount {
            name: "alice".to_string(),
            password: "hash".to_string(),
            pin: String::new(),
            pic: String::new(),
            birthdate: chrono::NaiveDate::default(),
            gender: None,
            chr_slots: 3,
            login_state: LoginState::NotLoggedIn,
        };

        let first = store.insert(&account).await.unwrap();
        let second = store.insert(&account).await.unwrap();
        assert_eq!(second, first + 1);
    }

    #[tokio::test]
    async fn test_find_by_name_ignores_case() {
        let store = MemoryAccountStore::new();
        let account = NewAccount {
            name: "Alice".to_string(),
            password: "hash".to_string(),
            pin: String::new(),
            pic: String::new(),
            birthdate: chrono::NaiveDate::default(),
            gender: None,
            chr_slots: 3,
            login_state: LoginState::NotLoggedIn,
        };
        store.insert(&account).await.unwrap();

        assert!(store.find_by_name("aLiCe").await.unwrap().is_some());
        assert!(store.find_by_name("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writers_report_missing_rows() {
        let store = MemoryAccountStore::new();
        assert!(!store.set_pin(42, "1234").await.unwrap());
    }

    #[tokio::test]
    async fn test_mac_ban_matches_any_reported_mac() {
        let bans = MemoryBanList::new();
        bans.ban_mac("00:11:22:33:44:55");

        let mut macs = HashSet::new();
        macs.insert("66:77:88:99:aa:bb".to_string());
        assert!(!bans.is_mac_banned(&macs).await);

        macs.insert("00:11:22:33:44:55".to_string());
        assert!(bans.is_mac_banned(&macs).await);
    }
}
