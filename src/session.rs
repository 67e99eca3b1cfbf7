//! Per-connection session state
//!
//! One [`Session`] exists per live connection. It owns the authentication
//! state machine, the caches copied from the account row, and the locks
//! that serialize this player's business actions. Everything it depends on
//! (stores, registries, config) arrives through [`SessionContext`] at
//! construction time.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};

use crate::config::ServerConfig;
use crate::coordinator::{LoginBypassRegistry, SessionRegistry};
use crate::database::{Account, AccountStore, BanList, Gender, Hwid, LoginState, StoreError};
use crate::network::packet::Packet;

/// Failed login/PIN/PIC attempts allowed before the session is closed.
pub const MAX_FAILED_ATTEMPTS: u8 = 5;

/// Hard cap on character slots per account.
pub const MAX_CHR_SLOTS: u8 = 15;

/// How many of one session's actions may be in flight at once.
pub const ACTION_PERMITS: usize = 7;

/// Millisecond timestamp on the server-authoritative clock.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Which handler set is legal on this connection. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Login,
    Channel,
}

/// The in-game actor attached to an authenticated session.
///
/// The world side implements this; the session core only needs identity
/// for log context and [`Actor::empty`] for teardown.
pub trait Actor: Send + Sync {
    fn id(&self) -> i32;
    fn name(&self) -> String;
    fn map_id(&self) -> i32;
    /// Release the actor: cancel its schedules and, when asked, remove it
    /// from the world. Called exactly once, from session teardown.
    fn empty(&self, remove_from_world: bool);
}

/// Error types for transport writes
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
}

/// The outbound half of a connection, as seen by the session.
pub trait Transport: Send + Sync {
    /// Enqueue bytes for write-and-flush. Ordered per connection.
    fn send(&self, bytes: Bytes) -> Result<(), TransportError>;

    /// Whether the underlying connection still looks open.
    fn is_open(&self) -> bool;

    /// Shut the connection down. Idempotent.
    fn close(&self);
}

/// Shared services injected into every session.
pub struct SessionContext {
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn AccountStore>,
    pub bans: Arc<dyn BanList>,
    pub registry: Arc<SessionRegistry>,
    pub bypass: Arc<LoginBypassRegistry>,
}

/// Snapshot of account fields copied in at authentication time.
///
/// This is a read-through cache with documented staleness: only
/// `attach_account` and the AccountService setters update it, and
/// concurrent external writers win on a last-write basis.
struct AuthCache {
    account: Option<Account>,
    account_id: i32,
    account_name: Option<String>,
    pin: String,
    pic: String,
    gender: Option<Gender>,
    chr_slots: u8,
    birthdate: Option<NaiveDate>,
}

impl Default for AuthCache {
    fn default() -> Self {
        Self {
            account: None,
            account_id: -4,
            account_name: None,
            pin: String::new(),
            pic: String::new(),
            gender: None,
            chr_slots: 3,
            birthdate: None,
        }
    }
}

/// Holds one action permit plus the exclusive-execution lock.
///
/// Dropping the guard releases the lock first, then returns the permit;
/// drop glue makes the release happen exactly once on every exit path,
/// handler failures and panics included.
pub struct ActionGuard {
    _lock: OwnedMutexGuard<()>,
    _permit: OwnedSemaphorePermit,
}

pub struct Session {
    id: u64,
    kind: SessionKind,
    remote_addr: String,
    transport: Arc<dyn Transport>,
    ctx: Arc<SessionContext>,

    world: AtomicI32,
    channel: AtomicI32,

    auth: Mutex<AuthCache>,
    hwid: Mutex<Option<Hwid>>,
    macs: Mutex<HashSet<String>>,
    actor: Mutex<Option<Arc<dyn Actor>>>,

    logged_in: AtomicBool,
    in_transition: AtomicBool,

    login_attempts: AtomicU8,
    pin_attempts: AtomicU8,
    pic_attempts: AtomicU8,
    coupon_attempts: AtomicU8,

    disconnecting: AtomicBool,
    last_packet_ms: AtomicI64,
    last_pong_ms: AtomicI64,

    action_permits: Arc<Semaphore>,
    action_lock: Arc<tokio::sync::Mutex<()>>,
    send_lock: Mutex<()>,
}

impl Session {
    pub fn new(
        kind: SessionKind,
        id: u64,
        remote_addr: String,
        transport: Arc<dyn Transport>,
        world: i32,
        channel: i32,
        ctx: Arc<SessionContext>,
    ) -> Self {
        Self {
            id,
            kind,
            remote_addr,
            transport,
            ctx,
            world: AtomicI32::new(world),
            channel: AtomicI32::new(channel),
            auth: Mutex::new(AuthCache::default()),
            hwid: Mutex::new(None),
            macs: Mutex::new(HashSet::new()),
            actor: Mutex::new(None),
            logged_in: AtomicBool::new(false),
            in_transition: AtomicBool::new(false),
            login_attempts: AtomicU8::new(0),
            pin_attempts: AtomicU8::new(0),
            pic_attempts: AtomicU8::new(0),
            coupon_attempts: AtomicU8::new(0),
            disconnecting: AtomicBool::new(false),
            last_packet_ms: AtomicI64::new(now_ms()),
            last_pong_ms: AtomicI64::new(0),
            action_permits: Arc::new(Semaphore::new(ACTION_PERMITS)),
            action_lock: Arc::new(tokio::sync::Mutex::new(())),
            send_lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    // ============================================
    // Action concurrency
    // ============================================

    /// Try to start a business action. The permit attempt never waits: a
    /// drained pool means back off and let the client retry, with nothing
    /// taken. With a permit in hand the caller queues on the exclusive
    /// lock, so at most [`ACTION_PERMITS`] actions are in flight and
    /// exactly one executes.
    pub async fn try_acquire_action(&self) -> Option<ActionGuard> {
        let permit = Arc::clone(&self.action_permits).try_acquire_owned().ok()?;
        let lock = Arc::clone(&self.action_lock).lock_owned().await;
        Some(ActionGuard {
            _lock: lock,
            _permit: permit,
        })
    }

    /// Write a packet to the transport. Concurrent senders serialize on a
    /// lock of their own so a slow flush never contends with action
    /// execution.
    pub fn send(&self, packet: Packet) {
        let _guard = self.send_lock.lock().unwrap();
        if let Err(e) = self.transport.send(packet.into_bytes()) {
            tracing::debug!("[session] [send_failed] session={} err={}", self.id, e);
        }
    }

    /// Flip the disconnecting flag; true for exactly one caller, ever.
    /// All teardown runs behind the winning call.
    pub fn try_disconnect_once(&self) -> bool {
        self.disconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting.load(Ordering::SeqCst)
    }

    pub fn transport_open(&self) -> bool {
        self.transport.is_open()
    }

    // ============================================
    // Account snapshot
    // ============================================

    /// Copy the account's fields into the session cache. Called once the
    /// credential check passed.
    pub fn attach_account(&self, account: Account) {
        let mut auth = self.auth.lock().unwrap();
        auth.account_id = account.id;
        auth.account_name = Some(account.name.clone());
        auth.pin = account.pin.clone();
        auth.pic = account.pic.clone();
        auth.gender = account.gender;
        auth.chr_slots = account.chr_slots;
        auth.birthdate = Some(account.birthdate);
        auth.account = Some(account);
    }

    pub fn account(&self) -> Option<Account> {
        self.auth.lock().unwrap().account.clone()
    }

    pub fn account_id(&self) -> i32 {
        self.auth.lock().unwrap().account_id
    }

    pub fn account_name(&self) -> Option<String> {
        self.auth.lock().unwrap().account_name.clone()
    }

    pub fn pin(&self) -> String {
        self.auth.lock().unwrap().pin.clone()
    }

    pub fn pic(&self) -> String {
        self.auth.lock().unwrap().pic.clone()
    }

    pub fn gender(&self) -> Option<Gender> {
        self.auth.lock().unwrap().gender
    }

    pub fn chr_slots(&self) -> u8 {
        self.auth.lock().unwrap().chr_slots
    }

    pub fn can_gain_chr_slot(&self) -> bool {
        self.chr_slots() < MAX_CHR_SLOTS
    }

    pub fn temp_ban_until(&self) -> Option<DateTime<Utc>> {
        self.auth
            .lock()
            .unwrap()
            .account
            .as_ref()
            .and_then(|a| a.temp_banned_until)
    }

    pub fn check_birthdate(&self, date: NaiveDate) -> bool {
        self.auth.lock().unwrap().birthdate == Some(date)
    }

    // Cache mirrors, called by AccountService after a successful write so
    // reads stay consistent on this connection without a re-query.

    pub(crate) fn cache_pin(&self, pin: &str) {
        self.auth.lock().unwrap().pin = pin.to_string();
    }

    pub(crate) fn cache_pic(&self, pic: &str) {
        self.auth.lock().unwrap().pic = pic.to_string();
    }

    pub(crate) fn cache_gender(&self, gender: Gender) {
        self.auth.lock().unwrap().gender = Some(gender);
    }

    pub(crate) fn cache_chr_slots(&self, slots: u8) {
        self.auth.lock().unwrap().chr_slots = slots;
    }

    // ============================================
    // World / channel assignment
    // ============================================

    pub fn world(&self) -> i32 {
        self.world.load(Ordering::SeqCst)
    }

    pub fn set_world(&self, world: i32) {
        self.world.store(world, Ordering::SeqCst);
    }

    pub fn channel(&self) -> i32 {
        self.channel.load(Ordering::SeqCst)
    }

    pub fn set_channel(&self, channel: i32) {
        self.channel.store(channel, Ordering::SeqCst);
    }

    // ============================================
    // Login state machine
    // ============================================

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    pub fn is_in_transition(&self) -> bool {
        self.in_transition.load(Ordering::SeqCst)
    }

    /// Update the session-local view of the login state without touching
    /// the stores.
    pub fn apply_login_state(&self, state: LoginState) {
        match state {
            LoginState::NotLoggedIn => {
                self.logged_in.store(false, Ordering::SeqCst);
                self.in_transition.store(false, Ordering::SeqCst);
            }
            LoginState::ServerTransition => {
                self.logged_in.store(false, Ordering::SeqCst);
                self.in_transition.store(true, Ordering::SeqCst);
            }
            LoginState::LoggedIn => {
                self.logged_in.store(true, Ordering::SeqCst);
                self.in_transition.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Persist a login-state transition to every live store and mirror it
    /// locally. The last-login stamp comes from the server clock, never
    /// the database's. A store failure is logged and the local view still
    /// moves - staleness recovery bounds the inconsistency window.
    pub async fn update_login_state(&self, state: LoginState) {
        let account_id = self.account_id();
        if let Err(e) = self
            .ctx
            .store
            .set_login_state(account_id, state, Utc::now())
            .await
        {
            tracing::warn!(
                "[session] [login_state_write_failed] account={} state={:?} err={}",
                account_id,
                state,
                e
            );
        }
        self.apply_login_state(state);
    }

    /// Read the persisted login state, healing a crashed handoff: a
    /// `ServerTransition` older than the transition window is rewritten to
    /// `NotLoggedIn` before being returned.
    pub async fn fetch_login_state(&self) -> Result<LoginState, StoreError> {
        let account_id = self.account_id();
        let account = self
            .ctx
            .store
            .find_by_id(account_id)
            .await?
            .ok_or(StoreError::AccountNotFound(account_id))?;

        let mut state = account.login_state;
        if state == LoginState::ServerTransition && account.transition_expired(Utc::now()) {
            tracing::info!(
                "[session] [transition_healed] account={} last_login={:?}",
                account_id,
                account.last_login
            );
            state = LoginState::NotLoggedIn;
            self.update_login_state(LoginState::NotLoggedIn).await;
        } else {
            self.apply_login_state(state);
        }
        Ok(state)
    }

    /// Mark the character as leaving for another channel: persist
    /// `ServerTransition` and hand the registry a token the new connection
    /// will claim.
    pub async fn begin_transition(&self, chr_id: i32) {
        self.update_login_state(LoginState::ServerTransition).await;
        self.ctx
            .registry
            .begin_transition(&self.remote_addr, self.account_id(), chr_id);
    }

    // ============================================
    // Credential attempt policy
    // ============================================

    /// Count a password attempt. The cap forces a close and reports the
    /// attempt as spent; under the cap the caller proceeds to verify.
    pub async fn register_login_attempt(&self) -> bool {
        let attempts = self.login_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempts >= MAX_FAILED_ATTEMPTS {
            self.logged_in.store(false, Ordering::SeqCst);
            self.ctx.registry.close_session(self, false).await;
            return false;
        }
        true
    }

    /// Verify a PIN entry. Disabled or bypassed PIN checks pass outright.
    /// A correct entry resets the counter and earns a bypass grant; the
    /// cap closes the session.
    pub async fn check_pin(&self, entered: &str) -> bool {
        if !self.ctx.config.enable_pin || self.can_bypass_pin() {
            return true;
        }

        let expected = self.pin();
        let attempts = self.pin_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempts >= MAX_FAILED_ATTEMPTS {
            self.ctx.registry.close_session(self, false).await;
        }
        if expected == entered {
            self.pin_attempts.store(0, Ordering::SeqCst);
            if let Some(hwid) = self.hwid() {
                self.ctx.bypass.register(&hwid, self.account_id(), false);
            }
            return true;
        }
        false
    }

    /// Verify a PIC entry; same policy as [`Session::check_pin`].
    pub async fn check_pic(&self, entered: &str) -> bool {
        if !self.ctx.config.enable_pic || self.can_bypass_pic() {
            return true;
        }

        let expected = self.pic();
        let attempts = self.pic_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempts >= MAX_FAILED_ATTEMPTS {
            self.ctx.registry.close_session(self, false).await;
        }
        if expected == entered {
            self.pic_attempts.store(0, Ordering::SeqCst);
            if let Some(hwid) = self.hwid() {
                self.ctx.bypass.register(&hwid, self.account_id(), true);
            }
            return true;
        }
        false
    }

    pub fn can_bypass_pin(&self) -> bool {
        match self.hwid() {
            Some(hwid) => self.ctx.bypass.can_bypass(&hwid, self.account_id(), false),
            None => false,
        }
    }

    pub fn can_bypass_pic(&self) -> bool {
        match self.hwid() {
            Some(hwid) => self.ctx.bypass.can_bypass(&hwid, self.account_id(), true),
            None => false,
        }
    }

    /// Cash-shop coupon attempts: past the cap the counter silently
    /// resets and the attempt is refused.
    pub fn attempt_cash_coupon(&self) -> bool {
        if self.coupon_attempts.load(Ordering::SeqCst) > 2 {
            self.reset_cash_coupon();
            return false;
        }
        self.coupon_attempts.fetch_add(1, Ordering::SeqCst);
        true
    }

    pub fn reset_cash_coupon(&self) {
        self.coupon_attempts.store(0, Ordering::SeqCst);
    }

    // ============================================
    // Liveness
    // ============================================

    pub fn update_last_packet(&self) {
        self.last_packet_ms.store(now_ms(), Ordering::SeqCst);
    }

    pub fn last_packet_ms(&self) -> i64 {
        self.last_packet_ms.load(Ordering::SeqCst)
    }

    pub fn pong_received(&self) {
        self.last_pong_ms.store(now_ms(), Ordering::SeqCst);
    }

    pub fn last_pong_ms(&self) -> i64 {
        self.last_pong_ms.load(Ordering::SeqCst)
    }

    // ============================================
    // Hardware fingerprint and MACs
    // ============================================

    pub fn hwid(&self) -> Option<Hwid> {
        self.hwid.lock().unwrap().clone()
    }

    pub fn set_hwid(&self, hwid: Hwid) {
        *self.hwid.lock().unwrap() = Some(hwid);
    }

    /// Record the reported hardware id and persist it on the account.
    pub async fn update_hwid(&self, hwid: Hwid) {
        self.set_hwid(hwid.clone());
        if let Err(e) = self.ctx.store.set_hwid(self.account_id(), &hwid).await {
            tracing::warn!(
                "[session] [hwid_write_failed] account={} err={}",
                self.account_id(),
                e
            );
        }
    }

    /// Merge a client-reported "aa:bb, cc:dd" MAC list into the session.
    pub fn update_macs(&self, mac_data: &str) {
        let mut macs = self.macs.lock().unwrap();
        for mac in mac_data.split(", ") {
            if !mac.is_empty() {
                macs.insert(mac.to_string());
            }
        }
    }

    pub fn macs(&self) -> HashSet<String> {
        self.macs.lock().unwrap().clone()
    }

    pub async fn has_banned_ip(&self) -> bool {
        self.ctx.bans.is_ip_banned(&self.remote_addr).await
    }

    pub async fn has_banned_hwid(&self) -> bool {
        match self.hwid() {
            Some(hwid) => self.ctx.bans.is_hwid_banned(&hwid).await,
            None => false,
        }
    }

    pub async fn has_banned_macs(&self) -> bool {
        let macs = self.macs();
        if macs.is_empty() {
            return false;
        }
        self.ctx.bans.is_mac_banned(&macs).await
    }

    /// Write every MAC this session reported to the ban list.
    pub async fn ban_macs(&self) {
        let account_id = self.account_id();
        for mac in self.macs() {
            self.ctx.bans.save_mac_ban(account_id, &mac).await;
        }
    }

    // ============================================
    // Actor linkage
    // ============================================

    pub fn set_actor(&self, actor: Option<Arc<dyn Actor>>) {
        *self.actor.lock().unwrap() = actor;
    }

    pub fn actor(&self) -> Option<Arc<dyn Actor>> {
        self.actor.lock().unwrap().clone()
    }

    /// "name on map N" context for handler-failure logs.
    pub fn actor_context(&self) -> String {
        match self.actor() {
            Some(actor) => format!("{} on map {}", actor.name(), actor.map_id()),
            None => "?".to_string(),
        }
    }

    // ============================================
    // Teardown
    // ============================================

    /// Tear the session down. Safe to call from the transport-close path,
    /// explicit disconnects, and forced registry closes at once; only the
    /// caller that wins the disconnecting flag does any work.
    ///
    /// A session parked in server transition keeps its persisted state so
    /// the new connection can claim it.
    pub async fn disconnect(&self, forced: bool) {
        if !self.try_disconnect_once() {
            return;
        }

        tracing::info!(
            "[session] [disconnect] session={} addr={} account={} forced={}",
            self.id,
            self.remote_addr,
            self.account_id(),
            forced
        );

        let actor = self.actor.lock().unwrap().take();
        if let Some(actor) = actor {
            actor.empty(true);
        }

        let account_id = self.account_id();
        if account_id > 0 && !self.is_in_transition() {
            self.update_login_state(LoginState::NotLoggedIn).await;
        }
        if account_id > 0 {
            self.ctx.registry.unregister(self);
        }

        self.clear();
        self.transport.close();
    }

    /// Drop the caches so a torn-down session holds no account or
    /// hardware references.
    fn clear(&self) {
        *self.auth.lock().unwrap() = AuthCache::default();
        self.hwid.lock().unwrap().take();
        self.macs.lock().unwrap().clear();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("remote_addr", &self.remote_addr)
            .field("account_id", &self.account_id())
            .field("logged_in", &self.is_logged_in())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::{MemoryAccountStore, MemoryBanList};

    struct NullTransport;

    impl Transport for NullTransport {
        fn send(&self, _bytes: Bytes) -> Result<(), TransportError> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }

        fn close(&self) {}
    }

    fn test_context() -> Arc<SessionContext> {
        Arc::new(SessionContext {
            config: Arc::new(ServerConfig::test_only()),
            store: Arc::new(MemoryAccountStore::new()),
            bans: Arc::new(MemoryBanList::new()),
            registry: Arc::new(SessionRegistry::new()),
            bypass: Arc::new(LoginBypassRegistry::new()),
        })
    }

    fn test_session() -> Session {
        Session::new(
            SessionKind::Login,
            1,
            "127.0.0.1".to_string(),
            Arc::new(NullTransport),
            0,
            1,
            test_context(),
        )
    }

    fn sample_account(id: i32) -> Account {
        Account {
            id,
            name: "tester".to_string(),
            password: "hash".to_string(),
            pin: "1234".to_string(),
            pic: "9876".to_string(),
            birthdate: NaiveDate::default(),
            gender: None,
            tos_accepted: true,
            chr_slots: 3,
            login_state: LoginState::NotLoggedIn,
            last_login: None,
            banned: false,
            ban_reason: 0,
            ban_description: None,
            temp_banned_until: None,
        }
    }

    #[tokio::test]
    async fn test_action_pool_bounds_in_flight_actions() {
        let session = Arc::new(test_session());

        // One action executes; the rest of the pool parks on the lock.
        let executing = session.try_acquire_action().await;
        assert!(executing.is_some());

        let mut waiters = Vec::new();
        for _ in 0..ACTION_PERMITS - 1 {
            let s = Arc::clone(&session);
            waiters.push(tokio::spawn(async move {
                let guard = s.try_acquire_action().await;
                guard.is_some()
            }));
        }
        // let the waiters take their permits
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // pool is full: the attempt beyond capacity backs off
        assert!(session.try_acquire_action().await.is_none());

        // releasing the executing action drains the queue
        drop(executing);
        for waiter in waiters {
            assert!(waiter.await.unwrap());
        }

        // everything released: capacity is back
        assert!(session.try_acquire_action().await.is_some());
    }

    #[test]
    fn test_disconnect_flag_is_one_shot() {
        let session = test_session();
        assert!(session.try_disconnect_once());
        assert!(!session.try_disconnect_once());
        assert!(session.is_disconnecting());
    }

    #[test]
    fn test_apply_login_state_flags() {
        let session = test_session();

        session.apply_login_state(LoginState::LoggedIn);
        assert!(session.is_logged_in());
        assert!(!session.is_in_transition());

        session.apply_login_state(LoginState::ServerTransition);
        assert!(!session.is_logged_in());
        assert!(session.is_in_transition());

        session.apply_login_state(LoginState::NotLoggedIn);
        assert!(!session.is_logged_in());
        assert!(!session.is_in_transition());
    }

    #[test]
    fn test_coupon_attempts_silently_reset() {
        let session = test_session();
        assert!(session.attempt_cash_coupon());
        assert!(session.attempt_cash_coupon());
        assert!(session.attempt_cash_coupon());
        // counter now past the cap: refused once, then usable again
        assert!(!session.attempt_cash_coupon());
        assert!(session.attempt_cash_coupon());
    }

    #[test]
    fn test_update_macs_merges_and_dedupes() {
        let session = test_session();
        session.update_macs("00:11:22:33:44:55, 66:77:88:99:aa:bb");
        session.update_macs("00:11:22:33:44:55");
        assert_eq!(session.macs().len(), 2);
    }

    #[test]
    fn test_birthdate_check() {
        let session = test_session();
        let birthdate = NaiveDate::from_ymd_opt(2005, 5, 11).unwrap();

        let mut account = sample_account(7);
        account.birthdate = birthdate;
        session.attach_account(account);

        assert!(session.check_birthdate(birthdate));
        assert!(!session.check_birthdate(NaiveDate::from_ymd_opt(2005, 5, 12).unwrap()));
    }

    #[test]
    fn test_attach_account_fills_cache() {
        let session = test_session();
        session.attach_account(sample_account(42));

        assert_eq!(session.account_id(), 42);
        assert_eq!(session.account_name().as_deref(), Some("tester"));
        assert_eq!(session.chr_slots(), 3);
        assert!(session.can_gain_chr_slot());
    }
}
