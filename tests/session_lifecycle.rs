use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};

use astra::config::ServerConfig;
use astra::coordinator::{LoginBypassRegistry, SessionRegistry};
use astra::database::memory::{MemoryAccountStore, MemoryBanList};
use astra::database::{Account, AccountStore, Hwid, LoginState};
use astra::network::packet::PacketBuilder;
use astra::network::{HandlerFailure, InPacket, LivenessMonitor, PacketHandler, PacketProcessor};
use astra::network::liveness::IdleKind;
use astra::service::AccountService;
use astra::session::{Actor, Session, SessionContext, SessionKind, Transport, TransportError};

// ============================================
// Test doubles
// ============================================

struct RecordingTransport {
    sent: Mutex<Vec<Bytes>>,
    open: AtomicBool,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
        })
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, bytes: Bytes) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.sent.lock().unwrap().push(bytes);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

struct TestActor {
    released: AtomicBool,
}

impl Actor for TestActor {
    fn id(&self) -> i32 {
        100
    }

    fn name(&self) -> String {
        "Tester".to_string()
    }

    fn map_id(&self) -> i32 {
        104000000
    }

    fn empty(&self, _remove_from_world: bool) {
        self.released.store(true, Ordering::SeqCst);
    }
}

struct Harness {
    store: Arc<MemoryAccountStore>,
    bans: Arc<MemoryBanList>,
    registry: Arc<SessionRegistry>,
    bypass: Arc<LoginBypassRegistry>,
    ctx: Arc<SessionContext>,
}

fn harness_with(config: ServerConfig) -> Harness {
    let store = Arc::new(MemoryAccountStore::new());
    let bans = Arc::new(MemoryBanList::new());
    let registry = Arc::new(SessionRegistry::new());
    let bypass = Arc::new(LoginBypassRegistry::new());
    let ctx = Arc::new(SessionContext {
        config: Arc::new(config),
        store: store.clone() as Arc<dyn AccountStore>,
        bans: bans.clone(),
        registry: Arc::clone(&registry),
        bypass: Arc::clone(&bypass),
    });
    Harness {
        store,
        bans,
        registry,
        bypass,
        ctx,
    }
}

fn harness() -> Harness {
    harness_with(ServerConfig::test_only())
}

impl Harness {
    fn session(&self, id: u64, kind: SessionKind) -> (Arc<Session>, Arc<RecordingTransport>) {
        let transport = RecordingTransport::new();
        let session = Arc::new(Session::new(
            kind,
            id,
            "127.0.0.1".to_string(),
            transport.clone(),
            0,
            1,
            Arc::clone(&self.ctx),
        ));
        (session, transport)
    }

    fn service(&self) -> AccountService {
        AccountService::new(
            self.store.clone() as Arc<dyn AccountStore>,
            Arc::clone(&self.registry),
        )
    }
}

fn seeded_account(id: i32, state: LoginState, last_login_secs_ago: Option<i64>) -> Account {
    Account {
        id,
        name: format!("player{id}"),
        password: "hash".to_string(),
        pin: "1234".to_string(),
        pic: "987654".to_string(),
        birthdate: NaiveDate::from_ymd_opt(2005, 5, 11).unwrap(),
        gender: None,
        tos_accepted: false,
        chr_slots: 3,
        login_state: state,
        last_login: last_login_secs_ago.map(|s| Utc::now() - ChronoDuration::seconds(s)),
        banned: false,
        ban_reason: 0,
        ban_description: None,
        temp_banned_until: None,
    }
}

// ============================================
// Disconnect and teardown
// ============================================

#[tokio::test]
async fn test_disconnect_once_wins_exactly_one_race() {
    let harness = harness();
    let (session, _) = harness.session(1, SessionKind::Channel);

    let wins = Arc::new(AtomicUsize::new(0));
    let mut tasks = Vec::new();
    for _ in 0..32 {
        let session = Arc::clone(&session);
        let wins = Arc::clone(&wins);
        tasks.push(tokio::spawn(async move {
            if session.try_disconnect_once() {
                wins.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(wins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_disconnect_releases_actor_and_clears_caches() {
    let harness = harness();
    let (session, transport) = harness.session(1, SessionKind::Channel);

    harness.store.seed(seeded_account(5, LoginState::LoggedIn, Some(0)));
    session.attach_account(harness.store.find_by_id(5).await.unwrap().unwrap());
    session.apply_login_state(LoginState::LoggedIn);
    harness.registry.register(5, &session).unwrap();

    let actor = Arc::new(TestActor {
        released: AtomicBool::new(false),
    });
    session.set_actor(Some(actor.clone()));

    session.disconnect(false).await;

    assert!(actor.released.load(Ordering::SeqCst));
    assert!(session.actor().is_none());
    assert!(session.account().is_none());
    assert!(harness.registry.online_session(5).is_none());
    assert!(!transport.is_open());

    // persisted state moved back to NotLoggedIn
    let row = harness.store.find_by_id(5).await.unwrap().unwrap();
    assert_eq!(row.login_state, LoginState::NotLoggedIn);

    // second disconnect is a no-op, not a double teardown
    session.disconnect(false).await;
}

#[tokio::test]
async fn test_disconnect_in_transition_keeps_persisted_state() {
    let harness = harness();
    let (session, _) = harness.session(1, SessionKind::Channel);

    harness.store.seed(seeded_account(6, LoginState::LoggedIn, Some(0)));
    session.attach_account(harness.store.find_by_id(6).await.unwrap().unwrap());
    session.begin_transition(42).await;

    session.disconnect(false).await;

    // the handoff state survives for the next connection to claim
    let row = harness.store.find_by_id(6).await.unwrap().unwrap();
    assert_eq!(row.login_state, LoginState::ServerTransition);

    let token = harness.registry.claim_transition("127.0.0.1").unwrap();
    assert_eq!(token.account_id, 6);
    assert_eq!(token.chr_id, 42);
    assert!(harness.registry.claim_transition("127.0.0.1").is_none());
}

// ============================================
// Login state machine
// ============================================

#[tokio::test]
async fn test_stale_transition_heals_on_read() {
    let harness = harness();
    let (session, _) = harness.session(1, SessionKind::Login);

    harness
        .store
        .seed(seeded_account(10, LoginState::ServerTransition, Some(31)));
    session.attach_account(harness.store.find_by_id(10).await.unwrap().unwrap());

    let state = session.fetch_login_state().await.unwrap();
    assert_eq!(state, LoginState::NotLoggedIn);

    // the healed value was written through, not just returned
    let row = harness.store.find_by_id(10).await.unwrap().unwrap();
    assert_eq!(row.login_state, LoginState::NotLoggedIn);
}

#[tokio::test]
async fn test_fresh_transition_returned_unchanged() {
    let harness = harness();
    let (session, _) = harness.session(1, SessionKind::Login);

    harness
        .store
        .seed(seeded_account(11, LoginState::ServerTransition, Some(29)));
    session.attach_account(harness.store.find_by_id(11).await.unwrap().unwrap());

    let state = session.fetch_login_state().await.unwrap();
    assert_eq!(state, LoginState::ServerTransition);
    assert!(session.is_in_transition());

    let row = harness.store.find_by_id(11).await.unwrap().unwrap();
    assert_eq!(row.login_state, LoginState::ServerTransition);
}

#[tokio::test]
async fn test_log_in_refused_when_already_logged_in() {
    let harness = harness();
    let service = harness.service();
    let (session, _) = harness.session(1, SessionKind::Login);

    harness.store.seed(seeded_account(12, LoginState::LoggedIn, Some(0)));
    session.attach_account(harness.store.find_by_id(12).await.unwrap().unwrap());

    assert!(!service.log_in(&session).await);
    assert!(!session.is_logged_in());
}

#[tokio::test]
async fn test_log_in_allowed_from_not_logged_in_and_transition() {
    let harness = harness();
    let service = harness.service();

    harness.store.seed(seeded_account(13, LoginState::NotLoggedIn, None));
    let (session, _) = harness.session(1, SessionKind::Login);
    session.attach_account(harness.store.find_by_id(13).await.unwrap().unwrap());
    assert!(service.log_in(&session).await);
    assert!(session.is_logged_in());
    let row = harness.store.find_by_id(13).await.unwrap().unwrap();
    assert_eq!(row.login_state, LoginState::LoggedIn);

    harness
        .store
        .seed(seeded_account(14, LoginState::ServerTransition, Some(5)));
    let (session, _) = harness.session(2, SessionKind::Channel);
    session.attach_account(harness.store.find_by_id(14).await.unwrap().unwrap());
    assert!(service.log_in(&session).await);
}

#[tokio::test]
async fn test_log_out_never_refused() {
    let harness = harness();
    let service = harness.service();
    let (session, transport) = harness.session(1, SessionKind::Channel);

    harness.store.seed(seeded_account(15, LoginState::LoggedIn, Some(0)));
    session.attach_account(harness.store.find_by_id(15).await.unwrap().unwrap());
    session.apply_login_state(LoginState::LoggedIn);
    harness.registry.register(15, &session).unwrap();

    service.log_out(&session).await;

    assert!(!session.is_logged_in());
    assert!(harness.registry.online_session(15).is_none());
    assert!(!transport.is_open());
    let row = harness.store.find_by_id(15).await.unwrap().unwrap();
    assert_eq!(row.login_state, LoginState::NotLoggedIn);
}

// ============================================
// Credential attempt policy
// ============================================

#[tokio::test]
async fn test_fifth_failed_pin_forces_disconnect() {
    let mut config = ServerConfig::test_only();
    config.enable_pin = true;
    let harness = harness_with(config);
    let (session, _) = harness.session(1, SessionKind::Login);

    harness.store.seed(seeded_account(20, LoginState::NotLoggedIn, None));
    session.attach_account(harness.store.find_by_id(20).await.unwrap().unwrap());

    for _ in 0..4 {
        assert!(!session.check_pin("0000").await);
        assert!(!session.is_disconnecting());
    }
    assert!(!session.check_pin("0000").await);
    assert!(session.is_disconnecting());
}

#[tokio::test]
async fn test_correct_pin_resets_counter_and_grants_bypass() {
    let mut config = ServerConfig::test_only();
    config.enable_pin = true;
    let harness = harness_with(config);
    let (session, _) = harness.session(1, SessionKind::Login);

    harness.store.seed(seeded_account(21, LoginState::NotLoggedIn, None));
    session.attach_account(harness.store.find_by_id(21).await.unwrap().unwrap());
    session.set_hwid(Hwid::new("hwid-21"));

    assert!(!session.check_pin("0000").await);
    assert!(!session.check_pin("1111").await);
    assert!(session.check_pin("1234").await);
    assert!(!session.is_disconnecting());

    // the grant lets the next prompt skip the PIN entirely
    assert!(session.can_bypass_pin());
    assert!(harness.bypass.can_bypass(&Hwid::new("hwid-21"), 21, false));
    assert!(session.check_pin("wrong-but-bypassed").await);
}

#[tokio::test]
async fn test_fifth_failed_pic_forces_disconnect() {
    let mut config = ServerConfig::test_only();
    config.enable_pic = true;
    let harness = harness_with(config);
    let (session, _) = harness.session(1, SessionKind::Channel);

    harness.store.seed(seeded_account(22, LoginState::NotLoggedIn, None));
    session.attach_account(harness.store.find_by_id(22).await.unwrap().unwrap());

    for _ in 0..4 {
        assert!(!session.check_pic("000000").await);
    }
    assert!(!session.check_pic("000000").await);
    assert!(session.is_disconnecting());
}

#[tokio::test]
async fn test_pin_check_passes_when_disabled() {
    let harness = harness(); // enable_pin = false
    let (session, _) = harness.session(1, SessionKind::Login);
    assert!(session.check_pin("anything").await);
}

#[tokio::test]
async fn test_fifth_login_attempt_forces_disconnect() {
    let harness = harness();
    let (session, _) = harness.session(1, SessionKind::Login);

    for _ in 0..4 {
        assert!(session.register_login_attempt().await);
    }
    assert!(!session.register_login_attempt().await);
    assert!(session.is_disconnecting());
}

// ============================================
// Dispatcher
// ============================================

struct ViolationHandler;

#[async_trait]
impl PacketHandler for ViolationHandler {
    fn validate_state(&self, _session: &Session) -> bool {
        true
    }

    async fn handle(
        &self,
        _packet: InPacket,
        _session: &Arc<Session>,
    ) -> Result<(), HandlerFailure> {
        Err(HandlerFailure::Violation("item duplication".to_string()))
    }
}

struct FailingHandler;

#[async_trait]
impl PacketHandler for FailingHandler {
    fn validate_state(&self, _session: &Session) -> bool {
        true
    }

    async fn handle(
        &self,
        _packet: InPacket,
        _session: &Arc<Session>,
    ) -> Result<(), HandlerFailure> {
        Err(anyhow::anyhow!("handler exploded").into())
    }
}

struct CountingHandler {
    calls: AtomicUsize,
}

#[async_trait]
impl PacketHandler for CountingHandler {
    async fn handle(
        &self,
        _packet: InPacket,
        _session: &Arc<Session>,
    ) -> Result<(), HandlerFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn frame(opcode: u16) -> Bytes {
    PacketBuilder::new(opcode).build().into_bytes()
}

#[tokio::test]
async fn test_unregistered_opcode_is_dropped_quietly() {
    let harness = harness();
    let (session, transport) = harness.session(1, SessionKind::Channel);
    let processor = PacketProcessor::new(Arc::clone(&harness.registry));

    let before = session.last_packet_ms();
    tokio::time::sleep(Duration::from_millis(10)).await;
    processor.dispatch(&session, frame(0x7777)).await;

    assert!(!session.is_disconnecting());
    assert!(transport.is_open());
    assert!(session.last_packet_ms() > before);
}

#[tokio::test]
async fn test_state_rejected_opcode_never_reaches_handler() {
    let harness = harness();
    let (session, _) = harness.session(1, SessionKind::Channel);
    // session is not logged in, so the default state check refuses
    let handler = Arc::new(CountingHandler {
        calls: AtomicUsize::new(0),
    });
    let mut processor = PacketProcessor::new(Arc::clone(&harness.registry));
    processor.register(0x0042, handler.clone());

    processor.dispatch(&session, frame(0x0042)).await;

    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    assert!(!session.is_disconnecting());
}

#[tokio::test]
async fn test_violation_forces_disconnect() {
    let harness = harness();
    let (session, transport) = harness.session(1, SessionKind::Channel);
    let mut processor = PacketProcessor::new(Arc::clone(&harness.registry));
    processor.register(0x0043, Arc::new(ViolationHandler));

    processor.dispatch(&session, frame(0x0043)).await;

    assert!(session.is_disconnecting());
    assert!(!transport.is_open());
}

#[tokio::test]
async fn test_handler_failure_keeps_connection_alive() {
    let harness = harness();
    let (session, transport) = harness.session(1, SessionKind::Channel);
    let mut processor = PacketProcessor::new(Arc::clone(&harness.registry));
    processor.register(0x0044, Arc::new(FailingHandler));

    let before = session.last_packet_ms();
    tokio::time::sleep(Duration::from_millis(10)).await;
    processor.dispatch(&session, frame(0x0044)).await;

    assert!(!session.is_disconnecting());
    assert!(transport.is_open());
    assert!(session.last_packet_ms() > before);
}

#[tokio::test]
async fn test_malformed_frame_is_fatal() {
    let harness = harness();
    let (session, _) = harness.session(1, SessionKind::Channel);
    let processor = PacketProcessor::new(Arc::clone(&harness.registry));

    // one byte: no opcode to read
    processor.dispatch(&session, Bytes::from_static(&[0x01])).await;

    assert!(session.is_disconnecting());
}

// ============================================
// Liveness
// ============================================

#[tokio::test]
async fn test_idle_without_pong_disconnects() {
    let harness = harness();
    let (session, transport) = harness.session(1, SessionKind::Channel);
    let monitor = LivenessMonitor::with_pong_wait(Duration::from_millis(50));

    monitor.on_idle(&session, IdleKind::ReaderIdle);
    assert_eq!(transport.sent_count(), 1); // the ping went out

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(session.is_disconnecting());
    assert!(!transport.is_open());
}

#[tokio::test]
async fn test_pong_after_ping_survives_check() {
    let harness = harness();
    let (session, _) = harness.session(1, SessionKind::Channel);
    let monitor = LivenessMonitor::with_pong_wait(Duration::from_millis(50));

    monitor.on_idle(&session, IdleKind::ReaderIdle);
    tokio::time::sleep(Duration::from_millis(10)).await;
    session.pong_received();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!session.is_disconnecting());
}

// ============================================
// Account service
// ============================================

#[tokio::test]
async fn test_create_account_round_trip() {
    let harness = harness();
    let service = harness.service();

    let created = service.create_account("alice", "hunter2").await.unwrap();
    let read_back = service.account_by_id(created.id).await.unwrap().unwrap();

    assert_eq!(read_back.name, "alice");
    assert_eq!(
        read_back.birthdate,
        NaiveDate::from_ymd_opt(2005, 5, 11).unwrap()
    );
    assert_eq!(read_back.chr_slots, 3);
    assert_eq!(read_back.login_state, LoginState::NotLoggedIn);
    assert!(read_back.gender.is_none());

    // the stored password is a hash of the input, not the input
    assert_ne!(read_back.password, "hunter2");
    assert!(bcrypt::verify("hunter2", &read_back.password).unwrap());
}

#[tokio::test]
async fn test_accept_tos_is_idempotent() {
    let harness = harness();
    let service = harness.service();

    let account = service.create_account("bob", "pw123456").await.unwrap();
    assert!(service.accept_tos(account.id).await);
    assert!(!service.accept_tos(account.id).await);
    assert!(!service.accept_tos(99999).await);
}

#[tokio::test]
async fn test_setters_mirror_into_session_cache() {
    let harness = harness();
    let service = harness.service();
    let (session, _) = harness.session(1, SessionKind::Channel);

    let account = service.create_account("carol", "pw123456").await.unwrap();
    session.attach_account(account.clone());

    assert!(service.set_pin(&session, "4321").await);
    assert_eq!(session.pin(), "4321");

    assert!(service.set_pic(&session, "111111").await);
    assert_eq!(session.pic(), "111111");

    assert!(
        service
            .set_gender(&session, astra::database::Gender::Female)
            .await
    );
    assert_eq!(session.gender(), Some(astra::database::Gender::Female));

    // cache matches what a re-read would see
    let row = harness.store.find_by_id(account.id).await.unwrap().unwrap();
    assert_eq!(row.pin, "4321");
    assert_eq!(row.pic, "111111");
}

#[tokio::test]
async fn test_chr_slots_capped() {
    let harness = harness();
    let service = harness.service();
    let (session, _) = harness.session(1, SessionKind::Channel);

    let account = service.create_account("dave", "pw123456").await.unwrap();
    session.attach_account(account);

    // 3 seeded, cap at 15
    for expected in 4..=15u8 {
        assert!(service.add_chr_slot(&session).await);
        assert_eq!(session.chr_slots(), expected);
    }
    assert!(!service.add_chr_slot(&session).await);
    assert_eq!(session.chr_slots(), 15);
}

#[tokio::test]
async fn test_account_lookup_heals_stale_transition() {
    let harness = harness();
    let service = harness.service();

    harness
        .store
        .seed(seeded_account(30, LoginState::ServerTransition, Some(45)));

    let account = service.account_by_name("PLAYER30").await.unwrap().unwrap();
    assert_eq!(account.login_state, LoginState::NotLoggedIn);

    let row = harness.store.find_by_id(30).await.unwrap().unwrap();
    assert_eq!(row.login_state, LoginState::NotLoggedIn);
}

// ============================================
// Ban checks
// ============================================

#[tokio::test]
async fn test_ban_predicates_and_mac_ban_write() {
    let harness = harness();
    let (session, _) = harness.session(1, SessionKind::Login);

    assert!(!session.has_banned_ip().await);
    harness.bans.ban_ip("127.0.0.1");
    assert!(session.has_banned_ip().await);

    // no hwid reported yet: not banned by definition
    assert!(!session.has_banned_hwid().await);
    session.set_hwid(Hwid::new("hwid-x"));
    assert!(!session.has_banned_hwid().await);
    harness.bans.ban_hwid(&Hwid::new("hwid-x"));
    assert!(session.has_banned_hwid().await);

    harness.store.seed(seeded_account(50, LoginState::NotLoggedIn, None));
    session.attach_account(harness.store.find_by_id(50).await.unwrap().unwrap());
    session.update_macs("00:11:22:33:44:55");
    assert!(!session.has_banned_macs().await);

    session.ban_macs().await;
    assert!(session.has_banned_macs().await);
}

// ============================================
// Session registry
// ============================================

#[tokio::test]
async fn test_one_session_per_account() {
    let harness = harness();
    let (first, _) = harness.session(1, SessionKind::Channel);
    let (second, _) = harness.session(2, SessionKind::Channel);

    harness.store.seed(seeded_account(40, LoginState::NotLoggedIn, None));
    first.attach_account(harness.store.find_by_id(40).await.unwrap().unwrap());
    second.attach_account(harness.store.find_by_id(40).await.unwrap().unwrap());

    harness.registry.register(40, &first).unwrap();
    assert!(harness.registry.register(40, &second).is_err());

    // the losing session going away must not evict the winner
    second.disconnect(false).await;
    assert_eq!(
        harness.registry.online_session(40).unwrap().id(),
        first.id()
    );

    first.disconnect(false).await;
    assert!(harness.registry.online_session(40).is_none());
    assert!(harness.registry.register(40, &second).is_ok());
}
