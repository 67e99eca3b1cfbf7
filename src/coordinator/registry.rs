//! Session registry
//!
//! Enforces "at most one live session per account" and owns the
//! transition tokens that let a connection hop between server processes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::session::Session;

/// Error types for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("account {0} already has a live session")]
    AlreadyOnline(i32),
}

/// Token handed from the old connection to the new one during a server
/// transition.
#[derive(Debug, Clone, Copy)]
pub struct TransitionToken {
    pub account_id: i32,
    pub chr_id: i32,
}

#[derive(Default)]
pub struct SessionRegistry {
    /// account id -> live session
    online: Mutex<HashMap<i32, Arc<Session>>>,
    /// session id -> pre-auth login sessions
    login_sessions: Mutex<HashMap<u64, Arc<Session>>>,
    /// remote address -> pending handoff
    transitions: Mutex<HashMap<String, TransitionToken>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the account for this session. Fails when another session
    /// already holds it - the data-layer login-state check is the second
    /// line of defense behind this one.
    pub fn register(&self, account_id: i32, session: &Arc<Session>) -> Result<(), RegistryError> {
        let mut online = self.online.lock().unwrap();
        if online.contains_key(&account_id) {
            return Err(RegistryError::AlreadyOnline(account_id));
        }
        online.insert(account_id, Arc::clone(session));
        Ok(())
    }

    /// Drop the account mapping, but only if this session still owns it.
    /// A newer session that re-registered the account is left alone.
    pub fn unregister(&self, session: &Session) {
        let account_id = session.account_id();
        if account_id <= 0 {
            return;
        }
        let mut online = self.online.lock().unwrap();
        if online.get(&account_id).is_some_and(|s| s.id() == session.id()) {
            online.remove(&account_id);
        }
    }

    pub fn online_session(&self, account_id: i32) -> Option<Arc<Session>> {
        self.online.lock().unwrap().get(&account_id).cloned()
    }

    pub fn online_count(&self) -> usize {
        self.online.lock().unwrap().len()
    }

    /// Track a LOGIN-kind session before it has authenticated.
    pub fn track_login_session(&self, session: &Arc<Session>) {
        self.login_sessions
            .lock()
            .unwrap()
            .insert(session.id(), Arc::clone(session));
    }

    /// Tear down a LOGIN-kind session and forget its pre-auth tracking.
    pub async fn close_login_session(&self, session: &Session) {
        self.login_sessions.lock().unwrap().remove(&session.id());
        self.unregister(session);
        session.disconnect(false).await;
    }

    /// Tear down a session. `forced` marks a policy-violation close, which
    /// is audited; the disconnect itself is silent either way.
    pub async fn close_session(&self, session: &Session, forced: bool) {
        self.unregister(session);
        self.login_sessions.lock().unwrap().remove(&session.id());
        if forced {
            tracing::warn!(
                "[registry] [forced_close] session={} account={} addr={}",
                session.id(),
                session.account_id(),
                session.remote_addr(),
            );
        }
        session.disconnect(forced).await;
    }

    /// Issue a transition token for a channel handoff. Keyed by remote
    /// address: the client reconnects from the same host to the target
    /// channel.
    pub fn begin_transition(&self, remote_addr: &str, account_id: i32, chr_id: i32) {
        self.transitions.lock().unwrap().insert(
            remote_addr.to_string(),
            TransitionToken { account_id, chr_id },
        );
    }

    /// Consume the transition token for this host, if one is pending.
    pub fn claim_transition(&self, remote_addr: &str) -> Option<TransitionToken> {
        self.transitions.lock().unwrap().remove(remote_addr)
    }
}
