//! Inbound packet dispatch
//!
//! The boundary between the transport and the business handlers. Exactly
//! two failure buckets exist: a violation the handler flagged on purpose
//! (fatal, audited forced disconnect) and everything else (logged, the
//! connection lives on). The bucket depends only on which variant the
//! handler returned, never on what error types it wrapped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::coordinator::SessionRegistry;
use crate::network::packet::InPacket;
use crate::session::Session;

/// How a handler invocation went wrong.
#[derive(Debug, thiserror::Error)]
pub enum HandlerFailure {
    /// The client broke protocol or game policy. Fatal to the connection:
    /// it is disconnected silently, with an audit log line. Never retried.
    #[error("game violation: {0}")]
    Violation(String),

    /// Anything else. Logged with session context; the connection stays up
    /// and the player simply does not see the action complete.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// One opcode's handler.
#[async_trait]
pub trait PacketHandler: Send + Sync {
    /// Whether this handler may run in the session's current state. The
    /// default requires an authenticated session; login-flow handlers
    /// override it.
    fn validate_state(&self, session: &Session) -> bool {
        session.is_logged_in()
    }

    async fn handle(&self, packet: InPacket, session: &Arc<Session>) -> Result<(), HandlerFailure>;
}

/// Opcode -> handler registry plus the dispatch rules.
pub struct PacketProcessor {
    handlers: HashMap<u16, Arc<dyn PacketHandler>>,
    registry: Arc<SessionRegistry>,
}

impl PacketProcessor {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            handlers: HashMap::new(),
            registry,
        }
    }

    pub fn register(&mut self, opcode: u16, handler: Arc<dyn PacketHandler>) {
        self.handlers.insert(opcode, handler);
    }

    pub fn handler(&self, opcode: u16) -> Option<Arc<dyn PacketHandler>> {
        self.handlers.get(&opcode).cloned()
    }

    /// Dispatch one inbound frame.
    ///
    /// Unregistered opcodes and opcodes that decline the session's state
    /// are dropped without error. The last-packet stamp advances on every
    /// path except a fatal one; callers watch `Session::is_disconnecting`
    /// to stop reading after a fatal outcome.
    pub async fn dispatch(&self, session: &Arc<Session>, raw: Bytes) {
        let mut packet = InPacket::new(raw);
        let opcode = match packet.read_opcode() {
            Ok(opcode) => opcode,
            Err(e) => {
                tracing::warn!(
                    "[dispatch] [invalid_header] session={} addr={} err={}",
                    session.id(),
                    session.remote_addr(),
                    e
                );
                self.registry.close_session(session, true).await;
                return;
            }
        };

        if let Some(handler) = self.handler(opcode) {
            if handler.validate_state(session) {
                match handler.handle(packet, session).await {
                    Ok(()) => {}
                    Err(HandlerFailure::Violation(why)) => {
                        tracing::warn!(
                            "[dispatch] [violation] session={} account={} opcode={:#06x} why={}",
                            session.id(),
                            session.account_name().unwrap_or_default(),
                            opcode,
                            why
                        );
                        self.registry.close_session(session, true).await;
                        return;
                    }
                    Err(HandlerFailure::Failed(e)) => {
                        tracing::warn!(
                            "[dispatch] [handler_failed] opcode={:#06x} chr={} account={} err={:#}",
                            opcode,
                            session.actor_context(),
                            session.account_name().unwrap_or_default(),
                            e
                        );
                    }
                }
            } else {
                tracing::trace!(
                    "[dispatch] [state_rejected] opcode={:#06x} session={}",
                    opcode,
                    session.id()
                );
            }
        } else {
            tracing::trace!("[dispatch] [unhandled] opcode={:#06x}", opcode);
        }

        session.update_last_packet();
    }
}
