//! Connection liveness
//!
//! On an idle signal the monitor sends a ping and schedules a single
//! check: if no pong came back within the window and the transport still
//! looks open, the session is disconnected. The check consults transport
//! state when it fires instead of being cancelled on pong - one shot per
//! idle signal, no recurring heartbeat loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::network::dispatcher::{HandlerFailure, PacketHandler};
use crate::network::packet::{self, InPacket};
use crate::session::{now_ms, Session};

/// How long a ping may go unanswered.
const PONG_WAIT: Duration = Duration::from_secs(15);

/// What kind of idleness tripped the signal. Logged with the disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleKind {
    ReaderIdle,
    WriterIdle,
}

pub struct LivenessMonitor {
    pong_wait: Duration,
}

impl Default for LivenessMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessMonitor {
    pub fn new() -> Self {
        Self {
            pong_wait: PONG_WAIT,
        }
    }

    /// Shorter window for tests.
    pub fn with_pong_wait(pong_wait: Duration) -> Self {
        Self { pong_wait }
    }

    /// React to an idle signal: ping now, verify later.
    pub fn on_idle(&self, session: &Arc<Session>, kind: IdleKind) {
        let pinged_at = now_ms();
        session.send(packet::ping());

        let session = Arc::clone(session);
        let pong_wait = self.pong_wait;
        tokio::spawn(async move {
            tokio::time::sleep(pong_wait).await;
            if session.last_pong_ms() < pinged_at && session.transport_open() {
                tracing::info!(
                    "[liveness] [idle_disconnect] session={} addr={} reason={:?}",
                    session.id(),
                    session.remote_addr(),
                    kind
                );
                session.disconnect(false).await;
            }
        });
    }
}

/// Records pong arrival; makes no other assumption about pong cadence.
/// Legal in every session state.
pub struct PongHandler;

#[async_trait]
impl PacketHandler for PongHandler {
    fn validate_state(&self, _session: &Session) -> bool {
        true
    }

    async fn handle(
        &self,
        _packet: InPacket,
        session: &Arc<Session>,
    ) -> Result<(), HandlerFailure> {
        session.pong_received();
        Ok(())
    }
}
