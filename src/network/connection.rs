//! TCP connection plumbing
//!
//! Binds the session core to real sockets: an accept loop that builds one
//! session per connection, a writer task per connection that flushes
//! outbound packets in order, and a read loop that feeds the dispatcher
//! and raises idle signals.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::network::dispatcher::PacketProcessor;
use crate::network::liveness::{IdleKind, LivenessMonitor};
use crate::network::packet::FrameError;
use crate::session::{now_ms, Session, SessionContext, SessionKind, Transport, TransportError};

/// Largest frame a client may send.
const MAX_FRAME_LEN: usize = 16 * 1024;

/// How long a connection may go without inbound traffic before the
/// liveness monitor is signalled.
const IDLE_AFTER: Duration = Duration::from_secs(20);

enum Frame {
    Data(Bytes),
    Close,
}

/// Outbound half of a TCP connection. Writes are funnelled through an
/// unbounded channel into a single writer task, so enqueue order is flush
/// order.
pub struct TcpTransport {
    tx: mpsc::UnboundedSender<Frame>,
    open: Arc<AtomicBool>,
}

impl TcpTransport {
    /// Take ownership of the write half and start the writer task.
    pub fn spawn(mut write_half: OwnedWriteHalf) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        let task_open = Arc::clone(&open);
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                match frame {
                    Frame::Data(bytes) => {
                        if write_half.write_all(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Frame::Close => break,
                }
            }
            task_open.store(false, Ordering::SeqCst);
            let _ = write_half.shutdown().await;
        });

        Arc::new(Self { tx, open })
    }
}

impl Transport for TcpTransport {
    fn send(&self, bytes: Bytes) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.tx
            .send(Frame::Data(bytes))
            .map_err(|_| TransportError::Closed)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        let _ = self.tx.send(Frame::Close);
    }
}

#[derive(Debug, thiserror::Error)]
enum ReadError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read one length-prefixed frame. `Ok(None)` means the peer closed
/// cleanly.
async fn read_frame(read_half: &mut OwnedReadHalf) -> Result<Option<Bytes>, ReadError> {
    let mut len_buf = [0u8; 2];
    match read_half.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(ReadError::Io(e)),
    }

    let len = u16::from_le_bytes(len_buf) as usize;
    if len < 2 || len > MAX_FRAME_LEN {
        return Err(ReadError::Frame(FrameError::InvalidHeader(format!(
            "frame length {len}"
        ))));
    }

    let mut body = vec![0u8; len];
    read_half.read_exact(&mut body).await.map_err(ReadError::Io)?;
    Ok(Some(Bytes::from(body)))
}

/// Accept loop for one server process. Each connection gets a session of
/// the given kind and its own read/write tasks.
pub async fn run_acceptor(
    kind: SessionKind,
    bind_addr: &str,
    ctx: Arc<SessionContext>,
    processor: Arc<PacketProcessor>,
    liveness: Arc<LivenessMonitor>,
) -> Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!("[server] [ready] kind={:?} addr={}", kind, bind_addr);

    let mut next_session_id: u64 = 1;
    loop {
        let (stream, peer) = listener.accept().await?;
        let session_id = next_session_id;
        next_session_id += 1;

        let ctx = Arc::clone(&ctx);
        let processor = Arc::clone(&processor);
        let liveness = Arc::clone(&liveness);
        tokio::spawn(async move {
            serve_connection(kind, session_id, stream, peer, ctx, processor, liveness).await;
        });
    }
}

/// Drive one connection from accept to teardown.
pub async fn serve_connection(
    kind: SessionKind,
    session_id: u64,
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<SessionContext>,
    processor: Arc<PacketProcessor>,
    liveness: Arc<LivenessMonitor>,
) {
    let (mut read_half, write_half) = stream.into_split();
    let transport = TcpTransport::spawn(write_half);

    let registry = Arc::clone(&ctx.registry);
    let world = ctx.config.world_id;
    let channel = ctx.config.channel_id;
    let session = Arc::new(Session::new(
        kind,
        session_id,
        peer.ip().to_string(),
        transport,
        world,
        channel,
        ctx,
    ));

    tracing::info!(
        "[session] [connected] session={} addr={} kind={:?}",
        session_id,
        peer,
        kind
    );
    if kind == SessionKind::Login {
        registry.track_login_session(&session);
    }

    let idle_task = tokio::spawn(idle_probe(Arc::clone(&session), Arc::clone(&liveness)));

    loop {
        if session.is_disconnecting() {
            break;
        }
        match read_frame(&mut read_half).await {
            Ok(Some(raw)) => {
                processor.dispatch(&session, raw).await;
            }
            Ok(None) => break,
            Err(ReadError::Frame(e)) => {
                // Malformed framing is fatal, same bucket as a violation.
                tracing::warn!(
                    "[session] [bad_frame] session={} addr={} err={}",
                    session_id,
                    peer,
                    e
                );
                registry.close_session(&session, true).await;
                break;
            }
            Err(ReadError::Io(e)) => {
                tracing::debug!(
                    "[session] [read_error] session={} addr={} err={}",
                    session_id,
                    peer,
                    e
                );
                break;
            }
        }
    }

    idle_task.abort();

    // Transport went away (or we closed it). Idempotent with every
    // explicit disconnect path; a session mid-transition keeps its
    // persisted state for the next connection.
    match kind {
        SessionKind::Login => registry.close_login_session(&session).await,
        SessionKind::Channel => registry.close_session(&session, false).await,
    }

    tracing::info!("[session] [closed] session={} addr={}", session_id, peer);
}

/// Raise an idle signal whenever no packet has arrived for a full window.
async fn idle_probe(session: Arc<Session>, liveness: Arc<LivenessMonitor>) {
    let mut ticker = tokio::time::interval(IDLE_AFTER);
    ticker.tick().await; // first tick fires immediately
    loop {
        ticker.tick().await;
        if session.is_disconnecting() {
            break;
        }
        let idle_for = now_ms() - session.last_packet_ms();
        if idle_for >= IDLE_AFTER.as_millis() as i64 {
            liveness.on_idle(&session, IdleKind::ReaderIdle);
        }
    }
}
