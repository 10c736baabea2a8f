//! Per-connection session: socket ownership, serialized writes, and the
//! frame read loop that dispatches decoded messages to the game server.

use crate::network::GameServer;
use log::{debug, warn};
use shared::{encode_frame, FrameHeader, MsgType, HEADER_LEN};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

/// One live connection.
///
/// The registry owns the membership view of the session; the session owns
/// its transport. The write half sits behind its own lock because the
/// session's reply path and the broadcast hub write to it concurrently and
/// must never interleave bytes. `active` is the single authoritative
/// liveness flag: once it drops the read loop exits on its next iteration.
pub struct ClientSession {
    id: AtomicU32,
    addr: SocketAddr,
    name: StdMutex<Option<String>>,
    active: AtomicBool,
    torn_down: AtomicBool,
    writer: Mutex<OwnedWriteHalf>,
}

impl ClientSession {
    pub fn new(id: u32, addr: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self {
            id: AtomicU32::new(id),
            addr,
            name: StdMutex::new(None),
            active: AtomicBool::new(true),
            torn_down: AtomicBool::new(false),
            writer: Mutex::new(writer),
        }
    }

    /// Current id. Not stable across rounds: the registry reassigns it
    /// during id compaction at every round start.
    pub fn id(&self) -> u32 {
        self.id.load(Ordering::SeqCst)
    }

    pub fn set_id(&self, id: u32) {
        self.id.store(id, Ordering::SeqCst);
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn name(&self) -> Option<String> {
        self.name.lock().expect("name lock poisoned").clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.name.lock().expect("name lock poisoned") = Some(name.to_string());
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Marks the session inactive. Returns true for the caller that made
    /// the transition, false if it was already down.
    pub fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::SeqCst)
    }

    /// Claims the right to run teardown. Exactly one caller wins.
    pub fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::SeqCst)
    }

    /// Encodes and writes one frame, serialized against concurrent writers
    /// on the same socket.
    pub async fn send(&self, msg_type: MsgType, payload: &str) -> std::io::Result<()> {
        let frame = encode_frame(msg_type, payload);
        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await
    }

    /// Closes the write half, which also unblocks the peer's reads.
    pub async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id())
            .field("addr", &self.addr)
            .field("name", &self.name())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Reads frames off the socket until the peer disconnects, a framing error
/// occurs, or the session is deactivated from elsewhere, then runs the
/// shared teardown exactly once.
pub async fn run_session(
    server: Arc<GameServer>,
    session: Arc<ClientSession>,
    mut reader: OwnedReadHalf,
) {
    loop {
        let mut header_buf = [0u8; HEADER_LEN];
        if let Err(err) = reader.read_exact(&mut header_buf).await {
            debug!("Client {} disconnected: {err}", session.addr());
            break;
        }
        let header = match FrameHeader::parse(&header_buf) {
            Ok(header) => header,
            Err(err) => {
                warn!("Framing error from {}: {err}", session.addr());
                break;
            }
        };

        let mut body = vec![0u8; header.length as usize];
        if let Err(err) = reader.read_exact(&mut body).await {
            warn!(
                "Truncated frame body from {} (wanted {} bytes): {err}",
                session.addr(),
                header.length
            );
            break;
        }
        let payload = match String::from_utf8(body) {
            Ok(payload) => payload,
            Err(_) => {
                warn!("Non-UTF-8 payload from {}", session.addr());
                break;
            }
        };

        dispatch(&server, &session, header.tag, payload).await;

        if !session.is_active() {
            break;
        }
    }

    server.cleanup(&session).await;
}

/// Routes one decoded frame. An unknown or server-to-client tag earns the
/// sender an error notice but keeps the connection open.
async fn dispatch(
    server: &Arc<GameServer>,
    session: &Arc<ClientSession>,
    tag: u8,
    payload: String,
) {
    match MsgType::try_from(tag) {
        Ok(MsgType::Join) => server.handle_join(session, &payload).await,
        Ok(MsgType::NameUpdate) => {
            // Rebinds the display name with no other side effect.
            session.set_name(&payload);
        }
        Ok(MsgType::Start) => server.handle_start(session).await,
        Ok(MsgType::Click) => server.handle_click(session, &payload).await,
        Ok(MsgType::PlayAgain) => server.handle_play_again(session).await,
        Ok(MsgType::ClientLeft) => server.handle_client_left(session).await,
        Ok(_) | Err(_) => {
            let _ = session
                .send(MsgType::GameOver, &format!("Unknown message type: {tag}"))
                .await;
        }
    }
}

/// Parses a CLICK payload of the form `"row,col"`. Anything unparsable is
/// `None` and the click is dropped without a reply.
pub fn parse_click(payload: &str) -> Option<(usize, usize)> {
    let (row, col) = payload.split_once(',')?;
    let row = row.trim().parse().ok()?;
    let col = col.trim().parse().ok()?;
    Some((row, col))
}
