//! Connection listener, broadcast hub, and round orchestration.
//!
//! `GameServer` is the shared root that every per-connection task holds an
//! `Arc` to. It guards the two pieces of shared state with separate locks:
//! the round state (board, scores, ready-set) behind a `Mutex` and the
//! session registry behind an `RwLock`, so broadcast fan-out never holds
//! the round lock across socket writes. Paths that need both (`admit`,
//! `begin_round`) take the registry lock first and the round lock second;
//! nothing acquires them in the reverse order.

use crate::game::{ClaimOutcome, EndReason, ReadyOutcome, RoundOutcome, RoundState};
use crate::registry::ClientRegistry;
use crate::session::{self, parse_click, ClientSession};
use log::{debug, info, warn};
use shared::{encode_frame, Board, MsgType};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;

const BUSY_NOTICE: &str =
    "Connection rejected: Game is currently in progress. Please wait for the next game.";
const JOIN_FIRST_NOTICE: &str = "Error: Please JOIN first before starting the game.";
const NOT_STARTED_NOTICE: &str = "Error: Game not started. Send START message first.";

/// Outcome of a claim computed under the round lock, carried out of the
/// critical section so broadcasts happen after release.
enum ClickStep {
    NotStarted,
    Ignored,
    Applied {
        board_json: Option<String>,
        scores_json: Option<String>,
        ended: Option<RoundOutcome>,
    },
}

/// The arbiter. One instance per process, shared across all session tasks
/// and the round timer.
pub struct GameServer {
    registry: RwLock<ClientRegistry>,
    round: Mutex<RoundState>,
    round_duration: Duration,
}

impl GameServer {
    pub fn new(round_duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            registry: RwLock::new(ClientRegistry::new()),
            round: Mutex::new(RoundState::new()),
            round_duration,
        })
    }

    pub async fn is_round_active(&self) -> bool {
        self.round.lock().await.is_active()
    }

    /// Accept loop: admits connections while no round is active and spawns
    /// a session task per admitted connection. Runs until the listener
    /// fails or the task is dropped (the binary selects against Ctrl+C).
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        info!("Server listening on {}", listener.local_addr()?);
        loop {
            let (stream, addr) = listener.accept().await?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                server.admit(stream, addr).await;
            });
        }
    }

    async fn admit(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        if let Err(err) = stream.set_nodelay(true) {
            debug!("set_nodelay failed for {addr}: {err}");
        }

        let mut registry = self.registry.write().await;
        let busy = self.round.lock().await.is_active();
        if busy {
            drop(registry);
            info!("Rejected connection from {addr}: round in progress");
            let mut stream = stream;
            let _ = stream
                .write_all(&encode_frame(MsgType::ServerBusy, BUSY_NOTICE))
                .await;
            let _ = stream.shutdown().await;
            return;
        }

        let (reader, writer) = stream.into_split();
        let session = registry.admit(writer, addr);
        drop(registry);

        debug!("Client {addr} admitted, waiting for JOIN");
        session::run_session(self, session, reader).await;
    }

    /// Fans one frame out to a snapshot of the active sessions. A session
    /// whose send fails is marked dead and its socket closed; the session's
    /// own read loop then runs the full teardown, so the broadcaster never
    /// blocks on a failing peer.
    pub async fn broadcast(&self, msg_type: MsgType, payload: &str) {
        let targets = self.registry.read().await.snapshot();
        for target in targets {
            if let Err(err) = target.send(msg_type, payload).await {
                warn!("Broadcast to {} failed: {err}", target.addr());
                target.deactivate();
                target.shutdown().await;
            }
        }
    }

    /// Directed send with the same failure handling as `broadcast`.
    async fn send_or_drop(&self, session: &Arc<ClientSession>, msg_type: MsgType, payload: &str) {
        if let Err(err) = session.send(msg_type, payload).await {
            warn!("Send to {} failed: {err}", session.addr());
            session.deactivate();
            session.shutdown().await;
        }
    }

    pub async fn handle_join(self: &Arc<Self>, session: &Arc<ClientSession>, name: &str) {
        let bound = self.registry.write().await.try_bind_name(name, session);
        if !bound {
            info!(
                "Rejecting {}: name {name:?} already in use",
                session.addr()
            );
            let _ = session
                .send(
                    MsgType::ServerBusy,
                    &format!("Name '{name}' is already in use. Reconnect with a different name."),
                )
                .await;
            self.cleanup(session).await;
            return;
        }

        self.send_or_drop(
            session,
            MsgType::Welcome,
            &format!("Welcome {name}! You are connected to the Prime Grid server."),
        )
        .await;
        if !session.is_active() {
            return;
        }

        let count = self.registry.read().await.named_active_count();
        self.broadcast(
            MsgType::Welcome,
            &format!("{count} player(s) connected. Waiting for game to start..."),
        )
        .await;
    }

    /// START is a readiness vote between rounds; during a round it is a
    /// resync request answered with the current board.
    pub async fn handle_start(self: &Arc<Self>, session: &Arc<ClientSession>) {
        if session.name().is_none() {
            self.send_or_drop(session, MsgType::GameOver, JOIN_FIRST_NOTICE)
                .await;
            return;
        }

        let resync = {
            let round = self.round.lock().await;
            if round.is_active() {
                round.board().and_then(|board| serde_json::to_string(board).ok())
            } else {
                None
            }
        };
        if let Some(board_json) = resync {
            self.send_or_drop(session, MsgType::ClickUpdate, &board_json)
                .await;
            return;
        }

        self.register_ready_vote(session).await;
    }

    /// PLAY_AGAIN is the post-round readiness vote. Mid-round votes are
    /// dropped silently.
    pub async fn handle_play_again(self: &Arc<Self>, session: &Arc<ClientSession>) {
        if session.name().is_none() {
            return;
        }
        if self.round.lock().await.is_active() {
            return;
        }
        self.register_ready_vote(session).await;
    }

    async fn register_ready_vote(self: &Arc<Self>, session: &Arc<ClientSession>) {
        let roster = self.registry.read().await.named_roster();
        let outcome = {
            let mut round = self.round.lock().await;
            if round.is_active() {
                // A start raced in ahead of this vote.
                return;
            }
            round.mark_ready(session.id(), &roster)
        };

        match outcome {
            ReadyOutcome::Ignored => {}
            ReadyOutcome::Tally { message } => {
                self.broadcast(MsgType::Welcome, &message).await;
            }
            ReadyOutcome::BarrierComplete { message } => {
                self.broadcast(MsgType::Welcome, &message).await;
                self.begin_round().await;
            }
        }
    }

    /// Starts a round: compacts ids, generates a board, arms the timer, and
    /// broadcasts the opening bundle (duration, board, zeroed scores, the
    /// id-to-name map participants use to find their own id).
    pub async fn begin_round(self: &Arc<Self>) {
        let (participants, board_json, scores_json) = {
            let mut registry = self.registry.write().await;
            let mut round = self.round.lock().await;
            // Checked before compaction so a racing second barrier
            // completion cannot renumber ids under a started round.
            if round.is_active() {
                return;
            }
            let roster = registry.compact_ids();
            if roster.is_empty() {
                return;
            }
            drop(registry);

            let participants: Vec<(u32, String)> = roster
                .iter()
                .map(|(id, name, _)| (*id, name.clone()))
                .collect();
            let board = Board::generate(&mut rand::thread_rng());
            round.begin(board, &participants);

            let server = Arc::clone(self);
            round.set_timer(tokio::spawn(async move {
                sleep(server.round_duration).await;
                info!("Round timer expired");
                server.end_round(EndReason::TimeUp).await;
            }));

            (
                participants,
                round.board().and_then(|board| serde_json::to_string(board).ok()),
                serde_json::to_string(&round.scores_by_name()).ok(),
            )
        };

        let id_map: BTreeMap<u32, String> = participants.into_iter().collect();
        self.broadcast(
            MsgType::TimerStart,
            &self.round_duration.as_secs().to_string(),
        )
        .await;
        if let Some(json) = board_json {
            self.broadcast(MsgType::StartGame, &json).await;
        }
        if let Some(json) = scores_json {
            self.broadcast(MsgType::ScoreUpdate, &json).await;
        }
        if let Ok(json) = serde_json::to_string(&id_map) {
            self.broadcast(MsgType::PlayerIdMap, &json).await;
        }
    }

    /// Resolves one claim atomically under the round lock, then broadcasts
    /// the updated board and scores. If the claim emptied the board of
    /// targets the round ends here with `BOARD_COMPLETE`.
    pub async fn handle_click(self: &Arc<Self>, session: &Arc<ClientSession>, payload: &str) {
        let (row, col) = match parse_click(payload) {
            Some(coords) => coords,
            // Unparsable coordinates are dropped without a reply.
            None => return,
        };
        let client_id = session.id();

        let step = {
            let mut round = self.round.lock().await;
            match round.apply_claim(client_id, row, col) {
                ClaimOutcome::Inactive => ClickStep::NotStarted,
                ClaimOutcome::Ignored => ClickStep::Ignored,
                ClaimOutcome::Applied { correct, complete } => {
                    debug!(
                        "Client {client_id} claimed ({row},{col}) {}",
                        if correct { "correctly" } else { "incorrectly" }
                    );
                    ClickStep::Applied {
                        board_json: round
                            .board()
                            .and_then(|board| serde_json::to_string(board).ok()),
                        scores_json: serde_json::to_string(&round.scores_by_name()).ok(),
                        ended: if complete {
                            round.end(EndReason::BoardComplete)
                        } else {
                            None
                        },
                    }
                }
            }
        };

        match step {
            ClickStep::NotStarted => {
                self.send_or_drop(session, MsgType::GameOver, NOT_STARTED_NOTICE)
                    .await;
            }
            ClickStep::Ignored => {}
            ClickStep::Applied {
                board_json,
                scores_json,
                ended,
            } => {
                if let Some(json) = board_json {
                    self.broadcast(MsgType::ClickUpdate, &json).await;
                }
                if let Some(json) = scores_json {
                    self.broadcast(MsgType::ScoreUpdate, &json).await;
                }
                if let Some(outcome) = ended {
                    self.finish_round(outcome).await;
                }
            }
        }
    }

    /// Ends the current round for `reason`, if one is active. Idempotence
    /// lives in `RoundState::end`, so at most one round-over notice goes out
    /// even when the timer races a manual completion.
    pub async fn end_round(self: &Arc<Self>, reason: EndReason) {
        let outcome = self.round.lock().await.end(reason);
        if let Some(outcome) = outcome {
            self.finish_round(outcome).await;
        }
    }

    async fn finish_round(self: &Arc<Self>, outcome: RoundOutcome) {
        if let Some(timer) = outcome.timer {
            // The TIME_UP path runs inside the timer task itself; aborting
            // the handle there would cancel its own round-over broadcast.
            if outcome.reason != EndReason::TimeUp {
                timer.abort();
            }
        }

        self.broadcast(MsgType::GameOver, &outcome.message).await;
    }

    pub async fn handle_client_left(self: &Arc<Self>, session: &Arc<ClientSession>) {
        self.cleanup(session).await;
    }

    /// Shared teardown, idempotent across the paths that can race into it
    /// (read-loop exit, broadcast failure, voluntary departure, name
    /// collision): closes the transport, drops the session from registry
    /// and round bookkeeping, notifies the remaining players, and force-ends
    /// the round if nobody is left in it.
    pub async fn cleanup(self: &Arc<Self>, session: &Arc<ClientSession>) {
        if !session.begin_teardown() {
            return;
        }
        session.deactivate();
        session.shutdown().await;

        let remaining = {
            let mut registry = self.registry.write().await;
            registry.remove(session);
            registry.named_active_count()
        };

        let client_id = session.id();
        let mid_round = {
            let mut round = self.round.lock().await;
            round.on_departure(client_id);
            round.is_active()
        };

        match session.name() {
            Some(name) => {
                info!("Player {name} (id {client_id}) left, {remaining} remaining");
                self.broadcast(
                    MsgType::PlayerLeftUpdateOthers,
                    &format!("{name} has left the game and will not play again."),
                )
                .await;
            }
            None => info!("Connection {} closed before joining", session.addr()),
        }

        if mid_round && remaining == 0 {
            self.end_round(EndReason::AllPlayersDisconnected).await;
        }
    }
}
