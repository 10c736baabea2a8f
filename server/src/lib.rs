//! # Prime Grid Arbiter
//!
//! Authoritative server for the prime-grid claiming game: it accepts TCP
//! connections, binds each to a named participant, and mediates a shared
//! 5x5 board of cells under a timed round structure with scoring, winner
//! and tie resolution, and an all-participants ready barrier between
//! rounds.
//!
//! ## Module organization
//!
//! ### `session`
//! One `ClientSession` per connection: owns the socket halves, serializes
//! writes so replies and broadcasts never interleave, and runs the frame
//! read loop that dispatches decoded messages.
//!
//! ### `registry`
//! The membership list. Assigns provisional ids on admission and compacts
//! ids to a dense `1..N` range at every round start, so markers and scores
//! never reference departed participants.
//!
//! ### `game`
//! The round state machine: board mutation, score tracking, completion
//! detection, the ready barrier, and round-over message rendering. Pure
//! value types, always accessed under the game server's round lock.
//!
//! ### `network`
//! The `GameServer`: accept loop with the busy-rejection admission policy,
//! broadcast fan-out with dead-peer pruning, round lifecycle orchestration,
//! and the idempotent session teardown path.
//!
//! ## Concurrency model
//!
//! One spawned task per connection plus one timer task per active round.
//! Round state sits behind a single `Mutex` (claim resolution and the
//! completion check are one critical section); the registry has its own
//! `RwLock`; each session's write half has a per-session `Mutex`. The sole
//! linearization point of the protocol is the round lock: for any cell,
//! the first claim to acquire it wins and all later claims are no-ops.

pub mod game;
pub mod network;
pub mod registry;
pub mod session;
