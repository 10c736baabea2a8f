//! Protocol and game-model types shared between the arbiter server and any
//! client that speaks its wire format.
//!
//! This crate is deliberately free of I/O and async machinery: the frame
//! codec works on byte slices, the board model is a plain value type, and
//! both are exercised by unit tests without a running server.

pub mod board;
pub mod protocol;

pub use board::{is_prime, Board, Cell, ClaimResult, BOARD_SIZE, MAX_TARGETS, MIN_TARGETS};
pub use protocol::{decode_frame, encode_frame, FrameError, FrameHeader, MsgType, HEADER_LEN};

/// Default length of one round, in seconds.
pub const DEFAULT_ROUND_SECS: u64 = 120;
