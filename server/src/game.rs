//! Round state machine: board mutation, scoring, the ready barrier, and
//! winner resolution.
//!
//! `RoundState` is a plain value the network layer keeps behind a single
//! lock; every method here assumes the caller already holds it, so claim
//! resolution plus the completion check form one atomic critical section.
//! Nothing in this module performs I/O.

use log::info;
use shared::{Board, ClaimResult};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tokio::task::JoinHandle;

/// Why a round terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    TimeUp,
    BoardComplete,
    AllPlayersDisconnected,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndReason::TimeUp => "TIME_UP",
            EndReason::BoardComplete => "BOARD_COMPLETE",
            EndReason::AllPlayersDisconnected => "ALL_PLAYERS_DISCONNECTED",
        };
        f.write_str(s)
    }
}

/// Result of one claim attempt under the round lock.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// No round is active; the sender gets a protocol notice.
    Inactive,
    /// Out-of-bounds coordinates or an already-claimed cell; dropped silently.
    Ignored,
    /// The board was mutated and the claimer's score adjusted.
    Applied { correct: bool, complete: bool },
}

/// Result of a readiness vote.
#[derive(Debug)]
pub enum ReadyOutcome {
    /// Voter is not part of the current active, named participant set.
    Ignored,
    /// Partial readiness; `message` is the tally to broadcast.
    Tally { message: String },
    /// Every active participant has voted; the ready-set has been cleared
    /// and the caller must start the next round.
    BarrierComplete { message: String },
}

/// What `end` hands back for broadcast and timer cancellation.
pub struct RoundOutcome {
    pub reason: EndReason,
    pub message: String,
    /// Pending countdown task, if one was still armed.
    pub timer: Option<JoinHandle<()>>,
}

/// Shared round state. Owned by the game controller, guarded by one lock.
pub struct RoundState {
    board: Option<Board>,
    active: bool,
    scores: HashMap<u32, i32>,
    names: HashMap<u32, String>,
    ready: HashSet<u32>,
    timer: Option<JoinHandle<()>>,
}

impl Default for RoundState {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundState {
    pub fn new() -> Self {
        Self {
            board: None,
            active: false,
            scores: HashMap::new(),
            names: HashMap::new(),
            ready: HashSet::new(),
            timer: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn board(&self) -> Option<&Board> {
        self.board.as_ref()
    }

    /// Arms the countdown for the current round. Any previously stored
    /// handle belongs to a round that already ended and was taken by `end`.
    pub fn set_timer(&mut self, handle: JoinHandle<()>) {
        self.timer = Some(handle);
    }

    /// Starts a round over the given compacted roster: fresh board, all
    /// scores seeded to zero, ready-set cleared.
    pub fn begin(&mut self, board: Board, roster: &[(u32, String)]) {
        self.board = Some(board);
        self.active = true;
        self.ready.clear();
        self.scores.clear();
        self.names.clear();
        for (id, name) in roster {
            self.scores.insert(*id, 0);
            self.names.insert(*id, name.clone());
        }
        info!("Round started with {} participant(s)", roster.len());
    }

    /// Resolves one claim. The first claim to reach an unclaimed cell wins;
    /// later claims on the same cell are no-ops.
    pub fn apply_claim(&mut self, client_id: u32, row: usize, col: usize) -> ClaimOutcome {
        if !self.active {
            return ClaimOutcome::Inactive;
        }
        let board = match self.board.as_mut() {
            Some(board) => board,
            None => return ClaimOutcome::Inactive,
        };

        let correct = match board.claim(row, col, client_id) {
            ClaimResult::OutOfBounds | ClaimResult::AlreadyClaimed => {
                return ClaimOutcome::Ignored
            }
            ClaimResult::Correct { .. } => true,
            ClaimResult::Incorrect { .. } => false,
        };

        let delta = if correct { 1 } else { -1 };
        *self.scores.entry(client_id).or_insert(0) += delta;

        ClaimOutcome::Applied {
            correct,
            complete: board.is_complete(),
        }
    }

    /// Records a readiness vote from `client_id`. `roster` is the current
    /// set of active, named participants in registry order; votes from
    /// anyone else are ignored. Completing the barrier clears the ready-set
    /// before returning, so the round never starts twice for one barrier.
    pub fn mark_ready(&mut self, client_id: u32, roster: &[(u32, String)]) -> ReadyOutcome {
        if !roster.iter().any(|(id, _)| *id == client_id) {
            return ReadyOutcome::Ignored;
        }
        self.ready.insert(client_id);

        let ready_names: Vec<&str> = roster
            .iter()
            .filter(|(id, _)| self.ready.contains(id))
            .map(|(_, name)| name.as_str())
            .collect();
        let message = format!(
            "{}/{} players ready: {}",
            ready_names.len(),
            roster.len(),
            ready_names.join(", ")
        );

        if !roster.is_empty() && roster.iter().all(|(id, _)| self.ready.contains(id)) {
            self.ready.clear();
            ReadyOutcome::BarrierComplete { message }
        } else {
            ReadyOutcome::Tally { message }
        }
    }

    /// Drops a departed participant's score/name/ready entries. Between
    /// rounds the whole ready-set is cleared: a barrier missing one of its
    /// original members can never complete.
    pub fn on_departure(&mut self, client_id: u32) {
        self.scores.remove(&client_id);
        self.names.remove(&client_id);
        self.ready.remove(&client_id);
        if !self.active {
            self.ready.clear();
        }
    }

    /// Ends the round. Idempotent: a second call while inactive returns
    /// `None` so at most one round-over broadcast is produced.
    pub fn end(&mut self, reason: EndReason) -> Option<RoundOutcome> {
        if !self.active {
            return None;
        }
        self.active = false;
        let timer = self.timer.take();
        let message = outcome_message(reason, &self.scores_by_name());
        info!("Round ended ({reason}): {message}");
        Some(RoundOutcome {
            reason,
            message,
            timer,
        })
    }

    /// Current scores keyed by display name, sorted for stable rendering.
    pub fn scores_by_name(&self) -> BTreeMap<String, i32> {
        self.scores
            .iter()
            .map(|(id, score)| {
                let name = self
                    .names
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| format!("Player {id}"));
                (name, *score)
            })
            .collect()
    }
}

/// Renders the round-over notice: winner or tie at the maximum score, plus
/// the machine-parseable final score mapping.
pub fn outcome_message(reason: EndReason, scores: &BTreeMap<String, i32>) -> String {
    let top = match scores.values().max() {
        Some(top) => *top,
        None => return format!("Game ended: {reason}"),
    };
    let winners: Vec<&str> = scores
        .iter()
        .filter(|(_, score)| **score == top)
        .map(|(name, _)| name.as_str())
        .collect();

    let headline = match reason {
        EndReason::TimeUp => "Time's up!",
        EndReason::BoardComplete => "All primes found!",
        EndReason::AllPlayersDisconnected => "Game over!",
    };
    let final_scores = serde_json::to_string(scores).unwrap_or_default();

    if winners.len() == 1 {
        format!(
            "{headline} Winner: {} with {top} points. Final scores: {final_scores}",
            winners[0]
        )
    } else {
        format!(
            "{headline} It's a tie between {} with {top} points. Final scores: {final_scores}",
            join_names(&winners)
        )
    }
}

fn join_names(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [only] => (*only).to_string(),
        [rest @ .., last] => format!("{} and {}", rest.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Cell, BOARD_SIZE};

    fn roster(names: &[&str]) -> Vec<(u32, String)> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| (i as u32 + 1, name.to_string()))
            .collect()
    }

    /// A board whose only target value sits at (0, 0).
    fn single_target_board() -> Board {
        let mut cells = [[Cell::Unclaimed { value: 9 }; BOARD_SIZE]; BOARD_SIZE];
        cells[0][0] = Cell::Unclaimed { value: 7 };
        Board::from_cells(cells)
    }

    fn started_round(board: Board, names: &[&str]) -> RoundState {
        let mut round = RoundState::new();
        round.begin(board, &roster(names));
        round
    }

    #[test]
    fn test_begin_seeds_scores_to_zero() {
        let round = started_round(single_target_board(), &["ann", "bob"]);
        assert!(round.is_active());
        let scores = round.scores_by_name();
        assert_eq!(scores.get("ann"), Some(&0));
        assert_eq!(scores.get("bob"), Some(&0));
    }

    #[test]
    fn test_claim_scoring() {
        let mut round = started_round(single_target_board(), &["ann"]);

        // Correct claim on the prime earns a point.
        assert!(matches!(
            round.apply_claim(1, 0, 0),
            ClaimOutcome::Applied { correct: true, .. }
        ));
        assert_eq!(round.scores_by_name()["ann"], 1);

        // Incorrect claim on a composite costs one; scores may go negative.
        assert!(matches!(
            round.apply_claim(1, 1, 1),
            ClaimOutcome::Applied { correct: false, .. }
        ));
        assert!(matches!(
            round.apply_claim(1, 2, 2),
            ClaimOutcome::Applied { correct: false, .. }
        ));
        assert_eq!(round.scores_by_name()["ann"], -1);
    }

    #[test]
    fn test_double_claim_is_idempotent() {
        let mut round = started_round(single_target_board(), &["ann", "bob"]);

        assert!(matches!(
            round.apply_claim(1, 0, 0),
            ClaimOutcome::Applied { .. }
        ));
        let before = round.scores_by_name();
        let board_before = round.board().cloned();

        // A raced second click on the same cell changes nothing.
        assert!(matches!(round.apply_claim(2, 0, 0), ClaimOutcome::Ignored));
        assert_eq!(round.scores_by_name(), before);
        assert_eq!(round.board().cloned(), board_before);
    }

    #[test]
    fn test_score_conservation() {
        let mut board_cells = [[Cell::Unclaimed { value: 9 }; BOARD_SIZE]; BOARD_SIZE];
        board_cells[0][0] = Cell::Unclaimed { value: 2 };
        board_cells[0][1] = Cell::Unclaimed { value: 3 };
        board_cells[0][2] = Cell::Unclaimed { value: 5 };
        let mut round = started_round(Board::from_cells(board_cells), &["ann"]);

        // 3 correct, 2 incorrect => score 1.
        round.apply_claim(1, 0, 0);
        round.apply_claim(1, 0, 1);
        round.apply_claim(1, 0, 2);
        round.apply_claim(1, 3, 3);
        round.apply_claim(1, 4, 4);
        assert_eq!(round.scores_by_name()["ann"], 3 - 2);
    }

    #[test]
    fn test_claim_requires_active_round() {
        let mut round = RoundState::new();
        assert!(matches!(round.apply_claim(1, 0, 0), ClaimOutcome::Inactive));
    }

    #[test]
    fn test_out_of_bounds_claim_ignored() {
        let mut round = started_round(single_target_board(), &["ann"]);
        assert!(matches!(
            round.apply_claim(1, BOARD_SIZE, 0),
            ClaimOutcome::Ignored
        ));
        assert_eq!(round.scores_by_name()["ann"], 0);
    }

    #[test]
    fn test_last_target_completes_round() {
        let mut round = started_round(single_target_board(), &["ann"]);

        // Composites never complete the board.
        if let ClaimOutcome::Applied { complete, .. } = round.apply_claim(1, 4, 4) {
            assert!(!complete);
        } else {
            panic!("claim not applied");
        }

        // Claiming the sole remaining target flips completion.
        if let ClaimOutcome::Applied { complete, .. } = round.apply_claim(1, 0, 0) {
            assert!(complete);
        } else {
            panic!("claim not applied");
        }
    }

    #[test]
    fn test_ready_barrier_requires_every_participant() {
        let mut round = RoundState::new();
        let roster = roster(&["ann", "bob", "cat"]);

        assert!(matches!(
            round.mark_ready(1, &roster),
            ReadyOutcome::Tally { .. }
        ));
        match round.mark_ready(2, &roster) {
            ReadyOutcome::Tally { message } => {
                assert!(message.starts_with("2/3"), "unexpected tally: {message}");
            }
            other => panic!("expected tally, got {other:?}"),
        }

        // Third vote completes the barrier exactly once; the ready-set is
        // cleared before control returns.
        assert!(matches!(
            round.mark_ready(3, &roster),
            ReadyOutcome::BarrierComplete { .. }
        ));
        assert!(matches!(
            round.mark_ready(3, &roster),
            ReadyOutcome::Tally { .. }
        ));
    }

    #[test]
    fn test_ready_vote_from_stranger_ignored() {
        let mut round = RoundState::new();
        assert!(matches!(
            round.mark_ready(42, &roster(&["ann"])),
            ReadyOutcome::Ignored
        ));
    }

    #[test]
    fn test_departure_between_rounds_clears_barrier() {
        let mut round = RoundState::new();
        let roster = roster(&["ann", "bob", "cat"]);
        round.mark_ready(1, &roster);
        round.mark_ready(2, &roster);

        round.on_departure(3);

        // Remaining votes were discarded, so the old barrier cannot fire.
        match round.mark_ready(1, &[(1, "ann".into()), (2, "bob".into())]) {
            ReadyOutcome::Tally { message } => assert!(message.starts_with("1/2")),
            other => panic!("expected tally, got {other:?}"),
        }
    }

    #[test]
    fn test_departure_mid_round_drops_score_entry() {
        let mut round = started_round(single_target_board(), &["ann", "bob"]);
        round.on_departure(1);
        let scores = round.scores_by_name();
        assert!(!scores.contains_key("ann"));
        assert!(scores.contains_key("bob"));
    }

    #[test]
    fn test_end_is_idempotent() {
        let mut round = started_round(single_target_board(), &["ann"]);
        assert!(round.end(EndReason::TimeUp).is_some());
        assert!(!round.is_active());
        assert!(round.end(EndReason::TimeUp).is_none());
        assert!(round.end(EndReason::BoardComplete).is_none());
    }

    #[test]
    fn test_single_winner_wording() {
        let scores = BTreeMap::from([
            ("ann".to_string(), 3),
            ("bob".to_string(), 1),
        ]);
        let message = outcome_message(EndReason::TimeUp, &scores);
        assert!(message.starts_with("Time's up! Winner: ann with 3 points."));
        assert!(message.contains("Final scores:"));
        assert!(!message.contains("tie"));
    }

    #[test]
    fn test_tie_wording_differs_from_single_winner() {
        let scores = BTreeMap::from([
            ("ann".to_string(), 3),
            ("bob".to_string(), 3),
            ("cat".to_string(), 1),
        ]);
        let message = outcome_message(EndReason::BoardComplete, &scores);
        assert!(
            message.starts_with("All primes found! It's a tie between ann and bob with 3 points."),
            "unexpected wording: {message}"
        );
        assert!(!message.contains("Winner:"));
    }

    #[test]
    fn test_outcome_with_no_scores() {
        let message = outcome_message(EndReason::AllPlayersDisconnected, &BTreeMap::new());
        assert_eq!(message, "Game ended: ALL_PLAYERS_DISCONNECTED");
    }

    #[test]
    fn test_three_way_tie_name_join() {
        assert_eq!(join_names(&["a", "b", "c"]), "a, b and c");
        assert_eq!(join_names(&["a"]), "a");
    }
}
