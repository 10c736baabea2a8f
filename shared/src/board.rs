//! Board model: the 5x5 grid of claimable cells and the target predicate.
//!
//! A round's board carries 10-15 prime "target" values at random positions;
//! every other cell holds an odd composite so the target count stated at
//! generation time is exact. Cells transition one-way from unclaimed to
//! claimed and never revert.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Side length of the square board.
pub const BOARD_SIZE: usize = 5;
/// Inclusive bounds on the number of target cells placed per round.
pub const MIN_TARGETS: usize = 10;
pub const MAX_TARGETS: usize = 15;
/// Exclusive upper bound on cell values.
pub const VALUE_CEILING: u32 = 2000;

/// The target predicate: a cell counts as a correct claim iff its value is prime.
pub fn is_prime(n: u32) -> bool {
    if n < 2 {
        return false;
    }
    if n == 2 {
        return true;
    }
    if n % 2 == 0 {
        return false;
    }
    let mut i = 3;
    while i * i <= n {
        if n % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}

/// One board cell. `value` is fixed at generation time and survives the
/// claim unchanged; only the claim marker is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    Unclaimed { value: u32 },
    ClaimedCorrect { owner: u32, value: u32 },
    ClaimedIncorrect { owner: u32, value: u32 },
}

impl Cell {
    pub fn value(&self) -> u32 {
        match *self {
            Cell::Unclaimed { value }
            | Cell::ClaimedCorrect { value, .. }
            | Cell::ClaimedIncorrect { value, .. } => value,
        }
    }

    pub fn is_claimed(&self) -> bool {
        !matches!(self, Cell::Unclaimed { .. })
    }
}

/// Result of attempting to claim a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimResult {
    /// Coordinates outside the grid; the request is dropped silently.
    OutOfBounds,
    /// Cell already carries a marker; a raced double-click is a no-op.
    AlreadyClaimed,
    /// Cell held a target value; the claimer earns a point.
    Correct { value: u32 },
    /// Cell held a non-target value; the claimer loses a point.
    Incorrect { value: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    cells: [[Cell; BOARD_SIZE]; BOARD_SIZE],
}

impl Board {
    /// Generates a fresh board: a random count of distinct target positions
    /// filled with random primes, every remaining cell an odd composite.
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let primes: Vec<u32> = (2..VALUE_CEILING).filter(|&n| is_prime(n)).collect();

        let mut positions: Vec<(usize, usize)> = (0..BOARD_SIZE)
            .flat_map(|r| (0..BOARD_SIZE).map(move |c| (r, c)))
            .collect();
        positions.shuffle(rng);
        let target_count = rng.gen_range(MIN_TARGETS..=MAX_TARGETS);

        let mut cells = [[Cell::Unclaimed { value: 1 }; BOARD_SIZE]; BOARD_SIZE];
        for &(r, c) in positions.iter().take(target_count) {
            let value = primes[rng.gen_range(0..primes.len())];
            cells[r][c] = Cell::Unclaimed { value };
        }
        for &(r, c) in positions.iter().skip(target_count) {
            cells[r][c] = Cell::Unclaimed {
                value: Self::random_filler(rng),
            };
        }

        Board { cells }
    }

    /// Draws an odd non-prime so filler cells can never satisfy the target
    /// predicate and dilute the generated target count.
    fn random_filler<R: Rng>(rng: &mut R) -> u32 {
        loop {
            let candidate = rng.gen_range(0..VALUE_CEILING / 2) * 2 + 1;
            if !is_prime(candidate) {
                return candidate;
            }
        }
    }

    /// Builds a board from explicit cells.
    pub fn from_cells(cells: [[Cell; BOARD_SIZE]; BOARD_SIZE]) -> Self {
        Board { cells }
    }

    pub fn cells(&self) -> &[[Cell; BOARD_SIZE]; BOARD_SIZE] {
        &self.cells
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.get(row).and_then(|r| r.get(col))
    }

    /// Attempts to mark one cell for `owner`. The transition is exactly-once:
    /// whichever claim reaches an unclaimed cell first wins, and every later
    /// claim on it reports `AlreadyClaimed`.
    pub fn claim(&mut self, row: usize, col: usize, owner: u32) -> ClaimResult {
        if row >= BOARD_SIZE || col >= BOARD_SIZE {
            return ClaimResult::OutOfBounds;
        }
        let cell = &mut self.cells[row][col];
        if cell.is_claimed() {
            return ClaimResult::AlreadyClaimed;
        }
        let value = cell.value();
        if is_prime(value) {
            *cell = Cell::ClaimedCorrect { owner, value };
            ClaimResult::Correct { value }
        } else {
            *cell = Cell::ClaimedIncorrect { owner, value };
            ClaimResult::Incorrect { value }
        }
    }

    /// True iff no unclaimed cell holds a target value.
    pub fn is_complete(&self) -> bool {
        self.unclaimed_target_count() == 0
    }

    pub fn unclaimed_target_count(&self) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|cell| !cell.is_claimed() && is_prime(cell.value()))
            .count()
    }
}
