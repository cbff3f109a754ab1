use serde::Serialize;

use crate::board::Board;
use crate::constants::{HINT_COOLDOWN_MS, HINT_MAX_USES};
use crate::path_finder::find_path;
use crate::types::Cell;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Hint {
    pub a: Cell,
    pub b: Cell,
    pub path: Vec<Cell>,
}

/// First connectable pair in row-major order of the first cell, then of the
/// second cell after it. `None` means the board has no legal move.
pub fn find_any_hint(board: &Board) -> Option<Hint> {
    let occupied = board.occupied_cells();
    for (i, a) in occupied.iter().enumerate() {
        let value = board.value_or_empty(*a);
        for b in &occupied[i + 1..] {
            if board.value_or_empty(*b) != value {
                continue;
            }
            if let Some(path) = find_path(board, *a, *b) {
                return Some(Hint {
                    a: *a,
                    b: *b,
                    path,
                });
            }
        }
    }
    None
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HintOutcome {
    Shown(Hint),
    Exhausted,
    CoolingDown { remaining_ms: u64 },
    /// Nothing to show; no use was consumed.
    DeadBoard,
}

/// Player-facing hint budget: a fixed number of uses with a cooldown after
/// each one.
#[derive(Clone, Debug)]
pub struct HintTracker {
    uses_remaining: u32,
    cooldown_until_ms: u64,
    cooldown_ms: u64,
}

impl Default for HintTracker {
    fn default() -> Self {
        Self::new(HINT_MAX_USES, HINT_COOLDOWN_MS)
    }
}

impl HintTracker {
    pub fn new(max_uses: u32, cooldown_ms: u64) -> Self {
        Self {
            uses_remaining: max_uses,
            cooldown_until_ms: 0,
            cooldown_ms,
        }
    }

    pub fn uses_remaining(&self) -> u32 {
        self.uses_remaining
    }

    pub fn request(&mut self, board: &Board, now_ms: u64) -> HintOutcome {
        if self.uses_remaining == 0 {
            return HintOutcome::Exhausted;
        }
        if now_ms < self.cooldown_until_ms {
            return HintOutcome::CoolingDown {
                remaining_ms: self.cooldown_until_ms - now_ms,
            };
        }
        let Some(hint) = find_any_hint(board) else {
            return HintOutcome::DeadBoard;
        };
        self.uses_remaining -= 1;
        self.cooldown_until_ms = now_ms + self.cooldown_ms;
        HintOutcome::Shown(hint)
    }
}
