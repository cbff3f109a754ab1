use crate::board::Board;
use crate::constants::{shuffle_swap_count, MAX_RESHUFFLE_ATTEMPTS};
use crate::hint::find_any_hint;
use crate::rng::Rng;
use crate::types::Cell;

/// State of the board after a pair left it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalOutcome {
    Playable,
    Cleared,
    /// No connectable pair remains and nothing was done about it yet.
    Dead,
    /// The board was dead and got partially shuffled, `swaps` in total.
    Reshuffled { swaps: usize },
}

impl Board {
    /// Clears both cells and classifies what is left. Cells off the board are
    /// ignored; the caller is trusted to name a real pair.
    pub fn remove_pair(&mut self, a: Cell, b: Cell) -> RemovalOutcome {
        self.set(a, 0);
        self.set(b, 0);
        self.classify()
    }

    /// [`Board::remove_pair`] followed by [`Board::reshuffle_until_playable`]
    /// when the board is left without moves.
    pub fn remove_pair_and_settle(&mut self, a: Cell, b: Cell, rng: &mut Rng) -> RemovalOutcome {
        match self.remove_pair(a, b) {
            RemovalOutcome::Dead => RemovalOutcome::Reshuffled {
                swaps: self.reshuffle_until_playable(rng),
            },
            outcome => outcome,
        }
    }

    /// Partial shuffles until some pair connects, giving up after
    /// `MAX_RESHUFFLE_ATTEMPTS` rounds. Returns the total swap count.
    pub fn reshuffle_until_playable(&mut self, rng: &mut Rng) -> usize {
        let mut swaps = 0;
        for _ in 0..MAX_RESHUFFLE_ATTEMPTS {
            swaps += self.partial_shuffle(rng);
            if self.classify() != RemovalOutcome::Dead {
                break;
            }
        }
        swaps
    }

    pub fn classify(&self) -> RemovalOutcome {
        if self.is_cleared() {
            RemovalOutcome::Cleared
        } else if find_any_hint(self).is_none() {
            RemovalOutcome::Dead
        } else {
            RemovalOutcome::Playable
        }
    }

    /// Random pairwise swaps among occupied cells. Only permutes existing
    /// values, so per-kind counts never change. Returns the swap count.
    pub fn partial_shuffle(&mut self, rng: &mut Rng) -> usize {
        let coords = self.occupied_cells();
        let swaps = shuffle_swap_count(coords.len());
        for _ in 0..swaps {
            let a = coords[rng.pick_index(coords.len())];
            let b = coords[rng.pick_index(coords.len())];
            let value_a = self.value_or_empty(a);
            let value_b = self.value_or_empty(b);
            self.set(a, value_b);
            self.set(b, value_a);
        }
        swaps
    }

    /// Pushes every row down by one and fills the top row with fresh values.
    /// The bottom row falls off without its partners, so kind parity can
    /// break; that is the point of the disruption. Returns the lost row.
    pub fn inject_row(&mut self, rng: &mut Rng) -> Vec<u8> {
        let cols = self.cols;
        let kinds = self.kinds.max(1) as f64;
        let fresh: Vec<u8> = (0..cols)
            .map(|_| (rng.next_f64() * kinds).floor() as u8 + 1)
            .collect();
        let bottom_start = (self.rows - 1) * cols;
        let discarded = self.cells[bottom_start..].to_vec();
        self.cells.copy_within(0..bottom_start, cols);
        self.cells[..cols].copy_from_slice(&fresh);
        discarded
    }
}
