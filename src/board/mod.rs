use thiserror::Error;

use crate::rng::Rng;
use crate::types::{BoardConfig, Cell};

pub mod mutators;

pub use self::mutators::RemovalOutcome;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoardError {
    #[error("board dimensions must be even and non-zero, got {cols}x{rows}")]
    InvalidDimensions { cols: usize, rows: usize },
    #[error("kind count must be at least 1")]
    NoKinds,
    #[error("row {row} has {len} cells, expected {cols}")]
    RaggedRow { row: usize, len: usize, cols: usize },
}

impl BoardConfig {
    pub fn validate(&self) -> Result<(), BoardError> {
        if self.cols == 0 || self.rows == 0 || self.cols % 2 != 0 || self.rows % 2 != 0 {
            return Err(BoardError::InvalidDimensions {
                cols: self.cols,
                rows: self.rows,
            });
        }
        if self.kinds == 0 {
            return Err(BoardError::NoKinds);
        }
        Ok(())
    }
}

/// Row-major grid of kind values, `0` meaning empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    cols: usize,
    rows: usize,
    kinds: u8,
    cells: Vec<u8>,
}

impl Board {
    /// Builds `cols*rows/2` pairs with kinds assigned round-robin, shuffles
    /// them with Fisher-Yates and lays them out row-major.
    pub fn generate(config: BoardConfig, rng: &mut Rng) -> Result<Self, BoardError> {
        config.validate()?;
        let pair_count = config.cols * config.rows / 2;
        let mut values = Vec::with_capacity(pair_count * 2);
        for slot in 0..pair_count {
            let value = (slot % config.kinds as usize) as u8 + 1;
            values.push(value);
            values.push(value);
        }
        for i in (1..values.len()).rev() {
            let j = rng.pick_index(i + 1);
            values.swap(i, j);
        }
        Ok(Self {
            cols: config.cols,
            rows: config.rows,
            kinds: config.kinds,
            cells: values,
        })
    }

    pub fn from_seed(config: BoardConfig, seed: &str) -> Result<Self, BoardError> {
        Self::generate(config, &mut Rng::from_seed(seed))
    }

    /// Board from explicit rows (`rows[y][x]`). The kind count is taken from
    /// the largest value present.
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self, BoardError> {
        let row_count = rows.len();
        let cols = rows.first().map(|row| row.len()).unwrap_or(0);
        if cols == 0 {
            return Err(BoardError::InvalidDimensions {
                cols,
                rows: row_count,
            });
        }
        let mut cells = Vec::with_capacity(cols * row_count);
        for (index, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(BoardError::RaggedRow {
                    row: index,
                    len: row.len(),
                    cols,
                });
            }
            cells.extend_from_slice(row);
        }
        let kinds = cells.iter().copied().max().unwrap_or(0).max(1);
        Ok(Self {
            cols,
            rows: row_count,
            kinds,
            cells,
        })
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn kinds(&self) -> u8 {
        self.kinds
    }

    pub fn config(&self) -> BoardConfig {
        BoardConfig {
            cols: self.cols,
            rows: self.rows,
            kinds: self.kinds,
        }
    }

    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && (cell.x as usize) < self.cols && (cell.y as usize) < self.rows
    }

    fn index_of(&self, cell: Cell) -> Option<usize> {
        if !self.in_bounds(cell) {
            return None;
        }
        Some(cell.y as usize * self.cols + cell.x as usize)
    }

    pub fn get(&self, cell: Cell) -> Option<u8> {
        self.index_of(cell).map(|index| self.cells[index])
    }

    /// Value at `cell`, treating everything off the board as empty.
    pub fn value_or_empty(&self, cell: Cell) -> u8 {
        self.get(cell).unwrap_or(0)
    }

    pub fn set(&mut self, cell: Cell, value: u8) -> bool {
        match self.index_of(cell) {
            Some(index) => {
                self.cells[index] = value;
                true
            }
            None => false,
        }
    }

    pub fn cell_at(&self, index: usize) -> Cell {
        Cell::new((index % self.cols) as i32, (index / self.cols) as i32)
    }

    pub fn values(&self) -> &[u8] {
        &self.cells
    }

    /// Occupied cells in row-major order.
    pub fn occupied_cells(&self) -> Vec<Cell> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, value)| **value != 0)
            .map(|(index, _)| self.cell_at(index))
            .collect()
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|value| **value != 0).count()
    }

    pub fn is_cleared(&self) -> bool {
        self.cells.iter().all(|value| *value == 0)
    }

    /// Occurrences per value; index 0 counts empty cells. Values above the
    /// configured kind count (possible after `from_rows`) are still counted.
    pub fn kind_counts(&self) -> Vec<usize> {
        let top = self
            .cells
            .iter()
            .copied()
            .max()
            .unwrap_or(0)
            .max(self.kinds) as usize;
        let mut counts = vec![0; top + 1];
        for value in &self.cells {
            counts[*value as usize] += 1;
        }
        counts
    }

    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        self.cells
            .chunks(self.cols)
            .map(|row| row.to_vec())
            .collect()
    }
}
