use serde::Serialize;

use crate::constants::{DEFAULT_COLS, DEFAULT_KINDS, DEFAULT_ROWS};

/// Grid coordinate. `x` is the column, `y` the row. Paths may step onto the
/// empty ring around the board, so both are signed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Vs,
    Coop,
}

impl Mode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "vs" => Some(Self::Vs),
            "coop" => Some(Self::Coop),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vs => "vs",
            Self::Coop => "coop",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfereKind {
    Blind,
    Row,
    Shuffle,
    Invert,
}

impl InterfereKind {
    pub const ALL: [InterfereKind; 4] = [Self::Blind, Self::Row, Self::Shuffle, Self::Invert];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "blind" => Some(Self::Blind),
            "row" => Some(Self::Row),
            "shuffle" => Some(Self::Shuffle),
            "invert" => Some(Self::Invert),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BoardConfig {
    pub cols: usize,
    pub rows: usize,
    pub kinds: u8,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            kinds: DEFAULT_KINDS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub size: usize,
    pub mode: Mode,
    #[serde(rename = "maxSize")]
    pub max_size: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoomListing {
    pub rooms: Vec<RoomSummary>,
    pub total: usize,
    pub page: usize,
    pub size: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: i64,
    pub ts: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct LeaderboardResponse {
    pub top: Vec<LeaderboardEntry>,
}
