pub const DEFAULT_COLS: usize = 14;
pub const DEFAULT_ROWS: usize = 10;
pub const DEFAULT_KINDS: u8 = 12;

pub const DEFAULT_ROOM_CAPACITY: usize = 4;
pub const MAX_ROOM_CAPACITY: usize = 16;

pub const MAX_BENDS: u8 = 2;

pub const SCORE_PER_PAIR: i64 = 10;
pub const GAME_DURATION_MS: u64 = 180_000;

pub const HINT_MAX_USES: u32 = 3;
pub const HINT_COOLDOWN_MS: u64 = 3_000;

pub const SHUFFLE_MIN_SWAPS: usize = 6;
pub const SHUFFLE_SWAP_RATIO: f64 = 0.2;
pub const MAX_RESHUFFLE_ATTEMPTS: usize = 32;

pub const COMBO_WINDOW_MS: u64 = 2_000;
pub const COMBO_FOR_INTERFERENCE: u32 = 3;
pub const INTERFERE_COOLDOWN_MS: u64 = 4_000;
pub const BLIND_RECEIVE_COOLDOWN_MS: u64 = 2_000;
pub const BLIND_DEFAULT_MS: u64 = 1_200;
pub const INVERT_DURATION_MS: u64 = 1_500;

pub const NAME_MAX_CHARS: usize = 20;
pub const CHAT_MAX_CHARS: usize = 200;
pub const ROOM_ID_MAX_CHARS: usize = 64;
pub const LEADERBOARD_TOP_N: usize = 20;

pub const ROOM_PAGE_SIZE_DEFAULT: usize = 20;
pub const ROOM_PAGE_SIZE_MAX: usize = 100;

pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Blind lasts longer the deeper the combo, capped.
pub fn interference_duration_ms(combo: u32) -> u64 {
    let extra = combo.saturating_sub(2) as u64 * 300;
    (800 + extra).min(2_500)
}

/// Swaps performed by a partial shuffle over `occupied` cells.
pub fn shuffle_swap_count(occupied: usize) -> usize {
    let scaled = (occupied as f64 * SHUFFLE_SWAP_RATIO).floor() as usize;
    occupied.min(scaled.max(SHUFFLE_MIN_SWAPS))
}
