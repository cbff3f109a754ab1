use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use crate::board::BoardError;
use crate::constants::{
    DEFAULT_COLS, DEFAULT_KINDS, DEFAULT_ROOM_CAPACITY, DEFAULT_ROWS, MAX_ROOM_CAPACITY,
};
use crate::types::BoardConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("room capacity must be within 1..={max}, got {value}")]
    RoomCapacity { value: usize, max: usize },
    #[error("board kinds must be within 1..=255, got {0}")]
    BoardKinds(u16),
    #[error(transparent)]
    Board(#[from] BoardError),
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Connect-pairs game server")]
pub struct ServerConfig {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,
    #[arg(long, env = "LEADERBOARD_DB_PATH", default_value = ".data/leaderboard.json")]
    pub leaderboard_path: PathBuf,
    /// Directory with the browser client; nothing is served when unset.
    #[arg(long, env = "STATIC_DIR")]
    pub static_dir: Option<PathBuf>,
    #[arg(long, env = "ROOM_CAPACITY", default_value_t = DEFAULT_ROOM_CAPACITY)]
    pub room_capacity: usize,
    #[arg(long, env = "BOARD_COLS", default_value_t = DEFAULT_COLS)]
    pub board_cols: usize,
    #[arg(long, env = "BOARD_ROWS", default_value_t = DEFAULT_ROWS)]
    pub board_rows: usize,
    #[arg(long, env = "BOARD_KINDS", default_value_t = DEFAULT_KINDS as u16)]
    pub board_kinds: u16,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.room_capacity == 0 || self.room_capacity > MAX_ROOM_CAPACITY {
            return Err(ConfigError::RoomCapacity {
                value: self.room_capacity,
                max: MAX_ROOM_CAPACITY,
            });
        }
        self.board_config()?;
        Ok(())
    }

    pub fn board_config(&self) -> Result<BoardConfig, ConfigError> {
        let kinds = u8::try_from(self.board_kinds)
            .ok()
            .filter(|kinds| *kinds >= 1)
            .ok_or(ConfigError::BoardKinds(self.board_kinds))?;
        let config = BoardConfig {
            cols: self.board_cols,
            rows: self.board_rows,
            kinds,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASELINE: [(&str, &str); 6] = [
        ("--port", "3000"),
        ("--leaderboard-path", ".data/leaderboard.json"),
        ("--room-capacity", "4"),
        ("--board-cols", "14"),
        ("--board-rows", "10"),
        ("--board-kinds", "12"),
    ];

    /// Every numeric field is passed on the command line so exported
    /// `PORT`, `BOARD_ROWS` and friends cannot change the outcome.
    fn parse(overrides: &[(&str, &str)]) -> ServerConfig {
        let mut argv = vec!["pairlink-server"];
        for (flag, default) in BASELINE {
            let value = overrides
                .iter()
                .find(|(name, _)| *name == flag)
                .map_or(default, |(_, value)| *value);
            argv.extend([flag, value]);
        }
        ServerConfig::try_parse_from(argv).expect("arguments parse")
    }

    #[test]
    fn baseline_arguments_match_defaults() {
        let config = parse(&[]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.room_capacity, DEFAULT_ROOM_CAPACITY);
        assert_eq!(config.board_config(), Ok(BoardConfig::default()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[("--port", "4100"), ("--room-capacity", "2"), ("--board-cols", "6")]);
        assert_eq!(config.port, 4100);
        assert_eq!(config.room_capacity, 2);
        assert_eq!(config.board_cols, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn odd_board_is_rejected() {
        let config = parse(&[("--board-cols", "7")]);
        assert_eq!(
            config.validate(),
            Err(ConfigError::Board(BoardError::InvalidDimensions { cols: 7, rows: 10 }))
        );
    }

    #[test]
    fn capacity_and_kinds_are_bounded() {
        let config = parse(&[("--room-capacity", "0")]);
        assert!(matches!(config.validate(), Err(ConfigError::RoomCapacity { value: 0, .. })));
        let config = parse(&[("--room-capacity", "17")]);
        assert!(matches!(config.validate(), Err(ConfigError::RoomCapacity { value: 17, .. })));
        let config = parse(&[("--board-kinds", "300")]);
        assert_eq!(config.validate(), Err(ConfigError::BoardKinds(300)));
        let config = parse(&[("--board-kinds", "0")]);
        assert_eq!(config.validate(), Err(ConfigError::BoardKinds(0)));
    }

    #[test]
    fn board_config_reflects_flags() {
        let config = parse(&[("--board-cols", "8"), ("--board-rows", "4"), ("--board-kinds", "5")]);
        assert_eq!(
            config.board_config(),
            Ok(BoardConfig {
                cols: 8,
                rows: 4,
                kinds: 5
            })
        );
    }
}
