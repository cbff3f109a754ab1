pub mod board;
pub mod config;
pub mod constants;
pub mod error;
pub mod game;
pub mod hint;
pub mod leaderboard_store;
pub mod path_finder;
pub mod protocol;
pub mod rng;
pub mod room_registry;
pub mod server_utils;
pub mod session;
pub mod types;
