use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::LEADERBOARD_TOP_N;
use crate::server_utils::sanitize_name;
use crate::types::{LeaderboardEntry, LeaderboardResponse};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredEntry {
    name: String,
    score: i64,
    ts: i64,
}

#[derive(Serialize)]
struct LeaderboardFile<'a> {
    version: u8,
    entries: &'a [StoredEntry],
}

#[derive(Deserialize)]
struct LeaderboardFileRaw {
    version: u8,
    entries: Vec<serde_json::Value>,
}

/// Append-only score ledger. Persistence is best effort: IO problems are
/// logged and the in-memory ledger stays authoritative.
pub struct LeaderboardStore {
    file_path: Option<PathBuf>,
    entries: Vec<StoredEntry>,
}

impl LeaderboardStore {
    pub fn new(file_path: PathBuf) -> Self {
        let entries = load_entries(&file_path);
        tracing::info!(path = %file_path.display(), entries = entries.len(), "leaderboard loaded");
        Self {
            file_path: Some(file_path),
            entries,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            file_path: None,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn append(&mut self, name: &str, score: i64, ts: i64) {
        self.entries.push(StoredEntry {
            name: sanitize_name(name),
            score,
            ts,
        });
        self.save();
    }

    /// Highest scores first; equal scores keep submission order.
    pub fn top(&self) -> LeaderboardResponse {
        let mut entries: Vec<&StoredEntry> = self.entries.iter().collect();
        entries.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.ts.cmp(&b.ts)));
        LeaderboardResponse {
            top: entries
                .into_iter()
                .take(LEADERBOARD_TOP_N)
                .map(|entry| LeaderboardEntry {
                    name: entry.name.clone(),
                    score: entry.score,
                    ts: entry.ts,
                })
                .collect(),
        }
    }

    fn save(&self) {
        let Some(file_path) = self.file_path.as_ref() else {
            return;
        };
        if let Some(parent) = file_path.parent() {
            if let Err(error) = fs::create_dir_all(parent) {
                tracing::warn!(dir = %parent.display(), %error, "failed to create leaderboard dir");
                return;
            }
        }

        let payload = LeaderboardFile {
            version: 1,
            entries: &self.entries,
        };
        match serde_json::to_string_pretty(&payload) {
            Ok(text) => {
                if let Err(error) = fs::write(file_path, text) {
                    tracing::warn!(path = %file_path.display(), %error, "failed to write leaderboard");
                }
            }
            Err(error) => {
                tracing::warn!(path = %file_path.display(), %error, "failed to serialize leaderboard");
            }
        }
    }
}

fn load_entries(path: &Path) -> Vec<StoredEntry> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), %error, "failed to read leaderboard");
            }
            return Vec::new();
        }
    };
    let parsed = match serde_json::from_str::<LeaderboardFileRaw>(&text) {
        Ok(value) if value.version == 1 => value,
        Ok(value) => {
            tracing::warn!(path = %path.display(), version = value.version, "unsupported leaderboard version");
            return Vec::new();
        }
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "failed to parse leaderboard");
            return Vec::new();
        }
    };

    let mut entries = Vec::with_capacity(parsed.entries.len());
    for (index, raw_value) in parsed.entries.into_iter().enumerate() {
        match serde_json::from_value::<StoredEntry>(raw_value) {
            Ok(entry) => entries.push(StoredEntry {
                name: sanitize_name(&entry.name),
                ..entry
            }),
            Err(error) => {
                tracing::warn!(path = %path.display(), index, %error, "skipping malformed leaderboard entry");
            }
        }
    }
    entries
}
