use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng as _;
use serde_json::Value;

use crate::constants::{NAME_MAX_CHARS, ROOM_PAGE_SIZE_DEFAULT, ROOM_PAGE_SIZE_MAX};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn sanitize_name(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "Player".to_string();
    }
    trimmed.chars().take(NAME_MAX_CHARS).collect()
}

/// Ordinal of a `prefix_<n>` id; ids without a numeric suffix sort last.
pub fn player_order_key(player_id: &str) -> u64 {
    player_id
        .rsplit('_')
        .next()
        .and_then(|suffix| suffix.parse::<u64>().ok())
        .unwrap_or(u64::MAX)
}

pub fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

fn random_token(len: usize) -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Board seed in the `<ms>-<random>` shape clients already log.
pub fn make_seed() -> String {
    format!("{}-{}", now_ms(), random_token(10))
}

pub fn make_match_room_id() -> String {
    format!("match-{}", random_token(8))
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomSort {
    Id,
    Size,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoomQuery {
    pub sort: RoomSort,
    pub page: usize,
    pub size: usize,
}

impl Default for RoomQuery {
    fn default() -> Self {
        Self {
            sort: RoomSort::Id,
            page: 1,
            size: ROOM_PAGE_SIZE_DEFAULT,
        }
    }
}

/// Unknown or unparsable values fall back to defaults instead of failing.
pub fn parse_room_query(sort: Option<&str>, page: Option<&str>, size: Option<&str>) -> RoomQuery {
    let sort = match sort.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
        Some("size") => RoomSort::Size,
        _ => RoomSort::Id,
    };
    let page = page
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|page| *page >= 1)
        .unwrap_or(1);
    let size = size
        .and_then(|value| value.trim().parse::<usize>().ok())
        .map(|size| size.clamp(1, ROOM_PAGE_SIZE_MAX))
        .unwrap_or(ROOM_PAGE_SIZE_DEFAULT);
    RoomQuery { sort, page, size }
}

/// Largest integer a JSON client can represent exactly.
const MAX_SAFE_SCORE: i64 = 9_007_199_254_740_991;

/// Validates a leaderboard submission body. Scores are whole numbers:
/// fractions are floored and magnitudes past `MAX_SAFE_SCORE` are refused.
pub fn parse_score_submission(body: &Value) -> Option<(String, i64)> {
    let object = body.as_object()?;
    let name = object.get("name")?.as_str()?;
    let score = object.get("score")?;
    let score = match score.as_i64() {
        Some(score) => score,
        None => {
            let score = score.as_f64()?;
            if !score.is_finite() || score.abs() > MAX_SAFE_SCORE as f64 {
                return None;
            }
            score.floor() as i64
        }
    };
    (-MAX_SAFE_SCORE..=MAX_SAFE_SCORE)
        .contains(&score)
        .then(|| (name.to_string(), score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn player_order_key_uses_numeric_suffix() {
        assert!(player_order_key("conn_2") < player_order_key("conn_10"));
        assert_eq!(player_order_key("guest"), u64::MAX);
    }

    #[test]
    fn sanitize_name_applies_trim_empty_and_max_len() {
        assert_eq!(sanitize_name(""), "Player");
        assert_eq!(sanitize_name("   "), "Player");
        assert_eq!(sanitize_name(" Alice "), "Alice");
        assert_eq!(
            sanitize_name("1234567890123456789012345"),
            "12345678901234567890"
        );
    }

    #[test]
    fn ids_are_sequential_per_process() {
        let first = make_id("conn");
        let second = make_id("conn");
        assert!(first.starts_with("conn_"));
        assert!(player_order_key(&first) < player_order_key(&second));
    }

    #[test]
    fn seeds_and_match_ids_have_expected_shape() {
        let seed = make_seed();
        let (ms, token) = seed.split_once('-').expect("seed has a dash");
        assert!(ms.parse::<i64>().is_ok());
        assert_eq!(token.len(), 10);
        assert_ne!(make_seed(), seed);

        let room_id = make_match_room_id();
        assert!(room_id.starts_with("match-"));
        assert_eq!(room_id.len(), "match-".len() + 8);
    }

    #[test]
    fn room_query_parsing_is_lenient() {
        assert_eq!(parse_room_query(None, None, None), RoomQuery::default());
        assert_eq!(
            parse_room_query(Some("size"), Some("3"), Some("5")),
            RoomQuery {
                sort: RoomSort::Size,
                page: 3,
                size: 5
            }
        );
        let fallback = parse_room_query(Some("weird"), Some("0"), Some("abc"));
        assert_eq!(fallback, RoomQuery::default());
        assert_eq!(parse_room_query(None, None, Some("0")).size, 1);
        assert_eq!(parse_room_query(None, None, Some("5000")).size, ROOM_PAGE_SIZE_MAX);
    }

    #[test]
    fn score_submission_requires_string_name_and_finite_score() {
        assert_eq!(
            parse_score_submission(&json!({"name": "Ada", "score": 120})),
            Some(("Ada".to_string(), 120))
        );
        assert_eq!(
            parse_score_submission(&json!({"name": "Ada", "score": 12.9})),
            Some(("Ada".to_string(), 12))
        );
        assert!(parse_score_submission(&json!({"name": 5, "score": 1})).is_none());
        assert!(parse_score_submission(&json!({"name": "Ada", "score": "10"})).is_none());
        assert!(parse_score_submission(&json!({"name": "Ada"})).is_none());
        assert!(parse_score_submission(&json!(["Ada", 1])).is_none());
    }

    #[test]
    fn score_submission_is_floored_and_bounded_to_safe_integers() {
        assert_eq!(
            parse_score_submission(&json!({"name": "Ada", "score": -0.5})),
            Some(("Ada".to_string(), -1))
        );
        assert_eq!(
            parse_score_submission(&json!({"name": "Ada", "score": 9_007_199_254_740_991_i64})),
            Some(("Ada".to_string(), MAX_SAFE_SCORE))
        );
        assert!(parse_score_submission(&json!({"name": "Ada", "score": 9_007_199_254_740_992_i64})).is_none());
        assert!(parse_score_submission(&json!({"name": "Ada", "score": i64::MIN})).is_none());
        assert!(parse_score_submission(&json!({"name": "Ada", "score": u64::MAX})).is_none());
        assert!(parse_score_submission(&json!({"name": "Ada", "score": 1e300})).is_none());
    }
}
