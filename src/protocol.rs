use serde::Serialize;
use serde_json::{Map, Value};

use crate::constants::{CHAT_MAX_CHARS, ROOM_ID_MAX_CHARS};
use crate::types::{BoardConfig, Cell, InterfereKind, Mode, RosterEntry};

/// Move facts a client reports about its own board.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayerAction {
    Chat { text: String },
    RemovePair { a: Cell, b: Cell },
    Interfere { kind: InterfereKind, ms: Option<u64> },
    GameOver { win: bool },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    SetName { name: String },
    JoinRoom { room_id: String },
    LeaveRoom { room_id: String },
    PlayerEvent { room_id: String, payload: PlayerAction },
    RequestRestart { room_id: String },
    SetMode { room_id: String, mode: Mode },
    RequestShuffle { room_id: String },
    ReportNoMoves { room_id: String },
    FindMatch,
}

impl ClientMessage {
    pub fn room_id(&self) -> Option<&str> {
        match self {
            Self::JoinRoom { room_id }
            | Self::LeaveRoom { room_id }
            | Self::PlayerEvent { room_id, .. }
            | Self::RequestRestart { room_id }
            | Self::SetMode { room_id, .. }
            | Self::RequestShuffle { room_id }
            | Self::ReportNoMoves { room_id } => Some(room_id),
            Self::SetName { .. } | Self::FindMatch => None,
        }
    }
}

/// Payload of a server `playerEvent`: relayed facts carry the sender id,
/// the rest are issued by the server itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RoomEvent {
    Chat {
        from: String,
        text: String,
    },
    RemovePair {
        from: String,
        a: Cell,
        b: Cell,
    },
    Interfere {
        from: String,
        kind: InterfereKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        ms: Option<u64>,
    },
    GameOver {
        from: String,
        win: bool,
    },
    RoomRoster {
        list: Vec<RosterEntry>,
        #[serde(rename = "hostId")]
        host_id: String,
    },
    ModeChanged {
        mode: Mode,
    },
    ScoreDelta {
        value: i64,
    },
    ShuffleSeed {
        seed: String,
    },
    ShuffleRequested {
        from: String,
    },
    Restart,
}

impl RoomEvent {
    pub fn relayed(from: &str, action: PlayerAction) -> Self {
        let from = from.to_string();
        match action {
            PlayerAction::Chat { text } => Self::Chat { from, text },
            PlayerAction::RemovePair { a, b } => Self::RemovePair { from, a, b },
            PlayerAction::Interfere { kind, ms } => Self::Interfere { from, kind, ms },
            PlayerAction::GameOver { win } => Self::GameOver { from, win },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Joined {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "playerId")]
        player_id: String,
    },
    System {
        text: String,
    },
    PlayerEvent {
        payload: RoomEvent,
    },
    SyncSeed {
        seed: String,
        config: BoardConfig,
        mode: Mode,
    },
    MatchFound {
        #[serde(rename = "roomId")]
        room_id: String,
    },
}

impl ServerMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self::System { text: text.into() }
    }

    pub fn event(payload: RoomEvent) -> Self {
        Self::PlayerEvent { payload }
    }
}

/// Lenient frame parser: anything malformed or of unknown type is `None`.
pub fn parse_client_message(raw: &str) -> Option<ClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "setName" => {
            let name = object.get("name")?.as_str()?.to_string();
            Some(ClientMessage::SetName { name })
        }
        "joinRoom" => Some(ClientMessage::JoinRoom {
            room_id: parse_room_id(object)?,
        }),
        "leaveRoom" => Some(ClientMessage::LeaveRoom {
            room_id: parse_room_id(object)?,
        }),
        "playerEvent" => {
            let room_id = parse_room_id(object)?;
            let payload = parse_player_action(object.get("payload")?)?;
            Some(ClientMessage::PlayerEvent { room_id, payload })
        }
        "requestRestart" => Some(ClientMessage::RequestRestart {
            room_id: parse_room_id(object)?,
        }),
        "setMode" => {
            let room_id = parse_room_id(object)?;
            let mode = Mode::parse(object.get("mode")?.as_str()?)?;
            Some(ClientMessage::SetMode { room_id, mode })
        }
        "requestShuffle" => Some(ClientMessage::RequestShuffle {
            room_id: parse_room_id(object)?,
        }),
        "reportNoMoves" => Some(ClientMessage::ReportNoMoves {
            room_id: parse_room_id(object)?,
        }),
        "findMatch" => Some(ClientMessage::FindMatch),
        _ => None,
    }
}

pub fn parse_player_action(value: &Value) -> Option<PlayerAction> {
    let object = value.as_object()?;
    match object.get("type")?.as_str()? {
        "chat" => {
            let text = object.get("text")?.as_str()?.trim();
            if text.is_empty() {
                return None;
            }
            Some(PlayerAction::Chat {
                text: text.chars().take(CHAT_MAX_CHARS).collect(),
            })
        }
        "removePair" => {
            let a = parse_cell(object.get("a")?)?;
            let b = parse_cell(object.get("b")?)?;
            Some(PlayerAction::RemovePair { a, b })
        }
        "interfere" => {
            let kind = InterfereKind::parse(object.get("kind")?.as_str()?)?;
            let ms = match object.get("ms") {
                None | Some(Value::Null) => None,
                Some(value) => Some(parse_duration_ms(value)?),
            };
            Some(PlayerAction::Interfere { kind, ms })
        }
        "gameOver" => {
            let win = object.get("win")?.as_bool()?;
            Some(PlayerAction::GameOver { win })
        }
        _ => None,
    }
}

fn parse_room_id(object: &Map<String, Value>) -> Option<String> {
    let room_id = object.get("roomId")?.as_str()?.trim();
    if room_id.is_empty() || room_id.chars().count() > ROOM_ID_MAX_CHARS {
        return None;
    }
    Some(room_id.to_string())
}

fn parse_cell(value: &Value) -> Option<Cell> {
    let object = value.as_object()?;
    let x = i32::try_from(object.get("x")?.as_i64()?).ok()?;
    let y = i32::try_from(object.get("y")?.as_i64()?).ok()?;
    Some(Cell::new(x, y))
}

fn parse_duration_ms(value: &Value) -> Option<u64> {
    if let Some(ms) = value.as_u64() {
        return Some(ms);
    }
    let ms = value.as_f64()?;
    if !ms.is_finite() || ms < 0.0 || ms > u32::MAX as f64 {
        return None;
    }
    Some(ms.floor() as u64)
}
