use std::collections::BTreeMap;

use thiserror::Error;

use crate::server_utils::{make_match_room_id, make_seed, player_order_key, RoomQuery, RoomSort};
use crate::types::{Mode, RoomListing, RoomSummary};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("room {room_id} is full ({capacity} players)")]
    RoomFull { room_id: String, capacity: usize },
}

#[derive(Clone, Debug)]
pub struct Room {
    seed: String,
    mode: Mode,
    host_id: String,
    /// Ordered by connection ordinal.
    members: Vec<String>,
}

impl Room {
    fn new(host_id: &str) -> Self {
        Self {
            seed: make_seed(),
            mode: Mode::Vs,
            host_id: host_id.to_string(),
            members: vec![host_id.to_string()],
        }
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.members.iter().any(|member| member == player_id)
    }

    fn insert_member(&mut self, player_id: &str) {
        let key = player_order_key(player_id);
        let position = self
            .members
            .iter()
            .position(|member| (player_order_key(member), member.as_str()) > (key, player_id))
            .unwrap_or(self.members.len());
        self.members.insert(position, player_id.to_string());
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinOutcome {
    pub created: bool,
    /// The joiner was already in the room; nothing changed.
    pub rejoined: bool,
    pub seed: String,
    pub mode: Mode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Departure {
    pub room_id: String,
    pub room_closed: bool,
    /// Set when the departing member was host and someone else took over.
    pub new_host: Option<String>,
}

/// Authoritative per-room state. Rooms exist exactly while they have members.
#[derive(Debug)]
pub struct RoomRegistry {
    capacity: usize,
    rooms: BTreeMap<String, Room>,
}

impl RoomRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rooms: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_host(&self, room_id: &str, player_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .map(|room| room.host_id == player_id)
            .unwrap_or(false)
    }

    pub fn rooms_of(&self, player_id: &str) -> Vec<String> {
        self.rooms
            .iter()
            .filter(|(_, room)| room.contains(player_id))
            .map(|(room_id, _)| room_id.clone())
            .collect()
    }

    pub fn join(&mut self, room_id: &str, player_id: &str) -> Result<JoinOutcome, JoinError> {
        if let Some(room) = self.rooms.get_mut(room_id) {
            if room.contains(player_id) {
                return Ok(JoinOutcome {
                    created: false,
                    rejoined: true,
                    seed: room.seed.clone(),
                    mode: room.mode,
                });
            }
            if room.members.len() >= self.capacity {
                return Err(JoinError::RoomFull {
                    room_id: room_id.to_string(),
                    capacity: self.capacity,
                });
            }
            room.insert_member(player_id);
            return Ok(JoinOutcome {
                created: false,
                rejoined: false,
                seed: room.seed.clone(),
                mode: room.mode,
            });
        }

        let room = Room::new(player_id);
        let outcome = JoinOutcome {
            created: true,
            rejoined: false,
            seed: room.seed.clone(),
            mode: room.mode,
        };
        self.rooms.insert(room_id.to_string(), room);
        tracing::info!(room_id, host = player_id, "room created");
        Ok(outcome)
    }

    pub fn leave(&mut self, room_id: &str, player_id: &str) -> Option<Departure> {
        let room = self.rooms.get_mut(room_id)?;
        let position = room.members.iter().position(|member| member == player_id)?;
        room.members.remove(position);

        if room.members.is_empty() {
            self.rooms.remove(room_id);
            tracing::info!(room_id, "room closed");
            return Some(Departure {
                room_id: room_id.to_string(),
                room_closed: true,
                new_host: None,
            });
        }

        let mut new_host = None;
        if room.host_id == player_id {
            // Members stay sorted by ordinal, so the first one is the successor.
            room.host_id = room.members[0].clone();
            tracing::info!(room_id, host = %room.host_id, "host reassigned");
            new_host = Some(room.host_id.clone());
        }
        Some(Departure {
            room_id: room_id.to_string(),
            room_closed: false,
            new_host,
        })
    }

    /// Removes the player from every room it is in.
    pub fn disconnect(&mut self, player_id: &str) -> Vec<Departure> {
        self.rooms_of(player_id)
            .into_iter()
            .filter_map(|room_id| self.leave(&room_id, player_id))
            .collect()
    }

    pub fn set_mode(&mut self, room_id: &str, player_id: &str, mode: Mode) -> bool {
        match self.rooms.get_mut(room_id) {
            Some(room) if room.contains(player_id) => {
                room.mode = mode;
                true
            }
            _ => false,
        }
    }

    /// New board seed for the room, issued to any member.
    pub fn restart(&mut self, room_id: &str, player_id: &str) -> Option<(String, Mode)> {
        let room = self.rooms.get_mut(room_id)?;
        if !room.contains(player_id) {
            return None;
        }
        room.seed = make_seed();
        Some((room.seed.clone(), room.mode))
    }

    /// Fresh shuffle seed, only for the room host.
    pub fn authorize_reshuffle(&self, room_id: &str, player_id: &str) -> Option<String> {
        if !self.is_host(room_id, player_id) {
            return None;
        }
        Some(make_seed())
    }

    /// Least crowded room with a free slot that the player is not already in,
    /// or a fresh room id when none qualifies.
    pub fn find_match(&self, player_id: &str) -> String {
        self.rooms
            .iter()
            .filter(|(_, room)| room.members.len() < self.capacity && !room.contains(player_id))
            .min_by(|(id_a, room_a), (id_b, room_b)| {
                room_a
                    .members
                    .len()
                    .cmp(&room_b.members.len())
                    .then_with(|| id_a.cmp(id_b))
            })
            .map(|(room_id, _)| room_id.clone())
            .unwrap_or_else(make_match_room_id)
    }

    pub fn listing(&self, query: RoomQuery) -> RoomListing {
        let mut rooms: Vec<RoomSummary> = self
            .rooms
            .iter()
            .map(|(room_id, room)| RoomSummary {
                room_id: room_id.clone(),
                size: room.members.len(),
                mode: room.mode,
                max_size: self.capacity,
            })
            .collect();
        if query.sort == RoomSort::Size {
            rooms.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.room_id.cmp(&b.room_id)));
        }
        let total = rooms.len();
        let page = query.page.max(1);
        let size = query.size.max(1);
        let rooms = rooms
            .into_iter()
            .skip((page - 1).saturating_mul(size))
            .take(size)
            .collect();
        RoomListing {
            rooms,
            total,
            page,
            size,
        }
    }
}
