use std::collections::HashMap;

use crate::constants::SCORE_PER_PAIR;
use crate::protocol::{ClientMessage, PlayerAction, RoomEvent, ServerMessage};
use crate::room_registry::{Departure, RoomRegistry};
use crate::server_utils::{sanitize_name, RoomQuery};
use crate::types::{BoardConfig, Mode, RoomListing, RosterEntry};

/// How a message should be treated when the recipient's queue is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// A reply to the connection's own request.
    Direct,
    Broadcast,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outbound {
    pub to: String,
    pub message: ServerMessage,
    pub delivery: Delivery,
}

/// Protocol state machine. Every handler runs to completion and returns the
/// messages to deliver; the transport owns the actual sockets.
#[derive(Debug)]
pub struct SessionHub {
    registry: RoomRegistry,
    names: HashMap<String, String>,
    board_config: BoardConfig,
}

impl SessionHub {
    pub fn new(registry: RoomRegistry, board_config: BoardConfig) -> Self {
        Self {
            registry,
            names: HashMap::new(),
            board_config,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn board_config(&self) -> BoardConfig {
        self.board_config
    }

    pub fn room_listing(&self, query: RoomQuery) -> RoomListing {
        self.registry.listing(query)
    }

    fn display_name(&self, player_id: &str) -> String {
        self.names
            .get(player_id)
            .cloned()
            .unwrap_or_else(|| "Player".to_string())
    }

    pub fn handle(&mut self, player_id: &str, message: ClientMessage) -> Vec<Outbound> {
        let mut out = Vec::new();
        match message {
            ClientMessage::SetName { name } => {
                self.names.insert(player_id.to_string(), sanitize_name(&name));
                for room_id in self.registry.rooms_of(player_id) {
                    self.push_roster(&mut out, &room_id);
                }
            }
            ClientMessage::JoinRoom { room_id } => self.join(&mut out, player_id, &room_id),
            ClientMessage::LeaveRoom { room_id } => {
                if let Some(departure) = self.registry.leave(&room_id, player_id) {
                    let name = self.display_name(player_id);
                    self.announce_departure(&mut out, &departure, &format!("{name} left room {room_id}"));
                } else {
                    tracing::debug!(player_id, %room_id, "leave ignored: not a member");
                }
            }
            ClientMessage::PlayerEvent { room_id, payload } => {
                self.relay(&mut out, player_id, &room_id, payload);
            }
            ClientMessage::RequestRestart { room_id } => {
                let Some((seed, mode)) = self.registry.restart(&room_id, player_id) else {
                    tracing::debug!(player_id, %room_id, "restart ignored: not a member");
                    return out;
                };
                tracing::info!(%room_id, player_id, "room restarted");
                self.push_room(
                    &mut out,
                    &room_id,
                    None,
                    ServerMessage::SyncSeed {
                        seed,
                        config: self.board_config,
                        mode,
                    },
                );
                self.push_room(&mut out, &room_id, None, ServerMessage::event(RoomEvent::Restart));
            }
            ClientMessage::SetMode { room_id, mode } => {
                if !self.registry.set_mode(&room_id, player_id, mode) {
                    tracing::debug!(player_id, %room_id, "mode change ignored: not a member");
                    return out;
                }
                self.push_room(
                    &mut out,
                    &room_id,
                    None,
                    ServerMessage::event(RoomEvent::ModeChanged { mode }),
                );
                self.push_room(
                    &mut out,
                    &room_id,
                    None,
                    ServerMessage::system(format!("room mode set to {}", mode.as_str())),
                );
            }
            ClientMessage::RequestShuffle { room_id } => {
                let host_id = match self.registry.room(&room_id) {
                    Some(room) if room.contains(player_id) => room.host_id().to_string(),
                    _ => return out,
                };
                out.push(Outbound {
                    to: host_id,
                    message: ServerMessage::event(RoomEvent::ShuffleRequested {
                        from: player_id.to_string(),
                    }),
                    delivery: Delivery::Broadcast,
                });
            }
            ClientMessage::ReportNoMoves { room_id } => {
                let Some(seed) = self.registry.authorize_reshuffle(&room_id, player_id) else {
                    tracing::debug!(player_id, %room_id, "no-moves report ignored: not host");
                    return out;
                };
                tracing::info!(%room_id, player_id, "reshuffle authorized");
                self.push_room(
                    &mut out,
                    &room_id,
                    None,
                    ServerMessage::event(RoomEvent::ShuffleSeed { seed }),
                );
            }
            ClientMessage::FindMatch => {
                let room_id = self.registry.find_match(player_id);
                out.push(Outbound {
                    to: player_id.to_string(),
                    message: ServerMessage::MatchFound { room_id },
                    delivery: Delivery::Direct,
                });
            }
        }
        out
    }

    /// Lifecycle event for a closed connection.
    pub fn disconnect(&mut self, player_id: &str) -> Vec<Outbound> {
        let mut out = Vec::new();
        let name = self.display_name(player_id);
        for departure in self.registry.disconnect(player_id) {
            let text = format!("{name} disconnected");
            self.announce_departure(&mut out, &departure, &text);
        }
        self.names.remove(player_id);
        out
    }

    fn join(&mut self, out: &mut Vec<Outbound>, player_id: &str, room_id: &str) {
        let outcome = match self.registry.join(room_id, player_id) {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::info!(player_id, %room_id, %error, "join refused");
                out.push(Outbound {
                    to: player_id.to_string(),
                    message: ServerMessage::system(error.to_string()),
                    delivery: Delivery::Direct,
                });
                return;
            }
        };

        out.push(Outbound {
            to: player_id.to_string(),
            message: ServerMessage::Joined {
                room_id: room_id.to_string(),
                player_id: player_id.to_string(),
            },
            delivery: Delivery::Direct,
        });
        out.push(Outbound {
            to: player_id.to_string(),
            message: ServerMessage::SyncSeed {
                seed: outcome.seed,
                config: self.board_config,
                mode: outcome.mode,
            },
            delivery: Delivery::Direct,
        });
        if !outcome.rejoined {
            let name = self.display_name(player_id);
            self.push_room(
                out,
                room_id,
                Some(player_id),
                ServerMessage::system(format!("{name} joined room {room_id}")),
            );
        }
        self.push_roster(out, room_id);
    }

    fn relay(&mut self, out: &mut Vec<Outbound>, player_id: &str, room_id: &str, payload: PlayerAction) {
        let mode = match self.registry.room(room_id) {
            Some(room) if room.contains(player_id) => room.mode(),
            _ => {
                tracing::debug!(player_id, %room_id, "event dropped: sender not in room");
                return;
            }
        };
        if mode == Mode::Coop && matches!(payload, PlayerAction::Interfere { .. }) {
            tracing::debug!(player_id, %room_id, "interference dropped in coop room");
            return;
        }
        let scored = mode == Mode::Coop && matches!(payload, PlayerAction::RemovePair { .. });
        let event = RoomEvent::relayed(player_id, payload);
        self.push_room(out, room_id, Some(player_id), ServerMessage::event(event));
        if scored {
            self.push_room(
                out,
                room_id,
                None,
                ServerMessage::event(RoomEvent::ScoreDelta {
                    value: SCORE_PER_PAIR,
                }),
            );
        }
    }

    fn announce_departure(&self, out: &mut Vec<Outbound>, departure: &Departure, text: &str) {
        if departure.room_closed {
            return;
        }
        self.push_room(out, &departure.room_id, None, ServerMessage::system(text));
        self.push_roster(out, &departure.room_id);
    }

    fn push_roster(&self, out: &mut Vec<Outbound>, room_id: &str) {
        let Some(room) = self.registry.room(room_id) else {
            return;
        };
        let list = room
            .members()
            .iter()
            .map(|member| RosterEntry {
                id: member.clone(),
                name: self.display_name(member),
            })
            .collect();
        let roster = RoomEvent::RoomRoster {
            list,
            host_id: room.host_id().to_string(),
        };
        self.push_room(out, room_id, None, ServerMessage::event(roster));
    }

    fn push_room(
        &self,
        out: &mut Vec<Outbound>,
        room_id: &str,
        except: Option<&str>,
        message: ServerMessage,
    ) {
        let Some(room) = self.registry.room(room_id) else {
            return;
        };
        for member in room.members() {
            if except == Some(member.as_str()) {
                continue;
            }
            out.push(Outbound {
                to: member.clone(),
                message: message.clone(),
                delivery: Delivery::Broadcast,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cell, InterfereKind};

    fn hub() -> SessionHub {
        SessionHub::new(RoomRegistry::new(4), BoardConfig::default())
    }

    fn join(hub: &mut SessionHub, player_id: &str, room_id: &str) -> Vec<Outbound> {
        hub.handle(
            player_id,
            ClientMessage::JoinRoom {
                room_id: room_id.to_string(),
            },
        )
    }

    fn sent_to<'a>(out: &'a [Outbound], player_id: &str) -> Vec<&'a ServerMessage> {
        out.iter()
            .filter(|outbound| outbound.to == player_id)
            .map(|outbound| &outbound.message)
            .collect()
    }

    fn sync_seed(out: &[Outbound], player_id: &str) -> Option<String> {
        sent_to(out, player_id).into_iter().find_map(|message| match message {
            ServerMessage::SyncSeed { seed, .. } => Some(seed.clone()),
            _ => None,
        })
    }

    fn report_no_moves(hub: &mut SessionHub, player_id: &str) -> Vec<Outbound> {
        hub.handle(
            player_id,
            ClientMessage::ReportNoMoves {
                room_id: "R1".to_string(),
            },
        )
    }

    fn remove_pair() -> PlayerAction {
        PlayerAction::RemovePair {
            a: Cell::new(0, 0),
            b: Cell::new(1, 0),
        }
    }

    #[test]
    fn joiners_of_same_room_receive_same_seed() {
        let mut hub = hub();
        let first = join(&mut hub, "conn_1", "R1");
        let second = join(&mut hub, "conn_2", "R1");
        let seed_a = sync_seed(&first, "conn_1").expect("first joiner synced");
        let seed_b = sync_seed(&second, "conn_2").expect("second joiner synced");
        assert_eq!(seed_a, seed_b);
        assert!(matches!(
            sent_to(&first, "conn_1")[0],
            ServerMessage::Joined { room_id, player_id } if room_id == "R1" && player_id == "conn_1"
        ));
    }

    #[test]
    fn join_notifies_others_and_sends_roster_to_everyone() {
        let mut hub = hub();
        hub.handle("conn_1", ClientMessage::SetName { name: "  Ada  ".to_string() });
        join(&mut hub, "conn_1", "R1");
        let out = join(&mut hub, "conn_2", "R1");

        let to_first = sent_to(&out, "conn_1");
        assert!(to_first
            .iter()
            .any(|message| matches!(message, ServerMessage::System { text } if text == "Player joined room R1")));
        let roster = to_first
            .iter()
            .find_map(|message| match message {
                ServerMessage::PlayerEvent {
                    payload: RoomEvent::RoomRoster { list, host_id },
                } => Some((list.clone(), host_id.clone())),
                _ => None,
            })
            .expect("roster sent");
        assert_eq!(roster.1, "conn_1");
        let names: Vec<&str> = roster.0.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["Ada", "Player"]);
        assert!(!sent_to(&out, "conn_2")
            .iter()
            .any(|message| matches!(message, ServerMessage::System { .. })));
    }

    #[test]
    fn full_room_refusal_is_a_system_notice() {
        let mut hub = SessionHub::new(RoomRegistry::new(1), BoardConfig::default());
        join(&mut hub, "conn_1", "R1");
        let out = join(&mut hub, "conn_2", "R1");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].delivery, Delivery::Direct);
        assert!(matches!(&out[0].message, ServerMessage::System { text } if text.contains("full")));
    }

    #[test]
    fn host_succession_transfers_reshuffle_authority() {
        let mut hub = hub();
        join(&mut hub, "conn_1", "R1");
        join(&mut hub, "conn_2", "R1");

        assert!(report_no_moves(&mut hub, "conn_2").is_empty());

        let out = hub.handle(
            "conn_1",
            ClientMessage::LeaveRoom {
                room_id: "R1".to_string(),
            },
        );
        assert!(sent_to(&out, "conn_2").iter().any(|message| matches!(
            message,
            ServerMessage::PlayerEvent {
                payload: RoomEvent::RoomRoster { host_id, .. }
            } if host_id == "conn_2"
        )));

        let out = report_no_moves(&mut hub, "conn_2");
        assert_eq!(out.len(), 1);
        assert!(matches!(
            &out[0].message,
            ServerMessage::PlayerEvent {
                payload: RoomEvent::ShuffleSeed { .. }
            }
        ));
    }

    #[test]
    fn shuffle_seed_reaches_every_member() {
        let mut hub = hub();
        join(&mut hub, "conn_1", "R1");
        join(&mut hub, "conn_2", "R1");
        join(&mut hub, "conn_3", "R1");
        let out = report_no_moves(&mut hub, "conn_1");
        let mut recipients: Vec<&str> = out.iter().map(|outbound| outbound.to.as_str()).collect();
        recipients.sort_unstable();
        assert_eq!(recipients, vec!["conn_1", "conn_2", "conn_3"]);
    }

    #[test]
    fn shuffle_request_is_forwarded_to_host_only() {
        let mut hub = hub();
        join(&mut hub, "conn_1", "R1");
        join(&mut hub, "conn_2", "R1");
        join(&mut hub, "conn_3", "R1");
        let out = hub.handle(
            "conn_3",
            ClientMessage::RequestShuffle {
                room_id: "R1".to_string(),
            },
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, "conn_1");
        assert_eq!(
            out[0].message,
            ServerMessage::event(RoomEvent::ShuffleRequested {
                from: "conn_3".to_string()
            })
        );
    }

    #[test]
    fn vs_relay_skips_sender_and_awards_nothing() {
        let mut hub = hub();
        join(&mut hub, "conn_1", "R1");
        join(&mut hub, "conn_2", "R1");
        let out = hub.handle(
            "conn_1",
            ClientMessage::PlayerEvent {
                room_id: "R1".to_string(),
                payload: remove_pair(),
            },
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, "conn_2");
        assert!(matches!(
            &out[0].message,
            ServerMessage::PlayerEvent {
                payload: RoomEvent::RemovePair { from, .. }
            } if from == "conn_1"
        ));
    }

    #[test]
    fn coop_removal_broadcasts_score_to_all() {
        let mut hub = hub();
        join(&mut hub, "conn_1", "R1");
        join(&mut hub, "conn_2", "R1");
        hub.handle(
            "conn_2",
            ClientMessage::SetMode {
                room_id: "R1".to_string(),
                mode: Mode::Coop,
            },
        );
        let out = hub.handle(
            "conn_1",
            ClientMessage::PlayerEvent {
                room_id: "R1".to_string(),
                payload: remove_pair(),
            },
        );
        let deltas: Vec<&str> = out
            .iter()
            .filter(|outbound| {
                outbound.message
                    == ServerMessage::event(RoomEvent::ScoreDelta {
                        value: SCORE_PER_PAIR,
                    })
            })
            .map(|outbound| outbound.to.as_str())
            .collect();
        assert_eq!(deltas, vec!["conn_1", "conn_2"]);
    }

    #[test]
    fn coop_room_drops_interference() {
        let mut hub = hub();
        join(&mut hub, "conn_1", "R1");
        join(&mut hub, "conn_2", "R1");
        hub.handle(
            "conn_1",
            ClientMessage::SetMode {
                room_id: "R1".to_string(),
                mode: Mode::Coop,
            },
        );
        let out = hub.handle(
            "conn_1",
            ClientMessage::PlayerEvent {
                room_id: "R1".to_string(),
                payload: PlayerAction::Interfere {
                    kind: InterfereKind::Row,
                    ms: None,
                },
            },
        );
        assert!(out.is_empty());
    }

    #[test]
    fn outsiders_cannot_relay_into_room() {
        let mut hub = hub();
        join(&mut hub, "conn_1", "R1");
        let out = hub.handle(
            "conn_9",
            ClientMessage::PlayerEvent {
                room_id: "R1".to_string(),
                payload: PlayerAction::Chat {
                    text: "hi".to_string(),
                },
            },
        );
        assert!(out.is_empty());
    }

    #[test]
    fn restart_resyncs_everyone_with_new_seed() {
        let mut hub = hub();
        let first = join(&mut hub, "conn_1", "R1");
        join(&mut hub, "conn_2", "R1");
        let old_seed = sync_seed(&first, "conn_1").expect("synced");
        let out = hub.handle(
            "conn_2",
            ClientMessage::RequestRestart {
                room_id: "R1".to_string(),
            },
        );
        let seed_1 = sync_seed(&out, "conn_1").expect("resynced");
        let seed_2 = sync_seed(&out, "conn_2").expect("resynced");
        assert_eq!(seed_1, seed_2);
        assert_ne!(seed_1, old_seed);
        assert!(sent_to(&out, "conn_1")
            .iter()
            .any(|message| **message == ServerMessage::event(RoomEvent::Restart)));
    }

    #[test]
    fn mode_change_is_broadcast() {
        let mut hub = hub();
        join(&mut hub, "conn_1", "R1");
        join(&mut hub, "conn_2", "R1");
        let out = hub.handle(
            "conn_2",
            ClientMessage::SetMode {
                room_id: "R1".to_string(),
                mode: Mode::Coop,
            },
        );
        for player in ["conn_1", "conn_2"] {
            let messages = sent_to(&out, player);
            assert!(messages.contains(&&ServerMessage::event(RoomEvent::ModeChanged { mode: Mode::Coop })));
            assert!(messages.contains(&&ServerMessage::system("room mode set to coop")));
        }
    }

    #[test]
    fn disconnect_reassigns_host_and_forgets_name() {
        let mut hub = hub();
        hub.handle("conn_1", ClientMessage::SetName { name: "Ada".to_string() });
        join(&mut hub, "conn_1", "R1");
        join(&mut hub, "conn_2", "R1");
        let out = hub.disconnect("conn_1");
        assert!(sent_to(&out, "conn_2").contains(&&ServerMessage::system("Ada disconnected")));
        assert!(hub.registry().is_host("R1", "conn_2"));
        assert!(hub.disconnect("conn_1").is_empty());
    }

    #[test]
    fn find_match_replies_directly() {
        let mut hub = hub();
        join(&mut hub, "conn_1", "open");
        let out = hub.handle("conn_2", ClientMessage::FindMatch);
        assert_eq!(
            out,
            vec![Outbound {
                to: "conn_2".to_string(),
                message: ServerMessage::MatchFound {
                    room_id: "open".to_string()
                },
                delivery: Delivery::Direct,
            }]
        );
    }
}
