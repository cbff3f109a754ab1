use std::collections::VecDeque;

use pairlink_server::game::{Finish, LocalGame, ShuffleAuthority};
use pairlink_server::hint::find_any_hint;
use pairlink_server::protocol::ClientMessage;
use pairlink_server::room_registry::RoomRegistry;
use pairlink_server::session::{Outbound, SessionHub};
use pairlink_server::types::{BoardConfig, Mode};

const ROOM: &str = "R1";

struct Peer {
    id: String,
    game: LocalGame,
}

/// Hub and peers wired together in-process; every exchange runs until quiet.
struct Table {
    hub: SessionHub,
    peers: Vec<Peer>,
    now_ms: u64,
}

impl Table {
    fn new(config: BoardConfig, ids: &[&str]) -> Self {
        let peers = ids
            .iter()
            .map(|id| Peer {
                id: id.to_string(),
                game: LocalGame::new(config, Some(*id), 0).expect("valid config"),
            })
            .collect();
        Self {
            hub: SessionHub::new(RoomRegistry::new(4), config),
            peers,
            now_ms: 0,
        }
    }

    fn send(&mut self, from: &str, messages: Vec<ClientMessage>) {
        let mut queue: VecDeque<(String, ClientMessage)> = messages
            .into_iter()
            .map(|message| (from.to_string(), message))
            .collect();
        let mut handled = 0;
        while let Some((sender, message)) = queue.pop_front() {
            handled += 1;
            assert!(handled < 10_000, "exchange did not settle");
            let outbound = self.hub.handle(&sender, message);
            self.route(outbound, &mut queue);
        }
    }

    fn route(&mut self, outbound: Vec<Outbound>, queue: &mut VecDeque<(String, ClientMessage)>) {
        for Outbound { to, message, .. } in outbound {
            let Some(peer) = self.peers.iter_mut().find(|peer| peer.id == to) else {
                continue;
            };
            let turn = peer.game.apply_server_message(&message, self.now_ms);
            queue.extend(turn.outgoing.into_iter().map(|reply| (peer.id.clone(), reply)));
        }
    }

    fn disconnect(&mut self, id: &str) {
        self.peers.retain(|peer| peer.id != id);
        let outbound = self.hub.disconnect(id);
        let mut queue = VecDeque::new();
        self.route(outbound, &mut queue);
        while let Some((sender, message)) = queue.pop_front() {
            self.send(&sender, vec![message]);
        }
    }

    fn join_all(&mut self) {
        let ids: Vec<String> = self.peers.iter().map(|peer| peer.id.clone()).collect();
        for id in ids {
            self.send(
                &id,
                vec![ClientMessage::JoinRoom {
                    room_id: ROOM.to_string(),
                }],
            );
        }
    }

    fn switch_to_coop(&mut self, id: &str) {
        self.send(
            id,
            vec![
                ClientMessage::SetMode {
                    room_id: ROOM.to_string(),
                    mode: Mode::Coop,
                },
                ClientMessage::RequestRestart {
                    room_id: ROOM.to_string(),
                },
            ],
        );
    }

    /// Plays the first available pair for peer `idx`; false when it has none.
    fn play(&mut self, idx: usize) -> bool {
        self.now_ms += 100;
        let now_ms = self.now_ms;
        let peer = &mut self.peers[idx];
        let Some(hint) = find_any_hint(peer.game.board()) else {
            return false;
        };
        let Some(turn) = peer.game.try_connect(hint.a, hint.b, now_ms) else {
            return false;
        };
        let id = peer.id.clone();
        self.send(&id, turn.outgoing);
        true
    }

    fn peer(&self, id: &str) -> &Peer {
        self.peers.iter().find(|peer| peer.id == id).expect("peer exists")
    }

    fn peer_mut(&mut self, id: &str) -> &mut Peer {
        self.peers.iter_mut().find(|peer| peer.id == id).expect("peer exists")
    }

    fn boards_agree(&self) -> bool {
        self.peers
            .windows(2)
            .all(|pair| pair[0].game.board() == pair[1].game.board())
    }

    fn host_count(&self) -> usize {
        self.peers
            .iter()
            .filter(|peer| peer.game.authority() == ShuffleAuthority::Host)
            .count()
    }
}

fn small_config() -> BoardConfig {
    BoardConfig {
        cols: 4,
        rows: 4,
        kinds: 2,
    }
}

#[test]
fn joining_peers_share_the_room_board_and_one_host() {
    let mut table = Table::new(BoardConfig::default(), &["conn_1", "conn_2", "conn_3"]);
    table.join_all();

    assert!(table.boards_agree());
    assert_eq!(table.host_count(), 1);
    assert_eq!(table.peer("conn_1").game.authority(), ShuffleAuthority::Host);
    for peer in &table.peers {
        assert_eq!(peer.game.room_id(), Some(ROOM));
        assert_eq!(peer.game.player_id(), Some(peer.id.as_str()));
        assert_eq!(peer.game.mode(), Some(Mode::Vs));
    }
}

#[test]
fn coop_peers_clear_the_shared_board_together() {
    let mut table = Table::new(small_config(), &["conn_1", "conn_2"]);
    table.join_all();
    table.switch_to_coop("conn_2");
    assert!(table.boards_agree());
    assert!(table.peers.iter().all(|peer| peer.game.mode() == Some(Mode::Coop)));

    let mut turns = 0;
    while table.peers.iter().any(|peer| peer.game.finished().is_none()) {
        turns += 1;
        assert!(turns < 200, "coop game never finished");
        let idx = turns % table.peers.len();
        table.play(idx);
        assert!(table.boards_agree(), "boards diverged after turn {turns}");
        assert_eq!(table.peers[0].game.score(), table.peers[1].game.score());
    }

    for peer in &table.peers {
        assert_eq!(peer.game.finished(), Some(Finish::Won));
        assert_eq!(peer.game.score(), 80);
        assert!(peer.game.board().is_cleared());
    }
}

#[test]
fn host_reshuffle_reaches_every_coop_peer() {
    let mut table = Table::new(BoardConfig::default(), &["conn_1", "conn_2", "conn_3"]);
    table.join_all();
    table.switch_to_coop("conn_1");
    let before = table.peer("conn_1").game.board().clone();

    // Only the host may ask for a shared shuffle.
    table.send(
        "conn_3",
        vec![ClientMessage::ReportNoMoves {
            room_id: ROOM.to_string(),
        }],
    );
    assert_eq!(table.peer("conn_3").game.board(), &before);

    table.send(
        "conn_1",
        vec![ClientMessage::ReportNoMoves {
            room_id: ROOM.to_string(),
        }],
    );
    assert!(table.boards_agree());
    assert_ne!(table.peer("conn_1").game.board(), &before);
    assert_eq!(table.peer("conn_1").game.board().kind_counts(), before.kind_counts());
}

#[test]
fn host_role_passes_to_lowest_remaining_member() {
    let mut table = Table::new(BoardConfig::default(), &["conn_1", "conn_2", "conn_3"]);
    table.join_all();

    table.disconnect("conn_1");
    assert_eq!(table.host_count(), 1);
    assert_eq!(table.peer("conn_2").game.authority(), ShuffleAuthority::Host);
    let room = table.hub.registry().room(ROOM).expect("room survives");
    assert_eq!(room.host_id(), "conn_2");

    let leaving = table.peer_mut("conn_2").game.leave_room();
    table.send("conn_2", leaving.outgoing);
    assert_eq!(table.peer("conn_2").game.authority(), ShuffleAuthority::Local);
    assert_eq!(table.peer("conn_2").game.room_id(), None);
    assert_eq!(table.peer("conn_3").game.authority(), ShuffleAuthority::Host);
    assert_eq!(table.hub.registry().room(ROOM).map(|room| room.host_id()), Some("conn_3"));

    table.send(
        "conn_3",
        vec![ClientMessage::LeaveRoom {
            room_id: ROOM.to_string(),
        }],
    );
    assert!(table.hub.registry().room(ROOM).is_none());
}

#[test]
fn vs_peers_score_independently() {
    let mut table = Table::new(BoardConfig::default(), &["conn_1", "conn_2"]);
    table.join_all();

    assert!(table.play(0));
    assert!(table.play(0));
    assert_eq!(table.peers[0].game.score(), 20);
    assert_eq!(table.peers[1].game.score(), 0);
    // Relayed removals keep the other board in step until someone interferes.
    assert!(table.boards_agree());
}
