use crate::board::{Board, BoardError, RemovalOutcome};
use crate::constants::{
    interference_duration_ms, BLIND_DEFAULT_MS, BLIND_RECEIVE_COOLDOWN_MS, COMBO_FOR_INTERFERENCE,
    COMBO_WINDOW_MS, GAME_DURATION_MS, INTERFERE_COOLDOWN_MS, INVERT_DURATION_MS, SCORE_PER_PAIR,
};
use crate::hint::{HintOutcome, HintTracker};
use crate::path_finder::find_path;
use crate::protocol::{ClientMessage, PlayerAction, RoomEvent, ServerMessage};
use crate::rng::Rng;
use crate::types::{BoardConfig, Cell, InterfereKind, Mode};

/// Who resolves a board with no moves left.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShuffleAuthority {
    /// Reshuffle with the game's own stream.
    Local,
    /// Ask the server for a shared shuffle seed.
    Host,
    /// Wait for the host's shuffle seed.
    Follower,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Finish {
    Won,
    TimedOut,
}

/// Things the presentation layer should show. Purely informational.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Matched { a: Cell, b: Cell, path: Vec<Cell>, combo: u32 },
    Reshuffled { swaps: usize },
    AwaitingShuffle,
    RowInjected,
    Blind { ms: u64 },
    Invert { ms: u64 },
    Chat { from: String, text: String },
    PeerFinished { from: String, win: bool },
    System(String),
    BoardSynced,
    Restarted,
    Finished(Finish),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Turn {
    /// Frames to send to the server, in order.
    pub outgoing: Vec<ClientMessage>,
    pub notices: Vec<Notice>,
}

/// One participant's view of a match: its own board plus everything needed
/// to replay the facts other participants report.
#[derive(Clone, Debug)]
pub struct LocalGame {
    player_id: Option<String>,
    room_id: Option<String>,
    board: Board,
    rng: Rng,
    score: i64,
    mode: Option<Mode>,
    authority: ShuffleAuthority,
    hints: HintTracker,
    combo: u32,
    last_match_ms: Option<u64>,
    interfere_ready_at_ms: u64,
    blind_ready_at_ms: u64,
    deadline_ms: u64,
    finished: Option<Finish>,
    awaiting_shuffle: bool,
}

impl LocalGame {
    /// Offline game. Without a seed the board is unpredictable.
    pub fn new(config: BoardConfig, seed: Option<&str>, now_ms: u64) -> Result<Self, BoardError> {
        let mut rng = Rng::from_optional_seed(seed);
        let board = Board::generate(config, &mut rng)?;
        Ok(Self::assemble(board, rng, now_ms))
    }

    pub fn from_board(board: Board, rng: Rng, now_ms: u64) -> Self {
        Self::assemble(board, rng, now_ms)
    }

    fn assemble(board: Board, rng: Rng, now_ms: u64) -> Self {
        Self {
            player_id: None,
            room_id: None,
            board,
            rng,
            score: 0,
            mode: None,
            authority: ShuffleAuthority::Local,
            hints: HintTracker::default(),
            combo: 0,
            last_match_ms: None,
            interfere_ready_at_ms: 0,
            blind_ready_at_ms: 0,
            deadline_ms: now_ms + GAME_DURATION_MS,
            finished: None,
            awaiting_shuffle: false,
        }
    }

    /// Fresh board and clean per-game state; room membership is kept.
    pub fn restart(&mut self, config: BoardConfig, seed: Option<&str>, now_ms: u64) -> Result<(), BoardError> {
        let mut rng = Rng::from_optional_seed(seed);
        self.board = Board::generate(config, &mut rng)?;
        self.rng = rng;
        self.score = 0;
        self.hints = HintTracker::default();
        self.combo = 0;
        self.last_match_ms = None;
        self.interfere_ready_at_ms = 0;
        self.blind_ready_at_ms = 0;
        self.deadline_ms = now_ms + GAME_DURATION_MS;
        self.finished = None;
        self.awaiting_shuffle = false;
        Ok(())
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn player_id(&self) -> Option<&str> {
        self.player_id.as_deref()
    }

    pub fn authority(&self) -> ShuffleAuthority {
        self.authority
    }

    pub fn combo(&self) -> u32 {
        self.combo
    }

    pub fn finished(&self) -> Option<Finish> {
        self.finished
    }

    pub fn is_awaiting_shuffle(&self) -> bool {
        self.awaiting_shuffle
    }

    pub fn hints_remaining(&self) -> u32 {
        self.hints.uses_remaining()
    }

    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.deadline_ms.saturating_sub(now_ms)
    }

    /// Shared boards only exist in coop rooms; everywhere else the board is
    /// private and reshuffles locally.
    fn effective_authority(&self) -> ShuffleAuthority {
        if self.room_id.is_some() && self.mode == Some(Mode::Coop) {
            self.authority
        } else {
            ShuffleAuthority::Local
        }
    }

    fn send(&self, turn: &mut Turn, action: PlayerAction) {
        if let Some(room_id) = &self.room_id {
            turn.outgoing.push(ClientMessage::PlayerEvent {
                room_id: room_id.clone(),
                payload: action,
            });
        }
    }

    pub fn try_connect(&mut self, a: Cell, b: Cell, now_ms: u64) -> Option<Turn> {
        if self.finished.is_some() {
            return None;
        }
        let path = find_path(&self.board, a, b)?;
        let mut turn = Turn::default();
        let outcome = self.remove_pair(a, b);
        if self.mode != Some(Mode::Coop) || self.room_id.is_none() {
            self.score += SCORE_PER_PAIR;
        }

        let within_window = self
            .last_match_ms
            .map(|last| now_ms.saturating_sub(last) < COMBO_WINDOW_MS)
            .unwrap_or(false);
        self.combo = if within_window { self.combo + 1 } else { 1 };
        self.last_match_ms = Some(now_ms);
        turn.notices.push(Notice::Matched {
            a,
            b,
            path,
            combo: self.combo,
        });
        self.send(&mut turn, PlayerAction::RemovePair { a, b });

        if self.room_id.is_some()
            && self.mode == Some(Mode::Vs)
            && self.combo >= COMBO_FOR_INTERFERENCE
            && now_ms >= self.interfere_ready_at_ms
        {
            let kind = InterfereKind::ALL[self.rng.pick_index(InterfereKind::ALL.len())];
            let ms = interference_duration_ms(self.combo);
            self.interfere_ready_at_ms = now_ms + INTERFERE_COOLDOWN_MS;
            self.send(&mut turn, PlayerAction::Interfere { kind, ms: Some(ms) });
        }

        self.settle(outcome, &mut turn);
        Some(turn)
    }

    pub fn hint(&mut self, now_ms: u64) -> (HintOutcome, Turn) {
        let mut turn = Turn::default();
        if self.finished.is_some() {
            return (HintOutcome::Exhausted, turn);
        }
        let outcome = self.hints.request(&self.board, now_ms);
        // Spent or cooling hints still unstick a dead board.
        if self.is_dead() {
            self.resolve_dead_board(&mut turn);
        }
        (outcome, turn)
    }

    pub fn tick(&mut self, now_ms: u64) -> Turn {
        let mut turn = Turn::default();
        if self.finished.is_none() && self.remaining_ms(now_ms) == 0 {
            self.finish(Finish::TimedOut, &mut turn);
        }
        turn
    }

    /// Player-triggered disruption: sent to the room in vs play, applied to
    /// the own board offline, ignored in coop.
    pub fn trigger_interference(&mut self, kind: InterfereKind, now_ms: u64) -> Turn {
        let mut turn = Turn::default();
        if self.room_id.is_some() {
            if self.mode == Some(Mode::Vs) {
                self.send(&mut turn, PlayerAction::Interfere { kind, ms: None });
            }
        } else if self.finished.is_none() {
            self.apply_interference(kind, None, now_ms, &mut turn);
        }
        turn
    }

    pub fn send_chat(&self, text: &str) -> Turn {
        let mut turn = Turn::default();
        self.send(
            &mut turn,
            PlayerAction::Chat {
                text: text.to_string(),
            },
        );
        turn
    }

    /// Leaves the room and keeps playing the same board solo.
    pub fn leave_room(&mut self) -> Turn {
        let mut turn = Turn::default();
        if let Some(room_id) = self.room_id.take() {
            turn.outgoing.push(ClientMessage::LeaveRoom { room_id });
        }
        self.player_id = None;
        self.mode = None;
        self.authority = ShuffleAuthority::Local;
        self.awaiting_shuffle = false;
        if self.finished.is_none() && self.is_dead() {
            self.resolve_dead_board(&mut turn);
        }
        turn
    }

    pub fn apply_server_message(&mut self, message: &ServerMessage, now_ms: u64) -> Turn {
        let mut turn = Turn::default();
        match message {
            ServerMessage::Joined { room_id, player_id } => {
                self.room_id = Some(room_id.clone());
                self.player_id = Some(player_id.clone());
                self.authority = ShuffleAuthority::Follower;
            }
            ServerMessage::SyncSeed { seed, config, mode } => {
                if let Err(error) = self.restart(*config, Some(seed.as_str()), now_ms) {
                    tracing::warn!(%error, "ignoring sync with invalid board config");
                    return turn;
                }
                self.mode = Some(*mode);
                turn.notices.push(Notice::BoardSynced);
                let outcome = self.board.classify();
                self.settle(outcome, &mut turn);
            }
            ServerMessage::PlayerEvent { payload } => return self.apply_remote(payload, now_ms),
            ServerMessage::System { text } => turn.notices.push(Notice::System(text.clone())),
            ServerMessage::MatchFound { .. } => {}
        }
        turn
    }

    /// Replays a fact reported by the room. Remote removals are trusted and
    /// never score.
    pub fn apply_remote(&mut self, event: &RoomEvent, now_ms: u64) -> Turn {
        let mut turn = Turn::default();
        match event {
            RoomEvent::RemovePair { a, b, .. } => {
                let outcome = self.remove_pair(*a, *b);
                if self.finished.is_none() {
                    self.settle(outcome, &mut turn);
                }
            }
            RoomEvent::Interfere { kind, ms, .. } => {
                if self.finished.is_none() {
                    self.apply_interference(*kind, *ms, now_ms, &mut turn);
                }
            }
            RoomEvent::GameOver { from, win } => turn.notices.push(Notice::PeerFinished {
                from: from.clone(),
                win: *win,
            }),
            RoomEvent::Chat { from, text } => turn.notices.push(Notice::Chat {
                from: from.clone(),
                text: text.clone(),
            }),
            RoomEvent::RoomRoster { host_id, .. } => {
                if self.room_id.is_none() {
                    return turn;
                }
                let is_host = self.player_id.as_deref() == Some(host_id.as_str());
                let promoted = is_host && self.authority != ShuffleAuthority::Host;
                self.authority = if is_host {
                    ShuffleAuthority::Host
                } else {
                    ShuffleAuthority::Follower
                };
                // A follower that was waiting on the previous host takes over.
                if promoted && self.awaiting_shuffle && self.is_dead() {
                    self.report_no_moves(&mut turn);
                }
            }
            RoomEvent::ModeChanged { mode } => self.mode = Some(*mode),
            RoomEvent::ScoreDelta { value } => self.score += value,
            RoomEvent::ShuffleSeed { seed } => {
                let shared = self.mode == Some(Mode::Coop);
                if shared || self.awaiting_shuffle || self.is_dead() {
                    let swaps = self.board.partial_shuffle(&mut Rng::from_seed(seed));
                    self.awaiting_shuffle = false;
                    turn.notices.push(Notice::Reshuffled { swaps });
                    if self.finished.is_none() {
                        let outcome = self.board.classify();
                        self.settle(outcome, &mut turn);
                    }
                }
            }
            RoomEvent::ShuffleRequested { .. } => {
                if self.effective_authority() == ShuffleAuthority::Host
                    && !self.awaiting_shuffle
                    && self.is_dead()
                {
                    self.report_no_moves(&mut turn);
                }
            }
            RoomEvent::Restart => turn.notices.push(Notice::Restarted),
        }
        turn
    }

    /// Private boards settle a dead end right away; shared ones wait for
    /// the room's shuffle seed.
    fn remove_pair(&mut self, a: Cell, b: Cell) -> RemovalOutcome {
        match self.effective_authority() {
            ShuffleAuthority::Local => self.board.remove_pair_and_settle(a, b, &mut self.rng),
            ShuffleAuthority::Host | ShuffleAuthority::Follower => self.board.remove_pair(a, b),
        }
    }

    fn is_dead(&self) -> bool {
        self.board.classify() == RemovalOutcome::Dead
    }

    fn apply_interference(&mut self, kind: InterfereKind, ms: Option<u64>, now_ms: u64, turn: &mut Turn) {
        match kind {
            InterfereKind::Row => {
                self.board.inject_row(&mut self.rng);
                turn.notices.push(Notice::RowInjected);
                let outcome = self.board.classify();
                self.settle(outcome, turn);
            }
            InterfereKind::Shuffle => {
                let swaps = self.board.partial_shuffle(&mut self.rng);
                turn.notices.push(Notice::Reshuffled { swaps });
                let outcome = self.board.classify();
                self.settle(outcome, turn);
            }
            InterfereKind::Blind => {
                if now_ms >= self.blind_ready_at_ms {
                    self.blind_ready_at_ms = now_ms + BLIND_RECEIVE_COOLDOWN_MS;
                    turn.notices.push(Notice::Blind {
                        ms: ms.unwrap_or(BLIND_DEFAULT_MS),
                    });
                }
            }
            InterfereKind::Invert => turn.notices.push(Notice::Invert {
                ms: INVERT_DURATION_MS,
            }),
        }
    }

    fn settle(&mut self, outcome: RemovalOutcome, turn: &mut Turn) {
        match outcome {
            RemovalOutcome::Cleared => self.finish(Finish::Won, turn),
            RemovalOutcome::Dead => self.resolve_dead_board(turn),
            RemovalOutcome::Reshuffled { swaps } => turn.notices.push(Notice::Reshuffled { swaps }),
            RemovalOutcome::Playable => {}
        }
    }

    fn resolve_dead_board(&mut self, turn: &mut Turn) {
        match self.effective_authority() {
            ShuffleAuthority::Local => {
                let swaps = self.board.reshuffle_until_playable(&mut self.rng);
                turn.notices.push(Notice::Reshuffled { swaps });
            }
            ShuffleAuthority::Host => {
                if !self.awaiting_shuffle {
                    self.report_no_moves(turn);
                }
                turn.notices.push(Notice::AwaitingShuffle);
            }
            ShuffleAuthority::Follower => {
                if !self.awaiting_shuffle {
                    self.awaiting_shuffle = true;
                    if let Some(room_id) = &self.room_id {
                        turn.outgoing.push(ClientMessage::RequestShuffle {
                            room_id: room_id.clone(),
                        });
                    }
                }
                turn.notices.push(Notice::AwaitingShuffle);
            }
        }
    }

    fn report_no_moves(&mut self, turn: &mut Turn) {
        self.awaiting_shuffle = true;
        if let Some(room_id) = &self.room_id {
            turn.outgoing.push(ClientMessage::ReportNoMoves {
                room_id: room_id.clone(),
            });
        }
    }

    fn finish(&mut self, finish: Finish, turn: &mut Turn) {
        self.finished = Some(finish);
        turn.notices.push(Notice::Finished(finish));
        self.send(
            turn,
            PlayerAction::GameOver {
                win: finish == Finish::Won,
            },
        );
    }
}
