use clap::Parser;
use pairlink_server::constants::{DEFAULT_ROOM_CAPACITY, GAME_DURATION_MS};
use pairlink_server::game::{Finish, LocalGame, Notice, ShuffleAuthority, Turn};
use pairlink_server::hint::find_any_hint;
use pairlink_server::protocol::{ClientMessage, PlayerAction, ServerMessage};
use pairlink_server::rng::Rng;
use pairlink_server::room_registry::RoomRegistry;
use pairlink_server::server_utils::{make_seed, now_ms};
use pairlink_server::session::{Outbound, SessionHub};
use pairlink_server::types::{BoardConfig, Mode};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::io;
use std::path::Path;
use std::path::PathBuf;

const SIM_ROOM_ID: &str = "sim-room";
/// Hub/bot exchanges allowed to settle one move before it counts as a livelock.
const PUMP_LIMIT: usize = 64;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless bot matches against the session hub")]
struct Cli {
    #[arg(long)]
    mode: Option<String>,
    #[arg(long)]
    players: Option<usize>,
    #[arg(long)]
    seed: Option<String>,
    #[arg(long, default_value_t = 250)]
    step_ms: u64,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    mode: Mode,
    players: usize,
    seed: String,
    #[serde(rename = "stepMs")]
    step_ms: u64,
    #[serde(rename = "moveChance")]
    move_chance: f64,
    #[serde(rename = "hostLeavesAtStep", skip_serializing_if = "Option::is_none")]
    host_leaves_at_step: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    mode: Mode,
    players: usize,
    seed: String,
    #[serde(rename = "roomSeed")]
    room_seed: String,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    #[serde(rename = "pairsRemoved")]
    pairs_removed: u32,
    reshuffles: u32,
    #[serde(rename = "shuffleWaits")]
    shuffle_waits: u32,
    interferences: u32,
    finishes: BTreeMap<String, String>,
    scores: BTreeMap<String, i64>,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    step: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
    finished_step: u64,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: i64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: i64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageDurationMs")]
    average_duration_ms: u64,
    #[serde(rename = "finishCounts")]
    finish_counts: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Clone, Debug, Serialize)]
struct StructuredLogLine {
    #[serde(rename = "timestampMs")]
    timestamp_ms: i64,
    level: String,
    event: String,
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<u64>,
    details: Value,
}

#[derive(Default)]
struct Anomalies {
    messages: Vec<String>,
    records: Vec<AnomalyRecord>,
    seen: HashSet<String>,
}

#[derive(Default)]
struct Counters {
    pairs_removed: u32,
    reshuffles: u32,
    shuffle_waits: u32,
    interferences: u32,
}

struct Bot {
    id: String,
    game: LocalGame,
    inbox: VecDeque<ServerMessage>,
    active: bool,
}

/// Hub plus bots on one virtual clock. Frames are delivered in order and
/// fully settled after every move.
struct Table {
    hub: SessionHub,
    bots: Vec<Bot>,
    to_hub: VecDeque<(String, ClientMessage)>,
    now_ms: u64,
    counters: Counters,
}

impl Table {
    fn absorb(&mut self, idx: usize, turn: Turn) {
        for notice in &turn.notices {
            match notice {
                Notice::Matched { .. } => self.counters.pairs_removed += 1,
                Notice::Reshuffled { .. } => self.counters.reshuffles += 1,
                Notice::AwaitingShuffle => self.counters.shuffle_waits += 1,
                _ => {}
            }
        }
        let from = self.bots[idx].id.clone();
        for message in turn.outgoing {
            if matches!(
                message,
                ClientMessage::PlayerEvent {
                    payload: PlayerAction::Interfere { .. },
                    ..
                }
            ) {
                self.counters.interferences += 1;
            }
            self.to_hub.push_back((from.clone(), message));
        }
    }

    fn route(&mut self, outbound: Vec<Outbound>) {
        for Outbound { to, message, .. } in outbound {
            if let Some(bot) = self.bots.iter_mut().find(|bot| bot.active && bot.id == to) {
                bot.inbox.push_back(message);
            }
        }
    }

    fn pump(&mut self) -> Result<(), String> {
        for _ in 0..PUMP_LIMIT {
            let mut progressed = false;
            while let Some((from, message)) = self.to_hub.pop_front() {
                progressed = true;
                let outbound = self.hub.handle(&from, message);
                self.route(outbound);
            }
            for idx in 0..self.bots.len() {
                while let Some(message) = self.bots[idx].inbox.pop_front() {
                    progressed = true;
                    let now_ms = self.now_ms;
                    let turn = self.bots[idx].game.apply_server_message(&message, now_ms);
                    self.absorb(idx, turn);
                }
            }
            if !progressed {
                return Ok(());
            }
        }
        Err(format!("message exchange did not settle within {PUMP_LIMIT} rounds"))
    }

    fn disconnect(&mut self, idx: usize) {
        self.bots[idx].active = false;
        self.bots[idx].inbox.clear();
        let id = self.bots[idx].id.clone();
        let outbound = self.hub.disconnect(&id);
        self.route(outbound);
    }

    fn active_bots(&self) -> impl Iterator<Item = &Bot> {
        self.bots.iter().filter(|bot| bot.active)
    }
}

fn main() {
    let cli = Cli::parse();
    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios
        .first()
        .map(|scenario| scenario.seed.clone())
        .unwrap_or_default();
    let match_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| default_match_id(&seed_hint, run_started_at_ms));
    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut finish_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_duration_ms = 0u64;
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        emit_log(
            "info",
            "scenario_started",
            &match_id,
            Some(&scenario.name),
            Some(&scenario.seed),
            None,
            json!({
                "mode": scenario.mode,
                "players": scenario.players,
                "stepMs": scenario.step_ms,
            }),
        );
        let scenario_run = run_scenario(&scenario);

        for anomaly in &scenario_run.anomaly_records {
            emit_log(
                "warn",
                "anomaly_detected",
                &match_id,
                Some(&scenario.name),
                Some(&scenario.seed),
                Some(anomaly.step),
                json!({
                    "message": anomaly.message,
                }),
            );
        }

        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();
        total_duration_ms += scenario_run.result.duration_ms;
        for finish in scenario_run.result.finishes.values() {
            *finish_counts.entry(finish.clone()).or_insert(0) += 1;
        }

        emit_log(
            "info",
            "scenario_finished",
            &match_id,
            Some(&scenario.name),
            Some(&scenario.seed),
            Some(scenario_run.finished_step),
            json!({
                "durationMs": scenario_run.result.duration_ms,
                "pairsRemoved": scenario_run.result.pairs_removed,
                "reshuffles": scenario_run.result.reshuffles,
                "anomalyCount": scenario_run.anomaly_records.len(),
            }),
        );

        match serde_json::to_string(&scenario_run.result) {
            Ok(line) => println!("{line}"),
            Err(error) => eprintln!("failed to serialize scenario result: {error}"),
        }
        scenario_results.push(scenario_run.result);
    }

    let run_finished_at_ms = now_ms();
    let summary = build_run_summary(
        match_id.clone(),
        run_started_at_ms,
        run_finished_at_ms,
        scenario_results,
        finish_counts,
        total_anomalies,
        total_duration_ms,
    );

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_log(
                "error",
                "summary_write_failed",
                &match_id,
                None,
                None,
                None,
                json!({
                    "path": path.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    emit_log(
        "info",
        "run_finished",
        &match_id,
        None,
        None,
        None,
        json!({
            "scenarioCount": summary.scenario_count,
            "anomalyCount": summary.anomaly_count,
            "averageDurationMs": summary.average_duration_ms,
            "finishCounts": summary.finish_counts,
            "summaryOut": summary_out_written,
        }),
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

fn run_scenario(scenario: &Scenario) -> ScenarioRunResult {
    let config = BoardConfig::default();
    let mut anomalies = Anomalies::default();
    let mut bots = Vec::new();
    for idx in 0..scenario.players {
        let id = format!("bot_{}", idx + 1);
        // Placeholder board until the room's seed arrives.
        let placeholder_seed = format!("{}-{id}", scenario.seed);
        match LocalGame::new(config, Some(placeholder_seed.as_str()), 0) {
            Ok(game) => bots.push(Bot {
                id,
                game,
                inbox: VecDeque::new(),
                active: true,
            }),
            Err(error) => push_anomaly(&mut anomalies, 0, format!("board generation failed: {error}")),
        }
    }

    let mut table = Table {
        hub: SessionHub::new(RoomRegistry::new(DEFAULT_ROOM_CAPACITY), config),
        bots,
        to_hub: VecDeque::new(),
        now_ms: 0,
        counters: Counters::default(),
    };

    for (idx, bot) in table.bots.iter().enumerate() {
        table.to_hub.push_back((
            bot.id.clone(),
            ClientMessage::SetName {
                name: format!("Bot-{:02}", idx + 1),
            },
        ));
        table.to_hub.push_back((
            bot.id.clone(),
            ClientMessage::JoinRoom {
                room_id: SIM_ROOM_ID.to_string(),
            },
        ));
    }
    if scenario.mode == Mode::Coop {
        if let Some(first) = table.bots.first() {
            let id = first.id.clone();
            table.to_hub.push_back((
                id.clone(),
                ClientMessage::SetMode {
                    room_id: SIM_ROOM_ID.to_string(),
                    mode: Mode::Coop,
                },
            ));
            table.to_hub.push_back((
                id,
                ClientMessage::RequestRestart {
                    room_id: SIM_ROOM_ID.to_string(),
                },
            ));
        }
    }
    if let Err(message) = table.pump() {
        push_anomaly(&mut anomalies, 0, message);
    }
    for message in collect_sync_anomalies(&table, scenario.mode) {
        push_anomaly(&mut anomalies, 0, message);
    }

    let mut rng = Rng::from_seed(&scenario.seed);
    let max_steps = GAME_DURATION_MS / scenario.step_ms + 1;
    let mut last_step = 0u64;
    'steps: for step in 1..=max_steps {
        last_step = step;
        table.now_ms = step * scenario.step_ms;

        if scenario.host_leaves_at_step == Some(step) {
            let host = table
                .hub
                .registry()
                .room(SIM_ROOM_ID)
                .map(|room| room.host_id().to_string());
            if let Some(idx) = host.and_then(|id| table.bots.iter().position(|bot| bot.id == id)) {
                table.disconnect(idx);
            }
        }

        for idx in 0..table.bots.len() {
            if !table.bots[idx].active || table.bots[idx].game.finished().is_some() {
                continue;
            }
            let now_ms = table.now_ms;
            let turn = table.bots[idx].game.tick(now_ms);
            table.absorb(idx, turn);
            let moves = table.bots[idx].game.finished().is_none() && rng.next_f64() < scenario.move_chance;
            if moves {
                let game = &mut table.bots[idx].game;
                if let Some(hint) = find_any_hint(game.board()) {
                    if let Some(turn) = game.try_connect(hint.a, hint.b, now_ms) {
                        table.absorb(idx, turn);
                    }
                }
            }
            if let Err(message) = table.pump() {
                push_anomaly(&mut anomalies, step, message);
                break 'steps;
            }
            for message in collect_step_anomalies(&table, scenario.mode) {
                push_anomaly(&mut anomalies, step, message);
            }
        }

        if table.active_bots().all(|bot| bot.game.finished().is_some()) {
            break;
        }
    }

    let room_seed = table
        .hub
        .registry()
        .room(SIM_ROOM_ID)
        .map(|room| room.seed().to_string())
        .unwrap_or_default();
    let finishes = table
        .bots
        .iter()
        .map(|bot| {
            let key = if bot.active {
                finish_key(bot.game.finished())
            } else {
                "left"
            };
            (bot.id.clone(), key.to_string())
        })
        .collect();
    let scores = table
        .active_bots()
        .map(|bot| (bot.id.clone(), bot.game.score()))
        .collect();

    ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            mode: scenario.mode,
            players: scenario.players,
            seed: scenario.seed.clone(),
            room_seed,
            duration_ms: table.now_ms,
            pairs_removed: table.counters.pairs_removed,
            reshuffles: table.counters.reshuffles,
            shuffle_waits: table.counters.shuffle_waits,
            interferences: table.counters.interferences,
            finishes,
            scores,
            anomalies: anomalies.messages,
        },
        anomaly_records: anomalies.records,
        finished_step: last_step,
    }
}

fn collect_sync_anomalies(table: &Table, mode: Mode) -> Vec<String> {
    let mut anomalies = Vec::new();
    let mut boards = table.active_bots().map(|bot| bot.game.board().values());
    if let Some(first) = boards.next() {
        if boards.any(|values| values != first) {
            anomalies.push("boards differ after seed sync".to_string());
        }
    }
    for bot in table.active_bots() {
        if bot.game.mode() != Some(mode) {
            anomalies.push(format!("{} synced without room mode {}", bot.id, mode.as_str()));
        }
        if bot.game.room_id() != Some(SIM_ROOM_ID) {
            anomalies.push(format!("{} never joined", bot.id));
        }
    }
    anomalies
}

fn collect_step_anomalies(table: &Table, mode: Mode) -> Vec<String> {
    let mut anomalies = Vec::new();
    let active: Vec<&Bot> = table.active_bots().collect();
    if active.is_empty() {
        return anomalies;
    }

    match table.hub.registry().room(SIM_ROOM_ID) {
        Some(room) => {
            if !active.iter().any(|bot| bot.id == room.host_id()) {
                anomalies.push(format!("room host {} is not connected", room.host_id()));
            }
        }
        None => anomalies.push("room vanished with players connected".to_string()),
    }
    let hosts = active
        .iter()
        .filter(|bot| bot.game.authority() == ShuffleAuthority::Host)
        .count();
    if hosts != 1 {
        anomalies.push(format!("expected one host, found {hosts}"));
    }

    if mode == Mode::Coop {
        let first = active[0];
        if active
            .iter()
            .any(|bot| bot.game.board().values() != first.game.board().values())
        {
            anomalies.push("coop boards diverged".to_string());
        }
        if active.iter().any(|bot| bot.game.score() != first.game.score()) {
            anomalies.push("coop scores diverged".to_string());
        }
    }
    anomalies
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = cli.seed.clone().unwrap_or_else(make_seed);
    let step_ms = cli.step_ms.clamp(50, 5_000);

    if cli.mode.is_some() || cli.players.is_some() {
        let mode = cli.mode.as_deref().and_then(Mode::parse).unwrap_or(Mode::Vs);
        let players = cli.players.unwrap_or(2).clamp(1, DEFAULT_ROOM_CAPACITY);
        return vec![Scenario {
            name: format!("custom-{}-{players}", mode.as_str()),
            mode,
            players,
            seed,
            step_ms,
            move_chance: 0.6,
            host_leaves_at_step: None,
        }];
    }

    vec![
        Scenario {
            name: "vs-duel".to_string(),
            mode: Mode::Vs,
            players: 2,
            seed: seed.clone(),
            step_ms,
            move_chance: 0.7,
            host_leaves_at_step: None,
        },
        Scenario {
            name: "coop-trio".to_string(),
            mode: Mode::Coop,
            players: 3,
            seed: format!("{seed}-coop"),
            step_ms,
            move_chance: 0.5,
            host_leaves_at_step: None,
        },
        Scenario {
            name: "coop-host-leaves".to_string(),
            mode: Mode::Coop,
            players: 3,
            seed: format!("{seed}-succession"),
            step_ms,
            move_chance: 0.5,
            host_leaves_at_step: Some(20),
        },
    ]
}

fn push_anomaly(anomalies: &mut Anomalies, step: u64, message: String) {
    anomalies.records.push(AnomalyRecord {
        step,
        message: message.clone(),
    });
    if anomalies.seen.insert(message.clone()) {
        anomalies.messages.push(message);
    }
}

fn finish_key(finish: Option<Finish>) -> &'static str {
    match finish {
        Some(Finish::Won) => "won",
        Some(Finish::TimedOut) => "timed_out",
        None => "unfinished",
    }
}

fn default_match_id(seed: &str, timestamp_ms: i64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    match_id: String,
    started_at_ms: i64,
    finished_at_ms: i64,
    scenarios: Vec<ScenarioResultLine>,
    finish_counts: BTreeMap<String, usize>,
    anomaly_count: usize,
    total_duration_ms: u64,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let average_duration_ms = if scenario_count == 0 {
        0
    } else {
        total_duration_ms / scenario_count as u64
    };
    RunSummary {
        match_id,
        started_at_ms,
        finished_at_ms,
        scenario_count,
        anomaly_count,
        average_duration_ms,
        finish_counts,
        scenarios,
    }
}

fn emit_log(
    level: &str,
    event: &str,
    match_id: &str,
    scenario: Option<&str>,
    seed: Option<&str>,
    step: Option<u64>,
    details: Value,
) {
    let log_line = StructuredLogLine {
        timestamp_ms: now_ms(),
        level: level.to_string(),
        event: event.to_string(),
        match_id: match_id.to_string(),
        scenario: scenario.map(|value| value.to_string()),
        seed: seed.map(|value| value.to_string()),
        step,
        details,
    };
    if let Ok(line) = serde_json::to_string(&log_line) {
        eprintln!("{line}");
    }
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}
