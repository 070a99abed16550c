use std::collections::BTreeMap;
use std::fs;

use conquest_autopilot::arena::{ArenaConfig, LocalArena, MapSpec, NodeSpec};
use conquest_autopilot::bots::warden::WardenBot;
use conquest_autopilot::bots::{
    bot_fingerprint, bot_ids, bot_manifest, create_bot, ConquestBot, PolicyConfig,
};
use conquest_autopilot::client::{
    AdjacencyReply, AttackReply, GameClient, OwnersReply, PlayerIdReply, ReachableReply,
    StateReply, StrategicNodesReply, TroopCountsReply, TroopsToPlaceReply, TurnNumberReply,
};
use conquest_autopilot::error::{CommandError, FetchError};
use conquest_autopilot::runner::{run_batch, run_match, MatchConfig};
use conquest_autopilot::snapshot::{NodeId, PlayerId, Snapshot};

/// Records every command while delegating to the arena.
struct CommandLog<'a> {
    inner: &'a mut LocalArena,
    places: Vec<(NodeId, u32)>,
    attacks: Vec<(NodeId, NodeId)>,
    moves: Vec<(NodeId, NodeId, u32)>,
    forts: Vec<(NodeId, u32)>,
    advances: u32,
}

impl<'a> CommandLog<'a> {
    fn new(inner: &'a mut LocalArena) -> Self {
        Self {
            inner,
            places: Vec::new(),
            attacks: Vec::new(),
            moves: Vec::new(),
            forts: Vec::new(),
            advances: 0,
        }
    }
}

impl GameClient for CommandLog<'_> {
    fn player_id(&mut self) -> Result<PlayerIdReply, CommandError> {
        self.inner.player_id()
    }
    fn turn_number(&mut self) -> Result<TurnNumberReply, CommandError> {
        self.inner.turn_number()
    }
    fn state(&mut self) -> Result<StateReply, CommandError> {
        self.inner.state()
    }
    fn next_state(&mut self) -> Result<(), CommandError> {
        self.advances += 1;
        self.inner.next_state()
    }
    fn owners(&mut self) -> Result<OwnersReply, CommandError> {
        self.inner.owners()
    }
    fn adjacency(&mut self) -> Result<AdjacencyReply, CommandError> {
        self.inner.adjacency()
    }
    fn troop_counts(&mut self) -> Result<TroopCountsReply, CommandError> {
        self.inner.troop_counts()
    }
    fn fort_troop_counts(&mut self) -> Result<TroopCountsReply, CommandError> {
        self.inner.fort_troop_counts()
    }
    fn strategic_nodes(&mut self) -> Result<StrategicNodesReply, CommandError> {
        self.inner.strategic_nodes()
    }
    fn troops_to_place(&mut self) -> Result<TroopsToPlaceReply, CommandError> {
        self.inner.troops_to_place()
    }
    fn place_one_troop(&mut self, node: NodeId) -> Result<(), CommandError> {
        self.places.push((node, 1));
        self.inner.place_one_troop(node)
    }
    fn place_troops(&mut self, node: NodeId, count: u32) -> Result<(), CommandError> {
        self.places.push((node, count));
        self.inner.place_troops(node, count)
    }
    fn attack(
        &mut self,
        from: NodeId,
        to: NodeId,
        win_param: f64,
        continue_param: f64,
    ) -> Result<AttackReply, CommandError> {
        self.attacks.push((from, to));
        self.inner.attack(from, to, win_param, continue_param)
    }
    fn move_troops(&mut self, from: NodeId, to: NodeId, count: u32) -> Result<(), CommandError> {
        self.moves.push((from, to, count));
        self.inner.move_troops(from, to, count)
    }
    fn fortify(&mut self, node: NodeId, count: u32) -> Result<(), CommandError> {
        self.forts.push((node, count));
        self.inner.fortify(node, count)
    }
    fn reachable(&mut self, node: NodeId) -> Result<ReachableReply, CommandError> {
        self.inner.reachable(node)
    }
}

/// Our side: fortress candidate 0 (score 9, 10 troops), forward base 1
/// (score 5), interior 2, frontier node 3 facing enemy garrisons of 2
/// and 7 troops. Nothing is unclaimed.
fn bastion_fixture() -> MapSpec {
    MapSpec {
        nodes: vec![
            NodeSpec {
                score: Some(9),
                ..NodeSpec::owned(0, 0, 10)
            },
            NodeSpec {
                score: Some(5),
                ..NodeSpec::owned(1, 0, 4)
            },
            NodeSpec::owned(2, 0, 2),
            NodeSpec::owned(3, 0, 5),
            NodeSpec::owned(4, 1, 2),
            NodeSpec::owned(5, 1, 7),
            NodeSpec::owned(6, 2, 3),
        ],
        edges: vec![(0, 2), (1, 2), (1, 3), (2, 3), (3, 4), (3, 5), (4, 5), (5, 6)],
    }
}

fn bastion_arena() -> LocalArena {
    LocalArena::new(
        &bastion_fixture(),
        ArenaConfig {
            players: 3,
            opening_turns: 3,
            base_reserve: 3,
        },
        9,
    )
}

fn classic_bot() -> WardenBot {
    let mut bot = WardenBot::new(
        "test-classic",
        "",
        PolicyConfig {
            opening_turns: 3,
            ..PolicyConfig::classic()
        },
    );
    bot.reset(42);
    bot
}

/// Play all opening decisions; only seat 0 is driven by the bot, the
/// other seats pass, which keeps their territory static.
fn drive_opening(bot: &mut WardenBot, arena: &mut LocalArena) {
    while arena.in_opening() {
        if arena.current_player() == PlayerId(0) {
            bot.opening_move(arena).expect("opening decision");
        }
        arena.end_opening_turn();
    }
}

/// Advance past the two passive seats back to seat 0.
fn skip_other_seats(arena: &mut LocalArena) {
    while arena.current_player() != PlayerId(0) {
        arena.force_end_turn();
    }
}

#[test]
fn opening_claims_the_best_unclaimed_strategic_node() {
    // Strategic 7 (score 8) and 8 (score 3) are unclaimed; the owned
    // strategic 0 outranks both but is not a claim target.
    let spec = MapSpec {
        nodes: vec![
            NodeSpec {
                score: Some(9),
                ..NodeSpec::owned(0, 1, 4)
            },
            NodeSpec::owned(1, 0, 2),
            NodeSpec::strategic(7, 8),
            NodeSpec::strategic(8, 3),
        ],
        edges: vec![(0, 1), (1, 7), (7, 8), (8, 0)],
    };
    let mut arena = LocalArena::new(
        &spec,
        ArenaConfig {
            players: 3,
            opening_turns: 5,
            base_reserve: 3,
        },
        3,
    );
    let mut bot = classic_bot();

    let mut log = CommandLog::new(&mut arena);
    let report = bot.opening_move(&mut log).expect("opening decision");
    assert_eq!(log.places, vec![(NodeId(7), 1)], "one claim, highest score first");
    drop(log);

    assert_eq!(report.placements, 1);
    let owners = arena.owners().expect("owners reply");
    assert_eq!(owners.owners.get("7"), Some(&0));
    let troops = arena.troop_counts().expect("troops reply");
    assert_eq!(troops.counts.get("7"), Some(&1));
}

#[test]
fn fortress_is_built_exactly_once() {
    let mut arena = bastion_arena();
    let mut bot = classic_bot();
    drive_opening(&mut bot, &mut arena);

    // Opening fallbacks banked troops on node 0; read what is there.
    let before = *arena
        .troop_counts()
        .expect("troops reply")
        .counts
        .get("0")
        .expect("node 0 exists");
    let before = u32::try_from(before).expect("non-negative");
    assert!(before >= 10);

    let mut log = CommandLog::new(&mut arena);
    let report = bot.take_turn(&mut log).expect("first main turn");
    let forts = log.forts.clone();
    let advances = log.advances;
    drop(log);

    assert!(report.fortified);
    assert_eq!(advances, 5, "every phase advances exactly once");
    assert_eq!(forts, vec![(NodeId(0), before - 2)]);
    let fort_counts = arena.fort_troop_counts().expect("fort reply");
    assert_eq!(fort_counts.counts.get("0"), Some(&i64::from(before - 2)));
    let troops = arena.troop_counts().expect("troops reply");
    assert_eq!(troops.counts.get("0"), Some(&2), "only the reserve stays mobile");

    // Next turn: garrison intact, no second fortification.
    skip_other_seats(&mut arena);
    let mut log = CommandLog::new(&mut arena);
    let report = bot.take_turn(&mut log).expect("second main turn");
    let forts = log.forts.clone();
    drop(log);
    assert!(!report.fortified);
    assert!(forts.is_empty());
    let fort_counts = arena.fort_troop_counts().expect("fort reply");
    assert_eq!(fort_counts.counts.get("0"), Some(&i64::from(before - 2)));
}

#[test]
fn classic_attacks_the_strongest_neighbor() {
    let mut arena = bastion_arena();
    let mut bot = classic_bot();
    drive_opening(&mut bot, &mut arena);

    let mut log = CommandLog::new(&mut arena);
    bot.take_turn(&mut log).expect("main turn");
    assert_eq!(
        log.attacks.first(),
        Some(&(NodeId(3), NodeId(5))),
        "frontier node 3 must hit the 7-troop garrison"
    );
    drop(log);

    // Posture alternation: the following turn consolidates instead.
    skip_other_seats(&mut arena);
    let mut log = CommandLog::new(&mut arena);
    bot.take_turn(&mut log).expect("defend turn");
    assert!(log.attacks.is_empty(), "defend posture skips the attack phase");
}

#[test]
fn vanguard_attacks_the_weakest_neighbor() {
    let mut arena = bastion_arena();
    let mut bot = WardenBot::new(
        "test-vanguard",
        "",
        PolicyConfig {
            opening_turns: 3,
            ..PolicyConfig::vanguard()
        },
    );
    bot.reset(42);
    drive_opening(&mut bot, &mut arena);

    let mut log = CommandLog::new(&mut arena);
    bot.take_turn(&mut log).expect("main turn");
    assert_eq!(log.attacks.first(), Some(&(NodeId(3), NodeId(4))));
}

#[test]
fn placement_budget_is_never_exceeded() {
    let spec = MapSpec::generate(5, 30, 6, 8);
    let mut arena = LocalArena::new(
        &spec,
        ArenaConfig {
            players: 3,
            opening_turns: 8,
            base_reserve: 3,
        },
        5,
    );
    let mut bots: Vec<Box<dyn ConquestBot>> = (0..3)
        .map(|seat| {
            let mut bot = create_bot("warden-classic").expect("preset exists");
            bot.reset(5 + seat);
            bot
        })
        .collect();

    while arena.in_opening() {
        let seat = usize::from(arena.current_player().0);
        bots[seat].opening_move(&mut arena).expect("opening decision");
        arena.end_opening_turn();
    }
    for _ in 0..8 * 3 {
        let seat = usize::from(arena.current_player().0);
        let turn_before = arena.current_turn();
        bots[seat].take_turn(&mut arena).expect("main turn");
        if arena.current_turn() == turn_before {
            arena.force_end_turn();
        }
    }

    let ledger = arena.placement_ledger();
    assert!(!ledger.is_empty());
    for record in ledger {
        assert!(
            record.placed <= record.granted,
            "turn {}: placed {} of {} granted",
            record.turn,
            record.placed,
            record.granted
        );
    }
}

#[test]
fn offline_match_plays_to_completion() {
    let cfg = MatchConfig {
        players: 3,
        opening_turns: 6,
        main_turns: 6,
        node_count: 24,
        strategic_count: 6,
        extra_chords: 6,
        base_reserve: 3,
        seed: 11,
    };
    let bots = vec!["warden-classic".to_string()];
    let report = run_match(&bots, &cfg).expect("match runs");
    assert_eq!(report.turns_played, (6 + 6) * 3);
    assert_eq!(report.seats.len(), 3);
    let expected_fingerprint = bot_fingerprint("warden-classic").expect("fingerprint");
    let mut owned_total = 0;
    for seat in &report.seats {
        assert_eq!(seat.bot_id, "warden-classic");
        assert_eq!(seat.bot_fingerprint, expected_fingerprint);
        assert_eq!(seat.failed_decisions, 0);
        assert!(seat.troops_placed > 0, "every seat spends its reserves");
        owned_total += seat.nodes_owned;
    }
    assert!(owned_total <= 24);

    let batch = run_batch(&bots, &cfg, 2).expect("batch runs");
    assert_eq!(batch.games, 2);
    assert_eq!(batch.win_rates.len(), 3);
    assert_eq!(batch.matches.len(), 2);
    assert!(batch.win_rates.iter().sum::<f64>() <= 1.0 + f64::EPSILON);
}

// ---------------------------------------------------------------------------
// Canned accessor: scripted replies, no game behind it.
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct CannedClient {
    player_id: i64,
    turn_number: u32,
    owners: BTreeMap<String, i64>,
    adjacents: BTreeMap<String, Vec<i64>>,
    troops: BTreeMap<String, i64>,
    forts: BTreeMap<String, i64>,
    strategic: Vec<(i64, i64)>,
    reserve: u32,
    commands: Vec<&'static str>,
}

impl CannedClient {
    fn with_node(mut self, id: u32, owner: i64, troops: i64, neighbors: &[u32]) -> Self {
        let key = id.to_string();
        self.owners.insert(key.clone(), owner);
        self.adjacents
            .insert(key.clone(), neighbors.iter().map(|n| i64::from(*n)).collect());
        self.troops.insert(key.clone(), troops);
        self.forts.insert(key, 0);
        self
    }
}

impl GameClient for CannedClient {
    fn player_id(&mut self) -> Result<PlayerIdReply, CommandError> {
        Ok(PlayerIdReply {
            player_id: self.player_id,
        })
    }
    fn turn_number(&mut self) -> Result<TurnNumberReply, CommandError> {
        Ok(TurnNumberReply {
            turn_number: self.turn_number,
        })
    }
    fn state(&mut self) -> Result<StateReply, CommandError> {
        Ok(StateReply { state: 1 })
    }
    fn next_state(&mut self) -> Result<(), CommandError> {
        self.commands.push("next_state");
        Ok(())
    }
    fn owners(&mut self) -> Result<OwnersReply, CommandError> {
        Ok(OwnersReply {
            owners: self.owners.clone(),
        })
    }
    fn adjacency(&mut self) -> Result<AdjacencyReply, CommandError> {
        Ok(AdjacencyReply {
            adjacents: self.adjacents.clone(),
        })
    }
    fn troop_counts(&mut self) -> Result<TroopCountsReply, CommandError> {
        Ok(TroopCountsReply {
            counts: self.troops.clone(),
        })
    }
    fn fort_troop_counts(&mut self) -> Result<TroopCountsReply, CommandError> {
        Ok(TroopCountsReply {
            counts: self.forts.clone(),
        })
    }
    fn strategic_nodes(&mut self) -> Result<StrategicNodesReply, CommandError> {
        Ok(StrategicNodesReply {
            strategic_nodes: self.strategic.iter().map(|(id, _)| *id).collect(),
            scores: self.strategic.iter().map(|(_, score)| *score).collect(),
        })
    }
    fn troops_to_place(&mut self) -> Result<TroopsToPlaceReply, CommandError> {
        Ok(TroopsToPlaceReply {
            count: self.reserve,
        })
    }
    fn place_one_troop(&mut self, node: NodeId) -> Result<(), CommandError> {
        self.place_troops(node, 1)
    }
    fn place_troops(&mut self, _node: NodeId, count: u32) -> Result<(), CommandError> {
        self.commands.push("place");
        self.reserve = self.reserve.saturating_sub(count);
        Ok(())
    }
    fn attack(
        &mut self,
        _from: NodeId,
        _to: NodeId,
        _win_param: f64,
        _continue_param: f64,
    ) -> Result<AttackReply, CommandError> {
        self.commands.push("attack");
        Ok(AttackReply { won: 0 })
    }
    fn move_troops(&mut self, _from: NodeId, _to: NodeId, _count: u32) -> Result<(), CommandError> {
        self.commands.push("move");
        Ok(())
    }
    fn fortify(&mut self, _node: NodeId, _count: u32) -> Result<(), CommandError> {
        self.commands.push("fortify");
        Ok(())
    }
    fn reachable(&mut self, _node: NodeId) -> Result<ReachableReply, CommandError> {
        Ok(ReachableReply::default())
    }
}

#[test]
fn turn_is_abandoned_gracefully_when_nothing_is_owned() {
    let mut client = CannedClient {
        player_id: 0,
        turn_number: 10,
        reserve: 5,
        ..CannedClient::default()
    }
    .with_node(0, 1, 4, &[1])
    .with_node(1, 1, 2, &[0, 2])
    .with_node(2, 2, 3, &[1]);

    let mut bot = classic_bot();
    let report = bot.take_turn(&mut client).expect("decision completes");
    assert!(report.aborted);
    assert!(client.commands.is_empty(), "no commands on an abandoned turn");
}

#[test]
fn turn_recovers_after_losing_the_forward_base() {
    // The bot never designated bases (no strategic nodes); it has to
    // anchor on whatever it still owns and play a full phase cycle.
    let mut client = CannedClient {
        player_id: 0,
        turn_number: 10,
        reserve: 4,
        ..CannedClient::default()
    }
    .with_node(2, 0, 2, &[3])
    .with_node(3, 0, 1, &[2, 4])
    .with_node(4, 1, 2, &[3]);

    let mut bot = classic_bot();
    let report = bot.take_turn(&mut client).expect("decision completes");
    assert!(!report.aborted);
    assert_eq!(
        client.commands.iter().filter(|c| **c == "next_state").count(),
        5,
        "full phase cycle"
    );
    assert!(report.troops_placed <= 4, "never outspends the reserve");
}

#[test]
fn snapshot_load_rejects_malformed_replies() {
    // Missing adjacency entry.
    let mut missing = CannedClient::default().with_node(0, 0, 1, &[1]).with_node(1, 0, 1, &[0]);
    missing.adjacents.remove("1");
    match Snapshot::load(&mut missing, PlayerId(0)) {
        Err(FetchError::MissingField { field, .. }) => assert_eq!(field, "adjacents"),
        other => panic!("expected MissingField, got {other:?}"),
    }

    // One-directional edge.
    let mut lopsided = CannedClient::default().with_node(0, 0, 1, &[1]).with_node(1, 0, 1, &[]);
    match Snapshot::load(&mut lopsided, PlayerId(0)) {
        Err(FetchError::AsymmetricEdge { a, b }) => {
            assert_eq!((a, b), (NodeId(0), NodeId(1)));
        }
        other => panic!("expected AsymmetricEdge, got {other:?}"),
    }

    // Garbage key.
    let mut garbled = CannedClient::default().with_node(0, 0, 1, &[]);
    garbled.owners.insert("zero".to_string(), 0);
    match Snapshot::load(&mut garbled, PlayerId(0)) {
        Err(FetchError::MalformedKey { raw }) => assert_eq!(raw, "zero"),
        other => panic!("expected MalformedKey, got {other:?}"),
    }
}

#[test]
fn roster_ids_resolve_and_fingerprints_are_stable() {
    for id in bot_ids() {
        let bot = create_bot(id).expect("roster id resolves");
        assert_eq!(bot.id(), id);
        assert!(!bot.description().is_empty());
        let fingerprint = bot_fingerprint(id).expect("fingerprint exists");
        assert_eq!(fingerprint.len(), 16);
        assert_eq!(bot_fingerprint(id), Some(fingerprint));
    }
    assert_ne!(
        bot_fingerprint("warden-classic"),
        bot_fingerprint("warden-vanguard")
    );
    assert!(create_bot("warden-unknown").is_none());

    let manifest = bot_manifest();
    assert_eq!(manifest.len(), bot_ids().len());
    for entry in manifest {
        assert_eq!(entry.family, "warden");
        assert!(!entry.description.is_empty());
    }
}

#[test]
fn tuned_configs_load_from_json_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tuned.json");
    fs::write(&path, r#"{"target_rule":"weakest","boundary_garrison":5}"#).expect("config write");
    let id = format!("tuned:{}", path.display());

    let bot = create_bot(&id).expect("tuned bot loads");
    assert_eq!(bot.id(), id);
    let fingerprint = bot_fingerprint(&id).expect("tuned fingerprint");
    assert_ne!(Some(fingerprint.clone()), bot_fingerprint("warden-classic"));
    assert_eq!(bot_fingerprint(&id), Some(fingerprint), "same file, same hash");

    assert!(create_bot("tuned:/nonexistent/config.json").is_none());
}
