//! Deterministic offline arena implementing the accessor contract.
//!
//! Stands in for the remote kernel so bots can be exercised end-to-end:
//! same call surface, same wire shapes (string-keyed maps), same
//! five-phase turn cycle. Combat resolution is a deliberate
//! simplification: seeded and reproducible, not the remote kernel's
//! exact rule set.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::client::{
    AdjacencyReply, AttackReply, GameClient, OwnersReply, PlayerIdReply, ReachableReply,
    StateReply, StrategicNodesReply, TroopCountsReply, TroopsToPlaceReply, TurnNumberReply,
};
use crate::error::CommandError;
use crate::rng::SeededRng;
use crate::snapshot::{NodeId, Owner, PlayerId};

pub const PHASE_PLACE: u8 = 1;
pub const PHASE_ATTACK: u8 = 2;
pub const PHASE_MOVE: u8 = 3;
pub const PHASE_FORT: u8 = 4;
pub const PHASE_ADVANCE: u8 = 5;

/// One node of a map fixture.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: u32,
    /// Wire encoding: `-1` unclaimed, otherwise a player index.
    pub owner: i64,
    pub troops: u32,
    pub fort_troops: u32,
    pub score: Option<u32>,
}

impl NodeSpec {
    pub fn empty(id: u32) -> Self {
        Self {
            id,
            owner: -1,
            troops: 0,
            fort_troops: 0,
            score: None,
        }
    }

    pub fn strategic(id: u32, score: u32) -> Self {
        Self {
            score: Some(score),
            ..Self::empty(id)
        }
    }

    pub fn owned(id: u32, player: u8, troops: u32) -> Self {
        Self {
            owner: i64::from(player),
            troops,
            ..Self::empty(id)
        }
    }
}

/// A whole map: nodes plus undirected edges. Edges are symmetrized on
/// load, so fixtures may list each pair once.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MapSpec {
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<(u32, u32)>,
}

impl MapSpec {
    /// Seeded random map: a ring of `node_count` nodes, `extra_chords`
    /// shortcut edges, and `strategic_count` scored nodes. Everything
    /// starts unclaimed.
    pub fn generate(seed: u32, node_count: u32, strategic_count: u32, extra_chords: u32) -> Self {
        let node_count = node_count.max(4);
        let mut rng = SeededRng::new(seed);
        let mut nodes: Vec<NodeSpec> = (0..node_count).map(NodeSpec::empty).collect();

        let mut edges: Vec<(u32, u32)> = (0..node_count)
            .map(|i| (i, (i + 1) % node_count))
            .collect();
        let mut seen: BTreeSet<(u32, u32)> = edges
            .iter()
            .map(|(a, b)| (*a.min(b), *a.max(b)))
            .collect();
        let mut added = 0;
        let mut attempts = 0;
        while added < extra_chords && attempts < extra_chords * 8 {
            attempts += 1;
            let a = rng.next_int(node_count);
            let b = rng.next_int(node_count);
            let key = (a.min(b), a.max(b));
            if a == b || seen.contains(&key) {
                continue;
            }
            seen.insert(key);
            edges.push((a, b));
            added += 1;
        }

        let strategic_count = strategic_count.min(node_count);
        let mut chosen: BTreeSet<u32> = BTreeSet::new();
        while (chosen.len() as u32) < strategic_count {
            chosen.insert(rng.next_int(node_count));
        }
        for (rank, id) in chosen.iter().enumerate() {
            nodes[*id as usize].score = Some(3 * (strategic_count - rank as u32));
        }

        Self { nodes, edges }
    }
}

#[derive(Clone, Debug)]
struct ArenaNode {
    owner: Owner,
    troops: u32,
    fort_troops: u32,
    adjacents: BTreeSet<NodeId>,
    score: Option<u32>,
}

/// One completed main-phase turn's placement accounting.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct PlacementRecord {
    pub turn: u32,
    pub player: u8,
    pub granted: u32,
    pub placed: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct ArenaConfig {
    pub players: u8,
    /// Player-turns in the initialization phase.
    pub opening_turns: u32,
    /// Main-phase reserve floor per turn.
    pub base_reserve: u32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            players: 3,
            opening_turns: 35,
            base_reserve: 3,
        }
    }
}

pub struct LocalArena {
    cfg: ArenaConfig,
    rng: SeededRng,
    turn: u32,
    state: u8,
    nodes: BTreeMap<NodeId, ArenaNode>,
    reserve: u32,
    granted: u32,
    placed: u32,
    ledger: Vec<PlacementRecord>,
}

impl LocalArena {
    pub fn new(spec: &MapSpec, cfg: ArenaConfig, seed: u32) -> Self {
        let mut nodes: BTreeMap<NodeId, ArenaNode> = spec
            .nodes
            .iter()
            .map(|n| {
                (
                    NodeId(n.id),
                    ArenaNode {
                        owner: Owner::from_wire(n.owner).unwrap_or(Owner::Unclaimed),
                        troops: n.troops,
                        fort_troops: n.fort_troops,
                        adjacents: BTreeSet::new(),
                        score: n.score,
                    },
                )
            })
            .collect();
        for (a, b) in &spec.edges {
            let (a, b) = (NodeId(*a), NodeId(*b));
            if a == b || !nodes.contains_key(&a) || !nodes.contains_key(&b) {
                continue;
            }
            if let Some(node) = nodes.get_mut(&a) {
                node.adjacents.insert(b);
            }
            if let Some(node) = nodes.get_mut(&b) {
                node.adjacents.insert(a);
            }
        }
        let mut arena = Self {
            cfg,
            rng: SeededRng::new(seed),
            turn: 1,
            state: PHASE_PLACE,
            nodes,
            reserve: 0,
            granted: 0,
            placed: 0,
            ledger: Vec::new(),
        };
        arena.grant_reserve();
        arena
    }

    pub fn current_turn(&self) -> u32 {
        self.turn
    }

    pub fn player_turn(&self) -> u32 {
        (self.turn - 1) / u32::from(self.cfg.players) + 1
    }

    pub fn in_opening(&self) -> bool {
        self.player_turn() <= self.cfg.opening_turns
    }

    pub fn current_player(&self) -> PlayerId {
        PlayerId(((self.turn - 1) % u32::from(self.cfg.players)) as u8)
    }

    pub fn placement_ledger(&self) -> &[PlacementRecord] {
        &self.ledger
    }

    pub fn owned_count(&self, player: PlayerId) -> u32 {
        self.nodes.values().filter(|n| n.owner.is(player)).count() as u32
    }

    pub fn troop_total(&self, player: PlayerId) -> u32 {
        self.nodes
            .values()
            .filter(|n| n.owner.is(player))
            .map(|n| n.troops + n.fort_troops)
            .sum()
    }

    pub fn strategic_owned(&self, player: PlayerId) -> u32 {
        self.nodes
            .values()
            .filter(|n| n.owner.is(player) && n.score.is_some())
            .count() as u32
    }

    pub fn fortress_built(&self, player: PlayerId) -> bool {
        self.nodes
            .values()
            .any(|n| n.owner.is(player) && n.fort_troops > 0)
    }

    /// Rotate to the next decision point during initialization. The
    /// driver calls this after every opening decision, command or not.
    pub fn end_opening_turn(&mut self) {
        self.reserve = 0;
        self.turn += 1;
        self.state = PHASE_PLACE;
        self.grant_reserve();
    }

    /// Abandon the current main-phase turn (bot error or incomplete
    /// phase walk) and hand the seat to the next player.
    pub fn force_end_turn(&mut self) {
        self.finish_main_turn();
    }

    fn finish_main_turn(&mut self) {
        self.ledger.push(PlacementRecord {
            turn: self.turn,
            player: self.current_player().0,
            granted: self.granted,
            placed: self.placed,
        });
        self.reserve = 0;
        self.turn += 1;
        self.state = PHASE_PLACE;
        self.grant_reserve();
    }

    fn grant_reserve(&mut self) {
        let player = self.current_player();
        let amount = if self.in_opening() {
            1
        } else {
            self.cfg.base_reserve + self.owned_count(player) / 4 + 2 * self.strategic_owned(player)
        };
        self.reserve = amount;
        self.granted = amount;
        self.placed = 0;
    }

    fn node(&self, id: NodeId) -> Result<&ArenaNode, CommandError> {
        self.nodes
            .get(&id)
            .ok_or_else(|| CommandError::Rejected(format!("unknown node {id}")))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut ArenaNode, CommandError> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| CommandError::Rejected(format!("unknown node {id}")))
    }

    fn require_phase(&self, phase: u8, what: &str) -> Result<(), CommandError> {
        if self.in_opening() {
            if phase == PHASE_PLACE {
                return Ok(());
            }
            return Err(CommandError::Rejected(format!(
                "{what} is not legal during initialization"
            )));
        }
        if self.state != phase {
            return Err(CommandError::Rejected(format!(
                "{what} is not legal in phase {}",
                self.state
            )));
        }
        Ok(())
    }
}

impl GameClient for LocalArena {
    fn player_id(&mut self) -> Result<PlayerIdReply, CommandError> {
        Ok(PlayerIdReply {
            player_id: i64::from(self.current_player().0),
        })
    }

    fn turn_number(&mut self) -> Result<TurnNumberReply, CommandError> {
        Ok(TurnNumberReply {
            turn_number: self.turn,
        })
    }

    fn state(&mut self) -> Result<StateReply, CommandError> {
        Ok(StateReply {
            state: if self.in_opening() { 0 } else { self.state },
        })
    }

    fn next_state(&mut self) -> Result<(), CommandError> {
        if self.in_opening() {
            return Err(CommandError::Rejected(
                "initialization has no turn phases".to_string(),
            ));
        }
        if self.state == PHASE_ADVANCE {
            self.finish_main_turn();
        } else {
            self.state += 1;
        }
        Ok(())
    }

    fn owners(&mut self) -> Result<OwnersReply, CommandError> {
        Ok(OwnersReply {
            owners: self
                .nodes
                .iter()
                .map(|(id, n)| (id.0.to_string(), n.owner.to_wire()))
                .collect(),
        })
    }

    fn adjacency(&mut self) -> Result<AdjacencyReply, CommandError> {
        Ok(AdjacencyReply {
            adjacents: self
                .nodes
                .iter()
                .map(|(id, n)| {
                    (
                        id.0.to_string(),
                        n.adjacents.iter().map(|a| i64::from(a.0)).collect(),
                    )
                })
                .collect(),
        })
    }

    fn troop_counts(&mut self) -> Result<TroopCountsReply, CommandError> {
        Ok(TroopCountsReply {
            counts: self
                .nodes
                .iter()
                .map(|(id, n)| (id.0.to_string(), i64::from(n.troops)))
                .collect(),
        })
    }

    fn fort_troop_counts(&mut self) -> Result<TroopCountsReply, CommandError> {
        Ok(TroopCountsReply {
            counts: self
                .nodes
                .iter()
                .map(|(id, n)| (id.0.to_string(), i64::from(n.fort_troops)))
                .collect(),
        })
    }

    fn strategic_nodes(&mut self) -> Result<StrategicNodesReply, CommandError> {
        let mut reply = StrategicNodesReply::default();
        for (id, node) in &self.nodes {
            if let Some(score) = node.score {
                reply.strategic_nodes.push(i64::from(id.0));
                reply.scores.push(i64::from(score));
            }
        }
        Ok(reply)
    }

    fn troops_to_place(&mut self) -> Result<TroopsToPlaceReply, CommandError> {
        Ok(TroopsToPlaceReply {
            count: self.reserve,
        })
    }

    fn place_one_troop(&mut self, node: NodeId) -> Result<(), CommandError> {
        self.place_troops(node, 1)
    }

    fn place_troops(&mut self, node: NodeId, count: u32) -> Result<(), CommandError> {
        self.require_phase(PHASE_PLACE, "placement")?;
        if count == 0 {
            return Err(CommandError::Rejected("cannot place zero troops".to_string()));
        }
        if count > self.reserve {
            return Err(CommandError::Rejected(format!(
                "placement of {count} exceeds reserve of {}",
                self.reserve
            )));
        }
        let player = self.current_player();
        let target = self.node_mut(node)?;
        match target.owner {
            Owner::Unclaimed => target.owner = Owner::Player(player),
            Owner::Player(p) if p == player => {}
            Owner::Player(_) => {
                return Err(CommandError::Rejected(format!(
                    "node {node} belongs to an opponent"
                )))
            }
        }
        target.troops += count;
        self.reserve -= count;
        self.placed += count;
        Ok(())
    }

    fn attack(
        &mut self,
        from: NodeId,
        to: NodeId,
        win_param: f64,
        continue_param: f64,
    ) -> Result<AttackReply, CommandError> {
        self.require_phase(PHASE_ATTACK, "attack")?;
        if !(0.0..=1.0).contains(&win_param) || !(0.0..=1.0).contains(&continue_param) {
            return Err(CommandError::Rejected(
                "attack parameters must be within [0, 1]".to_string(),
            ));
        }
        let player = self.current_player();
        let origin = self.node(from)?;
        if !origin.owner.is(player) {
            return Err(CommandError::Rejected(format!("node {from} is not yours")));
        }
        if !origin.adjacents.contains(&to) {
            return Err(CommandError::Rejected(format!(
                "{to} is not adjacent to {from}"
            )));
        }
        if origin.troops < 2 {
            return Err(CommandError::Rejected(format!(
                "node {from} cannot spare an attacking force"
            )));
        }
        let target = self.node(to)?;
        match target.owner {
            Owner::Unclaimed => {
                return Err(CommandError::Rejected(format!("node {to} is unclaimed")))
            }
            Owner::Player(p) if p == player => {
                return Err(CommandError::Rejected(format!("node {to} is already yours")))
            }
            Owner::Player(_) => {}
        }

        let committed = self.node(from)?.troops - 1;
        let defense = target.troops + target.fort_troops;
        let odds = win_param * f64::from(committed) / f64::from(committed + defense).max(1.0);
        let won = self.rng.next_fraction() < odds;
        if won {
            let survivors = committed.saturating_sub(defense / 2).max(1);
            let occupy = ((f64::from(survivors) * continue_param).ceil() as u32)
                .clamp(1, survivors);
            self.node_mut(from)?.troops = 1 + (survivors - occupy);
            let target = self.node_mut(to)?;
            target.owner = Owner::Player(player);
            target.troops = occupy;
            target.fort_troops = 0;
            Ok(AttackReply { won: 1 })
        } else {
            self.node_mut(from)?.troops = 1 + committed / 2;
            Ok(AttackReply { won: 0 })
        }
    }

    fn move_troops(&mut self, from: NodeId, to: NodeId, count: u32) -> Result<(), CommandError> {
        self.require_phase(PHASE_MOVE, "troop movement")?;
        let player = self.current_player();
        let source = self.node(from)?;
        if !source.owner.is(player) {
            return Err(CommandError::Rejected(format!("node {from} is not yours")));
        }
        if !source.adjacents.contains(&to) {
            return Err(CommandError::Rejected(format!(
                "{to} is not adjacent to {from}"
            )));
        }
        if count == 0 || count >= source.troops {
            return Err(CommandError::Rejected(format!(
                "cannot move {count} troops out of {}",
                source.troops
            )));
        }
        if !self.node(to)?.owner.is(player) {
            return Err(CommandError::Rejected(format!("node {to} is not yours")));
        }
        self.node_mut(from)?.troops -= count;
        self.node_mut(to)?.troops += count;
        Ok(())
    }

    fn fortify(&mut self, node: NodeId, count: u32) -> Result<(), CommandError> {
        self.require_phase(PHASE_FORT, "fortification")?;
        let player = self.current_player();
        let target = self.node(node)?;
        if !target.owner.is(player) {
            return Err(CommandError::Rejected(format!("node {node} is not yours")));
        }
        if count == 0 || count > target.troops {
            return Err(CommandError::Rejected(format!(
                "cannot fortify {count} of {} troops",
                target.troops
            )));
        }
        let target = self.node_mut(node)?;
        target.troops -= count;
        target.fort_troops += count;
        Ok(())
    }

    fn reachable(&mut self, node: NodeId) -> Result<ReachableReply, CommandError> {
        let owner = self.node(node)?.owner;
        let mut seen = BTreeSet::from([node]);
        let mut stack = vec![node];
        while let Some(here) = stack.pop() {
            let neighbors: Vec<NodeId> = self.node(here)?.adjacents.iter().copied().collect();
            for adj in neighbors {
                if self.node(adj)?.owner == owner && seen.insert(adj) {
                    stack.push(adj);
                }
            }
        }
        Ok(ReachableReply {
            reachable: seen.into_iter().map(|id| i64::from(id.0)).collect(),
        })
    }
}
