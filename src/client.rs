//! The game-state accessor contract.
//!
//! The remote kernel speaks JSON records keyed by *stringified* node ids;
//! the reply structs below keep that shape on purpose. Normalization to
//! typed [`NodeId`](crate::snapshot::NodeId) keys happens exactly once,
//! in the snapshot layer, so nothing downstream re-parses keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CommandError;
use crate::snapshot::NodeId;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PlayerIdReply {
    pub player_id: i64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TurnNumberReply {
    pub turn_number: u32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StateReply {
    pub state: u8,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OwnersReply {
    pub owners: BTreeMap<String, i64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AdjacencyReply {
    pub adjacents: BTreeMap<String, Vec<i64>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TroopCountsReply {
    pub counts: BTreeMap<String, i64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StrategicNodesReply {
    pub strategic_nodes: Vec<i64>,
    pub scores: Vec<i64>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TroopsToPlaceReply {
    pub count: u32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AttackReply {
    /// 1 if the attacker took the target node.
    pub won: u8,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReachableReply {
    pub reachable: Vec<i64>,
}

/// Synchronous accessor for global game state and commands.
///
/// One instance per participant; calls are made from a single thread.
/// Reads that fail surface as [`CommandError::Unavailable`]; commands the
/// kernel refuses surface as [`CommandError::Rejected`]. The engine does
/// not validate command legality beyond its own selection rules; the
/// kernel is the source of truth.
pub trait GameClient {
    fn player_id(&mut self) -> Result<PlayerIdReply, CommandError>;
    fn turn_number(&mut self) -> Result<TurnNumberReply, CommandError>;
    fn state(&mut self) -> Result<StateReply, CommandError>;
    /// Advance to the next turn phase.
    fn next_state(&mut self) -> Result<(), CommandError>;

    fn owners(&mut self) -> Result<OwnersReply, CommandError>;
    fn adjacency(&mut self) -> Result<AdjacencyReply, CommandError>;
    fn troop_counts(&mut self) -> Result<TroopCountsReply, CommandError>;
    fn fort_troop_counts(&mut self) -> Result<TroopCountsReply, CommandError>;
    fn strategic_nodes(&mut self) -> Result<StrategicNodesReply, CommandError>;
    /// Troops still in the current player's placement reserve.
    fn troops_to_place(&mut self) -> Result<TroopsToPlaceReply, CommandError>;

    fn place_one_troop(&mut self, node: NodeId) -> Result<(), CommandError>;
    fn place_troops(&mut self, node: NodeId, count: u32) -> Result<(), CommandError>;
    fn attack(
        &mut self,
        from: NodeId,
        to: NodeId,
        win_param: f64,
        continue_param: f64,
    ) -> Result<AttackReply, CommandError>;
    fn move_troops(&mut self, from: NodeId, to: NodeId, count: u32) -> Result<(), CommandError>;
    /// Convert `count` ordinary troops on `node` into fortress troops.
    fn fortify(&mut self, node: NodeId, count: u32) -> Result<(), CommandError>;
    /// Nodes reachable from `node` without leaving its owner's territory.
    fn reachable(&mut self, node: NodeId) -> Result<ReachableReply, CommandError>;
}
