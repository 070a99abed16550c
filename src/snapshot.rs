//! Typed view of the game graph at one decision point.
//!
//! [`Snapshot::load`] batches the accessor reads, converts every
//! stringified key to a [`NodeId`] and the `-1` owner sentinel to
//! [`Owner::Unclaimed`], and checks the structural invariants (owner set
//! equals adjacency set, adjacency symmetric). Downstream code only ever
//! sees typed maps.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::client::GameClient;
use crate::error::FetchError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u8);

impl PlayerId {
    pub fn from_wire(raw: i64) -> Option<Self> {
        u8::try_from(raw).ok().map(Self)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player{}", self.0)
    }
}

/// Node ownership. The wire encodes unclaimed as `-1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Owner {
    Unclaimed,
    Player(PlayerId),
}

impl Owner {
    pub fn from_wire(raw: i64) -> Option<Self> {
        if raw == -1 {
            Some(Self::Unclaimed)
        } else {
            PlayerId::from_wire(raw).map(Self::Player)
        }
    }

    pub fn to_wire(self) -> i64 {
        match self {
            Self::Unclaimed => -1,
            Self::Player(p) => i64::from(p.0),
        }
    }

    pub fn player(self) -> Option<PlayerId> {
        match self {
            Self::Unclaimed => None,
            Self::Player(p) => Some(p),
        }
    }

    pub fn is(self, player: PlayerId) -> bool {
        self == Self::Player(player)
    }
}

/// One territory node. `adjacents` is fixed for the game's lifetime;
/// owner/troop fields are patched in place on refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub owner: Owner,
    pub troops: u32,
    pub fort_troops: u32,
    pub adjacents: Vec<NodeId>,
    pub score: Option<u32>,
}

impl Node {
    pub fn is_strategic(&self) -> bool {
        self.score.is_some()
    }

    pub fn is_forted(&self) -> bool {
        self.fort_troops > 0
    }

    pub fn is_empty(&self) -> bool {
        self.owner == Owner::Unclaimed
    }

    pub fn is_owned_by(&self, player: PlayerId) -> bool {
        self.owner.is(player)
    }

    /// Owned by somebody else (not unclaimed, not `player`).
    pub fn is_enemy_of(&self, player: PlayerId) -> bool {
        matches!(self.owner, Owner::Player(p) if p != player)
    }
}

/// Which volatile fields a partial refresh should re-fetch.
#[derive(Clone, Copy, Debug, Default)]
pub struct Refresh {
    pub owners: bool,
    pub troops: bool,
    pub forts: bool,
}

impl Refresh {
    pub fn all() -> Self {
        Self {
            owners: true,
            troops: true,
            forts: true,
        }
    }

    /// Owner + troop counts: what attacks and placements can change.
    pub fn combat() -> Self {
        Self {
            owners: true,
            troops: true,
            forts: false,
        }
    }

    pub fn troops_only() -> Self {
        Self {
            owners: false,
            troops: true,
            forts: false,
        }
    }
}

fn parse_key(raw: &str) -> Result<NodeId, FetchError> {
    raw.parse::<u32>()
        .map(NodeId)
        .map_err(|_| FetchError::MalformedKey {
            raw: raw.to_string(),
        })
}

fn parse_id(raw: i64) -> Result<NodeId, FetchError> {
    u32::try_from(raw)
        .map(NodeId)
        .map_err(|_| FetchError::MalformedKey {
            raw: raw.to_string(),
        })
}

/// The authoritative node table for one decision point.
#[derive(Clone, Debug)]
pub struct Snapshot {
    me: PlayerId,
    nodes: BTreeMap<NodeId, Node>,
}

impl Snapshot {
    /// Batch-fetch the full graph and build the typed table.
    pub fn load(client: &mut dyn GameClient, me: PlayerId) -> Result<Self, FetchError> {
        let owners = client.owners()?;
        let adjacency = client.adjacency()?;
        let troops = client.troop_counts()?;
        let forts = client.fort_troop_counts()?;
        let strategic = client.strategic_nodes()?;

        if strategic.strategic_nodes.len() != strategic.scores.len() {
            return Err(FetchError::ScoreShapeMismatch {
                nodes: strategic.strategic_nodes.len(),
                scores: strategic.scores.len(),
            });
        }
        let mut scores: BTreeMap<NodeId, u32> = BTreeMap::new();
        for (raw_id, raw_score) in strategic.strategic_nodes.iter().zip(&strategic.scores) {
            let id = parse_id(*raw_id)?;
            // Negative score is the "ordinary node" sentinel.
            if let Ok(score) = u32::try_from(*raw_score) {
                scores.insert(id, score);
            }
        }

        let mut adjacents: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for (raw_key, raw_neighbors) in &adjacency.adjacents {
            let id = parse_key(raw_key)?;
            let mut neighbors = Vec::with_capacity(raw_neighbors.len());
            for raw in raw_neighbors {
                neighbors.push(parse_id(*raw)?);
            }
            neighbors.sort_unstable();
            neighbors.dedup();
            adjacents.insert(id, neighbors);
        }

        let mut nodes: BTreeMap<NodeId, Node> = BTreeMap::new();
        for (raw_key, raw_owner) in &owners.owners {
            let id = parse_key(raw_key)?;
            let owner = Owner::from_wire(*raw_owner).ok_or(FetchError::InvalidOwner {
                node: id,
                raw: *raw_owner,
            })?;
            let adjacents = adjacents.remove(&id).ok_or(FetchError::MissingField {
                node: id,
                field: "adjacents",
            })?;
            let troops = read_count(&troops.counts, id, "troops")?;
            let fort_troops = read_count(&forts.counts, id, "fort_troops")?;
            nodes.insert(
                id,
                Node {
                    id,
                    owner,
                    troops,
                    fort_troops,
                    adjacents,
                    score: scores.get(&id).copied(),
                },
            );
        }

        // Leftover adjacency keys have no owner entry.
        if let Some(id) = adjacents.keys().next() {
            return Err(FetchError::MissingField {
                node: *id,
                field: "owner",
            });
        }

        let snapshot = Self { me, nodes };
        snapshot.check_symmetry()?;
        Ok(snapshot)
    }

    fn check_symmetry(&self) -> Result<(), FetchError> {
        for node in self.nodes.values() {
            for neighbor in &node.adjacents {
                let other = self
                    .nodes
                    .get(neighbor)
                    .ok_or(FetchError::UnknownNode { node: *neighbor })?;
                if other.adjacents.binary_search(&node.id).is_err() {
                    return Err(FetchError::AsymmetricEdge {
                        a: node.id,
                        b: *neighbor,
                    });
                }
            }
        }
        Ok(())
    }

    /// Re-fetch only the requested fields and patch nodes in place.
    /// Identity and adjacency never change.
    pub fn refresh(
        &mut self,
        client: &mut dyn GameClient,
        fields: Refresh,
    ) -> Result<(), FetchError> {
        if fields.owners {
            let reply = client.owners()?;
            for (raw_key, raw_owner) in &reply.owners {
                let id = parse_key(raw_key)?;
                let owner = Owner::from_wire(*raw_owner).ok_or(FetchError::InvalidOwner {
                    node: id,
                    raw: *raw_owner,
                })?;
                self.node_mut(id)?.owner = owner;
            }
        }
        if fields.troops {
            let reply = client.troop_counts()?;
            for (raw_key, raw_count) in &reply.counts {
                let id = parse_key(raw_key)?;
                let troops = parse_count(id, "troops", *raw_count)?;
                self.node_mut(id)?.troops = troops;
            }
        }
        if fields.forts {
            let reply = client.fort_troop_counts()?;
            for (raw_key, raw_count) in &reply.counts {
                let id = parse_key(raw_key)?;
                let fort_troops = parse_count(id, "fort_troops", *raw_count)?;
                self.node_mut(id)?.fort_troops = fort_troops;
            }
        }
        Ok(())
    }

    pub fn me(&self) -> PlayerId {
        self.me
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get(&self, id: NodeId) -> Result<&Node, FetchError> {
        self.nodes.get(&id).ok_or(FetchError::UnknownNode { node: id })
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, FetchError> {
        self.nodes.get_mut(&id).ok_or(FetchError::UnknownNode { node: id })
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn filter<'a>(&'a self, pred: impl Fn(&Node) -> bool + 'a) -> Vec<&'a Node> {
        self.nodes.values().filter(|n| pred(n)).collect()
    }

    /// Nodes owned by this bot, in id order.
    pub fn mine(&self) -> Vec<&Node> {
        self.filter(|n| n.is_owned_by(self.me))
    }

    /// Strategic nodes, highest score first (ties by id).
    pub fn strategic_by_score(&self) -> Vec<&Node> {
        let mut out = self.filter(Node::is_strategic);
        out.sort_by(|a, b| b.score.cmp(&a.score).then(a.id.cmp(&b.id)));
        out
    }

    /// Track a placement we just issued so selection within the same
    /// phase sees it; the accessor remains the source of truth at the
    /// next refresh.
    pub fn apply_placement(&mut self, id: NodeId, count: u32) -> Result<(), FetchError> {
        let me = self.me;
        let node = self.node_mut(id)?;
        if node.is_empty() {
            node.owner = Owner::Player(me);
        }
        node.troops += count;
        Ok(())
    }

    /// Track a troop move we just issued.
    pub fn apply_transfer(&mut self, from: NodeId, to: NodeId, count: u32) -> Result<(), FetchError> {
        {
            let source = self.node_mut(from)?;
            source.troops = source.troops.saturating_sub(count);
        }
        self.node_mut(to)?.troops += count;
        Ok(())
    }
}

fn read_count(
    counts: &BTreeMap<String, i64>,
    id: NodeId,
    field: &'static str,
) -> Result<u32, FetchError> {
    let raw = counts
        .get(&id.0.to_string())
        .ok_or(FetchError::MissingField { node: id, field })?;
    parse_count(id, field, *raw)
}

fn parse_count(id: NodeId, field: &'static str, raw: i64) -> Result<u32, FetchError> {
    u32::try_from(raw).map_err(|_| FetchError::MissingField { node: id, field })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_wire_roundtrip() {
        assert_eq!(Owner::from_wire(-1), Some(Owner::Unclaimed));
        assert_eq!(Owner::from_wire(2), Some(Owner::Player(PlayerId(2))));
        assert_eq!(Owner::from_wire(-7), None);
        assert_eq!(Owner::Player(PlayerId(2)).to_wire(), 2);
        assert_eq!(Owner::Unclaimed.to_wire(), -1);
    }

    #[test]
    fn key_parsing_rejects_garbage() {
        assert!(parse_key("17").is_ok());
        assert!(matches!(
            parse_key("seventeen"),
            Err(FetchError::MalformedKey { .. })
        ));
        assert!(matches!(parse_id(-3), Err(FetchError::MalformedKey { .. })));
    }
}
