//! Territory queries over a snapshot and its ring index: integrated
//! regions, boundary detection, path search, and frontier pressure
//! scoring.

use std::collections::{BTreeMap, BTreeSet};

use crate::levels::RingIndex;
use crate::snapshot::{NodeId, PlayerId, Snapshot};

/// Borrowing query layer; cheap to construct per decision.
pub struct TerritoryView<'a> {
    snap: &'a Snapshot,
    rings: &'a RingIndex,
}

impl<'a> TerritoryView<'a> {
    pub fn new(snap: &'a Snapshot, rings: &'a RingIndex) -> Self {
        Self { snap, rings }
    }

    /// Own nodes inside the anchor's known neighborhood, in ring order.
    pub fn integrated(&self, anchor: NodeId) -> Vec<NodeId> {
        let me = self.snap.me();
        self.rings
            .known(anchor)
            .into_iter()
            .filter(|id| {
                self.snap
                    .node(*id)
                    .is_some_and(|n| n.is_owned_by(me))
            })
            .collect()
    }

    /// Integrated nodes with at least one neighbor we do not own: the
    /// active frontier.
    pub fn boundaries(&self, anchor: NodeId) -> Vec<NodeId> {
        let me = self.snap.me();
        self.integrated(anchor)
            .into_iter()
            .filter(|id| {
                self.snap.node(*id).is_some_and(|n| {
                    n.adjacents.iter().any(|adj| {
                        self.snap
                            .node(*adj)
                            .is_none_or(|other| !other.is_owned_by(me))
                    })
                })
            })
            .collect()
    }

    /// Minimum-length simple path from `start` to `stop`.
    ///
    /// Exhaustive backtracking enumeration; exponential in the worst
    /// case but the graphs are dozens of nodes and paths short. With an
    /// `owner_filter`, every interior node must belong to that player
    /// (endpoints are exempt). Ties resolve to the first minimum-length
    /// path in traversal order, neighbors visited in id order.
    pub fn shortest_path(
        &self,
        start: NodeId,
        stop: NodeId,
        owner_filter: Option<PlayerId>,
    ) -> Option<Vec<NodeId>> {
        if self.snap.node(start).is_none() || self.snap.node(stop).is_none() {
            return None;
        }
        if start == stop {
            return Some(vec![start]);
        }
        let mut best: Option<Vec<NodeId>> = None;
        let mut trail = vec![start];
        let mut visited = BTreeSet::from([start]);
        self.search(stop, owner_filter, &mut trail, &mut visited, &mut best);
        best
    }

    fn search(
        &self,
        stop: NodeId,
        owner_filter: Option<PlayerId>,
        trail: &mut Vec<NodeId>,
        visited: &mut BTreeSet<NodeId>,
        best: &mut Option<Vec<NodeId>>,
    ) {
        let Some(&here) = trail.last() else {
            return;
        };
        if let Some(found) = best {
            // Longer than the best already found; prune.
            if trail.len() + 1 >= found.len() {
                return;
            }
        }
        let Some(node) = self.snap.node(here) else {
            return;
        };
        for neighbor in &node.adjacents {
            if visited.contains(neighbor) {
                continue;
            }
            if *neighbor == stop {
                let mut path = trail.clone();
                path.push(stop);
                let shorter = best.as_ref().is_none_or(|b| path.len() < b.len());
                if shorter {
                    *best = Some(path);
                }
                continue;
            }
            if let Some(owner) = owner_filter {
                let passable = self
                    .snap
                    .node(*neighbor)
                    .is_some_and(|n| n.is_owned_by(owner));
                if !passable {
                    continue;
                }
            }
            trail.push(*neighbor);
            visited.insert(*neighbor);
            self.search(stop, owner_filter, trail, visited, best);
            visited.remove(neighbor);
            trail.pop();
        }
    }

    /// Enemy-density weight per boundary node of `anchor`.
    ///
    /// From each boundary node, expand breadth-first through nodes we do
    /// not own; every enemy node first seen at hop distance `level`
    /// contributes `troops / level`. Expansion stops when no unvisited
    /// non-own neighbor remains. Weights are truncated to `precision`
    /// decimals so rankings are stable across platforms.
    pub fn frontier_pressure(&self, anchor: NodeId, precision: u32) -> BTreeMap<NodeId, f64> {
        let me = self.snap.me();
        let mut out = BTreeMap::new();
        for boundary in self.boundaries(anchor) {
            let mut weight = 0.0f64;
            let mut visited = BTreeSet::from([boundary]);
            let mut frontier: BTreeSet<NodeId> = self
                .neighbors_not_owned_by(boundary, me)
                .into_iter()
                .collect();
            visited.extend(frontier.iter().copied());
            let mut level = 1u32;
            while !frontier.is_empty() {
                let mut next: BTreeSet<NodeId> = BTreeSet::new();
                for id in &frontier {
                    if let Some(node) = self.snap.node(*id) {
                        if node.is_enemy_of(me) {
                            weight += f64::from(node.troops) / f64::from(level);
                        }
                        next.extend(
                            self.neighbors_not_owned_by(*id, me)
                                .into_iter()
                                .filter(|n| !visited.contains(n)),
                        );
                    }
                }
                visited.extend(next.iter().copied());
                frontier = next;
                level += 1;
            }
            out.insert(boundary, truncate(weight, precision));
        }
        out
    }

    fn neighbors_not_owned_by(&self, id: NodeId, player: PlayerId) -> Vec<NodeId> {
        self.snap
            .node(id)
            .map(|node| {
                node.adjacents
                    .iter()
                    .copied()
                    .filter(|adj| {
                        self.snap
                            .node(*adj)
                            .is_some_and(|n| !n.is_owned_by(player))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn truncate(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).trunc() / factor
}

#[cfg(test)]
mod tests {
    use super::truncate;

    #[test]
    fn truncation_drops_instead_of_rounding() {
        assert_eq!(truncate(1.2399, 2), 1.23);
        assert_eq!(truncate(0.999, 0), 0.0);
        assert_eq!(truncate(5.5, 3), 5.5);
    }
}
