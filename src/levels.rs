//! Incremental multi-level neighborhood index.
//!
//! For every anchor node, `rings[level]` holds the nodes first reached at
//! exactly `level` hops. Levels are built one per elapsed player-turn, so
//! the visible horizon widens as the game progresses. Ring L is the union
//! of ring L-1's adjacency minus rings L-1 and L-2; on a symmetric graph
//! that difference is exactly the BFS layer, so every ring is disjoint
//! from all rings below it.

use std::collections::{BTreeMap, BTreeSet};

use crate::snapshot::{NodeId, Snapshot};

#[derive(Clone, Debug, Default)]
pub struct RingIndex {
    rings: BTreeMap<NodeId, Vec<Vec<NodeId>>>,
}

impl RingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest level built for `anchor`, or `None` if the anchor is
    /// unknown. Level 0 always exists once the anchor has been indexed.
    pub fn horizon(&self, anchor: NodeId) -> Option<u32> {
        self.rings
            .get(&anchor)
            .map(|levels| (levels.len() - 1) as u32)
    }

    /// Extend every anchor in `snapshot` up to `level`, reusing all
    /// previously built rings. Entries only ever grow. Anchors that
    /// appear after the game started catch up from level 0.
    pub fn extend_to(&mut self, snapshot: &Snapshot, level: u32) {
        for node in snapshot.nodes() {
            let rings = self.rings.entry(node.id).or_default();
            if rings.is_empty() {
                rings.push(vec![node.id]);
            }
            while (rings.len() as u32) <= level {
                let prev = &rings[rings.len() - 1];
                let mut next: BTreeSet<NodeId> = BTreeSet::new();
                for id in prev {
                    if let Some(n) = snapshot.node(*id) {
                        next.extend(n.adjacents.iter().copied());
                    }
                }
                for id in prev {
                    next.remove(id);
                }
                if rings.len() >= 2 {
                    for id in &rings[rings.len() - 2] {
                        next.remove(id);
                    }
                }
                rings.push(next.into_iter().collect());
            }
        }
    }

    /// The exact ring at `level`, sorted by id.
    pub fn ring(&self, anchor: NodeId, level: u32) -> Option<&[NodeId]> {
        self.rings
            .get(&anchor)?
            .get(level as usize)
            .map(Vec::as_slice)
    }

    /// Every node within the built horizon, anchor included, in ring
    /// order (level 0 first).
    pub fn known(&self, anchor: NodeId) -> Vec<NodeId> {
        self.rings
            .get(&anchor)
            .map(|levels| levels.iter().flatten().copied().collect())
            .unwrap_or_default()
    }

    /// Flattened rings 1..=`max_level` (the anchor itself excluded).
    pub fn within(&self, anchor: NodeId, max_level: u32) -> Vec<NodeId> {
        let Some(levels) = self.rings.get(&anchor) else {
            return Vec::new();
        };
        levels
            .iter()
            .take(max_level as usize + 1)
            .skip(1)
            .flatten()
            .copied()
            .collect()
    }
}
