use std::collections::BTreeSet;

use conquest_autopilot::arena::{ArenaConfig, LocalArena, MapSpec, NodeSpec};
use conquest_autopilot::client::GameClient;
use conquest_autopilot::levels::RingIndex;
use conquest_autopilot::snapshot::{Node, NodeId, PlayerId, Refresh, Snapshot};
use conquest_autopilot::territory::TerritoryView;

fn arena_of(spec: &MapSpec) -> LocalArena {
    LocalArena::new(spec, ArenaConfig::default(), 1)
}

fn snapshot_of(spec: &MapSpec, me: u8) -> Snapshot {
    let mut arena = arena_of(spec);
    Snapshot::load(&mut arena, PlayerId(me)).expect("fixture snapshot loads")
}

/// A small front: player 0 holds 0..=3, player 1 holds 4..=5, 6..=7 are
/// unclaimed. Node 3 touches the enemy, node 2 touches open ground.
fn front_fixture() -> MapSpec {
    MapSpec {
        nodes: vec![
            NodeSpec {
                score: Some(9),
                ..NodeSpec::owned(0, 0, 6)
            },
            NodeSpec::owned(1, 0, 3),
            NodeSpec::owned(2, 0, 2),
            NodeSpec::owned(3, 0, 4),
            NodeSpec::owned(4, 1, 5),
            NodeSpec::owned(5, 1, 2),
            NodeSpec::empty(6),
            NodeSpec::empty(7),
        ],
        edges: vec![
            (0, 1),
            (1, 2),
            (1, 3),
            (2, 6),
            (3, 4),
            (4, 5),
            (5, 7),
            (6, 7),
        ],
    }
}

fn full_rings(snap: &Snapshot, depth: u32) -> RingIndex {
    let mut rings = RingIndex::new();
    rings.extend_to(snap, depth);
    rings
}

#[test]
fn ring_levels_are_disjoint_bfs_layers() {
    for seed in 1..=8u32 {
        let spec = MapSpec::generate(seed, 24, 4, 6);
        let snap = snapshot_of(&spec, 0);
        let rings = full_rings(&snap, 6);
        for anchor in snap.nodes().map(|n| n.id) {
            let mut seen: BTreeSet<NodeId> = BTreeSet::new();
            for level in 0..=6 {
                let ring = rings.ring(anchor, level).expect("level built");
                for id in ring {
                    assert!(
                        seen.insert(*id),
                        "seed {seed}: node {id} appears twice in rings of {anchor}"
                    );
                }
                if level == 0 {
                    assert_eq!(ring.to_vec(), vec![anchor]);
                    continue;
                }
                let prev = rings.ring(anchor, level - 1).expect("previous level built");
                for id in ring {
                    let node = snap.node(*id).expect("ring member is a real node");
                    assert!(
                        node.adjacents.iter().any(|adj| prev.contains(adj)),
                        "seed {seed}: {id} in ring {level} of {anchor} touches no ring-{} node",
                        level - 1
                    );
                }
            }
        }
    }
}

#[test]
fn ring_index_grows_incrementally_to_the_same_layers() {
    let spec = MapSpec::generate(11, 20, 3, 5);
    let snap = snapshot_of(&spec, 0);

    let mut stepped = RingIndex::new();
    for level in 1..=5 {
        stepped.extend_to(&snap, level);
    }
    let all_at_once = full_rings(&snap, 5);

    for anchor in snap.nodes().map(|n| n.id) {
        assert_eq!(stepped.horizon(anchor), Some(5));
        for level in 0..=5 {
            assert_eq!(
                stepped.ring(anchor, level),
                all_at_once.ring(anchor, level),
                "anchor {anchor} level {level}"
            );
        }
    }
}

#[test]
fn boundaries_are_exactly_the_contested_owned_nodes() {
    let spec = front_fixture();
    let snap = snapshot_of(&spec, 0);
    let rings = full_rings(&snap, 8);
    let view = TerritoryView::new(&snap, &rings);

    let me = PlayerId(0);
    let integrated = view.integrated(NodeId(0));
    let boundaries: BTreeSet<NodeId> = view.boundaries(NodeId(0)).into_iter().collect();

    // 2 touches unclaimed 6, 3 touches enemy 4; 0 and 1 are interior.
    assert_eq!(boundaries, BTreeSet::from([NodeId(2), NodeId(3)]));

    for id in &boundaries {
        let node = snap.node(*id).expect("boundary node exists");
        assert!(node.is_owned_by(me));
        assert!(integrated.contains(id));
        assert!(node
            .adjacents
            .iter()
            .any(|adj| !snap.node(*adj).expect("neighbor exists").is_owned_by(me)));
    }
    for id in integrated {
        if boundaries.contains(&id) {
            continue;
        }
        let node = snap.node(id).expect("integrated node exists");
        assert!(
            node.adjacents
                .iter()
                .all(|adj| snap.node(*adj).expect("neighbor exists").is_owned_by(me)),
            "non-boundary node {id} touches foreign ground"
        );
    }
}

#[test]
fn shortest_paths_are_valid_and_minimal() {
    let spec = front_fixture();
    let snap = snapshot_of(&spec, 0);
    let rings = full_rings(&snap, 8);
    let view = TerritoryView::new(&snap, &rings);

    let path = view
        .shortest_path(NodeId(0), NodeId(4), None)
        .expect("4 is reachable from 0");
    assert_eq!(path.first(), Some(&NodeId(0)));
    assert_eq!(path.last(), Some(&NodeId(4)));
    assert_eq!(path.len(), 4, "0-1-3-4 is the shortest route");
    let unique: BTreeSet<&NodeId> = path.iter().collect();
    assert_eq!(unique.len(), path.len(), "simple paths never repeat a node");
    for pair in path.windows(2) {
        let node = snap.node(pair[0]).expect("path node exists");
        assert!(
            node.adjacents.contains(&pair[1]),
            "{} and {} are not adjacent",
            pair[0],
            pair[1]
        );
    }

    // Constrained to our own territory, the interior must be ours.
    let owned_path = view
        .shortest_path(NodeId(0), NodeId(4), Some(PlayerId(0)))
        .expect("a friendly corridor exists");
    for id in &owned_path[1..owned_path.len() - 1] {
        assert!(snap.node(*id).expect("path node exists").is_owned_by(PlayerId(0)));
    }

    // 7 is only reachable through nodes player 1 does not own.
    assert_eq!(
        view.shortest_path(NodeId(4), NodeId(7), Some(PlayerId(1))),
        Some(vec![NodeId(4), NodeId(5), NodeId(7)])
    );
    assert_eq!(view.shortest_path(NodeId(4), NodeId(6), Some(PlayerId(1))), None);
}

#[test]
fn frontier_pressure_decays_with_distance() {
    // 3 faces enemy 4 (5 troops) at one hop and enemy 5 (2 troops) at
    // two hops; 2 faces only empty ground (weight zero).
    let spec = front_fixture();
    let snap = snapshot_of(&spec, 0);
    let rings = full_rings(&snap, 8);
    let view = TerritoryView::new(&snap, &rings);

    let weights = view.frontier_pressure(NodeId(0), 3);
    assert_eq!(weights.len(), 2);
    assert_eq!(weights.get(&NodeId(3)), Some(&6.0), "5/1 + 2/2");
    // Node 2 reaches enemy 5 (2 troops) at hop 3 and enemy 4 (5
    // troops) at hop 4: 2/3 + 5/4, truncated to three decimals.
    assert_eq!(weights.get(&NodeId(2)), Some(&1.916));
}

#[test]
fn refresh_is_idempotent_without_state_changes() {
    let spec = front_fixture();
    let mut arena = arena_of(&spec);
    let mut snap = Snapshot::load(&mut arena, PlayerId(0)).expect("snapshot loads");

    let initial: Vec<Node> = snap.nodes().cloned().collect();
    snap.refresh(&mut arena, Refresh::all()).expect("first refresh");
    let once: Vec<Node> = snap.nodes().cloned().collect();
    snap.refresh(&mut arena, Refresh::all()).expect("second refresh");
    let twice: Vec<Node> = snap.nodes().cloned().collect();

    assert_eq!(initial, once);
    assert_eq!(once, twice);
}

#[test]
fn reachable_respects_ownership() {
    let spec = front_fixture();
    let mut arena = arena_of(&spec);
    let reply = arena.reachable(NodeId(0)).expect("reachable query");
    assert_eq!(reply.reachable, vec![0, 1, 2, 3]);
}
