//! warden: the canonical territory-control policy engine.
//!
//! One turn works the frontier in a fixed five-phase cycle:
//! - place: strategic claims, boundary top-ups, interior garrisons by
//!   distance, then the heaviest-pressure sectors split the remainder
//! - attack: push from the frontier, chaining captures while the origin
//!   keeps enough troops; a capture of a strategic node halts the chain
//! - move: route reserves from quiet neighbors onto thin boundaries
//! - fortify: once per game, convert the fortress garrison
//! - advance: hand the turn back
//!
//! All cross-turn memory lives in an explicit [`ControllerState`].

use tracing::debug;

use crate::bots::{
    ConquestBot, DecisionReport, PolicyConfig, ReinforceFormula, StepOutcome, TargetRule,
};
use crate::client::GameClient;
use crate::error::FetchError;
use crate::levels::RingIndex;
use crate::rng::SeededRng;
use crate::snapshot::{NodeId, PlayerId, Refresh, Snapshot};
use crate::territory::TerritoryView;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Posture {
    #[default]
    Attack,
    Defend,
}

/// An interrupted push: resume `origin -> dest` on the next attack turn
/// if both ends still qualify.
#[derive(Clone, Copy, Debug)]
struct PendingAttack {
    origin: NodeId,
    dest: NodeId,
}

#[derive(Debug, Default)]
struct ControllerState {
    me: Option<PlayerId>,
    fort: Option<NodeId>,
    main: Option<NodeId>,
    former_main: Option<NodeId>,
    fort_completed: bool,
    boundary_target: u32,
    boundary_raised: bool,
    posture: Posture,
    pending_attack: Option<PendingAttack>,
    rings: RingIndex,
}

pub struct WardenBot {
    id: String,
    description: String,
    cfg: PolicyConfig,
    rng: SeededRng,
    st: ControllerState,
}

impl WardenBot {
    pub fn new(id: impl Into<String>, description: impl Into<String>, cfg: PolicyConfig) -> Self {
        let mut bot = Self {
            id: id.into(),
            description: description.into(),
            cfg,
            rng: SeededRng::new(0),
            st: ControllerState::default(),
        };
        bot.reset(0);
        bot
    }

    fn player_turn(&self, turn: u32) -> u32 {
        (turn.saturating_sub(1)) / self.cfg.players.max(1) + 1
    }

    fn ensure_identity(&mut self, client: &mut dyn GameClient) -> Result<PlayerId, FetchError> {
        if let Some(me) = self.st.me {
            return Ok(me);
        }
        let reply = client.player_id()?;
        let me = PlayerId::from_wire(reply.player_id)
            .ok_or(FetchError::InvalidPlayer { raw: reply.player_id })?;
        self.st.me = Some(me);
        Ok(me)
    }

    /// Pick fort and main among our strategic nodes, best score first.
    /// With a single owned strategic node it serves as both.
    fn designate_bases(&mut self, snap: &Snapshot) {
        let me = snap.me();
        let owned: Vec<NodeId> = snap
            .strategic_by_score()
            .into_iter()
            .filter(|n| n.is_owned_by(me))
            .map(|n| n.id)
            .collect();
        match owned.as_slice() {
            [] => {}
            [only] => {
                self.st.fort = Some(*only);
                self.st.main = Some(*only);
                self.st.former_main = Some(*only);
            }
            [fort, main, ..] => {
                self.st.fort = Some(*fort);
                self.st.main = Some(*main);
                self.st.former_main = Some(*main);
            }
        }
        debug!(fort = ?self.st.fort, main = ?self.st.main, "bases designated");
    }

    /// Keep the forward base anchored on friendly territory. Returns
    /// false when we own nothing at all.
    fn retarget_main(&mut self, snap: &Snapshot) -> bool {
        let me = snap.me();
        if let Some(former) = self.st.former_main {
            if snap.node(former).is_some_and(|n| n.is_owned_by(me)) {
                self.st.main = Some(former);
                return true;
            }
        }
        if let Some(main) = self.st.main {
            if snap.node(main).is_some_and(|n| n.is_owned_by(me)) {
                return true;
            }
        }
        for anchor in [self.st.former_main, self.st.fort].into_iter().flatten() {
            if let Some(near) = self.nearest_owned(snap, anchor) {
                let view = TerritoryView::new(snap, &self.st.rings);
                let new_main = view
                    .integrated(near)
                    .into_iter()
                    .min_by_key(|id| (snap.node(*id).map_or(u32::MAX, |n| n.troops), *id))
                    .unwrap_or(near);
                debug!(%new_main, "main node lost; retargeted");
                self.st.main = Some(new_main);
                return true;
            }
        }
        if let Some(node) = snap.mine().first() {
            self.st.main = Some(node.id);
            return true;
        }
        false
    }

    /// Closest own node to `anchor` by ring level.
    fn nearest_owned(&self, snap: &Snapshot, anchor: NodeId) -> Option<NodeId> {
        let me = snap.me();
        let horizon = self.st.rings.horizon(anchor)?;
        for level in 0..=horizon {
            if let Some(ring) = self.st.rings.ring(anchor, level) {
                if let Some(id) = ring
                    .iter()
                    .find(|id| snap.node(**id).is_some_and(|n| n.is_owned_by(me)))
                {
                    return Some(*id);
                }
            }
        }
        None
    }

    /// Place up to `want` troops on `node`, spending no more than the
    /// budget the accessor still reserves for us.
    fn place_up_to(
        &self,
        client: &mut dyn GameClient,
        snap: &mut Snapshot,
        node: NodeId,
        want: u32,
        report: &mut DecisionReport,
    ) -> Result<StepOutcome, FetchError> {
        if want == 0 {
            return Ok(StepOutcome::Continue);
        }
        let budget = client.troops_to_place()?.count;
        if budget == 0 {
            return Ok(StepOutcome::AdvancePhase);
        }
        let count = want.min(budget);
        client.place_troops(node, count)?;
        snap.apply_placement(node, count)?;
        report.placements += 1;
        report.troops_placed += count;
        Ok(StepOutcome::Continue)
    }

    fn boundary_deficits(&self, snap: &Snapshot, anchor: NodeId) -> Vec<(NodeId, u32)> {
        let view = TerritoryView::new(snap, &self.st.rings);
        view.boundaries(anchor)
            .into_iter()
            .filter_map(|id| {
                let troops = snap.node(id)?.troops;
                (troops < self.st.boundary_target)
                    .then(|| (id, self.st.boundary_target - troops))
            })
            .collect()
    }

    fn interior_target(&self, level: u32) -> u32 {
        match self.cfg.interior_formula {
            ReinforceFormula::DistanceDecay => level * 3 / 2 + 1,
            ReinforceFormula::Flat => self.cfg.interior_garrison,
        }
    }

    fn place_phase(
        &mut self,
        client: &mut dyn GameClient,
        snap: &mut Snapshot,
        report: &mut DecisionReport,
    ) -> Result<StepOutcome, FetchError> {
        let me = snap.me();

        // Unclaimed strategic nodes first, best score first.
        let unclaimed: Vec<NodeId> = snap
            .strategic_by_score()
            .into_iter()
            .filter(|n| n.is_empty())
            .map(|n| n.id)
            .collect();
        for id in unclaimed {
            if self.place_up_to(client, snap, id, self.cfg.strategic_minimum, report)?
                == StepOutcome::AdvancePhase
            {
                return Ok(StepOutcome::AdvancePhase);
            }
        }

        // Fortress frontier, then the forward frontier.
        for anchor in [self.st.fort, self.st.main].into_iter().flatten() {
            for (id, want) in self.boundary_deficits(snap, anchor) {
                if self.place_up_to(client, snap, id, want, report)? == StepOutcome::AdvancePhase {
                    return Ok(StepOutcome::AdvancePhase);
                }
            }
        }

        // Interior defense, farthest known ring inward.
        if let Some(main) = self.st.main {
            if let Some(horizon) = self.st.rings.horizon(main) {
                for level in (1..=horizon).rev() {
                    let wanted: Vec<(NodeId, u32)> = self
                        .st
                        .rings
                        .ring(main, level)
                        .map(|ring| {
                            ring.iter()
                                .filter_map(|id| {
                                    let node = snap.node(*id)?;
                                    if !node.is_owned_by(me) {
                                        return None;
                                    }
                                    let target = self.interior_target(level);
                                    (node.troops < target).then(|| (*id, target - node.troops))
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    for (id, want) in wanted {
                        if self.place_up_to(client, snap, id, want, report)?
                            == StepOutcome::AdvancePhase
                        {
                            return Ok(StepOutcome::AdvancePhase);
                        }
                    }
                }
            }
        }

        // Split what's left across the heaviest frontier sectors.
        if let Some(main) = self.st.main {
            let weights = {
                let view = TerritoryView::new(snap, &self.st.rings);
                view.frontier_pressure(main, self.cfg.pressure_precision)
            };
            if !weights.is_empty() {
                let mean = weights.values().sum::<f64>() / weights.len() as f64;
                let mut top: Vec<(NodeId, f64)> = weights
                    .into_iter()
                    .filter(|(_, weight)| *weight >= mean)
                    .collect();
                top.sort_by(|a, b| {
                    b.1.partial_cmp(&a.1)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.0.cmp(&b.0))
                });
                let budget = client.troops_to_place()?.count;
                if budget == 0 {
                    return Ok(StepOutcome::AdvancePhase);
                }
                let share = (budget / top.len() as u32).max(1);
                for (id, _) in &top {
                    if self.place_up_to(client, snap, *id, share, report)?
                        == StepOutcome::AdvancePhase
                    {
                        return Ok(StepOutcome::AdvancePhase);
                    }
                }
            }
        }

        // Fallback: creep onto the nearest unclaimed nodes.
        if let Some(main) = self.st.main {
            let mut unclaimed: Vec<(usize, NodeId)> = {
                let view = TerritoryView::new(snap, &self.st.rings);
                snap.nodes()
                    .filter(|n| n.is_empty())
                    .filter_map(|n| {
                        view.shortest_path(main, n.id, None)
                            .map(|path| (path.len(), n.id))
                    })
                    .collect()
            };
            unclaimed.sort_unstable();
            for (_, id) in unclaimed {
                if self.place_up_to(client, snap, id, 1, report)? == StepOutcome::AdvancePhase {
                    return Ok(StepOutcome::AdvancePhase);
                }
            }
        }

        Ok(StepOutcome::Continue)
    }

    /// Enemy neighbor of `origin` ranked by the configured target rule;
    /// ties go to the lowest id.
    fn pick_target(&self, snap: &Snapshot, origin: NodeId, me: PlayerId) -> Option<NodeId> {
        let node = snap.node(origin)?;
        let mut best: Option<(NodeId, u32)> = None;
        for adj in &node.adjacents {
            let Some(neighbor) = snap.node(*adj) else {
                continue;
            };
            if !neighbor.is_enemy_of(me) {
                continue;
            }
            let candidate = (neighbor.id, neighbor.troops);
            best = Some(match best {
                None => candidate,
                Some(current) => {
                    let better = match self.cfg.target_rule {
                        TargetRule::Strongest => candidate.1 > current.1,
                        TargetRule::Weakest => candidate.1 < current.1,
                    };
                    if better {
                        candidate
                    } else {
                        current
                    }
                }
            });
        }
        best.map(|(id, _)| id)
    }

    fn attack_phase(
        &mut self,
        client: &mut dyn GameClient,
        snap: &mut Snapshot,
        report: &mut DecisionReport,
    ) -> Result<StepOutcome, FetchError> {
        snap.refresh(client, Refresh::combat())?;
        if self.cfg.alternate_posture && self.st.posture == Posture::Defend {
            debug!("defend posture; holding the line this turn");
            return Ok(StepOutcome::Continue);
        }
        let me = snap.me();

        // Resume an interrupted push when both ends still qualify.
        let mut cursor: Option<(NodeId, Option<NodeId>)> = None;
        if let Some(pending) = self.st.pending_attack.take() {
            let origin_ok = snap.node(pending.origin).is_some_and(|n| {
                n.is_owned_by(me) && n.troops >= self.cfg.attack_min_troops
            });
            let dest_ok = snap
                .node(pending.dest)
                .is_some_and(|n| n.is_enemy_of(me));
            let adjacent = snap
                .node(pending.origin)
                .is_some_and(|n| n.adjacents.binary_search(&pending.dest).is_ok());
            if origin_ok && dest_ok && adjacent {
                cursor = Some((pending.origin, Some(pending.dest)));
            }
        }
        if cursor.is_none() {
            let Some(main) = self.st.main else {
                return Ok(StepOutcome::Abort);
            };
            let origin = {
                let view = TerritoryView::new(snap, &self.st.rings);
                view.boundaries(main).into_iter().find(|id| {
                    snap.node(*id)
                        .is_some_and(|n| n.troops >= self.cfg.attack_min_troops)
                })
            };
            match origin {
                Some(origin) => cursor = Some((origin, None)),
                None => return Ok(StepOutcome::Abort),
            }
        }

        let Some((mut origin, mut forced)) = cursor else {
            return Ok(StepOutcome::Abort);
        };
        loop {
            let target = match forced.take() {
                Some(dest) => dest,
                None => match self.pick_target(snap, origin, me) {
                    Some(dest) => dest,
                    None => break,
                },
            };
            debug!(%origin, %target, "attacking");
            let reply = client.attack(
                origin,
                target,
                self.cfg.attack_win_param,
                self.cfg.attack_continue_param,
            )?;
            report.attacks += 1;
            snap.refresh(client, Refresh::combat())?;
            if reply.won == 0 {
                break;
            }
            report.captures += 1;
            let captured = snap.get(target)?;
            if captured.is_strategic() {
                // Taking a strategic node is worth consolidating; never
                // push through it in the same breath.
                break;
            }
            if captured.is_owned_by(me) && captured.troops >= self.cfg.attack_min_troops {
                origin = target;
                continue;
            }
            // Out of steam. Remember where the push was headed.
            if let Some(dest) = self.pick_target(snap, target, me) {
                self.st.pending_attack = Some(PendingAttack {
                    origin: target,
                    dest,
                });
            }
            break;
        }
        Ok(StepOutcome::Continue)
    }

    fn move_phase(
        &mut self,
        client: &mut dyn GameClient,
        snap: &mut Snapshot,
        report: &mut DecisionReport,
    ) -> Result<StepOutcome, FetchError> {
        snap.refresh(client, Refresh::combat())?;
        let me = snap.me();
        let Some(main) = self.st.main else {
            return Ok(StepOutcome::Abort);
        };
        for (id, need) in self.boundary_deficits(snap, main) {
            let sources: Vec<NodeId> = snap
                .get(id)?
                .adjacents
                .iter()
                .copied()
                .filter(|adj| {
                    snap.node(*adj).is_some_and(|n| {
                        n.is_owned_by(me) && n.troops >= self.cfg.attack_min_troops
                    })
                })
                .collect();
            if sources.is_empty() {
                continue;
            }
            let from = *self.rng.pick(&sources);
            // The source never abandons its node.
            let available = snap.get(from)?.troops.saturating_sub(1);
            let count = need.min(available);
            if count == 0 {
                continue;
            }
            client.move_troops(from, id, count)?;
            snap.apply_transfer(from, id, count)?;
            report.moves += 1;
        }
        Ok(StepOutcome::Continue)
    }

    fn fort_phase(
        &mut self,
        client: &mut dyn GameClient,
        snap: &mut Snapshot,
        report: &mut DecisionReport,
    ) -> Result<StepOutcome, FetchError> {
        if self.st.fort_completed {
            return Ok(StepOutcome::Continue);
        }
        let Some(fort) = self.st.fort else {
            return Ok(StepOutcome::Abort);
        };
        snap.refresh(client, Refresh::troops_only())?;
        let node = snap.get(fort)?;
        if !node.is_owned_by(snap.me()) || node.troops <= self.cfg.fort_reserve {
            return Ok(StepOutcome::Continue);
        }
        let count = node.troops - self.cfg.fort_reserve;
        client.fortify(fort, count)?;
        self.st.fort_completed = true;
        report.fortified = true;
        debug!(%fort, count, "fortress completed");
        Ok(StepOutcome::Continue)
    }
}

impl ConquestBot for WardenBot {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn reset(&mut self, seed: u32) {
        self.rng = SeededRng::new(seed);
        self.st = ControllerState {
            boundary_target: self.cfg.boundary_garrison,
            ..ControllerState::default()
        };
    }

    fn opening_move(
        &mut self,
        client: &mut dyn GameClient,
    ) -> Result<DecisionReport, FetchError> {
        let mut report = DecisionReport::default();
        let turn = client.turn_number()?.turn_number;
        let player_turn = self.player_turn(turn);
        let me = self.ensure_identity(client)?;
        let snap = Snapshot::load(client, me)?;
        self.st.rings.extend_to(&snap, player_turn);
        // By player-turn 3 both of our strategic claims have landed.
        if player_turn >= 3 && self.st.fort.is_none() {
            self.designate_bases(&snap);
        }
        debug!(turn, player_turn, %me, "opening decision");

        let mut place = |id: NodeId, report: &mut DecisionReport| -> Result<(), FetchError> {
            client.place_one_troop(id)?;
            report.placements += 1;
            report.troops_placed += 1;
            Ok(())
        };

        // Claim unclaimed strategic nodes, best score first.
        if let Some(node) = snap.strategic_by_score().into_iter().find(|n| n.is_empty()) {
            place(node.id, &mut report)?;
            return Ok(report);
        }

        // Spread onto empty ground near the forward base.
        if let Some(main) = self.st.main {
            let ordinary = snap
                .mine()
                .iter()
                .filter(|n| !n.is_strategic())
                .count() as u32;
            if ordinary < self.cfg.opening_ordinary_cap {
                if let Some(id) = self
                    .st
                    .rings
                    .known(main)
                    .into_iter()
                    .find(|id| snap.node(*id).is_some_and(|n| n.is_empty()))
                {
                    place(id, &mut report)?;
                    return Ok(report);
                }
            }
        }

        // Then empty ground touching the fortress.
        if let Some(fort) = self.st.fort {
            if let Some(id) = snap
                .get(fort)?
                .adjacents
                .iter()
                .copied()
                .find(|id| snap.node(*id).is_some_and(|n| n.is_empty()))
            {
                place(id, &mut report)?;
                return Ok(report);
            }
        }

        // Thin boundaries around the forward base.
        if let Some(main) = self.st.main {
            let thin = {
                let view = TerritoryView::new(&snap, &self.st.rings);
                view.boundaries(main).into_iter().find(|id| {
                    snap.node(*id)
                        .is_some_and(|n| n.troops < self.st.boundary_target)
                })
            };
            if let Some(id) = thin {
                place(id, &mut report)?;
                return Ok(report);
            }
            // The forward base's own garrison.
            if snap
                .node(main)
                .is_some_and(|n| n.is_owned_by(me) && n.troops < self.cfg.main_garrison)
            {
                place(main, &mut report)?;
                return Ok(report);
            }
        }

        // Everything else banks on the fortress.
        if let Some(fort) = self.st.fort {
            place(fort, &mut report)?;
            return Ok(report);
        }
        if let Some(node) = snap.mine().first() {
            let id = node.id;
            place(id, &mut report)?;
            return Ok(report);
        }
        report.aborted = true;
        Ok(report)
    }

    fn take_turn(&mut self, client: &mut dyn GameClient) -> Result<DecisionReport, FetchError> {
        let mut report = DecisionReport::default();
        let turn = client.turn_number()?.turn_number;
        let player_turn = self.player_turn(turn);
        let me = self.ensure_identity(client)?;
        if player_turn > self.cfg.opening_turns && !self.st.boundary_raised {
            self.st.boundary_target += 1;
            self.st.boundary_raised = true;
        }
        let mut snap = Snapshot::load(client, me)?;
        self.st.rings.extend_to(&snap, player_turn);
        debug!(turn, player_turn, %me, "main-phase turn");

        if !self.retarget_main(&snap) {
            report.aborted = true;
            debug!("nothing owned; giving the turn up");
            return Ok(report);
        }

        self.place_phase(client, &mut snap, &mut report)?;
        client.next_state()?;
        self.attack_phase(client, &mut snap, &mut report)?;
        client.next_state()?;
        self.move_phase(client, &mut snap, &mut report)?;
        client.next_state()?;
        self.fort_phase(client, &mut snap, &mut report)?;
        client.next_state()?;
        // Phase five exists only to close the cycle.
        client.next_state()?;

        if self.cfg.alternate_posture {
            self.st.posture = match self.st.posture {
                Posture::Attack => Posture::Defend,
                Posture::Defend => Posture::Attack,
            };
        }
        Ok(report)
    }
}
