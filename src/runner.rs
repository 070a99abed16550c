//! Drives full offline games: one bot instance per seat, opening
//! decisions then main-phase turns, metrics out the other end.

use anyhow::{anyhow, Result};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::arena::{ArenaConfig, LocalArena, MapSpec};
use crate::bots::{bot_fingerprint, create_bot, ConquestBot};
use crate::snapshot::PlayerId;

#[derive(Clone, Debug, Serialize)]
pub struct MatchConfig {
    pub players: u8,
    pub opening_turns: u32,
    pub main_turns: u32,
    pub node_count: u32,
    pub strategic_count: u32,
    pub extra_chords: u32,
    pub base_reserve: u32,
    pub seed: u32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            players: 3,
            opening_turns: 35,
            main_turns: 20,
            node_count: 40,
            strategic_count: 6,
            extra_chords: 10,
            base_reserve: 3,
            seed: 7,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SeatReport {
    pub bot_id: String,
    pub bot_fingerprint: String,
    pub player: u8,
    pub nodes_owned: u32,
    pub troops: u32,
    pub strategic_owned: u32,
    pub fortress_built: bool,
    pub attacks: u32,
    pub captures: u32,
    pub troops_placed: u32,
    pub failed_decisions: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct MatchReport {
    pub seed: u32,
    pub turns_played: u32,
    /// Seat with strictly the most nodes, if any.
    pub winner: Option<u8>,
    pub seats: Vec<SeatReport>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BatchReport {
    pub games: u32,
    pub win_rates: Vec<f64>,
    pub avg_nodes_owned: Vec<f64>,
    pub avg_captures: Vec<f64>,
    pub failed_decisions: u32,
    pub matches: Vec<MatchReport>,
}

/// Play one full offline game. `bot_ids` are assigned to seats
/// round-robin, so a single id fills every seat with an independent
/// instance of the same policy.
pub fn run_match(bot_ids: &[String], cfg: &MatchConfig) -> Result<MatchReport> {
    if bot_ids.is_empty() {
        return Err(anyhow!("at least one bot id is required"));
    }
    if cfg.players == 0 {
        return Err(anyhow!("players must be > 0"));
    }

    let mut bots: Vec<(String, Box<dyn ConquestBot>)> = Vec::new();
    for seat in 0..cfg.players {
        let id = &bot_ids[usize::from(seat) % bot_ids.len()];
        let mut bot = create_bot(id).ok_or_else(|| anyhow!("unknown bot '{id}'"))?;
        bot.reset(cfg.seed ^ u32::from(seat).wrapping_mul(0x9E37_79B9));
        bots.push((id.clone(), bot));
    }

    let spec = MapSpec::generate(
        cfg.seed,
        cfg.node_count,
        cfg.strategic_count,
        cfg.extra_chords,
    );
    let mut arena = LocalArena::new(
        &spec,
        ArenaConfig {
            players: cfg.players,
            opening_turns: cfg.opening_turns,
            base_reserve: cfg.base_reserve,
        },
        cfg.seed,
    );

    let seats = cfg.players as usize;
    let mut attacks = vec![0u32; seats];
    let mut captures = vec![0u32; seats];
    let mut troops_placed = vec![0u32; seats];
    let mut failed = vec![0u32; seats];

    for _ in 0..cfg.opening_turns * u32::from(cfg.players) {
        let seat = usize::from(arena.current_player().0);
        match bots[seat].1.opening_move(&mut arena) {
            Ok(report) => troops_placed[seat] += report.troops_placed,
            Err(err) => {
                warn!(seat, %err, "opening decision abandoned");
                failed[seat] += 1;
            }
        }
        arena.end_opening_turn();
    }

    for _ in 0..cfg.main_turns * u32::from(cfg.players) {
        let seat = usize::from(arena.current_player().0);
        let turn_before = arena.current_turn();
        match bots[seat].1.take_turn(&mut arena) {
            Ok(report) => {
                attacks[seat] += report.attacks;
                captures[seat] += report.captures;
                troops_placed[seat] += report.troops_placed;
            }
            Err(err) => {
                warn!(seat, %err, "turn abandoned");
                failed[seat] += 1;
            }
        }
        // A clean turn advances itself through phase five; anything
        // short of that forfeits the remainder.
        if arena.current_turn() == turn_before {
            arena.force_end_turn();
        }
    }

    let seat_reports: Vec<SeatReport> = bots
        .iter()
        .enumerate()
        .map(|(seat, (id, _))| {
            let player = PlayerId(seat as u8);
            SeatReport {
                bot_id: id.clone(),
                bot_fingerprint: bot_fingerprint(id).unwrap_or_else(|| "unknown".to_string()),
                player: seat as u8,
                nodes_owned: arena.owned_count(player),
                troops: arena.troop_total(player),
                strategic_owned: arena.strategic_owned(player),
                fortress_built: arena.fortress_built(player),
                attacks: attacks[seat],
                captures: captures[seat],
                troops_placed: troops_placed[seat],
                failed_decisions: failed[seat],
            }
        })
        .collect();

    let winner = single_leader(&seat_reports);
    let report = MatchReport {
        seed: cfg.seed,
        turns_played: arena.current_turn().saturating_sub(1),
        winner,
        seats: seat_reports,
    };
    info!(
        seed = cfg.seed,
        turns = report.turns_played,
        winner = ?report.winner,
        "match finished"
    );
    Ok(report)
}

fn single_leader(seats: &[SeatReport]) -> Option<u8> {
    let best = seats.iter().map(|s| s.nodes_owned).max()?;
    let mut leaders = seats.iter().filter(|s| s.nodes_owned == best);
    let leader = leaders.next()?;
    if leaders.next().is_some() {
        None
    } else {
        Some(leader.player)
    }
}

/// Seed-sweep evaluation; games run in parallel.
pub fn run_batch(bot_ids: &[String], base: &MatchConfig, games: u32) -> Result<BatchReport> {
    if games == 0 {
        return Err(anyhow!("games must be > 0"));
    }
    let matches: Vec<MatchReport> = (0..games)
        .into_par_iter()
        .map(|i| {
            let cfg = MatchConfig {
                seed: base.seed.wrapping_add(i),
                ..base.clone()
            };
            run_match(bot_ids, &cfg)
        })
        .collect::<Result<Vec<_>>>()?;

    let seats = usize::from(base.players);
    let mut wins = vec![0u32; seats];
    let mut nodes = vec![0u64; seats];
    let mut caps = vec![0u64; seats];
    let mut failed = 0u32;
    for report in &matches {
        if let Some(winner) = report.winner {
            wins[usize::from(winner)] += 1;
        }
        for seat in &report.seats {
            nodes[usize::from(seat.player)] += u64::from(seat.nodes_owned);
            caps[usize::from(seat.player)] += u64::from(seat.captures);
            failed += seat.failed_decisions;
        }
    }
    let games_f = f64::from(games);
    Ok(BatchReport {
        games,
        win_rates: wins.iter().map(|w| f64::from(*w) / games_f).collect(),
        avg_nodes_owned: nodes.iter().map(|n| *n as f64 / games_f).collect(),
        avg_captures: caps.iter().map(|c| *c as f64 / games_f).collect(),
        failed_decisions: failed,
        matches,
    })
}
