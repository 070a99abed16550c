pub mod warden;

use serde::{Deserialize, Serialize};

use crate::client::GameClient;
use crate::error::FetchError;
use warden::WardenBot;

/// A bot that plays one seat of a conquest game.
///
/// The driver calls `opening_move` once per decision point during the
/// initialization phase and `take_turn` once per owned turn afterwards;
/// both run to completion before returning. An `Err` means the decision
/// is abandoned; the driver skips it and calls back in next time.
pub trait ConquestBot {
    fn id(&self) -> &str;
    fn description(&self) -> &str;
    /// Forget everything from the previous game.
    fn reset(&mut self, seed: u32);
    fn opening_move(&mut self, client: &mut dyn GameClient)
        -> Result<DecisionReport, FetchError>;
    fn take_turn(&mut self, client: &mut dyn GameClient) -> Result<DecisionReport, FetchError>;
}

/// What one decision point actually issued.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct DecisionReport {
    pub placements: u32,
    pub troops_placed: u32,
    pub attacks: u32,
    pub captures: u32,
    pub moves: u32,
    pub fortified: bool,
    /// No legal action anywhere; the turn was given up gracefully.
    pub aborted: bool,
}

/// Result of one unit of phase work. Replaces exception-style early
/// returns: the phase loop interprets these instead of unwinding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Keep working through this phase's priorities.
    Continue,
    /// Budget spent; stop issuing commands and advance the phase.
    AdvancePhase,
    /// Nothing legal to do; give the phase up without a command.
    Abort,
}

/// How the attack phase ranks enemy neighbors. The historical bot
/// revisions disagreed; both readings survive as configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetRule {
    /// Hit the biggest garrison first (break the strongest threat).
    Strongest,
    /// Hit the smallest garrison first (cheapest capture).
    Weakest,
}

/// Interior reinforcement targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReinforceFormula {
    /// `⌊level × 1.5⌋ + 1` troops for nodes at hop distance `level`.
    DistanceDecay,
    /// A flat garrison everywhere inside the border.
    Flat,
}

/// Every tunable of the policy engine. Presets below; arbitrary
/// combinations load through `tuned:<path>`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Seats in the game; the wire has no query for this.
    pub players: u32,
    /// Player-turns that count as the opening phase.
    pub opening_turns: u32,
    /// Stop claiming ordinary nodes once we hold this many.
    pub opening_ordinary_cap: u32,
    pub main_garrison: u32,
    /// Boundary garrison target; raised by one after the opening.
    pub boundary_garrison: u32,
    pub interior_garrison: u32,
    /// Flat garrison dropped on unclaimed strategic nodes.
    pub strategic_minimum: u32,
    /// Ordinary troops left on the fortress after fortifying.
    pub fort_reserve: u32,
    /// Minimum origin troops to open or continue an attack.
    pub attack_min_troops: u32,
    pub attack_win_param: f64,
    pub attack_continue_param: f64,
    pub target_rule: TargetRule,
    pub interior_formula: ReinforceFormula,
    /// Alternate attack turns with consolidation turns.
    pub alternate_posture: bool,
    /// Decimal places kept in frontier pressure weights.
    pub pressure_precision: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::classic()
    }
}

impl PolicyConfig {
    pub fn classic() -> Self {
        Self {
            players: 3,
            opening_turns: 35,
            opening_ordinary_cap: 10,
            main_garrison: 4,
            boundary_garrison: 2,
            interior_garrison: 2,
            strategic_minimum: 2,
            fort_reserve: 2,
            attack_min_troops: 3,
            attack_win_param: 0.95,
            attack_continue_param: 0.5,
            target_rule: TargetRule::Strongest,
            interior_formula: ReinforceFormula::DistanceDecay,
            alternate_posture: true,
            pressure_precision: 3,
        }
    }

    pub fn vanguard() -> Self {
        Self {
            boundary_garrison: 3,
            target_rule: TargetRule::Weakest,
            interior_formula: ReinforceFormula::Flat,
            alternate_posture: false,
            ..Self::classic()
        }
    }
}

pub fn bot_ids() -> Vec<&'static str> {
    vec!["warden-classic", "warden-vanguard"]
}

pub fn describe_bots() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "warden-classic",
            "Fortress-and-frontier engine: threat-weighted placement, strongest-neighbor attacks, posture alternation.",
        ),
        (
            "warden-vanguard",
            "Aggressive tuning: flat interior garrisons, weakest-neighbor captures, attacks every turn.",
        ),
    ]
}

pub fn create_bot(id: &str) -> Option<Box<dyn ConquestBot>> {
    let (cfg, description) = config_for(id)?;
    Some(Box::new(WardenBot::new(id, description, cfg)))
}

/// Stable hash of the bot's full configuration, for reproducibility
/// records alongside run metrics.
pub fn bot_fingerprint(id: &str) -> Option<String> {
    let (cfg, _) = config_for(id)?;
    let encoded = serde_json::to_string(&cfg).ok()?;
    Some(format!("{:016x}", fnv1a64(encoded.as_bytes())))
}

#[derive(Clone, Debug, Serialize)]
pub struct BotManifestEntry {
    pub id: String,
    pub family: String,
    pub description: String,
    pub config_hash: String,
    pub config: serde_json::Value,
}

pub fn bot_manifest() -> Vec<BotManifestEntry> {
    describe_bots()
        .into_iter()
        .filter_map(|(id, description)| {
            let (cfg, _) = config_for(id)?;
            Some(BotManifestEntry {
                id: id.to_string(),
                family: id.split('-').next().unwrap_or(id).to_string(),
                description: description.to_string(),
                config_hash: bot_fingerprint(id)?,
                config: serde_json::to_value(cfg).ok()?,
            })
        })
        .collect()
}

fn config_for(id: &str) -> Option<(PolicyConfig, String)> {
    match id {
        "warden-classic" => Some((
            PolicyConfig::classic(),
            describe(id).to_string(),
        )),
        "warden-vanguard" => Some((
            PolicyConfig::vanguard(),
            describe(id).to_string(),
        )),
        _ => try_load_tuned_config(id),
    }
}

fn describe(id: &str) -> &'static str {
    describe_bots()
        .into_iter()
        .find(|(known, _)| *known == id)
        .map(|(_, description)| description)
        .unwrap_or("")
}

/// `tuned:<path>` loads a full or partial [`PolicyConfig`] from a JSON
/// file; missing fields fall back to the classic preset.
fn try_load_tuned_config(id: &str) -> Option<(PolicyConfig, String)> {
    let path = id.strip_prefix("tuned:")?;
    let raw = std::fs::read_to_string(path).ok()?;
    let cfg: PolicyConfig = serde_json::from_str(&raw).ok()?;
    Some((cfg, format!("Tuned policy loaded from {path}")))
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
