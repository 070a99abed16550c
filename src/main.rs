use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use conquest_autopilot::bots::{bot_manifest, describe_bots};
use conquest_autopilot::runner::{run_batch, run_match, MatchConfig};

#[derive(Parser)]
#[command(
    name = "conquest-autopilot",
    about = "Offline evaluation harness for conquest bots"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the bot roster.
    List {
        /// Emit the full manifest as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Play one offline match and print the outcome.
    Run {
        /// Bot ids assigned to seats round-robin.
        #[arg(long = "bot", default_value = "warden-classic")]
        bots: Vec<String>,
        #[arg(long, default_value_t = 7)]
        seed: u32,
        #[arg(long, default_value_t = 3)]
        players: u8,
        #[arg(long, default_value_t = 35)]
        opening_turns: u32,
        #[arg(long, default_value_t = 20)]
        main_turns: u32,
        #[arg(long, default_value_t = 40)]
        nodes: u32,
        #[arg(long, default_value_t = 6)]
        strategic: u32,
        /// Write the full match report as JSON.
        #[arg(long)]
        json_out: Option<PathBuf>,
    },
    /// Sweep seeds and aggregate win rates.
    Batch {
        #[arg(long = "bot", default_value = "warden-classic")]
        bots: Vec<String>,
        #[arg(long, default_value_t = 7)]
        seed: u32,
        #[arg(long, default_value_t = 16)]
        games: u32,
        #[arg(long, default_value_t = 3)]
        players: u8,
        #[arg(long)]
        json_out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match Cli::parse().command {
        Command::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&bot_manifest())?);
            } else {
                for (id, description) in describe_bots() {
                    println!("{id:<18} {description}");
                }
            }
        }
        Command::Run {
            bots,
            seed,
            players,
            opening_turns,
            main_turns,
            nodes,
            strategic,
            json_out,
        } => {
            let cfg = MatchConfig {
                players,
                opening_turns,
                main_turns,
                node_count: nodes,
                strategic_count: strategic,
                seed,
                ..MatchConfig::default()
            };
            let report = run_match(&bots, &cfg)?;
            for seat in &report.seats {
                println!(
                    "seat {} ({}): {} nodes, {} troops, {} strategic, {} captures{}",
                    seat.player,
                    seat.bot_id,
                    seat.nodes_owned,
                    seat.troops,
                    seat.strategic_owned,
                    seat.captures,
                    if seat.fortress_built { ", fortress up" } else { "" },
                );
            }
            match report.winner {
                Some(winner) => println!("winner: seat {winner}"),
                None => println!("no single leader"),
            }
            if let Some(path) = json_out {
                fs::write(&path, serde_json::to_vec_pretty(&report)?)
                    .with_context(|| format!("writing report to {}", path.display()))?;
            }
        }
        Command::Batch {
            bots,
            seed,
            games,
            players,
            json_out,
        } => {
            let cfg = MatchConfig {
                players,
                seed,
                ..MatchConfig::default()
            };
            let report = run_batch(&bots, &cfg, games)?;
            for (seat, rate) in report.win_rates.iter().enumerate() {
                println!(
                    "seat {seat}: win rate {rate:.2}, avg nodes {:.1}, avg captures {:.1}",
                    report.avg_nodes_owned[seat], report.avg_captures[seat],
                );
            }
            if report.failed_decisions > 0 {
                println!("{} decisions abandoned across the batch", report.failed_decisions);
            }
            if let Some(path) = json_out {
                fs::write(&path, serde_json::to_vec_pretty(&report)?)
                    .with_context(|| format!("writing report to {}", path.display()))?;
            }
        }
    }
    Ok(())
}
