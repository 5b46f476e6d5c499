#![forbid(unsafe_code)]
//! Runs the mining simulation against a single in-process ledger.

use clap::Parser;
use colored::*;
use powledger::config::load_config;
use powledger::miner::MinerEvent;
use powledger::simulation::Simulation;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when it does not exist
    #[arg(long, default_value = "powledger.toml")]
    config: PathBuf,
    /// Number of miner agents
    #[arg(long)]
    agents: Option<usize>,
    /// Leading zero hex digits required of a proof of work
    #[arg(long)]
    difficulty: Option<u32>,
    /// Seconds to wait for the chain to reach its expected length
    #[arg(long)]
    timeout: Option<u64>,
    /// Keep the fixture in memory instead of writing the JSON file
    #[arg(long)]
    no_fixture_file: bool,
    /// Print both pools when the run finishes
    #[arg(long)]
    display: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {}", "error:".bright_red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let mut config = load_config(&cli.config)?;
    if let Some(agents) = cli.agents {
        config.miner.agents = agents;
    }
    if let Some(difficulty) = cli.difficulty {
        config.ledger.difficulty = difficulty;
    }
    if let Some(timeout) = cli.timeout {
        config.simulation.timeout_secs = timeout;
    }
    if cli.no_fixture_file {
        config.simulation.fixture_path = None;
    }

    println!("{}", "powledger simulation".bright_cyan().bold());
    println!("{}", "--------------------".bright_cyan());
    println!(
        "  agents: {}   difficulty: {}",
        config.miner.agents.to_string().bright_white(),
        config.ledger.difficulty.to_string().bright_white()
    );
    println!();

    let report = Simulation::new(config)?.run()?;

    for event in &report.events {
        match event {
            MinerEvent::Appended { agent, id } => {
                println!("  {} miner-{} appended {}...", "+".bright_green(), agent, id.get(..10).unwrap_or(id))
            }
            MinerEvent::Evicted { agent, id } => {
                println!("  {} miner-{} evicted {}...", "x".yellow(), agent, id.get(..10).unwrap_or(id))
            }
            MinerEvent::Halted { agent, error } => {
                println!("  {} miner-{} halted: {}", "!".bright_red(), agent, error)
            }
            MinerEvent::Stopped { .. } => {}
        }
    }
    println!();

    let status = if report.converged {
        "converged".bright_green().bold()
    } else {
        "timed out".bright_red().bold()
    };
    println!("{} {}", "Result:".bright_green().underline(), status);
    println!(
        "  verified: {}/{}   pending: {}   elapsed: {:.2}s",
        report.verified.len(),
        report.expected_chain_length,
        report.pending,
        report.elapsed.as_secs_f64()
    );
    println!(
        "  appended: {}   hashes: {}   halted agents: {}",
        report.total_appended(),
        report.total_hashes(),
        report.halted.len()
    );

    if cli.display {
        println!("{}", report.ledger_display);
    }

    Ok(report.converged && report.halted.is_empty())
}
