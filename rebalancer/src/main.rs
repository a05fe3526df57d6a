//! CLI entry point for the basketbook rebalance keeper.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use basketbook_rebalancer::config::Config;
use basketbook_rebalancer::error::Error;
use basketbook_rebalancer::execution::{self, RunOptions};
use basketbook_rebalancer::scenario::Scenario;

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Rebalance keeper: trades a basket toward its target units")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan, confirm, and trade until targets are met
    Run {
        /// Path to scenario.json
        scenario: PathBuf,

        /// Show plan without trading
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt (for automation/cron)
        #[arg(long)]
        force: bool,

        /// Override bot.max_rounds
        #[arg(long)]
        max_rounds: Option<usize>,
    },

    /// Show the next trade of every component
    Plan {
        /// Path to scenario.json
        scenario: PathBuf,
    },

    /// Compare current units against scaled targets
    Targets {
        /// Path to scenario.json
        scenario: PathBuf,
    },
}

fn load_scenario(path: &Path) -> Scenario {
    match Scenario::load(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading scenario: {e}");
            process::exit(1);
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Run {
            scenario,
            dry_run,
            force,
            max_rounds,
        } => {
            let loaded = load_scenario(&scenario);
            let opts = RunOptions {
                dry_run,
                force,
                scenario_file: scenario.display().to_string(),
                max_rounds,
            };
            execution::run(&config, &loaded, &opts).map(|summary| {
                if !summary.targets_met {
                    eprintln!("Warning: run ended with targets not met");
                }
            })
        }
        Command::Plan { scenario } => execution::plan(&config, &load_scenario(&scenario)),
        Command::Targets { scenario } => execution::targets(&config, &load_scenario(&scenario)),
    };

    if let Err(e) = result {
        match &e {
            Error::Aborted(msg) => {
                eprintln!("Aborted: {msg}");
                process::exit(0);
            }
            e if e.is_rule_violation() => {
                eprintln!("\nRejected: {e}");
                process::exit(2);
            }
            _ => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}
