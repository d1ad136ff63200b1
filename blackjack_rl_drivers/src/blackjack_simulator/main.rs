mod simulation;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use blackjack_rl::agent::{Agent, BasicStrategyAgent, QTableAgent};
use blackjack_rl::state::GameState;
use blackjack_rl_drivers::{init_logging, load_config, load_table, LoadPolicy};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, about, long_about = None)]
struct CommandLineArgs {
    /// The path of the config file, ~/.blackjack_rl.yml by default
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// The trained table, the one from the trainer config by default
    #[arg(short, long)]
    table: Option<PathBuf>,
    /// Shoes played per agent, overriding the config
    #[arg(short, long)]
    iterations: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let args = CommandLineArgs::parse();
    let mut config = load_config(args.config.as_deref())?;
    init_logging(&config.logging)?;
    if args.iterations.is_some() {
        config.simulator.iterations = args.iterations;
    }

    let rule: blackjack_rl::Rule = config.rule.clone().try_into()?;
    let table_path = args.table.unwrap_or(config.trainer.q_table_path.clone());
    let table = load_table::<GameState>(&table_path, &config.trainer.actions, LoadPolicy::Strict)
        .with_context(|| format!("loading {:?}", table_path))?;

    let agents: Vec<(&str, Arc<dyn Agent>)> = vec![
        ("Q-table", Arc::new(QTableAgent::new(Arc::new(table)))),
        ("Basic strategy", Arc::new(BasicStrategyAgent::default())),
    ];
    simulation::simulate_side_by_side(&rule, agents, &config.simulator)
}
