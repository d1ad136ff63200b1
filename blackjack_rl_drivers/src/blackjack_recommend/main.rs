use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use blackjack_rl::calculation::ProbabilityEngine;
use blackjack_rl::recommend::{Recommender, StateQuery};
use blackjack_rl::state::GameState;
use blackjack_rl_drivers::{init_logging, load_config, load_table, LoadPolicy};
use clap::Parser;

/// Asks a trained table what to do with a given hand.
#[derive(Debug, Parser)]
#[command(author, about, long_about = None)]
struct CommandLineArgs {
    /// The path of the config file, ~/.blackjack_rl.yml by default
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// The trained table, the one from the trainer config by default
    #[arg(short, long)]
    table: Option<PathBuf>,
    /// Player cards, e.g. `--player 10 6`
    #[arg(short, long, num_args = 1.., required = true)]
    player: Vec<String>,
    /// The dealer open card
    #[arg(short, long)]
    dealer: String,
    /// Decks in the shoe, the configured rule by default
    #[arg(long)]
    decks: Option<u8>,
    /// Cards already played from the shoe
    #[arg(short, long, num_args = 0..)]
    used: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let args = CommandLineArgs::parse();
    let config = load_config(args.config.as_deref())?;
    init_logging(&config.logging)?;

    let table_path = args.table.unwrap_or(config.trainer.q_table_path.clone());
    let table = load_table::<GameState>(&table_path, &config.trainer.actions, LoadPolicy::Strict)
        .with_context(|| format!("loading {:?}", table_path))?;
    let recommender = Recommender::new(
        Arc::new(table),
        Arc::new(ProbabilityEngine::default()),
        config.rule.dealer_hit_on_soft17,
    );

    let query = StateQuery::parse(
        &args.player,
        &args.dealer,
        args.decks.unwrap_or(config.rule.number_of_decks),
        &args.used,
    )?;
    let (state, action) = recommender.recommend(&query)?;
    println!("State: {}", state);
    match recommender.resolved_state(&state) {
        Some(known) if known != state => println!("Closest known state: {}", known),
        Some(_) => {}
        None => println!("The table knows no comparable state"),
    }
    println!("Recommended action: {}", action);
    Ok(())
}
