use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use blackjack_rl::calculation::ProbabilityEngine;
use blackjack_rl::qtable::QTable;
use blackjack_rl::simulation::DefaultGame;
use blackjack_rl::state::GameState;
use blackjack_rl::trainer::{EpsilonGreedy, QLearner, TrainingReport};
use blackjack_rl::Rule;
use blackjack_rl_drivers::{
    init_logging, load_config, load_table, save_checkpoint, train_batch, LoadPolicy,
};
use clap::Parser;
use log::{error, info, warn};

#[derive(Debug, Parser)]
#[command(author, about, long_about = None)]
struct CommandLineArgs {
    /// The path of the config file, ~/.blackjack_rl.yml by default
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Where the table is loaded from and saved to, overriding the config
    #[arg(short, long)]
    table: Option<PathBuf>,
    /// Stop after this many batches instead of waiting for Ctrl+C or SIGTERM
    #[arg(short, long)]
    batches: Option<u64>,
}

async fn checkpoint(table: QTable<GameState>, path: PathBuf) {
    if let Err(e) = tokio::task::spawn_blocking(move || save_checkpoint(&table, &path)).await {
        error!("Checkpoint task failed: {}", e);
    }
}

/// Ctrl+C and SIGTERM stop the run after the current batch. SIGUSR1 asks for a checkpoint.
fn listen_to_signals(interrupted: Arc<AtomicBool>, checkpoint_due: Arc<AtomicBool>) {
    {
        let interrupted = Arc::clone(&interrupted);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current batch");
                interrupted.store(true, Ordering::SeqCst);
            }
        });
    }
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::spawn(async move {
                    if terminate.recv().await.is_some() {
                        warn!("SIGTERM received, stopping after the current batch");
                        interrupted.store(true, Ordering::SeqCst);
                    }
                });
            }
            Err(e) => error!("Cannot listen to SIGTERM: {}", e),
        }
        match signal(SignalKind::user_defined1()) {
            Ok(mut user_defined1) => {
                tokio::spawn(async move {
                    while user_defined1.recv().await.is_some() {
                        info!("SIGUSR1 received, checkpoint after the current batch");
                        checkpoint_due.store(true, Ordering::SeqCst);
                    }
                });
            }
            Err(e) => error!("Cannot listen to SIGUSR1: {}", e),
        }
    }
    #[cfg(not(unix))]
    drop(checkpoint_due);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CommandLineArgs::parse();
    let config = load_config(args.config.as_deref())?;
    init_logging(&config.logging)?;

    let rule: Rule = config.rule.clone().try_into()?;
    let trainer = config.trainer;
    let table_path = args.table.unwrap_or(trainer.q_table_path.clone());
    // A missing table starts a fresh run, a corrupt one must not be overwritten.
    let table = load_table::<GameState>(&table_path, &trainer.actions, LoadPolicy::FallbackEmpty)
        .with_context(|| format!("loading {:?}", table_path))?;

    let engine = Arc::new(ProbabilityEngine::default());
    let (environment, policy) = match trainer.seed {
        Some(seed) => (
            DefaultGame::seeded(&rule, engine, seed)?,
            EpsilonGreedy::seeded(trainer.epsilon, seed)?,
        ),
        None => (
            DefaultGame::with_engine(&rule, engine)?,
            EpsilonGreedy::new(trainer.epsilon)?,
        ),
    };
    let mut learner = QLearner::new(
        table,
        environment,
        policy,
        trainer.reward_table()?,
        trainer.alpha,
        trainer.gamma,
    )?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let checkpoint_due = Arc::new(AtomicBool::new(false));
    listen_to_signals(Arc::clone(&interrupted), Arc::clone(&checkpoint_due));
    {
        let checkpoint_due = Arc::clone(&checkpoint_due);
        let period = Duration::from_secs(trainer.checkpoint_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                checkpoint_due.store(true, Ordering::SeqCst);
            }
        });
    }

    info!(
        "Training on {} deck(s), alpha {}, gamma {}, epsilon {}",
        rule.number_of_decks, trainer.alpha, trainer.gamma, trainer.epsilon
    );
    let mut total = TrainingReport::default();
    let mut batches = 0;
    while !interrupted.load(Ordering::SeqCst) && args.batches.map_or(true, |n| batches < n) {
        let episodes = trainer.episodes_per_batch;
        // The learner stays here, so nothing a batch does can take the table away.
        let result = tokio::task::block_in_place(|| train_batch(&mut learner, episodes));
        batches += 1;
        match result {
            Ok(report) => total.merge(&report),
            Err(e) => error!("Batch {} failed: {}", batches, e),
        }

        if checkpoint_due.swap(false, Ordering::SeqCst) {
            checkpoint(learner.snapshot(), table_path.clone()).await;
        }
    }

    info!(
        "Trained {} episode(s) over {} round(s), total reward {:.1}",
        total.episodes,
        total.rounds(),
        total.total_reward
    );
    let table = learner.into_table();
    tokio::task::spawn_blocking(move || table.save(&table_path))
        .await?
        .context("saving the table")
}
