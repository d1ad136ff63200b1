use std::path::PathBuf;

use anyhow::Context;
use blackjack_rl::reduction::{QTableNarrower, Reducer};
use blackjack_rl::state::GameState;
use blackjack_rl_drivers::{init_logging, load_config, load_table, LoadPolicy};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReducerArg {
    Mean,
    Max,
    Mode,
    Median,
    DistanceWeighted,
}

impl From<ReducerArg> for Reducer {
    fn from(arg: ReducerArg) -> Self {
        match arg {
            ReducerArg::Mean => Reducer::Mean,
            ReducerArg::Max => Reducer::Max,
            ReducerArg::Mode => Reducer::Mode,
            ReducerArg::Median => Reducer::Median,
            ReducerArg::DistanceWeighted => Reducer::DistanceWeighted,
        }
    }
}

#[derive(Debug, Subcommand)]
enum ProjectionArg {
    /// Rounds every probability to fewer decimals
    Rerounded {
        #[arg(short, long, default_value_t = 1)]
        decimals: u8,
    },
    /// Replaces every probability by one of five categories
    Categorized,
}

/// Builds a coarser table out of a trained one.
#[derive(Debug, Parser)]
#[command(author, about, long_about = None)]
struct CommandLineArgs {
    /// The path of the config file, ~/.blackjack_rl.yml by default
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// The trained table, the one from the trainer config by default
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Where the narrowed table is written
    #[arg(short, long)]
    output: PathBuf,
    #[arg(short, long, value_enum, default_value_t = ReducerArg::Mean)]
    reducer: ReducerArg,
    /// Leave never updated values out
    #[arg(long)]
    ignore_neutral: bool,
    #[command(subcommand)]
    projection: ProjectionArg,
}

fn main() -> anyhow::Result<()> {
    let args = CommandLineArgs::parse();
    let config = load_config(args.config.as_deref())?;
    init_logging(&config.logging)?;

    let input = args.input.unwrap_or(config.trainer.q_table_path.clone());
    // The input is only read, so an unreadable table narrows to an empty one.
    let table = load_table::<GameState>(&input, &config.trainer.actions, LoadPolicy::Lenient)
        .with_context(|| format!("loading {:?}", input))?;
    let narrower = QTableNarrower::new(args.reducer.into(), args.ignore_neutral);

    match args.projection {
        ProjectionArg::Rerounded { decimals } => narrower
            .narrow_rerounded(&table, decimals)?
            .save(&args.output),
        ProjectionArg::Categorized => narrower.narrow_categorized(&table)?.save(&args.output),
    }
    .with_context(|| format!("saving {:?}", args.output))?;
    info!("Narrowed table written to {:?}", args.output);
    Ok(())
}
