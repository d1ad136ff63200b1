use anyhow::anyhow;
use blackjack_rl::qtable::QTable;
use blackjack_rl::simulation::GameEnvironment;
use blackjack_rl::state::TableState;
use blackjack_rl::trainer::{ExplorationPolicy, QLearner, RewardTable, TrainingReport};
use blackjack_rl::{Action, BlackjackError, RoundResult, Rule};
use log::{error, info, warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = ".blackjack_rl.yml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] BlackjackError),
    #[error("invalid log level '{0}'")]
    LogLevel(String),
    #[error("cannot find home directory")]
    NoHomeDirectory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rule: ConfigRule,
    #[serde(default)]
    pub trainer: ConfigTrainer,
    #[serde(default)]
    pub simulator: ConfigSimulator,
    #[serde(default)]
    pub logging: ConfigLogging,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRule {
    pub number_of_decks: u8,
    pub min_remaining_proportion: f64,
    pub dealer_hit_on_soft17: bool,
}

impl Default for ConfigRule {
    fn default() -> Self {
        let rule = Rule::default();
        ConfigRule {
            number_of_decks: rule.number_of_decks,
            min_remaining_proportion: rule.min_remaining_proportion,
            dealer_hit_on_soft17: rule.dealer_hit_on_soft17,
        }
    }
}

impl TryInto<Rule> for ConfigRule {
    type Error = ConfigError;

    fn try_into(self) -> Result<Rule, Self::Error> {
        let rule = Rule {
            number_of_decks: self.number_of_decks,
            min_remaining_proportion: self.min_remaining_proportion,
            dealer_hit_on_soft17: self.dealer_hit_on_soft17,
        };
        rule.validate()?;
        Ok(rule)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigTrainer {
    pub alpha: f64,
    pub gamma: f64,
    pub epsilon: f64,
    /// Column order of the table.
    pub actions: Vec<Action>,
    pub rewards: HashMap<RoundResult, f64>,
    pub episodes_per_batch: u64,
    pub checkpoint_interval_secs: u64,
    pub q_table_path: PathBuf,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl ConfigTrainer {
    pub fn reward_table(&self) -> Result<RewardTable, ConfigError> {
        Ok(RewardTable::new(self.rewards.clone())?)
    }
}

impl Default for ConfigTrainer {
    fn default() -> Self {
        let rewards = RewardTable::default();
        ConfigTrainer {
            alpha: 0.1,
            gamma: 0.9,
            epsilon: 0.1,
            actions: vec![Action::Stand, Action::Hit],
            rewards: <RoundResult as strum::IntoEnumIterator>::iter()
                .map(|result| (result, rewards.reward(result)))
                .collect(),
            episodes_per_batch: 100,
            checkpoint_interval_secs: 300,
            q_table_path: PathBuf::from("q_table.bin"),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSimulator {
    /// Shoes played per agent, endless when absent.
    pub iterations: Option<u64>,
    pub report_interval_ms: u64,
}

impl Default for ConfigSimulator {
    fn default() -> Self {
        ConfigSimulator {
            iterations: Some(1000),
            report_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigLogging {
    pub directory: PathBuf,
    pub level: String,
}

impl ConfigLogging {
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.level
            .parse()
            .map_err(|_| ConfigError::LogLevel(self.level.clone()))
    }
}

impl Default for ConfigLogging {
    fn default() -> Self {
        ConfigLogging {
            directory: PathBuf::from("logs"),
            level: String::from("info"),
        }
    }
}

pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(content)?;
    config.logging.level_filter()?;
    Ok(config)
}

/// Reads the content of a given config file and parses it to a Config.
pub fn parse_config_from_file(filename: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(filename).map_err(|source| ConfigError::Read {
        path: filename.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// An explicit path must exist. Without one, `~/.blackjack_rl.yml` is used when present
/// and the built-in defaults otherwise.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = explicit {
        return parse_config_from_file(path);
    }
    let home_dir = home::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
    let default_path = home_dir.join(DEFAULT_CONFIG_FILE);
    if default_path.is_file() {
        parse_config_from_file(&default_path)
    } else {
        Ok(Config::default())
    }
}

/// Terminal at the configured level, plus a DEBUG file per run under the configured directory.
pub fn init_logging(logging: &ConfigLogging) -> anyhow::Result<()> {
    let level = logging.level_filter()?;
    fs::create_dir_all(&logging.directory)?;
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs();
    let file = simplelog::WriteLogger::new(
        LevelFilter::Debug,
        config.clone(),
        fs::File::create(logging.directory.join(format!("{}.log", time)))?,
    );
    let term = simplelog::TermLogger::new(
        level,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file])?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Any failure is an error.
    Strict,
    /// A missing file gives an empty table. A corrupt one is still an error.
    FallbackEmpty,
    /// A missing or corrupt file gives an empty table. Only for tools that never write
    /// back to the file they read.
    Lenient,
}

pub fn load_table<S: TableState>(
    path: &Path,
    actions: &[Action],
    policy: LoadPolicy,
) -> Result<QTable<S>, BlackjackError> {
    match (QTable::load(path, actions), policy) {
        (Ok(table), _) => {
            info!("Loaded {} state(s) from {:?}", table.len(), path);
            Ok(table)
        }
        (Err(BlackjackError::Io(e)), LoadPolicy::FallbackEmpty | LoadPolicy::Lenient)
            if e.kind() == std::io::ErrorKind::NotFound =>
        {
            warn!("No table at {:?}, starting from an empty one", path);
            QTable::new(actions)
        }
        (Err(BlackjackError::CorruptTable(reason)), LoadPolicy::Lenient) => {
            warn!("Ignoring corrupt table {:?} ({}), using an empty one", path, reason);
            QTable::new(actions)
        }
        (Err(e), _) => Err(e),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Runs one batch of training. A panic inside the batch is turned into an error, and the
/// learner keeps the table as it was when the panic happened.
pub fn train_batch<E, P>(
    learner: &mut QLearner<E, P>,
    episodes: u64,
) -> anyhow::Result<TrainingReport>
where
    E: GameEnvironment,
    E::State: TableState,
    P: ExplorationPolicy,
{
    match panic::catch_unwind(AssertUnwindSafe(|| learner.train(episodes))) {
        Ok(report) => Ok(report?),
        Err(payload) => Err(anyhow!("training panicked: {}", panic_message(payload.as_ref()))),
    }
}

/// Saves a checkpoint, logging instead of failing. Returns whether the table was written.
pub fn save_checkpoint<S: TableState>(table: &QTable<S>, path: &Path) -> bool {
    match table.save(path) {
        Ok(()) => true,
        Err(e) => {
            error!("Checkpoint to {:?} failed: {}", path, e);
            false
        }
    }
}
