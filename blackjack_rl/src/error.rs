use crate::{Action, RoundResult};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BlackjackError>;

#[derive(Debug, Error)]
pub enum BlackjackError {
    #[error("invalid rank {0}, only [2, 10] is available")]
    InvalidRank(u8),
    #[error("invalid quantity for {name}: {value}")]
    InvalidQuantity { name: &'static str, value: String },
    #[error("all cards in the deck have already been used")]
    EmptyDeck,
    #[error("action {0} is not available here")]
    InvalidAction(Action),
    #[error("a Q-table needs 2 or more actions, got {0}")]
    TooFewActions(usize),
    #[error("corrupt Q-table: {0}")]
    CorruptTable(String),
    #[error("invalid card set: {0}")]
    InvalidCardSet(String),
    #[error("invalid card name: '{0}'")]
    InvalidCardToken(String),
    #[error("{name} must be in [0, 1], got {value}")]
    OutOfRangeHyperparameter { name: &'static str, value: f64 },
    #[error("no reward configured for {0}")]
    MissingReward(RoundResult),
    #[error("{0}")]
    WrongPhase(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
