pub mod agent;
pub mod arena;
pub mod calculation;
mod error;
pub mod qtable;
pub mod recommend;
pub mod reduction;
pub mod simulation;
pub mod state;
mod statearray;
pub mod trainer;

use serde_enum_str::{Deserialize_enum_str, Serialize_enum_str};
use strum_macros::EnumIter;

pub use error::{BlackjackError, Result};
pub use statearray::{CardCount, CompositionMemo};

/// The table rule of a game. Only the rules the environment actually plays are kept here.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rule {
    pub number_of_decks: u8,
    /// The shoe stays playable while at least this share of its initial cards remains.
    pub min_remaining_proportion: f64,
    pub dealer_hit_on_soft17: bool,
}

impl Rule {
    pub fn new(number_of_decks: u8) -> Result<Self> {
        let rule = Rule {
            number_of_decks,
            ..Default::default()
        };
        rule.validate()?;
        Ok(rule)
    }

    pub fn validate(&self) -> Result<()> {
        if self.number_of_decks < 1 {
            return Err(BlackjackError::InvalidQuantity {
                name: "number_of_decks",
                value: self.number_of_decks.to_string(),
            });
        }
        if !(self.min_remaining_proportion > 0.0 && self.min_remaining_proportion <= 1.0) {
            return Err(BlackjackError::InvalidQuantity {
                name: "min_remaining_proportion",
                value: self.min_remaining_proportion.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for Rule {
    fn default() -> Self {
        Rule {
            number_of_decks: 1,
            min_remaining_proportion: 0.25,
            dealer_hit_on_soft17: false,
        }
    }
}

/// Everything a player may ask the dealer for. Which of them are legal depends on the environment.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    Serialize_enum_str,
    Deserialize_enum_str,
)]
pub enum Action {
    Stand,
    Hit,
    Double,
    Surrender,
    Split,
}

/// Outcome of a single `play` call.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, Serialize_enum_str, Deserialize_enum_str,
)]
pub enum RoundResult {
    /// The round goes on and the player must act again.
    WaitAction,
    Blackjack,
    Wins,
    Push,
    Loss,
    Bust,
}

impl RoundResult {
    pub fn is_round_over(&self) -> bool {
        *self != RoundResult::WaitAction
    }
}
