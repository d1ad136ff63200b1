use std::fmt;
use std::hash::Hash;

use crate::calculation::ProbabilityEngine;
use crate::simulation::{deck::Deck, hand::Hand, Card};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A state a Q-table can be keyed by. `SCHEMA` is written into saved tables so that a
/// table built for one state shape is never read back as another.
pub trait TableState: Clone + Eq + Hash + Ord + fmt::Debug + Serialize + DeserializeOwned {
    const SCHEMA: &'static str;
}

/// A probability kept in hundredths, which is what the state key is rounded to.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Probability(u8);

impl Probability {
    pub const ZERO: Probability = Probability(0);
    pub const ONE: Probability = Probability(100);

    /// Rounds the exact binary value to 2 decimals, halves going to even, so 0.125 is 0.12
    /// while 0.075 (really a little below) is 0.07. Values are clamped into [0, 1] first.
    pub fn from_f64(p: f64) -> Probability {
        let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        Probability(round_half_even_scaled(p, 100) as u8)
    }

    pub fn from_hundredths(hundredths: u8) -> Probability {
        Probability(hundredths.min(100))
    }

    pub fn hundredths(&self) -> u8 {
        self.0
    }

    pub fn value(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// The same probability with fewer decimals, rounded the way `from_f64` rounds.
    /// Asking for 2 or more is a no-op.
    pub fn rounded_to(&self, decimals: u8) -> Probability {
        match decimals {
            0 => Probability(round_half_even_scaled(self.value(), 1) as u8 * 100),
            1 => Probability(round_half_even_scaled(self.value(), 10) as u8 * 10),
            _ => *self,
        }
    }

    /// Absolute difference, in hundredths.
    pub fn distance_in_hundredths(&self, other: &Probability) -> u16 {
        (self.0 as i16 - other.0 as i16).unsigned_abs()
    }

    pub fn distance(&self, other: &Probability) -> f64 {
        self.distance_in_hundredths(other) as f64 / 100.0
    }
}

/// `p * scale` rounded to an integer, computed on the exact value `p` holds rather than on
/// a float product. `p` must be finite and non negative.
fn round_half_even_scaled(p: f64, scale: u64) -> u64 {
    let bits = p.to_bits();
    let biased_exponent = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1u64 << 52) - 1);
    let (mantissa, exponent) = if biased_exponent == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), biased_exponent - 1075)
    };
    let scaled = mantissa as u128 * scale as u128;
    if exponent >= 0 {
        return (scaled << exponent) as u64;
    }
    let shift = exponent.unsigned_abs();
    if shift >= 127 {
        return 0;
    }
    let quotient = scaled >> shift;
    let remainder = scaled & ((1u128 << shift) - 1);
    let half = 1u128 << (shift - 1);
    if remainder > half || (remainder == half && quotient & 1 == 1) {
        (quotient + 1) as u64
    } else {
        quotient as u64
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.value())
    }
}

/// What the player can observe before acting.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GameState {
    pub player_cards_qty: u8,
    pub player_cards_sum: u8,
    pub player_has_soft_hand: bool,
    pub player_busting_probability: Probability,
    /// Effective rank, an Ace being 11.
    pub dealer_open_card: u8,
    pub dealer_draw_probability: Probability,
    pub dealer_busting_probability: Probability,
}

impl GameState {
    /// Builds the state of a player holding `player` against `dealer_open`, `unseen`
    /// being every card the player cannot see.
    pub fn evaluate(
        engine: &ProbabilityEngine,
        unseen: &Deck,
        player: &Hand,
        dealer_open: Card,
        hit_on_soft17: bool,
    ) -> GameState {
        GameState {
            player_cards_qty: player.len() as u8,
            player_cards_sum: player.sum() as u8,
            player_has_soft_hand: player.is_soft(),
            player_busting_probability: Probability::from_f64(
                engine.player_busting_probability(unseen, player),
            ),
            dealer_open_card: dealer_open.fresh().rank(),
            dealer_draw_probability: Probability::from_f64(engine.dealer_draw_probability(
                unseen,
                dealer_open,
                hit_on_soft17,
            )),
            dealer_busting_probability: Probability::from_f64(
                engine.dealer_busting_probability(unseen, dealer_open, hit_on_soft17),
            ),
        }
    }

    /// The features two states must share before their probabilities are comparable.
    pub fn discrete_key(&self) -> (u8, u8, bool, u8) {
        (
            self.player_cards_qty,
            self.player_cards_sum,
            self.player_has_soft_hand,
            self.dealer_open_card,
        )
    }

    pub fn probabilities(&self) -> [Probability; 3] {
        [
            self.player_busting_probability,
            self.dealer_draw_probability,
            self.dealer_busting_probability,
        ]
    }

    /// Sum of absolute differences of the three probabilities. Computed on hundredths so
    /// that equal distances compare equal.
    pub fn distance(&self, other: &GameState) -> f64 {
        let hundredths: u16 = self
            .probabilities()
            .iter()
            .zip(other.probabilities().iter())
            .map(|(mine, theirs)| mine.distance_in_hundredths(theirs))
            .sum();
        hundredths as f64 / 100.0
    }

    pub fn rounded_to(&self, decimals: u8) -> GameState {
        GameState {
            player_busting_probability: self.player_busting_probability.rounded_to(decimals),
            dealer_draw_probability: self.dealer_draw_probability.rounded_to(decimals),
            dealer_busting_probability: self.dealer_busting_probability.rounded_to(decimals),
            ..*self
        }
    }
}

impl TableState for GameState {
    const SCHEMA: &'static str = "blackjack_rl::GameState/1";
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} card(s), {}{} (bust {}) vs {} (draw {}, bust {})",
            self.player_cards_qty,
            if self.player_has_soft_hand { "soft " } else { "" },
            self.player_cards_sum,
            self.player_busting_probability,
            self.dealer_open_card,
            self.dealer_draw_probability,
            self.dealer_busting_probability
        )
    }
}

/// Five coarse buckets for a probability.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ProbabilityCategory {
    VeryLow,
    Low,
    Middle,
    High,
    VeryHigh,
}

impl ProbabilityCategory {
    pub fn of(p: Probability) -> ProbabilityCategory {
        match p.hundredths() {
            0..=19 => ProbabilityCategory::VeryLow,
            20..=39 => ProbabilityCategory::Low,
            40..=59 => ProbabilityCategory::Middle,
            60..=79 => ProbabilityCategory::High,
            _ => ProbabilityCategory::VeryHigh,
        }
    }

    /// Upper bound of the bucket.
    pub fn representative(&self) -> Probability {
        match self {
            ProbabilityCategory::VeryLow => Probability(20),
            ProbabilityCategory::Low => Probability(40),
            ProbabilityCategory::Middle => Probability(60),
            ProbabilityCategory::High => Probability(80),
            ProbabilityCategory::VeryHigh => Probability::ONE,
        }
    }
}

/// `GameState` with its probabilities bucketed into categories.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CategorizedGameState {
    pub player_cards_qty: u8,
    pub player_cards_sum: u8,
    pub player_has_soft_hand: bool,
    pub player_busting_probability: ProbabilityCategory,
    pub dealer_open_card: u8,
    pub dealer_draw_probability: ProbabilityCategory,
    pub dealer_busting_probability: ProbabilityCategory,
}

impl CategorizedGameState {
    /// The fine grained state standing for the whole category.
    pub fn representative(&self) -> GameState {
        GameState {
            player_cards_qty: self.player_cards_qty,
            player_cards_sum: self.player_cards_sum,
            player_has_soft_hand: self.player_has_soft_hand,
            player_busting_probability: self.player_busting_probability.representative(),
            dealer_open_card: self.dealer_open_card,
            dealer_draw_probability: self.dealer_draw_probability.representative(),
            dealer_busting_probability: self.dealer_busting_probability.representative(),
        }
    }
}

impl From<&GameState> for CategorizedGameState {
    fn from(state: &GameState) -> Self {
        CategorizedGameState {
            player_cards_qty: state.player_cards_qty,
            player_cards_sum: state.player_cards_sum,
            player_has_soft_hand: state.player_has_soft_hand,
            player_busting_probability: ProbabilityCategory::of(state.player_busting_probability),
            dealer_open_card: state.dealer_open_card,
            dealer_draw_probability: ProbabilityCategory::of(state.dealer_draw_probability),
            dealer_busting_probability: ProbabilityCategory::of(state.dealer_busting_probability),
        }
    }
}

impl TableState for CategorizedGameState {
    const SCHEMA: &'static str = "blackjack_rl::CategorizedGameState/1";
}
