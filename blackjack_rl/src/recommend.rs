use std::sync::Arc;

use crate::agent::{Agent, QTableAgent};
use crate::calculation::ProbabilityEngine;
use crate::qtable::QTable;
use crate::simulation::{deck::Deck, hand::Hand, Card};
use crate::state::GameState;
use crate::{Action, BlackjackError, CardCount, Result};

/// Reads a card name: `2` to `10`, `J`, `Q`, `K` or `A`, in any case, surrounding spaces
/// ignored.
pub fn parse_card(token: &str) -> Result<Card> {
    let name = token.trim().to_uppercase();
    match name.as_str() {
        "A" => Ok(Card::ace()),
        "J" | "Q" | "K" => Card::new(10),
        _ => name
            .parse::<u8>()
            .ok()
            .and_then(|rank| Card::new(rank).ok())
            .ok_or_else(|| BlackjackError::InvalidCardToken(token.to_string())),
    }
}

pub fn parse_cards<T: AsRef<str>>(tokens: &[T]) -> Result<Vec<Card>> {
    tokens.iter().map(|token| parse_card(token.as_ref())).collect()
}

/// A table situation described card by card, without a running game.
#[derive(Debug, Clone, PartialEq)]
pub struct StateQuery {
    pub player: Vec<Card>,
    pub dealer_open: Card,
    pub decks_qty: u8,
    /// Cards already out of the shoe, other than the player cards and the dealer open card.
    pub used: Vec<Card>,
}

impl StateQuery {
    pub fn parse<T: AsRef<str>>(
        player: &[T],
        dealer_open: &str,
        decks_qty: u8,
        used: &[T],
    ) -> Result<Self> {
        Ok(StateQuery {
            player: parse_cards(player)?,
            dealer_open: parse_card(dealer_open)?,
            decks_qty,
            used: parse_cards(used)?,
        })
    }

    /// Every card the player cannot see: a fresh shoe minus the used cards, the player
    /// cards and the dealer open card.
    pub fn unseen_cards(&self) -> Result<Deck> {
        if self.decks_qty < 1 {
            return Err(BlackjackError::InvalidQuantity {
                name: "decks_qty",
                value: self.decks_qty.to_string(),
            });
        }
        if self.player.is_empty() {
            return Err(BlackjackError::InvalidCardSet(String::from(
                "the player holds no card",
            )));
        }

        let mut seen = CardCount::default();
        for card in self
            .used
            .iter()
            .chain(self.player.iter())
            .chain(std::iter::once(&self.dealer_open))
        {
            seen.add_card(card.blackjack_value());
        }
        let mut remaining = CardCount::with_number_of_decks(self.decks_qty);
        if !seen.is_subset_of(&remaining) {
            return Err(BlackjackError::InvalidCardSet(format!(
                "{} card(s) cannot all come from {} deck(s)",
                seen.get_total(),
                self.decks_qty
            )));
        }
        remaining -= &seen;

        let mut cards = Vec::with_capacity(remaining.get_total() as usize);
        for (card_value, count) in remaining.present_values() {
            for _ in 0..count {
                cards.push(Card::from_blackjack_value(card_value));
            }
        }
        Deck::with_remaining(self.decks_qty, &cards)
    }
}

pub fn build_state(
    engine: &ProbabilityEngine,
    query: &StateQuery,
    hit_on_soft17: bool,
) -> Result<GameState> {
    let unseen = query.unseen_cards()?;
    let player = Hand::with_cards(&query.player);
    Ok(GameState::evaluate(
        engine,
        &unseen,
        &player,
        query.dealer_open,
        hit_on_soft17,
    ))
}

/// Answers queries from a table loaded once by the caller.
pub struct Recommender {
    agent: QTableAgent,
    engine: Arc<ProbabilityEngine>,
    hit_on_soft17: bool,
}

impl Recommender {
    pub fn new(
        table: Arc<QTable<GameState>>,
        engine: Arc<ProbabilityEngine>,
        hit_on_soft17: bool,
    ) -> Self {
        Recommender {
            agent: QTableAgent::new(table),
            engine,
            hit_on_soft17,
        }
    }

    pub fn state(&self, query: &StateQuery) -> Result<GameState> {
        build_state(&self.engine, query, self.hit_on_soft17)
    }

    pub fn recommend(&self, query: &StateQuery) -> Result<(GameState, Action)> {
        let state = self.state(query)?;
        Ok((state, self.agent.decide(&state)))
    }

    /// The table state the recommendation is actually read from.
    pub fn resolved_state(&self, state: &GameState) -> Option<GameState> {
        self.agent.resolve(state)
    }
}
