use std::collections::HashMap;
use std::sync::Arc;

use crate::{BlackjackError, CardCount, Result};

use super::Card;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

const CARDS_PER_DECK: usize = 52;
const DEFAULT_MIN_REMAINING_PROPORTION: f64 = 0.25;

/// Standard card lists, built once per number of decks.
static DECK_TEMPLATES: Lazy<RwLock<HashMap<u8, Arc<[Card]>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn standard_cards(number_of_decks: u8) -> Arc<[Card]> {
    if let Some(cards) = DECK_TEMPLATES.read().get(&number_of_decks) {
        return Arc::clone(cards);
    }
    let mut cards = Vec::with_capacity(number_of_decks as usize * CARDS_PER_DECK);
    for _ in 0..number_of_decks {
        for _suit in 0..4 {
            for blackjack_value in 1..=10 {
                cards.push(Card::from_blackjack_value(blackjack_value));
            }
            // J, Q and K.
            for _ in 0..3 {
                cards.push(Card::from_blackjack_value(10));
            }
        }
    }
    let cards: Arc<[Card]> = cards.into();
    DECK_TEMPLATES
        .write()
        .entry(number_of_decks)
        .or_insert(cards)
        .clone()
}

/// Represents a shoe made of `init_decks_qty` standard decks. The cards are kept
/// shuffled and are dealt from the back, which is the same as drawing uniformly
/// at random from what is left.
#[derive(Debug, Clone)]
pub struct Deck {
    init_decks_qty: u8,
    min_cards_qty: f64,
    cards: Vec<Card>,
    card_count: CardCount,
    rng: SmallRng,
}

impl Deck {
    /// Creates a full, shuffled shoe.
    pub fn new(number_of_decks: u8) -> Result<Deck> {
        Self::with_rng(
            number_of_decks,
            DEFAULT_MIN_REMAINING_PROPORTION,
            SmallRng::from_entropy(),
        )
    }

    /// Same as `new`, but every shuffle is reproducible.
    pub fn seeded(number_of_decks: u8, min_remaining_proportion: f64, seed: u64) -> Result<Deck> {
        Self::with_rng(
            number_of_decks,
            min_remaining_proportion,
            SmallRng::seed_from_u64(seed),
        )
    }

    pub fn with_penetration(number_of_decks: u8, min_remaining_proportion: f64) -> Result<Deck> {
        Self::with_rng(
            number_of_decks,
            min_remaining_proportion,
            SmallRng::from_entropy(),
        )
    }

    fn with_rng(number_of_decks: u8, min_remaining_proportion: f64, rng: SmallRng) -> Result<Deck> {
        let mut deck = Self::empty(number_of_decks, min_remaining_proportion, rng)?;
        deck.reset();
        Ok(deck)
    }

    fn empty(number_of_decks: u8, min_remaining_proportion: f64, rng: SmallRng) -> Result<Deck> {
        if number_of_decks < 1 {
            return Err(BlackjackError::InvalidQuantity {
                name: "number_of_decks",
                value: number_of_decks.to_string(),
            });
        }
        Ok(Deck {
            init_decks_qty: number_of_decks,
            min_cards_qty: (CARDS_PER_DECK * number_of_decks as usize) as f64
                * min_remaining_proportion,
            cards: Vec::new(),
            card_count: CardCount::default(),
            rng,
        })
    }

    /// Builds a snapshot holding exactly the given cards. The snapshot remembers how
    /// many decks the original shoe was built from.
    pub fn with_remaining(init_decks_qty: u8, remaining: &[Card]) -> Result<Deck> {
        let mut deck = Self::empty(
            init_decks_qty,
            DEFAULT_MIN_REMAINING_PROPORTION,
            SmallRng::from_entropy(),
        )?;
        let mut card_count = CardCount::default();
        for card in remaining {
            card_count.add_card(card.blackjack_value());
        }
        if !card_count.is_subset_of(&CardCount::with_number_of_decks(init_decks_qty)) {
            return Err(BlackjackError::InvalidCardSet(format!(
                "{} cards cannot come from {} deck(s)",
                remaining.len(),
                init_decks_qty
            )));
        }
        deck.cards = remaining.iter().map(|card| card.fresh()).collect();
        deck.cards.shuffle(&mut deck.rng);
        deck.card_count = card_count;
        Ok(deck)
    }

    /// Returns all the cards into the shoe and shuffles.
    pub fn reset(&mut self) {
        self.cards.clear();
        self.cards.extend_from_slice(&standard_cards(self.init_decks_qty));
        self.cards.shuffle(&mut self.rng);
        self.card_count = CardCount::with_number_of_decks(self.init_decks_qty);
    }

    /// Returns all the cards into the shoe and shuffles, making sure the given card values
    /// (Ace is 1) are dealt first, in the given order. Fails if the shoe cannot provide them.
    pub fn shuffle_with_firsts(&mut self, firsts: &[u8]) -> Result<()> {
        self.reset();
        let mut firsts_count = CardCount::default();
        for blackjack_value in firsts {
            if !(1..=10).contains(blackjack_value) {
                return Err(BlackjackError::InvalidRank(*blackjack_value));
            }
            firsts_count.add_card(*blackjack_value);
        }
        if !firsts_count.is_subset_of(&self.card_count) {
            return Err(BlackjackError::InvalidCardSet(format!(
                "the shoe cannot deal {:?} first",
                firsts
            )));
        }

        for (i, blackjack_value) in firsts.iter().enumerate() {
            let target = self.cards.len() - 1 - i;
            let position = self.cards[..=target]
                .iter()
                .position(|card| card.blackjack_value() == *blackjack_value)
                .ok_or(BlackjackError::EmptyDeck)?;
            self.cards.swap(position, target);
        }
        Ok(())
    }

    /// Deals a card. Running out of cards means the caller missed an `is_playable` check.
    pub fn draw(&mut self) -> Result<Card> {
        let card = self.cards.pop().ok_or(BlackjackError::EmptyDeck)?;
        self.card_count.remove_card(card.blackjack_value());
        Ok(card)
    }

    /// Exact number of remaining cards of the same kind (Aces are counted apart from tens).
    pub fn count(&self, card: &Card) -> u16 {
        self.card_count[card.blackjack_value()]
    }

    pub fn contains(&self, card: &Card) -> bool {
        self.count(card) > 0
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn is_playable(&self) -> bool {
        self.cards.len() as f64 >= self.min_cards_qty
    }

    pub fn init_decks_qty(&self) -> u8 {
        self.init_decks_qty
    }

    pub fn initial_len(&self) -> usize {
        CARDS_PER_DECK * self.init_decks_qty as usize
    }

    pub fn get_card_count(&self) -> &CardCount {
        &self.card_count
    }

    pub fn remaining_cards(&self) -> Vec<Card> {
        self.cards.clone()
    }
}
