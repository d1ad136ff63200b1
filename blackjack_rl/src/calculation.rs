use std::collections::HashMap;

use crate::simulation::{deck::Deck, hand::Hand, Card};
use crate::CardCount;

use log::debug;
use parking_lot::RwLock;

mod dealer_play;

pub use dealer_play::{count_dealer_outcomes, dealer_must_stand, DealerOutcomeCount};

const DEFAULT_CACHE_CAPACITY: usize = 1 << 18;

/// Everything a cached probability depends on. Compositions are order independent, so
/// two decks holding the same cards share their entries whatever the dealing history.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProbabilityKey {
    init_decks_qty: u8,
    deck: CardCount,
    hand: CardCount,
    hit_on_soft17: bool,
}

impl ProbabilityKey {
    fn new(deck: &Deck, hand: CardCount, hit_on_soft17: bool) -> Self {
        ProbabilityKey {
            init_decks_qty: deck.init_decks_qty(),
            deck: deck.get_card_count().clone(),
            hand,
            hit_on_soft17,
        }
    }
}

#[derive(Debug, Default)]
struct ProbabilityCache {
    entries: RwLock<HashMap<ProbabilityKey, f64>>,
}

impl ProbabilityCache {
    fn get_or_compute<F>(
        &self,
        name: &str,
        capacity: usize,
        key: ProbabilityKey,
        compute: F,
    ) -> f64
    where
        F: FnOnce(&ProbabilityKey) -> f64,
    {
        if let Some(p) = self.entries.read().get(&key) {
            return *p;
        }

        let p = compute(&key);
        let mut entries = self.entries.write();
        if entries.len() >= capacity {
            debug!("{} cache is full with {} entries, clearing", name, entries.len());
            entries.clear();
        }
        entries.insert(key, p);
        p
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}

/// Exact probabilities over a deck snapshot, that is every card the player cannot see.
///
/// Results are pure functions of the composition of the snapshot and the hand, so the
/// engine can be shared between threads behind an `Arc`. Each cache is bounded and is
/// simply emptied once it is full.
#[derive(Debug)]
pub struct ProbabilityEngine {
    capacity: usize,
    player_busting: ProbabilityCache,
    dealer_drawing: ProbabilityCache,
    dealer_busting: ProbabilityCache,
}

impl Default for ProbabilityEngine {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl ProbabilityEngine {
    pub fn with_capacity(capacity: usize) -> Self {
        ProbabilityEngine {
            capacity: capacity.max(1),
            player_busting: ProbabilityCache::default(),
            dealer_drawing: ProbabilityCache::default(),
            dealer_busting: ProbabilityCache::default(),
        }
    }

    /// Probability that the next card pushes the hand over 21, Aces counted as 1.
    /// Only the very next card is looked at.
    pub fn player_busting_probability(&self, unseen: &Deck, player: &Hand) -> f64 {
        let key = ProbabilityKey::new(unseen, player.get_card_count().clone(), false);
        self.player_busting
            .get_or_compute("player busting", self.capacity, key, |key| {
                next_card_busting_probability(&key.deck, &key.hand)
            })
    }

    /// Probability that the dealer, holding `dealer_open` and a hole card drawn from
    /// `unseen`, has to draw at least one more card.
    pub fn dealer_draw_probability(
        &self,
        unseen: &Deck,
        dealer_open: Card,
        hit_on_soft17: bool,
    ) -> f64 {
        let key = ProbabilityKey::new(unseen, open_card_hand(dealer_open), hit_on_soft17);
        self.dealer_drawing
            .get_or_compute("dealer drawing", self.capacity, key, |key| {
                hole_card_drawing_probability(&key.deck, &key.hand, key.hit_on_soft17)
            })
    }

    /// Probability that the dealer busts, playing the whole fixed policy out from the open
    /// card with every card of `unseen`, hole card included.
    pub fn dealer_busting_probability(
        &self,
        unseen: &Deck,
        dealer_open: Card,
        hit_on_soft17: bool,
    ) -> f64 {
        let key = ProbabilityKey::new(unseen, open_card_hand(dealer_open), hit_on_soft17);
        self.dealer_busting
            .get_or_compute("dealer busting", self.capacity, key, |key| {
                count_dealer_outcomes(&key.deck, dealer_open.blackjack_value(), key.hit_on_soft17)
                    .probability()
            })
    }

    /// Number of cached results, all kinds together.
    pub fn cached_len(&self) -> usize {
        self.player_busting.len() + self.dealer_drawing.len() + self.dealer_busting.len()
    }

    pub fn clear(&self) {
        self.player_busting.clear();
        self.dealer_drawing.clear();
        self.dealer_busting.clear();
    }
}

fn open_card_hand(dealer_open: Card) -> CardCount {
    let mut hand = CardCount::default();
    hand.add_card(dealer_open.blackjack_value());
    hand
}

fn next_card_busting_probability(shoe: &CardCount, hand: &CardCount) -> f64 {
    if shoe.is_empty() {
        return 0.0;
    }
    let not_bust_limit = 21 - hand.get_sum().min(21);
    let busting: u16 = shoe
        .present_values()
        .filter(|(card_value, _)| *card_value as u32 > not_bust_limit)
        .map(|(_, count)| count)
        .sum();
    busting as f64 / shoe.get_total() as f64
}

fn hole_card_drawing_probability(shoe: &CardCount, open: &CardCount, hit_on_soft17: bool) -> f64 {
    if shoe.is_empty() {
        return 0.0;
    }
    let drawing: u16 = shoe
        .present_values()
        .filter(|(card_value, _)| {
            let mut dealer_hand = open.clone();
            dealer_hand.add_card(*card_value);
            !dealer_must_stand(&dealer_hand, hit_on_soft17)
        })
        .map(|(_, count)| count)
        .sum();
    drawing as f64 / shoe.get_total() as f64
}
