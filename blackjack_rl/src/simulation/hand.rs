use std::cmp::Ordering;

use crate::CardCount;

use super::Card;

/// Cards held by one participant.
#[derive(Debug, Clone, Default)]
pub struct Hand {
    cards: Vec<Card>,
    card_count: CardCount,
}

impl Hand {
    pub fn new() -> Hand {
        Hand {
            cards: Vec::with_capacity(3),
            card_count: CardCount::default(),
        }
    }

    pub fn with_cards(cards: &[Card]) -> Hand {
        let mut hand = Hand::new();
        hand.add(cards);
        hand
    }

    /// Receives the given cards. An Ace always enters as soft, and soft Aces are demoted
    /// one at a time while the total is over 21.
    pub fn add(&mut self, cards: &[Card]) {
        for card in cards {
            let card = card.fresh();
            self.card_count.add_card(card.blackjack_value());
            self.cards.push(card);
        }
        self.migrate_to_hard_if_needed();
    }

    pub fn receive_card(&mut self, card: Card) {
        self.add(&[card]);
    }

    fn migrate_to_hard_if_needed(&mut self) {
        while self.sum() > 21 {
            match self.cards.iter_mut().find(|card| card.is_soft()) {
                Some(ace) => ace.set_hard(),
                None => break,
            }
        }
    }

    /// Sum of the effective ranks.
    pub fn sum(&self) -> u16 {
        self.cards.iter().map(|card| card.rank() as u16).sum()
    }

    pub fn is_soft(&self) -> bool {
        self.cards.iter().any(Card::is_soft)
    }

    pub fn bust(&self) -> bool {
        self.sum() > 21
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn get_cards(&self) -> &[Card] {
        &self.cards
    }

    /// Composition of the hand, Aces counted as 1.
    pub fn get_card_count(&self) -> &CardCount {
        &self.card_count
    }

    /// Compares two hands by their totals.
    pub fn compare_to(&self, other: &Hand) -> Ordering {
        self.sum().cmp(&other.sum())
    }

    pub fn clear(&mut self) {
        self.cards.clear();
        self.card_count = CardCount::default();
    }
}
