use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::ops::{Index, SubAssign};

/// Odd multiplier of the composition fingerprint. Arithmetic wraps modulo 2^64.
const FINGERPRINT_BASE: u64 = 0x9E37_79B9_7F4A_7C15;
const FINGERPRINT_WEIGHTS: [u64; 10] = fingerprint_weights();

const fn fingerprint_weights() -> [u64; 10] {
    let mut weights = [1u64; 10];
    let mut i = 1;
    while i < weights.len() {
        weights[i] = weights[i - 1].wrapping_mul(FINGERPRINT_BASE);
        i += 1;
    }
    weights
}

fn slot(card_value: u8) -> usize {
    (card_value - 1) as usize
}

/// How many cards of each value (Ace as 1, up to 10) a hand or a shoe holds. Two counts
/// holding the same numbers are equal and hash equally, whatever order the cards came in,
/// which makes them the natural key of every probability memo.
#[derive(Clone, Debug, Default)]
pub struct CardCount {
    counts: [u16; 10],
    fingerprint: u64,
    // 340 per deck, more than a u16 holds past 192 decks.
    sum: u32,
    total: u16,
}

impl CardCount {
    pub fn new(counts: &[u16; 10]) -> CardCount {
        let mut card_count = CardCount::default();
        for (index, count) in counts.iter().enumerate() {
            card_count.shift(index, *count, true);
        }
        card_count
    }

    /// Every card of `number_of_decks` full decks.
    pub fn with_number_of_decks(number_of_decks: u8) -> CardCount {
        let per_value = number_of_decks as u16 * 4;
        let mut counts = [per_value; 10];
        counts[slot(10)] = per_value * 4;
        Self::new(&counts)
    }

    fn shift(&mut self, index: usize, count: u16, added: bool) {
        let weight = FINGERPRINT_WEIGHTS[index].wrapping_mul(count as u64);
        let value = (index as u32 + 1) * count as u32;
        if added {
            self.counts[index] += count;
            self.fingerprint = self.fingerprint.wrapping_add(weight);
            self.sum += value;
            self.total += count;
        } else {
            self.counts[index] -= count;
            self.fingerprint = self.fingerprint.wrapping_sub(weight);
            self.sum -= value;
            self.total -= count;
        }
    }

    /// The value must be in [1, 10].
    pub fn add_card(&mut self, card_value: u8) {
        self.shift(slot(card_value), 1, true);
    }

    /// The value must be in [1, 10] and present.
    pub fn remove_card(&mut self, card_value: u8) {
        self.shift(slot(card_value), 1, false);
    }

    /// Aces count 1 here.
    pub fn get_sum(&self) -> u32 {
        self.sum
    }

    pub fn get_total(&self) -> u16 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// True if an Ace can still be counted as 11 without busting.
    pub fn is_soft(&self) -> bool {
        self.counts[0] > 0 && self.sum + 10 <= 21
    }

    pub fn bust(&self) -> bool {
        self.sum > 21
    }

    pub fn get_actual_sum(&self) -> u32 {
        if self.is_soft() {
            self.sum + 10
        } else {
            self.sum
        }
    }

    /// The card values that are present, with their multiplicity.
    pub fn present_values(&self) -> impl Iterator<Item = (u8, u16)> + '_ {
        (1..=10u8)
            .map(move |card_value| (card_value, self[card_value]))
            .filter(|(_, count)| *count > 0)
    }

    pub fn is_subset_of(&self, other: &CardCount) -> bool {
        self.counts
            .iter()
            .zip(other.counts.iter())
            .all(|(mine, theirs)| mine <= theirs)
    }
}

/// `rhs` must be a subset of `self`.
impl SubAssign<&CardCount> for CardCount {
    fn sub_assign(&mut self, rhs: &CardCount) {
        for (index, count) in rhs.counts.iter().enumerate() {
            self.shift(index, *count, false);
        }
    }
}

impl Index<u8> for CardCount {
    type Output = u16;
    fn index(&self, card_value: u8) -> &Self::Output {
        &self.counts[slot(card_value)]
    }
}

impl Hash for CardCount {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.fingerprint);
    }
}

impl PartialEq for CardCount {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint && self.counts == other.counts
    }
}

impl Eq for CardCount {}

/// Memo table keyed by card composition.
#[derive(Debug, Clone)]
pub struct CompositionMemo<T> {
    data: HashMap<CardCount, T>,
}

impl<T: Copy> CompositionMemo<T> {
    pub fn new() -> Self {
        CompositionMemo {
            data: HashMap::new(),
        }
    }

    pub fn get(&self, key: &CardCount) -> Option<T> {
        self.data.get(key).copied()
    }

    pub fn insert(&mut self, key: &CardCount, value: T) {
        self.data.insert(key.clone(), value);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T: Copy> Default for CompositionMemo<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn random_counts(number_of_decks: u8) -> [u16; 10] {
        let mut rng = rand::thread_rng();
        let mut counts = [0; 10];
        for count in counts.iter_mut().take(9) {
            *count = rng.gen_range(0..=number_of_decks as u16 * 4);
        }
        counts[9] = rng.gen_range(0..=number_of_decks as u16 * 16);
        counts
    }

    fn direct_fingerprint(counts: &[u16; 10]) -> u64 {
        counts
            .iter()
            .rev()
            .fold(0u64, |acc, count| {
                acc.wrapping_mul(FINGERPRINT_BASE).wrapping_add(*count as u64)
            })
    }

    #[test]
    fn fingerprint_is_a_polynomial_of_the_counts() {
        for _ in 0..20 {
            let counts = random_counts(8);
            assert_eq!(CardCount::new(&counts).fingerprint, direct_fingerprint(&counts));
        }
    }

    #[test]
    fn order_of_cards_does_not_matter() {
        let mut first = CardCount::default();
        let mut second = CardCount::default();
        for value in [1, 10, 5, 5, 7] {
            first.add_card(value);
        }
        for value in [5, 7, 10, 1, 5] {
            second.add_card(value);
        }
        assert_eq!(first, second);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.get_sum(), 28);
        assert_eq!(first.get_total(), 5);
    }

    #[test]
    fn full_decks() {
        let shoe = CardCount::with_number_of_decks(2);
        assert_eq!(shoe.get_total(), 104);
        assert_eq!(shoe[1], 8);
        assert_eq!(shoe[10], 32);
        assert_eq!(shoe.present_values().count(), 10);
    }

    #[test]
    fn largest_shoe_fits() {
        let shoe = CardCount::with_number_of_decks(u8::MAX);
        assert_eq!(shoe.get_total(), 52 * 255);
        assert_eq!(shoe.get_sum(), 340 * 255);
        assert_eq!(shoe[10], 16 * 255);
        assert!(shoe.bust());
    }

    #[test]
    fn memo_follows_the_composition() {
        for _ in 0..10 {
            let mut raw_counts = random_counts(8);
            raw_counts[3] = 2;

            let mut memo = CompositionMemo::new();
            let mut key = CardCount::new(&raw_counts);
            memo.insert(&key, 666);
            key.add_card(4);
            memo.insert(&key, 111);

            let mut probe = CardCount::new(&raw_counts);
            assert_eq!(memo.get(&probe), Some(666));
            probe.add_card(4);
            assert_eq!(memo.get(&probe), Some(111));
            probe.remove_card(4);
            probe.remove_card(4);
            assert_eq!(memo.get(&probe), None);
            assert_eq!(memo.len(), 2);
        }
    }

    #[test]
    fn soft_sum_demotes_when_needed() {
        let mut hand = CardCount::default();
        hand.add_card(1);
        hand.add_card(6);
        assert!(hand.is_soft());
        assert_eq!(hand.get_actual_sum(), 17);
        hand.add_card(9);
        assert!(!hand.is_soft());
        assert_eq!(hand.get_actual_sum(), 16);
        hand.add_card(8);
        assert!(hand.bust());
    }

    #[test]
    fn subtracting_a_subset() {
        let mut shoe = CardCount::new(&[1, 2, 3, 0, 0, 0, 0, 0, 5, 6]);
        let original = shoe.clone();
        let seen = CardCount::new(&[1, 0, 1, 0, 0, 0, 0, 0, 0, 2]);
        assert!(seen.is_subset_of(&shoe));
        assert!(!shoe.is_subset_of(&seen));

        shoe -= &seen;
        assert_eq!(shoe.get_total(), 17 - 4);
        assert_eq!(shoe.get_sum(), 119 - 24);
        assert_eq!(shoe.fingerprint, direct_fingerprint(&shoe.counts));
        assert_ne!(shoe, original);
        assert_eq!(
            shoe.present_values().collect::<Vec<_>>(),
            vec![(2, 2), (3, 2), (9, 5), (10, 4)]
        );
    }
}
