use crate::{CardCount, CompositionMemo};

/// Number of ways the dealer can finish, and how many of them bust. Each way is weighted
/// by how many physical cards could have been drawn along it, so dividing `bust` by
/// `total` at the very end gives the exact probability without any floating point
/// accumulation on the way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DealerOutcomeCount {
    pub bust: u128,
    pub total: u128,
}

impl DealerOutcomeCount {
    fn finished(bust: bool) -> Self {
        DealerOutcomeCount {
            bust: bust as u128,
            total: 1,
        }
    }

    fn add_assign_with_multiplicity(&mut self, rhs: &Self, multiplicity: u16) {
        self.bust += rhs.bust * multiplicity as u128;
        self.total += rhs.total * multiplicity as u128;
    }

    pub fn probability(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.bust as f64 / self.total as f64
    }
}

/// True if the dealer stops drawing with this hand.
pub fn dealer_must_stand(dealer_hand: &CardCount, hit_on_soft17: bool) -> bool {
    let actual_sum = dealer_hand.get_actual_sum();
    if actual_sum < 17 {
        return false;
    }
    !(hit_on_soft17 && actual_sum == 17 && dealer_hand.is_soft())
}

/// Enumerates every way the dealer can play out from a single open card, the hole card
/// being drawn from `shoe` like any other card.
pub fn count_dealer_outcomes(
    shoe: &CardCount,
    dealer_open_card: u8,
    hit_on_soft17: bool,
) -> DealerOutcomeCount {
    let mut current_shoe = shoe.clone();
    let mut dealer_hand = CardCount::default();
    dealer_hand.add_card(dealer_open_card);
    let mut odds = CompositionMemo::new();

    memoization_dealer_gets_cards(hit_on_soft17, &mut current_shoe, &mut dealer_hand, &mut odds)
}

// Within one root the shoe is the initial shoe minus the dealer hand, so the dealer hand
// alone is enough as the memo key.
fn memoization_dealer_gets_cards(
    // Input parameters
    hit_on_soft17: bool,

    // Parameters to maintain current state
    current_shoe: &mut CardCount,
    dealer_hand: &mut CardCount,

    // Output parameters
    odds: &mut CompositionMemo<DealerOutcomeCount>,
) -> DealerOutcomeCount {
    if let Some(known) = odds.get(dealer_hand) {
        return known;
    }

    // Case 1: Dealer must stand.
    if dealer_must_stand(dealer_hand, hit_on_soft17) {
        let finished = DealerOutcomeCount::finished(dealer_hand.bust());
        odds.insert(dealer_hand, finished);
        return finished;
    }

    // Case 2: Dealer must hit.
    let mut outcome = DealerOutcomeCount::default();
    for card_value in 1..=10 {
        let multiplicity = current_shoe[card_value];
        if multiplicity == 0 {
            continue;
        }

        current_shoe.remove_card(card_value);
        dealer_hand.add_card(card_value);

        let branch = memoization_dealer_gets_cards(hit_on_soft17, current_shoe, dealer_hand, odds);

        dealer_hand.remove_card(card_value);
        current_shoe.add_card(card_value);

        outcome.add_assign_with_multiplicity(&branch, multiplicity);
    }
    odds.insert(dealer_hand, outcome);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shoe_of(cards: &[u8]) -> CardCount {
        let mut shoe = CardCount::default();
        for card_value in cards {
            shoe.add_card(*card_value);
        }
        shoe
    }

    #[test]
    fn standing_hands() {
        let hard_seventeen = shoe_of(&[10, 7]);
        let soft_seventeen = shoe_of(&[1, 6]);
        let soft_eighteen = shoe_of(&[1, 7]);
        assert!(dealer_must_stand(&hard_seventeen, true));
        assert!(dealer_must_stand(&soft_seventeen, false));
        assert!(!dealer_must_stand(&soft_seventeen, true));
        assert!(dealer_must_stand(&soft_eighteen, true));
        assert!(!dealer_must_stand(&shoe_of(&[10, 6]), false));
        assert!(dealer_must_stand(&shoe_of(&[10, 6, 10]), false));
    }

    #[test]
    fn single_card_shoe() {
        // 10 + 6, then a forced 10.
        let outcome = count_dealer_outcomes(&shoe_of(&[6, 10]), 10, false);
        assert_eq!(outcome, DealerOutcomeCount { bust: 1, total: 2 });
        assert_eq!(outcome.probability(), 0.5);
    }

    #[test]
    fn counts_are_weighted_by_multiplicity() {
        // Open 10: a hole 10 stands on 20, a hole 6 draws one of the two remaining tens.
        let outcome = count_dealer_outcomes(&shoe_of(&[10, 10, 10, 6]), 10, false);
        // 3 ways to stand on 20; 1 * 3 ways for 6 then a ten to bust.
        assert_eq!(outcome.total, 3 + 3);
        assert_eq!(outcome.bust, 3);
        assert_eq!(outcome.probability(), 0.5);
    }

    #[test]
    fn soft_seventeen_rule_changes_the_outcome() {
        // Open Ace, hole 6 is soft 17; the only other card is a 5 which makes hard 12,
        // and the shoe then runs out.
        let shoe = shoe_of(&[6, 5]);
        let standing = count_dealer_outcomes(&shoe, 1, false);
        let hitting = count_dealer_outcomes(&shoe, 1, true);
        assert_eq!(standing.bust, 0);
        assert_ne!(standing, hitting);
    }

    #[test]
    fn empty_shoe_has_no_outcome() {
        let outcome = count_dealer_outcomes(&CardCount::default(), 5, false);
        assert_eq!(outcome.total, 0);
        assert_eq!(outcome.probability(), 0.0);
    }

    #[test]
    fn largest_shoe_counts_fit() {
        let shoe = CardCount::with_number_of_decks(u8::MAX);
        for open in 1..=10 {
            for hit_on_soft17 in [false, true] {
                let outcome = count_dealer_outcomes(&shoe, open, hit_on_soft17);
                assert!(outcome.bust < outcome.total);
                assert!(outcome.probability() > 0.6 && outcome.probability() < 0.62);
            }
        }
    }

    #[test]
    fn full_deck_weights_long_draws_more() {
        // Every extra draw multiplies a path by the cards it could have been, so the
        // low open cards, which need the longest draws, come out on top.
        let shoe = CardCount::with_number_of_decks(1);
        let against: Vec<f64> = (1..=10)
            .map(|open| count_dealer_outcomes(&shoe, open, false).probability())
            .collect();
        assert!((against[5] - 0.6565).abs() < 1e-3);
        assert!((against[9] - 0.6409).abs() < 1e-3);
        for pair in against[1..].windows(2) {
            assert!(pair[0] > pair[1]);
        }
        assert!(against[0] > against[9]);
    }
}
