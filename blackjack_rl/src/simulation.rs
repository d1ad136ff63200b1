pub mod deck;
pub mod hand;

use std::cmp::Ordering;
use std::sync::Arc;

use crate::{
    calculation::ProbabilityEngine, state::GameState, Action, BlackjackError, Result,
    RoundResult, Rule,
};
use blackjack_rl_macros::allowed_phase;
use serde::{Deserialize, Serialize};

use self::{deck::Deck, hand::Hand};

const SOFT_ACE_RANK: u8 = 11;
const HARD_ACE_RANK: u8 = 1;
const DEFAULT_ACTIONS: [Action; 2] = [Action::Stand, Action::Hit];

/// A card as blackjack sees it. Suits never matter, and J, Q, K are plain tens.
/// An Ace is worth 11 while soft and 1 once hard; it keeps being an Ace either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    rank: u8,
    ace: bool,
}

impl Card {
    pub fn new(rank: u8) -> Result<Card> {
        if !(2..=10).contains(&rank) {
            return Err(BlackjackError::InvalidRank(rank));
        }
        Ok(Card { rank, ace: false })
    }

    pub fn ace() -> Card {
        Card {
            rank: SOFT_ACE_RANK,
            ace: true,
        }
    }

    pub fn hard_ace() -> Card {
        Card {
            rank: HARD_ACE_RANK,
            ace: true,
        }
    }

    /// Builds a card from its counting value, 1 standing for a (soft) Ace. Callers only
    /// pass values read off a `CardCount`.
    ///
    /// Panics if the value is not in [1, 10].
    pub(crate) fn from_blackjack_value(blackjack_value: u8) -> Card {
        match blackjack_value {
            1 => Card::ace(),
            2..=10 => Card {
                rank: blackjack_value,
                ace: false,
            },
            _ => panic!("Invalid blackjack value {}", blackjack_value),
        }
    }

    /// Effective rank: 11 for a soft Ace, 1 for a hard one.
    pub fn rank(&self) -> u8 {
        self.rank
    }

    /// Counting value: Aces are always 1, whatever their softness.
    pub fn blackjack_value(&self) -> u8 {
        if self.ace {
            HARD_ACE_RANK
        } else {
            self.rank
        }
    }

    pub fn is_ace(&self) -> bool {
        self.ace
    }

    pub fn is_soft(&self) -> bool {
        self.ace && self.rank == SOFT_ACE_RANK
    }

    /// Demotes a soft Ace to 1. Does nothing to any other card.
    pub fn set_hard(&mut self) {
        if self.ace {
            self.rank = HARD_ACE_RANK;
        }
    }

    /// The same card as it would come out of a fresh deck.
    pub fn fresh(&self) -> Card {
        if self.ace {
            Card::ace()
        } else {
            *self
        }
    }

    pub fn compare_to(&self, other: &Card) -> Ordering {
        self.rank.cmp(&other.rank)
    }
}

impl std::fmt::Display for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ace {
            write!(f, "A")
        } else {
            write!(f, "{}", self.rank)
        }
    }
}

/// An environment a Q-learner can be trained against.
pub trait GameEnvironment {
    type State;

    /// Restores the full shoe and deals a new round.
    fn reset(&mut self) -> Result<()>;
    fn play(&mut self, action: Action) -> Result<RoundResult>;
    fn is_terminated(&self) -> bool;
    fn state(&self) -> Result<Self::State>;
    fn available_actions(&self) -> &[Action];
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GamePhase {
    Idle,
    AwaitingAction,
    Terminated,
}

/// One player against the dealer, hit or stand only. Finishing a round deals the next one
/// right away, until the shoe is no longer playable.
pub struct DefaultGame {
    rule: Rule,
    engine: Arc<ProbabilityEngine>,
    current_game_phase: GamePhase,
    deck: Deck,
    player_hand: Hand,
    dealer_hand: Hand,
}

impl DefaultGame {
    pub fn new(rule: &Rule) -> Result<Self> {
        Self::with_engine(rule, Arc::new(ProbabilityEngine::default()))
    }

    /// Shares the probability caches with other games.
    pub fn with_engine(rule: &Rule, engine: Arc<ProbabilityEngine>) -> Result<Self> {
        rule.validate()?;
        let deck = Deck::with_penetration(rule.number_of_decks, rule.min_remaining_proportion)?;
        Ok(Self::from_parts(rule, engine, deck))
    }

    /// Reproducible shuffles, mostly for tests and benchmarks.
    pub fn seeded(rule: &Rule, engine: Arc<ProbabilityEngine>, seed: u64) -> Result<Self> {
        rule.validate()?;
        let deck = Deck::seeded(rule.number_of_decks, rule.min_remaining_proportion, seed)?;
        Ok(Self::from_parts(rule, engine, deck))
    }

    fn from_parts(rule: &Rule, engine: Arc<ProbabilityEngine>, deck: Deck) -> Self {
        Self {
            rule: *rule,
            engine,
            current_game_phase: GamePhase::Idle,
            deck,
            player_hand: Hand::new(),
            dealer_hand: Hand::new(),
        }
    }

    /// Like `reset`, but the given card values (Ace is 1) are dealt first: two to the
    /// player, then the dealer's open card and hole card, then further hits.
    pub fn reset_with_firsts(&mut self, firsts: &[u8]) -> Result<()> {
        self.deck.shuffle_with_firsts(firsts)?;
        self.start_new_round()
    }

    fn start_new_round(&mut self) -> Result<()> {
        self.player_hand.clear();
        let first = self.deck.draw()?;
        let second = self.deck.draw()?;
        self.player_hand.add(&[first, second]);

        self.dealer_hand.clear();
        let open = self.deck.draw()?;
        let hole = self.deck.draw()?;
        self.dealer_hand.add(&[open, hole]);

        self.current_game_phase = GamePhase::AwaitingAction;
        Ok(())
    }

    fn play_hit(&mut self) -> Result<RoundResult> {
        let card = self.deck.draw()?;
        self.player_hand.receive_card(card);
        let result = match self.player_hand.sum() {
            sum if sum > 21 => RoundResult::Bust,
            21 => RoundResult::Blackjack,
            _ => RoundResult::WaitAction,
        };
        Ok(result)
    }

    fn play_stand(&mut self) -> Result<RoundResult> {
        while self.dealer_must_draw() {
            let card = self.deck.draw()?;
            self.dealer_hand.receive_card(card);
        }

        let result = if self.dealer_hand.bust() {
            RoundResult::Wins
        } else {
            match self.dealer_hand.compare_to(&self.player_hand) {
                Ordering::Less => RoundResult::Wins,
                Ordering::Equal => RoundResult::Push,
                Ordering::Greater => RoundResult::Loss,
            }
        };
        Ok(result)
    }

    fn dealer_must_draw(&self) -> bool {
        let sum = self.dealer_hand.sum();
        sum < 17 || (sum == 17 && self.rule.dealer_hit_on_soft17 && self.dealer_hand.is_soft())
    }

    /// Everything the player cannot see: the shoe plus the dealer's hole card.
    pub fn unseen_cards(&self) -> Result<Deck> {
        let mut unseen = self.deck.remaining_cards();
        unseen.extend(self.dealer_hand.get_cards().iter().skip(1).take(1));
        Deck::with_remaining(self.deck.init_decks_qty(), &unseen)
    }

    pub fn get_player_hand(&self) -> &Hand {
        &self.player_hand
    }

    pub fn get_dealer_hand(&self) -> &Hand {
        &self.dealer_hand
    }

    pub fn get_deck(&self) -> &Deck {
        &self.deck
    }

    pub fn get_game_phase(&self) -> GamePhase {
        self.current_game_phase
    }

    pub fn get_rule(&self) -> &Rule {
        &self.rule
    }
}

impl GameEnvironment for DefaultGame {
    type State = GameState;

    fn reset(&mut self) -> Result<()> {
        self.deck.reset();
        self.start_new_round()
    }

    #[allowed_phase(AwaitingAction)]
    fn play(&mut self, action: Action) -> Result<RoundResult> {
        let result = match action {
            Action::Hit => self.play_hit()?,
            Action::Stand => self.play_stand()?,
            _ => return Err(BlackjackError::InvalidAction(action)),
        };

        if result.is_round_over() {
            if self.deck.is_playable() {
                self.start_new_round()?;
            } else {
                self.current_game_phase = GamePhase::Terminated;
            }
        }
        Ok(result)
    }

    fn is_terminated(&self) -> bool {
        self.current_game_phase == GamePhase::Terminated
    }

    #[allowed_phase(AwaitingAction | Terminated)]
    fn state(&self) -> Result<GameState> {
        let unseen = self.unseen_cards()?;
        Ok(GameState::evaluate(
            &self.engine,
            &unseen,
            &self.player_hand,
            self.dealer_hand.get_cards()[0],
            self.rule.dealer_hit_on_soft17,
        ))
    }

    fn available_actions(&self) -> &[Action] {
        &DEFAULT_ACTIONS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_typical_game() -> DefaultGame {
        DefaultGame::seeded(&Rule::default(), Arc::new(ProbabilityEngine::default()), 7).unwrap()
    }

    #[test]
    fn counting_values_map_back_to_cards() {
        for value in 1..=10 {
            assert_eq!(Card::from_blackjack_value(value).blackjack_value(), value);
        }
        assert!(Card::from_blackjack_value(1).is_ace());
    }

    #[test]
    fn card_rank_must_be_valid() {
        assert!(matches!(Card::new(1), Err(BlackjackError::InvalidRank(1))));
        assert!(matches!(Card::new(11), Err(BlackjackError::InvalidRank(11))));
        for rank in 2..=10 {
            assert_eq!(Card::new(rank).unwrap().rank(), rank);
        }
    }

    #[test]
    fn ace_demotion_is_irreversible() {
        let mut ace = Card::ace();
        assert_eq!(ace.rank(), 11);
        ace.set_hard();
        assert_eq!(ace.rank(), 1);
        ace.set_hard();
        assert_eq!(ace.rank(), 1);
        assert!(ace.is_ace());
        assert_eq!(ace.blackjack_value(), 1);
        assert_ne!(ace, Card::new(2).unwrap());
        assert_eq!(ace.compare_to(&Card::new(2).unwrap()), Ordering::Less);
    }

    #[test]
    fn test_allowed_phase() {
        let mut game = get_typical_game();
        assert_eq!(game.get_game_phase(), GamePhase::Idle);
        assert!(matches!(
            game.play(Action::Hit),
            Err(BlackjackError::WrongPhase(_))
        ));
        assert!(game.state().is_err());
        game.reset().unwrap();
        assert_eq!(game.get_game_phase(), GamePhase::AwaitingAction);
        assert!(game.state().is_ok());
    }

    #[test]
    fn unsupported_actions_are_rejected() {
        let mut game = get_typical_game();
        game.reset().unwrap();
        assert!(matches!(
            game.play(Action::Double),
            Err(BlackjackError::InvalidAction(Action::Double))
        ));
        assert_eq!(game.get_game_phase(), GamePhase::AwaitingAction);
    }

    #[test]
    fn player_nineteen_against_six() {
        let mut game = get_typical_game();
        game.reset_with_firsts(&[10, 9, 6, 10]).unwrap();
        let state = game.state().unwrap();
        assert_eq!(state.player_cards_qty, 2);
        assert_eq!(state.player_cards_sum, 19);
        assert!(!state.player_has_soft_hand);
        assert_eq!(state.dealer_open_card, 6);

        let unseen = game.unseen_cards().unwrap();
        let busting = (3..=10)
            .map(|value| unseen.get_card_count()[value] as f64)
            .sum::<f64>()
            / unseen.len() as f64;
        assert_eq!(
            state.player_busting_probability,
            crate::state::Probability::from_f64(busting)
        );
    }

    #[test]
    fn stand_against_sixteen_draws_exactly_once() {
        let mut game = get_typical_game();
        game.reset_with_firsts(&[10, 8, 10, 6, 5]).unwrap();
        let before = game.get_deck().len();
        let result = game.play(Action::Stand).unwrap();
        assert_eq!(result, RoundResult::Loss);
        // One card for the dealer, four for the next round.
        assert_eq!(game.get_deck().len(), before - 1 - 4);
        assert_eq!(game.get_game_phase(), GamePhase::AwaitingAction);
    }

    #[test]
    fn stand_results_are_terminal() {
        let mut game = get_typical_game();
        game.reset().unwrap();
        while !game.is_terminated() {
            let result = game.play(Action::Stand).unwrap();
            assert!(matches!(
                result,
                RoundResult::Wins | RoundResult::Push | RoundResult::Loss
            ));
        }
        assert!(matches!(
            game.play(Action::Stand),
            Err(BlackjackError::WrongPhase(_))
        ));
        assert!(game.state().is_ok());
        game.reset().unwrap();
        assert!(!game.is_terminated());
    }

    #[test]
    fn hit_results() {
        let mut game = get_typical_game();
        game.reset_with_firsts(&[10, 5, 9, 9, 6]).unwrap();
        assert_eq!(game.play(Action::Hit).unwrap(), RoundResult::Blackjack);

        game.reset_with_firsts(&[10, 5, 9, 9, 2]).unwrap();
        assert_eq!(game.play(Action::Hit).unwrap(), RoundResult::WaitAction);
        assert_eq!(game.get_player_hand().sum(), 17);

        game.reset_with_firsts(&[10, 5, 9, 9, 8]).unwrap();
        assert_eq!(game.play(Action::Hit).unwrap(), RoundResult::Bust);
        assert_eq!(game.get_player_hand().len(), 2);
    }

    #[test]
    fn dealer_hits_soft_seventeen_only_when_told() {
        let rule = Rule {
            dealer_hit_on_soft17: true,
            ..Default::default()
        };
        let mut game = DefaultGame::seeded(&rule, Arc::new(ProbabilityEngine::default()), 3)
            .unwrap();
        game.reset_with_firsts(&[10, 8, 1, 6, 1]).unwrap();
        assert_eq!(game.play(Action::Stand).unwrap(), RoundResult::Push);

        let mut game = get_typical_game();
        game.reset_with_firsts(&[10, 8, 1, 6, 1]).unwrap();
        assert_eq!(game.play(Action::Stand).unwrap(), RoundResult::Wins);
        game.reset_with_firsts(&[10, 7, 1, 6, 3]).unwrap();
        assert_eq!(game.play(Action::Stand).unwrap(), RoundResult::Push);
    }
}
