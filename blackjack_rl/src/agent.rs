use std::sync::Arc;

use crate::qtable::QTable;
use crate::reduction::NearestStates;
use crate::state::GameState;
use crate::Action;

/// Something that picks an action for an observed state.
pub trait Agent: Send + Sync {
    fn decide(&self, state: &GameState) -> Action;
}

const H: Action = Action::Hit;
const S: Action = Action::Stand;

/// Columns are the dealer open card from 2 to Ace.
const HARD_CHARTS: [[Action; 10]; 14] = [
    [H, H, H, H, H, H, H, H, H, H], // 5 and less
    [H, H, H, H, H, H, H, H, H, H],
    [H, H, H, H, H, H, H, H, H, H],
    [H, H, H, H, H, H, H, H, H, H],
    [H, H, H, H, H, H, H, H, H, H],
    [H, H, H, H, H, H, H, H, H, H],
    [H, H, H, H, H, H, H, H, H, H], // 11
    [S, S, S, S, S, H, H, H, H, H], // 12
    [S, S, S, S, S, H, H, H, H, H],
    [S, S, S, S, S, H, H, H, H, H],
    [S, S, S, S, S, H, H, H, H, H],
    [S, S, S, S, S, H, H, H, H, H], // 16
    [S, S, S, S, S, S, S, S, S, S], // 17
    [S, S, S, S, S, S, S, S, S, S], // 18 and more
];

const SOFT_CHARTS: [[Action; 10]; 9] = [
    [H, H, H, H, H, H, H, H, H, H], // 13 and less
    [H, H, H, H, H, H, H, H, H, H],
    [H, H, H, H, H, H, H, H, H, H],
    [H, H, H, H, H, H, H, H, H, H],
    [H, H, H, H, H, H, H, H, H, H], // 17
    [S, H, H, H, H, S, S, H, H, H], // 18
    [S, S, S, S, S, S, S, S, S, S],
    [S, S, S, S, S, S, S, S, S, S],
    [S, S, S, S, S, S, S, S, S, S], // 21
];

/// Hit or stand from fixed charts keyed by the player total, its softness and the dealer
/// open card. Unless told otherwise, a few probability thresholds take precedence over
/// the charts.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicStrategyAgent {
    ignore_probabilities: bool,
}

impl BasicStrategyAgent {
    pub fn new(ignore_probabilities: bool) -> Self {
        BasicStrategyAgent {
            ignore_probabilities,
        }
    }

    pub fn chart_decision(state: &GameState) -> Action {
        let column = (state.dealer_open_card.clamp(2, 11) - 2) as usize;
        let sum = state.player_cards_sum as usize;
        if state.player_has_soft_hand {
            SOFT_CHARTS[sum.clamp(13, 21) - 13][column]
        } else {
            HARD_CHARTS[sum.clamp(5, 18) - 5][column]
        }
    }

    fn probability_override(state: &GameState) -> Option<Action> {
        let player_busting = state.player_busting_probability.value();
        let dealer_drawing = state.dealer_draw_probability.value();
        let dealer_busting = state.dealer_busting_probability.value();

        if player_busting > 0.7 {
            return Some(Action::Stand);
        }
        if player_busting > 0.35 && dealer_drawing < 0.6 {
            return Some(Action::Stand);
        }
        if dealer_busting > 0.8 && state.player_cards_sum < 16 && player_busting < 0.3 {
            return Some(Action::Hit);
        }
        None
    }
}

impl Agent for BasicStrategyAgent {
    fn decide(&self, state: &GameState) -> Action {
        if !self.ignore_probabilities {
            if let Some(action) = Self::probability_override(state) {
                return action;
            }
        }
        Self::chart_decision(state)
    }
}

/// Follows a learned table. A state the table does not know is replaced by the closest
/// one it does.
pub struct QTableAgent {
    table: Arc<QTable<GameState>>,
    nearest: NearestStates,
}

impl QTableAgent {
    pub fn new(table: Arc<QTable<GameState>>) -> Self {
        let nearest = NearestStates::from_table(&table);
        QTableAgent { table, nearest }
    }

    pub fn table(&self) -> &QTable<GameState> {
        &self.table
    }

    /// The state whose values are actually used for `state`.
    pub fn resolve(&self, state: &GameState) -> Option<GameState> {
        if self.table.contains(state) {
            return Some(*state);
        }
        self.nearest.find_closest(state)
    }
}

impl Agent for QTableAgent {
    fn decide(&self, state: &GameState) -> Action {
        match self.resolve(state) {
            Some(known) => self.table.best_action(&known),
            None => self.table.best_action(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Probability;

    fn state(sum: u8, soft: bool, dealer: u8, probabilities: [u8; 3]) -> GameState {
        GameState {
            player_cards_qty: 2,
            player_cards_sum: sum,
            player_has_soft_hand: soft,
            player_busting_probability: Probability::from_hundredths(probabilities[0]),
            dealer_open_card: dealer,
            dealer_draw_probability: Probability::from_hundredths(probabilities[1]),
            dealer_busting_probability: Probability::from_hundredths(probabilities[2]),
        }
    }

    #[test]
    fn hard_chart() {
        let agent = BasicStrategyAgent::new(true);
        for dealer in 2..=11 {
            assert_eq!(agent.decide(&state(11, false, dealer, [0, 0, 0])), Action::Hit);
            assert_eq!(agent.decide(&state(17, false, dealer, [0, 0, 0])), Action::Stand);
            assert_eq!(agent.decide(&state(4, false, dealer, [0, 0, 0])), Action::Hit);
        }
        assert_eq!(agent.decide(&state(12, false, 6, [0, 0, 0])), Action::Stand);
        assert_eq!(agent.decide(&state(16, false, 7, [0, 0, 0])), Action::Hit);
        assert_eq!(agent.decide(&state(13, false, 11, [0, 0, 0])), Action::Hit);
    }

    #[test]
    fn soft_chart() {
        let agent = BasicStrategyAgent::new(true);
        for dealer in 2..=11 {
            assert_eq!(agent.decide(&state(19, true, dealer, [0, 0, 0])), Action::Stand);
            assert_eq!(agent.decide(&state(17, true, dealer, [0, 0, 0])), Action::Hit);
            assert_eq!(agent.decide(&state(12, true, dealer, [0, 0, 0])), Action::Hit);
        }
        for dealer in [2, 7, 8] {
            assert_eq!(agent.decide(&state(18, true, dealer, [0, 0, 0])), Action::Stand);
        }
        for dealer in [3, 4, 5, 6, 9, 10, 11] {
            assert_eq!(agent.decide(&state(18, true, dealer, [0, 0, 0])), Action::Hit);
        }
    }

    #[test]
    fn probability_overrides() {
        let agent = BasicStrategyAgent::default();
        // Chart says hit, the next card busts too often.
        assert_eq!(agent.decide(&state(16, false, 10, [71, 90, 20])), Action::Stand);
        assert_eq!(agent.decide(&state(15, false, 10, [40, 50, 20])), Action::Stand);
        assert_eq!(agent.decide(&state(15, false, 10, [40, 70, 20])), Action::Hit);
        // Chart says stand, the dealer is very likely to bust anyway.
        assert_eq!(agent.decide(&state(13, false, 6, [20, 90, 85])), Action::Hit);
        assert_eq!(
            BasicStrategyAgent::new(true).decide(&state(13, false, 6, [20, 90, 85])),
            Action::Stand
        );
    }

    #[test]
    fn q_table_agent_falls_back_to_the_closest_state() {
        let mut table = QTable::new(&[Action::Stand, Action::Hit]).unwrap();
        let known_hit = state(15, false, 10, [40, 80, 20]);
        let known_stand = state(15, false, 10, [60, 80, 20]);
        table.set_value(&known_hit, Action::Hit, 1.0).unwrap();
        table.set_value(&known_stand, Action::Stand, 1.0).unwrap();
        let agent = QTableAgent::new(Arc::new(table));

        assert_eq!(agent.decide(&known_hit), Action::Hit);
        assert_eq!(agent.decide(&state(15, false, 10, [43, 80, 20])), Action::Hit);
        assert_eq!(agent.decide(&state(15, false, 10, [58, 80, 20])), Action::Stand);
        assert_eq!(
            agent.resolve(&state(15, false, 10, [52, 80, 20])),
            Some(known_stand)
        );
        // Nothing comparable at all: the first action.
        assert_eq!(agent.decide(&state(9, false, 3, [0, 100, 30])), Action::Stand);
        assert_eq!(agent.table().len(), 2);
    }
}
