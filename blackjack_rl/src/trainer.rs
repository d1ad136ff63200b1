use std::collections::HashMap;

use crate::qtable::QTable;
use crate::simulation::GameEnvironment;
use crate::state::TableState;
use crate::{Action, BlackjackError, Result, RoundResult};

use log::info;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use strum::IntoEnumIterator;

fn check_unit_interval(name: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(BlackjackError::OutOfRangeHyperparameter { name, value })
    }
}

/// Numeric reward of every round result. Every result must have one.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardTable {
    rewards: HashMap<RoundResult, f64>,
}

impl RewardTable {
    pub fn new(rewards: HashMap<RoundResult, f64>) -> Result<Self> {
        if let Some(missing) = RoundResult::iter().find(|result| !rewards.contains_key(result)) {
            return Err(BlackjackError::MissingReward(missing));
        }
        Ok(RewardTable { rewards })
    }

    pub fn reward(&self, result: RoundResult) -> f64 {
        self.rewards[&result]
    }
}

impl Default for RewardTable {
    fn default() -> Self {
        RewardTable {
            rewards: HashMap::from([
                (RoundResult::Blackjack, 1.5),
                (RoundResult::Wins, 1.0),
                (RoundResult::Push, 0.5),
                (RoundResult::Loss, -1.0),
                (RoundResult::Bust, -1.5),
                (RoundResult::WaitAction, 0.0),
            ]),
        }
    }
}

/// Decides which action the learner tries next.
pub trait ExplorationPolicy {
    fn choose_action<S: TableState>(
        &mut self,
        table: &QTable<S>,
        state: &S,
        available_actions: &[Action],
    ) -> Action;
}

/// Random action with probability epsilon, best known action otherwise. A state the
/// table has never seen is always explored.
#[derive(Debug, Clone)]
pub struct EpsilonGreedy {
    epsilon: f64,
    rng: SmallRng,
}

impl EpsilonGreedy {
    pub fn new(epsilon: f64) -> Result<Self> {
        Self::with_rng(epsilon, SmallRng::from_entropy())
    }

    pub fn seeded(epsilon: f64, seed: u64) -> Result<Self> {
        Self::with_rng(epsilon, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(epsilon: f64, rng: SmallRng) -> Result<Self> {
        check_unit_interval("epsilon", epsilon)?;
        Ok(EpsilonGreedy { epsilon, rng })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl ExplorationPolicy for EpsilonGreedy {
    fn choose_action<S: TableState>(
        &mut self,
        table: &QTable<S>,
        state: &S,
        available_actions: &[Action],
    ) -> Action {
        let explore = !table.contains(state) || self.rng.gen::<f64>() < self.epsilon;
        if explore {
            if let Some(action) = available_actions.choose(&mut self.rng) {
                return *action;
            }
        }
        table
            .best_action_among(state, available_actions)
            .unwrap_or_else(|| table.best_action(state))
    }
}

/// What happened during a call to `train`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    pub episodes: u64,
    pub steps: u64,
    pub total_reward: f64,
    pub results: HashMap<RoundResult, u64>,
}

impl TrainingReport {
    /// Number of finished rounds.
    pub fn rounds(&self) -> u64 {
        self.results
            .iter()
            .filter(|(result, _)| result.is_round_over())
            .map(|(_, count)| count)
            .sum()
    }

    pub fn count(&self, result: RoundResult) -> u64 {
        self.results.get(&result).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: &TrainingReport) {
        self.episodes += other.episodes;
        self.steps += other.steps;
        self.total_reward += other.total_reward;
        for (result, count) in &other.results {
            *self.results.entry(*result).or_insert(0) += count;
        }
    }
}

/// One-step Q-learning against an environment. The learner owns the table for as long
/// as it trains; take a `snapshot` to save it from elsewhere.
pub struct QLearner<E, P>
where
    E: GameEnvironment,
    E::State: TableState,
    P: ExplorationPolicy,
{
    table: QTable<E::State>,
    environment: E,
    policy: P,
    rewards: RewardTable,
    alpha: f64,
    gamma: f64,
}

impl<E, P> QLearner<E, P>
where
    E: GameEnvironment,
    E::State: TableState,
    P: ExplorationPolicy,
{
    pub fn new(
        table: QTable<E::State>,
        environment: E,
        policy: P,
        rewards: RewardTable,
        alpha: f64,
        gamma: f64,
    ) -> Result<Self> {
        check_unit_interval("alpha", alpha)?;
        check_unit_interval("gamma", gamma)?;
        for action in environment.available_actions() {
            table.action_index(*action)?;
        }
        Ok(QLearner {
            table,
            environment,
            policy,
            rewards,
            alpha,
            gamma,
        })
    }

    /// Plays `episodes` whole shoes, updating the table after every action.
    pub fn train(&mut self, episodes: u64) -> Result<TrainingReport> {
        let mut report = TrainingReport::default();
        for _ in 0..episodes {
            self.environment.reset()?;
            let mut state = self.environment.state()?;
            while !self.environment.is_terminated() {
                state = self.step(state, &mut report)?;
            }
            report.episodes += 1;
        }
        info!(
            "Trained {} episode(s), {} step(s), {} state(s) in table",
            report.episodes,
            report.steps,
            self.table.len()
        );
        Ok(report)
    }

    fn step(&mut self, state: E::State, report: &mut TrainingReport) -> Result<E::State> {
        let action =
            self.policy
                .choose_action(&self.table, &state, self.environment.available_actions());
        let result = self.environment.play(action)?;
        let reward = self.rewards.reward(result);
        let next_state = self.environment.state()?;
        self.update(&state, action, reward, &next_state)?;

        report.steps += 1;
        report.total_reward += reward;
        *report.results.entry(result).or_insert(0) += 1;
        Ok(next_state)
    }

    /// Q(s, a) += alpha * (r + gamma * max Q(s', .) - Q(s, a))
    ///
    /// Both `s` and `s'` end up in the table, so only the first state of an episode can
    /// still be unseen when the policy is asked about it.
    pub fn update(
        &mut self,
        state: &E::State,
        action: Action,
        reward: f64,
        next_state: &E::State,
    ) -> Result<()> {
        let current = self.table.get_value(state, action)?;
        self.table.touch(next_state);
        let max_next = self.table.max_value(next_state);
        let updated = current + self.alpha * (reward + self.gamma * max_next - current);
        self.table.set_value(state, action, updated)
    }

    pub fn table(&self) -> &QTable<E::State> {
        &self.table
    }

    /// A copy of the table as it is between two episodes.
    pub fn snapshot(&self) -> QTable<E::State> {
        self.table.clone()
    }

    pub fn into_table(self) -> QTable<E::State> {
        self.table
    }

    pub fn environment(&self) -> &E {
        &self.environment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculation::ProbabilityEngine;
    use crate::simulation::DefaultGame;
    use crate::state::GameState;
    use crate::Rule;
    use std::sync::Arc;

    const ACTIONS: [Action; 2] = [Action::Stand, Action::Hit];

    fn seeded_learner(
        seed: u64,
        epsilon: f64,
        alpha: f64,
        gamma: f64,
    ) -> Result<QLearner<DefaultGame, EpsilonGreedy>> {
        let engine = Arc::new(ProbabilityEngine::default());
        let game = DefaultGame::seeded(&Rule::default(), engine, seed)?;
        QLearner::new(
            QTable::new(&ACTIONS)?,
            game,
            EpsilonGreedy::seeded(epsilon, seed)?,
            RewardTable::default(),
            alpha,
            gamma,
        )
    }

    #[test]
    fn reward_table_must_be_complete() {
        let mut rewards = HashMap::from([
            (RoundResult::Blackjack, 1.5),
            (RoundResult::Wins, 1.0),
            (RoundResult::Push, 0.5),
            (RoundResult::Loss, -1.0),
            (RoundResult::Bust, -1.5),
        ]);
        assert!(matches!(
            RewardTable::new(rewards.clone()),
            Err(BlackjackError::MissingReward(RoundResult::WaitAction))
        ));
        rewards.insert(RoundResult::WaitAction, 0.0);
        assert_eq!(RewardTable::new(rewards).unwrap(), RewardTable::default());
        assert_eq!(RewardTable::default().reward(RoundResult::Bust), -1.5);
    }

    #[test]
    fn hyperparameters_must_be_in_unit_interval() {
        assert!(matches!(
            seeded_learner(1, 0.1, 1.5, 0.9),
            Err(BlackjackError::OutOfRangeHyperparameter { name: "alpha", .. })
        ));
        assert!(matches!(
            seeded_learner(1, 0.1, 0.5, -0.1),
            Err(BlackjackError::OutOfRangeHyperparameter { name: "gamma", .. })
        ));
        assert!(matches!(
            EpsilonGreedy::new(1.01),
            Err(BlackjackError::OutOfRangeHyperparameter { name: "epsilon", .. })
        ));
        assert!(seeded_learner(1, 0.0, 0.0, 1.0).is_ok());
    }

    #[test]
    fn table_must_cover_the_environment_actions() {
        let game = DefaultGame::new(&Rule::default()).unwrap();
        let table = QTable::new(&[Action::Stand, Action::Double]).unwrap();
        let learner = QLearner::new(
            table,
            game,
            EpsilonGreedy::new(0.1).unwrap(),
            RewardTable::default(),
            0.1,
            0.9,
        );
        assert!(matches!(learner, Err(BlackjackError::InvalidAction(Action::Hit))));
    }

    #[test]
    fn unseen_states_are_explored() {
        let table: QTable<GameState> = QTable::new(&ACTIONS).unwrap();
        let state = GameState {
            player_cards_qty: 2,
            player_cards_sum: 20,
            player_has_soft_hand: false,
            player_busting_probability: Default::default(),
            dealer_open_card: 6,
            dealer_draw_probability: Default::default(),
            dealer_busting_probability: Default::default(),
        };
        let mut policy = EpsilonGreedy::seeded(0.0, 11).unwrap();
        let chosen: Vec<Action> = (0..64)
            .map(|_| policy.choose_action(&table, &state, &ACTIONS))
            .collect();
        assert!(chosen.contains(&Action::Stand));
        assert!(chosen.contains(&Action::Hit));

        let mut table = table;
        table.set_value(&state, Action::Hit, 0.3).unwrap();
        for _ in 0..64 {
            assert_eq!(policy.choose_action(&table, &state, &ACTIONS), Action::Hit);
        }
    }

    #[test]
    fn update_follows_the_temporal_difference_rule() {
        let mut learner = seeded_learner(5, 0.1, 0.5, 0.9).unwrap();
        learner.environment.reset().unwrap();
        let state = learner.environment.state().unwrap();
        let mut next_state = state;
        next_state.player_cards_sum = 5;

        learner.table.set_value(&state, Action::Hit, 0.2).unwrap();
        learner.table.set_value(&next_state, Action::Stand, 1.0).unwrap();
        learner.table.set_value(&next_state, Action::Hit, -1.0).unwrap();
        learner.update(&state, Action::Hit, 0.5, &next_state).unwrap();
        // 0.2 + 0.5 * (0.5 + 0.9 * 1.0 - 0.2)
        let value = learner.table.value(&state, Action::Hit).unwrap();
        assert!((value - 0.8).abs() < 1e-12);
    }

    #[test]
    fn update_materializes_the_next_state() {
        let mut learner = seeded_learner(6, 0.1, 0.5, 0.9).unwrap();
        learner.environment.reset().unwrap();
        let state = learner.environment.state().unwrap();
        let mut next_state = state;
        next_state.player_cards_sum = 4;
        assert!(!learner.table().contains(&next_state));

        learner.update(&state, Action::Stand, 1.0, &next_state).unwrap();
        assert!(learner.table().contains(&next_state));
        assert_eq!(learner.table().value(&next_state, Action::Hit).unwrap(), 0.0);
        // 0 + 0.5 * (1.0 + 0.9 * 0.0 - 0)
        let value = learner.table().value(&state, Action::Stand).unwrap();
        assert!((value - 0.5).abs() < 1e-12);

        let mut report = TrainingReport::default();
        let after_step = learner.step(state, &mut report).unwrap();
        assert!(learner.table().contains(&after_step));
    }

    #[test]
    fn train_plays_whole_shoes() {
        let mut learner = seeded_learner(9, 0.3, 0.1, 0.9).unwrap();
        let report = learner.train(3).unwrap();
        assert_eq!(report.episodes, 3);
        assert!(learner.environment().is_terminated());
        assert!(report.rounds() > 0);
        assert_eq!(report.count(RoundResult::WaitAction) + report.rounds(), report.steps);
        assert!(!learner.table().is_empty());

        let mut merged = report.clone();
        merged.merge(&report);
        assert_eq!(merged.steps, 2 * report.steps);
    }

    #[test]
    fn same_seed_same_table() {
        let mut first = seeded_learner(21, 0.5, 0.1, 0.9).unwrap();
        let mut second = seeded_learner(21, 0.5, 0.1, 0.9).unwrap();
        first.train(5).unwrap();
        second.train(5).unwrap();
        assert_eq!(first.snapshot().to_map(), second.into_table().to_map());
    }

    #[test]
    fn standing_on_hard_twenty_against_six_is_learned() {
        let mut learner = seeded_learner(2024, 0.5, 0.1, 0.9).unwrap();
        learner.train(1500).unwrap();

        let table = learner.table();
        let states: Vec<&GameState> = table
            .states()
            .filter(|state| {
                state.player_cards_sum == 20
                    && !state.player_has_soft_hand
                    && state.dealer_open_card == 6
            })
            .collect();
        assert!(!states.is_empty());
        let stand: f64 = states
            .iter()
            .map(|state| table.value(state, Action::Stand).unwrap())
            .sum();
        let hit: f64 = states
            .iter()
            .map(|state| table.value(state, Action::Hit).unwrap())
            .sum();
        assert!(stand > hit, "stand {} should beat hit {}", stand, hit);
    }
}
