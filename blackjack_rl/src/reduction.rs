use std::collections::HashMap;

use crate::qtable::{QTable, NEUTRAL_VALUE};
use crate::state::{CategorizedGameState, GameState, TableState};
use crate::{BlackjackError, Result};

use log::info;

/// States closer than this take part in a distance weighted average.
pub const WEIGHT_CUTOFF_DISTANCE: f64 = 0.01;
const WEIGHT_EPSILON: f64 = 1e-5;

/// Known states grouped by their discrete features, so that probabilities are only
/// ever compared between states with the same cards on the table.
#[derive(Debug, Clone, Default)]
pub struct NearestStates {
    groups: HashMap<(u8, u8, bool, u8), Vec<GameState>>,
}

impl NearestStates {
    pub fn new<'a, I>(states: I) -> Self
    where
        I: IntoIterator<Item = &'a GameState>,
    {
        let mut groups: HashMap<(u8, u8, bool, u8), Vec<GameState>> = HashMap::new();
        for state in states {
            groups.entry(state.discrete_key()).or_default().push(*state);
        }
        for group in groups.values_mut() {
            group.sort();
        }
        NearestStates { groups }
    }

    pub fn from_table(table: &QTable<GameState>) -> Self {
        Self::new(table.states())
    }

    /// Every comparable state with its distance to `target`, closest first. Equal
    /// distances keep the order of the states themselves.
    pub fn states_with_distance(&self, target: &GameState) -> Vec<(GameState, f64)> {
        let mut found: Vec<(GameState, f64)> = self
            .groups
            .get(&target.discrete_key())
            .map(|group| {
                group
                    .iter()
                    .map(|state| (*state, state.distance(target)))
                    .collect()
            })
            .unwrap_or_default();
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        found
    }

    pub fn find_closest(&self, target: &GameState) -> Option<GameState> {
        self.states_with_distance(target)
            .first()
            .map(|(state, _)| *state)
    }

    /// Up to `n` closest states.
    pub fn find_close(&self, target: &GameState, n: usize) -> Result<Vec<GameState>> {
        if n == 0 {
            return Err(BlackjackError::InvalidQuantity {
                name: "n",
                value: n.to_string(),
            });
        }
        Ok(self
            .states_with_distance(target)
            .into_iter()
            .take(n)
            .map(|(state, _)| state)
            .collect())
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Maps a fine grained state onto a coarser one.
pub trait Projection {
    type Target: TableState;

    fn project(&self, state: &GameState) -> Self::Target;

    /// The fine grained state that stands for a whole coarse state, used to measure
    /// distances.
    fn representative(&self, target: &Self::Target) -> GameState;
}

/// Keeps the state shape and rounds the probabilities to fewer decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReRounded {
    pub decimals: u8,
}

impl Projection for ReRounded {
    type Target = GameState;

    fn project(&self, state: &GameState) -> GameState {
        state.rounded_to(self.decimals)
    }

    fn representative(&self, target: &GameState) -> GameState {
        *target
    }
}

/// Buckets every probability into one of five categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Categorized;

impl Projection for Categorized {
    type Target = CategorizedGameState;

    fn project(&self, state: &GameState) -> CategorizedGameState {
        CategorizedGameState::from(state)
    }

    fn representative(&self, target: &CategorizedGameState) -> GameState {
        target.representative()
    }
}

/// How the values of all the states falling onto the same coarse state are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Mean,
    Max,
    /// The most frequent value, the first one seen among equally frequent ones.
    Mode,
    /// Average of the two middle values when there is an even number of them.
    Median,
    /// Inverse distance weighted average over every known state closer than
    /// `WEIGHT_CUTOFF_DISTANCE` to the coarse state.
    DistanceWeighted,
}

impl Reducer {
    fn reduce(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return NEUTRAL_VALUE;
        }
        match self {
            Reducer::Mean | Reducer::DistanceWeighted => {
                values.iter().sum::<f64>() / values.len() as f64
            }
            Reducer::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Reducer::Mode => mode(values),
            Reducer::Median => median(values),
        }
    }
}

fn mode(values: &[f64]) -> f64 {
    let mut frequencies: Vec<(u64, usize)> = Vec::new();
    for value in values {
        let bits = value.to_bits();
        match frequencies.iter_mut().find(|(b, _)| *b == bits) {
            Some((_, count)) => *count += 1,
            None => frequencies.push((bits, 1)),
        }
    }
    let mut best = frequencies[0];
    for candidate in frequencies.iter().skip(1) {
        if candidate.1 > best.1 {
            best = *candidate;
        }
    }
    f64::from_bits(best.0)
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let middle = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[middle]
    } else {
        (sorted[middle - 1] + sorted[middle]) / 2.0
    }
}

/// Builds a coarser table out of a fine grained one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QTableNarrower {
    pub reducer: Reducer,
    /// Leaves never updated values out of every reduction.
    pub ignore_neutral: bool,
}

impl QTableNarrower {
    pub fn new(reducer: Reducer, ignore_neutral: bool) -> Self {
        QTableNarrower {
            reducer,
            ignore_neutral,
        }
    }

    pub fn narrow<P: Projection>(
        &self,
        table: &QTable<GameState>,
        projection: &P,
    ) -> Result<QTable<P::Target>> {
        let mut originals: Vec<&GameState> = table.states().collect();
        originals.sort();

        let mut coarse_states: Vec<P::Target> = Vec::new();
        let mut members: HashMap<P::Target, Vec<&GameState>> = HashMap::new();
        for state in originals {
            let coarse = projection.project(state);
            let group = members.entry(coarse.clone()).or_insert_with(|| {
                coarse_states.push(coarse);
                Vec::new()
            });
            group.push(state);
        }

        let nearest = match self.reducer {
            Reducer::DistanceWeighted => Some(NearestStates::from_table(table)),
            _ => None,
        };

        let mut narrowed = QTable::new(table.actions())?;
        for coarse in coarse_states {
            let values = match &nearest {
                Some(nearest) => {
                    self.weighted_values(table, nearest, &projection.representative(&coarse))
                }
                None => self.reduced_values(table, &members[&coarse]),
            };
            narrowed.insert_values(coarse, values)?;
        }
        info!(
            "Narrowed {} states down to {} with {:?}",
            table.len(),
            narrowed.len(),
            self.reducer
        );
        Ok(narrowed)
    }

    pub fn narrow_rerounded(
        &self,
        table: &QTable<GameState>,
        decimals: u8,
    ) -> Result<QTable<GameState>> {
        self.narrow(table, &ReRounded { decimals })
    }

    pub fn narrow_categorized(
        &self,
        table: &QTable<GameState>,
    ) -> Result<QTable<CategorizedGameState>> {
        self.narrow(table, &Categorized)
    }

    fn keeps(&self, value: f64) -> bool {
        !(self.ignore_neutral && value == NEUTRAL_VALUE)
    }

    fn reduced_values(&self, table: &QTable<GameState>, members: &[&GameState]) -> Vec<f64> {
        (0..table.actions().len())
            .map(|index| {
                let values: Vec<f64> = members
                    .iter()
                    .filter_map(|state| table.values(state).map(|values| values[index]))
                    .filter(|value| self.keeps(*value))
                    .collect();
                self.reducer.reduce(&values)
            })
            .collect()
    }

    fn weighted_values(
        &self,
        table: &QTable<GameState>,
        nearest: &NearestStates,
        representative: &GameState,
    ) -> Vec<f64> {
        let weights: Vec<(GameState, f64)> = nearest
            .states_with_distance(representative)
            .into_iter()
            .filter(|(_, distance)| *distance < WEIGHT_CUTOFF_DISTANCE)
            .map(|(state, distance)| (state, 1.0 / (distance + WEIGHT_EPSILON)))
            .collect();
        let total_weight: f64 = weights.iter().map(|(_, weight)| weight).sum();

        (0..table.actions().len())
            .map(|index| {
                let mut weighted_sum = 0.0;
                let mut action_weight = 0.0;
                for (state, weight) in &weights {
                    let value = match table.values(state) {
                        Some(values) => values[index],
                        None => continue,
                    };
                    if !self.keeps(value) {
                        continue;
                    }
                    let weight = weight / total_weight;
                    weighted_sum += value * weight;
                    action_weight += weight;
                }
                if action_weight > 0.0 {
                    weighted_sum / action_weight
                } else {
                    NEUTRAL_VALUE
                }
            })
            .collect()
    }
}
