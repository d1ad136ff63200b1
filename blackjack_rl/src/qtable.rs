use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::state::TableState;
use crate::{Action, BlackjackError, Result};

use log::info;
use serde::{Deserialize, Serialize};

/// Value of every action of a state nobody has written to yet.
pub const NEUTRAL_VALUE: f64 = 0.0;

/// Sparse action values keyed by state. Every state owns one value per action, in the
/// order the actions were given at construction.
#[derive(Debug, Clone)]
pub struct QTable<S: TableState> {
    actions: Vec<Action>,
    values: HashMap<S, Vec<f64>>,
}

/// What goes on disk. Entries are sorted so that the same table always gives the same bytes.
#[derive(Serialize, Deserialize)]
struct SavedTable<S> {
    schema: String,
    actions: Vec<Action>,
    entries: Vec<(S, Vec<f64>)>,
}

impl<S: TableState> QTable<S> {
    pub fn new(actions: &[Action]) -> Result<Self> {
        if actions.len() < 2 {
            return Err(BlackjackError::TooFewActions(actions.len()));
        }
        for (i, action) in actions.iter().enumerate() {
            if actions[..i].contains(action) {
                return Err(BlackjackError::InvalidAction(*action));
            }
        }
        Ok(QTable {
            actions: actions.to_vec(),
            values: HashMap::new(),
        })
    }

    /// An empty table with the same actions.
    pub fn empty_like(&self) -> Self {
        QTable {
            actions: self.actions.clone(),
            values: HashMap::new(),
        }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action_index(&self, action: Action) -> Result<usize> {
        self.actions
            .iter()
            .position(|a| *a == action)
            .ok_or(BlackjackError::InvalidAction(action))
    }

    /// Values of a state, materializing it with neutral values if needed.
    pub fn values_mut(&mut self, state: &S) -> &mut Vec<f64> {
        let actions_qty = self.actions.len();
        self.values
            .entry(state.clone())
            .or_insert_with(|| vec![NEUTRAL_VALUE; actions_qty])
    }

    /// Makes sure the state is in the table.
    pub fn touch(&mut self, state: &S) {
        self.values_mut(state);
    }

    pub fn set_value(&mut self, state: &S, action: Action, value: f64) -> Result<()> {
        let index = self.action_index(action)?;
        self.values_mut(state)[index] = value;
        Ok(())
    }

    /// Reads a value. An unseen state is materialized first.
    pub fn get_value(&mut self, state: &S, action: Action) -> Result<f64> {
        let index = self.action_index(action)?;
        Ok(self.values_mut(state)[index])
    }

    /// Reads a value without touching the table; unseen states read as neutral.
    pub fn value(&self, state: &S, action: Action) -> Result<f64> {
        let index = self.action_index(action)?;
        Ok(self
            .values
            .get(state)
            .map_or(NEUTRAL_VALUE, |values| values[index]))
    }

    pub fn values(&self, state: &S) -> Option<&[f64]> {
        self.values.get(state).map(Vec::as_slice)
    }

    /// Replaces all the values of a state at once.
    pub fn insert_values(&mut self, state: S, values: Vec<f64>) -> Result<()> {
        if values.len() != self.actions.len() {
            return Err(BlackjackError::InvalidQuantity {
                name: "action values",
                value: values.len().to_string(),
            });
        }
        self.values.insert(state, values);
        Ok(())
    }

    /// The action with the highest value. Ties go to the action given first at
    /// construction, so an unseen state always gives the first action.
    pub fn best_action(&self, state: &S) -> Action {
        let values = match self.values.get(state) {
            Some(values) => values,
            None => return self.actions[0],
        };
        let mut best = 0;
        for (i, value) in values.iter().enumerate().skip(1) {
            if *value > values[best] {
                best = i;
            }
        }
        self.actions[best]
    }

    /// Same as `best_action`, only looking at `candidates`. `None` if no candidate is an
    /// action of this table.
    pub fn best_action_among(&self, state: &S, candidates: &[Action]) -> Option<Action> {
        let values = self.values.get(state);
        let mut best: Option<(Action, f64)> = None;
        for (i, action) in self.actions.iter().enumerate() {
            if !candidates.contains(action) {
                continue;
            }
            let value = values.map_or(NEUTRAL_VALUE, |values| values[i]);
            match best {
                Some((_, best_value)) if value <= best_value => {}
                _ => best = Some((*action, value)),
            }
        }
        best.map(|(action, _)| action)
    }

    pub fn max_value(&self, state: &S) -> f64 {
        match self.values.get(state) {
            Some(values) => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            None => NEUTRAL_VALUE,
        }
    }

    pub fn contains(&self, state: &S) -> bool {
        self.values.contains_key(state)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn states(&self) -> impl Iterator<Item = &S> + '_ {
        self.values.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&S, &[f64])> + '_ {
        self.values.iter().map(|(state, values)| (state, values.as_slice()))
    }

    pub fn to_map(&self) -> HashMap<S, Vec<f64>> {
        self.values.clone()
    }

    /// Writes the table next to `path` first, then moves it in place, so a crash never
    /// leaves a half written table behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut entries: Vec<(S, Vec<f64>)> = self.to_map().into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let saved = SavedTable {
            schema: S::SCHEMA.to_string(),
            actions: self.actions.clone(),
            entries,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let temp_path = temporary_path(path);
        {
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            bincode::serialize_into(&mut writer, &saved)
                .map_err(|e| BlackjackError::CorruptTable(e.to_string()))?;
            writer.flush()?;
        }
        fs::rename(&temp_path, path)?;
        info!("Saved {} states to {}", self.len(), path.display());
        Ok(())
    }

    /// Reads a table saved by `save`. The stored actions must be exactly `actions`, in the
    /// same order, and the stored states must be of this state type.
    pub fn load(path: &Path, actions: &[Action]) -> Result<Self> {
        let bytes = fs::read(path)?;
        let saved: SavedTable<S> = bincode::deserialize(&bytes)
            .map_err(|e| BlackjackError::CorruptTable(e.to_string()))?;

        if saved.schema != S::SCHEMA {
            return Err(BlackjackError::CorruptTable(format!(
                "states are {}, expected {}",
                saved.schema,
                S::SCHEMA
            )));
        }
        if saved.actions != actions {
            return Err(BlackjackError::CorruptTable(format!(
                "actions are {:?}, expected {:?}",
                saved.actions, actions
            )));
        }

        let mut table = Self::new(actions)?;
        for (state, values) in saved.entries {
            if values.len() != actions.len() {
                return Err(BlackjackError::CorruptTable(format!(
                    "{:?} has {} values for {} actions",
                    state,
                    values.len(),
                    actions.len()
                )));
            }
            table.values.insert(state, values);
        }
        info!("Loaded {} states from {}", table.len(), path.display());
        Ok(table)
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut file_name = path.file_name().unwrap_or_default().to_os_string();
    file_name.push(".tmp");
    path.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CategorizedGameState, GameState, Probability};

    const ACTIONS: [Action; 2] = [Action::Stand, Action::Hit];

    fn state(player_cards_sum: u8, busting: u8) -> GameState {
        GameState {
            player_cards_qty: 2,
            player_cards_sum,
            player_has_soft_hand: false,
            player_busting_probability: Probability::from_hundredths(busting),
            dealer_open_card: 6,
            dealer_draw_probability: Probability::from_hundredths(90),
            dealer_busting_probability: Probability::from_hundredths(42),
        }
    }

    #[test]
    fn needs_two_actions() {
        assert!(matches!(
            QTable::<GameState>::new(&[Action::Hit]),
            Err(BlackjackError::TooFewActions(1))
        ));
        assert!(matches!(
            QTable::<GameState>::new(&[Action::Hit, Action::Hit]),
            Err(BlackjackError::InvalidAction(Action::Hit))
        ));
        let table = QTable::<GameState>::new(&ACTIONS).unwrap();
        assert_eq!(table.best_action(&state(12, 10)), Action::Stand);
        assert!(table.is_empty());
    }

    #[test]
    fn reading_materializes_unseen_states() {
        let mut table = QTable::<GameState>::new(&ACTIONS).unwrap();
        assert_eq!(table.value(&state(12, 10), Action::Hit).unwrap(), 0.0);
        assert!(!table.contains(&state(12, 10)));
        assert_eq!(table.get_value(&state(12, 10), Action::Hit).unwrap(), 0.0);
        assert!(table.contains(&state(12, 10)));
        assert_eq!(table.values(&state(12, 10)).unwrap(), &[0.0, 0.0]);
        assert!(matches!(
            table.get_value(&state(12, 10), Action::Split),
            Err(BlackjackError::InvalidAction(Action::Split))
        ));
    }

    #[test]
    fn best_action_breaks_ties_by_order() {
        let mut table = QTable::<GameState>::new(&[Action::Hit, Action::Stand]).unwrap();
        let s = state(15, 40);
        table.set_value(&s, Action::Stand, 0.5).unwrap();
        table.set_value(&s, Action::Hit, 0.5).unwrap();
        assert_eq!(table.best_action(&s), Action::Hit);
        table.set_value(&s, Action::Stand, 0.6).unwrap();
        assert_eq!(table.best_action(&s), Action::Stand);
        assert_eq!(table.max_value(&s), 0.6);

        let negative = state(16, 50);
        table.set_value(&negative, Action::Hit, -0.2).unwrap();
        table.set_value(&negative, Action::Stand, -0.1).unwrap();
        assert_eq!(table.best_action(&negative), Action::Stand);
        assert_eq!(table.max_value(&negative), -0.1);
        assert_eq!(table.best_action_among(&negative, &[Action::Hit]), Some(Action::Hit));
        assert_eq!(table.best_action_among(&negative, &[Action::Double]), None);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tables").join("q.bin");
        let mut table = QTable::<GameState>::new(&ACTIONS).unwrap();
        for sum in 4..=21 {
            table.set_value(&state(sum, sum), Action::Stand, sum as f64 / 7.0).unwrap();
            table.set_value(&state(sum, sum), Action::Hit, -(sum as f64) / 3.0).unwrap();
        }
        table.touch(&state(30, 0));
        table.save(&path).unwrap();
        assert!(!temporary_path(&path).exists());

        let loaded = QTable::<GameState>::load(&path, &ACTIONS).unwrap();
        assert_eq!(loaded.len(), table.len());
        assert_eq!(loaded.to_map(), table.to_map());
        for s in table.states() {
            assert_eq!(loaded.best_action(s), table.best_action(s));
        }
    }

    #[test]
    fn saving_twice_gives_the_same_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = QTable::<GameState>::new(&ACTIONS).unwrap();
        for sum in 4..=21 {
            table.set_value(&state(sum, 30), Action::Hit, sum as f64).unwrap();
        }
        let first = dir.path().join("first.bin");
        let second = dir.path().join("second.bin");
        table.save(&first).unwrap();
        table.clone().save(&second).unwrap();
        assert_eq!(fs::read(first).unwrap(), fs::read(second).unwrap());
    }

    #[test]
    fn load_rejects_other_actions_and_schemas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.bin");
        let mut table = QTable::<GameState>::new(&ACTIONS).unwrap();
        table.set_value(&state(18, 60), Action::Stand, 1.0).unwrap();
        table.save(&path).unwrap();

        assert!(matches!(
            QTable::<GameState>::load(&path, &[Action::Hit, Action::Stand]),
            Err(BlackjackError::CorruptTable(_))
        ));
        assert!(matches!(
            QTable::<GameState>::load(&path, &[Action::Stand, Action::Hit, Action::Double]),
            Err(BlackjackError::CorruptTable(_))
        ));
        assert!(matches!(
            QTable::<CategorizedGameState>::load(&path, &ACTIONS),
            Err(BlackjackError::CorruptTable(_))
        ));
    }

    #[test]
    fn load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.bin");
        assert!(matches!(
            QTable::<GameState>::load(&missing, &ACTIONS),
            Err(BlackjackError::Io(_))
        ));

        let garbage = dir.path().join("garbage.bin");
        fs::write(&garbage, b"definitely not a table").unwrap();
        assert!(matches!(
            QTable::<GameState>::load(&garbage, &ACTIONS),
            Err(BlackjackError::CorruptTable(_))
        ));
    }

    #[test]
    fn insert_values_checks_length() {
        let mut table = QTable::<GameState>::new(&ACTIONS).unwrap();
        assert!(table.insert_values(state(10, 0), vec![1.0]).is_err());
        table.insert_values(state(10, 0), vec![1.0, 2.0]).unwrap();
        assert_eq!(table.best_action(&state(10, 0)), Action::Hit);
        assert!(table.empty_like().is_empty());
        assert_eq!(table.empty_like().actions(), &ACTIONS);
    }
}
