use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::agent::Agent;
use crate::simulation::GameEnvironment;
use crate::state::GameState;
use crate::{Result, RoundResult};

use log::{debug, error};
use parking_lot::Mutex;

/// +1 for a won round, -1 for a lost one, 0 otherwise.
pub fn score_of(result: RoundResult) -> i64 {
    match result {
        RoundResult::Wins | RoundResult::Blackjack => 1,
        RoundResult::Loss | RoundResult::Bust => -1,
        RoundResult::WaitAction | RoundResult::Push => 0,
    }
}

#[derive(Debug, Default)]
struct Counters {
    stop: AtomicBool,
    score: AtomicI64,
    rounds: AtomicU64,
    episodes: AtomicU64,
}

/// Lets an agent play its own environment on a dedicated thread while the caller watches
/// the score. The agent is only ever read, so one agent can be shared by many simulators.
pub struct GameSimulator<E>
where
    E: GameEnvironment<State = GameState> + Send + 'static,
{
    environment: Arc<Mutex<E>>,
    agent: Arc<dyn Agent>,
    counters: Arc<Counters>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl<E> GameSimulator<E>
where
    E: GameEnvironment<State = GameState> + Send + 'static,
{
    pub fn new(environment: E, agent: Arc<dyn Agent>) -> Self {
        GameSimulator {
            environment: Arc::new(Mutex::new(environment)),
            agent,
            counters: Arc::new(Counters::default()),
            handle: None,
        }
    }

    /// Starts playing whole shoes, `episodes` of them or until `stop` when `None`.
    /// Does nothing if already running. A finished previous run is joined first, and its
    /// error, if any, is returned instead of starting again.
    pub fn start(&mut self, episodes: Option<u64>) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        self.wait()?;
        self.counters.stop.store(false, Ordering::SeqCst);
        let environment = Arc::clone(&self.environment);
        let agent = Arc::clone(&self.agent);
        let counters = Arc::clone(&self.counters);
        self.handle = Some(thread::spawn(move || {
            let result = run(&environment, agent.as_ref(), &counters, episodes);
            if let Err(e) = &result {
                error!("Simulation stopped: {}", e);
            }
            result
        }));
        Ok(())
    }

    /// Waits for a finite run to end.
    pub fn wait(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic)),
            None => Ok(()),
        }
    }

    /// Asks the thread to stop after the current action and waits for it.
    pub fn stop(&mut self) -> Result<()> {
        self.counters.stop.store(true, Ordering::SeqCst);
        self.wait()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    pub fn score(&self) -> i64 {
        self.counters.score.load(Ordering::SeqCst)
    }

    pub fn rounds(&self) -> u64 {
        self.counters.rounds.load(Ordering::SeqCst)
    }

    pub fn episodes(&self) -> u64 {
        self.counters.episodes.load(Ordering::SeqCst)
    }

    /// Stops and clears the counters.
    pub fn reset(&mut self) -> Result<()> {
        self.stop()?;
        self.counters.score.store(0, Ordering::SeqCst);
        self.counters.rounds.store(0, Ordering::SeqCst);
        self.counters.episodes.store(0, Ordering::SeqCst);
        Ok(())
    }
}

impl<E> Drop for GameSimulator<E>
where
    E: GameEnvironment<State = GameState> + Send + 'static,
{
    fn drop(&mut self) {
        self.counters.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("Simulation thread panicked");
            }
        }
    }
}

fn run<E: GameEnvironment<State = GameState>>(
    environment: &Mutex<E>,
    agent: &dyn Agent,
    counters: &Counters,
    episodes: Option<u64>,
) -> Result<()> {
    let mut environment = environment.lock();
    let mut played = 0;
    while episodes.map_or(true, |episodes| played < episodes) {
        environment.reset()?;
        while !environment.is_terminated() {
            if counters.stop.load(Ordering::SeqCst) {
                return Ok(());
            }
            let state = environment.state()?;
            let result = environment.play(agent.decide(&state))?;
            counters.score.fetch_add(score_of(result), Ordering::SeqCst);
            if result.is_round_over() {
                counters.rounds.fetch_add(1, Ordering::SeqCst);
            }
        }
        played += 1;
        counters.episodes.fetch_add(1, Ordering::SeqCst);
    }
    Ok(())
}
