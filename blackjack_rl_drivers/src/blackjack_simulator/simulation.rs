use std::sync::Arc;
use std::thread;
use std::time::Duration;

use self::private::Scoreboard;
use blackjack_rl::agent::Agent;
use blackjack_rl::arena::GameSimulator;
use blackjack_rl::calculation::ProbabilityEngine;
use blackjack_rl::simulation::DefaultGame;
use blackjack_rl_drivers::ConfigSimulator;
use log::info;

mod private {
    #[derive(Debug, Clone, Default)]
    pub struct Scoreboard {
        name: String,
        last_score: i64,
        last_rounds: u64,
    }

    impl Scoreboard {
        pub fn new(name: &str) -> Self {
            Scoreboard {
                name: name.to_string(),
                ..Default::default()
            }
        }

        pub fn get_name(&self) -> &str {
            &self.name
        }

        /// Score gained since the previous call.
        pub fn get_delta_score(&mut self, score: i64) -> i64 {
            let ret = score - self.last_score;
            self.last_score = score;
            ret
        }

        pub fn get_delta_rounds(&mut self, rounds: u64) -> u64 {
            let ret = rounds - self.last_rounds;
            self.last_rounds = rounds;
            ret
        }
    }
}

fn rate(score: i64, rounds: u64) -> f64 {
    if rounds == 0 {
        0.0
    } else {
        score as f64 / rounds as f64
    }
}

/// Lets every agent play its own game side by side, printing the scores until all of them
/// are done.
pub fn simulate_side_by_side(
    rule: &blackjack_rl::Rule,
    agents: Vec<(&str, Arc<dyn Agent>)>,
    simulator_config: &ConfigSimulator,
) -> anyhow::Result<()> {
    let engine = Arc::new(ProbabilityEngine::default());
    let mut contenders = Vec::with_capacity(agents.len());
    for (name, agent) in agents {
        let game = DefaultGame::with_engine(rule, Arc::clone(&engine))?;
        let mut simulator = GameSimulator::new(game, agent);
        simulator.start(simulator_config.iterations)?;
        contenders.push((Scoreboard::new(name), simulator));
    }

    let period = Duration::from_millis(simulator_config.report_interval_ms.max(1));
    loop {
        thread::sleep(period);
        let running = contenders
            .iter()
            .any(|(_, simulator)| simulator.is_running());
        for (scoreboard, simulator) in contenders.iter_mut() {
            let (score, rounds) = (simulator.score(), simulator.rounds());
            let delta_score = scoreboard.get_delta_score(score);
            let delta_rounds = scoreboard.get_delta_rounds(rounds);
            println!(
                "{:<16} Score: {}({:+}). Rounds: {}({}). Rate: {:.4}.",
                scoreboard.get_name(),
                score,
                delta_score,
                rounds,
                delta_rounds,
                rate(score, rounds),
            );
        }
        println!("----------------------------------------------------");
        if !running {
            break;
        }
    }

    for (scoreboard, mut simulator) in contenders {
        simulator.wait()?;
        info!(
            "{} finished {} shoe(s) with score {} over {} round(s)",
            scoreboard.get_name(),
            simulator.episodes(),
            simulator.score(),
            simulator.rounds()
        );
    }
    Ok(())
}
