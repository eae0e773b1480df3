//! Execution and reconciliation loop for `agent run`.
//!
//! Each episode observes the level, refreshes beliefs and the transition,
//! plans against the believed physics and executes the plan step by step.
//! Whenever the environment disagrees with the prediction, beliefs are
//! repaired, the action is undone and sent again.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::agents::critic::Critic;
use crate::agents::repair::{Mismatch, repair};
use crate::agents::transition::{PLACEHOLDER_SOURCE, TransitionRunner};
use crate::core::action::{Action, format_plan};
use crate::core::world::{Outcome, WorldState};
use crate::io::belief_store::BeliefStore;
use crate::io::config::{AgentConfig, Algorithm};
use crate::io::environment::Environment;
use crate::io::episode_log::{EpisodeEnd, EpisodeMeta, EpisodeWriteRequest, write_episode};
use crate::io::oracle::Oracle;
use crate::io::paths::AgentPaths;
use crate::planner::plan_to_win;

/// The configured number of episodes ran without a win.
#[derive(Debug, Error)]
#[error("no win after {episodes} episodes (max_episodes = {max_episodes})")]
pub struct EpisodeLimitReachedError {
    pub episodes: u32,
    pub max_episodes: u32,
}

/// Loop settings taken from the agent config.
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub algorithm: Algorithm,
    pub max_depth: usize,
    pub max_debug_attempts: u32,
    pub max_episodes: Option<u32>,
}

impl LoopSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            algorithm: config.planner.algorithm,
            max_depth: config.planner.max_depth,
            max_debug_attempts: config.repair.max_debug_attempts,
            max_episodes: config.max_episodes,
        }
    }
}

/// Summary of one episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeOutcome {
    pub episode: u32,
    pub plan: Option<Vec<Action>>,
    pub actions_executed: usize,
    pub repairs: u32,
    pub outcome: Outcome,
    pub end: EpisodeEnd,
}

/// Summary of a won level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub level_id: u32,
    pub episodes: u32,
    pub plan: Vec<Action>,
}

struct Execution {
    actions_executed: usize,
    repairs: u32,
    real: WorldState,
    end: EpisodeEnd,
}

/// Load stored beliefs and the stored transition source, or start fresh.
///
/// A fresh start discards stored memory by installing the placeholder source
/// and writing an empty belief file on the first update.
pub fn restore_memory<S: Oracle>(
    paths: &AgentPaths,
    fresh: bool,
    runner: &mut TransitionRunner<S>,
) -> Result<BeliefStore> {
    if fresh {
        runner.persist_to(&paths.physics_path);
        runner.install(PLACEHOLDER_SOURCE)?;
        return Ok(BeliefStore::at(&paths.beliefs_path));
    }
    if !runner.restore(&paths.physics_path)? {
        runner.install(PLACEHOLDER_SOURCE)?;
    }
    BeliefStore::load(&paths.beliefs_path)
}

/// The agent: environment, oracles, beliefs and installed transition.
pub struct Agent<E, I, S> {
    env: E,
    critic: Critic<I>,
    runner: TransitionRunner<S>,
    beliefs: BeliefStore,
    settings: LoopSettings,
    episodes_dir: Option<PathBuf>,
}

impl<E, I, S> Agent<E, I, S>
where
    E: Environment,
    I: Oracle,
    S: Oracle,
{
    pub fn new(
        env: E,
        critic: Critic<I>,
        runner: TransitionRunner<S>,
        beliefs: BeliefStore,
        settings: LoopSettings,
    ) -> Self {
        Self {
            env,
            critic,
            runner,
            beliefs,
            settings,
            episodes_dir: None,
        }
    }

    /// Write per-episode artifacts under `dir`.
    pub fn with_episode_log(mut self, dir: impl Into<PathBuf>) -> Self {
        self.episodes_dir = Some(dir.into());
        self
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn beliefs(&self) -> &BeliefStore {
        &self.beliefs
    }

    pub fn runner(&self) -> &TransitionRunner<S> {
        &self.runner
    }

    pub fn critic(&self) -> &Critic<I> {
        &self.critic
    }

    /// Play `level_id` until the environment reports a win.
    ///
    /// Fails with [`EpisodeLimitReachedError`] when `max_episodes` is set and
    /// exhausted; contradictory beliefs and exhausted resynthesis also end the
    /// run with their typed errors.
    #[instrument(skip_all, fields(level_id = level_id))]
    pub fn run(&mut self, level_id: u32) -> Result<RunOutcome> {
        info!(level_id, "loading level");
        self.env
            .load_level(level_id)
            .with_context(|| format!("load level {level_id}"))?;

        let mut episode = 0u32;
        loop {
            let limit = self.settings.max_episodes.filter(|&max| episode >= max);
            if let Some(max_episodes) = limit {
                return Err(EpisodeLimitReachedError {
                    episodes: episode,
                    max_episodes,
                }
                .into());
            }
            episode += 1;

            let started = Instant::now();
            let outcome = self.run_episode(episode)?;
            self.log_episode(level_id, &outcome, started)?;

            if outcome.end == EpisodeEnd::Won {
                let plan = outcome.plan.unwrap_or_default();
                info!(level_id, episodes = episode, plan = %format_plan(&plan), "level won");
                return Ok(RunOutcome {
                    level_id,
                    episodes: episode,
                    plan,
                });
            }
        }
    }

    /// Perceive, refresh beliefs and transition, plan and execute once.
    #[instrument(skip_all, fields(episode = episode))]
    pub fn run_episode(&mut self, episode: u32) -> Result<EpisodeOutcome> {
        let start = self.env.get_state().context("observe initial state")?;
        self.critic
            .infer_player_and_win_condition(&start, &mut self.beliefs)?;
        let beliefs = self.beliefs.to_json()?;
        self.runner.implement_belief(&beliefs)?;

        let plan = self.plan(&start)?;
        let Some(actions) = plan.clone() else {
            info!(episode, max_depth = self.settings.max_depth, "no plan found");
            return Ok(EpisodeOutcome {
                episode,
                plan: None,
                actions_executed: 0,
                repairs: 0,
                outcome: start.outcome(),
                end: EpisodeEnd::NoPlan,
            });
        };
        info!(episode, plan = %format_plan(&actions), "executing plan");

        let execution = self.execute_plan(&start, &actions)?;
        info!(
            episode,
            executed = execution.actions_executed,
            repairs = execution.repairs,
            end = ?execution.end,
            "episode finished"
        );
        Ok(EpisodeOutcome {
            episode,
            plan,
            actions_executed: execution.actions_executed,
            repairs: execution.repairs,
            outcome: execution.real.outcome(),
            end: execution.end,
        })
    }

    fn plan(&mut self, start: &WorldState) -> Result<Option<Vec<Action>>> {
        plan_to_win(
            self.settings.algorithm,
            &mut self.runner,
            start,
            Some(self.settings.max_depth),
        )
    }

    fn execute_plan(&mut self, initial: &WorldState, plan: &[Action]) -> Result<Execution> {
        let mut simulated = initial.clone();
        let mut real = initial.clone();
        let mut actions_executed = 0usize;
        let mut repairs = 0u32;

        for &action in plan {
            if real.outcome() == Outcome::Win {
                break;
            }
            let previous = simulated;
            let before = real.clone();

            simulated = self.runner.run(&previous, action)?;
            self.env.send_action(action)?;
            real = self.env.get_state().context("observe state after action")?;
            actions_executed += 1;

            if simulated != real {
                warn!(action = %action, "prediction diverged from environment");
                simulated = repair(
                    &self.critic,
                    &mut self.runner,
                    &mut self.beliefs,
                    self.settings.max_debug_attempts,
                    Mismatch {
                        action,
                        previous: &previous,
                        simulated: &simulated,
                        real: &real,
                    },
                )?;
                repairs += 1;

                self.env.undo(1)?;
                let restored = self.env.get_state().context("observe state after undo")?;
                if restored != before {
                    warn!(action = %action, "undo did not restore the pre-action state, re-perceiving");
                    return Ok(Execution {
                        actions_executed,
                        repairs,
                        real: restored,
                        end: EpisodeEnd::Desynced,
                    });
                }
                self.env.send_action(action)?;
                real = self.env.get_state().context("observe state after resend")?;
            }
        }

        let end = if real.outcome() == Outcome::Win {
            EpisodeEnd::Won
        } else {
            EpisodeEnd::PlanExhausted
        };
        Ok(Execution {
            actions_executed,
            repairs,
            real,
            end,
        })
    }

    fn log_episode(&self, level_id: u32, outcome: &EpisodeOutcome, started: Instant) -> Result<()> {
        let Some(dir) = &self.episodes_dir else {
            return Ok(());
        };
        let meta = EpisodeMeta {
            level_id,
            episode: outcome.episode,
            plan: outcome.plan.clone(),
            actions_executed: outcome.actions_executed,
            repairs: outcome.repairs,
            outcome: outcome.outcome,
            end: outcome.end,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        let beliefs = self.beliefs.to_json()?;
        write_episode(&EpisodeWriteRequest {
            episodes_dir: dir,
            meta: &meta,
            beliefs_json: &beliefs,
            physics_source: self.runner.source(),
        })
        .context("write episode log")?;
        Ok(())
    }
}
