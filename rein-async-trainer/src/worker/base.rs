use crate::{SyncModel, WorkerMessage, WorkerStat};
use anyhow::Result;
use crossbeam_channel::Sender;
use log::{debug, info};
use rein_core::{Env, State};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Instant,
};

/// Runs the interaction of an agent and an environment in a worker thread.
///
/// Environment steps are claimed one at a time from a counter shared by all
/// workers, so the workers run exactly `max_steps` steps in total. The stop
/// flag is checked before each claim.
pub struct Worker {
    id: usize,
    stop: Arc<Mutex<bool>>,
    steps: Arc<AtomicUsize>,
    max_steps: usize,
    sync_interval: usize,
    max_episode_timesteps: Option<usize>,
    sender: Sender<WorkerMessage>,
}

impl Worker {
    /// Builds a worker.
    pub fn build(
        id: usize,
        stop: Arc<Mutex<bool>>,
        steps: Arc<AtomicUsize>,
        max_steps: usize,
        sync_interval: usize,
        max_episode_timesteps: Option<usize>,
        sender: Sender<WorkerMessage>,
    ) -> Self {
        Self {
            id,
            stop,
            steps,
            max_steps,
            sync_interval: sync_interval.max(1),
            max_episode_timesteps,
            sender,
        }
    }

    fn is_stopped(&self) -> bool {
        *self.stop.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn claim_step(&self) -> bool {
        self.steps.fetch_add(1, Ordering::SeqCst) < self.max_steps
    }

    fn send(&self, msg: WorkerMessage) {
        // The coordinator outlives the workers; a closed channel only drops reports
        if self.sender.send(msg).is_err() {
            debug!("Worker {}: message channel closed", self.id);
        }
    }

    /// Runs the interaction loop until the step budget is used up or the stop
    /// flag is set.
    pub fn run<E, A>(&self, env: &mut E, agent: &mut A) -> Result<WorkerStat>
    where
        E: Env,
        A: SyncModel,
    {
        let mut stat = WorkerStat {
            id: self.id,
            ..WorkerStat::default()
        };
        let time = Instant::now();
        let mut state: Option<State> = None;
        let mut episode_return = 0.0;
        let mut episode_length = 0;

        while !self.is_stopped() && self.claim_step() {
            let s = match state.take() {
                Some(s) => s,
                None => {
                    agent.reset();
                    env.reset()?
                }
            };
            let action = agent.act(&s)?;
            let step = env.step(&action)?;
            stat.env_steps += 1;
            episode_return += step.reward;
            episode_length += 1;

            let truncated = self
                .max_episode_timesteps
                .map_or(false, |n| episode_length >= n);
            let terminal = step.terminal || truncated;
            let before = agent.diagnostics();
            agent.observe(step.reward, terminal)?;
            let after = agent.diagnostics();
            if after.updates_skipped > before.updates_skipped {
                self.send(WorkerMessage::UpdateSkipped { worker: self.id });
            }
            if after.steps_rejected > before.steps_rejected {
                self.send(WorkerMessage::StepRejected { worker: self.id });
            }

            if stat.env_steps % self.sync_interval == 0 {
                agent.sync_model();
            }

            if terminal {
                stat.episodes += 1;
                self.send(WorkerMessage::EpisodeFinished {
                    worker: self.id,
                    episode_return,
                    episode_length,
                });
                episode_return = 0.0;
                episode_length = 0;
            } else {
                state = Some(step.state);
            }
        }

        let diagnostics = agent.diagnostics();
        stat.updates_applied = diagnostics.updates_applied;
        stat.updates_skipped = diagnostics.updates_skipped;
        stat.steps_rejected = diagnostics.steps_rejected;
        stat.duration = time.elapsed();
        info!(
            "Worker {} finished: {} steps, {} episodes, {} updates",
            self.id, stat.env_steps, stat.episodes, stat.updates_applied
        );
        Ok(stat)
    }
}
