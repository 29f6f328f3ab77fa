use crate::{
    CoordinatorConfig, CoordinatorStat, SharedParams, SyncModel, Worker, WorkerMessage,
};
use anyhow::{anyhow, bail, Result};
use crossbeam_channel::unbounded;
use log::{debug, info, warn};
use rein_core::{model::ParamSync, Env};
use std::{
    sync::{atomic::AtomicUsize, Arc, Mutex},
    thread::JoinHandle,
};

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Runs [`Worker`]s sharing one parameter store.
///
/// ```mermaid
/// flowchart LR
///   subgraph Workers
///     W1[Worker 1]
///     W2[Worker N]
///   end
///   W1-->|commit delta|P[SharedParams]
///   W2-->|commit delta|P
///   P-->|pull|W1
///   P-->|pull|W2
///   W1-->|WorkerMessage|C[Coordinator]
///   W2-->|WorkerMessage|C
/// ```
///
/// Each worker thread builds its own environment and agent, so neither needs
/// to be `Send`. The agent commits its update steps to [`SharedParams`] and
/// pulls the shared parameters every `sync_interval` steps. Target network
/// refreshes stay local to each agent.
///
/// Setting the stop flag ends the workers after their current step; a commit in
/// flight completes because it holds the store lock.
pub struct Coordinator {
    config: CoordinatorConfig,
    stop: Arc<Mutex<bool>>,
}

impl Coordinator {
    /// Builds a coordinator.
    pub fn build(config: CoordinatorConfig) -> Self {
        Self {
            config,
            stop: Arc::new(Mutex::new(false)),
        }
    }

    /// Flag stopping the workers, for use from another thread.
    pub fn stop_flag(&self) -> Arc<Mutex<bool>> {
        self.stop.clone()
    }

    /// Stops the workers.
    pub fn stop(&self) {
        let mut stop = self.stop.lock().unwrap_or_else(|e| e.into_inner());
        *stop = true;
    }

    /// Runs the workers until the step budget is used up or the stop flag is set.
    ///
    /// `env_builder` and `agent_builder` take the worker id. The agent built
    /// for id `0` in the calling thread provides the initial shared parameters.
    pub fn run<E, A, F, G>(&self, env_builder: F, agent_builder: G) -> Result<CoordinatorStat>
    where
        E: Env + 'static,
        A: SyncModel + 'static,
        F: Fn(usize) -> Result<E> + Send + Sync + 'static,
        G: Fn(usize) -> Result<A> + Send + Sync + 'static,
    {
        if self.config.n_workers == 0 {
            bail!("coordinator requires at least one worker");
        }

        let shared = SharedParams::new(agent_builder(0)?.model_params());
        let steps = Arc::new(AtomicUsize::new(0));
        let env_builder = Arc::new(env_builder);
        let agent_builder = Arc::new(agent_builder);
        let (sender, receiver) = unbounded();

        let mut threads: Vec<JoinHandle<()>> = vec![];
        for id in 0..self.config.n_workers {
            let worker = Worker::build(
                id,
                self.stop.clone(),
                steps.clone(),
                self.config.max_steps,
                self.config.sync_interval,
                self.config.max_episode_timesteps,
                sender.clone(),
            );
            let sender = sender.clone();
            let shared = shared.clone();
            let env_builder = env_builder.clone();
            let agent_builder = agent_builder.clone();

            let handle = std::thread::spawn(move || {
                let result = (|| -> Result<_> {
                    let mut env = (*env_builder)(id)?;
                    let mut agent = (*agent_builder)(id)?;
                    agent.attach(Arc::new(shared) as Arc<dyn ParamSync>);
                    worker.run(&mut env, &mut agent)
                })();
                let msg = match result {
                    Ok(stat) => WorkerMessage::Finished(stat),
                    Err(e) => WorkerMessage::Failed {
                        worker: id,
                        error: e.to_string(),
                    },
                };
                // The receiver lives until all workers are joined
                let _ = sender.send(msg);
            });
            threads.push(handle);
        }
        info!("Started {} workers", self.config.n_workers);
        drop(sender);

        let mut stat = CoordinatorStat {
            steps: 0,
            episodes: 0,
            returns: vec![],
            updates_skipped: vec![0; self.config.n_workers],
            steps_rejected: vec![0; self.config.n_workers],
            workers: vec![],
            store: shared.snapshot(),
        };
        let mut errors = vec![];

        // Ends when all workers have dropped their senders
        for msg in receiver.iter() {
            match msg {
                WorkerMessage::EpisodeFinished {
                    worker,
                    episode_return,
                    episode_length,
                } => {
                    stat.episodes += 1;
                    stat.returns.push(episode_return);
                    debug!(
                        "Worker {}: episode return {}, length {}",
                        worker, episode_return, episode_length
                    );
                }
                WorkerMessage::UpdateSkipped { worker } => stat.updates_skipped[worker] += 1,
                WorkerMessage::StepRejected { worker } => stat.steps_rejected[worker] += 1,
                WorkerMessage::Finished(worker_stat) => {
                    stat.steps += worker_stat.env_steps;
                    stat.workers.push(worker_stat);
                }
                WorkerMessage::Failed { worker, error } => {
                    warn!("Worker {} failed: {}", worker, error);
                    self.stop();
                    errors.push(format!("worker {}: {}", worker, error));
                }
            }
        }

        for handle in threads {
            handle
                .join()
                .map_err(|_| anyhow!("a worker thread panicked"))?;
        }
        if !errors.is_empty() {
            bail!("{}", errors.join("; "));
        }

        stat.workers.sort_by_key(|w| w.id);
        stat.store = shared.snapshot();
        info!("Finished asynchronous training\n{}", stat.fmt());
        Ok(stat)
    }
}
