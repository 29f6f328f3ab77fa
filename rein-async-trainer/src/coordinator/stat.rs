use crate::{worker_stats_fmt, ParamStore, WorkerStat};

/// Stats of a [`Coordinator::run`](crate::Coordinator::run) call.
#[derive(Clone, Debug)]
pub struct CoordinatorStat {
    /// Environment steps over all workers.
    pub steps: usize,

    /// Completed episodes over all workers.
    pub episodes: usize,

    /// Returns of the completed episodes in order of arrival.
    pub returns: Vec<f32>,

    /// Updates skipped because of non-finite values, per worker.
    pub updates_skipped: Vec<usize>,

    /// Steps rejected by a constraint, per worker.
    pub steps_rejected: Vec<usize>,

    /// Stats of the workers, ordered by id.
    pub workers: Vec<WorkerStat>,

    /// Shared parameters after the last commit.
    pub store: ParamStore,
}

impl CoordinatorStat {
    /// Steps committed to the shared parameters, per worker.
    pub fn updates_applied(&self) -> Vec<usize> {
        self.workers.iter().map(|w| w.updates_applied).collect()
    }

    /// Returns a formatted string for reporting.
    pub fn fmt(&self) -> String {
        format!(
            "steps: {}, episodes: {}, parameter version: {}\n{}",
            self.steps,
            self.episodes,
            self.store.version,
            worker_stats_fmt(&self.workers)
        )
    }
}
