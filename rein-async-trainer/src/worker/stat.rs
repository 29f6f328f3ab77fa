use std::time::Duration;

/// Stats of the interaction loop in each [`Worker`](crate::Worker).
#[derive(Clone, Debug, Default)]
pub struct WorkerStat {
    /// Worker id.
    pub id: usize,

    /// The number of steps for interaction between agent and env.
    pub env_steps: usize,

    /// Completed episodes.
    pub episodes: usize,

    /// Steps committed to the shared parameters.
    pub updates_applied: usize,

    /// Updates skipped because of non-finite values.
    pub updates_skipped: usize,

    /// Steps rejected by a constraint.
    pub steps_rejected: usize,

    /// Duration of the interaction loop.
    pub duration: Duration,
}

/// Returns a formatted string of the set of [`WorkerStat`] for reporting.
pub fn worker_stats_fmt(stats: &[WorkerStat]) -> String {
    let mut s = "worker id, steps, episodes, updates, steps per sec\n".to_string();
    for stat in stats.iter() {
        let d = stat.duration.as_secs_f32();
        let p = if d > 0.0 { stat.env_steps as f32 / d } else { 0.0 };
        s += format!(
            "{}, {}, {}, {}, {}\n",
            stat.id, stat.env_steps, stat.episodes, stat.updates_applied, p
        )
        .as_str();
    }
    s
}
