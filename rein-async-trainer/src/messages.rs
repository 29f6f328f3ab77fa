use crate::WorkerStat;

/// Messages that the [`Coordinator`](crate::Coordinator) receives from workers.
#[derive(Clone, Debug)]
pub enum WorkerMessage {
    /// An episode finished, truncated ones included.
    EpisodeFinished {
        /// Worker id.
        worker: usize,

        /// Undiscounted return.
        episode_return: f32,

        /// Number of steps.
        episode_length: usize,
    },

    /// An update was skipped because of non-finite values.
    UpdateSkipped {
        /// Worker id.
        worker: usize,
    },

    /// A proposed step was rejected by its constraint.
    StepRejected {
        /// Worker id.
        worker: usize,
    },

    /// The worker left its loop.
    Finished(WorkerStat),

    /// The worker stopped with an error.
    Failed {
        /// Worker id.
        worker: usize,

        /// Description of the error.
        error: String,
    },
}
