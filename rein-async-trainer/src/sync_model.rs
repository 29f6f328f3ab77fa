use rein_core::{
    agent::ModelAgent,
    model::{Diagnostics, ParamSet, ParamSync},
    Agent,
};
use std::sync::Arc;

/// Synchronizes the model of the agent in asynchronous training.
pub trait SyncModel: Agent {
    /// Current online parameters.
    fn model_params(&self) -> ParamSet;

    /// Commits the updates of the agent to `sync` from now on.
    fn attach(&mut self, sync: Arc<dyn ParamSync>);

    /// Replaces the online parameters with the shared ones.
    fn sync_model(&mut self);

    /// Counters of update outcomes.
    fn diagnostics(&self) -> Diagnostics;
}

impl SyncModel for ModelAgent {
    fn model_params(&self) -> ParamSet {
        self.model().params().clone()
    }

    fn attach(&mut self, sync: Arc<dyn ParamSync>) {
        ModelAgent::attach(self, sync)
    }

    fn sync_model(&mut self) {
        self.pull_params()
    }

    fn diagnostics(&self) -> Diagnostics {
        ModelAgent::diagnostics(self).clone()
    }
}
