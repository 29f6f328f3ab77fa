use log::trace;
use rein_core::model::{ParamSet, ParamSync};
use std::sync::{Arc, Mutex, MutexGuard};

/// Parameters shared by the workers.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamStore {
    /// Current parameters.
    pub params: ParamSet,

    /// Incremented by every commit.
    pub version: usize,

    /// Number of committed steps.
    pub applied: usize,
}

/// Parameter store behind a lock, shared by worker threads.
///
/// A commit adds its delta and reads the result while holding the lock, so
/// commits are serialized and no partial write is observable. Concurrent
/// commits of the same deltas give the same parameters in any order, up to
/// floating point rounding.
#[derive(Clone)]
pub struct SharedParams {
    store: Arc<Mutex<ParamStore>>,
}

impl SharedParams {
    /// Creates the store with initial parameters.
    pub fn new(params: ParamSet) -> Self {
        Self {
            store: Arc::new(Mutex::new(ParamStore {
                params,
                version: 0,
                applied: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<ParamStore> {
        // A worker panicking outside a commit leaves the store consistent
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the store.
    pub fn snapshot(&self) -> ParamStore {
        self.lock().clone()
    }
}

impl ParamSync for SharedParams {
    fn pull(&self) -> ParamSet {
        self.lock().params.clone()
    }

    fn commit(&self, delta: &[f32]) -> ParamSet {
        let mut store = self.lock();
        store.params.add(delta);
        store.version += 1;
        store.applied += 1;
        trace!("Committed step, version {}", store.version);
        store.params.clone()
    }
}
