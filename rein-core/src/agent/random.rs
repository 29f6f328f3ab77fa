//! Agent taking uniformly random actions.
use crate::{
    error::{ReinError, Result},
    record::Record,
    Action, ActionSpec, ActionValue, Agent, EnvSpec, State, Transition,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Samples actions uniformly from the action specification.
///
/// Bounded continuous components are sampled uniformly within their bounds and
/// unbounded ones from a standard normal distribution. Transitions completed in
/// training mode are collected and can be handed to another agent with
/// [`RandomAgent::take_transitions`], e.g. to warm-start its memory.
pub struct RandomAgent {
    spec: EnvSpec,
    rng: StdRng,
    pending: Option<(State, Action)>,
    transitions: Vec<Transition>,
    last: Option<Transition>,
    train: bool,
    timestep: usize,
    episode: usize,
}

impl RandomAgent {
    /// Creates a random agent.
    pub fn new(spec: EnvSpec, seed: u64) -> Self {
        Self {
            spec,
            rng: StdRng::seed_from_u64(seed),
            pending: None,
            transitions: vec![],
            last: None,
            train: true,
            timestep: 0,
            episode: 0,
        }
    }

    /// Returns the collected transitions and empties the collection.
    pub fn take_transitions(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.transitions)
    }

    fn sample(&mut self) -> Action {
        let rng = &mut self.rng;
        Action(
            self.spec
                .actions
                .iter()
                .map(|spec| match spec {
                    ActionSpec::Discrete { num_actions } => {
                        ActionValue::Discrete(rng.gen_range(0..*num_actions))
                    }
                    ActionSpec::Continuous { shape, .. } => ActionValue::Continuous(
                        (0..*shape)
                            .map(|_| match spec.bounds() {
                                Some((lo, hi)) => rng.gen_range(lo..=hi),
                                None => rng.sample(StandardNormal),
                            })
                            .collect(),
                    ),
                })
                .collect(),
        )
    }
}

impl Agent for RandomAgent {
    fn act(&mut self, state: &State) -> Result<Action> {
        let action = self.sample();
        self.pending = Some((state.clone(), action.clone()));
        Ok(action)
    }

    fn observe(&mut self, reward: f32, terminal: bool) -> Result<Option<Record>> {
        let (state, action) = self.pending.take().ok_or_else(|| {
            ReinError::SequenceError("observe called without a pending action".to_string())
        })?;
        self.timestep += 1;
        if terminal {
            self.episode += 1;
        }
        let transition = Transition::new(state, action, reward, terminal);
        if self.train {
            self.transitions.push(transition.clone());
        }
        self.last = Some(transition);
        Ok(None)
    }

    fn import_observations(&mut self, transitions: Vec<Transition>) -> Result<()> {
        self.transitions.extend(transitions);
        Ok(())
    }

    fn last_observation(&self) -> Option<&Transition> {
        self.last.as_ref()
    }

    fn reset(&mut self) {
        self.pending = None;
    }

    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn timestep(&self) -> usize {
        self.timestep
    }

    fn episode(&self) -> usize {
        self.episode
    }
}
