//! Algorithm-agnostic agent built on a [`Model`] and a [`ReplayMemory`].
use super::{AgentConfig, UpdateTrigger};
use crate::{
    baseline::MultiBaseline,
    error::{ReinError, Result},
    exploration::Exploration,
    memory::{ReplayMemory, ReplayMemoryConfig, TransitionBatch},
    model::{Diagnostics, Model, ParamSet, ParamSync, UpdateOutcome},
    preprocessing::Preprocessing,
    record::{Record, RecordValue},
    Action, Agent, EnvSpec, InternalState, Memory, Network, State, Transition,
};
use log::{info, warn};
use rand::{rngs::StdRng, SeedableRng};
use std::{
    fs::{self, File},
    io::{BufReader, Write},
    path::Path,
    sync::Arc,
};

/// State, internal state and action of an `act` call awaiting its `observe`.
#[derive(Clone, Debug)]
struct Pending {
    state: State,
    internal: InternalState,
    action: Action,
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Agent driving any algorithm of [`AlgorithmConfig`](crate::model::AlgorithmConfig).
///
/// # Act/observe protocol
///
/// ```mermaid
/// graph LR
///     A[act]-->|pending tuple|B[observe]
///     B-->|Transition|C[ReplayMemory]
///     C-->|TransitionBatch|D[Model::update]
///     B-->|terminal|E[episode reset]
/// ```
///
/// * [`Agent::act`] preprocesses the state, evaluates the network with the current
///   internal state, applies exploration in training mode and keeps the tuple
///   `(state, internal state, action)` pending. The internal state advances.
/// * [`Agent::observe`] completes the tuple into a [`Transition`]. In training
///   mode the transition is stored and an update runs when the [`UpdateTrigger`]
///   fires and the memory holds enough transitions. A terminal resets the internal
///   state, the preprocessors and the exploration noise.
///
/// A second `act` before `observe` replaces the pending tuple, restarting from
/// the internal state the replaced tuple started with. With
/// [`AgentConfig::stateless`] set, it is a [`ReinError::SequenceError`].
///
/// Policy-gradient algorithms learn from the whole memory in chronological
/// order and clear it after the update. Q-learning algorithms sample batches of
/// [`AgentConfig::batch_size`] and write the new priorities back to a
/// prioritized memory.
pub struct ModelAgent {
    config: AgentConfig,
    spec: EnvSpec,
    model: Model,
    memory: ReplayMemory,
    demo_memory: Option<ReplayMemory>,
    exploration: Option<Exploration>,
    preprocessing: Preprocessing,
    internal: InternalState,
    pending: Option<Pending>,
    last: Option<Transition>,
    train: bool,
    timestep: usize,
    episode: usize,
    rng: StdRng,
    sync: Option<Arc<dyn ParamSync>>,
}

impl ModelAgent {
    /// Builds an agent for an environment with the given specification.
    ///
    /// The network maps the concatenated preprocessed state components to the
    /// outputs the algorithm reads. Its parameters are initialized from
    /// [`AgentConfig::seed`].
    pub fn build(config: AgentConfig, spec: EnvSpec, network: Arc<dyn Network>) -> Result<Self> {
        let params = network.init_params(&mut StdRng::seed_from_u64(config.seed));
        let engine = config
            .algorithm
            .build_engine(&spec.actions, &config.distribution, config.seed)?;
        let optimizer = config.optimizer.build(params.len())?;
        let model = Model::new(network, params, engine, optimizer)?;
        Self::from_model(config, spec, model)
    }

    /// Builds an agent around an existing model.
    pub fn from_model(config: AgentConfig, spec: EnvSpec, model: Model) -> Result<Self> {
        config.validate(&spec.states, &spec.actions)?;
        let preprocessing = Preprocessing::build(config.preprocessing.as_ref(), &spec.states)?;
        let input_len = preprocessing
            .processed_specs()
            .iter()
            .map(|s| s.len())
            .sum::<usize>();
        if input_len != model.network().input_len() {
            return Err(ReinError::ConfigError(format!(
                "network takes {} inputs, preprocessed states have {} values",
                model.network().input_len(),
                input_len
            )));
        }

        let component_lens = preprocessing
            .processed_specs()
            .iter()
            .map(|s| s.len())
            .collect::<Vec<_>>();
        let baseline = config
            .baseline
            .as_ref()
            .map(|b| MultiBaseline::build(b, &component_lens, config.seed))
            .transpose()?;
        let model = model.with_baseline(baseline);

        let exploration = match &config.exploration {
            Some(e) => Some(Exploration::build(e.clone(), &spec.actions, config.seed)?),
            None => None,
        };
        let demo_memory = config.algorithm.dqfd().map(|dqfd| {
            ReplayMemory::build(
                &config
                    .memory
                    .clone()
                    .capacity(dqfd.demo_memory_capacity)
                    .seed(config.memory.seed + 1),
            )
        });

        info!("Build agent with {:?}", config.algorithm);
        Ok(Self {
            memory: ReplayMemory::build(&config.memory),
            internal: model.network().initial_internal(),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            spec,
            model,
            demo_memory,
            exploration,
            preprocessing,
            pending: None,
            last: None,
            train: true,
            timestep: 0,
            episode: 0,
            sync: None,
        })
    }

    /// The model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The memory.
    pub fn memory(&self) -> &ReplayMemory {
        &self.memory
    }

    /// The specification the agent was built for.
    pub fn spec(&self) -> &EnvSpec {
        &self.spec
    }

    /// Counters of model updates.
    pub fn diagnostics(&self) -> &Diagnostics {
        self.model.diagnostics()
    }

    /// Current internal state.
    pub fn internal(&self) -> &InternalState {
        &self.internal
    }

    /// Commits updates to shared parameters and replaces the online parameters
    /// with them.
    pub fn attach(&mut self, sync: Arc<dyn ParamSync>) {
        self.model.set_params(sync.pull());
        self.sync = Some(sync);
    }

    /// Replaces the online parameters with the shared parameters.
    pub fn pull_params(&mut self) {
        if let Some(sync) = &self.sync {
            self.model.set_params(sync.pull());
        }
    }

    /// Adds expert demonstrations to the demonstration memory of DQFD.
    ///
    /// Nothing is imported if a transition does not match the specification.
    pub fn import_demonstrations(&mut self, transitions: Vec<Transition>) -> Result<()> {
        if self.demo_memory.is_none() {
            return Err(ReinError::ConfigError(
                "demonstrations require the DQFD algorithm".to_string(),
            ));
        }
        self.check_transitions(&transitions)?;
        if let Some(memory) = self.demo_memory.as_mut() {
            memory.import(transitions);
        }
        Ok(())
    }

    /// Checks externally supplied transitions against the preprocessed state
    /// components, the action components and the internal state length.
    fn check_transitions(&self, transitions: &[Transition]) -> Result<()> {
        let state_specs = self.preprocessing.processed_specs();
        let internal_len = self.model.network().internal_len();
        for (i, t) in transitions.iter().enumerate() {
            let invalid = |msg: String| {
                ReinError::ConfigError(format!("imported transition {}: {}", i, msg))
            };
            if t.state.len() != state_specs.len() {
                return Err(invalid(format!(
                    "{} state components, expected {}",
                    t.state.len(),
                    state_specs.len()
                )));
            }
            for (spec, values) in state_specs.iter().zip(t.state.components()) {
                spec.check_values(values).map_err(|e| invalid(e.to_string()))?;
            }
            if t.action.components().len() != self.spec.actions.len() {
                return Err(invalid(format!(
                    "{} action components, expected {}",
                    t.action.components().len(),
                    self.spec.actions.len()
                )));
            }
            for (spec, value) in self.spec.actions.iter().zip(t.action.components()) {
                spec.check_value(value).map_err(|e| invalid(e.to_string()))?;
            }
            let internal_ok = t.internal.as_slice().len() == internal_len
                && t
                    .next_internal
                    .as_ref()
                    .map_or(true, |h| h.as_slice().len() == internal_len);
            if !internal_ok {
                return Err(invalid(format!(
                    "internal states do not have length {}",
                    internal_len
                )));
            }
        }
        Ok(())
    }

    /// Runs `steps` updates on demonstration batches of [`AgentConfig::batch_size`].
    ///
    /// Returns the number of committed updates.
    pub fn pretrain(&mut self, steps: usize) -> Result<usize> {
        let batch_size = self.config.batch_size;
        let mut applied = 0;
        for _ in 0..steps {
            if self.demo_update(batch_size)?.is_some() {
                applied += 1;
            }
        }
        info!("Pretrained on demonstrations: {}/{} updates applied", applied, steps);
        Ok(applied)
    }

    fn demo_update(&mut self, batch_size: usize) -> Result<Option<Record>> {
        let stateful = self.model.is_stateful();
        let memory = match self.demo_memory.as_mut() {
            Some(memory) if batch_size > 0 && memory.len() > batch_size => memory,
            _ => return Ok(None),
        };
        let batch = memory.get_batch(batch_size, true, stateful)?;
        let outcome = self.model.update_demonstrations(&batch)?;
        self.write_priorities(true, &batch);
        Ok(match outcome {
            UpdateOutcome::Applied(record) => Some(record),
            _ => None,
        })
    }

    fn write_priorities(&mut self, demo: bool, batch: &TransitionBatch) {
        if let (Some(ixs), Some(priorities)) = (&batch.indices, self.model.take_priorities()) {
            let memory = match (demo, self.demo_memory.as_mut()) {
                (true, Some(memory)) => memory,
                _ => &mut self.memory,
            };
            memory.update_priorities(ixs, &priorities);
        }
    }

    /// Minimal memory occupancy for an update.
    fn min_occupancy(&self) -> usize {
        if self.config.algorithm.is_on_policy() {
            self.config.first_update.max(1)
        } else {
            // The newest non-terminal transition has no next state yet
            self.config.first_update.max(self.config.batch_size) + 1
        }
    }

    fn triggered(&self, terminal: bool) -> bool {
        if self.memory.len() < self.min_occupancy() {
            return false;
        }
        match self.config.update_trigger {
            UpdateTrigger::EveryKSteps(k) => self.timestep % k.max(1) == 0,
            UpdateTrigger::EpisodeEnd => terminal,
            UpdateTrigger::Occupancy(n) => self.memory.len() >= n,
        }
    }

    fn batch(&mut self) -> Result<TransitionBatch> {
        let requirements = self.model.requirements();
        let stateful = self.model.is_stateful();
        if requirements.on_policy {
            self.memory.sequence(false, false)
        } else if requirements.n_step > 1 {
            self.memory.get_nstep_batch(
                self.config.batch_size,
                requirements.n_step,
                self.config.algorithm.discount(),
                stateful,
            )
        } else {
            self.memory
                .get_batch(self.config.batch_size, requirements.next_states, stateful)
        }
    }

    /// Runs [`AgentConfig::repeat_update`] updates and returns the record of
    /// the last committed one.
    fn update(&mut self) -> Result<Option<Record>> {
        let mut record = None;
        let mut n_applied = 0;
        for _ in 0..self.config.repeat_update {
            let batch = self.batch()?;
            let outcome = match &self.sync {
                Some(sync) => self.model.update_shared(&batch, sync.as_ref())?,
                None => self.model.update(&batch)?,
            };
            self.write_priorities(false, &batch);
            if let UpdateOutcome::Applied(r) = outcome {
                n_applied += 1;
                record = Some(r);
            }

            if let Some(dqfd) = self.config.algorithm.dqfd() {
                let demo_batch_size = dqfd.demo_batch_size(self.config.batch_size);
                if let Some(r) = self.demo_update(demo_batch_size)? {
                    record = Some(match record {
                        Some(record) => record.merge(Record::from_slice(&[(
                            "demo_loss",
                            RecordValue::Scalar(r.get_scalar("loss").unwrap_or(f32::NAN)),
                        )])),
                        None => r,
                    });
                }
            }
        }
        if self.model.requirements().on_policy {
            self.memory.clear();
        }
        Ok(record.map(|r| {
            r.merge(Record::from_scalar("updates_applied", n_applied as f32))
        }))
    }

    fn end_episode(&mut self) {
        self.episode += 1;
        self.internal = self.model.network().initial_internal();
        self.preprocessing.reset();
        if let Some(exploration) = self.exploration.as_mut() {
            exploration.reset();
        }
    }

    /// Saves online and target parameters into `dir`.
    ///
    /// Optimizer moments are not saved and restart from zero after loading.
    pub fn save_params(&self, dir: impl AsRef<Path>) -> anyhow::Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        write_yaml(dir.join("params.yaml"), self.model.params())?;
        if let Some(target) = self.model.target() {
            write_yaml(dir.join("target.yaml"), target)?;
        }
        info!("Save parameters into {:?}", dir);
        Ok(())
    }

    /// Loads parameters saved with [`ModelAgent::save_params`].
    pub fn load_params(&mut self, dir: impl AsRef<Path>) -> anyhow::Result<()> {
        let dir = dir.as_ref();
        let params: ParamSet = read_yaml(dir.join("params.yaml"))?;
        if params.len() != self.model.params().len() {
            return Err(ReinError::ConfigError(format!(
                "saved parameters have length {}, the network has {}",
                params.len(),
                self.model.params().len()
            ))
            .into());
        }
        self.model.set_params(params);
        let target_path = dir.join("target.yaml");
        if target_path.exists() {
            self.model.set_target(read_yaml(target_path)?);
        }
        info!("Load parameters from {:?}", dir);
        Ok(())
    }

    /// Memory settings the agent was built with.
    pub fn memory_config(&self) -> &ReplayMemoryConfig {
        &self.config.memory
    }
}

fn write_yaml<T: serde::Serialize>(path: impl AsRef<Path>, value: &T) -> anyhow::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(serde_yaml::to_string(value)?.as_bytes())?;
    Ok(())
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    let file = File::open(path)?;
    let rdr = BufReader::new(file);
    Ok(serde_yaml::from_reader(rdr)?)
}

impl Agent for ModelAgent {
    fn act(&mut self, state: &State) -> Result<Action> {
        if let Some(pending) = self.pending.take() {
            if self.config.stateless {
                self.pending = Some(pending);
                return Err(ReinError::SequenceError(
                    "act called twice without observe".to_string(),
                ));
            }
            warn!("pending action overwritten before observe");
            self.internal = pending.internal;
        }

        let state = self.preprocessing.process(state.clone());
        let (action, next_internal) =
            self.model
                .act(&state, &self.internal, !self.train, &mut self.rng)?;
        let action = match (self.exploration.as_mut(), self.train) {
            (Some(exploration), true) => exploration.explore(action, self.timestep),
            _ => action,
        };

        let internal = std::mem::replace(&mut self.internal, next_internal);
        self.pending = Some(Pending {
            state,
            internal,
            action: action.clone(),
        });
        Ok(action)
    }

    fn observe(&mut self, reward: f32, terminal: bool) -> Result<Option<Record>> {
        let pending = self.pending.take().ok_or_else(|| {
            ReinError::SequenceError("observe called without a pending action".to_string())
        })?;
        let next_internal = if self.model.is_stateful() {
            Some(self.internal.clone())
        } else {
            None
        };
        let transition = Transition {
            state: pending.state,
            internal: pending.internal,
            action: pending.action,
            reward,
            terminal,
            next_internal,
        };
        self.timestep += 1;

        let mut record = None;
        if self.train {
            self.memory.add(transition.clone());
            if self.triggered(terminal) {
                record = self.update()?;
            }
            if let Some(sync) = &self.config.target_sync {
                if self.timestep % sync.frequency == 0 {
                    self.model.update_target(sync.weight);
                }
            }
        }

        self.last = Some(transition);
        if terminal {
            self.end_episode();
        }
        Ok(record)
    }

    fn import_observations(&mut self, transitions: Vec<Transition>) -> Result<()> {
        self.check_transitions(&transitions)?;
        self.memory.import(transitions);
        Ok(())
    }

    fn last_observation(&self) -> Option<&Transition> {
        self.last.as_ref()
    }

    fn reset(&mut self) {
        if self.pending.take().is_some() {
            warn!("pending action dropped at episode reset");
        }
        self.internal = self.model.network().initial_internal();
        self.preprocessing.reset();
        if let Some(exploration) = self.exploration.as_mut() {
            exploration.reset();
        }
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        agent::TargetSyncConfig,
        memory::PerConfig,
        model::{AlgorithmConfig, DqnConfig, OptimizerConfig},
        network::{Linear, Recurrent},
        ActionSpec, StateSpec,
    };
    use tempdir::TempDir;

    fn spec() -> EnvSpec {
        EnvSpec {
            states: vec![StateSpec::new(vec![2])],
            actions: vec![ActionSpec::discrete(2)],
        }
    }

    fn state(x: f32) -> State {
        State::single(vec![x, 1.0])
    }

    fn dqn_config() -> AgentConfig {
        AgentConfig::default()
            .algorithm(AlgorithmConfig::Dqn(DqnConfig::default()))
            .optimizer(OptimizerConfig::Sgd { lr: 0.01 })
            .batch_size(4)
            .update_trigger(UpdateTrigger::EveryKSteps(1))
            .memory(ReplayMemoryConfig::default().capacity(100))
    }

    #[test]
    fn test_observe_without_act() -> Result<()> {
        let mut agent = ModelAgent::build(AgentConfig::default(), spec(), Arc::new(Linear::new(2, 2)))?;
        assert!(matches!(agent.observe(1.0, false), Err(ReinError::SequenceError(_))));
        Ok(())
    }

    #[test]
    fn test_double_act() -> Result<()> {
        let mut agent = ModelAgent::build(AgentConfig::default(), spec(), Arc::new(Linear::new(2, 2)))?;
        agent.act(&state(0.1))?;
        agent.act(&state(0.2))?;
        agent.observe(1.0, false)?;
        assert_eq!(agent.memory().len(), 1);
        assert_eq!(agent.last_observation().unwrap().state, state(0.2));

        let config = AgentConfig::default().stateless(true);
        let mut agent = ModelAgent::build(config, spec(), Arc::new(Linear::new(2, 2)))?;
        agent.act(&state(0.1))?;
        assert!(matches!(agent.act(&state(0.2)), Err(ReinError::SequenceError(_))));
        // The first pending tuple survives the rejected call
        agent.observe(1.0, true)?;
        assert_eq!(agent.last_observation().unwrap().state, state(0.1));
        Ok(())
    }

    #[test]
    fn test_internal_state_threading() -> Result<()> {
        let network = Arc::new(Recurrent::new(2, 3, 2));
        let mut agent = ModelAgent::build(AgentConfig::default(), spec(), network)?;
        for t in 0..3 {
            agent.act(&state(t as f32))?;
            let before = agent.pending.as_ref().unwrap().internal.clone();
            let after = agent.internal().clone();
            agent.observe(0.5, false)?;
            let last = agent.last_observation().unwrap();
            assert_eq!(last.internal, before);
            assert_eq!(last.next_internal.as_ref(), Some(&after));
        }
        agent.act(&state(4.0))?;
        agent.observe(0.5, true)?;
        assert_eq!(agent.internal(), &InternalState::zeros(3));
        Ok(())
    }

    #[test]
    fn test_eval_mode_stores_nothing() -> Result<()> {
        let mut agent = ModelAgent::build(dqn_config(), spec(), Arc::new(Linear::new(2, 2)))?;
        agent.eval();
        for t in 0..10 {
            agent.act(&state(t as f32))?;
            assert!(agent.observe(1.0, t == 9)?.is_none());
        }
        assert_eq!(agent.memory().len(), 0);
        assert_eq!(agent.timestep(), 10);
        assert_eq!(agent.episode(), 1);
        assert_eq!(agent.diagnostics().updates_applied, 0);
        Ok(())
    }

    #[test]
    fn test_off_policy_updates_after_warmup() -> Result<()> {
        let config = dqn_config().memory(
            ReplayMemoryConfig::default()
                .capacity(100)
                .per_config(Some(PerConfig::default())),
        );
        let mut agent = ModelAgent::build(config, spec(), Arc::new(Linear::new(2, 2)))?;
        for t in 0..20 {
            agent.act(&state(0.1 * t as f32))?;
            let record = agent.observe(1.0, t % 5 == 4)?;
            // batch_size + 1 transitions are needed for the first update
            assert_eq!(record.is_some(), t >= 4);
        }
        assert_eq!(agent.diagnostics().updates_applied, 16);
        Ok(())
    }

    #[test]
    fn test_on_policy_clears_memory() -> Result<()> {
        let mut agent = ModelAgent::build(AgentConfig::default(), spec(), Arc::new(Linear::new(2, 2)))?;
        for t in 0..4 {
            agent.act(&state(t as f32))?;
            agent.observe(1.0, false)?;
        }
        assert_eq!(agent.memory().len(), 4);
        agent.act(&state(4.0))?;
        assert!(agent.observe(1.0, true)?.is_some());
        assert_eq!(agent.memory().len(), 0);
        assert_eq!(agent.episode(), 1);
        Ok(())
    }

    #[test]
    fn test_target_sync_schedule() -> Result<()> {
        let config = dqn_config().target_sync(Some(TargetSyncConfig {
            frequency: 10,
            weight: 1.0,
        }));
        let mut agent = ModelAgent::build(config, spec(), Arc::new(Linear::new(2, 2)))?;
        let initial = agent.model().target().unwrap().clone();
        for t in 0..9 {
            agent.act(&state(0.1 * t as f32))?;
            agent.observe(1.0, false)?;
        }
        assert_eq!(agent.model().target().unwrap(), &initial);
        agent.act(&state(1.0))?;
        agent.observe(1.0, false)?;
        assert_eq!(agent.model().target().unwrap(), agent.model().params());
        Ok(())
    }

    #[test]
    fn test_save_and_load_params() -> anyhow::Result<()> {
        let mut agent = ModelAgent::build(dqn_config(), spec(), Arc::new(Linear::new(2, 2)))?;
        for t in 0..10 {
            agent.act(&state(0.1 * t as f32))?;
            agent.observe(1.0, false)?;
        }
        let dir = TempDir::new("model_agent")?;
        agent.save_params(dir.path())?;

        let mut other = ModelAgent::build(
            dqn_config().seed(7),
            spec(),
            Arc::new(Linear::new(2, 2)),
        )?;
        assert_ne!(other.model().params(), agent.model().params());
        other.load_params(dir.path())?;
        assert_eq!(other.model().params(), agent.model().params());
        assert_eq!(other.model().target(), agent.model().target());
        assert_eq!(other.model().optimizer().steps(), 0);
        Ok(())
    }

    #[test]
    fn test_import_rejects_transitions_outside_spec() -> Result<()> {
        let mut agent = ModelAgent::build(dqn_config(), spec(), Arc::new(Linear::new(2, 2)))?;
        let out_of_range = (0..10)
            .map(|t| Transition::new(state(t as f32), Action::discrete(5), 1.0, false))
            .collect::<Vec<_>>();
        assert!(matches!(
            agent.import_observations(out_of_range),
            Err(ReinError::ConfigError(_))
        ));

        let mut mixed = vec![Transition::new(state(0.0), Action::discrete(1), 1.0, false)];
        mixed.push(Transition::new(state(1.0), Action::continuous(vec![0.5]), 1.0, false));
        mixed.push(Transition::new(State::single(vec![1.0]), Action::discrete(0), 1.0, true));
        assert!(agent.import_observations(mixed).is_err());
        assert_eq!(agent.memory().len(), 0);

        // The agent still acts and learns on valid data
        for t in 0..10 {
            agent.act(&state(0.1 * t as f32))?;
            agent.observe(1.0, t == 9)?;
        }
        assert!(agent.diagnostics().updates_applied > 0);
        Ok(())
    }

    #[test]
    fn test_network_input_mismatch() {
        let result = ModelAgent::build(AgentConfig::default(), spec(), Arc::new(Linear::new(3, 2)));
        assert!(matches!(result, Err(ReinError::ConfigError(_))));
    }
}
