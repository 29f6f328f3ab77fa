//! Parameters, optimizer and update engine of an agent.
use super::{
    engine::{EngineContext, UpdateBatch},
    Optimizer, ParamSet, UpdateEngine,
};
use crate::{
    baseline::{cumulative_discount, episode_timesteps, generalized_advantage, normalize},
    baseline::{AdvantageConfig, MultiBaseline},
    error::{ReinError, Result},
    memory::TransitionBatch,
    model::engine::Requirements,
    record::{Record, RecordValue},
    util::all_finite,
    Action, Forward, InternalState, Network, State,
};
use log::{debug, warn};
use rand::rngs::StdRng;
use std::sync::Arc;

/// Phase of [`Model::update`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdatePhase {
    /// No update in progress.
    Idle,

    /// The engine evaluates the loss and its gradient.
    ComputingObjective,

    /// The engine turns the objective into a parameter delta.
    ComputingStep,

    /// The delta and the candidate parameters are checked for non-finite values.
    Validating,

    /// The delta is added to the online parameters.
    Committing,
}

/// Counters of update outcomes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Committed updates.
    pub updates_applied: usize,

    /// Updates skipped because of non-finite values.
    pub updates_skipped: usize,

    /// Steps rejected by a constraint.
    pub steps_rejected: usize,
}

/// Result of [`Model::update`].
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateOutcome {
    /// The step was committed. Holds the metrics of the update.
    Applied(Record),

    /// The update was skipped because of non-finite values.
    Skipped(String),

    /// The step was rejected by a constraint. Parameters are unchanged.
    Rejected(String),
}

impl UpdateOutcome {
    /// Returns `true` if the step was committed.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Observed returns the baseline is fitted to when a step is committed.
#[derive(Clone, Debug, Default)]
pub struct BaselineTargets {
    /// States of the batch.
    pub states: Vec<State>,

    /// Step index of every state within its episode.
    pub timesteps: Vec<usize>,

    /// Discounted returns.
    pub returns: Vec<f32>,
}

/// A validated step that has not been committed.
#[derive(Clone, Debug)]
pub struct ProposedStep {
    /// Parameter delta.
    pub delta: Vec<f32>,

    /// New priorities of the batch transitions.
    pub priorities: Option<Vec<f32>>,

    /// Baseline fit applied together with the delta.
    pub baseline_targets: Option<BaselineTargets>,

    /// Metrics.
    pub record: Record,
}

/// Access to parameters shared between concurrent workers.
///
/// Commits are serialized: an implementation applies the delta and returns the
/// resulting parameters inside one critical section.
pub trait ParamSync: Send + Sync {
    /// Current shared parameters.
    fn pull(&self) -> ParamSet;

    /// Adds `delta` to the shared parameters and returns the result.
    fn commit(&self, delta: &[f32]) -> ParamSet;
}

fn enter(phase: &mut UpdatePhase, next: UpdatePhase) {
    debug!("update phase {:?} -> {:?}", phase, next);
    *phase = next;
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Owns the parameters of an agent and updates them with an [`UpdateEngine`].
///
/// # Update
///
/// [`Model::update`] runs the phases
///
/// ```mermaid
/// graph LR
///     A[Idle]-->B[ComputingObjective]
///     B-->C[ComputingStep]
///     C-->D[Validating]
///     D-->E[Committing]
///     E-->A
///     B-->|error|A
///     C-->|error|A
///     D-->|non-finite|A
/// ```
///
/// The engine sees the online and target parameters through an
/// [`EngineContext`] and returns a delta; nothing is written before the delta
/// and the candidate parameters pass validation. A failed phase leaves the
/// parameters and the baseline untouched; the baseline is fitted on the batch
/// returns only when the step is committed. Optimizer moments advance with
/// every finite gradient the engine steps. Numerical instabilities and
/// constraint rejections are counted in [`Diagnostics`] and reported as an
/// [`UpdateOutcome`], other errors are returned.
///
/// The target parameters are never written by an update. They follow the
/// online parameters only through [`Model::update_target`].
pub struct Model {
    network: Arc<dyn Network>,
    params: ParamSet,
    target: Option<ParamSet>,
    engine: Box<dyn UpdateEngine>,
    optimizer: Optimizer,
    baseline: Option<MultiBaseline>,
    phase: UpdatePhase,
    diagnostics: Diagnostics,
    priorities: Option<Vec<f32>>,
}

impl Model {
    /// Creates a model with the given initial parameters.
    ///
    /// Engines bootstrapping from a target network get a target set equal to
    /// `params`.
    pub fn new(
        network: Arc<dyn Network>,
        params: ParamSet,
        engine: Box<dyn UpdateEngine>,
        optimizer: Optimizer,
    ) -> Result<Self> {
        if params.len() != network.n_params() {
            return Err(ReinError::ConfigError(format!(
                "network has {} parameters, got {}",
                network.n_params(),
                params.len()
            )));
        }
        if network.output_len() != engine.output_len() {
            return Err(ReinError::ConfigError(format!(
                "algorithm reads {} network outputs, network has {}",
                engine.output_len(),
                network.output_len()
            )));
        }
        let target = if engine.requirements().target_network {
            Some(params.clone())
        } else {
            None
        };
        Ok(Self {
            network,
            params,
            target,
            engine,
            optimizer,
            baseline: None,
            phase: UpdatePhase::Idle,
            diagnostics: Diagnostics::default(),
            priorities: None,
        })
    }

    /// Sets the baseline of policy-gradient advantages.
    pub fn with_baseline(mut self, baseline: Option<MultiBaseline>) -> Self {
        self.baseline = baseline;
        self
    }

    /// The network.
    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    /// Online parameters.
    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    /// Replaces the online parameters.
    pub fn set_params(&mut self, params: ParamSet) {
        debug_assert_eq!(params.len(), self.params.len());
        self.params = params;
    }

    /// Target parameters.
    pub fn target(&self) -> Option<&ParamSet> {
        self.target.as_ref()
    }

    /// Replaces the target parameters of an engine that uses them.
    pub fn set_target(&mut self, target: ParamSet) {
        if self.target.is_some() {
            self.target = Some(target);
        }
    }

    /// Optimizer state.
    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    /// Baseline of policy-gradient advantages.
    pub fn baseline(&self) -> Option<&MultiBaseline> {
        self.baseline.as_ref()
    }

    /// Batch requirements of the engine.
    pub fn requirements(&self) -> Requirements {
        self.engine.requirements()
    }

    /// Returns `true` if the network carries an internal state.
    pub fn is_stateful(&self) -> bool {
        self.network.internal_len() > 0
    }

    /// Current phase.
    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    /// Update counters.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Takes the priorities computed by the last committed update.
    pub fn take_priorities(&mut self) -> Option<Vec<f32>> {
        self.priorities.take()
    }

    /// Evaluates the network at the online parameters.
    pub fn forward(&self, state: &State, internal: &InternalState) -> Result<Forward> {
        self.network
            .forward(&self.params, &state.flatten(), internal)
    }

    /// Maps a network output to an action.
    pub fn select_action(&self, output: &[f32], deterministic: bool, rng: &mut StdRng) -> Action {
        self.engine.select_action(output, deterministic, rng)
    }

    /// Action and next internal state for `state`.
    pub fn act(
        &self,
        state: &State,
        internal: &InternalState,
        deterministic: bool,
        rng: &mut StdRng,
    ) -> Result<(Action, InternalState)> {
        let f = self.forward(state, internal)?;
        Ok((
            self.select_action(&f.output, deterministic, rng),
            f.next_internal,
        ))
    }

    /// Updates the online parameters on a batch.
    pub fn update(&mut self, batch: &TransitionBatch) -> Result<UpdateOutcome> {
        self.update_batch(batch, false)
    }

    /// Updates the online parameters on a batch of expert demonstrations.
    pub fn update_demonstrations(&mut self, batch: &TransitionBatch) -> Result<UpdateOutcome> {
        self.update_batch(batch, true)
    }

    fn update_batch(&mut self, batch: &TransitionBatch, demo: bool) -> Result<UpdateOutcome> {
        match self.propose_batch(batch, demo).and_then(|step| self.apply(step)) {
            Ok(record) => Ok(UpdateOutcome::Applied(record)),
            Err(e) => self.recover(e),
        }
    }

    /// Computes and validates a step without committing it.
    pub fn propose(&mut self, batch: &TransitionBatch) -> Result<ProposedStep> {
        self.propose_batch(batch, false)
    }

    fn propose_batch(&mut self, batch: &TransitionBatch, demo: bool) -> Result<ProposedStep> {
        let result = self.compute(batch, demo);
        if result.is_err() {
            enter(&mut self.phase, UpdatePhase::Idle);
        }
        result
    }

    fn compute(&mut self, batch: &TransitionBatch, demo: bool) -> Result<ProposedStep> {
        enter(&mut self.phase, UpdatePhase::ComputingObjective);
        let mut update_batch = UpdateBatch::from_transitions(batch);
        update_batch.demo = demo;
        let mut baseline_targets = None;
        if let Some(config) = self.engine.requirements().advantage {
            let (advantages, targets) = self.advantages(batch, &config)?;
            update_batch.advantages = advantages;
            baseline_targets = targets;
        }

        let ctx = EngineContext {
            network: self.network.as_ref(),
            params: &self.params,
            target: self.target.as_ref(),
        };
        let objective = self.engine.compute_objective(&ctx, &update_batch)?;
        if !objective.loss.is_finite() || !all_finite(&objective.grad) {
            return Err(ReinError::NumericalInstabilityError(format!(
                "non-finite objective, loss = {}",
                objective.loss
            )));
        }
        let priorities = objective.priorities.clone();
        if let Some(p) = priorities.as_ref() {
            if !all_finite(p) {
                return Err(ReinError::NumericalInstabilityError(
                    "non-finite priorities".to_string(),
                ));
            }
        }

        enter(&mut self.phase, UpdatePhase::ComputingStep);
        let step =
            self.engine
                .compute_step(&ctx, &update_batch, objective, &mut self.optimizer)?;

        enter(&mut self.phase, UpdatePhase::Validating);
        if step.delta.len() != self.params.len() {
            return Err(ReinError::NumericalInstabilityError(format!(
                "step has {} values for {} parameters",
                step.delta.len(),
                self.params.len()
            )));
        }
        if !all_finite(&step.delta) || !self.params.added(1.0, &step.delta).is_finite() {
            return Err(ReinError::NumericalInstabilityError(
                "non-finite parameter step".to_string(),
            ));
        }

        Ok(ProposedStep {
            delta: step.delta,
            priorities,
            baseline_targets,
            record: step.record,
        })
    }

    /// Advantages of a chronological batch and the returns to fit the
    /// baseline to.
    fn advantages(
        &self,
        batch: &TransitionBatch,
        config: &AdvantageConfig,
    ) -> Result<(Vec<f32>, Option<BaselineTargets>)> {
        let returns = cumulative_discount(&batch.rewards, &batch.terminals, config.discount);
        let timesteps = episode_timesteps(&batch.terminals);
        let (advantages, targets) = match self.baseline.as_ref() {
            Some(baseline) => {
                let values = baseline.predict(&batch.states, &timesteps)?;
                let advantages = match config.gae_lambda {
                    Some(lambda) => generalized_advantage(
                        &batch.rewards,
                        &batch.terminals,
                        &values,
                        config.discount,
                        lambda,
                    ),
                    None => returns.iter().zip(values.iter()).map(|(r, v)| r - v).collect(),
                };
                let targets = BaselineTargets {
                    states: batch.states.clone(),
                    timesteps,
                    returns,
                };
                (advantages, Some(targets))
            }
            None => (returns, None),
        };

        let advantages = if config.normalize {
            normalize(&advantages)
        } else {
            advantages
        };
        if !all_finite(&advantages) {
            return Err(ReinError::NumericalInstabilityError(
                "non-finite advantages".to_string(),
            ));
        }
        Ok((advantages, targets))
    }

    /// Commits a proposed step to the online parameters.
    ///
    /// The baseline is fitted first. If the fit fails, neither the baseline
    /// nor the parameters change.
    pub fn apply(&mut self, step: ProposedStep) -> Result<Record> {
        enter(&mut self.phase, UpdatePhase::Committing);
        let baseline_loss = self.fit_baseline(step.baseline_targets.as_ref())?;
        self.engine.apply_step(&mut self.params, &step.delta);
        Ok(self.commit_state(step, baseline_loss))
    }

    fn fit_baseline(&mut self, targets: Option<&BaselineTargets>) -> Result<Option<f32>> {
        let (baseline, targets) = match (self.baseline.as_mut(), targets) {
            (Some(baseline), Some(targets)) => (baseline, targets),
            _ => return Ok(None),
        };
        match baseline.update(&targets.states, &targets.timesteps, &targets.returns) {
            Ok(loss) => Ok(Some(loss)),
            Err(e) => {
                enter(&mut self.phase, UpdatePhase::Idle);
                Err(e)
            }
        }
    }

    fn commit_state(&mut self, step: ProposedStep, baseline_loss: Option<f32>) -> Record {
        let mut record = step.record;
        if let Some(loss) = baseline_loss {
            record.insert("baseline_loss", RecordValue::Scalar(loss));
        }
        self.priorities = step.priorities;
        self.diagnostics.updates_applied += 1;
        enter(&mut self.phase, UpdatePhase::Idle);
        record
    }

    /// Updates on a batch and commits the step to shared parameters.
    ///
    /// The online parameters are replaced with the shared parameters after the
    /// commit, which include the steps of other workers.
    pub fn update_shared(
        &mut self,
        batch: &TransitionBatch,
        sync: &dyn ParamSync,
    ) -> Result<UpdateOutcome> {
        let step = match self.propose(batch) {
            Ok(step) => step,
            Err(e) => return self.recover(e),
        };
        enter(&mut self.phase, UpdatePhase::Committing);
        let baseline_loss = match self.fit_baseline(step.baseline_targets.as_ref()) {
            Ok(loss) => loss,
            Err(e) => return self.recover(e),
        };
        self.params = sync.commit(&step.delta);
        Ok(UpdateOutcome::Applied(self.commit_state(step, baseline_loss)))
    }

    fn recover(&mut self, e: ReinError) -> Result<UpdateOutcome> {
        match e {
            ReinError::ConstraintRejectedError(msg) => {
                warn!("step rejected: {}", msg);
                self.diagnostics.steps_rejected += 1;
                Ok(UpdateOutcome::Rejected(msg))
            }
            ReinError::NumericalInstabilityError(msg) => {
                warn!("update skipped: {}", msg);
                self.diagnostics.updates_skipped += 1;
                Ok(UpdateOutcome::Skipped(msg))
            }
            e => Err(e),
        }
    }

    /// Moves the target parameters towards the online parameters.
    ///
    /// `weight == 1` copies the online parameters, smaller weights smooth
    /// exponentially. No-op for engines without a target network.
    pub fn update_target(&mut self, weight: f32) {
        if let Some(target) = self.target.as_mut() {
            if weight >= 1.0 {
                *target = self.params.clone();
            } else {
                target.track(&self.params, weight);
            }
            debug!("target updated with weight {}", weight);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        baseline::BaselineConfig,
        distribution::{DistributionConfig, PolicyHeads},
        model::{
            engine::{Objective, StepProposal},
            pg::{PpoEngine, PpoParams, TrpoEngine, TrpoParams},
            DqnEngine, OptimizerConfig,
        },
        network::Linear,
        ActionSpec,
    };
    use rand::SeedableRng;

    fn model(engine: Box<dyn UpdateEngine>, n_in: usize, n_out: usize) -> Model {
        let network = Arc::new(Linear::new(n_in, n_out));
        let params = network.init_params(&mut StdRng::seed_from_u64(1));
        let optimizer = OptimizerConfig::Sgd { lr: 0.1 }.build(params.len()).unwrap();
        Model::new(network, params, engine, optimizer).unwrap()
    }

    fn batch(states: &[f32], actions: &[usize], rewards: &[f32], next: bool) -> TransitionBatch {
        let n = states.len();
        let states = states
            .iter()
            .map(|&s| State::single(vec![s, 1.0]))
            .collect::<Vec<_>>();
        TransitionBatch {
            next_states: if next {
                Some(states.iter().skip(1).chain(states.last()).cloned().collect())
            } else {
                None
            },
            states,
            internals: vec![InternalState::default(); n],
            actions: actions.iter().map(|&a| Action::discrete(a)).collect(),
            rewards: rewards.to_vec(),
            terminals: (0..n).map(|i| i + 1 == n).collect(),
            next_internals: None,
            horizons: vec![1; n],
            weights: None,
            indices: None,
        }
    }

    fn heads() -> PolicyHeads {
        PolicyHeads::build(&[ActionSpec::discrete(2)], &DistributionConfig::default()).unwrap()
    }

    #[test]
    fn test_target_unchanged_by_update() -> Result<()> {
        let mut model = model(Box::new(DqnEngine::new(vec![2], 0.9)), 2, 2);
        let target = model.target().unwrap().clone();
        let params = model.params().clone();
        let b = batch(&[0.1, 0.5, -0.3], &[0, 1, 1], &[1.0, 0.0, 2.0], true);

        for _ in 0..3 {
            assert!(model.update(&b)?.is_applied());
        }
        assert_ne!(model.params(), &params);
        assert_eq!(model.target().unwrap(), &target);
        assert_eq!(model.phase(), UpdatePhase::Idle);

        model.update_target(0.5);
        let expected = target.added(0.5, &model.params().diff(&target));
        let t = model.target().unwrap().as_slice();
        for (a, b) in t.iter().zip(expected.as_slice()) {
            assert!((a - b).abs() < 1e-6);
        }
        model.update_target(1.0);
        assert_eq!(model.target().unwrap(), model.params());
        Ok(())
    }

    #[test]
    fn test_rejected_trpo_step_keeps_params() -> Result<()> {
        // Every candidate leaves the trust region and improves the surrogate
        // far less than the required ratio
        let params = TrpoParams {
            max_kl: 1e-3,
            cg_iters: 10,
            cg_damping: 1e-4,
            max_backtracks: 2,
            backtrack_decay: 0.5,
            ls_accept_ratio: 1e6,
        };
        let engine = TrpoEngine::new(heads(), AdvantageConfig::default(), params);
        let baseline = MultiBaseline::build(&BaselineConfig::Linear, &[2], 0)?;
        let mut model = model(Box::new(engine), 2, 2).with_baseline(Some(baseline));
        // Biases favor action 0
        model.set_params(ParamSet::new(vec![0.0, 0.0, 0.0, 0.0, 3.0, 0.0]));
        let before = model.params().clone();

        let b = batch(&[0.5], &[0], &[1.0], false);
        let timesteps = episode_timesteps(&b.terminals);
        let values = |m: &Model| m.baseline().unwrap().predict(&b.states, &timesteps);
        let values_before = values(&model)?;
        let outcome = model.update(&b)?;

        assert!(matches!(outcome, UpdateOutcome::Rejected(_)));
        assert_eq!(model.params().as_slice(), before.as_slice());
        assert_eq!(values(&model)?, values_before);
        assert_eq!(model.optimizer().steps(), 0);
        assert_eq!(model.diagnostics().steps_rejected, 1);
        assert_eq!(model.diagnostics().updates_applied, 0);
        assert_eq!(model.phase(), UpdatePhase::Idle);
        Ok(())
    }

    #[test]
    fn test_accepted_trpo_step_within_kl() -> Result<()> {
        let params = TrpoParams {
            max_kl: 0.01,
            cg_iters: 10,
            cg_damping: 0.1,
            max_backtracks: 10,
            backtrack_decay: 0.5,
            // Out of reach, so only the KL constraint accepts
            ls_accept_ratio: 1e6,
        };
        let engine = TrpoEngine::new(heads(), AdvantageConfig::default(), params);
        let baseline = MultiBaseline::build(&BaselineConfig::Linear, &[2], 0)?;
        let mut model = model(Box::new(engine), 2, 2).with_baseline(Some(baseline));
        let b = batch(&[0.2, -0.4, 0.9], &[0, 1, 0], &[1.0, -0.5, 1.0], false);
        let timesteps = episode_timesteps(&b.terminals);

        match model.update(&b)? {
            UpdateOutcome::Applied(record) => {
                assert!(record.get_scalar("kl")? <= 0.01);
                assert!(record.get_scalar("backtracks")? < 10.0);
                assert!(record.get_scalar("baseline_loss")? > 0.0);
            }
            outcome => panic!("unexpected outcome {:?}", outcome),
        }
        // The baseline is fitted together with the committed step
        let values = model.baseline().unwrap().predict(&b.states, &timesteps)?;
        assert!(values.iter().any(|v| *v != 0.0));
        Ok(())
    }

    #[test]
    fn test_ppo_increases_probability_of_advantageous_action() -> Result<()> {
        let params = PpoParams {
            clip: 0.2,
            epochs: 4,
            minibatch_size: None,
            target_kl: None,
        };
        let engine = PpoEngine::new(heads(), AdvantageConfig::default(), params, 0);
        let mut model = model(Box::new(engine), 2, 2);
        let b = batch(&[0.5], &[1], &[1.0], false);
        let h = heads();
        let log_prob = |m: &Model| {
            let f = m.forward(&b.states[0], &InternalState::default()).unwrap();
            h.log_prob(&f.output, &b.actions[0])
        };

        let before = log_prob(&model);
        assert!(model.update(&b)?.is_applied());
        assert!(log_prob(&model) > before);
        // The ratio never grows far beyond the clipping range
        assert!((log_prob(&model) - before).exp() < 1.5);
        Ok(())
    }

    struct ConstantStep(f32);

    impl UpdateEngine for ConstantStep {
        fn requirements(&self) -> Requirements {
            Requirements {
                next_states: false,
                on_policy: false,
                n_step: 1,
                target_network: false,
                advantage: None,
            }
        }

        fn output_len(&self) -> usize {
            1
        }

        fn select_action(&self, _: &[f32], _: bool, _: &mut StdRng) -> Action {
            Action::discrete(0)
        }

        fn compute_objective(&mut self, ctx: &EngineContext, _: &UpdateBatch) -> Result<Objective> {
            Ok(Objective {
                loss: 0.0,
                grad: vec![0.0; ctx.params.len()],
                priorities: None,
                record: Record::empty(),
            })
        }

        fn compute_step(
            &mut self,
            ctx: &EngineContext,
            _: &UpdateBatch,
            _: Objective,
            _: &mut Optimizer,
        ) -> Result<StepProposal> {
            Ok(StepProposal {
                delta: vec![self.0; ctx.params.len()],
                record: Record::empty(),
            })
        }
    }

    #[test]
    fn test_non_finite_step_skipped() -> Result<()> {
        let mut model = model(Box::new(ConstantStep(f32::NAN)), 2, 1);
        let before = model.params().clone();
        let b = batch(&[0.1], &[0], &[1.0], false);

        assert!(matches!(model.update(&b)?, UpdateOutcome::Skipped(_)));
        assert_eq!(model.params(), &before);
        assert_eq!(model.diagnostics().updates_skipped, 1);
        assert_eq!(model.phase(), UpdatePhase::Idle);
        Ok(())
    }

    #[test]
    fn test_output_len_mismatch() {
        let network = Arc::new(Linear::new(2, 3));
        let params = network.init_params(&mut StdRng::seed_from_u64(0));
        let optimizer = OptimizerConfig::default().build(params.len()).unwrap();
        let result = Model::new(network, params, Box::new(ConstantStep(0.0)), optimizer);
        assert!(matches!(result, Err(ReinError::ConfigError(_))));
    }
}
