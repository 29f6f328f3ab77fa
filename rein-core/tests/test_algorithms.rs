use anyhow::Result;
use rein_core::{
    agent::{AgentConfig, ModelAgent, TargetSyncConfig, UpdateTrigger},
    baseline::{AdvantageConfig, BaselineConfig},
    dummy::{ChainEnv, PointEnv},
    exploration::ExplorationConfig,
    memory::{PerConfig, ReplayMemoryConfig},
    model::{
        AlgorithmConfig, CategoricalDqnConfig, DqfdConfig, DqnConfig, NafConfig, OptimizerConfig,
        PpoConfig, TrpoConfig, VpgConfig,
    },
    network::{Linear, Mlp},
    record::{BufferedRecorder, NullRecorder},
    runner::{Runner, RunnerConfig},
    Env, Memory, Transition,
};
use std::sync::Arc;
use test_log::test;

const CHAIN_LENGTH: usize = 4;
const MAX_EPISODE_TIMESTEPS: usize = 50;
const BATCH_SIZE: usize = 16;
const REPLAY_MEMORY_CAPACITY: usize = 1000;

fn runner(max_episodes: usize) -> Runner {
    Runner::new(
        RunnerConfig::default()
            .max_episodes(Some(max_episodes))
            .max_episode_timesteps(Some(MAX_EPISODE_TIMESTEPS)),
    )
}

fn network_for(config: &AgentConfig, env: &dyn Env, hidden: &[usize]) -> Result<Arc<Mlp>> {
    let spec = env.spec();
    let n_in = spec.states.iter().map(|s| s.len()).sum();
    let n_out = config.algorithm.output_len(&spec.actions, &config.distribution)?;
    Ok(Arc::new(Mlp::new(n_in, hidden, n_out)))
}

fn q_config(algorithm: AlgorithmConfig) -> AgentConfig {
    AgentConfig::default()
        .algorithm(algorithm)
        .optimizer(OptimizerConfig::adam(1e-3))
        .memory(ReplayMemoryConfig::default().capacity(REPLAY_MEMORY_CAPACITY))
        .batch_size(BATCH_SIZE)
        .update_trigger(UpdateTrigger::EveryKSteps(4))
        .first_update(32)
        .target_sync(Some(TargetSyncConfig {
            frequency: 100,
            weight: 1.0,
        }))
}

#[test]
fn test_dqn_chain() -> Result<()> {
    let mut env = ChainEnv::new(CHAIN_LENGTH);
    let config = q_config(AlgorithmConfig::Dqn(DqnConfig::default().double_q(true)))
        .memory(
            ReplayMemoryConfig::default()
                .capacity(REPLAY_MEMORY_CAPACITY)
                .per_config(Some(PerConfig::default())),
        )
        .exploration(Some(ExplorationConfig::default()));
    let network = network_for(&config, &env, &[16])?;
    let mut agent = ModelAgent::build(config, env.spec(), network)?;
    let mut recorder = BufferedRecorder::new();

    let stat = runner(30).run(&mut env, &mut agent, &mut recorder)?;
    assert_eq!(stat.episodes, 30);
    assert!(stat.updates > 0);
    assert_eq!(agent.diagnostics().updates_skipped, 0);
    assert!(recorder.scalars("loss").iter().all(|l| l.is_finite()));
    assert!(agent.model().params().as_slice().iter().all(|p| p.is_finite()));
    Ok(())
}

#[test]
fn test_nstep_categorical_dqn_chain() -> Result<()> {
    let mut env = ChainEnv::new(CHAIN_LENGTH);
    let config = q_config(AlgorithmConfig::CategoricalDqn(CategoricalDqnConfig {
        n_step: 3,
        ..CategoricalDqnConfig::default()
    }))
    .exploration(Some(ExplorationConfig::Constant { epsilon: 0.3 }));
    let network = network_for(&config, &env, &[16])?;
    let mut agent = ModelAgent::build(config, env.spec(), network)?;

    let stat = runner(20).run(&mut env, &mut agent, &mut NullRecorder::new())?;
    assert!(stat.updates > 0);
    assert!(agent.model().params().as_slice().iter().all(|p| p.is_finite()));
    Ok(())
}

#[test]
fn test_naf_point() -> Result<()> {
    let mut env = PointEnv::new(0.8);
    let config = q_config(AlgorithmConfig::Naf(NafConfig::default()))
        .exploration(Some(ExplorationConfig::GaussianNoise { sigma: 0.1 }));
    let network = network_for(&config, &env, &[16])?;
    let mut agent = ModelAgent::build(config, env.spec(), network)?;

    let stat = runner(20).run(&mut env, &mut agent, &mut NullRecorder::new())?;
    assert!(stat.updates > 0);
    assert!(agent.model().params().as_slice().iter().all(|p| p.is_finite()));
    Ok(())
}

#[test]
fn test_dqfd_pretrain() -> Result<()> {
    let mut env = ChainEnv::new(CHAIN_LENGTH);
    let config = q_config(AlgorithmConfig::Dqfd(DqfdConfig::default()));
    let network = network_for(&config, &env, &[16])?;
    let mut agent = ModelAgent::build(config, env.spec(), network)?;

    // The expert always moves right
    let mut demos = vec![];
    for _ in 0..20 {
        let mut state = env.reset()?;
        loop {
            let action = rein_core::Action::discrete(1);
            let step = env.step(&action)?;
            demos.push(Transition::new(state, action, step.reward, step.terminal));
            state = step.state;
            if step.terminal {
                break;
            }
        }
    }
    agent.import_demonstrations(demos)?;
    let before = agent.model().params().clone();
    assert_eq!(agent.pretrain(50)?, 50);
    assert_ne!(agent.model().params(), &before);

    let stat = runner(10).run(&mut env, &mut agent, &mut NullRecorder::new())?;
    assert_eq!(stat.episodes, 10);
    Ok(())
}

#[test]
fn test_ppo_point() -> Result<()> {
    let mut env = PointEnv::new(0.8);
    let config = AgentConfig::default()
        .algorithm(AlgorithmConfig::Ppo(
            PpoConfig {
                advantage: AdvantageConfig::default().gae_lambda(Some(0.95)).normalize(true),
                ..PpoConfig::default()
            }
            .minibatch_size(Some(8))
            .target_kl(Some(0.02)),
        ))
        .optimizer(OptimizerConfig::adam(3e-3))
        .baseline(Some(BaselineConfig::Linear));
    let network = network_for(&config, &env, &[8])?;
    let mut agent = ModelAgent::build(config, env.spec(), network)?;
    let mut recorder = BufferedRecorder::new();

    let stat = runner(10).run(&mut env, &mut agent, &mut recorder)?;
    assert_eq!(stat.updates, 10);
    assert_eq!(agent.memory().len(), 0);
    assert!(recorder.scalars("kl").iter().all(|kl| kl.is_finite()));
    Ok(())
}

#[test]
fn test_vpg_and_trpo_chain() -> Result<()> {
    let advantage = AdvantageConfig::default().discount(0.95);
    for algorithm in vec![
        AlgorithmConfig::Vpg(VpgConfig {
            advantage: advantage.clone(),
        }),
        AlgorithmConfig::Trpo(TrpoConfig {
            advantage: advantage.clone(),
            ..TrpoConfig::default()
        }),
    ] {
        let mut env = ChainEnv::new(CHAIN_LENGTH);
        let config = AgentConfig::default()
            .algorithm(algorithm)
            .optimizer(OptimizerConfig::Sgd { lr: 0.05 })
            .baseline(Some(BaselineConfig::Linear));
        let network = Arc::new(Linear::new(
            CHAIN_LENGTH,
            config.algorithm.output_len(&env.spec().actions, &config.distribution)?,
        ));
        let mut agent = ModelAgent::build(config, env.spec(), network)?;

        let stat = runner(10).run(&mut env, &mut agent, &mut NullRecorder::new())?;
        let diagnostics = agent.diagnostics();
        assert_eq!(stat.episodes, 10);
        assert_eq!(
            diagnostics.updates_applied + diagnostics.steps_rejected + diagnostics.updates_skipped,
            10
        );
    }
    Ok(())
}
