use anyhow::Result;
use rein_core::{
    agent::{AgentConfig, ModelAgent},
    dummy::ClockEnv,
    memory::ReplayMemoryConfig,
    network::Linear,
    Action, Agent, Env, Memory, State, Transition,
};
use std::sync::Arc;

const EPISODE_LENGTH: usize = 5;
const MEMORY_CAPACITY: usize = 50;
const N_IMPORTED: usize = 100;

fn agent(env: &ClockEnv) -> Result<ModelAgent> {
    // Large first_update keeps the memory untouched by updates
    let config = AgentConfig::default()
        .first_update(1000)
        .memory(ReplayMemoryConfig::default().capacity(MEMORY_CAPACITY));
    Ok(ModelAgent::build(config, env.spec(), Arc::new(Linear::new(1, 2)))?)
}

#[test]
fn test_one_transition_per_act_observe_pair() -> Result<()> {
    let mut env = ClockEnv::new(EPISODE_LENGTH);
    let mut agent = agent(&env)?;
    let mut state = env.reset()?;
    let mut actions = vec![];

    loop {
        let action = agent.act(&state)?;
        let step = env.step(&action)?;
        agent.observe(step.reward, step.terminal)?;
        actions.push(action);
        assert_eq!(agent.last_observation().map(|t| t.state.clone()), Some(state));
        state = step.state;
        if step.terminal {
            break;
        }
    }

    assert_eq!(agent.memory().len(), EPISODE_LENGTH);
    let batch = agent.memory().sequence(false, false)?;
    assert_eq!(batch.terminals, vec![false, false, false, false, true]);
    assert_eq!(batch.actions, actions);
    assert_eq!(
        batch.states,
        (0..EPISODE_LENGTH)
            .map(|t| State::single(vec![t as f32]))
            .collect::<Vec<_>>()
    );
    assert_eq!(agent.timestep(), EPISODE_LENGTH);
    assert_eq!(agent.episode(), 1);
    Ok(())
}

#[test]
fn test_import_keeps_newest_transitions() -> Result<()> {
    let env = ClockEnv::new(EPISODE_LENGTH);
    let mut agent = agent(&env)?;
    let transitions = (0..N_IMPORTED)
        .map(|i| {
            Transition::new(
                State::single(vec![i as f32]),
                Action::discrete(i % 2),
                i as f32,
                i % 10 == 9,
            )
        })
        .collect::<Vec<_>>();

    agent.act(&State::single(vec![-1.0]))?;
    agent.import_observations(transitions)?;
    assert_eq!(agent.memory().len(), MEMORY_CAPACITY);

    let batch = agent.memory().sequence(false, false)?;
    let expected = (N_IMPORTED - MEMORY_CAPACITY..N_IMPORTED)
        .map(|i| i as f32)
        .collect::<Vec<_>>();
    assert_eq!(batch.rewards, expected);

    // The pending tuple survives the import
    agent.observe(0.0, true)?;
    assert_eq!(
        agent.last_observation().map(|t| t.state.clone()),
        Some(State::single(vec![-1.0]))
    );
    Ok(())
}
