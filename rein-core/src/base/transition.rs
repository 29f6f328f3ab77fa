//! Values exchanged between the agent, its memory and the environment.
use serde::{Deserialize, Serialize};

/// A state with one flattened value per state component.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct State(pub Vec<Vec<f32>>);

impl State {
    /// A state with a single component.
    pub fn single(values: Vec<f32>) -> Self {
        Self(vec![values])
    }

    /// Values of the state components.
    pub fn components(&self) -> &[Vec<f32>] {
        &self.0
    }

    /// Number of state components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the state has no components.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Concatenation of all components, the input of a network.
    pub fn flatten(&self) -> Vec<f32> {
        self.0.iter().flatten().cloned().collect()
    }
}

/// Value of an action component.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub enum ActionValue {
    /// Index of a discrete choice.
    Discrete(usize),

    /// A continuous vector.
    Continuous(Vec<f32>),
}

impl ActionValue {
    /// Index of a discrete action.
    ///
    /// Continuous values are truncated, which only makes sense for single
    /// dimensional values coming from external data.
    pub fn as_discrete(&self) -> usize {
        match self {
            Self::Discrete(a) => *a,
            Self::Continuous(v) => v.first().map(|a| a.max(0.0) as usize).unwrap_or(0),
        }
    }

    /// Values of a continuous action.
    pub fn as_continuous(&self) -> Vec<f32> {
        match self {
            Self::Discrete(a) => vec![*a as f32],
            Self::Continuous(v) => v.clone(),
        }
    }
}

/// An action with one value per action component.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Action(pub Vec<ActionValue>);

impl Action {
    /// An action with a single discrete component.
    pub fn discrete(a: usize) -> Self {
        Self(vec![ActionValue::Discrete(a)])
    }

    /// An action with a single continuous component.
    pub fn continuous(values: Vec<f32>) -> Self {
        Self(vec![ActionValue::Continuous(values)])
    }

    /// Values of the action components.
    pub fn components(&self) -> &[ActionValue] {
        &self.0
    }
}

/// Internal state of a stateful network, for example a recurrent hidden state.
///
/// Empty for stateless networks.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct InternalState(pub Vec<f32>);

impl InternalState {
    /// Internal state of `len` zeros.
    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    /// Returns `true` for stateless networks.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Values.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// One completed act/observe step.
///
/// `next_internal` is present iff the agent is stateful. Next states are not
/// stored; memories derive them from the chronologically following transition.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Transition {
    /// Preprocessed state the action was taken in.
    pub state: State,

    /// Internal state before the action.
    pub internal: InternalState,

    /// Action.
    pub action: Action,

    /// Reward received for the action.
    pub reward: f32,

    /// Flag denoting if the episode terminated with this step.
    pub terminal: bool,

    /// Internal state after the action.
    pub next_internal: Option<InternalState>,
}

impl Transition {
    /// A transition of a stateless agent.
    pub fn new(state: State, action: Action, reward: f32, terminal: bool) -> Self {
        Self {
            state,
            internal: InternalState::default(),
            action,
            reward,
            terminal,
            next_internal: None,
        }
    }
}
