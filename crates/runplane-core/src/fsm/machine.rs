// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! State machine definitions and instances.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::FsmError;

/// Type family describing one kind of state machine.
///
/// Implemented by a marker type; the definition and every instance of the
/// machine are parameterized over it.
pub trait Fsm: Send + Sync + 'static {
    /// State type.
    type State: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;
    /// Event type.
    type Event: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;
    /// Context handed to internal logic.
    type Context: Send + Sync;
    /// Value produced by internal logic and handed to the effect.
    type Output: Send;
    /// Error type surfaced by transitions.
    type Error: From<FsmError> + Send;

    /// Every state of the machine. Each one must be defined.
    fn states() -> &'static [Self::State];
}

/// Internal logic attached to a transition.
///
/// Runs before the transition commits. An error aborts the transition and
/// leaves the machine in its current state.
#[async_trait]
pub trait TransitionLogic<M: Fsm>: Send + Sync {
    /// Compute the effect input for moving `from` → `to` on `event`.
    async fn apply(
        &self,
        from: M::State,
        to: M::State,
        event: M::Event,
        context: &M::Context,
    ) -> Result<Option<M::Output>, M::Error>;
}

/// Adapter turning a plain closure into [`TransitionLogic`].
pub struct FnLogic<F>(F);

#[async_trait]
impl<M, F> TransitionLogic<M> for FnLogic<F>
where
    M: Fsm,
    F: Fn(M::State, M::State, M::Event, &M::Context) -> Result<Option<M::Output>, M::Error>
        + Send
        + Sync,
{
    async fn apply(
        &self,
        from: M::State,
        to: M::State,
        event: M::Event,
        context: &M::Context,
    ) -> Result<Option<M::Output>, M::Error> {
        (self.0)(from, to, event, context)
    }
}

/// Wrap a synchronous closure as transition logic.
pub fn logic_fn<M, F>(f: F) -> Arc<dyn TransitionLogic<M>>
where
    M: Fsm,
    F: Fn(M::State, M::State, M::Event, &M::Context) -> Result<Option<M::Output>, M::Error>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnLogic(f))
}

/// A single outgoing edge: `event` leads to `next`.
pub struct Transition<M: Fsm> {
    event: M::Event,
    next: M::State,
    logic: Option<Arc<dyn TransitionLogic<M>>>,
}

impl<M: Fsm> Clone for Transition<M> {
    fn clone(&self) -> Self {
        Self {
            event: self.event,
            next: self.next,
            logic: self.logic.clone(),
        }
    }
}

impl<M: Fsm> Transition<M> {
    /// Create a transition without internal logic.
    pub fn new(event: M::Event, next: M::State) -> Self {
        Self {
            event,
            next,
            logic: None,
        }
    }

    /// Attach internal logic.
    pub fn with_logic(mut self, logic: Arc<dyn TransitionLogic<M>>) -> Self {
        self.logic = Some(logic);
        self
    }

    /// The triggering event.
    pub fn event(&self) -> M::Event {
        self.event
    }

    /// The target state.
    pub fn next(&self) -> M::State {
        self.next
    }
}

/// A state together with its outgoing transitions.
pub struct FsmState<M: Fsm> {
    state: M::State,
    transitions: Vec<Transition<M>>,
}

impl<M: Fsm> FsmState<M> {
    /// Define a state with no transitions (terminal until edges are added).
    pub fn new(state: M::State) -> Self {
        Self {
            state,
            transitions: Vec::new(),
        }
    }

    /// Add a transition without internal logic.
    pub fn on(mut self, event: M::Event, next: M::State) -> Self {
        self.transitions.push(Transition::new(event, next));
        self
    }

    /// Add a transition with internal logic.
    pub fn on_with(
        mut self,
        event: M::Event,
        next: M::State,
        logic: Arc<dyn TransitionLogic<M>>,
    ) -> Self {
        self.transitions.push(Transition::new(event, next).with_logic(logic));
        self
    }

    /// The state this definition describes.
    pub fn state(&self) -> M::State {
        self.state
    }

    /// Outgoing transitions in declaration order.
    pub fn transitions(&self) -> &[Transition<M>] {
        &self.transitions
    }

    /// Resolve a transition by event.
    pub fn find(&self, event: M::Event) -> Option<&Transition<M>> {
        self.transitions.iter().find(|t| t.event == event)
    }

    /// Whether no event is accepted in this state.
    pub fn is_terminal(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// Builder validating a complete set of state definitions.
pub struct FsmBuilder<M: Fsm> {
    states: Vec<FsmState<M>>,
}

impl<M: Fsm> Default for FsmBuilder<M> {
    fn default() -> Self {
        Self { states: Vec::new() }
    }
}

impl<M: Fsm> FsmBuilder<M> {
    /// Add a state definition.
    pub fn state(mut self, state: FsmState<M>) -> Self {
        self.states.push(state);
        self
    }

    /// Validate and freeze the definition.
    pub fn build(self) -> Result<FsmDefinition<M>, FsmError> {
        let mut states: HashMap<M::State, FsmState<M>> = HashMap::with_capacity(self.states.len());

        for definition in self.states {
            let mut seen = HashSet::new();
            for transition in &definition.transitions {
                if !seen.insert(transition.event) {
                    return Err(FsmError::DuplicateTransition {
                        state: definition.state.to_string(),
                        event: transition.event.to_string(),
                    });
                }
            }

            let key = definition.state;
            if states.insert(key, definition).is_some() {
                return Err(FsmError::DuplicateState(key.to_string()));
            }
        }

        for state in M::states() {
            if !states.contains_key(state) {
                return Err(FsmError::UndefinedState(state.to_string()));
            }
        }

        for definition in states.values() {
            for transition in &definition.transitions {
                if !states.contains_key(&transition.next) {
                    return Err(FsmError::UndefinedState(transition.next.to_string()));
                }
            }
        }

        Ok(FsmDefinition { states })
    }
}

/// Immutable, validated machine definition shared by all instances.
pub struct FsmDefinition<M: Fsm> {
    states: HashMap<M::State, FsmState<M>>,
}

impl<M: Fsm> FsmDefinition<M> {
    /// Start a new definition.
    pub fn builder() -> FsmBuilder<M> {
        FsmBuilder::default()
    }

    /// Get the definition of a state.
    pub fn state(&self, state: M::State) -> Option<&FsmState<M>> {
        self.states.get(&state)
    }

    /// Whether `state` accepts no events.
    pub fn is_terminal(&self, state: M::State) -> bool {
        self.states.get(&state).is_none_or(FsmState::is_terminal)
    }

    /// Whether `event` is accepted in `state`.
    pub fn accepts(&self, state: M::State, event: M::Event) -> bool {
        self.states
            .get(&state)
            .is_some_and(|s| s.find(event).is_some())
    }

    /// Create a machine instance positioned at `current`.
    pub fn machine(self: &Arc<Self>, current: M::State) -> StateMachine<M> {
        StateMachine {
            definition: Arc::clone(self),
            current,
        }
    }
}

/// Result of a committed transition.
pub struct TransitionOutcome<M: Fsm> {
    /// State before the transition.
    pub from: M::State,
    /// State after the transition.
    pub to: M::State,
    /// Event that was applied.
    pub event: M::Event,
    /// Effect input produced by the internal logic, if any.
    pub output: Option<M::Output>,
}

impl<M: Fsm> fmt::Debug for TransitionOutcome<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionOutcome")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("event", &self.event)
            .field("has_output", &self.output.is_some())
            .finish()
    }
}

/// A machine instance positioned at a current state.
pub struct StateMachine<M: Fsm> {
    definition: Arc<FsmDefinition<M>>,
    current: M::State,
}

impl<M: Fsm> StateMachine<M> {
    /// The current state.
    pub fn current(&self) -> M::State {
        self.current
    }

    /// Whether the current state accepts no events.
    pub fn is_terminal(&self) -> bool {
        self.definition.is_terminal(self.current)
    }

    /// Apply `event` to the current state.
    pub async fn perform(
        &mut self,
        event: M::Event,
        context: &M::Context,
    ) -> Result<TransitionOutcome<M>, M::Error> {
        let definition = Arc::clone(&self.definition);
        let transition = definition
            .state(self.current)
            .and_then(|s| s.find(event))
            .ok_or_else(|| FsmError::IllegalTransition {
                state: self.current.to_string(),
                event: event.to_string(),
            })?;

        self.execute(transition, context).await
    }

    /// Move to `target` through the first transition that leads there.
    ///
    /// Returns `Ok(None)` when the machine already sits in `target` and the
    /// state has no self-transition.
    pub async fn go_to_state(
        &mut self,
        target: M::State,
        context: &M::Context,
    ) -> Result<Option<TransitionOutcome<M>>, M::Error> {
        let definition = Arc::clone(&self.definition);
        let transition = definition
            .state(self.current)
            .and_then(|s| s.transitions().iter().find(|t| t.next == target));

        match transition {
            Some(transition) => self.execute(transition, context).await.map(Some),
            None if self.current == target => Ok(None),
            None => Err(FsmError::IllegalTarget {
                state: self.current.to_string(),
                target: target.to_string(),
            }
            .into()),
        }
    }

    async fn execute(
        &mut self,
        transition: &Transition<M>,
        context: &M::Context,
    ) -> Result<TransitionOutcome<M>, M::Error> {
        let from = self.current;
        let to = transition.next;
        let event = transition.event;

        let output = match &transition.logic {
            Some(logic) => logic.apply(from, to, event, context).await?,
            None => None,
        };

        self.current = to;
        debug!(from = %from, to = %to, event = %event, "Transition committed");

        Ok(TransitionOutcome {
            from,
            to,
            event,
            output,
        })
    }
}
