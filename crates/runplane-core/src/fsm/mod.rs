// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Generic finite state machine.
//!
//! The engine is kind-agnostic: a machine is described by a type implementing
//! [`Fsm`] (its state, event, context, output and error types) and a
//! [`FsmDefinition`] holding one [`FsmState`] per state with its outgoing
//! [`Transition`]s.
//!
//! ```text
//!   perform(event)                     go_to_state(target)
//!        │                                   │
//!        ▼                                   ▼
//!   lookup event in current state      first transition whose target matches
//!        │                                   │
//!        └──────────────┬────────────────────┘
//!                       ▼
//!            internal logic (optional) ── Err ──► state preserved, error returned
//!                       │ Ok(output)
//!                       ▼
//!              current = next state
//! ```
//!
//! Definitions are validated once when built: every state returned by
//! [`Fsm::states`] must be defined, targets must exist and a state may not
//! define the same event twice. Runtime lookups therefore never hit an
//! undefined state.
//!
//! The engine performs no retries and no locking; callers serialize
//! transitions on the same entity.

mod machine;

pub use machine::*;

use thiserror::Error;

/// Errors produced by the state machine engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum FsmError {
    /// The event is not defined for the current state.
    #[error("illegal transition: event {event} is not allowed in state {state}")]
    IllegalTransition {
        /// Current state.
        state: String,
        /// Rejected event.
        event: String,
    },

    /// No transition leads from the current state to the requested state.
    #[error("illegal transition: state {target} is not reachable from {state}")]
    IllegalTarget {
        /// Current state.
        state: String,
        /// Requested target state.
        target: String,
    },

    /// A state is referenced but has no definition.
    #[error("state {0} is not defined")]
    UndefinedState(String),

    /// A state was defined more than once.
    #[error("state {0} is defined more than once")]
    DuplicateState(String),

    /// A state defines the same event twice.
    #[error("state {state} defines event {event} more than once")]
    DuplicateTransition {
        /// State holding the duplicate.
        state: String,
        /// Duplicated event.
        event: String,
    },
}

impl FsmError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::IllegalTransition { .. } | Self::IllegalTarget { .. } => "ILLEGAL_TRANSITION",
            Self::UndefinedState(_)
            | Self::DuplicateState(_)
            | Self::DuplicateTransition { .. } => "INVALID_STATE_MACHINE",
        }
    }

    /// Whether this error rejects a transition at runtime.
    pub fn is_illegal(&self) -> bool {
        matches!(
            self,
            Self::IllegalTransition { .. } | Self::IllegalTarget { .. }
        )
    }
}
