//! Batch lifecycle state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    /// Created, tasks not yet launched
    Idle,

    /// Tasks are launched
    Running,

    /// Every task finished and the summary was emitted
    Completed,

    /// Superseded by a newer batch
    Canceled,
}

impl BatchState {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchState::Completed | BatchState::Canceled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchState::Idle => "idle",
            BatchState::Running => "running",
            BatchState::Completed => "completed",
            BatchState::Canceled => "canceled",
        }
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State machine for managing batch lifecycle
#[derive(Debug)]
pub struct StateMachine {
    current_state: BatchState,
    state_history: Vec<(BatchState, DateTime<Utc>)>,
}

impl StateMachine {
    /// Create a new state machine
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            current_state: BatchState::Idle,
            state_history: vec![(BatchState::Idle, now)],
        }
    }

    /// Get the current state
    pub fn current_state(&self) -> BatchState {
        self.current_state
    }

    /// Transition to a new state
    pub fn transition(&mut self, new_state: BatchState) -> Result<(), String> {
        if !self.is_valid_transition(new_state) {
            return Err(format!(
                "Invalid transition from {:?} to {:?}",
                self.current_state, new_state
            ));
        }

        self.current_state = new_state;
        self.state_history.push((new_state, Utc::now()));

        Ok(())
    }

    /// Check if a state transition is valid
    fn is_valid_transition(&self, new_state: BatchState) -> bool {
        use BatchState::*;

        // A batch canceled before launch goes straight from Idle to Canceled.
        matches!(
            (self.current_state, new_state),
            (Idle, Running) | (Idle, Canceled) | (Running, Completed | Canceled)
        )
    }

    /// Get the state history
    pub fn history(&self) -> &[(BatchState, DateTime<Utc>)] {
        &self.state_history
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
