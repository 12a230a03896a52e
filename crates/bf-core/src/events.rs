//! Pipeline event stream for observers.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel. The execution
//! supervisor publishes state transitions, progress and warnings on it; the
//! CLI (or any other observer) subscribes before a run starts. Publishing
//! never blocks and never fails, even with no subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::broadcast;

use crate::ids::RunId;

// ---------------------------------------------------------------------------
// SupervisorState
// ---------------------------------------------------------------------------

/// Lifecycle of one encoder invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    Idle,
    Preflight,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl SupervisorState {
    /// Whether no further transitions can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Preflight => write!(f, "preflight"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    StateChanged {
        state: SupervisorState,
    },
    Progress {
        processed_secs: f64,
        total_secs: f64,
        eta_secs: Option<f64>,
        speed: Option<f64>,
    },
    Warning {
        message: String,
    },
    Finished {
        success: bool,
        output: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event tied to one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(run_id: RunId, payload: EventPayload) -> Self {
        Self {
            run_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel carrying [`Event`]s to any number of observers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with room for `capacity` undelivered events
    /// per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers.
    pub fn publish(&self, run_id: RunId, payload: EventPayload) {
        // No subscribers is not an error.
        let _ = self.tx.send(Event::new(run_id, payload));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
