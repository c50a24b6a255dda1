//! Error types surfaced by the engine and the transport boundary

use std::time::Duration;
use thiserror::Error;

/// Failure reported by the transport for a single outbound action
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The device or driver refused the action
    #[error("transport rejected '{action}': {reason}")]
    Rejected { action: String, reason: String },
    /// No outcome within the command timeout
    #[error("transport timed out after {0:?}")]
    Timeout(Duration),
    /// The link to the device is down
    #[error("transport disconnected")]
    Disconnected,
}

/// Errors returned to callers of intent operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// The command reached the transport but failed there.
    /// Optimistic mirror writes made before the call are kept.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// No tone has been received from the device yet
    #[error("no preset loaded")]
    NoPreset,
    /// Slot index outside the current tone's signal chain
    #[error("no effect in slot {0}")]
    UnknownSlot(usize),
    /// Parameter index or value could not be coerced to a number
    #[error("invalid parameter input: {0}")]
    InvalidInput(String),
    /// The engine actor is no longer running
    #[error("engine stopped")]
    Stopped,
    /// The transport event stream was already taken by another consumer
    #[error("transport '{0}' has no event stream available")]
    NoEventStream(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
