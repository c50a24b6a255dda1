//! Amp Link - live state mirror and command engine for Bluetooth guitar amps
//!
//! The [`engine`] keeps a host-side copy of the amp's tone in sync with edits
//! coming from the UI and changes reported by the amp, and turns bursts of
//! parameter edits into a bandwidth-friendly trickle of device commands.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod fx_id;
pub mod paths;
pub mod storage;
pub mod tone;
pub mod transport;

pub use engine::{EngineActor, EngineConfig, EngineHandle, MirrorSnapshot};
pub use error::{EngineError, TransportError};
