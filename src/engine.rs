//! Device state synchronization engine
//!
//! Keeps a mirror of the amp's live state consistent while the user edits it and
//! the amp reports its own changes. All state lives in one actor task; the UI
//! drives it through [`EngineHandle`] and observes it through snapshots.

mod actor;
pub mod coalescer;
mod commands;
mod dispatcher;
mod handle;
pub mod mirror;
pub mod reconciler;


pub use actor::{EngineActor, EngineConfig, DEFAULT_COMMAND_TIMEOUT_MS};
pub use coalescer::{CoalesceKey, Coalescer, DEFAULT_COALESCE_WINDOW_MS};
pub use commands::{EngineCommand, NumericInput};
pub use dispatcher::ACTIVE_PRESET;
pub use handle::EngineHandle;
pub use mirror::{CommandKind, ConnectionInfo, ConnectionState, DeviceMirror, MirrorSnapshot};
pub use reconciler::{FollowUp, Reconciler};
