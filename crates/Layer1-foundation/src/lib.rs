//! Waymark foundation layer
//!
//! Shared building blocks for the checkpoint engine: the central error
//! type, identifiers, the data model, configuration, and file storage.
//! Nothing in this crate touches git; the version-control substrate lives
//! in waymark-core behind its repository port.

pub mod config;
pub mod error;
pub mod id;
pub mod storage;
pub mod types;

pub use config::WaymarkConfig;
pub use error::{Error, Result};
pub use id::{CheckpointId, SessionId};
pub use storage::{JsonStore, SessionDir};
pub use types::{
    AgentKind, Checkpoint, CheckpointSummary, HookInput, RewindPoint, SessionPhase,
    SessionRecord, SessionState, StrategyKind, TokenUsage,
};
