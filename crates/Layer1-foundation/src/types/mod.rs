//! Shared data model types
//!
//! The records that flow between the store, the strategies, the state
//! machine, and read-only consumers (explain/insights). Everything here is
//! serde round-trippable; persisted shapes tolerate missing fields via
//! zero-value defaults so partially-written or legacy metadata still loads.

mod checkpoint;
mod hook;
mod session;

pub use checkpoint::{
    AgentKind, Checkpoint, CheckpointSummary, RewindPoint, StrategyKind, TokenUsage,
};
pub use hook::HookInput;
pub use session::{SessionPhase, SessionRecord, SessionState};
