//! Waymark core
//!
//! The checkpoint storage and session lifecycle engine: a git-native
//! content store for committed and temporary checkpoints, the strategies
//! deciding when a checkpoint enters visible history, the session-phase
//! state machine coordinating concurrent hook callbacks, and the rewind
//! engine that restores code and logs to a prior checkpoint. The host git
//! repository is the only storage substrate.

pub mod git;
pub mod insights;
pub mod review;
pub mod rewind;
pub mod shadow;
pub mod state;
pub mod store;
pub mod strategy;
pub mod trailer;

pub use git::{GitError, GitOps, Repository, TreeEdit};
pub use insights::{InsightsExtractor, SessionInsight};
pub use review::{ReviewItem, ReviewQueue, WorkerLock};
pub use rewind::{RewindEngine, RewindError, RewindReport};
pub use shadow::{DeletionReport, ShadowBranchManager};
pub use state::{SessionEvent, SessionStateMachine, SideEffect, StateError};
pub use store::{CheckpointStore, SessionContent, StoreError};
pub use strategy::{
    strategy_for, AutoCommitStrategy, InvocationContext, ManualCommitStrategy, SaveOutcome,
    Strategy, StrategyError,
};
