//! Git substrate
//!
//! `GitOps` shells out to the host `git` binary; `Repository` is the
//! narrow port the rest of the engine consumes.

pub mod ops;
pub mod port;

pub use ops::{FileStatus, GitError, GitOps, GitStatus, ZERO_OID};
pub use port::{Repository, TreeEdit};
