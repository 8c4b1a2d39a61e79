//! Checkpoint and session identifiers
//!
//! Both identifier kinds sort lexicographically in creation order, so a
//! plain string sort of a directory listing or a ref tree is already a
//! timeline. Uniqueness across concurrent short-lived processes comes from
//! a random suffix rather than a counter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CheckpointId
// ============================================================================

/// Unique identifier for a checkpoint
///
/// Format: `ck-<13-digit unix millis>-<8 hex chars>`. The zero-padded
/// millisecond prefix keeps ids creation-sortable until the year 2286.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(pub String);

impl CheckpointId {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Create an id stamped with a specific creation time
    pub fn at(when: DateTime<Utc>) -> Self {
        let millis = when.timestamp_millis().max(0);
        let suffix = short_suffix(8);
        Self(format!("ck-{:013}-{}", millis, suffix))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The creation timestamp encoded in the id, if the id is well-formed
    pub fn created_millis(&self) -> Option<i64> {
        self.0
            .strip_prefix("ck-")
            .and_then(|rest| rest.split('-').next())
            .and_then(|digits| digits.parse().ok())
    }
}

impl Default for CheckpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SessionId
// ============================================================================

/// Unique identifier for a session
///
/// Format: `YYYYMMDD-HHMMSS-<6 hex chars>`. Date-prefixed so session
/// listings sort chronologically. Fixed at first prompt and reused across
/// resumes of the same session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Create an id stamped with a specific start time
    pub fn at(when: DateTime<Utc>) -> Self {
        let stamp = when.format("%Y%m%d-%H%M%S");
        let suffix = short_suffix(6);
        Self(format!("{}-{}", stamp, suffix))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn short_suffix(len: usize) -> String {
    let mut s = Uuid::new_v4().simple().to_string();
    s.truncate(len);
    s
}

// ============================================================================
// Tests
// ============================================================================
