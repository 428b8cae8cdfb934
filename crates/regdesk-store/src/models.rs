use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// A server-side record of client-supplied state, keyed by an opaque id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Arbitrary client state. Replaced wholesale on update, never
    /// merged field by field.
    pub data: serde_json::Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When this session stops being retrievable. `None` when the
    /// configured TTL is non-positive. Recomputed on every update, not
    /// on reads.
    pub expires_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// One immutable snapshot of a plan's payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanVersion {
    /// Positive, contiguous from 1 within the parent record.
    pub version: u32,
    /// The full plan document. Opaque to this subsystem.
    pub payload: Value,
    /// What changed relative to the previous version. `None` for
    /// version 1.
    pub modifications: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The durable, versioned container for one plan and all its revisions.
///
/// Invariants: at least one version exists, version numbers are
/// contiguous from 1, and `current_version` equals the version of the
/// last entry. The whole record is the unit of storage, so
/// `current_version` and its payload are always written together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRecord {
    pub id: String,
    /// Back-reference to the session that produced this plan. A lookup
    /// relation only; deleting the session leaves the plan in place.
    pub session_id: Option<String>,
    pub current_version: u32,
    /// Insertion order is version order. Entries are never reordered
    /// or individually deleted.
    pub versions: Vec<PlanVersion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlanRecord {
    /// Look up a specific version entry.
    pub fn version(&self, version: u32) -> Option<&PlanVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    /// The entry at `current_version`.
    pub fn latest(&self) -> Option<&PlanVersion> {
        self.version(self.current_version)
    }

    /// The record without its version bodies, for listings.
    pub fn summarize(&self) -> PlanSummary {
        PlanSummary {
            id: self.id.clone(),
            session_id: self.session_id.clone(),
            current_version: self.current_version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A plan record minus its version history, as returned by listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub id: String,
    pub session_id: Option<String>,
    pub current_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
