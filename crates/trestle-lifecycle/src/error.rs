//! Error Types for Lifecycle Tracking
//!
//! Errors split into two severities:
//!
//! - Lookup errors (`UnknownRegion`, `UnknownHandle`): the caller asked
//!   about something that is not (or no longer) tracked. Recoverable.
//! - Integrity faults: the bridge's own bookkeeping is inconsistent with
//!   the region layer (a release action reached an allocation the arena
//!   does not know, a double-free slipped past the record state check).
//!   Never recovered; callers log and escalate.

use thiserror::Error;

/// Result type for lifecycle operations
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Lifecycle and region errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The bridge and the region layer disagree; a broken invariant.
    #[error("lifecycle integrity fault: {context}")]
    IntegrityFault {
        /// What was being attempted when the fault was detected
        context: String,
    },

    /// Region id not present in the arena
    #[error("unknown region {id}")]
    UnknownRegion {
        /// The raw region id
        id: u32,
    },

    /// Allocation id not present in the arena
    #[error("unknown allocation {id}")]
    UnknownAllocation {
        /// The raw allocation id
        id: u64,
    },

    /// Lifecycle handle not present in the record table
    #[error("unknown lifecycle handle {handle}")]
    UnknownHandle {
        /// The raw handle value
        handle: u64,
    },
}

impl LifecycleError {
    /// Create an integrity fault error
    pub fn integrity(context: impl Into<String>) -> Self {
        LifecycleError::IntegrityFault {
            context: context.into(),
        }
    }

    /// Fatal errors are never recovered at the call boundary; the caller
    /// logs and escalates to process-level failure handling.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LifecycleError::IntegrityFault { .. })
    }
}
