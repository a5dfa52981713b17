//! Lifecycle Records
//!
//! One record per native resource exposed to the managed runtime. A record
//! lives on two independent axes:
//!
//! - **Release state**: `Live` until the native resource is freed or
//!   invalidated, then `Released` (terminal). The managed handle, if still
//!   reachable, must observe `Released` and refuse further native access.
//! - **Reachability**: `Reachable` while the managed runtime may still hold
//!   a reference; `Enqueued` once the collector has determined no managed
//!   reference remains and the record sits on the cleanup queue;
//!   `Collected` once native bookkeeping has been removed.
//!
//! The two axes race: scope expiry can release a record that is
//! still reachable, and queue drain can find a record the scope path
//! already released. Release actions check state before acting, so the
//! underlying free runs exactly once.

use crate::region::{AllocId, RegionId};

/// Opaque identifier for a host-defined lifetime boundary (a transaction,
/// a subtransaction, a single invocation). Expiry of the scope invalidates
/// every record registered under its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeToken(u64);

impl ScopeToken {
    /// Wrap a host-chosen raw value. Distinct scopes must use distinct
    /// values; the bridge never interprets the contents.
    pub fn from_raw(raw: u64) -> Self {
        ScopeToken(raw)
    }

    /// The raw token value.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl From<RegionId> for ScopeToken {
    /// A region id is a natural scope token: the region's deletion is the
    /// scope's end.
    fn from(region: RegionId) -> Self {
        ScopeToken(u64::from(region.as_raw()))
    }
}

/// Release state of the native resource a record tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseState {
    /// Native resource valid; managed handle may dereference it.
    Live,
    /// Native resource freed or invalidated. Terminal.
    Released,
}

/// Managed-side reachability of the handle a record tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// The managed runtime may still reference the handle.
    Reachable,
    /// The collector found the handle unreachable; the record is on the
    /// cleanup queue awaiting a drain.
    Enqueued,
    /// Drained; native bookkeeping removed.
    Collected,
}

/// The one idempotent operation that frees or invalidates the tracked
/// native resource. A closed set: nothing else is ever run on release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseAction {
    /// Free a single allocation.
    FreeAllocation(AllocId),
    /// Delete a memory region and its subtree.
    DeleteRegion(RegionId),
}

/// Handle identifying a registered record. This is the value the managed
/// side holds; it carries no authority to release anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LifecycleHandle(pub(crate) u64);

impl LifecycleHandle {
    /// The raw handle value.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// Bookkeeping for one registered native resource.
#[derive(Debug, Clone)]
pub(crate) struct Record {
    pub(crate) scope: ScopeToken,
    pub(crate) action: ReleaseAction,
    pub(crate) state: ReleaseState,
    pub(crate) reach: Reachability,
}
