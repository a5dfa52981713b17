//! # Trestle Lifecycle
//!
//! Native memory regions and cross-runtime resource lifecycle tracking.
//!
//! The host process is native and region-allocating: values live in a tree
//! of memory regions and die when their region does. The managed runtime
//! is garbage-collected and frees things whenever its collector gets
//! around to it. This crate keeps the two worlds consistent for every
//! native resource a managed handle depends on:
//!
//! - [`RegionArena`]: the host's region tree and allocations.
//! - [`LifecycleBridge`]: one record per exposed resource, released either
//!   when its scope ends or when the collector reports the handle
//!   unreachable, whichever comes first, exactly once.
//! - [`ReleaseKey`]: the capability that confines actual release to native
//!   code.
//!
//! ## Threading
//!
//! The host is logically single-threaded per invocation; the bridge's
//! locks exist to make the record-table critical sections explicit and to
//! tolerate reentrant native calls, not to support parallel release.

pub mod bridge;
pub mod error;
pub mod record;
pub mod region;

// Re-export main types for convenience
pub use bridge::{LifecycleBridge, ReleaseKey};
pub use error::{LifecycleError, LifecycleResult};
pub use record::{LifecycleHandle, Reachability, ReleaseAction, ReleaseState, ScopeToken};
pub use region::{AllocId, RegionArena, RegionId};
