//! Resource Lifecycle Bridge
//!
//! Tracks native resources that managed-side handles depend on, and severs
//! the dependency when the owning scope ends, independent of managed-
//! runtime collection timing.
//!
//! ## Release paths
//!
//! Two paths reach a record, in either order:
//!
//! 1. **Scope expiry**: the host signals [`notify_scope_ended`] at
//!    well-defined phase boundaries during transaction or subtransaction
//!    cleanup. Every `Live` record under the token is released
//!    synchronously, on the host's own thread.
//! 2. **Unreachability**: the managed collector determines no managed
//!    reference remains and calls [`enqueue_unreachable`]. The host drains
//!    the queue with [`drain_unreachable_queue`] at safe call-return
//!    points, never from inside arbitrary managed callbacks.
//!
//! Whichever path arrives second finds the record already `Released` and
//! does nothing. The underlying free runs exactly once.
//!
//! ## Authorization
//!
//! Both release entry points require a [`ReleaseKey`], minted exactly once
//! by [`LifecycleBridge::new`] and held by native code only. Managed code
//! triggers release strictly indirectly: by becoming unreachable, or by
//! its scope ending. It can never forge a native free.
//!
//! [`notify_scope_ended`]: LifecycleBridge::notify_scope_ended
//! [`enqueue_unreachable`]: LifecycleBridge::enqueue_unreachable
//! [`drain_unreachable_queue`]: LifecycleBridge::drain_unreachable_queue

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, error};

use crate::error::{LifecycleError, LifecycleResult};
use crate::record::{
    LifecycleHandle, Reachability, Record, ReleaseAction, ReleaseState, ScopeToken,
};
use crate::region::RegionArena;

/// Process-wide capability authorizing native release operations.
///
/// There is no public constructor and the type is not `Clone`: the only
/// instance is the one returned from [`LifecycleBridge::new`], and handing
/// a `&ReleaseKey` to a function is what marks it as native-side code.
#[derive(Debug)]
pub struct ReleaseKey {
    _priv: (),
}

/// The bridge proper: record table plus cleanup queue.
///
/// Record state transitions are single-writer critical sections. Locks are
/// never held across a release-action invocation, so a reentrant native
/// call on the host thread cannot deadlock against the bridge.
pub struct LifecycleBridge {
    records: Mutex<FxHashMap<LifecycleHandle, Record>>,
    queue: Mutex<Vec<LifecycleHandle>>,
    next_handle: Mutex<u64>,
}

impl LifecycleBridge {
    /// Create the bridge and mint the one release key.
    pub fn new() -> (Self, ReleaseKey) {
        (
            Self {
                records: Mutex::new(FxHashMap::default()),
                queue: Mutex::new(Vec::new()),
                next_handle: Mutex::new(1),
            },
            ReleaseKey { _priv: () },
        )
    }

    /// Register a native resource whose lifetime is governed by `scope`.
    ///
    /// The new record starts `Live` and `Reachable`.
    pub fn register_resource(&self, scope: ScopeToken, action: ReleaseAction) -> LifecycleHandle {
        let handle = {
            let mut next = self.next_handle.lock();
            let h = LifecycleHandle(*next);
            *next += 1;
            h
        };
        self.records.lock().insert(
            handle,
            Record {
                scope,
                action,
                state: ReleaseState::Live,
                reach: Reachability::Reachable,
            },
        );
        handle
    }

    /// Whether the record behind `handle` is still `Live`.
    ///
    /// Managed handles call this before every native dereference; a
    /// `Released` record must make them refuse access.
    pub fn is_live(&self, handle: LifecycleHandle) -> bool {
        self.records
            .lock()
            .get(&handle)
            .map(|r| r.state == ReleaseState::Live)
            .unwrap_or(false)
    }

    /// Snapshot of a record's (release, reachability) state.
    pub fn record_state(
        &self,
        handle: LifecycleHandle,
    ) -> Option<(ReleaseState, Reachability)> {
        self.records
            .lock()
            .get(&handle)
            .map(|r| (r.state, r.reach))
    }

    /// Number of records currently `Live`.
    pub fn live_count(&self) -> usize {
        self.records
            .lock()
            .values()
            .filter(|r| r.state == ReleaseState::Live)
            .count()
    }

    /// The managed collector found `handle` unreachable: move it to the
    /// cleanup queue. No native work happens here; this is the one entry
    /// point safe to call from collection context. Enqueueing twice, or
    /// enqueueing an already-collected handle, is a no-op.
    pub fn enqueue_unreachable(&self, handle: LifecycleHandle) -> LifecycleResult<()> {
        let mut records = self.records.lock();
        let rec = records
            .get_mut(&handle)
            .ok_or(LifecycleError::UnknownHandle {
                handle: handle.as_raw(),
            })?;
        if rec.reach != Reachability::Reachable {
            return Ok(());
        }
        rec.reach = Reachability::Enqueued;
        drop(records);
        self.queue.lock().push(handle);
        Ok(())
    }

    /// The scope behind `token` has ended: release every `Live` record
    /// registered under it, synchronously, on the caller's thread.
    ///
    /// Order across records is unspecified; each release is independent of
    /// the others. A token with no live records is a normal no-op (scopes
    /// end all the time). Returns the number of release actions invoked.
    pub fn notify_scope_ended(
        &self,
        token: ScopeToken,
        key: &ReleaseKey,
        arena: &mut RegionArena,
    ) -> LifecycleResult<usize> {
        let matching: Vec<LifecycleHandle> = self
            .records
            .lock()
            .iter()
            .filter(|(_, r)| r.scope == token && r.state == ReleaseState::Live)
            .map(|(h, _)| *h)
            .collect();

        let mut released = 0;
        for handle in matching {
            if self.release_one(handle, key, arena)? {
                released += 1;
            }
        }
        debug!(
            scope = token.as_raw(),
            released, "scope ended, records released"
        );
        Ok(released)
    }

    /// Drain the cleanup queue. Called by the host at safe call-return
    /// points, never from inside arbitrary managed callbacks.
    ///
    /// Each drained record still `Live` has its release action performed;
    /// records the scope path already released are just collected. Either
    /// way the native bookkeeping entry is removed. Returns the number of
    /// release actions invoked.
    pub fn drain_unreachable_queue(
        &self,
        key: &ReleaseKey,
        arena: &mut RegionArena,
    ) -> LifecycleResult<usize> {
        let drained: Vec<LifecycleHandle> = std::mem::take(&mut *self.queue.lock());

        let mut released = 0;
        for handle in drained {
            if self.release_one(handle, key, arena)? {
                released += 1;
            }
            // Collected: the native bookkeeping entry goes away.
            self.records.lock().remove(&handle);
        }
        Ok(released)
    }

    /// Flip one record `Live` → `Released` and run its action. Returns
    /// `false` when the record was already `Released`: the racing path got
    /// there first and the second arrival must be a no-op.
    ///
    /// The record lock is dropped before the action runs.
    fn release_one(
        &self,
        handle: LifecycleHandle,
        _key: &ReleaseKey,
        arena: &mut RegionArena,
    ) -> LifecycleResult<bool> {
        let action = {
            let mut records = self.records.lock();
            let rec = records
                .get_mut(&handle)
                .ok_or(LifecycleError::UnknownHandle {
                    handle: handle.as_raw(),
                })?;
            if rec.state == ReleaseState::Released {
                return Ok(false);
            }
            rec.state = ReleaseState::Released;
            rec.action
        };

        let result = match action {
            ReleaseAction::FreeAllocation(id) => arena.free(id),
            ReleaseAction::DeleteRegion(id) => arena.delete_region(id),
        };
        if let Err(err) = result {
            error!(
                handle = handle.as_raw(),
                %err,
                "release action failed; escalating"
            );
            return Err(err);
        }
        Ok(true)
    }
}
