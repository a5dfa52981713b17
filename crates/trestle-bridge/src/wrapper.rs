//! Native-Buffer Wrapper Handles
//!
//! A [`NativeBufferHandle`] exposes native bytes to the managed runtime
//! without copying them into the managed heap. The bytes are moved into a
//! dedicated child region whose deletion is registered with the lifecycle
//! bridge, so the handle's backing store dies with its scope no matter
//! what the managed collector is doing. Every read re-checks the record
//! first and refuses access once the resource is `Released`.
//!
//! This is the concrete instance of the rule that any coerced value
//! wrapping native memory registers with the lifecycle bridge.

use trestle_lifecycle::{
    AllocId, LifecycleBridge, LifecycleHandle, RegionArena, RegionId, ReleaseAction, ScopeToken,
};

use crate::error::{BridgeError, BridgeResult};

/// Managed-side handle over a native allocation.
#[derive(Debug)]
pub struct NativeBufferHandle {
    handle: LifecycleHandle,
    alloc: AllocId,
    region: RegionId,
}

impl NativeBufferHandle {
    /// Expose `source` to the managed runtime under `scope`.
    ///
    /// The bytes are copied into a fresh region under `parent`; the
    /// region's deletion is the handle's release action.
    pub fn expose(
        arena: &mut RegionArena,
        parent: RegionId,
        source: AllocId,
        bridge: &LifecycleBridge,
        scope: ScopeToken,
    ) -> BridgeResult<Self> {
        let copied = arena.bytes(source)?.to_vec();
        let region = arena.create_region(parent)?;
        let alloc = arena.alloc_bytes(region, copied)?;
        let handle = bridge.register_resource(scope, ReleaseAction::DeleteRegion(region));
        Ok(Self {
            handle,
            alloc,
            region,
        })
    }

    /// Read the wrapped bytes. Refused once the record is `Released`,
    /// regardless of whether the managed handle is still reachable.
    pub fn read<'a>(
        &self,
        bridge: &LifecycleBridge,
        arena: &'a RegionArena,
    ) -> BridgeResult<&'a [u8]> {
        if !bridge.is_live(self.handle) {
            return Err(BridgeError::released(format!(
                "buffer handle {}",
                self.handle.as_raw()
            )));
        }
        Ok(arena.bytes(self.alloc)?)
    }

    /// The lifecycle record behind this handle.
    pub fn lifecycle_handle(&self) -> LifecycleHandle {
        self.handle
    }

    /// The region holding the wrapped bytes.
    pub fn region(&self) -> RegionId {
        self.region
    }

    /// Collector entry point: report this handle unreachable. The native
    /// free happens later, at the host's next queue drain.
    pub fn mark_unreachable(&self, bridge: &LifecycleBridge) -> BridgeResult<()> {
        bridge.enqueue_unreachable(self.handle)?;
        Ok(())
    }
}
