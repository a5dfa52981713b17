//! Native Memory Regions
//!
//! The host allocates native values into hierarchical memory regions
//! (transaction scope, subtransaction scope, single-invocation scope).
//! Nothing is freed element-by-element in normal operation: a region ends
//! and everything inside it, including child regions, goes with it.
//!
//! The arena is the single owner of all native bytes. Allocations are
//! addressed by stable [`AllocId`]s so a raw id can round-trip through the
//! native scalar representation the way a pointer would, without handing
//! out aliasing references.
//!
//! Freeing an id the arena does not know is an integrity fault, not a
//! lookup miss: the only callers of [`RegionArena::free`] and
//! [`RegionArena::delete_region`] are release actions, and a release
//! action holding a stale id means the lifecycle bookkeeping is broken.

use rustc_hash::FxHashMap;

use crate::error::{LifecycleError, LifecycleResult};

/// Identifier of a memory region. Stable for the life of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(u32);

impl RegionId {
    /// The raw id value.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

/// Identifier of a single allocation within the arena.
///
/// Ids are never reused, so a stale id reliably fails instead of silently
/// resolving to an unrelated allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocId(u64);

impl AllocId {
    /// The raw id value, for embedding in a fixed-width native scalar.
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Rebuild an id from its raw value.
    ///
    /// The result is only meaningful if `raw` came from [`AllocId::as_raw`];
    /// any other value resolves to nothing in the arena.
    pub fn from_raw(raw: u64) -> Self {
        AllocId(raw)
    }
}

struct Region {
    parent: Option<RegionId>,
    children: Vec<RegionId>,
    allocs: Vec<AllocId>,
}

/// Owner of all native-side memory: a tree of regions, each holding
/// allocations that die with the region.
pub struct RegionArena {
    regions: FxHashMap<RegionId, Region>,
    /// Flat allocation storage; the owning region is tracked alongside the
    /// bytes so `free` can unlink in O(1) lookups.
    allocs: FxHashMap<AllocId, (RegionId, Vec<u8>)>,
    root: RegionId,
    next_region: u32,
    next_alloc: u64,
}

impl RegionArena {
    /// Create an arena with a root region that lives as long as the arena.
    pub fn new() -> Self {
        let root = RegionId(0);
        let mut regions = FxHashMap::default();
        regions.insert(
            root,
            Region {
                parent: None,
                children: Vec::new(),
                allocs: Vec::new(),
            },
        );
        Self {
            regions,
            allocs: FxHashMap::default(),
            root,
            next_region: 1,
            next_alloc: 1,
        }
    }

    /// The root region.
    pub fn root(&self) -> RegionId {
        self.root
    }

    /// Create a child region under `parent`.
    pub fn create_region(&mut self, parent: RegionId) -> LifecycleResult<RegionId> {
        if !self.regions.contains_key(&parent) {
            return Err(LifecycleError::UnknownRegion {
                id: parent.as_raw(),
            });
        }
        let id = RegionId(self.next_region);
        self.next_region += 1;
        self.regions.insert(
            id,
            Region {
                parent: Some(parent),
                children: Vec::new(),
                allocs: Vec::new(),
            },
        );
        self.regions
            .get_mut(&parent)
            .expect("parent checked above")
            .children
            .push(id);
        Ok(id)
    }

    /// Whether `region` currently exists.
    pub fn region_exists(&self, region: RegionId) -> bool {
        self.regions.contains_key(&region)
    }

    /// Allocate `len` zeroed bytes in `region`.
    pub fn alloc(&mut self, region: RegionId, len: usize) -> LifecycleResult<AllocId> {
        self.alloc_bytes(region, vec![0; len])
    }

    /// Move `bytes` into a fresh allocation in `region`.
    pub fn alloc_bytes(&mut self, region: RegionId, bytes: Vec<u8>) -> LifecycleResult<AllocId> {
        let reg = self
            .regions
            .get_mut(&region)
            .ok_or(LifecycleError::UnknownRegion {
                id: region.as_raw(),
            })?;
        let id = AllocId(self.next_alloc);
        self.next_alloc += 1;
        reg.allocs.push(id);
        self.allocs.insert(id, (region, bytes));
        Ok(id)
    }

    /// Whether `id` is a live allocation.
    pub fn contains(&self, id: AllocId) -> bool {
        self.allocs.contains_key(&id)
    }

    /// Read access to an allocation's bytes.
    pub fn bytes(&self, id: AllocId) -> LifecycleResult<&[u8]> {
        self.allocs
            .get(&id)
            .map(|(_, b)| b.as_slice())
            .ok_or(LifecycleError::UnknownAllocation { id: id.as_raw() })
    }

    /// Write access to an allocation's bytes.
    pub fn bytes_mut(&mut self, id: AllocId) -> LifecycleResult<&mut [u8]> {
        self.allocs
            .get_mut(&id)
            .map(|(_, b)| b.as_mut_slice())
            .ok_or(LifecycleError::UnknownAllocation { id: id.as_raw() })
    }

    /// Free a single allocation.
    ///
    /// An unknown id is an integrity fault: release bookkeeping pointed at
    /// memory the arena does not own (or already freed it).
    pub fn free(&mut self, id: AllocId) -> LifecycleResult<()> {
        let (region, _) = self.allocs.remove(&id).ok_or_else(|| {
            LifecycleError::integrity(format!("free of unknown allocation {}", id.as_raw()))
        })?;
        if let Some(reg) = self.regions.get_mut(&region) {
            reg.allocs.retain(|a| *a != id);
        }
        Ok(())
    }

    /// Delete a region and, recursively, every child region and every
    /// allocation they hold. The root region cannot be deleted.
    pub fn delete_region(&mut self, region: RegionId) -> LifecycleResult<()> {
        if region == self.root {
            return Err(LifecycleError::integrity("attempt to delete root region"));
        }
        if !self.regions.contains_key(&region) {
            return Err(LifecycleError::integrity(format!(
                "delete of unknown region {}",
                region.as_raw()
            )));
        }

        // Unlink from the parent first so a partial failure cannot leave a
        // dangling child edge.
        if let Some(parent) = self.regions[&region].parent {
            if let Some(p) = self.regions.get_mut(&parent) {
                p.children.retain(|c| *c != region);
            }
        }

        let mut stack = vec![region];
        while let Some(r) = stack.pop() {
            let reg = self
                .regions
                .remove(&r)
                .expect("region ids on the stack come from the tree");
            for a in reg.allocs {
                self.allocs.remove(&a);
            }
            stack.extend(reg.children);
        }
        Ok(())
    }

    /// Number of live allocations, all regions combined.
    pub fn alloc_count(&self) -> usize {
        self.allocs.len()
    }
}

impl Default for RegionArena {
    fn default() -> Self {
        Self::new()
    }
}
