//! # Trestle Bridge
//!
//! Type coercion and array marshalling between a native, region-allocating
//! host process and the managed VM embedded in it.
//!
//! ## Overview
//!
//! The host's values are fixed-width scalars ([`Datum`]) and array
//! containers, raw memory with bit-packed null maps. The VM's values are
//! boxed or unboxed scalars and managed arrays ([`VmValue`]). This crate
//! converts between the two and keeps every native-memory-backed managed
//! handle registered with the lifecycle bridge.
//!
//! ## Module Structure
//!
//! - [`bitmap`]: null bitmap codec (bit clear = null)
//! - [`container`]: array container binary layout and builders
//! - [`datum`]: the native scalar representation
//! - [`vm`]: managed value model and the bound boxed operations
//! - [`registry`]: type descriptor registry and substitution lattice
//! - [`scalar`]: scalar coercer pairs
//! - [`varlena`]: variable-length native layout and the string coercers
//! - [`array`]: the array marshaller, both directions
//! - [`coerce`]: the coercion entry points for the dispatch layer
//! - [`wrapper`]: native-buffer handles registered with the lifecycle
//!   bridge
//! - [`error`]: error taxonomy (shape / lattice / managed exception /
//!   resource)
//!
//! ## Concurrency
//!
//! One host thread drives both runtimes; cross-runtime calls are
//! synchronous, and a call into managed code may re-enter native code on
//! the same thread. Published descriptors are immutable and `Arc`-shared,
//! so registry lookups are safe anywhere; mutation (registration, array
//! synthesis) stays with the owner.

pub mod array;
pub mod bitmap;
pub mod coerce;
pub mod container;
pub mod datum;
pub mod error;
pub mod registry;
pub mod scalar;
pub mod varlena;
pub mod vm;
pub mod wrapper;

// Re-export main types for convenience
pub use bitmap::NullBitmap;
pub use coerce::{check_substitution, coerce_to_managed, coerce_to_native};
pub use container::{ArrayBuf, ArrayView, ElemLayout, ElemSize};
pub use datum::Datum;
pub use error::{BridgeError, BridgeResult};
pub use registry::{
    Align, ByteLen, Coercer, Registry, RegistryConfig, TypeDescriptor, TypeId,
};
pub use vm::{BoxedClass, BoxedValue, ScalarKind, VmArray, VmException, VmValue};
pub use wrapper::NativeBufferHandle;
