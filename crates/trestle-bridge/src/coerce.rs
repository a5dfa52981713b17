//! Coercion Interface
//!
//! The two entry points the function-dispatch layer calls, routed through
//! a descriptor's coercer tag. Both are total over valid descriptor/value
//! pairs, failing only on unsupported dimensionality or shape mismatch.
//!
//! A managed exception surfaced by a bound operation mid-coercion
//! propagates out immediately via `?`: it is re-raised in the native
//! error channel before any further native allocation happens, so no
//! half-built native state is left behind.

use trestle_lifecycle::{RegionArena, RegionId};

use crate::array;
use crate::datum::Datum;
use crate::error::{BridgeError, BridgeResult};
use crate::registry::{Coercer, TypeDescriptor};
use crate::scalar;
use crate::varlena;
use crate::vm::VmValue;

/// Native value → managed value, per the descriptor.
pub fn coerce_to_managed(
    desc: &TypeDescriptor,
    datum: Datum,
    arena: &RegionArena,
) -> BridgeResult<VmValue> {
    match desc.coercer() {
        Coercer::Primitive(kind) => Ok(scalar::to_managed(kind, datum)),
        Coercer::Boxed(kind) => scalar::boxed_to_managed(kind, datum),
        Coercer::Text => {
            if datum.is_zero() {
                return Ok(VmValue::Null);
            }
            varlena::to_managed(arena.bytes(datum.as_alloc())?)
        }
        Coercer::PrimitiveArray(_) | Coercer::ObjectArray => array::to_managed(desc, datum, arena),
    }
}

/// Managed value → native value, per the descriptor. By-reference results
/// are allocated into `region`.
pub fn coerce_to_native(
    desc: &TypeDescriptor,
    value: &VmValue,
    arena: &mut RegionArena,
    region: RegionId,
) -> BridgeResult<Datum> {
    match desc.coercer() {
        Coercer::Primitive(kind) | Coercer::Boxed(kind) => scalar::to_native(kind, value),
        Coercer::Text => varlena::to_native(value, arena, region),
        Coercer::PrimitiveArray(_) | Coercer::ObjectArray => {
            array::to_native(desc, value, arena, region)
        }
    }
}

/// Declaration-time substitution check. A failure is a lattice error,
/// recovered at the call boundary; it never aborts the process.
pub fn check_substitution(
    declared: &TypeDescriptor,
    provided: &TypeDescriptor,
) -> BridgeResult<()> {
    if provided.can_replace(declared) {
        Ok(())
    } else {
        Err(BridgeError::lattice(
            declared.name().as_str(),
            provided.name().as_str(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Registry, RegistryConfig};
    use crate::vm::{BoxedValue, VmArray};
    use pretty_assertions::assert_eq;

    #[test]
    fn dispatch_covers_every_coercer() {
        let mut reg = Registry::bootstrap(RegistryConfig::default()).unwrap();
        let mut arena = RegionArena::new();
        let root = arena.root();

        let int = reg.lookup("int").unwrap();
        let d = coerce_to_native(&int, &VmValue::Int(5), &mut arena, root).unwrap();
        assert_eq!(coerce_to_managed(&int, d, &arena).unwrap(), VmValue::Int(5));

        let boxed = reg.lookup("Integer").unwrap();
        let d = coerce_to_native(&boxed, &VmValue::Boxed(BoxedValue::Integer(5)), &mut arena, root)
            .unwrap();
        assert_eq!(
            coerce_to_managed(&boxed, d, &arena).unwrap(),
            VmValue::Boxed(BoxedValue::Integer(5))
        );

        let string = reg.lookup("String").unwrap();
        let d = coerce_to_native(&string, &VmValue::Str("hi".into()), &mut arena, root).unwrap();
        assert_eq!(
            coerce_to_managed(&string, d, &arena).unwrap(),
            VmValue::Str("hi".into())
        );

        let int_arr = reg.array_of(&int).unwrap();
        let v = VmValue::Array(VmArray::Int(vec![1, 2]));
        let d = coerce_to_native(&int_arr, &v, &mut arena, root).unwrap();
        assert_eq!(coerce_to_managed(&int_arr, d, &arena).unwrap(), v);
    }

    #[test]
    fn null_text_datum_is_managed_null() {
        let reg = Registry::bootstrap(RegistryConfig::default()).unwrap();
        let arena = RegionArena::new();
        let string = reg.lookup("String").unwrap();
        assert_eq!(
            coerce_to_managed(&string, Datum::zero(), &arena).unwrap(),
            VmValue::Null
        );
    }

    #[test]
    fn substitution_failure_is_lattice_error() {
        let reg = Registry::bootstrap(RegistryConfig::default()).unwrap();
        let int = reg.lookup("int").unwrap();
        let boxed = reg.lookup("Integer").unwrap();

        assert!(check_substitution(&int, &boxed).is_ok());
        let err = check_substitution(&boxed, &int).unwrap_err();
        assert!(err.is_lattice_error());
    }
}
