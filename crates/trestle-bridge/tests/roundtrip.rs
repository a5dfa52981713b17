//! Integration tests for the marshalling engine and lifecycle bridge.
//!
//! These exercise the full path: registry bootstrap, descriptor lookup,
//! coercion through real containers in a real region arena, and release
//! via both lifecycle paths.

use proptest::prelude::*;

use trestle_bridge::{
    coerce_to_managed, coerce_to_native, ArrayBuf, ArrayView, BoxedValue, Datum, Registry,
    RegistryConfig, ScalarKind, VmArray, VmValue,
};
use trestle_lifecycle::{LifecycleBridge, RegionArena, ReleaseAction, ScopeToken};

fn booted() -> (Registry, RegionArena) {
    (
        Registry::bootstrap(RegistryConfig::default()).unwrap(),
        RegionArena::new(),
    )
}

fn int_container(arena: &mut RegionArena, vals: &[Option<i32>]) -> Datum {
    let (reg, _) = booted();
    let int = reg.lookup("int").unwrap();
    let layout = int.elem_layout();
    let scratch: Vec<Option<Vec<u8>>> = vals
        .iter()
        .map(|v| v.map(|v| v.to_ne_bytes().to_vec()))
        .collect();
    let buf = ArrayBuf::construct(&[vals.len() as i32], &[1], &scratch, &layout).unwrap();
    let id = arena.alloc_bytes(arena.root(), buf.into_bytes()).unwrap();
    Datum::from_alloc(id)
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

mod scenarios {
    use super::*;

    /// Scenario A: native integer array `[1, NULL, 3]`, bitmap `101` in
    /// little-endian bit order, marshals to a managed array `[1, 0, 3]`
    /// with the logical null at index 1.
    #[test]
    fn integer_array_with_null_marshals_with_zero_sentinel() {
        let (mut reg, mut arena) = booted();
        let datum = int_container(&mut arena, &[Some(1), None, Some(3)]);

        // The container carries the documented bitmap byte.
        let view = ArrayView::parse(arena.bytes(datum.as_alloc()).unwrap()).unwrap();
        let bm = view.bitmap().unwrap();
        assert_eq!(bm.as_bytes(), &[0b0000_0101]);
        assert!(bm.is_null(1));

        let int = reg.lookup("int").unwrap();
        let desc = reg.array_of(&int).unwrap();
        let managed = coerce_to_managed(&desc, datum, &arena).unwrap();
        assert_eq!(managed, VmValue::Array(VmArray::Int(vec![1, 0, 3])));
    }

    /// Scenario B: a 2x3 native double array with no nulls marshals to a
    /// managed 2-element array of 3-element rows matching the source
    /// exactly: no NaN substitution when no nulls are present.
    #[test]
    fn two_by_three_double_array_marshals_exactly() {
        let (mut reg, mut arena) = booted();
        let root = arena.root();
        let double = reg.lookup("double").unwrap();
        let desc = reg.array_of(&double).unwrap();

        let rows = VmValue::Array(VmArray::Object(vec![
            Some(VmValue::Array(VmArray::Double(vec![1.0, 2.5, -3.0]))),
            Some(VmValue::Array(VmArray::Double(vec![0.0, -0.5, 42.0]))),
        ]));
        let datum = coerce_to_native(&desc, &rows, &mut arena, root).unwrap();

        let view = ArrayView::parse(arena.bytes(datum.as_alloc()).unwrap()).unwrap();
        assert_eq!(view.dims(), vec![2, 3]);
        assert!(!view.has_nulls());

        let back = coerce_to_managed(&desc, datum, &arena).unwrap();
        assert_eq!(back, rows);
    }

    /// Scenario C: registering a resource under scope S and signaling the
    /// end of S results in exactly one release-action invocation and a
    /// `Released` record.
    #[test]
    fn scope_end_releases_exactly_once() {
        let (bridge, key) = LifecycleBridge::new();
        let mut arena = RegionArena::new();
        let alloc = arena.alloc(arena.root(), 64).unwrap();
        let scope = ScopeToken::from_raw(0xBEEF);

        let handle = bridge.register_resource(scope, ReleaseAction::FreeAllocation(alloc));
        let released = bridge.notify_scope_ended(scope, &key, &mut arena).unwrap();

        assert_eq!(released, 1);
        assert!(!bridge.is_live(handle));
        assert!(!arena.contains(alloc));
    }

    /// A release racing between scope expiry and queue drain executes the
    /// underlying free exactly once, in either arrival order.
    #[test]
    fn racing_release_paths_free_exactly_once() {
        for scope_first in [true, false] {
            let (bridge, key) = LifecycleBridge::new();
            let mut arena = RegionArena::new();
            let alloc = arena.alloc(arena.root(), 8).unwrap();
            let scope = ScopeToken::from_raw(1);
            let handle = bridge.register_resource(scope, ReleaseAction::FreeAllocation(alloc));
            bridge.enqueue_unreachable(handle).unwrap();

            let mut frees = 0;
            if scope_first {
                frees += bridge.notify_scope_ended(scope, &key, &mut arena).unwrap();
                frees += bridge.drain_unreachable_queue(&key, &mut arena).unwrap();
            } else {
                frees += bridge.drain_unreachable_queue(&key, &mut arena).unwrap();
                frees += bridge.notify_scope_ended(scope, &key, &mut arena).unwrap();
            }
            assert_eq!(frees, 1, "scope_first = {scope_first}");
            assert!(!arena.contains(alloc));
        }
    }
}

// ============================================================================
// Lattice properties
// ============================================================================

mod lattice {
    use super::*;

    #[test]
    fn boxed_replaces_primitive_for_every_kind() {
        let (reg, _) = booted();
        for kind in ScalarKind::ALL {
            let prim = reg.lookup(kind.type_name()).unwrap();
            let boxed = reg.lookup(kind.boxed_class().class_name()).unwrap();
            assert!(boxed.can_replace(&prim));
            assert!(!prim.can_replace(&boxed));
        }
    }

    #[test]
    fn array_substitution_holds_both_ways() {
        let (mut reg, _) = booted();
        for kind in ScalarKind::ALL {
            let prim = reg.lookup(kind.type_name()).unwrap();
            let prim_arr = reg.array_of(&prim).unwrap();
            let boxed_arr = reg
                .lookup(&format!("{}[]", kind.boxed_class().class_name()))
                .unwrap();
            assert!(boxed_arr.can_replace(&prim_arr));
            assert!(prim_arr.can_replace(&boxed_arr));
        }
    }
}

// ============================================================================
// Round-trip properties
// ============================================================================

proptest! {
    /// Scalar round trip for every primitive kind; null coerces to zero.
    #[test]
    fn int_scalar_round_trip(v in any::<i32>()) {
        let (reg, mut arena) = booted();
        let root = arena.root();
        let int = reg.lookup("int").unwrap();
        let d = coerce_to_native(&int, &VmValue::Int(v), &mut arena, root).unwrap();
        prop_assert_eq!(coerce_to_managed(&int, d, &arena).unwrap(), VmValue::Int(v));
        let z = coerce_to_native(&int, &VmValue::Null, &mut arena, root).unwrap();
        prop_assert!(z.is_zero());
    }

    #[test]
    fn double_scalar_round_trip(v in any::<f64>()) {
        let (reg, mut arena) = booted();
        let root = arena.root();
        let double = reg.lookup("double").unwrap();
        let d = coerce_to_native(&double, &VmValue::Double(v), &mut arena, root).unwrap();
        let back = coerce_to_managed(&double, d, &arena).unwrap();
        // Bit-exact, including NaN payloads.
        match back {
            VmValue::Double(b) => prop_assert_eq!(b.to_bits(), v.to_bits()),
            other => prop_assert!(false, "unexpected {other:?}"),
        }
    }

    /// 1-D containers with 0..=n nulls: native -> managed -> native keeps
    /// values at non-null positions and the null position set.
    #[test]
    fn nullable_int_array_round_trip(vals in proptest::collection::vec(
        proptest::option::of(any::<i32>()), 0..48,
    )) {
        let (mut reg, mut arena) = booted();
        let root = arena.root();
        let datum = int_container(&mut arena, &vals);

        // The boxed-element array keeps nulls as real null slots.
        let boxed = reg.lookup("Integer").unwrap();
        let desc = reg.array_of(&boxed).unwrap();
        let managed = coerce_to_managed(&desc, datum, &arena).unwrap();
        let back = coerce_to_native(&desc, &managed, &mut arena, root).unwrap();

        let view = ArrayView::parse(arena.bytes(back.as_alloc()).unwrap()).unwrap();
        prop_assert_eq!(view.dims(), vec![vals.len() as i32]);
        let int = reg.lookup("int").unwrap();
        let slices = view.elements(&int.elem_layout()).unwrap();
        for (slot, original) in slices.iter().zip(&vals) {
            match (slot, original) {
                (None, None) => {}
                (Some(bytes), Some(v)) => {
                    prop_assert_eq!(i32::from_ne_bytes((*bytes).try_into().unwrap()), *v);
                }
                other => prop_assert!(false, "null positions diverged: {other:?}"),
            }
        }
    }

    /// 2-D containers with uniform rows keep dims and element order under
    /// row-major flattening. At least one row: an empty object array has
    /// no runtime shape to reveal a second dimension and marshals as 1-D.
    #[test]
    fn two_d_long_array_round_trip(
        rows in proptest::collection::vec(
            proptest::collection::vec(any::<i64>(), 3), 1..12,
        ),
    ) {
        let (mut reg, mut arena) = booted();
        let root = arena.root();
        let long = reg.lookup("long").unwrap();
        let desc = reg.array_of(&long).unwrap();

        let value = VmValue::Array(VmArray::Object(
            rows.iter()
                .map(|r| Some(VmValue::Array(VmArray::Long(r.clone()))))
                .collect(),
        ));
        let datum = coerce_to_native(&desc, &value, &mut arena, root).unwrap();

        let view = ArrayView::parse(arena.bytes(datum.as_alloc()).unwrap()).unwrap();
        prop_assert_eq!(view.dims(), vec![rows.len() as i32, 3]);

        let back = coerce_to_managed(&desc, datum, &arena).unwrap();
        prop_assert_eq!(back, value);
    }

    /// Variable-width string arrays survive the walk regardless of
    /// payload lengths and null placement.
    #[test]
    fn string_array_round_trip(vals in proptest::collection::vec(
        proptest::option::of("[a-z]{0,12}"), 0..24,
    )) {
        let (mut reg, mut arena) = booted();
        let root = arena.root();
        let string = reg.lookup("String").unwrap();
        let desc = reg.array_of(&string).unwrap();

        let value = VmValue::Array(VmArray::Object(
            vals.iter()
                .map(|v| v.as_ref().map(|s| VmValue::Str(s.as_str().into())))
                .collect(),
        ));
        let datum = coerce_to_native(&desc, &value, &mut arena, root).unwrap();
        let back = coerce_to_managed(&desc, datum, &arena).unwrap();
        prop_assert_eq!(back, value);
    }
}

// ============================================================================
// Boxed substitution end to end
// ============================================================================

#[test]
fn boxed_array_input_for_primitive_descriptor() {
    let (mut reg, mut arena) = booted();
    let root = arena.root();
    let int = reg.lookup("int").unwrap();
    let desc = reg.array_of(&int).unwrap();

    // The descriptor's object type is what a managed caller handing over
    // Integer[] resolves against.
    let provided = desc.object_type().unwrap().clone();
    trestle_bridge::check_substitution(&desc, &provided).unwrap();

    let value = VmValue::Array(VmArray::Object(vec![
        Some(VmValue::Boxed(BoxedValue::Integer(11))),
        None,
    ]));
    let datum = coerce_to_native(&desc, &value, &mut arena, root).unwrap();
    let back = coerce_to_managed(&desc, datum, &arena).unwrap();
    assert_eq!(back, VmValue::Array(VmArray::Int(vec![11, 0])));
}
