//! Scalar Coercers
//!
//! One coercion pair per primitive kind, plus the boxed counterparts.
//!
//! - `to_managed` reinterprets the native fixed-width value as the managed
//!   scalar. No allocation.
//! - `to_native` is the inverse. Policy: a missing managed value coerces
//!   to the kind's **zero value**, not to a native NULL marker.
//!
//! Boxed coercion routes through the two bound operations on the boxed
//! class; an error from either is a managed exception and is re-raised
//! immediately, before any further native work.
//!
//! Both directions accept either managed form: a primitive target takes a
//! boxed instance of its class, and the boxed target's `to_native` is the
//! same function. Cross-kind values are a type mismatch, never silently
//! widened.

use crate::datum::Datum;
use crate::error::{BridgeResult, BridgeError};
use crate::vm::{ScalarKind, VmValue};

/// Native → managed for an unboxed scalar. Pure reinterpretation.
pub fn to_managed(kind: ScalarKind, datum: Datum) -> VmValue {
    match kind {
        ScalarKind::Bool => VmValue::Bool(datum.as_bool()),
        ScalarKind::Short => VmValue::Short(datum.as_i16()),
        ScalarKind::Int => VmValue::Int(datum.as_i32()),
        ScalarKind::Long => VmValue::Long(datum.as_i64()),
        ScalarKind::Float => VmValue::Float(datum.as_f32()),
        ScalarKind::Double => VmValue::Double(datum.as_f64()),
    }
}

/// Native → managed for a boxed scalar: construct an instance of the
/// boxed class holding the value.
pub fn boxed_to_managed(kind: ScalarKind, datum: Datum) -> BridgeResult<VmValue> {
    let boxed = kind.boxed_class().construct(datum)?;
    Ok(VmValue::Boxed(boxed))
}

/// Managed → native for both the primitive and its boxed class.
///
/// `Null` coerces to the kind's zero value. A boxed instance is unwrapped
/// through the bound read operation, whose class check surfaces as a
/// managed exception.
pub fn to_native(kind: ScalarKind, value: &VmValue) -> BridgeResult<Datum> {
    match (kind, value) {
        (_, VmValue::Null) => Ok(Datum::zero()),
        (ScalarKind::Bool, VmValue::Bool(v)) => Ok(Datum::from_bool(*v)),
        (ScalarKind::Short, VmValue::Short(v)) => Ok(Datum::from_i16(*v)),
        (ScalarKind::Int, VmValue::Int(v)) => Ok(Datum::from_i32(*v)),
        (ScalarKind::Long, VmValue::Long(v)) => Ok(Datum::from_i64(*v)),
        (ScalarKind::Float, VmValue::Float(v)) => Ok(Datum::from_f32(*v)),
        (ScalarKind::Double, VmValue::Double(v)) => Ok(Datum::from_f64(*v)),
        (_, VmValue::Boxed(b)) => Ok(kind.boxed_class().read(b)?),
        (_, other) => Err(BridgeError::mismatch(kind.type_name(), other.type_name())),
    }
}

/// Read a fixed-width native element out of container bytes.
pub fn datum_from_bytes(kind: ScalarKind, bytes: &[u8]) -> BridgeResult<Datum> {
    let size = kind.elem_size();
    if bytes.len() < size {
        return Err(BridgeError::malformed(format!(
            "{} bytes for a {} element",
            bytes.len(),
            kind.type_name()
        )));
    }
    let b = &bytes[..size];
    Ok(match kind {
        ScalarKind::Bool => Datum::from_bool(b[0] != 0),
        ScalarKind::Short => Datum::from_i16(i16::from_ne_bytes(b.try_into().expect("2 bytes"))),
        ScalarKind::Int => Datum::from_i32(i32::from_ne_bytes(b.try_into().expect("4 bytes"))),
        ScalarKind::Long => Datum::from_i64(i64::from_ne_bytes(b.try_into().expect("8 bytes"))),
        ScalarKind::Float => Datum::from_f32(f32::from_ne_bytes(b.try_into().expect("4 bytes"))),
        ScalarKind::Double => Datum::from_f64(f64::from_ne_bytes(b.try_into().expect("8 bytes"))),
    })
}

/// Write a fixed-width native element into container-ready bytes.
pub fn datum_to_bytes(kind: ScalarKind, datum: Datum) -> Vec<u8> {
    match kind {
        ScalarKind::Bool => vec![u8::from(datum.as_bool())],
        ScalarKind::Short => datum.as_i16().to_ne_bytes().to_vec(),
        ScalarKind::Int => datum.as_i32().to_ne_bytes().to_vec(),
        ScalarKind::Long => datum.as_i64().to_ne_bytes().to_vec(),
        ScalarKind::Float => datum.as_f32().to_ne_bytes().to_vec(),
        ScalarKind::Double => datum.as_f64().to_ne_bytes().to_vec(),
    }
}
