//! Array Marshaller
//!
//! Converts between native array containers and managed arrays, in both
//! directions, for 1-D and 2-D shapes. Dimensionality above 2 fails fast;
//! that is a real limitation of the layout, preserved rather than relaxed.
//!
//! ## Null handling
//!
//! Container data is compacted: nulls occupy a bitmap bit and no storage,
//! so the bitmap is addressed by ungapped logical index over the full
//! flattened sequence while the data is addressed by the running count of
//! non-null elements.
//!
//! Marshalling into a managed *primitive* array has no null slot to use,
//! so null positions surface as the kind's empty sentinel: zero for bool
//! and the integer kinds, NaN for the float kinds. One policy per type
//! family, applied in both dimensionalities. Object arrays keep real null
//! slots and never see a sentinel.
//!
//! ## Shape inference, managed → native
//!
//! Dimensionality comes from the managed array's runtime shape: an object
//! array whose first present slot is itself an array is 2-D. Lower bounds
//! are always 1. When the first inner row is absent or empty, the inner
//! extent is inferred as 0 and the outer extent kept; rows disagreeing
//! with the inferred extent are rejected as ragged.

use tracing::warn;
use trestle_lifecycle::{RegionArena, RegionId};

use crate::container::{ArrayBuf, ArrayView, ElemLayout};
use crate::datum::Datum;
use crate::error::{BridgeError, BridgeResult};
use crate::registry::{Coercer, TypeDescriptor};
use crate::scalar;
use crate::varlena;
use crate::vm::{ScalarKind, VmArray, VmValue};

// ============================================================================
// Entry points
// ============================================================================

/// Native container → managed array, through the array descriptor.
pub fn to_managed(
    desc: &TypeDescriptor,
    datum: Datum,
    arena: &RegionArena,
) -> BridgeResult<VmValue> {
    let elem = desc
        .element()
        .ok_or_else(|| BridgeError::malformed("array descriptor without an element type"))?;
    if datum.is_zero() {
        return Ok(VmValue::Null);
    }
    let bytes = arena.bytes(datum.as_alloc())?;
    let view = ArrayView::parse(bytes)?;
    match desc.coercer() {
        Coercer::PrimitiveArray(kind) => prim_to_managed(kind, &view, &elem.elem_layout()),
        Coercer::ObjectArray => obj_to_managed(&view, elem),
        _ => Err(BridgeError::mismatch("array type", desc.name().as_str())),
    }
}

/// Managed array → native container, allocated into `region`.
pub fn to_native(
    desc: &TypeDescriptor,
    value: &VmValue,
    arena: &mut RegionArena,
    region: RegionId,
) -> BridgeResult<Datum> {
    let elem = desc
        .element()
        .ok_or_else(|| BridgeError::malformed("array descriptor without an element type"))?;
    let arr = match value {
        VmValue::Null => return Ok(Datum::zero()),
        VmValue::Array(arr) => arr,
        other => return Err(BridgeError::mismatch(desc.name().as_str(), other.type_name())),
    };
    let buf = match desc.coercer() {
        Coercer::PrimitiveArray(kind) => prim_to_native(kind, elem, arr)?,
        Coercer::ObjectArray => obj_to_native(elem, arr)?,
        _ => return Err(BridgeError::mismatch("array type", desc.name().as_str())),
    };
    let id = arena.alloc_bytes(region, buf.into_bytes())?;
    Ok(Datum::from_alloc(id))
}

// ============================================================================
// Primitive fast paths
// ============================================================================

fn sentinel_datum(kind: ScalarKind) -> Datum {
    match kind {
        ScalarKind::Float => Datum::from_f32(f32::NAN),
        ScalarKind::Double => Datum::from_f64(f64::NAN),
        _ => Datum::zero(),
    }
}

fn typed_array(kind: ScalarKind, vals: Vec<Datum>) -> VmArray {
    match kind {
        ScalarKind::Bool => VmArray::Bool(vals.iter().map(|d| d.as_bool()).collect()),
        ScalarKind::Short => VmArray::Short(vals.iter().map(|d| d.as_i16()).collect()),
        ScalarKind::Int => VmArray::Int(vals.iter().map(|d| d.as_i32()).collect()),
        ScalarKind::Long => VmArray::Long(vals.iter().map(|d| d.as_i64()).collect()),
        ScalarKind::Float => VmArray::Float(vals.iter().map(|d| d.as_f32()).collect()),
        ScalarKind::Double => VmArray::Double(vals.iter().map(|d| d.as_f64()).collect()),
    }
}

fn prim_to_managed(
    kind: ScalarKind,
    view: &ArrayView<'_>,
    layout: &ElemLayout,
) -> BridgeResult<VmValue> {
    let size = kind.elem_size();
    let data = view.data_with(layout);

    if view.ndim() == 1 {
        let n = view.nelems();
        let mut vals = Vec::with_capacity(n);
        match view.bitmap() {
            Some(bm) => {
                // Data holds only the non-null elements; k tracks them.
                let mut k = 0usize;
                for i in 0..n {
                    if bm.is_null(i) {
                        vals.push(sentinel_datum(kind));
                    } else {
                        vals.push(scalar::datum_from_bytes(kind, slice_at(data, k, size)?)?);
                        k += 1;
                    }
                }
            }
            None => {
                for i in 0..n {
                    vals.push(scalar::datum_from_bytes(kind, slice_at(data, i, size)?)?);
                }
            }
        }
        return Ok(VmValue::Array(typed_array(kind, vals)));
    }

    // 2-D: outer object array of inner primitive arrays. The bitmap is
    // addressed by ungapped logical index over the whole flattened
    // sequence, not per row.
    let dims = view.dims();
    let (dim1, dim2) = (dims[0] as usize, dims[1] as usize);
    let bitmap = view.bitmap();
    let mut outer = Vec::with_capacity(dim1);
    let mut nc = 0usize;
    let mut nulls = 0usize;
    for _ in 0..dim1 {
        let mut vals = Vec::with_capacity(dim2);
        for _ in 0..dim2 {
            match &bitmap {
                Some(bm) if bm.is_null(nc) => {
                    vals.push(sentinel_datum(kind));
                    nulls += 1;
                }
                _ => {
                    vals.push(scalar::datum_from_bytes(
                        kind,
                        slice_at(data, nc - nulls, size)?,
                    )?);
                }
            }
            nc += 1;
        }
        outer.push(Some(VmValue::Array(typed_array(kind, vals))));
    }
    Ok(VmValue::Array(VmArray::Object(outer)))
}

fn slice_at(data: &[u8], index: usize, size: usize) -> BridgeResult<&[u8]> {
    let at = index * size;
    data.get(at..at + size)
        .ok_or_else(|| BridgeError::malformed("element data out of range"))
}

fn prim_to_native(
    kind: ScalarKind,
    elem: &TypeDescriptor,
    arr: &VmArray,
) -> BridgeResult<ArrayBuf> {
    let layout = elem.elem_layout();
    let size = kind.elem_size();

    if let Some(have) = arr.primitive_kind() {
        if have != kind {
            return Err(BridgeError::mismatch(
                format!("{}[]", kind.type_name()),
                format!("{}[]", have.type_name()),
            ));
        }
        // Contiguous 1-D primitive array: one bulk fill, no bitmap.
        let n = arr.len();
        let mut buf = ArrayBuf::build_fixed(&[n as i32], &[1], &layout, false)?;
        let data = buf.data_mut();
        for i in 0..n {
            let bytes = scalar::datum_to_bytes(kind, typed_elem(arr, i));
            data[i * size..(i + 1) * size].copy_from_slice(&bytes);
        }
        return Ok(buf);
    }

    let VmArray::Object(slots) = arr else {
        unreachable!("non-primitive arrays are object arrays");
    };
    match first_present(slots) {
        Some(VmValue::Array(_)) => prim_2d_to_native(kind, &layout, slots),
        // A boxed-object array is accepted wherever the primitive array is
        // declared; nulls survive as bitmap entries.
        _ => {
            let scratch = scratch_from_slots(slots, |v| {
                Ok(scalar::datum_to_bytes(kind, scalar::to_native(kind, v)?))
            })?;
            ArrayBuf::construct(&[slots.len() as i32], &[1], &scratch, &layout)
        }
    }
}

fn prim_2d_to_native(
    kind: ScalarKind,
    layout: &ElemLayout,
    slots: &[Option<VmValue>],
) -> BridgeResult<ArrayBuf> {
    let size = kind.elem_size();
    let dim1 = slots.len();
    let dim2 = inferred_inner_extent(slots)?;

    let mut buf =
        ArrayBuf::build_fixed(&[dim1 as i32, dim2 as i32], &[1, 1], layout, false)?;
    let data = buf.data_mut();
    for (r, slot) in slots.iter().enumerate() {
        let row = match slot {
            None => {
                if dim2 == 0 {
                    continue;
                }
                return Err(BridgeError::shape(format!("null inner array at row {r}")));
            }
            Some(VmValue::Array(row)) => row,
            Some(other) => {
                return Err(BridgeError::mismatch(
                    format!("{}[]", kind.type_name()),
                    other.type_name(),
                ))
            }
        };
        if row.primitive_kind() != Some(kind) {
            return Err(BridgeError::mismatch(
                format!("{}[]", kind.type_name()),
                "object array",
            ));
        }
        if row.len() != dim2 {
            return Err(BridgeError::shape(format!(
                "ragged inner array: row {r} has {} elements, expected {dim2}",
                row.len()
            )));
        }
        for j in 0..dim2 {
            let at = (r * dim2 + j) * size;
            let bytes = scalar::datum_to_bytes(kind, typed_elem(row, j));
            data[at..at + size].copy_from_slice(&bytes);
        }
    }
    Ok(buf)
}

fn typed_elem(arr: &VmArray, i: usize) -> Datum {
    match arr {
        VmArray::Bool(v) => Datum::from_bool(v[i]),
        VmArray::Short(v) => Datum::from_i16(v[i]),
        VmArray::Int(v) => Datum::from_i32(v[i]),
        VmArray::Long(v) => Datum::from_i64(v[i]),
        VmArray::Float(v) => Datum::from_f32(v[i]),
        VmArray::Double(v) => Datum::from_f64(v[i]),
        VmArray::Object(_) => unreachable!("typed_elem on object array"),
    }
}

// ============================================================================
// General object path
// ============================================================================

fn obj_to_managed(view: &ArrayView<'_>, elem: &TypeDescriptor) -> BridgeResult<VmValue> {
    let slices = view.elements(&elem.elem_layout())?;
    let mut values = Vec::with_capacity(slices.len());
    for slice in slices {
        values.push(match slice {
            None => None,
            Some(bytes) => Some(elem_from_bytes(elem, bytes)?),
        });
    }

    if view.ndim() == 1 {
        return Ok(VmValue::Array(VmArray::Object(values)));
    }
    let dims = view.dims();
    let dim2 = dims[1] as usize;
    let mut outer = Vec::with_capacity(dims[0] as usize);
    let mut rest = values;
    for _ in 0..dims[0] {
        let tail = rest.split_off(dim2.min(rest.len()));
        outer.push(Some(VmValue::Array(VmArray::Object(rest))));
        rest = tail;
    }
    Ok(VmValue::Array(VmArray::Object(outer)))
}

fn elem_from_bytes(elem: &TypeDescriptor, bytes: &[u8]) -> BridgeResult<VmValue> {
    match elem.coercer() {
        Coercer::Primitive(kind) => Ok(scalar::to_managed(
            kind,
            scalar::datum_from_bytes(kind, bytes)?,
        )),
        Coercer::Boxed(kind) => {
            scalar::boxed_to_managed(kind, scalar::datum_from_bytes(kind, bytes)?)
        }
        Coercer::Text => varlena::to_managed(bytes),
        _ => Err(BridgeError::shape(format!(
            "unsupported element type {}",
            elem.name()
        ))),
    }
}

fn obj_to_native(elem: &TypeDescriptor, arr: &VmArray) -> BridgeResult<ArrayBuf> {
    let layout = elem.elem_layout();

    // A primitive managed array is accepted where the object array is
    // declared; the lattice's element rule licenses the substitution.
    let slots: Vec<Option<VmValue>> = match arr {
        VmArray::Object(slots) => slots
            .iter()
            .map(|s| s.clone().filter(|v| !v.is_null()))
            .collect(),
        typed => (0..typed.len())
            .map(|i| Some(scalar_value(typed, i)))
            .collect(),
    };

    match first_present(&slots) {
        Some(VmValue::Array(_)) => {
            let dim1 = slots.len();
            let dim2 = inferred_inner_extent(&slots)?;
            let mut scratch = Vec::with_capacity(dim1 * dim2);
            for (r, slot) in slots.iter().enumerate() {
                let row = match slot {
                    None => {
                        if dim2 == 0 {
                            continue;
                        }
                        return Err(BridgeError::shape(format!(
                            "null inner array at row {r}"
                        )));
                    }
                    Some(VmValue::Array(row)) => row,
                    Some(other) => {
                        return Err(BridgeError::mismatch("array", other.type_name()))
                    }
                };
                if row.len() != dim2 {
                    return Err(BridgeError::shape(format!(
                        "ragged inner array: row {r} has {} elements, expected {dim2}",
                        row.len()
                    )));
                }
                let row_slots: Vec<Option<VmValue>> = match row {
                    VmArray::Object(inner) => inner
                        .iter()
                        .map(|s| s.clone().filter(|v| !v.is_null()))
                        .collect(),
                    typed => (0..typed.len()).map(|i| Some(scalar_value(typed, i))).collect(),
                };
                for slot in &row_slots {
                    scratch.push(match slot {
                        None => None,
                        Some(v) => Some(elem_to_bytes(elem, v)?),
                    });
                }
            }
            ArrayBuf::construct(&[dim1 as i32, dim2 as i32], &[1, 1], &scratch, &layout)
        }
        _ => {
            let scratch = scratch_from_slots(&slots, |v| elem_to_bytes(elem, v))?;
            ArrayBuf::construct(&[slots.len() as i32], &[1], &scratch, &layout)
        }
    }
}

fn elem_to_bytes(elem: &TypeDescriptor, value: &VmValue) -> BridgeResult<Vec<u8>> {
    match elem.coercer() {
        Coercer::Primitive(kind) | Coercer::Boxed(kind) => Ok(scalar::datum_to_bytes(
            kind,
            scalar::to_native(kind, value)?,
        )),
        Coercer::Text => varlena::elem_bytes(value),
        _ => Err(BridgeError::shape(format!(
            "unsupported element type {}",
            elem.name()
        ))),
    }
}

fn scalar_value(arr: &VmArray, i: usize) -> VmValue {
    match arr {
        VmArray::Bool(v) => VmValue::Bool(v[i]),
        VmArray::Short(v) => VmValue::Short(v[i]),
        VmArray::Int(v) => VmValue::Int(v[i]),
        VmArray::Long(v) => VmValue::Long(v[i]),
        VmArray::Float(v) => VmValue::Float(v[i]),
        VmArray::Double(v) => VmValue::Double(v[i]),
        VmArray::Object(_) => unreachable!("scalar_value on object array"),
    }
}

// ============================================================================
// Shared shape helpers
// ============================================================================

fn first_present(slots: &[Option<VmValue>]) -> Option<&VmValue> {
    slots.iter().flatten().next()
}

/// Inner extent of a 2-D managed array, taken from the first slot. An
/// absent or empty first row pins the extent to 0 while the outer extent
/// is kept; the ragged check then rejects any later row that disagrees.
fn inferred_inner_extent(slots: &[Option<VmValue>]) -> BridgeResult<usize> {
    let dim2 = match slots.first() {
        None | Some(None) => 0,
        Some(Some(VmValue::Array(row))) => row.len(),
        Some(Some(other)) => {
            return Err(BridgeError::mismatch("array", other.type_name()));
        }
    };
    if dim2 == 0 && !slots.is_empty() {
        warn!(
            outer = slots.len(),
            "first inner array absent or empty; inner extent inferred as 0"
        );
    }
    Ok(dim2)
}

fn scratch_from_slots(
    slots: &[Option<VmValue>],
    mut to_bytes: impl FnMut(&VmValue) -> BridgeResult<Vec<u8>>,
) -> BridgeResult<Vec<Option<Vec<u8>>>> {
    let mut scratch = Vec::with_capacity(slots.len());
    for slot in slots {
        scratch.push(match slot {
            None => None,
            Some(v) if v.is_null() => None,
            Some(v) => Some(to_bytes(v)?),
        });
    }
    Ok(scratch)
}
