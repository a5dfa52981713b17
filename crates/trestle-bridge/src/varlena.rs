//! Variable-Length Native Layout
//!
//! The native wire form of a variable-width value: a `u32` payload length
//! immediately followed by the payload bytes, 4-byte aligned. The managed
//! counterpart here is the string type; the same walk rules serve any
//! future variable-width kind.
//!
//! Unlike the fixed-width scalars, a missing managed string coerces to
//! the zero (null-reference) datum; a by-reference type has no meaningful
//! zero value.

use smol_str::SmolStr;
use trestle_lifecycle::{RegionArena, RegionId};

use crate::datum::Datum;
use crate::error::{BridgeError, BridgeResult};
use crate::vm::VmValue;

/// Alignment requirement of the variable-length layout.
pub const VARLENA_ALIGN: usize = 4;

/// Encode a string into its native wire form.
pub fn build(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + s.len());
    out.extend_from_slice(&(s.len() as u32).to_ne_bytes());
    out.extend_from_slice(s.as_bytes());
    out
}

/// Decode the native wire form back into a string slice.
pub fn parse(bytes: &[u8]) -> BridgeResult<&str> {
    if bytes.len() < 4 {
        return Err(BridgeError::malformed("varlena shorter than its header"));
    }
    let len = u32::from_ne_bytes(bytes[0..4].try_into().expect("4 bytes")) as usize;
    if bytes.len() < 4 + len {
        return Err(BridgeError::malformed("varlena truncated"));
    }
    std::str::from_utf8(&bytes[4..4 + len])
        .map_err(|_| BridgeError::malformed("varlena payload is not UTF-8"))
}

/// Total wire length (header + payload) of the varlena starting at
/// `bytes`, for the variable-width element walk.
pub fn total_len(bytes: &[u8]) -> BridgeResult<usize> {
    if bytes.len() < 4 {
        return Err(BridgeError::malformed("varlena shorter than its header"));
    }
    let len = u32::from_ne_bytes(bytes[0..4].try_into().expect("4 bytes")) as usize;
    Ok(4 + len)
}

/// Native → managed: materialize the managed string.
pub fn to_managed(bytes: &[u8]) -> BridgeResult<VmValue> {
    Ok(VmValue::Str(SmolStr::new(parse(bytes)?)))
}

/// Managed → native: allocate the wire form into the caller's region.
/// `Null` becomes the zero datum.
pub fn to_native(
    value: &VmValue,
    arena: &mut RegionArena,
    region: RegionId,
) -> BridgeResult<Datum> {
    match value {
        VmValue::Null => Ok(Datum::zero()),
        VmValue::Str(s) => {
            let id = arena.alloc_bytes(region, build(s))?;
            Ok(Datum::from_alloc(id))
        }
        other => Err(BridgeError::mismatch("String", other.type_name())),
    }
}

/// Managed → container element bytes, for the array scratch path.
pub fn elem_bytes(value: &VmValue) -> BridgeResult<Vec<u8>> {
    match value {
        VmValue::Str(s) => Ok(build(s)),
        other => Err(BridgeError::mismatch("String", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wire_round_trip() {
        let bytes = build("héllo");
        assert_eq!(total_len(&bytes).unwrap(), bytes.len());
        assert_eq!(parse(&bytes).unwrap(), "héllo");
    }

    #[test]
    fn empty_string_is_header_only() {
        let bytes = build("");
        assert_eq!(bytes.len(), 4);
        assert_eq!(parse(&bytes).unwrap(), "");
    }

    #[test]
    fn truncated_payload_rejected() {
        let mut bytes = build("abcdef");
        bytes.truncate(6);
        assert!(parse(&bytes).is_err());
    }

    #[test]
    fn region_round_trip() {
        let mut arena = RegionArena::new();
        let region = arena.root();
        let datum = to_native(&VmValue::Str("hello".into()), &mut arena, region).unwrap();
        let stored = arena.bytes(datum.as_alloc()).unwrap();
        assert_eq!(to_managed(stored).unwrap(), VmValue::Str("hello".into()));
    }

    #[test]
    fn null_is_zero_datum() {
        let mut arena = RegionArena::new();
        let region = arena.root();
        let datum = to_native(&VmValue::Null, &mut arena, region).unwrap();
        assert!(datum.is_zero());
        // Nothing was allocated for it.
        assert_eq!(arena.alloc_count(), 0);
    }

    #[test]
    fn non_string_rejected() {
        let mut arena = RegionArena::new();
        let region = arena.root();
        let err = to_native(&VmValue::Int(1), &mut arena, region).unwrap_err();
        assert!(matches!(err, BridgeError::TypeMismatch { .. }));
    }
}
