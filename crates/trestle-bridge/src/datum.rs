//! Native Scalar Representation
//!
//! A [`Datum`] is the host's uniform fixed-width value slot: pass-by-value
//! scalars live in the low bits, by-reference values carry the raw id of a
//! region allocation. Which interpretation applies is decided by the type
//! descriptor (`by_value`), never by the datum itself.
//!
//! All accessors are pure bit reinterpretation; none of them allocate.

use trestle_lifecycle::AllocId;

/// Uniform native value slot, 64 bits wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datum(u64);

impl Datum {
    /// The all-zero datum: `false`, `0`, `0.0`, or the null reference,
    /// depending on the descriptor reading it.
    pub fn zero() -> Self {
        Datum(0)
    }

    /// Whether this is the all-zero datum.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn from_bool(v: bool) -> Self {
        Datum(u64::from(v))
    }

    pub fn as_bool(self) -> bool {
        self.0 != 0
    }

    pub fn from_i16(v: i16) -> Self {
        Datum(u64::from(v as u16))
    }

    pub fn as_i16(self) -> i16 {
        self.0 as u16 as i16
    }

    pub fn from_i32(v: i32) -> Self {
        Datum(u64::from(v as u32))
    }

    pub fn as_i32(self) -> i32 {
        self.0 as u32 as i32
    }

    pub fn from_i64(v: i64) -> Self {
        Datum(v as u64)
    }

    pub fn as_i64(self) -> i64 {
        self.0 as i64
    }

    pub fn from_f32(v: f32) -> Self {
        Datum(u64::from(v.to_bits()))
    }

    pub fn as_f32(self) -> f32 {
        f32::from_bits(self.0 as u32)
    }

    pub fn from_f64(v: f64) -> Self {
        Datum(v.to_bits())
    }

    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    /// Wrap an allocation id as a by-reference datum.
    pub fn from_alloc(id: AllocId) -> Self {
        Datum(id.as_raw())
    }

    /// Read this datum as an allocation id. Only meaningful under a
    /// by-reference descriptor.
    pub fn as_alloc(self) -> AllocId {
        AllocId::from_raw(self.0)
    }

    /// The raw bits.
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Rebuild from raw bits.
    pub fn from_raw(raw: u64) -> Self {
        Datum(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trips() {
        assert!(Datum::from_bool(true).as_bool());
        assert!(!Datum::from_bool(false).as_bool());
        assert_eq!(Datum::from_i16(-7).as_i16(), -7);
        assert_eq!(Datum::from_i32(i32::MIN).as_i32(), i32::MIN);
        assert_eq!(Datum::from_i64(i64::MAX).as_i64(), i64::MAX);
        assert_eq!(Datum::from_f32(1.5).as_f32(), 1.5);
        assert_eq!(Datum::from_f64(-2.25).as_f64(), -2.25);
    }

    #[test]
    fn nan_bits_survive() {
        let d = Datum::from_f64(f64::NAN);
        assert!(d.as_f64().is_nan());
        let f = Datum::from_f32(f32::NAN);
        assert!(f.as_f32().is_nan());
    }

    #[test]
    fn negative_widths_do_not_bleed() {
        // A negative i16 reinterpreted must not sign-extend into the i32 view
        // of a different datum; each accessor masks its own width.
        let d = Datum::from_i16(-1);
        assert_eq!(d.as_i16(), -1);
        assert_eq!(d.as_raw(), 0xFFFF);
    }

    #[test]
    fn zero_is_every_type_s_zero() {
        let z = Datum::zero();
        assert!(!z.as_bool());
        assert_eq!(z.as_i32(), 0);
        assert_eq!(z.as_f64(), 0.0);
        assert!(z.is_zero());
    }
}
