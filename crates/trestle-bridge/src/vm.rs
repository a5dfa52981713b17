//! Managed Value Model
//!
//! The bridge's view of the managed runtime's values: unboxed scalars,
//! boxed scalar objects, strings, and arrays. The VM owns these; native
//! code only ever sees them across a coercion boundary.
//!
//! ## Bound operations
//!
//! Boxed classes expose exactly two bound operations to native code:
//! construct-with-value and read-value. Both return `Result`; the error
//! side is the managed exception channel. A coercion that receives `Err`
//! from a bound operation must re-raise it in the native error channel
//! before doing any further native allocation.

use smol_str::SmolStr;

use crate::datum::Datum;

// ============================================================================
// Exceptions
// ============================================================================

/// An exception surfaced by the managed runtime during a bound operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmException {
    /// Managed exception class name
    pub class: SmolStr,
    /// Exception message
    pub message: String,
}

impl VmException {
    /// Create a new exception value.
    pub fn new(class: impl Into<SmolStr>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
        }
    }

    fn class_cast(expected: &str, actual: &str) -> Self {
        Self::new(
            "ClassCastException",
            format!("{expected} expected, got {actual}"),
        )
    }
}

/// Result type for bound managed operations
pub type VmResult<T> = Result<T, VmException>;

// ============================================================================
// Scalar kinds
// ============================================================================

/// The closed set of primitive scalar kinds the bridge supports.
///
/// Every kind carries its native byte width and alignment, its managed
/// wire signature, and the names of its primitive and boxed managed types.
/// The set is a pattern, not an exhaustive catalogue: adding a kind means
/// adding one variant and its rows below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl ScalarKind {
    /// All supported kinds, in bootstrap registration order.
    pub const ALL: [ScalarKind; 6] = [
        ScalarKind::Bool,
        ScalarKind::Short,
        ScalarKind::Int,
        ScalarKind::Long,
        ScalarKind::Float,
        ScalarKind::Double,
    ];

    /// Native storage width in bytes.
    pub fn elem_size(self) -> usize {
        match self {
            ScalarKind::Bool => 1,
            ScalarKind::Short => 2,
            ScalarKind::Int | ScalarKind::Float => 4,
            ScalarKind::Long | ScalarKind::Double => 8,
        }
    }

    /// Native alignment requirement in bytes. Same as the width for these
    /// kinds; variable-length types diverge.
    pub fn align(self) -> usize {
        self.elem_size()
    }

    /// Managed primitive type name.
    pub fn type_name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "boolean",
            ScalarKind::Short => "short",
            ScalarKind::Int => "int",
            ScalarKind::Long => "long",
            ScalarKind::Float => "float",
            ScalarKind::Double => "double",
        }
    }

    /// Managed wire signature of the primitive.
    pub fn signature(self) -> &'static str {
        match self {
            ScalarKind::Bool => "Z",
            ScalarKind::Short => "S",
            ScalarKind::Int => "I",
            ScalarKind::Long => "J",
            ScalarKind::Float => "F",
            ScalarKind::Double => "D",
        }
    }

    /// The boxed counterpart class.
    pub fn boxed_class(self) -> BoxedClass {
        match self {
            ScalarKind::Bool => BoxedClass::Boolean,
            ScalarKind::Short => BoxedClass::Short,
            ScalarKind::Int => BoxedClass::Integer,
            ScalarKind::Long => BoxedClass::Long,
            ScalarKind::Float => BoxedClass::Float,
            ScalarKind::Double => BoxedClass::Double,
        }
    }
}

// ============================================================================
// Boxed scalar objects
// ============================================================================

/// A boxed scalar class in the managed runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxedClass {
    Boolean,
    Short,
    Integer,
    Long,
    Float,
    Double,
}

impl BoxedClass {
    /// The primitive kind this class boxes.
    pub fn unboxed_kind(self) -> ScalarKind {
        match self {
            BoxedClass::Boolean => ScalarKind::Bool,
            BoxedClass::Short => ScalarKind::Short,
            BoxedClass::Integer => ScalarKind::Int,
            BoxedClass::Long => ScalarKind::Long,
            BoxedClass::Float => ScalarKind::Float,
            BoxedClass::Double => ScalarKind::Double,
        }
    }

    /// Managed class name.
    pub fn class_name(self) -> &'static str {
        match self {
            BoxedClass::Boolean => "Boolean",
            BoxedClass::Short => "Short",
            BoxedClass::Integer => "Integer",
            BoxedClass::Long => "Long",
            BoxedClass::Float => "Float",
            BoxedClass::Double => "Double",
        }
    }

    /// Managed wire signature of the boxed class.
    pub fn signature(self) -> &'static str {
        match self {
            BoxedClass::Boolean => "LBoolean;",
            BoxedClass::Short => "LShort;",
            BoxedClass::Integer => "LInteger;",
            BoxedClass::Long => "LLong;",
            BoxedClass::Float => "LFloat;",
            BoxedClass::Double => "LDouble;",
        }
    }

    /// Bound operation: construct a boxed instance holding `datum`.
    ///
    /// This is the one allocation a boxed coercion performs on the managed
    /// side.
    pub fn construct(self, datum: Datum) -> VmResult<BoxedValue> {
        Ok(match self {
            BoxedClass::Boolean => BoxedValue::Boolean(datum.as_bool()),
            BoxedClass::Short => BoxedValue::Short(datum.as_i16()),
            BoxedClass::Integer => BoxedValue::Integer(datum.as_i32()),
            BoxedClass::Long => BoxedValue::Long(datum.as_i64()),
            BoxedClass::Float => BoxedValue::Float(datum.as_f32()),
            BoxedClass::Double => BoxedValue::Double(datum.as_f64()),
        })
    }

    /// Bound operation: read the wrapped value back out of a boxed
    /// instance. A class mismatch is a managed exception, not a panic.
    pub fn read(self, value: &BoxedValue) -> VmResult<Datum> {
        if value.class() != self {
            return Err(VmException::class_cast(
                self.class_name(),
                value.class().class_name(),
            ));
        }
        Ok(match *value {
            BoxedValue::Boolean(v) => Datum::from_bool(v),
            BoxedValue::Short(v) => Datum::from_i16(v),
            BoxedValue::Integer(v) => Datum::from_i32(v),
            BoxedValue::Long(v) => Datum::from_i64(v),
            BoxedValue::Float(v) => Datum::from_f32(v),
            BoxedValue::Double(v) => Datum::from_f64(v),
        })
    }
}

/// A boxed scalar instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoxedValue {
    Boolean(bool),
    Short(i16),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl BoxedValue {
    /// The class of this instance.
    pub fn class(&self) -> BoxedClass {
        match self {
            BoxedValue::Boolean(_) => BoxedClass::Boolean,
            BoxedValue::Short(_) => BoxedClass::Short,
            BoxedValue::Integer(_) => BoxedClass::Integer,
            BoxedValue::Long(_) => BoxedClass::Long,
            BoxedValue::Float(_) => BoxedClass::Float,
            BoxedValue::Double(_) => BoxedClass::Double,
        }
    }
}

// ============================================================================
// Values and arrays
// ============================================================================

/// Any managed value the bridge can see.
#[derive(Debug, Clone, PartialEq)]
pub enum VmValue {
    /// The managed null reference / absent value
    Null,
    Bool(bool),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// A managed string
    Str(SmolStr),
    /// A boxed scalar object
    Boxed(BoxedValue),
    /// A managed array
    Array(VmArray),
}

impl VmValue {
    /// Whether this is the managed null.
    pub fn is_null(&self) -> bool {
        matches!(self, VmValue::Null)
    }

    /// Runtime type name, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            VmValue::Null => "null",
            VmValue::Bool(_) => "boolean",
            VmValue::Short(_) => "short",
            VmValue::Int(_) => "int",
            VmValue::Long(_) => "long",
            VmValue::Float(_) => "float",
            VmValue::Double(_) => "double",
            VmValue::Str(_) => "String",
            VmValue::Boxed(b) => b.class().class_name(),
            VmValue::Array(_) => "array",
        }
    }
}

/// A managed array.
///
/// Primitive arrays are typed vectors with no null slots, matching the
/// managed runtime's packed primitive arrays. Object arrays hold nullable
/// slots and are also how 2-D arrays appear: an object array whose present
/// slots are inner arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum VmArray {
    Bool(Vec<bool>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Object(Vec<Option<VmValue>>),
}

impl VmArray {
    /// Number of slots.
    pub fn len(&self) -> usize {
        match self {
            VmArray::Bool(v) => v.len(),
            VmArray::Short(v) => v.len(),
            VmArray::Int(v) => v.len(),
            VmArray::Long(v) => v.len(),
            VmArray::Float(v) => v.len(),
            VmArray::Double(v) => v.len(),
            VmArray::Object(v) => v.len(),
        }
    }

    /// Whether the array has zero slots.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this is an object (nullable-slot) array.
    pub fn is_object(&self) -> bool {
        matches!(self, VmArray::Object(_))
    }

    /// The primitive kind of a typed array, if it is one.
    pub fn primitive_kind(&self) -> Option<ScalarKind> {
        match self {
            VmArray::Bool(_) => Some(ScalarKind::Bool),
            VmArray::Short(_) => Some(ScalarKind::Short),
            VmArray::Int(_) => Some(ScalarKind::Int),
            VmArray::Long(_) => Some(ScalarKind::Long),
            VmArray::Float(_) => Some(ScalarKind::Float),
            VmArray::Double(_) => Some(ScalarKind::Double),
            VmArray::Object(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn boxed_construct_and_read() {
        let boxed = BoxedClass::Integer.construct(Datum::from_i32(42)).unwrap();
        assert_eq!(boxed, BoxedValue::Integer(42));
        let back = BoxedClass::Integer.read(&boxed).unwrap();
        assert_eq!(back.as_i32(), 42);
    }

    #[test]
    fn boxed_read_wrong_class_raises() {
        let boxed = BoxedClass::Long.construct(Datum::from_i64(1)).unwrap();
        let exc = BoxedClass::Integer.read(&boxed).unwrap_err();
        assert_eq!(exc.class, "ClassCastException");
        assert!(exc.message.contains("Integer"));
        assert!(exc.message.contains("Long"));
    }

    #[test]
    fn kind_metadata_is_consistent() {
        for kind in ScalarKind::ALL {
            assert_eq!(kind.boxed_class().unboxed_kind(), kind);
            assert_eq!(kind.align(), kind.elem_size());
            assert_eq!(kind.signature().len(), 1);
        }
    }

    #[test]
    fn array_len_and_kind() {
        let arr = VmArray::Int(vec![1, 2, 3]);
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.primitive_kind(), Some(ScalarKind::Int));
        assert!(!arr.is_object());

        let obj = VmArray::Object(vec![Some(VmValue::Int(1)), None]);
        assert_eq!(obj.len(), 2);
        assert!(obj.is_object());
        assert_eq!(obj.primitive_kind(), None);
    }

    #[test]
    fn value_type_names() {
        assert_eq!(VmValue::Null.type_name(), "null");
        assert_eq!(
            VmValue::Boxed(BoxedValue::Double(1.0)).type_name(),
            "Double"
        );
        assert_eq!(VmValue::Str("x".into()).type_name(), "String");
    }
}
