//! Type Descriptor Registry
//!
//! A lattice of type descriptors keyed by name and by numeric type id.
//! Each descriptor carries its managed wire signature, its element type
//! (if an array), its byte-layout traits, and the tag selecting its
//! coercion pair. Descriptors are created once, published behind `Arc`,
//! and never mutated afterwards; lookups are safe to share.
//!
//! The registry is explicit state owned by the marshalling subsystem and
//! injected where needed; there is no ambient global.
//!
//! ## Substitution lattice
//!
//! `can_replace(a, b)` holds when `a` is the same descriptor as `b`, or
//! `a` is the boxed counterpart of `b`'s primitive. For arrays the check
//! can be computed a bit more generously: `a` (array of X) may also
//! replace `b` when `a`'s object-type array *is* `b`. That works because
//! every primitive array coercer accepts both a primitive managed array
//! and its boxed-object-array as input, so `int[]` can stand in where
//! `Integer[]` is declared; the reverse direction rides on the element
//! rule.

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::container::{ElemLayout, ElemSize};
use crate::error::{BridgeError, BridgeResult};
use crate::vm::ScalarKind;

// ============================================================================
// Identity and layout traits
// ============================================================================

/// High bit marks the synthesized array id of an element type id.
const ARRAY_ID_FLAG: u32 = 0x8000_0000;

/// Numeric identity of a native type (OID-equivalent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    pub const BOOL: TypeId = TypeId(1);
    pub const SHORT: TypeId = TypeId(2);
    pub const INT: TypeId = TypeId(3);
    pub const LONG: TypeId = TypeId(4);
    pub const FLOAT: TypeId = TypeId(5);
    pub const DOUBLE: TypeId = TypeId(6);
    pub const STRING: TypeId = TypeId(7);

    /// Wrap a raw id.
    pub fn new(raw: u32) -> Self {
        TypeId(raw)
    }

    /// The raw id value.
    pub fn as_raw(self) -> u32 {
        self.0
    }

    /// The derived id of this type's array type.
    pub fn array(self) -> TypeId {
        TypeId(self.0 | ARRAY_ID_FLAG)
    }

    /// The id for a scalar kind.
    pub fn of(kind: ScalarKind) -> Self {
        match kind {
            ScalarKind::Bool => TypeId::BOOL,
            ScalarKind::Short => TypeId::SHORT,
            ScalarKind::Int => TypeId::INT,
            ScalarKind::Long => TypeId::LONG,
            ScalarKind::Float => TypeId::FLOAT,
            ScalarKind::Double => TypeId::DOUBLE,
        }
    }
}

/// Alignment class of a native type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Byte,
    Short,
    Int,
    Double,
}

impl Align {
    /// Alignment in bytes.
    pub fn bytes(self) -> usize {
        match self {
            Align::Byte => 1,
            Align::Short => 2,
            Align::Int => 4,
            Align::Double => 8,
        }
    }

    /// The class for a power-of-two byte count.
    pub fn for_size(size: usize) -> Align {
        match size {
            1 => Align::Byte,
            2 => Align::Short,
            4 => Align::Int,
            _ => Align::Double,
        }
    }
}

/// Fixed or variable byte length of a native type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteLen {
    Fixed(usize),
    Variable,
}

/// Tag selecting a descriptor's coercion pair. A closed set dispatched by
/// `match`; no runtime-registered function pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercer {
    /// Unboxed scalar: reinterpret in place
    Primitive(ScalarKind),
    /// Boxed scalar object: the two bound operations
    Boxed(ScalarKind),
    /// Variable-length managed string
    Text,
    /// Array with the primitive fast paths
    PrimitiveArray(ScalarKind),
    /// General object array over the element descriptor
    ObjectArray,
}

// ============================================================================
// Descriptors
// ============================================================================

/// Metadata and coercion operations for one type. Registered once, looked
/// up by name or id thereafter.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    name: SmolStr,
    signature: SmolStr,
    type_id: TypeId,
    element: Option<Arc<TypeDescriptor>>,
    len: ByteLen,
    align: Align,
    by_value: bool,
    coercer: Coercer,
    object_type: Option<Arc<TypeDescriptor>>,
}

impl TypeDescriptor {
    /// Descriptor for a primitive scalar, linked to its boxed counterpart.
    pub fn primitive(kind: ScalarKind, boxed: Arc<TypeDescriptor>) -> Self {
        Self {
            name: kind.type_name().into(),
            signature: kind.signature().into(),
            type_id: TypeId::of(kind),
            element: None,
            len: ByteLen::Fixed(kind.elem_size()),
            align: Align::for_size(kind.align()),
            by_value: true,
            coercer: Coercer::Primitive(kind),
            object_type: Some(boxed),
        }
    }

    /// Descriptor for a boxed scalar class. Shares the primitive's native
    /// layout; only the managed representation differs.
    pub fn boxed(kind: ScalarKind) -> Self {
        let class = kind.boxed_class();
        Self {
            name: class.class_name().into(),
            signature: class.signature().into(),
            type_id: TypeId::of(kind),
            element: None,
            len: ByteLen::Fixed(kind.elem_size()),
            align: Align::for_size(kind.align()),
            by_value: true,
            coercer: Coercer::Boxed(kind),
            object_type: None,
        }
    }

    /// Descriptor for the variable-length managed string type.
    pub fn string() -> Self {
        Self {
            name: "String".into(),
            signature: "LString;".into(),
            type_id: TypeId::STRING,
            element: None,
            len: ByteLen::Variable,
            align: Align::Int,
            by_value: false,
            coercer: Coercer::Text,
            object_type: None,
        }
    }

    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn signature(&self) -> &SmolStr {
        &self.signature
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The element descriptor; `Some` iff this is an array type.
    pub fn element(&self) -> Option<&Arc<TypeDescriptor>> {
        self.element.as_ref()
    }

    pub fn byte_len(&self) -> ByteLen {
        self.len
    }

    pub fn align(&self) -> Align {
        self.align
    }

    pub fn by_value(&self) -> bool {
        self.by_value
    }

    pub fn coercer(&self) -> Coercer {
        self.coercer
    }

    /// The boxed counterpart of a primitive, or the boxed-element array of
    /// a primitive array (when synthesized in boxed-object-array mode).
    pub fn object_type(&self) -> Option<&Arc<TypeDescriptor>> {
        self.object_type.as_ref()
    }

    /// Whether this is an array descriptor.
    pub fn is_array(&self) -> bool {
        self.element.is_some()
    }

    /// The layout traits the container codec needs.
    pub fn elem_layout(&self) -> ElemLayout {
        ElemLayout {
            type_id: self.type_id.as_raw(),
            size: match self.len {
                ByteLen::Fixed(s) => ElemSize::Fixed(s),
                ByteLen::Variable => ElemSize::Variable,
            },
            align: self.align.bytes(),
            by_value: self.by_value,
        }
    }

    /// Whether `self` may stand in where `other` is declared.
    pub fn can_replace(&self, other: &TypeDescriptor) -> bool {
        if self.name == other.name {
            return true;
        }
        match (&self.element, &other.element) {
            (Some(se), Some(oe)) => {
                se.can_replace(oe)
                    || self
                        .object_type
                        .as_ref()
                        .is_some_and(|o| o.name == other.name)
            }
            (None, None) => match (self.coercer, other.coercer) {
                // A boxed scalar can replace its primitive, never the
                // reverse.
                (Coercer::Boxed(a), Coercer::Primitive(b)) => a == b,
                (Coercer::Boxed(a), Coercer::Boxed(b)) => a == b,
                (Coercer::Primitive(a), Coercer::Primitive(b)) => a == b,
                _ => false,
            },
            _ => false,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Registry construction options.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// When set, a synthesized primitive-array descriptor carries the
    /// array of the boxed counterpart as its object type, enabling the
    /// array branch of the substitution lattice.
    pub boxed_object_arrays: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            boxed_object_arrays: true,
        }
    }
}

/// Owner of all published descriptors.
pub struct Registry {
    by_name: IndexMap<SmolStr, Arc<TypeDescriptor>>,
    by_id: FxHashMap<u32, Arc<TypeDescriptor>>,
    config: RegistryConfig,
}

impl Registry {
    /// An empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            by_name: IndexMap::new(),
            by_id: FxHashMap::default(),
            config,
        }
    }

    /// A registry with every supported primitive, its boxed counterpart,
    /// and the string type registered. Called once at subsystem start.
    pub fn bootstrap(config: RegistryConfig) -> BridgeResult<Registry> {
        let mut reg = Registry::new(config);
        for kind in ScalarKind::ALL {
            let boxed = reg.register(TypeDescriptor::boxed(kind))?;
            reg.register(TypeDescriptor::primitive(kind, boxed))?;
        }
        reg.register(TypeDescriptor::string())?;
        Ok(reg)
    }

    /// Bootstrap-interface form: register one primitive type from its
    /// constituent metadata. Initialization collaborators call this once
    /// per supported type.
    pub fn register_primitive(
        &mut self,
        name: impl Into<SmolStr>,
        signature: impl Into<SmolStr>,
        type_id: TypeId,
        size: usize,
        align: Align,
        by_value: bool,
        coercer: Coercer,
    ) -> BridgeResult<Arc<TypeDescriptor>> {
        self.register(TypeDescriptor {
            name: name.into(),
            signature: signature.into(),
            type_id,
            element: None,
            len: ByteLen::Fixed(size),
            align,
            by_value,
            coercer,
            object_type: None,
        })
    }

    /// Publish a descriptor. Re-registering an identical descriptor under
    /// the same name returns the existing one; a conflicting descriptor
    /// is rejected.
    pub fn register(&mut self, desc: TypeDescriptor) -> BridgeResult<Arc<TypeDescriptor>> {
        if let Some(existing) = self.by_name.get(&desc.name) {
            if existing.signature == desc.signature
                && existing.type_id == desc.type_id
                && existing.coercer == desc.coercer
            {
                return Ok(existing.clone());
            }
            return Err(BridgeError::ConflictingRegistration {
                name: desc.name.to_string(),
            });
        }
        let desc = Arc::new(desc);
        self.by_name.insert(desc.name.clone(), desc.clone());
        // The unboxed/native form wins the id slot; boxed and object-array
        // descriptors only claim an id nobody else holds.
        match desc.coercer {
            Coercer::Primitive(_) | Coercer::PrimitiveArray(_) | Coercer::Text => {
                self.by_id.insert(desc.type_id.as_raw(), desc.clone());
            }
            _ => {
                self.by_id
                    .entry(desc.type_id.as_raw())
                    .or_insert_with(|| desc.clone());
            }
        }
        Ok(desc)
    }

    /// Look up a descriptor by managed type name.
    pub fn lookup(&self, name: &str) -> BridgeResult<Arc<TypeDescriptor>> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::NotRegistered {
                name: name.to_string(),
            })
    }

    /// Look up a descriptor by native type id.
    pub fn lookup_id(&self, id: TypeId) -> BridgeResult<Arc<TypeDescriptor>> {
        self.by_id
            .get(&id.as_raw())
            .cloned()
            .ok_or_else(|| BridgeError::NotRegistered {
                name: format!("type id {}", id.as_raw()),
            })
    }

    /// Contract form of the lattice predicate.
    pub fn can_replace(&self, a: &TypeDescriptor, b: &TypeDescriptor) -> bool {
        a.can_replace(b)
    }

    /// The array descriptor over `elem`, synthesized lazily and cached
    /// under `elem.name() + "[]"`.
    ///
    /// The wire signature is the `[` prefix marker plus the element
    /// signature. For a primitive element in boxed-object-array mode, the
    /// boxed counterpart's array is synthesized first and attached as the
    /// object type.
    pub fn array_of(&mut self, elem: &Arc<TypeDescriptor>) -> BridgeResult<Arc<TypeDescriptor>> {
        let name: SmolStr = format!("{}[]", elem.name()).into();
        if let Some(existing) = self.by_name.get(&name) {
            return Ok(existing.clone());
        }
        if elem.is_array() {
            // Arrays of arrays are expressed as 2-D containers, not as
            // nested array descriptors.
            return Err(BridgeError::shape(format!(
                "array element type {} is itself an array",
                elem.name()
            )));
        }

        let object_type = match elem.coercer {
            Coercer::Primitive(_) if self.config.boxed_object_arrays => {
                let boxed = elem
                    .object_type
                    .clone()
                    .ok_or_else(|| BridgeError::NotRegistered {
                        name: format!("boxed counterpart of {}", elem.name()),
                    })?;
                Some(self.array_of(&boxed)?)
            }
            _ => None,
        };
        let coercer = match elem.coercer {
            Coercer::Primitive(kind) => Coercer::PrimitiveArray(kind),
            _ => Coercer::ObjectArray,
        };
        self.register(TypeDescriptor {
            name,
            signature: format!("[{}", elem.signature()).into(),
            type_id: elem.type_id.array(),
            element: Some(elem.clone()),
            len: ByteLen::Variable,
            align: Align::Int,
            by_value: false,
            coercer,
            object_type,
        })
    }

    /// Registered names in registration order, for debug dumps.
    pub fn names(&self) -> impl Iterator<Item = &SmolStr> {
        self.by_name.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn booted() -> Registry {
        Registry::bootstrap(RegistryConfig::default()).unwrap()
    }

    #[test]
    fn bootstrap_registers_all_kinds() {
        let reg = booted();
        for kind in ScalarKind::ALL {
            let prim = reg.lookup(kind.type_name()).unwrap();
            assert_eq!(prim.coercer(), Coercer::Primitive(kind));
            let boxed = reg.lookup(kind.boxed_class().class_name()).unwrap();
            assert_eq!(boxed.coercer(), Coercer::Boxed(kind));
            // Primitive links to its boxed counterpart.
            assert_eq!(
                prim.object_type().unwrap().name(),
                boxed.name()
            );
        }
        assert!(reg.lookup("String").is_ok());
    }

    #[test]
    fn lookup_unregistered_fails() {
        let reg = booted();
        let err = reg.lookup("Complex").unwrap_err();
        assert_eq!(
            err,
            BridgeError::NotRegistered {
                name: "Complex".to_string()
            }
        );
    }

    #[test]
    fn id_lookup_prefers_the_native_form() {
        let reg = booted();
        // int and Integer share an id; the unboxed form wins.
        let desc = reg.lookup_id(TypeId::INT).unwrap();
        assert_eq!(desc.name(), "int");
    }

    #[test]
    fn conflicting_registration_rejected() {
        let mut reg = booted();
        let err = reg
            .register_primitive(
                "int",
                "X",
                TypeId::new(99),
                4,
                Align::Int,
                true,
                Coercer::Primitive(ScalarKind::Int),
            )
            .unwrap_err();
        assert!(matches!(err, BridgeError::ConflictingRegistration { .. }));

        // Identical re-registration is idempotent.
        let boxed = reg.lookup("Integer").unwrap();
        let again = reg
            .register(TypeDescriptor::primitive(ScalarKind::Int, boxed))
            .unwrap();
        assert_eq!(again.name(), "int");
    }

    #[test]
    fn boxed_replaces_primitive_not_reverse() {
        let reg = booted();
        for kind in ScalarKind::ALL {
            let prim = reg.lookup(kind.type_name()).unwrap();
            let boxed = reg.lookup(kind.boxed_class().class_name()).unwrap();
            assert!(boxed.can_replace(&prim), "{} kind", kind.type_name());
            assert!(!prim.can_replace(&boxed), "{} kind", kind.type_name());
        }
    }

    #[test]
    fn cross_kind_substitution_rejected() {
        let reg = booted();
        let int = reg.lookup("int").unwrap();
        let long = reg.lookup("long").unwrap();
        let boxed_long = reg.lookup("Long").unwrap();
        assert!(!long.can_replace(&int));
        assert!(!boxed_long.can_replace(&int));
    }

    #[test]
    fn array_synthesis_derives_name_and_signature() {
        let mut reg = booted();
        let int = reg.lookup("int").unwrap();
        let arr = reg.array_of(&int).unwrap();
        assert_eq!(arr.name(), "int[]");
        assert_eq!(arr.signature(), "[I");
        assert_eq!(arr.type_id(), TypeId::INT.array());
        assert_eq!(arr.element().unwrap().name(), "int");
        assert_eq!(arr.coercer(), Coercer::PrimitiveArray(ScalarKind::Int));
        // Cached: second synthesis returns the same descriptor.
        let again = reg.array_of(&int).unwrap();
        assert!(Arc::ptr_eq(&arr, &again));
    }

    #[test]
    fn primitive_array_carries_boxed_object_array() {
        let mut reg = booted();
        let int = reg.lookup("int").unwrap();
        let arr = reg.array_of(&int).unwrap();
        let obj = arr.object_type().unwrap();
        assert_eq!(obj.name(), "Integer[]");
        assert_eq!(obj.signature(), "[LInteger;");
        assert_eq!(obj.coercer(), Coercer::ObjectArray);
    }

    #[test]
    fn no_object_array_without_the_mode() {
        let mut reg = Registry::bootstrap(RegistryConfig {
            boxed_object_arrays: false,
        })
        .unwrap();
        let int = reg.lookup("int").unwrap();
        let arr = reg.array_of(&int).unwrap();
        assert!(arr.object_type().is_none());
    }

    #[test]
    fn array_substitution_is_special_cased_both_ways() {
        let mut reg = booted();
        let int = reg.lookup("int").unwrap();
        let prim_arr = reg.array_of(&int).unwrap();
        let boxed_arr = reg.lookup("Integer[]").unwrap();

        // Element rule: Integer[] replaces int[].
        assert!(boxed_arr.can_replace(&prim_arr));
        // Object-type rule: int[] also replaces Integer[], because the
        // primitive array coercers accept both managed forms.
        assert!(prim_arr.can_replace(&boxed_arr));

        // No such generosity across kinds.
        let long = reg.lookup("long").unwrap();
        let long_arr = reg.array_of(&long).unwrap();
        assert!(!long_arr.can_replace(&prim_arr));
        assert!(!prim_arr.can_replace(&long_arr));
    }

    #[test]
    fn array_of_array_descriptor_rejected() {
        let mut reg = booted();
        let int = reg.lookup("int").unwrap();
        let arr = reg.array_of(&int).unwrap();
        assert!(reg.array_of(&arr).unwrap_err().is_shape_error());
    }

    #[test]
    fn string_descriptor_is_variable_width() {
        let reg = booted();
        let s = reg.lookup("String").unwrap();
        assert_eq!(s.byte_len(), ByteLen::Variable);
        assert!(!s.by_value());
        assert_eq!(s.elem_layout().size, ElemSize::Variable);
    }
}
