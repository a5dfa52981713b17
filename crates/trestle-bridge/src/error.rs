//! Error Types for Coercion and Marshalling
//!
//! ## Error Categories
//!
//! - **Shape errors**: array dimensionality above 2, ragged inner arrays.
//!   Recoverable, the conversion is rejected and the process continues.
//! - **Lattice errors**: a type substitution the descriptor lattice does
//!   not allow. Recoverable, reported at declaration time.
//! - **Managed exceptions**: an error surfaced by the managed runtime
//!   while a bound operation ran during coercion. Detected immediately on
//!   return and re-raised here before any further native allocation.
//! - **Resource errors**: forwarded from the lifecycle layer; integrity
//!   faults stay fatal through the conversion (`is_fatal`).

use thiserror::Error;
use trestle_lifecycle::LifecycleError;

use crate::vm::VmException;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Coercion and marshalling error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Array shape the marshaller does not support
    #[error("shape error: {reason}")]
    Shape {
        /// Description of the unsupported shape
        reason: String,
    },

    /// Substitution rejected by the descriptor lattice
    #[error("type lattice error: {provided} cannot replace declared {declared}")]
    Lattice {
        /// The declared type name
        declared: String,
        /// The provided type name
        provided: String,
    },

    /// Managed runtime raised while a bound operation executed
    #[error("managed exception: {class}: {message}")]
    ManagedException {
        /// Managed exception class name
        class: String,
        /// Exception message
        message: String,
    },

    /// Managed value of the wrong runtime type for the target descriptor
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected managed type
        expected: String,
        /// Actual managed type received
        actual: String,
    },

    /// Name or id not present in the registry
    #[error("type not registered: {name}")]
    NotRegistered {
        /// The name or id that was looked up
        name: String,
    },

    /// Re-registration under the same name with different metadata
    #[error("conflicting registration for type {name}")]
    ConflictingRegistration {
        /// The contested name
        name: String,
    },

    /// Array container bytes that do not parse as the documented layout
    #[error("malformed array container: {reason}")]
    Malformed {
        /// What failed to parse
        reason: String,
    },

    /// Managed handle used after its native resource was released
    #[error("native resource released: {context}")]
    Released {
        /// The access that was refused
        context: String,
    },

    /// Forwarded from the region/lifecycle layer
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl BridgeError {
    /// Create a shape error
    pub fn shape(reason: impl Into<String>) -> Self {
        BridgeError::Shape {
            reason: reason.into(),
        }
    }

    /// Create a lattice error
    pub fn lattice(declared: impl Into<String>, provided: impl Into<String>) -> Self {
        BridgeError::Lattice {
            declared: declared.into(),
            provided: provided.into(),
        }
    }

    /// Create a type mismatch error
    pub fn mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        BridgeError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a malformed-container error
    pub fn malformed(reason: impl Into<String>) -> Self {
        BridgeError::Malformed {
            reason: reason.into(),
        }
    }

    /// Create a released-resource error
    pub fn released(context: impl Into<String>) -> Self {
        BridgeError::Released {
            context: context.into(),
        }
    }

    /// Check if this is a shape error
    pub fn is_shape_error(&self) -> bool {
        matches!(self, BridgeError::Shape { .. })
    }

    /// Check if this is a lattice error
    pub fn is_lattice_error(&self) -> bool {
        matches!(self, BridgeError::Lattice { .. })
    }

    /// Check if this is a re-raised managed exception
    pub fn is_managed_exception(&self) -> bool {
        matches!(self, BridgeError::ManagedException { .. })
    }

    /// Fatal errors are never recovered at the conversion boundary
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::Lifecycle(err) if err.is_fatal())
    }
}

impl From<VmException> for BridgeError {
    fn from(exc: VmException) -> Self {
        BridgeError::ManagedException {
            class: exc.class.to_string(),
            message: exc.message,
        }
    }
}
