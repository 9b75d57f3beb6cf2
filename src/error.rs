//! Error taxonomy.
//!
//! Almost every variant is a usage error: a bug in the calling layer that
//! should abort loudly. The one condition a caller is expected to catch and
//! act upon is [`DdError::OutOfMemory`].

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DdError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DdError {
    #[error("context is closed")]
    ContextClosed,

    #[error("handle belongs to context #{found}, expected #{expected}")]
    ContextMismatch { expected: u32, found: u32 },

    #[error("use of released node {0}")]
    UseAfterRelease(String),

    #[error("node {0} released more often than retained")]
    DoubleRelease(String),

    #[error("diagram is not a cube: {0}")]
    NotACube(String),

    #[error("walker was invalidated by a reordering")]
    WalkerInvalidated,

    #[error("walker is already at its root")]
    WalkerAtRoot,

    #[error("walker cannot descend below a leaf")]
    WalkerAtLeaf,

    #[error("node is not a leaf")]
    NotALeaf,

    #[error("invalid permutation: {0}")]
    InvalidPermutation(String),

    #[error("operator {op} expects {expected} operands, got {found}")]
    ArityMismatch {
        op: String,
        expected: String,
        found: usize,
    },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("operation {op} is not supported by backend '{backend}'")]
    UnsupportedOperation { backend: &'static str, op: String },

    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    #[error("no variable with index {0}")]
    UnknownVariable(u32),

    #[error("variable {0} of the diagram is not part of the support")]
    NotInSupport(u32),

    #[error("variable '{name}' has no copy {copy}")]
    UnknownCopy { name: String, copy: usize },

    #[error("integer variable '{0}' needs finite lower and upper bounds")]
    UnboundedInteger(String),

    #[error("domain of '{name}' needs {bits} bits, which exceeds the variable limit")]
    DomainTooLarge { name: String, bits: u32 },

    #[error("value {value} is outside the domain of '{name}'")]
    ValueOutOfDomain { name: String, value: String },

    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    #[error("backend '{backend}' ran out of node memory (capacity {capacity})")]
    OutOfMemory { backend: &'static str, capacity: usize },

    #[error("{count} node(s) still alive at close:\n{report}")]
    Leak { count: usize, report: String },

    #[error("failed to render diagram")]
    Format(#[from] std::fmt::Error),

    #[error("consistency check of backend '{backend}' failed: {message}")]
    Consistency {
        backend: &'static str,
        message: String,
    },
}

impl DdError {
    /// Whether a well-behaved caller may recover from this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DdError::OutOfMemory { .. })
    }
}
