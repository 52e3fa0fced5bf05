//! Error types for memory trace recording.

use thiserror::Error;

use crate::{event::EventId, memory::MemorySpaceType};

/// Errors raised while addressing, recording or dumping a trace.
///
/// Every variant except [`TraceError::Io`] is a structural bug in the
/// instrumented program. They are never retried: masking one would silently
/// corrupt the meaning of the trace.
#[derive(Debug, Error)]
pub enum TraceError {
    /// A dense container was addressed past its observed length.
    #[error("dense index {index} is out of range for max length {max_len}; declare the container sparse")]
    Addressing { index: u64, max_len: u64 },

    /// A dense container was addressed with a key that is not a non-negative
    /// integer.
    #[error("dense containers require non-negative integer keys, got {key}")]
    NonIntegerKey { key: String },

    /// A trace context was exited while another one was on top of the stack.
    #[error("unbalanced trace scope: exiting {expected} but the active context is {found:?}")]
    UnbalancedScope {
        expected: String,
        found: Option<String>,
    },

    /// No byte size is registered for a scalar type in a memory space.
    #[error("no size registered for type {type_name} in {space} memory")]
    SizeLookup {
        space: MemorySpaceType,
        type_name: &'static str,
    },

    /// Every slot of a sparse container with a declared capacity is taken.
    #[error("sparse container exhausted all {capacity} slots")]
    SparseExhaustion { capacity: u64 },

    /// The underlying mapping does not hold the key.
    #[error("key {key} not found")]
    MissingKey { key: String },

    /// The underlying sequence does not hold the index.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: u64, len: u64 },

    /// An event declared a dependency on an event that was not registered
    /// before it.
    #[error("dependency on event {dep} which is not older than event {next}")]
    UnknownDependency { dep: EventId, next: EventId },

    /// A container was nested under a second parent.
    #[error("container is already nested under another parent")]
    AlreadyAttached,

    /// A container was nested inside itself or one of its descendants.
    #[error("container cannot be nested inside itself")]
    CyclicNesting,

    /// A sealed container was mutated.
    #[error("container is sealed")]
    Sealed,

    /// An element outgrew an explicitly fixed element size.
    #[error("element of {size} bytes exceeds the fixed element size of {limit} bytes")]
    ElementTooLarge { size: u64, limit: u64 },

    /// Writing the trace to its sink failed.
    #[error("trace sink error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for trace recording.
pub type Result<T> = std::result::Result<T, TraceError>;
