//! Memory access tracing for instrumented containers.
//!
//! Client code stores its data in [`TrackedList`]s and [`TrackedMap`]s and
//! runs its algorithm unchanged. Every element access registers a deferred
//! [`TraceElement`] with the active [`TraceContext`]; addresses and sizes are
//! only evaluated when a context is dumped, so events recorded early still
//! reflect the final geometry of containers that kept growing.
//!
//! A [`Session`] owns the per-thread root context and writes it out when it
//! ends.

pub mod config;
pub mod container;
pub mod context;
pub mod error;
pub mod event;
pub mod lazy;
pub mod memory;
pub mod registry;
pub mod session;
pub mod sizing;
pub mod test_utils;
pub mod traced;
pub mod tracer;
mod utils;

pub use config::{ContainerConfig, DumpTarget, ElementSize, Overflow, TraceConfig};
pub use container::{
    ItemsView, KeysView, Layout, LayoutKey, Leaf, SlotPolicy, Storage, TraceValue,
    TrackedContainer, TrackedIter, TrackedList, TrackedMap, ValuesView,
};
pub use context::{ContextScope, TraceContext};
pub use error::{Result, TraceError};
pub use event::{AccessType, EventId, TraceElement, TraceRecord, NO_ITERATOR};
pub use memory::{MemoryBlock, MemorySpace, MemorySpaceType};
pub use session::Session;
pub use sizing::SizeRegistry;
pub use traced::Traced;
pub use utils::init_logger;
