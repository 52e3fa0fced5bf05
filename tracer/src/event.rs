//! Trace events.
//!
//! A [`TraceElement`] is the deferred form of one memory access as it is
//! registered; a [`TraceRecord`] is the concrete line it resolves to at dump
//! time.

use std::fmt;

use strum_macros::{Display, EnumCount, EnumString};

use crate::{
    lazy::Evaluable,
    memory::{MemoryBlock, MemorySpace},
};

/// Sequence number handed out to every registered event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Kind of memory access. Serialized as a single letter in the trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, EnumCount)]
pub enum AccessType {
    #[strum(serialize = "R")]
    Read,
    #[strum(serialize = "W")]
    Write,
    #[strum(serialize = "D")]
    Delete,
    #[default]
    #[strum(serialize = "U")]
    Unknown,
}

/// Iterator id recorded for accesses that do not come from a traversal.
pub const NO_ITERATOR: i64 = -1;

/// One registered memory access, still deferred.
#[derive(Debug, Clone)]
pub struct TraceElement {
    pub memory: MemoryBlock,
    pub kind: AccessType,
    pub iterator_id: i64,
}

impl TraceElement {
    pub fn new(memory: MemoryBlock, kind: AccessType) -> Self {
        Self {
            memory,
            kind,
            iterator_id: NO_ITERATOR,
        }
    }

    pub fn from_iterator(memory: MemoryBlock, kind: AccessType, iterator_id: i64) -> Self {
        Self {
            memory,
            kind,
            iterator_id,
        }
    }
}

impl Evaluable<TraceRecord> for TraceElement {
    fn evaluate(&self) -> TraceRecord {
        let block = self.memory.resolve();
        TraceRecord {
            space: block.space,
            offset: block.offset,
            element_size: block.element_size,
            count: block.count,
            kind: self.kind,
            iterator_id: self.iterator_id,
        }
    }

    fn is_finalized(&self) -> bool {
        self.memory.is_finalized()
    }
}

/// A fully evaluated trace line:
/// `space_id offset element_size count access_type iterator_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRecord {
    pub space: MemorySpace,
    pub offset: u64,
    pub element_size: u64,
    pub count: u64,
    pub kind: AccessType,
    pub iterator_id: i64,
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.space.id, self.offset, self.element_size, self.count, self.kind, self.iterator_id
        )
    }
}
