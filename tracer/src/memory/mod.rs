mod space;

use std::fmt;

use strum_macros::{Display, EnumCount, EnumIter, EnumString};

pub use space::{ManifestEntry, SpaceManifest};
pub(crate) use space::{next_space_id, reset_space_ids};

use crate::lazy::{self, Lazy};

/// Device class backing a memory space.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    EnumCount,
)]
#[strum(ascii_case_insensitive)]
pub enum MemorySpaceType {
    #[strum(serialize = "CPU")]
    Cpu,
    #[strum(serialize = "FPGA")]
    Fpga,
    #[strum(serialize = "GPU")]
    Gpu,
    #[default]
    #[strum(serialize = "UNKNOWN")]
    Unknown,
}

/// An addressable region. Every root container owns exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemorySpace {
    pub id: u32,
    pub kind: MemorySpaceType,
}

impl MemorySpace {
    /// Allocates a space with a fresh id on the current thread.
    pub fn fresh(kind: MemorySpaceType) -> Self {
        Self {
            id: next_space_id(),
            kind,
        }
    }
}

impl fmt::Display for MemorySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// A run of `count` elements of `element_size` bytes starting `offset` bytes
/// into `space`.
///
/// All four fields are deferred so that a block captured while a container
/// is still growing reports the container's final geometry when the trace is
/// dumped.
#[derive(Clone)]
pub struct MemoryBlock {
    pub space: Lazy<MemorySpace>,
    pub offset: Lazy<u64>,
    pub element_size: Lazy<u64>,
    pub count: Lazy<u64>,
}

impl MemoryBlock {
    pub fn new(
        space: Lazy<MemorySpace>,
        offset: Lazy<u64>,
        element_size: Lazy<u64>,
        count: Lazy<u64>,
    ) -> Self {
        Self {
            space,
            offset,
            element_size,
            count,
        }
    }

    /// Returns the same block shifted by `shift` bytes.
    pub fn adjust_offset(&self, shift: Lazy<u64>) -> Self {
        Self {
            offset: lazy::sum(self.offset.clone(), shift),
            ..self.clone()
        }
    }

    /// Returns the same block spanning `count` elements.
    pub fn with_count(&self, count: Lazy<u64>) -> Self {
        Self {
            count,
            ..self.clone()
        }
    }

    /// Evaluates every field against current state.
    pub fn resolve(&self) -> ResolvedBlock {
        ResolvedBlock {
            space: self.space.evaluate(),
            offset: self.offset.evaluate(),
            element_size: self.element_size.evaluate(),
            count: self.count.evaluate(),
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.space.is_finalized()
            && self.offset.is_finalized()
            && self.element_size.is_finalized()
            && self.count.is_finalized()
    }
}

impl fmt::Debug for MemoryBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBlock")
            .field("finalized", &self.is_finalized())
            .finish_non_exhaustive()
    }
}

/// A [`MemoryBlock`] with every field evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBlock {
    pub space: MemorySpace,
    pub offset: u64,
    pub element_size: u64,
    pub count: u64,
}

impl ResolvedBlock {
    /// Total bytes covered by the block.
    pub const fn byte_len(&self) -> u64 {
        self.element_size * self.count
    }
}
