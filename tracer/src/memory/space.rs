use std::{cell::Cell, io::Write};

use super::MemorySpace;
use crate::{error::Result, lazy::Lazy};

thread_local! {
    static NEXT_SPACE_ID: Cell<u32> = const { Cell::new(0) };
}

/// Hands out memory space ids in allocation order.
pub(crate) fn next_space_id() -> u32 {
    NEXT_SPACE_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    })
}

pub(crate) fn reset_space_ids() {
    NEXT_SPACE_ID.with(|next| next.set(0));
}

/// One line of the memory space manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestEntry {
    pub space: MemorySpace,
    pub total_size: u64,
    pub element_size: u64,
}

#[derive(Clone)]
struct RecordedSpace {
    space: MemorySpace,
    /// Where the owner of `space` lives now; differs from `space` once the
    /// owner has been nested into another container.
    current: Lazy<MemorySpace>,
    total_size: Lazy<u64>,
    element_size: Lazy<u64>,
}

/// Every memory space ever addressed, with its deferred geometry.
///
/// A space whose owner was later nested into another container is left out:
/// none of its events resolve to it any more.
#[derive(Default)]
pub struct SpaceManifest {
    entries: Vec<RecordedSpace>,
}

impl SpaceManifest {
    pub fn record(
        &mut self,
        space: MemorySpace,
        current: Lazy<MemorySpace>,
        total_size: Lazy<u64>,
        element_size: Lazy<u64>,
    ) {
        self.entries.push(RecordedSpace {
            space,
            current,
            total_size,
            element_size,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shallow copy sharing the same deferred sizes.
    pub(crate) fn snapshot(&self) -> SpaceManifest {
        SpaceManifest {
            entries: self.entries.clone(),
        }
    }

    pub fn resolve(&self) -> Vec<ManifestEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.current.evaluate() == entry.space)
            .map(|entry| ManifestEntry {
                space: entry.space,
                total_size: entry.total_size.evaluate(),
                element_size: entry.element_size.evaluate(),
            })
            .collect()
    }

    /// Writes one `space_id total_size element_size` line per space.
    pub fn dump(&self, sink: &mut impl Write) -> Result<()> {
        for entry in self.resolve() {
            writeln!(
                sink,
                "{} {} {}",
                entry.space.id, entry.total_size, entry.element_size
            )?;
        }
        Ok(())
    }
}
