//! Byte sizes of leaf scalars, keyed by memory space type and Rust type.

use std::any::{type_name, Any, TypeId};

use ahash::AHashMap;

use crate::{
    error::{Result, TraceError},
    memory::MemorySpaceType,
};

type SizeFn = Box<dyn Fn(&dyn Any) -> u64>;

/// Pluggable `(space type, value type) -> byte size` table.
///
/// A missing entry is an error on first use; sizes are never defaulted since
/// every offset in the trace is derived from them.
pub struct SizeRegistry {
    table: AHashMap<(MemorySpaceType, TypeId), SizeFn>,
}

macro_rules! register_fixed {
    ($registry:expr, $space:expr, $($t:ty),+ $(,)?) => {
        $(
            $registry.register::<$t>($space, |_| std::mem::size_of::<$t>() as u64);
        )+
    };
}

impl SizeRegistry {
    /// A registry with no entries.
    pub fn empty() -> Self {
        Self {
            table: AHashMap::new(),
        }
    }

    /// Registers the size function for `T` values in `space` memory,
    /// replacing any previous entry.
    pub fn register<T: Any>(
        &mut self,
        space: MemorySpaceType,
        size: impl Fn(&T) -> u64 + 'static,
    ) {
        let size_fn: SizeFn = Box::new(move |value| {
            value
                .downcast_ref::<T>()
                .map(&size)
                .unwrap_or_else(|| unreachable!("size table entries are keyed by TypeId"))
        });
        self.table.insert((space, TypeId::of::<T>()), size_fn);
    }

    pub fn contains<T: Any>(&self, space: MemorySpaceType) -> bool {
        self.table.contains_key(&(space, TypeId::of::<T>()))
    }

    /// Size of `value` in `space` memory.
    pub fn lookup<T: Any>(&self, space: MemorySpaceType, value: &T) -> Result<u64> {
        self.lookup_dyn(space, value, type_name::<T>())
    }

    pub(crate) fn lookup_dyn(
        &self,
        space: MemorySpaceType,
        value: &dyn Any,
        type_name: &'static str,
    ) -> Result<u64> {
        let size = self
            .table
            .get(&(space, value.type_id()))
            .ok_or(TraceError::SizeLookup { space, type_name })?;
        Ok(size(value))
    }
}

impl Default for SizeRegistry {
    /// Host and FPGA entries for the primitive scalars and strings.
    ///
    /// GPU and unknown spaces are left empty on purpose: a trace addressed in
    /// those spaces must register its own sizes.
    fn default() -> Self {
        let mut registry = Self::empty();
        for space in [MemorySpaceType::Cpu, MemorySpaceType::Fpga] {
            register_fixed!(
                registry, space, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize,
                f32, f64, bool, char,
            );
            registry.register::<String>(space, |s| s.len() as u64);
            registry.register::<&'static str>(space, |s| s.len() as u64);
        }
        registry
    }
}
