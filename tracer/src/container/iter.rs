use indexmap::IndexMap;

use super::{LayoutKey, Storage, TraceValue, TrackedContainer, TrackedMap};
use crate::{error::Result, tracer};

/// Traversal of a tracked container.
///
/// The first element of every batch records one read covering the whole
/// batch, or whatever remains of the container when fewer elements are left.
/// All reads of one traversal share an iterator id.
pub struct TrackedIter<S: Storage, T> {
    container: TrackedContainer<S>,
    index: usize,
    iterator_id: i64,
    project: fn(S::Key, S::Value) -> T,
}

impl<S: Storage, T> TrackedIter<S, T> {
    pub(crate) fn new(container: TrackedContainer<S>, project: fn(S::Key, S::Value) -> T) -> Self {
        Self {
            container,
            index: 0,
            iterator_id: tracer::next_iterator_id(),
            project,
        }
    }

    pub fn iterator_id(&self) -> i64 {
        self.iterator_id
    }
}

impl<S: Storage, T> Iterator for TrackedIter<S, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let (key, value) = self.container.nth_untracked(self.index)?;
        self.container.burst(self.index as u64, self.iterator_id);
        self.index += 1;
        Some((self.project)(key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.container.len().saturating_sub(self.index);
        (left, Some(left))
    }
}

/// Keys of a tracked mapping.
pub struct KeysView<K: LayoutKey, V: TraceValue> {
    map: TrackedMap<K, V>,
}

impl<K: LayoutKey, V: TraceValue> KeysView<K, V> {
    pub(crate) fn new(map: TrackedMap<K, V>) -> Self {
        Self { map }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Probes the key's address directly.
    pub fn contains(&self, key: &K) -> Result<bool> {
        self.map.contains(key)
    }

    pub fn iter(&self) -> TrackedIter<IndexMap<K, V>, K> {
        self.map.iter_with(|key, _| key)
    }
}

/// Values of a tracked mapping.
pub struct ValuesView<K: LayoutKey, V: TraceValue> {
    map: TrackedMap<K, V>,
}

impl<K: LayoutKey, V: TraceValue> ValuesView<K, V> {
    pub(crate) fn new(map: TrackedMap<K, V>) -> Self {
        Self { map }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Values have no address of their own, so membership scans the mapping
    /// through a batched traversal until the first match.
    pub fn contains(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.iter().any(|candidate| candidate == *value)
    }

    pub fn iter(&self) -> TrackedIter<IndexMap<K, V>, V> {
        self.map.iter_with(|_, value| value)
    }
}

/// Entries of a tracked mapping.
pub struct ItemsView<K: LayoutKey, V: TraceValue> {
    map: TrackedMap<K, V>,
}

impl<K: LayoutKey, V: TraceValue> ItemsView<K, V> {
    pub(crate) fn new(map: TrackedMap<K, V>) -> Self {
        Self { map }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Probes the key, then reads and compares its value.
    pub fn contains(&self, key: &K, value: &V) -> Result<bool>
    where
        V: PartialEq,
    {
        if !self.map.contains(key)? {
            return Ok(false);
        }
        Ok(self.map.get(key)? == *value)
    }

    pub fn iter(&self) -> TrackedIter<IndexMap<K, V>, (K, V)> {
        self.map.iter_with(|key, value| (key, value))
    }
}
