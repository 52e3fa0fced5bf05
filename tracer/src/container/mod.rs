//! Instrumented sequences and mappings.
//!
//! A [`TrackedContainer`] wraps ordinary storage and registers a deferred
//! trace event for every element it writes, reads, probes or deletes. Where
//! those elements live is decided by its [`Layout`]: dense containers place
//! key `k` at `k * element_size`, sparse containers give every key a slot of
//! its own the first time it is stored.

mod iter;
mod layout;
mod slots;

use std::{any::Any, cell::RefCell, fmt, hash::Hash, rc::Rc};

use ahash::AHashMap;
use indexmap::IndexMap;

pub use iter::{ItemsView, KeysView, TrackedIter, ValuesView};
pub use layout::Layout;
pub use slots::SlotPolicy;

use crate::{
    config::ContainerConfig,
    error::{Result, TraceError},
    event::{AccessType, EventId, TraceElement},
    memory::MemoryBlock,
    traced::{merge, Traced},
    tracer,
};

/// Keys a container can be addressed with.
pub trait LayoutKey: Clone + Eq + Hash + fmt::Debug + 'static {
    /// Position of the key in a dense container. `None` for keys that can
    /// only address sparse containers.
    fn dense_index(&self) -> Option<u64>;
}

macro_rules! unsigned_keys {
    ($($t:ty),+ $(,)?) => {
        $(impl LayoutKey for $t {
            fn dense_index(&self) -> Option<u64> {
                Some(*self as u64)
            }
        })+
    };
}

macro_rules! signed_keys {
    ($($t:ty),+ $(,)?) => {
        $(impl LayoutKey for $t {
            fn dense_index(&self) -> Option<u64> {
                u64::try_from(*self).ok()
            }
        })+
    };
}

macro_rules! opaque_keys {
    ($($t:ty),+ $(,)?) => {
        $(impl LayoutKey for $t {
            fn dense_index(&self) -> Option<u64> {
                None
            }
        })+
    };
}

unsigned_keys!(u8, u16, u32, u64, usize);
signed_keys!(i8, i16, i32, i64, isize);
opaque_keys!(String, &'static str, char, bool);

/// What a stored value contributes to its container's element size.
pub enum Leaf<'a> {
    /// A scalar sized through the size registry.
    Scalar(&'a dyn Any, &'static str),
    /// A tracked container whose total size counts as one element.
    Nested(&'a Rc<Layout>),
}

/// Values a container can store.
pub trait TraceValue: Clone + 'static {
    fn leaf(&self) -> Leaf<'_>;
}

macro_rules! scalar_values {
    ($($t:ty),+ $(,)?) => {
        $(impl TraceValue for $t {
            fn leaf(&self) -> Leaf<'_> {
                Leaf::Scalar(self, std::any::type_name::<$t>())
            }
        })+
    };
}

scalar_values!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char, String,
    &'static str,
);

impl<S: Storage> TraceValue for TrackedContainer<S> {
    fn leaf(&self) -> Leaf<'_> {
        Leaf::Nested(&self.inner.layout)
    }
}

/// The untracked collection behind a [`TrackedContainer`].
pub trait Storage: Default + 'static {
    type Key: LayoutKey;
    type Value: TraceValue;

    /// Layout used by [`TrackedContainer::new`].
    fn default_config() -> ContainerConfig;

    fn len(&self) -> usize;

    fn get(&self, key: &Self::Key) -> Option<&Self::Value>;

    fn contains_key(&self, key: &Self::Key) -> bool {
        self.get(key).is_some()
    }

    /// Length once `key` is set, or why it cannot be.
    fn len_after_set(&self, key: &Self::Key) -> Result<usize>;

    /// Stores `value` under a key accepted by [`Storage::len_after_set`].
    fn set(&mut self, key: Self::Key, value: Self::Value);

    fn remove(&mut self, key: &Self::Key) -> Option<Self::Value>;

    /// The `n`-th entry in iteration order.
    fn nth(&self, n: usize) -> Option<(Self::Key, &Self::Value)>;

    fn missing(&self, key: &Self::Key) -> TraceError;
}

impl<V: TraceValue> Storage for Vec<V> {
    type Key = usize;
    type Value = V;

    fn default_config() -> ContainerConfig {
        ContainerConfig::dense()
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn get(&self, key: &usize) -> Option<&V> {
        <[V]>::get(self, *key)
    }

    fn len_after_set(&self, key: &usize) -> Result<usize> {
        match (*key).cmp(&Vec::len(self)) {
            std::cmp::Ordering::Less => Ok(Vec::len(self)),
            std::cmp::Ordering::Equal => Ok(Vec::len(self) + 1),
            std::cmp::Ordering::Greater => Err(self.missing(key)),
        }
    }

    fn set(&mut self, key: usize, value: V) {
        if key == Vec::len(self) {
            self.push(value);
        } else {
            self[key] = value;
        }
    }

    fn remove(&mut self, key: &usize) -> Option<V> {
        (*key < Vec::len(self)).then(|| Vec::remove(self, *key))
    }

    fn nth(&self, n: usize) -> Option<(usize, &V)> {
        <[V]>::get(self, n).map(|value| (n, value))
    }

    fn missing(&self, key: &usize) -> TraceError {
        TraceError::IndexOutOfRange {
            index: *key as u64,
            len: Vec::len(self) as u64,
        }
    }
}

impl<K: LayoutKey, V: TraceValue> Storage for IndexMap<K, V> {
    type Key = K;
    type Value = V;

    fn default_config() -> ContainerConfig {
        ContainerConfig::sparse()
    }

    fn len(&self) -> usize {
        IndexMap::len(self)
    }

    fn get(&self, key: &K) -> Option<&V> {
        IndexMap::get(self, key)
    }

    fn len_after_set(&self, key: &K) -> Result<usize> {
        Ok(IndexMap::len(self) + usize::from(!self.contains_key(key)))
    }

    fn set(&mut self, key: K, value: V) {
        self.insert(key, value);
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        self.shift_remove(key)
    }

    fn nth(&self, n: usize) -> Option<(K, &V)> {
        self.get_index(n).map(|(key, value)| (key.clone(), value))
    }

    fn missing(&self, key: &K) -> TraceError {
        TraceError::MissingKey {
            key: format!("{key:?}"),
        }
    }
}

/// Size contribution of a value about to be stored, checked but not yet
/// committed to the layout.
enum Descriptor {
    Scalar(u64),
    Nested(Rc<Layout>),
}

struct Inner<S: Storage> {
    storage: RefCell<S>,
    /// Memoized slot of every key a sparse container has ever stored.
    slots: RefCell<AHashMap<S::Key, u64>>,
    layout: Rc<Layout>,
    batch: u64,
}

/// An instrumented collection. Cloning yields another handle to the same
/// container.
pub struct TrackedContainer<S: Storage> {
    inner: Rc<Inner<S>>,
}

/// Instrumented sequence, dense unless configured otherwise.
pub type TrackedList<V> = TrackedContainer<Vec<V>>;

/// Instrumented insertion-ordered mapping, sparse unless configured
/// otherwise.
pub type TrackedMap<K, V> = TrackedContainer<IndexMap<K, V>>;

impl<S: Storage> Clone for TrackedContainer<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: Storage> Default for TrackedContainer<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Storage> fmt::Debug for TrackedContainer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedContainer")
            .field("len", &self.len())
            .field("layout", &self.inner.layout)
            .finish()
    }
}

impl<S: Storage> TrackedContainer<S> {
    pub fn new() -> Self {
        Self::with_config(S::default_config())
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        Self {
            inner: Rc::new(Inner {
                storage: RefCell::new(S::default()),
                slots: RefCell::new(AHashMap::new()),
                layout: Layout::new(&config),
                batch: config.batch.max(1),
            }),
        }
    }

    /// Builds a container from existing entries, routing every entry through
    /// [`TrackedContainer::set`]. Pre-resident containers skip the writes.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (S::Key, S::Value)>,
        config: ContainerConfig,
    ) -> Result<Self> {
        let emit = !config.pre_resident;
        let container = Self::with_config(config);
        for (key, value) in entries {
            container.insert(key, value, &[], emit)?;
        }
        Ok(container)
    }

    pub fn len(&self) -> usize {
        self.inner.storage.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_sparse(&self) -> bool {
        self.inner.layout.is_sparse()
    }

    pub fn layout(&self) -> &Rc<Layout> {
        &self.inner.layout
    }

    /// Largest element size observed so far.
    pub fn element_size(&self) -> u64 {
        self.inner.layout.element_size()
    }

    pub fn total_size(&self) -> u64 {
        self.inner.layout.total_size()
    }

    /// Largest length ever observed.
    pub fn max_len(&self) -> u64 {
        self.inner.layout.max_len()
    }

    pub fn batch(&self) -> u64 {
        self.inner.batch
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.layout.is_sealed()
    }

    /// Declares that the container will not change again: every event it has
    /// emitted freezes its geometry, and later mutations fail with
    /// [`TraceError::Sealed`].
    pub fn seal(&self) {
        self.inner.layout.seal();
    }

    /// Reads the storage without recording anything.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.storage.borrow())
    }

    /// Stores `value` under `key` and records the write.
    pub fn set(&self, key: S::Key, value: S::Value) -> Result<Option<EventId>> {
        self.insert(key, value, &[], true)
    }

    /// Like [`TrackedContainer::set`], with the write depending on `deps`.
    pub fn set_with_deps(
        &self,
        key: S::Key,
        value: S::Value,
        deps: &[EventId],
    ) -> Result<Option<EventId>> {
        self.insert(key, value, deps, true)
    }

    /// Stores a traced value under a traced key; the write depends on both.
    pub fn set_traced(
        &self,
        key: Traced<S::Key>,
        value: Traced<S::Value>,
    ) -> Result<Option<EventId>> {
        let deps = merge(&key.deps, &value.deps);
        self.insert(key.value, value.value, &deps, true)
    }

    /// Fetches the value under `key`, recording a read unless the value is
    /// itself a tracked container.
    pub fn get(&self, key: &S::Key) -> Result<S::Value> {
        self.get_with_deps(key, &[]).map(|(value, _)| value)
    }

    pub fn get_with_deps(
        &self,
        key: &S::Key,
        deps: &[EventId],
    ) -> Result<(S::Value, Option<EventId>)> {
        tracer::validate_deps(deps)?;
        let slot = self.slot_of(key)?;
        let value = {
            let storage = self.inner.storage.borrow();
            let value = storage.get(key).cloned();
            value.ok_or_else(|| storage.missing(key))?
        };
        let id = match value.leaf() {
            Leaf::Nested(_) => None,
            Leaf::Scalar(..) => tracer::record(self.element(slot, AccessType::Read), deps)?,
        };
        Ok((value, id))
    }

    /// Fetches through a traced key. The result depends on the read, or on
    /// the key's own dependencies when no read is recorded.
    pub fn get_traced(&self, key: Traced<S::Key>) -> Result<Traced<S::Value>> {
        let (value, id) = self.get_with_deps(&key.value, &key.deps)?;
        Ok(match id {
            Some(id) => Traced::new(value, [id]),
            None => Traced {
                value,
                deps: key.deps,
            },
        })
    }

    /// Records a delete at the key's address, then removes the entry.
    pub fn delete(&self, key: &S::Key) -> Result<S::Value> {
        if self.is_sealed() {
            return Err(TraceError::Sealed);
        }
        let slot = self.slot_of(key)?;
        {
            let storage = self.inner.storage.borrow();
            if !storage.contains_key(key) {
                return Err(storage.missing(key));
            }
        }
        tracer::record_independent(self.element(slot, AccessType::Delete));
        let mut storage = self.inner.storage.borrow_mut();
        let removed = storage.remove(key);
        removed.ok_or_else(|| storage.missing(key))
    }

    /// Membership test, charged as a read whether or not the key is present.
    ///
    /// Keys without an address yet are charged to the slot they would most
    /// likely get; nothing is claimed for them.
    pub fn contains(&self, key: &S::Key) -> Result<bool> {
        let slot = if self.is_sparse() {
            let known = self.inner.slots.borrow().get(key).copied();
            known.unwrap_or_else(|| self.inner.layout.peek_slot())
        } else {
            let index = dense_index(key)?;
            if index < self.max_len() {
                index
            } else {
                0
            }
        };
        tracer::record_independent(self.element(slot, AccessType::Read));
        Ok(self.inner.storage.borrow().contains_key(key))
    }

    /// The deferred address of the element under `key`.
    pub fn getloc(&self, key: &S::Key) -> Result<MemoryBlock> {
        let slot = self.slot_of(key)?;
        Ok(self.inner.layout.element_block(slot, 1))
    }

    fn insert(
        &self,
        key: S::Key,
        value: S::Value,
        deps: &[EventId],
        emit: bool,
    ) -> Result<Option<EventId>> {
        let layout = &self.inner.layout;
        if layout.is_sealed() {
            return Err(TraceError::Sealed);
        }
        tracer::validate_deps(deps)?;

        let len = self.inner.storage.borrow().len_after_set(&key)? as u64;
        let dense = if layout.is_sparse() {
            None
        } else {
            let index = dense_index(&key)?;
            layout.check_dense(index, len)?;
            Some(index)
        };

        let descriptor = match value.leaf() {
            Leaf::Scalar(scalar, type_name) => {
                let size = tracer::size_of_dyn(layout.space_type(), scalar, type_name)?;
                layout.check_scalar(size)?;
                Descriptor::Scalar(size)
            }
            Leaf::Nested(child) => {
                let slot = match dense {
                    Some(index) => Some(index),
                    None => self.inner.slots.borrow().get(&key).copied(),
                };
                layout.check_nested(child, slot)?;
                Descriptor::Nested(child.clone())
            }
        };

        let slot = match dense {
            Some(index) => index,
            None => self.claim(&key, len)?,
        };
        layout.observe_len(len);
        match descriptor {
            Descriptor::Scalar(size) => layout.add_scalar(size),
            Descriptor::Nested(child) => layout.add_nested(&child, slot)?,
        }
        self.inner.storage.borrow_mut().set(key, value);

        if !emit {
            return Ok(None);
        }
        tracer::record(self.element(slot, AccessType::Write), deps)
    }

    /// Slot of a sparse key, claiming one on first use.
    fn claim(&self, key: &S::Key, len: u64) -> Result<u64> {
        let known = self.inner.slots.borrow().get(key).copied();
        if let Some(slot) = known {
            return Ok(slot);
        }
        let slot = self.inner.layout.claim_slot(len)?;
        self.inner.slots.borrow_mut().insert(key.clone(), slot);
        tracing::trace!(?key, slot, "assigned sparse slot");
        Ok(slot)
    }

    /// Slot of an existing key.
    fn slot_of(&self, key: &S::Key) -> Result<u64> {
        if self.is_sparse() {
            let known = self.inner.slots.borrow().get(key).copied();
            return known.ok_or_else(|| self.inner.storage.borrow().missing(key));
        }
        let index = dense_index(key)?;
        self.inner.layout.check_dense(index, 0)?;
        Ok(index)
    }

    fn element(&self, slot: u64, kind: AccessType) -> TraceElement {
        TraceElement::new(self.inner.layout.element_block(slot, 1), kind)
    }

    /// Records the burst read covering the batch that starts at `index`, if
    /// one does.
    pub(crate) fn burst(&self, index: u64, iterator_id: i64) -> Option<EventId> {
        let batch = self.inner.batch;
        if index % batch != 0 {
            return None;
        }
        let remaining = (self.len() as u64).saturating_sub(index);
        let block = self.inner.layout.element_block(index, batch.min(remaining));
        tracer::record_independent(TraceElement::from_iterator(
            block,
            AccessType::Read,
            iterator_id,
        ))
    }

    fn iter_with<T>(&self, project: fn(S::Key, S::Value) -> T) -> TrackedIter<S, T> {
        TrackedIter::new(self.clone(), project)
    }

    pub(crate) fn nth_untracked(&self, n: usize) -> Option<(S::Key, S::Value)> {
        let storage = self.inner.storage.borrow();
        storage.nth(n).map(|(key, value)| (key, value.clone()))
    }
}

fn dense_index<K: LayoutKey>(key: &K) -> Result<u64> {
    key.dense_index().ok_or_else(|| TraceError::NonIntegerKey {
        key: format!("{key:?}"),
    })
}

impl<V: TraceValue> TrackedContainer<Vec<V>> {
    pub fn from_values(values: impl IntoIterator<Item = V>, config: ContainerConfig) -> Result<Self> {
        Self::from_entries(values.into_iter().enumerate(), config)
    }

    /// Appends `value`.
    pub fn push(&self, value: V) -> Result<Option<EventId>> {
        self.set(self.len(), value)
    }

    pub fn extend(&self, values: impl IntoIterator<Item = V>) -> Result<()> {
        for value in values {
            self.push(value)?;
        }
        Ok(())
    }

    /// Traverses the values, recording one burst read per batch.
    pub fn iter(&self) -> TrackedIter<Vec<V>, V> {
        self.iter_with(|_, value| value)
    }

    /// Reads the elements in `start..stop` as one burst.
    ///
    /// The read depends on every event the bounds were derived from, and the
    /// returned values depend on the read. Sparse lists have no contiguous
    /// range and record one read per element instead.
    pub fn read_range(&self, start: Traced<usize>, stop: Traced<usize>) -> Result<Traced<Vec<V>>> {
        let bounds = start.join(stop);
        let (lo, hi) = bounds.value;
        let len = self.len();
        if hi > len {
            return Err(TraceError::IndexOutOfRange {
                index: hi as u64,
                len: len as u64,
            });
        }
        if lo > hi {
            return Err(TraceError::IndexOutOfRange {
                index: lo as u64,
                len: hi as u64,
            });
        }
        tracer::validate_deps(&bounds.deps)?;

        let values = self.with_untracked(|storage| storage[lo..hi].to_vec());
        if lo == hi {
            return Ok(Traced {
                value: values,
                deps: bounds.deps,
            });
        }

        let mut reads = Vec::new();
        if self.is_sparse() {
            for index in lo..hi {
                let slot = self.slot_of(&index)?;
                reads.extend(tracer::record(
                    self.element(slot, AccessType::Read),
                    &bounds.deps,
                )?);
            }
        } else {
            let block = self
                .inner
                .layout
                .element_block(lo as u64, (hi - lo) as u64);
            reads.extend(tracer::record(
                TraceElement::new(block, AccessType::Read),
                &bounds.deps,
            )?);
        }

        Ok(if reads.is_empty() {
            Traced {
                value: values,
                deps: bounds.deps,
            }
        } else {
            Traced::new(values, reads)
        })
    }
}

impl<K: LayoutKey, V: TraceValue> TrackedContainer<IndexMap<K, V>> {
    /// Stores every entry of `entries`.
    pub fn update(&self, entries: impl IntoIterator<Item = (K, V)>) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    pub fn keys(&self) -> KeysView<K, V> {
        KeysView::new(self.clone())
    }

    pub fn values(&self) -> ValuesView<K, V> {
        ValuesView::new(self.clone())
    }

    pub fn items(&self) -> ItemsView<K, V> {
        ItemsView::new(self.clone())
    }

    /// Traverses the entries in insertion order, recording one burst read per
    /// batch.
    pub fn iter(&self) -> TrackedIter<IndexMap<K, V>, (K, V)> {
        self.iter_with(|key, value| (key, value))
    }
}
