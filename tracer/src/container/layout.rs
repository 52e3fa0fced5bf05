//! Geometry of a tracked container: where it lives, how large its elements
//! are, and which slot each element occupies.

use std::{
    cell::{Cell, OnceCell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use super::slots::SlotAllocator;
use crate::{
    config::{ContainerConfig, ElementSize, Overflow},
    error::{Result, TraceError},
    lazy::{self, value, DerivedValue, Lazy, Observed, Observers},
    memory::{MemoryBlock, MemorySpace, MemorySpaceType},
    tracer,
};

/// Link from a nested container to the element it occupies in its parent.
struct ParentLink {
    layout: Weak<Layout>,
    slot: u64,
    space: Lazy<MemorySpace>,
    offset: Lazy<u64>,
}

struct LayoutState {
    parent: Option<ParentLink>,
    /// Space assigned the first time the container was addressed as a root.
    root_space: Option<MemorySpace>,
    max_len: u64,
    /// Largest scalar element ever stored.
    max_literal: u64,
    /// Total sizes of every container ever stored as an element.
    nested: Vec<(Weak<Layout>, Lazy<u64>)>,
    slots: Option<SlotAllocator>,
}

/// Deferred views of a layout shared by every event it emits.
struct LayoutHandles {
    space: Lazy<MemorySpace>,
    base: Lazy<u64>,
    element_size: Lazy<u64>,
    total_size: Lazy<u64>,
}

impl LayoutHandles {
    fn observe(layout: &Rc<Layout>) -> Self {
        let space: Lazy<Lazy<MemorySpace>> =
            DerivedValue::observe(layout, |layout| layout.space_expr());
        let base: Lazy<Lazy<u64>> = DerivedValue::observe(layout, |layout| layout.base_expr());
        Self {
            space: lazy::flatten(space),
            base: lazy::flatten(base),
            element_size: DerivedValue::observe(layout, |layout| layout.element_size_now()),
            total_size: DerivedValue::observe(layout, |layout| layout.total_size_now()),
        }
    }
}

pub struct Layout {
    state: RefCell<LayoutState>,
    /// Largest element size ever reported; element sizes never shrink.
    high_water: Cell<u64>,
    sealed_size: Cell<Option<u64>>,
    element_policy: ElementSize,
    overhead: u64,
    space_type: Option<MemorySpaceType>,
    handles: OnceCell<LayoutHandles>,
    observers: Observers<Layout>,
}

impl Layout {
    pub(crate) fn new(config: &ContainerConfig) -> Rc<Self> {
        let slots = config.sparse.then(|| {
            let policy = config
                .slot_policy
                .unwrap_or_else(tracer::default_slot_policy);
            SlotAllocator::new(policy, config.capacity)
        });
        let max_len = if config.sparse {
            config.capacity.unwrap_or(0)
        } else {
            0
        };
        Rc::new(Self {
            state: RefCell::new(LayoutState {
                parent: None,
                root_space: None,
                max_len,
                max_literal: 0,
                nested: Vec::new(),
                slots,
            }),
            high_water: Cell::new(0),
            sealed_size: Cell::new(None),
            element_policy: config.element_size,
            overhead: config.overhead,
            space_type: config.space_type,
            handles: OnceCell::new(),
            observers: Observers::default(),
        })
    }

    pub fn is_sparse(&self) -> bool {
        self.state.borrow().slots.is_some()
    }

    pub fn is_attached(&self) -> bool {
        self.state.borrow().parent.is_some()
    }

    pub fn max_len(&self) -> u64 {
        self.state.borrow().max_len
    }

    pub fn element_size(&self) -> u64 {
        self.element_size_now()
    }

    /// `element_size * max_len + overhead`.
    pub fn total_size(&self) -> u64 {
        self.total_size_now()
    }

    /// Device class used for scalar size lookups: the parent's when nested.
    pub fn space_type(&self) -> MemorySpaceType {
        let parent = self
            .state
            .borrow()
            .parent
            .as_ref()
            .and_then(|link| link.layout.upgrade());
        match parent {
            Some(parent) => parent.space_type(),
            None => self.space_type.unwrap_or_else(tracer::default_space_type),
        }
    }

    pub(crate) fn observe_len(&self, len: u64) {
        let mut state = self.state.borrow_mut();
        state.max_len = state.max_len.max(len);
    }

    /// Checks that dense index `index` is addressable once the container has
    /// `len` elements.
    pub(crate) fn check_dense(&self, index: u64, len: u64) -> Result<()> {
        let max_len = self.max_len().max(len);
        if index >= max_len {
            return Err(TraceError::Addressing { index, max_len });
        }
        Ok(())
    }

    /// Claims a fresh sparse slot for a container about to hold `len`
    /// elements.
    pub(crate) fn claim_slot(&self, len: u64) -> Result<u64> {
        let mut state = self.state.borrow_mut();
        let max_len = state.max_len.max(len);
        let slot = match state.slots.as_mut() {
            Some(slots) => slots.claim(max_len)?,
            None => unreachable!("slots are only claimed by sparse containers"),
        };
        // The observed length always covers every handed out slot.
        state.max_len = max_len.max(slot + 1);
        Ok(slot)
    }

    /// Slot charged for probing a key that has no slot yet.
    pub(crate) fn peek_slot(&self) -> u64 {
        let state = self.state.borrow();
        state
            .slots
            .as_ref()
            .map_or(0, |slots| slots.peek(state.max_len))
    }

    fn check_fits(&self, size: u64) -> Result<()> {
        match self.element_policy {
            ElementSize::Fixed {
                bytes,
                overflow: Overflow::Reject,
            } if size > bytes => Err(TraceError::ElementTooLarge { size, limit: bytes }),
            _ => Ok(()),
        }
    }

    pub(crate) fn check_scalar(&self, size: u64) -> Result<()> {
        self.check_fits(size)
    }

    pub(crate) fn add_scalar(&self, size: u64) {
        let mut state = self.state.borrow_mut();
        state.max_literal = state.max_literal.max(size);
    }

    /// Checks that `child` may be stored in this container at `slot`, which is
    /// `None` for a sparse key that has no slot yet.
    pub(crate) fn check_nested(self: &Rc<Self>, child: &Rc<Layout>, slot: Option<u64>) -> Result<()> {
        // A container must not end up inside itself.
        let mut ancestor = Some(self.clone());
        while let Some(layout) = ancestor {
            if Rc::ptr_eq(&layout, child) {
                return Err(TraceError::CyclicNesting);
            }
            ancestor = layout.parent();
        }
        let link = child
            .state
            .borrow()
            .parent
            .as_ref()
            .map(|link| (link.layout.as_ptr(), link.slot));
        match link {
            Some((parent, linked_slot)) => {
                if parent != Rc::as_ptr(self) || slot != Some(linked_slot) {
                    return Err(TraceError::AlreadyAttached);
                }
            }
            // A sealed layout has frozen its address as a root.
            None if child.is_sealed() => return Err(TraceError::Sealed),
            None => {}
        }
        self.check_fits(child.total_size_now())
    }

    /// Records `child` as stored at `slot` and accounts for its size.
    pub(crate) fn add_nested(self: &Rc<Self>, child: &Rc<Layout>, slot: u64) -> Result<()> {
        child.attach(self, slot)?;
        let total_size = child.handles().total_size.clone();
        let mut state = self.state.borrow_mut();
        let known = state
            .nested
            .iter()
            .any(|(layout, _)| layout.as_ptr() == Rc::as_ptr(child));
        if !known {
            state.nested.push((Rc::downgrade(child), total_size));
        }
        Ok(())
    }

    fn attach(self: &Rc<Self>, parent: &Rc<Layout>, slot: u64) -> Result<()> {
        if let Some(link) = self.state.borrow().parent.as_ref() {
            return if link.layout.as_ptr() == Rc::as_ptr(parent) && link.slot == slot {
                Ok(())
            } else {
                Err(TraceError::AlreadyAttached)
            };
        }

        let handles = parent.handles();
        let link = ParentLink {
            layout: Rc::downgrade(parent),
            slot,
            space: handles.space.clone(),
            offset: lazy::strided(handles.base.clone(), slot, handles.element_size.clone()),
        };
        self.state.borrow_mut().parent = Some(link);
        tracing::debug!(slot, "nested container attached to parent");
        Ok(())
    }

    fn parent(&self) -> Option<Rc<Layout>> {
        self.state
            .borrow()
            .parent
            .as_ref()
            .and_then(|link| link.layout.upgrade())
    }

    /// The block of the whole container, one element wide.
    pub(crate) fn base_block(self: &Rc<Self>) -> MemoryBlock {
        let handles = self.handles();
        MemoryBlock::new(
            handles.space.clone(),
            handles.base.clone(),
            handles.element_size.clone(),
            value(1),
        )
    }

    /// `count` elements starting at `slot`.
    pub(crate) fn element_block(self: &Rc<Self>, slot: u64, count: u64) -> MemoryBlock {
        let handles = self.handles();
        let shift = lazy::product(value(slot), handles.element_size.clone());
        self.base_block().adjust_offset(shift).with_count(value(count))
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed_size.get().is_some()
    }

    /// Memoizes the element size and freezes every quantity derived from this
    /// layout.
    pub(crate) fn seal(&self) {
        if self.is_sealed() {
            return;
        }
        let size = self.element_size_now();
        self.sealed_size.set(Some(size));
        self.observers.notify(self);
    }

    fn handles(self: &Rc<Self>) -> &LayoutHandles {
        if let Some(handles) = self.handles.get() {
            return handles;
        }
        let root = self.assign_root_space();
        let handles = self.handles.get_or_init(|| LayoutHandles::observe(self));
        if let Some(space) = root {
            tracer::record_space(
                space,
                handles.space.clone(),
                handles.total_size.clone(),
                handles.element_size.clone(),
            );
        }
        handles
    }

    /// Assigns a fresh space when the container is addressed as a root for
    /// the first time.
    fn assign_root_space(&self) -> Option<MemorySpace> {
        if self.is_attached() || self.state.borrow().root_space.is_some() {
            return None;
        }
        let space = MemorySpace::fresh(self.space_type());
        self.state.borrow_mut().root_space = Some(space);
        Some(space)
    }

    fn space_expr(&self) -> Lazy<MemorySpace> {
        let state = self.state.borrow();
        match (&state.parent, state.root_space) {
            (Some(link), _) => link.space.clone(),
            (None, Some(space)) => value(space),
            (None, None) => unreachable!("handles exist only once a space is known"),
        }
    }

    fn base_expr(&self) -> Lazy<u64> {
        match &self.state.borrow().parent {
            Some(link) => link.offset.clone(),
            None => value(0),
        }
    }

    fn element_size_now(&self) -> u64 {
        if let Some(size) = self.sealed_size.get() {
            return size;
        }
        let state = self.state.borrow();
        let nested = state
            .nested
            .iter()
            .map(|(_, total)| total.evaluate())
            .max()
            .unwrap_or(0);
        let fixed = match self.element_policy {
            ElementSize::Inferred => 0,
            ElementSize::Fixed { bytes, .. } => bytes,
        };
        let size = state
            .max_literal
            .max(nested)
            .max(fixed)
            .max(self.high_water.get());
        self.high_water.set(size);
        size
    }

    fn total_size_now(&self) -> u64 {
        self.element_size_now() * self.max_len() + self.overhead
    }
}

impl Observed for Layout {
    fn observers(&self) -> &Observers<Self> {
        &self.observers
    }

    fn is_sealed(&self) -> bool {
        self.sealed_size.get().is_some()
    }
}

impl Drop for Layout {
    fn drop(&mut self) {
        let this: &Layout = self;
        this.observers.notify(this);
    }
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layout")
            .field("sparse", &self.is_sparse())
            .field("max_len", &self.max_len())
            .field("element_size", &self.element_size_now())
            .field("sealed", &self.is_sealed())
            .finish_non_exhaustive()
    }
}
