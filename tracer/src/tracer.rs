//! Per-thread tracer state: the context stack, the event registry, the memory
//! space manifest and the size registry.
//!
//! Lazies are never evaluated while the state is borrowed. Anything that
//! needs evaluation (dumps, manifests) takes a snapshot first.

use std::{any::Any, cell::RefCell, io::Write, rc::Rc};

use tracing::{debug, trace};

use crate::{
    config::TraceConfig,
    container::SlotPolicy,
    context::TraceContext,
    error::{Result, TraceError},
    event::{EventId, TraceElement, TraceRecord},
    lazy::Lazy,
    memory::{reset_space_ids, MemorySpace, MemorySpaceType, SpaceManifest},
    registry::EventRegistry,
    sizing::SizeRegistry,
};

struct Tracer {
    root: Rc<TraceContext>,
    stack: Vec<Rc<TraceContext>>,
    registry: EventRegistry,
    manifest: SpaceManifest,
    sizes: SizeRegistry,
    config: TraceConfig,
    next_iterator: i64,
}

impl Tracer {
    fn new(config: TraceConfig) -> Self {
        Self {
            root: TraceContext::new("root"),
            stack: Vec::new(),
            registry: EventRegistry::new(),
            manifest: SpaceManifest::default(),
            sizes: SizeRegistry::default(),
            config,
            next_iterator: 0,
        }
    }

    fn active(&self) -> Rc<TraceContext> {
        self.stack.last().unwrap_or(&self.root).clone()
    }
}

thread_local! {
    static TRACER: RefCell<Tracer> = RefCell::new(Tracer::new(TraceConfig::from_env()));
}

fn with<R>(f: impl FnOnce(&mut Tracer) -> R) -> R {
    TRACER.with(|tracer| f(&mut tracer.borrow_mut()))
}

/// Replaces the calling thread's tracer state with a fresh one.
///
/// Previously created contexts and containers stay usable but are no longer
/// connected to the new root, registry or manifest.
pub fn reset(config: TraceConfig) {
    let previous = with(|tracer| std::mem::replace(tracer, Tracer::new(config)));
    reset_space_ids();
    // Dropping the previous state may release the last handles on old events.
    drop(previous);
}

pub fn config() -> TraceConfig {
    with(|tracer| tracer.config.clone())
}

/// The context currently accepting events.
pub fn active_context() -> Rc<TraceContext> {
    with(|tracer| tracer.active())
}

pub fn root_context() -> Rc<TraceContext> {
    with(|tracer| tracer.root.clone())
}

/// Number of contexts entered above the root.
pub fn depth() -> usize {
    with(|tracer| tracer.stack.len())
}

pub(crate) fn push_context(context: Rc<TraceContext>) {
    debug!(context = %context.name(), depth = depth() + 1, "entering trace context");
    with(|tracer| tracer.stack.push(context));
}

pub(crate) fn pop_context(context: &TraceContext) -> Result<()> {
    with(|tracer| {
        let top = tracer.stack.last().map(|top| (top.id(), top.name().to_string()));
        match top {
            Some((id, _)) if id == context.id() => {
                tracer.stack.pop();
                Ok(())
            }
            top => Err(TraceError::UnbalancedScope {
                expected: context.name().to_string(),
                found: top.map(|(_, name)| name),
            }),
        }
    })?;
    debug!(context = %context.name(), "left trace context");
    Ok(())
}

/// Registers `element` with the active context, depending on `deps`.
///
/// Returns the new event's id, or `None` when the active context refused it.
pub fn record(element: TraceElement, deps: &[EventId]) -> Result<Option<EventId>> {
    register_event(Rc::new(element), deps)
}

/// Registers an arbitrary deferred record with the active context.
pub fn register_event(event: Lazy<TraceRecord>, deps: &[EventId]) -> Result<Option<EventId>> {
    let context = with(|tracer| {
        tracer.registry.validate(deps)?;
        Ok::<_, TraceError>(tracer.active())
    })?;
    if !context.register_event(event) {
        debug!(context = %context.name(), "event refused by disabled context");
        return Ok(None);
    }
    let id = with(|tracer| tracer.registry.register(deps))?;
    trace!(%id, context = %context.name(), deps = deps.len(), "registered event");
    Ok(Some(id))
}

/// Checks that every id in `deps` names an already registered event.
pub(crate) fn validate_deps(deps: &[EventId]) -> Result<()> {
    with(|tracer| tracer.registry.validate(deps))
}

/// Registers an event without dependencies.
pub(crate) fn record_independent(element: TraceElement) -> Option<EventId> {
    let context = active_context();
    if !context.register_event(Rc::new(element)) {
        debug!(context = %context.name(), "event refused by disabled context");
        return None;
    }
    let id = with(|tracer| tracer.registry.register_independent());
    trace!(%id, context = %context.name(), "registered event");
    Some(id)
}

/// Declares after the fact that `event` depended on the older `dep`.
pub fn add_dependency(event: EventId, dep: EventId) -> Result<()> {
    with(|tracer| tracer.registry.add_dependency(event, dep))
}

pub fn last_event_id() -> Option<EventId> {
    with(|tracer| tracer.registry.last())
}

/// Number of events registered on this thread since the last reset.
pub fn event_count() -> usize {
    with(|tracer| tracer.registry.len())
}

pub fn deps_on(event: EventId) -> Vec<EventId> {
    with(|tracer| tracer.registry.deps_on(event).to_vec())
}

pub fn out_edges(event: EventId) -> Vec<EventId> {
    with(|tracer| tracer.registry.out_edges(event).to_vec())
}

/// Every event `event` transitively depends on.
pub fn ancestors(event: EventId) -> Vec<EventId> {
    with(|tracer| tracer.registry.ancestors(event))
}

pub(crate) fn next_iterator_id() -> i64 {
    with(|tracer| {
        let id = tracer.next_iterator;
        tracer.next_iterator += 1;
        id
    })
}

/// Registers the byte size of `T` values in `space` memory.
///
/// `size` runs while the tracer state is borrowed and must not touch tracked
/// containers.
pub fn register_size<T: Any>(space: MemorySpaceType, size: impl Fn(&T) -> u64 + 'static) {
    with(|tracer| tracer.sizes.register(space, size));
}

pub fn size_of_value<T: Any>(space: MemorySpaceType, value: &T) -> Result<u64> {
    with(|tracer| tracer.sizes.lookup(space, value))
}

pub(crate) fn size_of_dyn(
    space: MemorySpaceType,
    value: &dyn Any,
    type_name: &'static str,
) -> Result<u64> {
    with(|tracer| tracer.sizes.lookup_dyn(space, value, type_name))
}

pub(crate) fn default_space_type() -> MemorySpaceType {
    with(|tracer| tracer.config.space_type)
}

pub(crate) fn default_slot_policy() -> SlotPolicy {
    with(|tracer| tracer.config.slot_policy)
}

/// Adds a freshly assigned root space to the manifest. `current` follows the
/// owning container's space from then on.
pub(crate) fn record_space(
    space: MemorySpace,
    current: Lazy<MemorySpace>,
    total_size: Lazy<u64>,
    element_size: Lazy<u64>,
) {
    debug!(%space, "assigned root memory space");
    with(|tracer| tracer.manifest.record(space, current, total_size, element_size));
}

/// Writes the memory space manifest, one `space_id total_size element_size`
/// line per space.
pub fn dump_manifest(sink: &mut impl Write) -> Result<()> {
    let manifest = with(|tracer| tracer.manifest.snapshot());
    manifest.dump(sink)
}

/// Writes the dependency export, one `sequence_id [deps_on] [out_edges]` line
/// per event.
pub fn dump_dependencies(sink: &mut impl Write) -> Result<()> {
    let mut buffer = Vec::new();
    with(|tracer| tracer.registry.export(&mut buffer))?;
    sink.write_all(&buffer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::AccessType,
        lazy::value,
        memory::MemoryBlock,
    };

    fn element() -> TraceElement {
        let space = MemorySpace {
            id: 0,
            kind: MemorySpaceType::Cpu,
        };
        TraceElement::new(
            MemoryBlock::new(value(space), value(0), value(4), value(1)),
            AccessType::Write,
        )
    }

    #[test]
    fn test_events_go_to_the_active_context() {
        reset(TraceConfig::default());
        let outer = TraceContext::new("outer");
        outer.enter();
        let a = record(element(), &[]).unwrap().unwrap();
        let b = record(element(), &[a]).unwrap().unwrap();
        outer.exit().unwrap();

        assert_eq!(outer.len(), 2);
        assert!(root_context().is_empty());
        assert_eq!(out_edges(a), vec![b]);
    }

    #[test]
    fn test_unbalanced_exit() {
        reset(TraceConfig::default());
        let outer = TraceContext::new("outer");
        let inner = TraceContext::new("inner");
        outer.enter();
        inner.enter();
        let err = outer.exit().unwrap_err();
        assert!(matches!(
            err,
            TraceError::UnbalancedScope { ref expected, found: Some(ref found) }
                if expected == "outer" && found == "inner"
        ));
        inner.exit().unwrap();
        outer.exit().unwrap();
        assert!(matches!(
            outer.exit(),
            Err(TraceError::UnbalancedScope { found: None, .. })
        ));
    }

    #[test]
    fn test_refused_event_gets_no_id() {
        reset(TraceConfig::default());
        root_context().set_enabled(false);
        assert_eq!(record(element(), &[]).unwrap(), None);
        assert_eq!(event_count(), 0);
        root_context().set_enabled(true);
    }

    #[test]
    fn test_unknown_dependency_is_rejected_before_buffering() {
        reset(TraceConfig::default());
        assert!(record(element(), &[EventId(3)]).is_err());
        assert!(root_context().is_empty());
    }
}
