//! Recording scopes.
//!
//! Contexts form a per-thread stack on top of an implicit root. Only the
//! topmost context accepts events; every context buffers its own events until
//! it is dumped.

use std::{
    cell::{Cell, RefCell},
    fmt,
    io::Write,
    rc::Rc,
};

use tracing::{debug, info, instrument};

use crate::{
    error::Result,
    event::TraceRecord,
    lazy::Lazy,
    tracer,
};

thread_local! {
    static NEXT_CONTEXT_ID: Cell<u32> = const { Cell::new(0) };
}

fn next_context_id() -> u32 {
    NEXT_CONTEXT_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    })
}

pub struct TraceContext {
    id: u32,
    name: String,
    events: RefCell<Vec<Lazy<TraceRecord>>>,
    enabled: Cell<bool>,
}

impl TraceContext {
    pub fn new(name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            id: next_context_id(),
            name: name.into(),
            events: RefCell::new(Vec::new()),
            enabled: Cell::new(true),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    /// Makes this context the active one.
    pub fn enter(self: &Rc<Self>) {
        tracer::push_context(self.clone());
    }

    /// Leaves this context, which must be the active one.
    pub fn exit(&self) -> Result<()> {
        tracer::pop_context(self)
    }

    /// Enters this context until the returned guard is dropped or closed.
    pub fn scope(self: &Rc<Self>) -> ContextScope {
        self.enter();
        ContextScope {
            context: Some(self.clone()),
        }
    }

    /// Buffers `event`. Returns `false`, dropping the event, when the
    /// context is disabled.
    pub fn register_event(&self, event: Lazy<TraceRecord>) -> bool {
        if !self.enabled.get() {
            return false;
        }
        self.events.borrow_mut().push(event);
        true
    }

    /// Evaluates every buffered event in registration order.
    ///
    /// The context is disabled while events are evaluated.
    pub fn records(&self) -> Vec<TraceRecord> {
        let _suspended = Suspend::new(&self.enabled);
        let events = self.events.borrow().clone();
        events.iter().map(|event| event.evaluate()).collect()
    }

    /// Writes one line per buffered event to `sink` and returns the number of
    /// lines written.
    ///
    /// The context is disabled for the duration of the call so that nothing
    /// triggered while evaluating or formatting lands in the buffer being
    /// walked. Lines written before an I/O failure stay written.
    #[instrument(level = "trace", skip_all, fields(context = %self.name))]
    pub fn dump(&self, sink: &mut impl Write) -> Result<usize> {
        let _suspended = Suspend::new(&self.enabled);
        let events = self.events.borrow().clone();
        for event in &events {
            writeln!(sink, "{}", event.evaluate())?;
        }
        info!(context = %self.name, events = events.len(), "dumped trace context");
        Ok(events.len())
    }
}

impl fmt::Debug for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("events", &self.len())
            .field("enabled", &self.enabled.get())
            .finish()
    }
}

/// Disables a context until dropped, then restores the previous state.
struct Suspend<'a> {
    enabled: &'a Cell<bool>,
    previous: bool,
}

impl<'a> Suspend<'a> {
    fn new(enabled: &'a Cell<bool>) -> Self {
        let previous = enabled.replace(false);
        Self { enabled, previous }
    }
}

impl Drop for Suspend<'_> {
    fn drop(&mut self) {
        self.enabled.set(self.previous);
    }
}

/// Guard returned by [`TraceContext::scope`].
///
/// Dropping the guard leaves the context. Leaving out of order is a scoping
/// bug: [`ContextScope::close`] reports it as an error, while a plain drop
/// panics.
#[must_use = "the context is left as soon as the guard is dropped"]
pub struct ContextScope {
    context: Option<Rc<TraceContext>>,
}

impl ContextScope {
    pub fn context(&self) -> Option<&Rc<TraceContext>> {
        self.context.as_ref()
    }

    /// Leaves the context, reporting an unbalanced exit.
    pub fn close(mut self) -> Result<()> {
        match self.context.take() {
            Some(context) => context.exit(),
            None => Ok(()),
        }
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        if let Err(err) = context.exit() {
            tracing::error!(%err, "trace context scope closed out of order");
            if !std::thread::panicking() {
                panic!("{err}");
            }
        }
        debug!(context = %context.name, "closed trace context scope");
    }
}
