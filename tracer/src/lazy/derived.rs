use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use super::Evaluable;

/// A source that [`DerivedValue`]s can observe.
///
/// Implementors own an [`Observers`] list and must call
/// [`Observers::notify`] when they are sealed and when they are dropped, so
/// that every observer freezes against the final state.
pub trait Observed: 'static {
    fn observers(&self) -> &Observers<Self>;

    /// Whether the source will never change again.
    fn is_sealed(&self) -> bool {
        false
    }
}

/// Receives the final state of an [`Observed`] source.
pub trait Observer<S: ?Sized> {
    fn freeze(&self, source: &S);
}

/// Subscription list held by an [`Observed`] source.
pub struct Observers<S: ?Sized> {
    list: RefCell<Vec<Weak<dyn Observer<S>>>>,
}

impl<S: ?Sized> Default for Observers<S> {
    fn default() -> Self {
        Self {
            list: RefCell::new(Vec::new()),
        }
    }
}

impl<S: ?Sized> Observers<S> {
    pub fn subscribe(&self, observer: Weak<dyn Observer<S>>) {
        let mut list = self.list.borrow_mut();
        list.retain(|o| o.strong_count() > 0);
        list.push(observer);
    }

    /// Freezes every live observer against `source` and clears the list.
    pub fn notify(&self, source: &S) {
        let list = std::mem::take(&mut *self.list.borrow_mut());
        for observer in list.iter().filter_map(Weak::upgrade) {
            observer.freeze(source);
        }
    }

    pub fn len(&self) -> usize {
        self.list
            .borrow()
            .iter()
            .filter(|o| o.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A projection of a live source.
///
/// While the source is reachable every evaluation recomputes the projection
/// against its current state. Once the source is sealed or dropped the last
/// result is frozen and returned from then on.
pub struct DerivedValue<S, T> {
    source: Weak<S>,
    project: Box<dyn Fn(&S) -> T>,
    snapshot: RefCell<T>,
    finalized: Cell<bool>,
}

impl<S: Observed, T: Clone + 'static> DerivedValue<S, T> {
    /// Starts observing `source` through `project`.
    ///
    /// The projection is evaluated once immediately so that a snapshot exists
    /// even if the source disappears before the first evaluation.
    pub fn observe(source: &Rc<S>, project: impl Fn(&S) -> T + 'static) -> Rc<Self> {
        let snapshot = project(source);
        let derived = Rc::new(Self {
            source: Rc::downgrade(source),
            project: Box::new(project),
            snapshot: RefCell::new(snapshot),
            finalized: Cell::new(source.is_sealed()),
        });

        if !derived.finalized.get() {
            let observer: Weak<dyn Observer<S>> = Rc::downgrade(&derived) as Weak<Self>;
            source.observers().subscribe(observer);
        }

        derived
    }
}

impl<S, T: Clone> Observer<S> for DerivedValue<S, T> {
    fn freeze(&self, source: &S) {
        if self.finalized.get() {
            return;
        }
        *self.snapshot.borrow_mut() = (self.project)(source);
        self.finalized.set(true);
    }
}

impl<S, T: Clone> Evaluable<T> for DerivedValue<S, T> {
    fn evaluate(&self) -> T {
        if !self.finalized.get() {
            match self.source.upgrade() {
                Some(source) => {
                    let value = (self.project)(&source);
                    *self.snapshot.borrow_mut() = value.clone();
                    return value;
                }
                // Source went away without notifying: keep the last snapshot.
                None => self.finalized.set(true),
            }
        }
        self.snapshot.borrow().clone()
    }

    fn is_finalized(&self) -> bool {
        self.finalized.get() || self.source.strong_count() == 0
    }
}
