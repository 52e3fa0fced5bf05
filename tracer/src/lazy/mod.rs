//! Deferred, mutation-aware computation of scalar quantities.
//!
//! Trace events are registered long before they are written out. Their
//! addresses and sizes are therefore kept as small expression graphs of
//! [`Evaluable`] nodes that are only evaluated at dump time:
//!
//! - [`Value`] is a constant leaf.
//! - [`DerivedValue`] weakly observes a live source (a container layout) and
//!   recomputes against it until the source is sealed or dropped, at which point
//!   the last result is frozen.
//! - [`Operation`] combines child nodes with a pure function, collapsing
//!   children into plain values once they are finalized.

mod derived;
mod operation;

use std::rc::Rc;

pub use derived::{DerivedValue, Observed, Observer, Observers};
pub use operation::Operation;

/// A deferred quantity.
pub trait Evaluable<T> {
    /// Computes the quantity against the current state of its sources.
    ///
    /// Repeated calls with no intervening state change return equal results.
    fn evaluate(&self) -> T;

    /// Whether every future evaluation is guaranteed to equal the present one.
    ///
    /// Once this returns `true` it never returns `false` again.
    fn is_finalized(&self) -> bool;
}

/// Shared handle to a deferred quantity.
pub type Lazy<T> = Rc<dyn Evaluable<T>>;

/// A constant leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value<T>(pub T);

impl<T: Clone> Evaluable<T> for Value<T> {
    fn evaluate(&self) -> T {
        self.0.clone()
    }

    fn is_finalized(&self) -> bool {
        true
    }
}

/// Wraps a constant into a [`Lazy`] handle.
pub fn value<T: Clone + 'static>(v: T) -> Lazy<T> {
    Rc::new(Value(v))
}

/// Builds an [`Operation`] over `operands`.
pub fn apply<T: Clone + 'static>(
    operands: Vec<Lazy<T>>,
    func: impl Fn(&[T]) -> T + 'static,
) -> Lazy<T> {
    Rc::new(Operation::new(operands, func))
}

/// `a + b`
pub fn sum(a: Lazy<u64>, b: Lazy<u64>) -> Lazy<u64> {
    apply(vec![a, b], |v| v[0] + v[1])
}

/// `a * b`
pub fn product(a: Lazy<u64>, b: Lazy<u64>) -> Lazy<u64> {
    apply(vec![a, b], |v| v[0] * v[1])
}

/// `base + index * stride`, the address arithmetic shared by every element
/// access.
pub fn strided(base: Lazy<u64>, index: u64, stride: Lazy<u64>) -> Lazy<u64> {
    apply(vec![base, value(index), stride], |v| v[0] + v[1] * v[2])
}

/// A deferred quantity whose defining expression is itself deferred.
struct Flatten<T> {
    outer: Lazy<Lazy<T>>,
}

impl<T> Evaluable<T> for Flatten<T> {
    fn evaluate(&self) -> T {
        self.outer.evaluate().evaluate()
    }

    fn is_finalized(&self) -> bool {
        self.outer.is_finalized() && self.outer.evaluate().is_finalized()
    }
}

/// Evaluates whichever expression `outer` currently selects.
///
/// Used where a source freezes the *choice* of expression (a child
/// container's link into its parent) while the chosen expression keeps
/// tracking state elsewhere.
pub fn flatten<T: 'static>(outer: Lazy<Lazy<T>>) -> Lazy<T> {
    Rc::new(Flatten { outer })
}
