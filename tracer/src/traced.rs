//! Values that remember which events they were computed from.

use std::ops::{Add, Div, Mul, Sub};

use crate::{event::EventId, registry::EdgeList};

/// A value paired with the ids of the events it was derived from.
///
/// Reading through [`TrackedContainer::get_traced`](crate::TrackedContainer::get_traced)
/// yields a `Traced` value; using it as a key, index or range bound makes the
/// next event depend on those reads. Arithmetic between traced values merges
/// their dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Traced<T> {
    pub value: T,
    pub deps: EdgeList,
}

impl<T> Traced<T> {
    pub fn new(value: T, deps: impl IntoIterator<Item = EventId>) -> Self {
        let mut deps: EdgeList = deps.into_iter().collect();
        deps.sort_unstable();
        deps.dedup();
        Self { value, deps }
    }

    /// A value that depends on no event.
    pub fn untracked(value: T) -> Self {
        Self {
            value,
            deps: EdgeList::new(),
        }
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Traced<U> {
        Traced {
            value: f(self.value),
            deps: self.deps,
        }
    }

    /// Pairs two traced values, depending on both.
    pub fn join<U>(self, other: Traced<U>) -> Traced<(T, U)> {
        let deps = merge(&self.deps, &other.deps);
        Traced {
            value: (self.value, other.value),
            deps,
        }
    }
}

impl<T> From<T> for Traced<T> {
    fn from(value: T) -> Self {
        Self::untracked(value)
    }
}

pub(crate) fn merge(a: &[EventId], b: &[EventId]) -> EdgeList {
    let mut deps: EdgeList = a.iter().chain(b).copied().collect();
    deps.sort_unstable();
    deps.dedup();
    deps
}

macro_rules! traced_binop {
    ($trait:ident, $method:ident) => {
        impl<T: $trait<Output = T>> $trait for Traced<T> {
            type Output = Traced<T>;

            fn $method(self, rhs: Self) -> Self::Output {
                let deps = merge(&self.deps, &rhs.deps);
                Traced {
                    value: self.value.$method(rhs.value),
                    deps,
                }
            }
        }
    };
}

traced_binop!(Add, add);
traced_binop!(Sub, sub);
traced_binop!(Mul, mul);
traced_binop!(Div, div);
