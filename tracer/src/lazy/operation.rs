use std::cell::RefCell;

use smallvec::SmallVec;

use super::{Evaluable, Lazy};

enum Operand<T> {
    Pending(Lazy<T>),
    Ready(T),
}

/// An n-ary combinator over child [`Evaluable`]s.
///
/// Children that report [`Evaluable::is_finalized`] are replaced by their
/// concrete value on evaluation, releasing this node's handle on them. Long
/// lived event graphs therefore shrink to plain values as the containers
/// they describe are torn down.
pub struct Operation<T> {
    operands: RefCell<SmallVec<[Operand<T>; 4]>>,
    func: Box<dyn Fn(&[T]) -> T>,
}

impl<T: Clone> Operation<T> {
    pub fn new(operands: Vec<Lazy<T>>, func: impl Fn(&[T]) -> T + 'static) -> Self {
        Self {
            operands: RefCell::new(operands.into_iter().map(Operand::Pending).collect()),
            func: Box::new(func),
        }
    }

    /// Number of children still held as deferred nodes.
    pub fn pending(&self) -> usize {
        self.operands
            .borrow()
            .iter()
            .filter(|op| matches!(op, Operand::Pending(_)))
            .count()
    }
}

impl<T: Clone> Evaluable<T> for Operation<T> {
    fn evaluate(&self) -> T {
        let mut operands = self.operands.borrow_mut();
        let mut args = SmallVec::<[T; 4]>::with_capacity(operands.len());
        for operand in operands.iter_mut() {
            let value = match operand {
                Operand::Ready(v) => v.clone(),
                Operand::Pending(child) => {
                    let v = child.evaluate();
                    if child.is_finalized() {
                        *operand = Operand::Ready(v.clone());
                    }
                    v
                }
            };
            args.push(value);
        }
        drop(operands);

        (self.func)(&args)
    }

    fn is_finalized(&self) -> bool {
        self.operands.borrow().iter().all(|op| match op {
            Operand::Ready(_) => true,
            Operand::Pending(child) => child.is_finalized(),
        })
    }
}
