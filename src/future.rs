//! Controller-owned futures.
//!
//! A future starts unresolved. Resolving it either sets its value directly
//! and wakes every waiter, or — if the resolving value is itself an
//! unresolved future — chains onto that future instead of resolving
//! immediately. When the chained-onto future eventually resolves, the
//! chain propagates all the way down, resolving every future in the chain
//! and waking every waiter that had accumulated anywhere along it (§4.F).

use std::sync::{Arc, Mutex};

use crate::error::ControllerError;
use crate::value::Value;

pub type WorkerId = u64;

/// A continuation waiting on a future: the worker to resume and the
/// instruction offset to resume it at (immediately after the `Wait` that
/// suspended it).
pub type Continuation = (WorkerId, usize);

#[derive(Debug, Default)]
struct Inner {
    resolved: bool,
    value: Option<Value>,
    continuations: Vec<Continuation>,
    /// Futures that were resolved with *this* future while it was still
    /// unresolved — they become resolved in turn, transitively, the moment
    /// this future resolves.
    followers: Vec<Arc<Future>>,
}

/// A single future. Always held behind an `Arc` so `Value::FutureHandle`
/// and the controller's bookkeeping can share ownership; all mutable state
/// lives behind one mutex so resolve-vs-suspend races are settled by lock
/// order, not by a separate flag (§5).
#[derive(Debug, Default)]
pub struct Future {
    inner: Mutex<Inner>,
}

impl Future {
    pub fn new() -> Self {
        Future {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.lock().unwrap().resolved
    }

    pub fn value(&self) -> Option<Value> {
        self.inner.lock().unwrap().value.clone()
    }

    /// Atomically check whether this future is resolved; if not, register
    /// `cont` as a waiter. Returns the resolved value if one was already
    /// available. This must be a single locked operation — checking and
    /// registering separately would let a resolve land between the two and
    /// strand the waiter (§4.F "get_or_wait").
    pub fn get_or_register(&self, cont: Continuation) -> Option<Value> {
        let mut inner = self.inner.lock().unwrap();
        if inner.resolved {
            inner.value.clone()
        } else {
            inner.continuations.push(cont);
            None
        }
    }

    /// Resolve this future with `value`, returning every continuation that
    /// should now be woken — including ones registered on futures further
    /// down a resolution chain. Resolving an already-resolved future is an
    /// error (§9: the idempotence question is resolved as "raise"), and so
    /// is resolving a future with itself.
    pub fn resolve(self: &Arc<Self>, value: Value) -> Result<Vec<Continuation>, ControllerError> {
        if let Value::FutureHandle(target) = &value {
            if Arc::ptr_eq(self, target) {
                return Err(ControllerError::CyclicFutureChain);
            }

            let already_resolved_value = {
                let inner = self.inner.lock().unwrap();
                if inner.resolved {
                    return Err(ControllerError::FutureAlreadyResolved);
                }
                target.value()
            };

            if let Some(v) = already_resolved_value {
                return self.settle(v);
            }

            target.add_follower(self.clone());
            return Ok(Vec::new());
        }

        self.settle(value)
    }

    /// Mark this future resolved with a concrete (non-future) value and
    /// cascade that resolution into every follower chained onto it.
    fn settle(self: &Arc<Self>, value: Value) -> Result<Vec<Continuation>, ControllerError> {
        let (own_continuations, followers) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.resolved {
                return Err(ControllerError::FutureAlreadyResolved);
            }
            inner.resolved = true;
            inner.value = Some(value.clone());
            (
                std::mem::take(&mut inner.continuations),
                std::mem::take(&mut inner.followers),
            )
        };

        let mut all = own_continuations;
        for follower in followers {
            // A follower can only have been added while unresolved, so this
            // cannot itself hit the "already resolved" error path.
            if let Ok(woken) = follower.settle(value.clone()) {
                all.extend(woken);
            }
        }
        Ok(all)
    }

    fn add_follower(&self, follower: Arc<Future>) {
        self.inner.lock().unwrap().followers.push(follower);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_register_returns_value_when_already_resolved() {
        let fut = Arc::new(Future::new());
        fut.resolve(Value::Number(1.0)).unwrap();
        assert_eq!(fut.get_or_register((0, 0)), Some(Value::Number(1.0)));
    }

    #[test]
    fn get_or_register_registers_waiter_when_unresolved() {
        let fut = Arc::new(Future::new());
        assert_eq!(fut.get_or_register((7, 3)), None);
        let woken = fut.resolve(Value::Number(2.0)).unwrap();
        assert_eq!(woken, vec![(7, 3)]);
    }

    #[test]
    fn resolving_twice_is_an_error() {
        let fut = Arc::new(Future::new());
        fut.resolve(Value::Number(1.0)).unwrap();
        let err = fut.resolve(Value::Number(2.0)).unwrap_err();
        assert_eq!(err, ControllerError::FutureAlreadyResolved);
    }

    #[test]
    fn resolving_with_self_is_cyclic() {
        let fut = Arc::new(Future::new());
        let err = fut.resolve(Value::FutureHandle(fut.clone())).unwrap_err();
        assert_eq!(err, ControllerError::CyclicFutureChain);
    }

    #[test]
    fn resolving_with_unresolved_future_chains_and_propagates() {
        let a = Arc::new(Future::new());
        let b = Arc::new(Future::new());
        assert_eq!(a.get_or_register((1, 0)), None);

        let woken = a.resolve(Value::FutureHandle(b.clone())).unwrap();
        assert!(woken.is_empty());
        assert!(!a.is_resolved());

        let woken = b.resolve(Value::Number(9.0)).unwrap();
        assert_eq!(woken, vec![(1, 0)]);
        assert!(a.is_resolved());
        assert_eq!(a.value(), Some(Value::Number(9.0)));
    }
}
