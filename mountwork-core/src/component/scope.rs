//! Dispose Scope
//!
//! Tracks which instances are in the middle of their `dispose()` call on the
//! current thread. Disposal is synchronous, so a stack per thread is enough
//! to describe the active call chain.
//!
//! `dispose_all` consults the stack and never disposes an instance that is
//! already on it. This covers the direct case (a component disposing its own
//! container's subtree) and longer chains where an inner dispose reaches back
//! up to an instance that is still running.

use std::cell::RefCell;

use super::InstanceId;

thread_local! {
    static DISPOSE_STACK: RefCell<Vec<InstanceId>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the instance when dropped, even if `dispose` panics.
pub struct DisposeScope {
    instance: InstanceId,
}

impl DisposeScope {
    /// Mark `instance` as disposing until the guard drops.
    pub fn enter(instance: InstanceId) -> Self {
        DISPOSE_STACK.with(|stack| stack.borrow_mut().push(instance));
        Self { instance }
    }

    /// Whether `instance` is currently disposing on this thread.
    pub fn is_disposing(instance: InstanceId) -> bool {
        DISPOSE_STACK.with(|stack| stack.borrow().contains(&instance))
    }
}

impl Drop for DisposeScope {
    fn drop(&mut self) {
        DISPOSE_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(id) = popped {
                debug_assert_eq!(
                    id, self.instance,
                    "DisposeScope mismatch: expected {:?}, got {:?}",
                    self.instance, id
                );
            }
        });
    }
}
