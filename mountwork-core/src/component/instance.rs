//! Component Instances
//!
//! An [`Instance`] is the registry's handle to one live component on one
//! container. Handles are cheap to clone and compare by identity.
//!
//! # State Machine
//!
//! ```text
//! Pending ──initialize ok──▶ Ready ──┐
//!    │                               ├──dispose──▶ Disposed
//!    └────initialize err───▶ Failed ─┘
//! ```
//!
//! `Pending` may also go straight to `Disposed` when the container is torn
//! down before initialization finishes. Transitions out of `Disposed` never
//! happen.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{Component, ComponentName};
use crate::dom::ElementId;
use crate::error::MountError;

/// Unique identifier for a component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Generate a new unique instance ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Where an instance is in its lifecycle.
#[derive(Debug, Clone)]
pub enum LifecycleState {
    /// Created; initialization has not finished.
    Pending,

    /// Initialization succeeded and readiness was announced.
    Ready,

    /// Initialization failed.
    Failed(MountError),

    /// Disposed. Terminal.
    Disposed,
}

struct InstanceInner {
    id: InstanceId,
    name: ComponentName,
    container: ElementId,
    component: Arc<dyn Component>,
    state: RwLock<LifecycleState>,
}

/// Shared handle to a mounted component.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

impl Instance {
    pub(crate) fn new(
        id: InstanceId,
        name: ComponentName,
        container: ElementId,
        component: Arc<dyn Component>,
    ) -> Self {
        Self {
            inner: Arc::new(InstanceInner {
                id,
                name,
                container,
                component,
                state: RwLock::new(LifecycleState::Pending),
            }),
        }
    }

    /// Unique id of this instance.
    pub fn id(&self) -> InstanceId {
        self.inner.id
    }

    /// The name the component was registered under.
    pub fn name(&self) -> &ComponentName {
        &self.inner.name
    }

    /// The element this instance is bound to.
    pub fn container(&self) -> ElementId {
        self.inner.container
    }

    pub fn component(&self) -> &Arc<dyn Component> {
        &self.inner.component
    }

    /// Borrow the component as its concrete type.
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        <dyn Component as super::AsAny>::as_any(self.inner.component.as_ref()).downcast_ref::<T>()
    }

    /// Snapshot of the current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.inner.state.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.inner.state.read(), LifecycleState::Ready)
    }

    pub fn is_disposed(&self) -> bool {
        matches!(*self.inner.state.read(), LifecycleState::Disposed)
    }

    /// Whether two handles refer to the same instance.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// `Pending -> Ready`. Returns `false` if the instance left `Pending`.
    pub(crate) fn mark_ready(&self) -> bool {
        let mut state = self.inner.state.write();
        if matches!(*state, LifecycleState::Pending) {
            *state = LifecycleState::Ready;
            true
        } else {
            false
        }
    }

    /// `Pending -> Failed`. Returns `false` if the instance left `Pending`.
    pub(crate) fn mark_failed(&self, error: MountError) -> bool {
        let mut state = self.inner.state.write();
        if matches!(*state, LifecycleState::Pending) {
            *state = LifecycleState::Failed(error);
            true
        } else {
            false
        }
    }

    /// Any state `-> Disposed`. Returns `false` if already disposed.
    pub(crate) fn mark_disposed(&self) -> bool {
        let mut state = self.inner.state.write();
        if matches!(*state, LifecycleState::Disposed) {
            false
        } else {
            *state = LifecycleState::Disposed;
            true
        }
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        Instance::ptr_eq(self, other)
    }
}

impl Eq for Instance {}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("container", &self.inner.container)
            .field("state", &self.state())
            .finish()
    }
}
