//! Readiness Rendezvous
//!
//! Lets one part of a page wait until a component on some container has
//! finished initializing.
//!
//! # How It Works
//!
//! 1. Subscribe to the container's readiness event (`mounted-<name>`) and
//!    failure notice (`mount-failed-<name>`).
//!
//! 2. Look at the instance table. An instance that is already `Ready`
//!    resolves immediately; one that already `Failed` returns its error.
//!    Subscribing first means a signal fired between the two steps is never
//!    missed.
//!
//! 3. Otherwise wait for either event, up to the timeout.
//!
//! The listeners are held by a guard that unsubscribes when it drops, so the
//! resolve, failure, timeout and abandoned-future paths all clean up.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::component::{ComponentName, Instance, LifecycleState};
use crate::dom::{Dom, ElementId, Event, Listener, ListenerId};
use crate::error::{MountError, Result};
use crate::registry::Registry;

/// What a rendezvous listener observed.
enum Outcome {
    Mounted(Instance),
    Failed(MountError),
}

/// Listeners on one element, removed on drop.
struct ListenerGuard {
    dom: Arc<dyn Dom>,
    target: ElementId,
    subscriptions: Vec<(String, ListenerId)>,
}

impl ListenerGuard {
    fn new(dom: Arc<dyn Dom>, target: ElementId) -> Self {
        Self {
            dom,
            target,
            subscriptions: Vec::new(),
        }
    }

    fn subscribe(&mut self, name: String, listener: Listener) {
        let id = self.dom.subscribe(self.target, &name, listener);
        self.subscriptions.push((name, id));
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        for (name, id) in self.subscriptions.drain(..) {
            self.dom.unsubscribe(self.target, &name, id);
        }
    }
}

impl Registry {
    /// Wait until `name` is mounted on `container`, using the configured
    /// default timeout (300ms unless changed).
    pub async fn await_mounted(
        &self,
        container: ElementId,
        name: impl Into<ComponentName>,
    ) -> Result<Instance> {
        let timeout = self.config().await_timeout();
        self.await_mounted_within(container, name, timeout).await
    }

    /// Wait until `name` is mounted on `container`.
    ///
    /// Resolves with the same instance whether called before or after the
    /// readiness event fired. Fails with [`MountError::Timeout`] when nothing
    /// arrives within `timeout`, or with the stored error when the
    /// component's initialization failed.
    pub async fn await_mounted_within(
        &self,
        container: ElementId,
        name: impl Into<ComponentName>,
        timeout: Duration,
    ) -> Result<Instance> {
        let name = name.into();
        let (tx, rx) = oneshot::channel::<Outcome>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let mut guard = ListenerGuard::new(self.dom().clone(), container);

        let on_ready: Listener = {
            let tx = tx.clone();
            Arc::new(move |event: &Event| {
                if let Some(instance) = event.detail_as::<Instance>() {
                    if let Some(tx) = tx.lock().take() {
                        let _ = tx.send(Outcome::Mounted(instance.clone()));
                    }
                }
            })
        };
        let on_failed: Listener = {
            let tx = tx.clone();
            Arc::new(move |event: &Event| {
                if let Some(err) = event.detail_as::<MountError>() {
                    if let Some(tx) = tx.lock().take() {
                        let _ = tx.send(Outcome::Failed(err.clone()));
                    }
                }
            })
        };
        guard.subscribe(self.config().ready_event(name.as_str()), on_ready);
        guard.subscribe(self.config().failed_event(name.as_str()), on_failed);

        if let Some(instance) = self.get_instance(container, name.as_str()) {
            match instance.state() {
                LifecycleState::Ready => return Ok(instance),
                LifecycleState::Failed(err) => return Err(err),
                LifecycleState::Pending | LifecycleState::Disposed => {}
            }
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Outcome::Mounted(instance))) => Ok(instance),
            Ok(Ok(Outcome::Failed(err))) => Err(err),
            Ok(Err(_)) | Err(_) => {
                debug!(component = %name, %container, ?timeout, "timed out waiting for component");
                Err(MountError::Timeout {
                    component: name,
                    container,
                    timeout,
                })
            }
        }
    }
}
