//! Component Contract
//!
//! A component is a controller object bound to exactly one container
//! element. The registry creates it, schedules its initialization, and
//! eventually disposes it.
//!
//! # Lifecycle
//!
//! 1. The registry builds a [`Context`] for the `(container, name)` pair and
//!    calls the registered [`ComponentFactory`] with it.
//!
//! 2. `initialize` is scheduled on the runtime. It never runs inside the
//!    factory call, so a factory can finish wiring the instance first.
//!
//! 3. When `initialize` succeeds, the readiness event `mounted-<name>` is
//!    dispatched on the container with the [`Instance`] as payload. When it
//!    fails, the error is logged and stored on the instance and no readiness
//!    event fires.
//!
//! 4. `dispose` runs when an ancestor (or the component's own container) is
//!    torn down. The default implementation disposes every tracked instance
//!    below the container, so overrides should call
//!    [`Context::dispose_descendants`] as well.
//!
//! # Identity
//!
//! Components are identified by an explicit [`ComponentName`] supplied at
//! registration time, never by their Rust type name.

mod instance;
mod scope;

pub use instance::{Instance, InstanceId, LifecycleState};
pub use scope::DisposeScope;

use std::any::Any;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use crate::dom::{ElementId, Event, Listener, ListenerId};
use crate::error::{BoxError, MountError, Result};
use crate::registry::Registry;

/// Stable name identifying a component type.
///
/// Used both as the registry key and as the instance-table key of a
/// container.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ComponentName(Arc<str>);

impl ComponentName {
    /// Create a name from a string slice.
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ComponentName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ComponentName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ComponentName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&ComponentName> for ComponentName {
    fn from(name: &ComponentName) -> Self {
        name.clone()
    }
}

impl From<ComponentName> for String {
    fn from(name: ComponentName) -> Self {
        name.0.to_string()
    }
}

/// Access to a component as `Any`, for downcasting instances.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A mountable unit bound to one container.
///
/// # Example
///
/// ```rust,ignore
/// struct Counter {
///     clicks: AtomicUsize,
/// }
///
/// impl Component for Counter {
///     fn initialize(self: Arc<Self>, cx: Context) -> BoxFuture<'static, Result<(), BoxError>> {
///         async move {
///             cx.subscribe("click", Arc::new(move |_| {
///                 self.clicks.fetch_add(1, Ordering::Relaxed);
///             }));
///             Ok(())
///         }
///         .boxed()
///     }
/// }
/// ```
pub trait Component: AsAny + Send + Sync + 'static {
    /// Set up the component's inner workings.
    ///
    /// Must be overridden. The default fails with
    /// [`MountError::NotImplemented`] naming the concrete type.
    fn initialize(self: Arc<Self>, _cx: Context) -> BoxFuture<'static, Result<(), BoxError>> {
        let err = MountError::NotImplemented {
            component: std::any::type_name::<Self>().to_string(),
        };
        async move { Err::<(), BoxError>(Box::new(err)) }.boxed()
    }

    /// Release listeners and nested components.
    ///
    /// The default disposes every tracked instance below the container.
    fn dispose(&self, cx: &Context) {
        cx.dispose_descendants();
    }
}

/// Builds a component for a container.
pub type ComponentFactory = Arc<dyn Fn(&Context) -> Arc<dyn Component> + Send + Sync>;

/// Wrap a typed constructor as a [`ComponentFactory`].
pub fn factory<C, F>(build: F) -> ComponentFactory
where
    C: Component,
    F: Fn(&Context) -> C + Send + Sync + 'static,
{
    Arc::new(move |cx: &Context| Arc::new(build(cx)) as Arc<dyn Component>)
}

/// Handle given to a component: its container, its identity, and the
/// registry it belongs to.
#[derive(Clone)]
pub struct Context {
    registry: Registry,
    container: ElementId,
    name: ComponentName,
    instance: InstanceId,
}

impl Context {
    pub(crate) fn new(
        registry: Registry,
        container: ElementId,
        name: ComponentName,
        instance: InstanceId,
    ) -> Self {
        Self {
            registry,
            container,
            name,
            instance,
        }
    }

    /// The container this component is bound to.
    pub fn container(&self) -> ElementId {
        self.container
    }

    /// The name this component was registered under.
    pub fn name(&self) -> &ComponentName {
        &self.name
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// This component's own instance, once it has been recorded.
    pub fn instance(&self) -> Option<Instance> {
        self.registry
            .get_instance(self.container, self.name.as_str())
            .filter(|instance| instance.id() == self.instance)
    }

    /// Dispatch an event on the container.
    pub fn dispatch(&self, event: &Event) {
        self.registry.dom().dispatch(self.container, event);
    }

    /// Fire a named event carrying `payload` on the container.
    pub fn notify_ready<T>(&self, event_name: &str, payload: T)
    where
        T: Any + Send + Sync,
    {
        self.dispatch(&Event::with_detail(event_name, payload));
    }

    /// Listen for events on the container.
    pub fn subscribe(&self, event_name: &str, listener: Listener) -> ListenerId {
        self.registry
            .dom()
            .subscribe(self.container, event_name, listener)
    }

    pub fn unsubscribe(&self, event_name: &str, id: ListenerId) {
        self.registry
            .dom()
            .unsubscribe(self.container, event_name, id);
    }

    /// Dispose every tracked instance strictly below the container, except
    /// this component itself.
    pub fn dispose_descendants(&self) -> usize {
        self.registry.dispose_all(self.container, Some(self.instance))
    }

    /// Wait for a component on another container using the registry's
    /// default timeout.
    pub async fn await_mounted(
        &self,
        container: ElementId,
        name: impl Into<ComponentName>,
    ) -> Result<Instance> {
        self.registry.await_mounted(container, name).await
    }

    /// Wait for a component on another container with an explicit timeout.
    pub async fn await_mounted_within(
        &self,
        container: ElementId,
        name: impl Into<ComponentName>,
        timeout: Duration,
    ) -> Result<Instance> {
        self.registry
            .await_mounted_within(container, name, timeout)
            .await
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("container", &self.container)
            .field("name", &self.name)
            .field("instance", &self.instance)
            .finish()
    }
}
