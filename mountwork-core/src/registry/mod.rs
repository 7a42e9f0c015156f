//! Instance Registry
//!
//! The registry maps selectors to component names, names to constructors,
//! and containers to their live instances. It is the only place component
//! instances are created or torn down.
//!
//! # How It Works
//!
//! 1. `register` records `(selector, name, factory)` entries. Registration is
//!    idempotent and first-wins: a name keeps the first factory it was
//!    registered with, and a selector lists each name once, in registration
//!    order.
//!
//! 2. `mount_all(root)` walks the selector table in registration order,
//!    queries `root` for each selector (document order), and mounts every
//!    listed component on every match.
//!
//! 3. `mount` of a `(container, name)` pair that already has an instance is a
//!    no-op. There is at most one live instance per pair, ever.
//!
//! 4. `dispose_all(root, exclude)` tears down every tracked container strictly
//!    below `root` and forgets it.
//!
//! # Reentrancy
//!
//! Component code (factories, `dispose`, readiness listeners) may call back
//! into the registry. No lock is held while component code runs: the
//! registry snapshots what it needs, releases the lock, and re-checks the
//! table afterwards.
//!
//! While a container's instances are being disposed, mounts onto that
//! container are refused, so a `dispose` that mounts again cannot leave an
//! untracked instance behind.
//!
//! # Ownership
//!
//! A `Registry` is a cheap, cloneable handle. Create one per page (or per
//! test) and pass it to whoever needs it; there is no global instance.

mod container;

pub use container::ContainerRecord;

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::FutureExt;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use crate::component::{
    ComponentFactory, ComponentName, Context, DisposeScope, Instance, InstanceId,
};
use crate::config::RegistryConfig;
use crate::dom::{Dom, ElementId, Event};
use crate::error::{BoxError, MountError, Result};

/// Query string used to find candidate containers.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Selector(Arc<str>);

impl Selector {
    pub fn new(selector: &str) -> Self {
        Self(Arc::from(selector))
    }

    /// The conventional selector for a component: `.{name}`.
    pub fn for_component(name: &ComponentName) -> Self {
        Self::from(format!(".{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for Selector {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Selector {
    fn from(selector: &str) -> Self {
        Self::new(selector)
    }
}

impl From<String> for Selector {
    fn from(selector: String) -> Self {
        Self(Arc::from(selector))
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        selector.0.to_string()
    }
}

/// One `(selector, name, factory)` entry for [`Registry::register`].
#[derive(Clone)]
pub struct Registration {
    pub selector: Selector,
    pub name: ComponentName,
    pub factory: ComponentFactory,
}

impl Registration {
    pub fn new(
        selector: impl Into<Selector>,
        name: impl Into<ComponentName>,
        factory: ComponentFactory,
    ) -> Self {
        Self {
            selector: selector.into(),
            name: name.into(),
            factory,
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("selector", &self.selector)
            .field("name", &self.name)
            .finish()
    }
}

/// Constructor names listed under one selector.
type NameList = SmallVec<[ComponentName; 4]>;

struct RegistryInner {
    dom: Arc<dyn Dom>,
    config: RegistryConfig,
    runtime: Handle,

    /// Selector -> names, both in registration order.
    selectors: RwLock<IndexMap<Selector, NameList>>,

    /// Name -> constructor. First registration wins.
    constructors: DashMap<ComponentName, ComponentFactory>,

    /// Side table of tracked containers, in first-mount order.
    containers: RwLock<IndexMap<ElementId, ContainerRecord>>,

    /// Containers whose instances are being disposed, with nesting depth.
    /// Nothing may be mounted onto them until the count drops to zero.
    disposing: DashMap<ElementId, usize>,
}

/// Marks a container as being disposed until dropped.
struct DisposingGuard<'a> {
    disposing: &'a DashMap<ElementId, usize>,
    container: ElementId,
}

impl<'a> DisposingGuard<'a> {
    fn enter(disposing: &'a DashMap<ElementId, usize>, container: ElementId) -> Self {
        *disposing.entry(container).or_insert(0) += 1;
        Self {
            disposing,
            container,
        }
    }
}

impl Drop for DisposingGuard<'_> {
    fn drop(&mut self) {
        let released = match self.disposing.get_mut(&self.container) {
            Some(mut depth) => {
                *depth = depth.saturating_sub(1);
                *depth == 0
            }
            None => false,
        };

        if released {
            self.disposing.remove_if(&self.container, |_, depth| *depth == 0);
        }
    }
}

/// Handle to a component registry.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Create a registry with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; use
    /// [`Registry::try_new`] or [`Registry::with_runtime`] there.
    pub fn new(dom: Arc<dyn Dom>) -> Self {
        Self::with_config(dom, RegistryConfig::default())
    }

    /// Create a registry with the default configuration, failing with
    /// [`MountError::NoRuntime`] outside a Tokio runtime.
    pub fn try_new(dom: Arc<dyn Dom>) -> Result<Self> {
        Self::try_with_config(dom, RegistryConfig::default())
    }

    /// Fallible form of [`Registry::with_config`].
    pub fn try_with_config(dom: Arc<dyn Dom>, config: RegistryConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| MountError::NoRuntime)?;
        Ok(Self::with_runtime(dom, config, runtime))
    }

    /// Create a registry with a custom configuration.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn with_config(dom: Arc<dyn Dom>, config: RegistryConfig) -> Self {
        Self::with_runtime(dom, config, Handle::current())
    }

    /// Create a registry that schedules initialization on `runtime`.
    pub fn with_runtime(dom: Arc<dyn Dom>, config: RegistryConfig, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                dom,
                config,
                runtime,
                selectors: RwLock::new(IndexMap::new()),
                constructors: DashMap::new(),
                containers: RwLock::new(IndexMap::new()),
                disposing: DashMap::new(),
            }),
        }
    }

    pub fn dom(&self) -> &Arc<dyn Dom> {
        &self.inner.dom
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// The document root of the underlying DOM.
    pub fn document(&self) -> ElementId {
        self.inner.dom.document()
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Record selector/constructor entries.
    ///
    /// Idempotent: a name already listed under a selector is skipped, and a
    /// name keeps the first factory it was registered with.
    pub fn register<I>(&self, entries: I)
    where
        I: IntoIterator<Item = Registration>,
    {
        for Registration {
            selector,
            name,
            factory,
        } in entries
        {
            match self.inner.constructors.entry(name.clone()) {
                dashmap::mapref::entry::Entry::Occupied(existing) => {
                    if !Arc::ptr_eq(existing.get(), &factory) {
                        warn!(component = %name, "constructor already registered, keeping the first");
                    }
                }
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(factory);
                }
            }

            let mut selectors = self.inner.selectors.write();
            let names = selectors.entry(selector.clone()).or_default();
            if !names.contains(&name) {
                debug!(%selector, component = %name, "registered component");
                names.push(name);
            }
        }
    }

    /// Names registered under `selector`, in registration order.
    pub fn constructors(&self, selector: &str) -> Vec<ComponentName> {
        self.inner
            .selectors
            .read()
            .get(selector)
            .map(|names| names.to_vec())
            .unwrap_or_default()
    }

    /// All registered selectors, in registration order.
    pub fn selectors(&self) -> Vec<Selector> {
        self.inner.selectors.read().keys().cloned().collect()
    }

    /// The constructor registered for `name`.
    pub fn constructor(&self, name: &str) -> Option<ComponentFactory> {
        self.inner
            .constructors
            .get(name)
            .map(|entry| entry.value().clone())
    }

    // ------------------------------------------------------------------------
    // Mounting
    // ------------------------------------------------------------------------

    /// Mount every registered component on every matching container below
    /// `root`.
    ///
    /// Returns the number of instances created.
    pub fn mount_all(&self, root: ElementId) -> usize {
        let table: Vec<(Selector, NameList)> = self
            .inner
            .selectors
            .read()
            .iter()
            .map(|(selector, names)| (selector.clone(), names.clone()))
            .collect();

        let mut mounted = 0;
        for (selector, names) in table {
            mounted += self.mount_names(root, &selector, &names);
        }
        mounted
    }

    /// [`mount_all`](Self::mount_all) on the whole document.
    pub fn mount_document(&self) -> usize {
        self.mount_all(self.document())
    }

    /// Mount one component on every container below `root` matching
    /// `selector`, without touching other selectors.
    pub fn mount_selector(&self, root: ElementId, selector: &Selector, name: &ComponentName) -> usize {
        self.mount_names(root, selector, std::slice::from_ref(name))
    }

    fn mount_names(&self, root: ElementId, selector: &Selector, names: &[ComponentName]) -> usize {
        let containers = self.inner.dom.query_all(root, selector.as_str());
        let mut mounted = 0;

        for container in containers {
            for name in names {
                if let Some(factory) = self.constructor(name.as_str()) {
                    if self.mount_with(container, name, &factory) {
                        mounted += 1;
                    }
                }
            }
        }

        mounted
    }

    /// Mount the component registered as `name` on `container`.
    ///
    /// A no-op when the container already has an instance of `name`, or
    /// while the container's instances are being disposed. Completion is observed through the readiness event, not the return
    /// value.
    pub fn mount(&self, container: ElementId, name: impl Into<ComponentName>) -> Result<()> {
        let name = name.into();
        let factory = self
            .constructor(name.as_str())
            .ok_or_else(|| MountError::MissingConstructor { name: name.clone() })?;
        self.mount_with(container, &name, &factory);
        Ok(())
    }

    /// Create, record and schedule an instance. Returns `false` when the
    /// pair already had one.
    fn mount_with(&self, container: ElementId, name: &ComponentName, factory: &ComponentFactory) -> bool {
        if self.inner.disposing.contains_key(&container) {
            debug!(component = %name, %container, "container is being disposed, not mounting");
            return false;
        }
        if self.get_instance(container, name.as_str()).is_some() {
            return false;
        }

        let id = InstanceId::new();
        let cx = Context::new(self.clone(), container, name.clone(), id);
        let instance = Instance::new(id, name.clone(), container, factory(&cx));

        // The factory may have mounted the same pair re-entrantly.
        let newly_tracked = {
            let mut containers = self.inner.containers.write();
            if self.inner.disposing.contains_key(&container) {
                return false;
            }
            let newly_tracked = !containers.contains_key(&container);
            let record = containers.entry(container).or_default();
            if !record.insert_if_vacant(instance.clone()) {
                return false;
            }
            newly_tracked
        };

        if newly_tracked {
            if let Some(marker) = &self.inner.config.marker_attribute {
                self.inner.dom.set_attribute(container, marker, "");
            }
        }

        debug!(component = %name, %container, "mounted component");
        self.schedule_initialize(instance, cx);
        true
    }

    /// Run `initialize` on a later turn of the runtime, then announce the
    /// outcome on the container. A panic counts as a failed initialization.
    fn schedule_initialize(&self, instance: Instance, cx: Context) {
        let registry = self.clone();
        self.inner.runtime.spawn(async move {
            let run = {
                let component = instance.component().clone();
                let cx = cx.clone();
                async move { component.initialize(cx).await }
            };

            let result = match AssertUnwindSafe(run).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(BoxError::from(panic_message(payload))),
            };
            registry.finish_initialize(&instance, &cx, result);
        });
    }

    fn finish_initialize(
        &self,
        instance: &Instance,
        cx: &Context,
        result: std::result::Result<(), BoxError>,
    ) {
        let config = &self.inner.config;
        match result {
            Ok(()) => {
                if instance.mark_ready() {
                    debug!(component = %instance.name(), container = %instance.container(), "component ready");
                    cx.notify_ready(&config.ready_event(instance.name().as_str()), instance.clone());
                }
            }
            Err(err) => {
                let err = MountError::from_initialize(instance.name(), err);
                error!(
                    component = %instance.name(),
                    container = %instance.container(),
                    error = %err,
                    "component initialization failed"
                );
                if instance.mark_failed(err.clone()) {
                    cx.dispatch(&Event::with_detail(
                        config.failed_event(instance.name().as_str()),
                        err,
                    ));
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// The live instance of `name` on `container`, if mounted.
    pub fn get_instance(&self, container: ElementId, name: &str) -> Option<Instance> {
        self.inner
            .containers
            .read()
            .get(&container)
            .and_then(|record| record.get(name).cloned())
    }

    /// Every live instance on `container`, in mount order.
    pub fn instances(&self, container: ElementId) -> Vec<Instance> {
        self.inner
            .containers
            .read()
            .get(&container)
            .map(ContainerRecord::snapshot)
            .unwrap_or_default()
    }

    /// Whether `container` has tracked instances.
    pub fn is_tracked(&self, container: ElementId) -> bool {
        self.inner.containers.read().contains_key(&container)
    }

    /// All tracked containers, in first-mount order.
    pub fn tracked_containers(&self) -> Vec<ElementId> {
        self.inner.containers.read().keys().copied().collect()
    }

    // ------------------------------------------------------------------------
    // Disposal
    // ------------------------------------------------------------------------

    /// Dispose every instance on every tracked container strictly below
    /// `root`, then forget those containers.
    ///
    /// `exclude` names the instance driving the call (it is skipped, and so
    /// is any instance whose `dispose` is still running on this thread).
    /// Returns the number of instances this call disposed directly; those
    /// torn down by a component's own `dispose` are not counted.
    pub fn dispose_all(&self, root: ElementId, exclude: Option<InstanceId>) -> usize {
        let tracked: HashSet<ElementId> = self.inner.containers.read().keys().copied().collect();
        if tracked.is_empty() {
            return 0;
        }

        // Document order: an outer container's `dispose` runs before anything
        // below it, whatever order they were mounted in.
        let candidates: Vec<ElementId> = self
            .inner
            .dom
            .query_all(root, "*")
            .into_iter()
            .filter(|container| tracked.contains(container))
            .collect();

        let mut disposed = 0;
        for container in candidates {
            disposed += self.dispose_record(container, exclude);
        }

        if disposed > 0 {
            debug!(%root, disposed, "disposed components");
        }
        disposed
    }

    /// [`dispose_all`](Self::dispose_all) on the whole document.
    pub fn dispose_document(&self) -> usize {
        self.dispose_all(self.document(), None)
    }

    /// Tear down a container that is leaving the tree: its own instances and
    /// everything tracked below it.
    pub fn dispose_container(&self, container: ElementId) -> usize {
        let own = self.dispose_record(container, None);
        own + self.dispose_all(container, None)
    }

    fn dispose_record(&self, container: ElementId, exclude: Option<InstanceId>) -> usize {
        // A nested dispose may already have handled this container.
        let snapshot = match self.inner.containers.read().get(&container) {
            Some(record) => record.snapshot(),
            None => return 0,
        };
        let _guard = DisposingGuard::enter(&self.inner.disposing, container);

        let mut disposed = 0;
        for instance in snapshot {
            if Some(instance.id()) == exclude || DisposeScope::is_disposing(instance.id()) {
                continue;
            }

            if self.dispose_instance(&instance) {
                disposed += 1;
            }

            if let Some(record) = self.inner.containers.write().get_mut(&container) {
                record.remove_if(instance.name().as_str(), instance.id());
            }
        }

        let removed = self.inner.containers.write().shift_remove(&container);
        if removed.is_some() {
            if let Some(marker) = &self.inner.config.marker_attribute {
                self.inner.dom.remove_attribute(container, marker);
            }
        }

        disposed
    }

    fn dispose_instance(&self, instance: &Instance) -> bool {
        if !instance.mark_disposed() {
            return false;
        }

        let cx = Context::new(
            self.clone(),
            instance.container(),
            instance.name().clone(),
            instance.id(),
        );
        let _scope = DisposeScope::enter(instance.id());
        instance.component().dispose(&cx);

        debug!(component = %instance.name(), container = %instance.container(), "disposed component");
        true
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string payload".to_string());
    format!("initialize panicked: {detail}")
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("selectors", &self.inner.selectors.read().len())
            .field("constructors", &self.inner.constructors.len())
            .field("tracked_containers", &self.inner.containers.read().len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::future::{BoxFuture, FutureExt};

    use crate::component::{factory, Component};
    use parking_lot::Mutex;

    use crate::component::LifecycleState;
    use crate::dom::{Attributes, MemoryDom, Query};

    struct Widget {
        disposed: Arc<AtomicUsize>,
    }

    impl Component for Widget {
        fn initialize(self: Arc<Self>, _cx: Context) -> BoxFuture<'static, std::result::Result<(), BoxError>> {
            async { Ok(()) }.boxed()
        }

        fn dispose(&self, cx: &Context) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
            cx.dispose_descendants();
        }
    }

    fn widget_registration(selector: &str, name: &str, disposed: &Arc<AtomicUsize>) -> Registration {
        let disposed = disposed.clone();
        Registration::new(
            selector,
            name,
            factory(move |_cx| Widget {
                disposed: disposed.clone(),
            }),
        )
    }

    fn setup() -> (Arc<MemoryDom>, Registry) {
        let dom = Arc::new(MemoryDom::new());
        let registry = Registry::new(dom.clone());
        (dom, registry)
    }

    #[tokio::test]
    async fn registration_is_unique_per_selector() {
        let (_dom, registry) = setup();
        let disposed = Arc::new(AtomicUsize::new(0));
        let entry = widget_registration(".widget", "Widget", &disposed);

        registry.register([entry.clone(), entry]);
        registry.register([widget_registration(".widget", "Widget", &disposed)]);

        assert_eq!(registry.constructors(".widget"), vec![ComponentName::new("Widget")]);
        assert_eq!(registry.selectors().len(), 1);
    }

    #[tokio::test]
    async fn first_constructor_wins() {
        let (_dom, registry) = setup();
        let disposed = Arc::new(AtomicUsize::new(0));
        let first = widget_registration(".a", "Widget", &disposed);
        let first_factory = first.factory.clone();

        registry.register([first, widget_registration(".b", "Widget", &disposed)]);

        let kept = registry.constructor("Widget").unwrap();
        assert!(Arc::ptr_eq(&kept, &first_factory));
        assert_eq!(registry.constructors(".b"), vec![ComponentName::new("Widget")]);
    }

    #[tokio::test]
    async fn mount_is_idempotent() {
        let (dom, registry) = setup();
        let disposed = Arc::new(AtomicUsize::new(0));
        registry.register([widget_registration(".widget", "Widget", &disposed)]);
        let el = dom.append(dom.document(), "div", &[("class", "widget")]);

        registry.mount(el, "Widget").unwrap();
        let first = registry.get_instance(el, "Widget").unwrap();
        registry.mount(el, "Widget").unwrap();

        assert_eq!(registry.instances(el).len(), 1);
        assert_eq!(registry.get_instance(el, "Widget"), Some(first));
        assert_eq!(registry.mount_document(), 0);
    }

    #[tokio::test]
    async fn mount_unknown_name_fails() {
        let (dom, registry) = setup();
        let el = dom.append(dom.document(), "div", &[]);

        let err = registry.mount(el, "Ghost").unwrap_err();
        assert!(matches!(err, MountError::MissingConstructor { ref name } if name.as_str() == "Ghost"));
        assert!(!registry.is_tracked(el));
    }

    #[tokio::test]
    async fn mount_order_follows_registration_then_document() {
        let (dom, registry) = setup();
        let disposed = Arc::new(AtomicUsize::new(0));
        registry.register([
            widget_registration(".card", "Second", &disposed),
            widget_registration(".card", "First", &disposed),
        ]);
        let a = dom.append(dom.document(), "div", &[("class", "card")]);
        let b = dom.append(dom.document(), "div", &[("class", "card")]);

        assert_eq!(registry.mount_document(), 4);
        assert_eq!(registry.tracked_containers(), vec![a, b]);

        let names: Vec<String> = registry
            .instances(a)
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        assert_eq!(names, vec!["Second", "First"]);
    }

    #[tokio::test]
    async fn marker_attribute_follows_tracking() {
        let (dom, registry) = setup();
        let disposed = Arc::new(AtomicUsize::new(0));
        registry.register([widget_registration(".widget", "Widget", &disposed)]);
        let el = dom.append(dom.document(), "div", &[("class", "widget")]);

        registry.mount_document();
        assert_eq!(dom.attribute(el, "data-tct").as_deref(), Some(""));

        registry.dispose_document();
        assert_eq!(dom.attribute(el, "data-tct"), None);
    }

    #[tokio::test]
    async fn marker_attribute_can_be_disabled() {
        let dom = Arc::new(MemoryDom::new());
        let config = RegistryConfig {
            marker_attribute: None,
            ..RegistryConfig::default()
        };
        let registry = Registry::with_config(dom.clone(), config);
        let disposed = Arc::new(AtomicUsize::new(0));
        registry.register([widget_registration(".widget", "Widget", &disposed)]);
        let el = dom.append(dom.document(), "div", &[("class", "widget")]);

        registry.mount_document();
        assert!(registry.is_tracked(el));
        assert_eq!(dom.attribute(el, "data-tct"), None);
    }

    #[tokio::test]
    async fn dispose_all_clears_everything_below_root() {
        let (dom, registry) = setup();
        let disposed = Arc::new(AtomicUsize::new(0));
        registry.register([
            widget_registration(".widget", "A", &disposed),
            widget_registration(".widget", "B", &disposed),
        ]);
        let outer = dom.append(dom.document(), "div", &[("class", "widget")]);
        let inner = dom.append(outer, "div", &[("class", "widget")]);

        assert_eq!(registry.mount_document(), 4);

        // `outer` itself is not strictly within `outer`.
        assert_eq!(registry.dispose_all(outer, None), 2);
        assert!(!registry.is_tracked(inner));
        assert!(registry.is_tracked(outer));

        assert_eq!(registry.dispose_document(), 2);
        assert!(registry.tracked_containers().is_empty());
        assert_eq!(disposed.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn dispose_untracked_root_is_noop() {
        let (dom, registry) = setup();
        let el = dom.append(dom.document(), "div", &[]);
        assert_eq!(registry.dispose_all(el, None), 0);
        assert_eq!(registry.dispose_container(el), 0);
    }

    #[tokio::test]
    async fn dispose_container_includes_own_instances() {
        let (dom, registry) = setup();
        let disposed = Arc::new(AtomicUsize::new(0));
        registry.register([widget_registration(".widget", "Widget", &disposed)]);
        let outer = dom.append(dom.document(), "div", &[("class", "widget")]);
        let inner = dom.append(outer, "div", &[("class", "widget")]);
        registry.mount_document();

        // The outer widget disposes the inner one itself.
        assert_eq!(registry.dispose_container(outer), 1);
        assert_eq!(disposed.load(Ordering::SeqCst), 2);
        assert!(!registry.is_tracked(outer));
        assert!(!registry.is_tracked(inner));
    }

    #[tokio::test]
    async fn excluded_instance_is_skipped_but_forgotten() {
        let (dom, registry) = setup();
        let disposed = Arc::new(AtomicUsize::new(0));
        registry.register([
            widget_registration(".widget", "A", &disposed),
            widget_registration(".widget", "B", &disposed),
        ]);
        let el = dom.append(dom.document(), "div", &[("class", "widget")]);
        registry.mount_document();

        let b = registry.get_instance(el, "B").unwrap();
        assert_eq!(registry.dispose_all(dom.document(), Some(b.id())), 1);

        assert!(!b.is_disposed());
        assert!(!registry.is_tracked(el));
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    /// Mounts the whole document again from its own `dispose`.
    struct Remounter;

    impl Component for Remounter {
        fn initialize(self: Arc<Self>, _cx: Context) -> BoxFuture<'static, std::result::Result<(), BoxError>> {
            async { Ok(()) }.boxed()
        }

        fn dispose(&self, cx: &Context) {
            cx.registry().mount_document();
        }
    }

    #[tokio::test]
    async fn dispose_refuses_reentrant_mounts() {
        let (dom, registry) = setup();
        let built = Arc::new(AtomicUsize::new(0));
        let disposed = Arc::new(AtomicUsize::new(0));
        {
            let built = built.clone();
            let disposed = disposed.clone();
            registry.register([Registration::new(
                ".x",
                "A",
                factory(move |_| {
                    built.fetch_add(1, Ordering::SeqCst);
                    Widget {
                        disposed: disposed.clone(),
                    }
                }),
            )]);
        }
        registry.register([Registration::new(".x", "B", factory(|_| Remounter))]);
        let el = dom.append(dom.document(), "div", &[("class", "x")]);

        assert_eq!(registry.mount_document(), 2);
        assert_eq!(registry.dispose_document(), 2);

        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert!(!registry.is_tracked(el));
        assert!(registry.instances(el).is_empty());

        // Mounting works again once disposal is over.
        assert_eq!(registry.mount_document(), 2);
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    struct Logged {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Component for Logged {
        fn initialize(self: Arc<Self>, _cx: Context) -> BoxFuture<'static, std::result::Result<(), BoxError>> {
            async { Ok(()) }.boxed()
        }

        fn dispose(&self, cx: &Context) {
            self.log.lock().push(self.name);
            cx.dispose_descendants();
        }
    }

    #[tokio::test]
    async fn dispose_follows_document_order() {
        let (dom, registry) = setup();
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::default();
        for (selector, name) in [(".outer", "Outer"), (".inner", "Inner")] {
            let log = log.clone();
            registry.register([Registration::new(
                selector,
                name,
                factory(move |_| Logged {
                    name,
                    log: log.clone(),
                }),
            )]);
        }
        let outer = dom.append(dom.document(), "div", &[("class", "outer")]);
        let inner = dom.append(outer, "div", &[("class", "inner")]);

        // The inner fragment is mounted first.
        registry.mount_all(outer);
        registry.mount_document();
        assert_eq!(registry.tracked_containers(), vec![inner, outer]);

        registry.dispose_document();
        assert_eq!(*log.lock(), vec!["Outer", "Inner"]);
        assert!(registry.tracked_containers().is_empty());
    }

    fn explode() -> std::result::Result<(), BoxError> {
        panic!("boom")
    }

    struct Panicky;

    impl Component for Panicky {
        fn initialize(self: Arc<Self>, _cx: Context) -> BoxFuture<'static, std::result::Result<(), BoxError>> {
            async { explode() }.boxed()
        }
    }

    #[tokio::test]
    async fn panicking_initialize_is_a_failure() {
        let (dom, registry) = setup();
        registry.register([Registration::new(".p", "Panicky", factory(|_| Panicky))]);
        let el = dom.append(dom.document(), "div", &[("class", "p")]);
        registry.mount_document();

        let err = registry
            .await_mounted_within(el, "Panicky", std::time::Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            MountError::InitializationFailure { source, .. } => {
                assert!(source.to_string().contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let instance = registry.get_instance(el, "Panicky").unwrap();
        assert!(matches!(instance.state(), LifecycleState::Failed(_)));
    }

    #[test]
    fn try_new_requires_a_runtime() {
        let err = Registry::try_new(Arc::new(MemoryDom::new())).unwrap_err();
        assert!(matches!(err, MountError::NoRuntime));
    }

    #[tokio::test]
    async fn try_new_inside_a_runtime() {
        let registry = Registry::try_new(Arc::new(MemoryDom::new())).unwrap();
        assert!(registry.tracked_containers().is_empty());
    }
}
