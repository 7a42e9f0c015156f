//! Integration Tests for the Component Lifecycle
//!
//! These tests drive the registry, rendezvous and watcher together over an
//! in-memory DOM.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};

use mountwork_core::dom::Query;
use mountwork_core::error::BoxError;
use mountwork_core::watch::ComponentDescriptor;
use mountwork_core::{
    factory, Component, Context, LifecycleState, MemoryDom, ModuleHost, MountError, Registration,
    Registry, Watcher,
};

/// Counts initializations and disposals.
#[derive(Default)]
struct Counters {
    initialized: AtomicUsize,
    disposed: AtomicUsize,
}

struct Widget {
    counters: Arc<Counters>,
}

impl Component for Widget {
    fn initialize(self: Arc<Self>, _cx: Context) -> BoxFuture<'static, Result<(), BoxError>> {
        async move {
            self.counters.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }

    fn dispose(&self, cx: &Context) {
        self.counters.disposed.fetch_add(1, Ordering::SeqCst);
        cx.dispose_descendants();
    }
}

fn widget(selector: &str, name: &str, counters: &Arc<Counters>) -> Registration {
    let counters = counters.clone();
    Registration::new(
        selector,
        name,
        factory(move |_| Widget {
            counters: counters.clone(),
        }),
    )
}

fn setup() -> (Arc<MemoryDom>, Registry) {
    let dom = Arc::new(MemoryDom::new());
    let registry = Registry::new(dom.clone());
    (dom, registry)
}

/// Test that every matching element gets its own instance.
#[tokio::test]
async fn mount_all_creates_one_instance_per_element() {
    let (dom, registry) = setup();
    let counters = Arc::new(Counters::default());
    registry.register([widget(".widget", "Widget", &counters)]);

    let first = dom.append(dom.document(), "div", &[("class", "widget")]);
    let section = dom.append(dom.document(), "section", &[]);
    let second = dom.append(section, "div", &[("class", "widget")]);

    assert_eq!(registry.mount_all(dom.document()), 2);

    let a = registry.get_instance(first, "Widget").unwrap();
    let b = registry.get_instance(second, "Widget").unwrap();
    assert_ne!(a, b);
    assert_eq!(a.container(), first);
    assert_eq!(b.container(), second);

    registry.await_mounted(first, "Widget").await.unwrap();
    registry.await_mounted(second, "Widget").await.unwrap();
    assert_eq!(counters.initialized.load(Ordering::SeqCst), 2);
}

/// Test that mounting twice never creates a second instance or a second
/// initialization.
#[tokio::test]
async fn repeated_mount_all_is_idempotent() {
    let (dom, registry) = setup();
    let counters = Arc::new(Counters::default());
    registry.register([widget(".widget", "Widget", &counters)]);
    let el = dom.append(dom.document(), "div", &[("class", "widget")]);

    registry.mount_document();
    let instance = registry.await_mounted(el, "Widget").await.unwrap();

    assert_eq!(registry.mount_document(), 0);
    registry.mount(el, "Widget").unwrap();

    assert_eq!(registry.get_instance(el, "Widget"), Some(instance));
    assert_eq!(counters.initialized.load(Ordering::SeqCst), 1);
}

/// Test that content inserted later is mounted by a scoped `mount_all`
/// without touching the rest of the page.
#[tokio::test]
async fn mount_all_on_inserted_fragment() {
    let (dom, registry) = setup();
    let counters = Arc::new(Counters::default());
    registry.register([widget(".widget", "Widget", &counters)]);

    let existing = dom.append(dom.document(), "div", &[("class", "widget")]);
    let fragment = dom.append(dom.document(), "div", &[]);
    let inserted = dom.append(fragment, "div", &[("class", "widget")]);

    assert_eq!(registry.mount_all(fragment), 1);
    assert!(registry.get_instance(inserted, "Widget").is_some());
    assert!(registry.get_instance(existing, "Widget").is_none());
}

/// Test that disposing a root leaves nothing tracked below it, even when
/// components nest.
#[tokio::test]
async fn dispose_all_leaves_nothing_tracked() {
    let (dom, registry) = setup();
    let counters = Arc::new(Counters::default());
    registry.register([
        widget(".panel", "Panel", &counters),
        widget(".widget", "Widget", &counters),
    ]);

    let panel = dom.append(dom.document(), "div", &[("class", "panel")]);
    let inner = dom.append(panel, "div", &[("class", "widget")]);
    let deeper = dom.append(inner, "div", &[("class", "widget panel")]);

    assert_eq!(registry.mount_document(), 4);

    // The outer panel disposes the rest from its own `dispose`.
    registry.dispose_document();

    for container in [panel, inner, deeper] {
        assert!(!registry.is_tracked(container));
        assert!(registry.instances(container).is_empty());
    }
    assert_eq!(counters.disposed.load(Ordering::SeqCst), 4);
}

/// Disposes its container subtree from inside its own `dispose`.
struct Sweeper {
    disposed: Arc<AtomicUsize>,
}

impl Component for Sweeper {
    fn initialize(self: Arc<Self>, _cx: Context) -> BoxFuture<'static, Result<(), BoxError>> {
        async { Ok(()) }.boxed()
    }

    fn dispose(&self, cx: &Context) {
        let registry = cx.registry();
        registry.dispose_all(registry.document(), Some(cx.instance_id()));
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Test that an instance driving a `dispose_all` over its own container
/// disposes its sibling but never itself.
#[tokio::test]
async fn active_disposer_is_excluded() {
    let (dom, registry) = setup();
    let counters = Arc::new(Counters::default());
    let sweeper_disposed = Arc::new(AtomicUsize::new(0));
    {
        let sweeper_disposed = sweeper_disposed.clone();
        registry.register([Registration::new(
            ".pair",
            "B",
            factory(move |_| Sweeper {
                disposed: sweeper_disposed.clone(),
            }),
        )]);
    }
    registry.register([widget(".pair", "A", &counters)]);

    let el = dom.append(dom.document(), "div", &[("class", "pair")]);
    registry.mount_document();
    let a = registry.get_instance(el, "A").unwrap();
    let b = registry.get_instance(el, "B").unwrap();

    // B is disposed first and sweeps the document while A is still live.
    registry.dispose_document();

    assert_eq!(counters.disposed.load(Ordering::SeqCst), 1);
    assert_eq!(sweeper_disposed.load(Ordering::SeqCst), 1);
    assert!(a.is_disposed());
    assert!(b.is_disposed());
    assert!(!registry.is_tracked(el));
}

/// Test that waiting before and after the mount yields the same instance.
#[tokio::test]
async fn readiness_is_observed_regardless_of_timing() {
    let (dom, registry) = setup();
    let counters = Arc::new(Counters::default());
    registry.register([widget(".widget", "Widget", &counters)]);
    let el = dom.append(dom.document(), "div", &[("class", "widget")]);

    let early = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.await_mounted(el, "Widget").await })
    };
    tokio::task::yield_now().await;

    registry.mount_document();
    let early = early.await.unwrap().unwrap();
    let late = registry.await_mounted(el, "Widget").await.unwrap();

    assert_eq!(early, late);
    assert!(early.downcast_ref::<Widget>().is_some());
}

/// Test that waiting on a component that never mounts fails after the
/// requested timeout, not before.
#[tokio::test(start_paused = true)]
async fn await_mounted_times_out() {
    let (dom, registry) = setup();
    let el = dom.append(dom.document(), "div", &[]);

    let started = tokio::time::Instant::now();
    let err = registry
        .await_mounted_within(el, "Widget", Duration::from_millis(50))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, MountError::Timeout { .. }));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(300));
    assert_eq!(dom.listener_count(el, "mounted-Widget"), 0);
}

/// Test the late-loading flow: containers exist first, the constructor
/// arrives afterwards and mounts on all of them.
#[tokio::test]
async fn watcher_mounts_lazy_component_on_existing_elements() {
    let (dom, registry) = setup();
    let counters = Arc::new(Counters::default());
    registry.register([widget(".widget", "Widget", &counters)]);
    let unrelated = dom.append(dom.document(), "div", &[("class", "widget")]);

    let host = ModuleHost::new();
    let watcher = Watcher::new(registry.clone());
    watcher.describe(ComponentDescriptor::new("Lazy").with_selector(".lazy"));
    watcher.start(&host);

    let first = dom.append(dom.document(), "div", &[("class", "lazy")]);
    let second = dom.append(dom.document(), "div", &[("class", "lazy")]);

    let lazy_counters = counters.clone();
    host.define_component(
        "Lazy",
        factory(move |_| Widget {
            counters: lazy_counters.clone(),
        }),
    );

    registry.await_mounted(first, "Lazy").await.unwrap();
    registry.await_mounted(second, "Lazy").await.unwrap();

    // Other selectors were not rescanned.
    assert!(registry.get_instance(unrelated, "Widget").is_none());
}

struct Unfinished;

impl Component for Unfinished {}

/// Test that a component without `initialize` fails alone and reports
/// which type is missing it.
#[tokio::test]
async fn unimplemented_initialize_is_isolated() {
    let (dom, registry) = setup();
    let counters = Arc::new(Counters::default());
    registry.register([
        Registration::new(".widget", "Unfinished", factory(|_| Unfinished)),
        widget(".widget", "Widget", &counters),
    ]);
    let el = dom.append(dom.document(), "div", &[("class", "widget")]);

    assert_eq!(registry.mount_document(), 2);

    let ready = registry.await_mounted(el, "Widget").await.unwrap();
    assert!(ready.is_ready());

    let err = registry.await_mounted(el, "Unfinished").await.unwrap_err();
    match err {
        MountError::NotImplemented { component } => assert!(component.contains("Unfinished")),
        other => panic!("unexpected error: {other}"),
    }

    // The failed instance stays tracked until disposed.
    let failed = registry.get_instance(el, "Unfinished").unwrap();
    assert!(matches!(failed.state(), LifecycleState::Failed(_)));
    assert_eq!(registry.dispose_document(), 2);
}
