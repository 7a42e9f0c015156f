//! Dynamic Registration Watcher
//!
//! Bridges a [`ModuleSource`] into the registry. Component code that loads
//! late (lazy bundles, deferred scripts) is registered as soon as it
//! arrives and mounted on every matching container already in the document.
//!
//! # States
//!
//! - **Idle**: created, not yet subscribed.
//! - **Watching**: `start` snapshots everything the source already has,
//!   registers and mounts each entry, and subscribes to later arrivals.
//!
//! There is no terminal state. The source keeps the watcher's listener for
//! the lifetime of the page.
//!
//! # Partial Modules
//!
//! An arrival whose module does not (yet) expose the named export is
//! treated as not ready and skipped. [`Watcher::accept`] reports it as
//! [`MountError::MissingConstructor`]; the listener path only logs it.

mod descriptor;
mod source;

pub use descriptor::{scan_script_tags, ComponentDescriptor, COMPONENT_ATTRIBUTE, SELECTOR_ATTRIBUTE};
pub use source::{Arrival, ArrivalListener, Module, ModuleHost, ModuleSource};

use std::fmt;
use std::sync::Arc;

use futures_util::stream::{Stream, StreamExt};
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::component::ComponentName;
use crate::error::{MountError, Result};
use crate::registry::{Registration, Registry, Selector};

/// Lifecycle of a [`Watcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Watching,
}

struct WatcherInner {
    registry: Registry,
    /// Declared selectors by component name. Later declarations override.
    descriptors: RwLock<IndexMap<ComponentName, Selector>>,
    state: RwLock<WatcherState>,
}

impl WatcherInner {
    fn selector_for(&self, name: &ComponentName) -> Selector {
        self.descriptors
            .read()
            .get(name.as_str())
            .cloned()
            .unwrap_or_else(|| Selector::for_component(name))
    }

    fn accept(&self, arrival: &Arrival) -> Result<usize> {
        let factory = arrival
            .module
            .export(arrival.name.as_str())
            .ok_or_else(|| MountError::MissingConstructor {
                name: arrival.name.clone(),
            })?;

        let selector = self.selector_for(&arrival.name);
        self.registry.register([Registration::new(
            selector.clone(),
            arrival.name.clone(),
            factory,
        )]);

        // Containers may predate the constructor, so search the whole
        // document, but only for this selector.
        let document = self.registry.document();
        let mounted = self
            .registry
            .mount_selector(document, &selector, &arrival.name);

        debug!(component = %arrival.name, %selector, mounted, "accepted component arrival");
        Ok(mounted)
    }

    fn handle(&self, arrival: &Arrival) -> usize {
        match self.accept(arrival) {
            Ok(mounted) => mounted,
            Err(err) => {
                debug!(
                    component = %arrival.name,
                    exports = ?arrival.module.export_names(),
                    error = %err,
                    "skipping arrival that is not ready"
                );
                0
            }
        }
    }
}

/// Registers and mounts components as their constructors become available.
#[derive(Clone)]
pub struct Watcher {
    inner: Arc<WatcherInner>,
}

impl Watcher {
    /// Create an idle watcher with no declared selectors.
    pub fn new(registry: Registry) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                registry,
                descriptors: RwLock::new(IndexMap::new()),
                state: RwLock::new(WatcherState::Idle),
            }),
        }
    }

    /// Create an idle watcher whose selectors come from the page's script
    /// tags (`RegistryConfig::script_selector`).
    pub fn from_script_tags(registry: Registry) -> Self {
        let descriptors = scan_script_tags(
            registry.dom().as_ref(),
            &registry.config().script_selector,
        );
        let watcher = Self::new(registry);
        watcher.describe_all(descriptors);
        watcher
    }

    /// Declare where a component mounts.
    pub fn describe(&self, descriptor: ComponentDescriptor) {
        let selector = descriptor.resolved_selector();
        self.inner
            .descriptors
            .write()
            .insert(descriptor.name, selector);
    }

    pub fn describe_all<I>(&self, descriptors: I)
    where
        I: IntoIterator<Item = ComponentDescriptor>,
    {
        for descriptor in descriptors {
            self.describe(descriptor);
        }
    }

    /// The selector a component will be registered under.
    pub fn selector_for(&self, name: &ComponentName) -> Selector {
        self.inner.selector_for(name)
    }

    pub fn state(&self) -> WatcherState {
        *self.inner.state.read()
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Move from `Idle` to `Watching`.
    ///
    /// Registers and mounts everything `source` already has, then handles
    /// each later arrival as it comes. Returns the number of instances
    /// mounted from the snapshot. Calling `start` again is a no-op.
    pub fn start(&self, source: &dyn ModuleSource) -> usize {
        {
            let mut state = self.inner.state.write();
            if *state == WatcherState::Watching {
                return 0;
            }
            *state = WatcherState::Watching;
        }

        // Subscribe before taking the snapshot so nothing defined in between
        // is missed. Handling an arrival twice is harmless.
        let inner = self.inner.clone();
        source.on_arrival(Arc::new(move |arrival: &Arrival| {
            inner.handle(arrival);
        }));

        let mounted = source
            .available()
            .iter()
            .map(|arrival| self.inner.handle(arrival))
            .sum();

        debug!(mounted, "watching for component arrivals");
        mounted
    }

    /// Register and mount one arrival.
    ///
    /// Fails with [`MountError::MissingConstructor`] when the module does not
    /// expose the named export yet.
    pub fn accept(&self, arrival: &Arrival) -> Result<usize> {
        self.inner.accept(arrival)
    }

    /// Handle arrivals from an async stream until it ends. Each item may be
    /// produced after awaiting the module's own loading.
    ///
    /// Returns the number of instances mounted.
    pub async fn watch_stream<S>(&self, arrivals: S) -> usize
    where
        S: Stream<Item = Arrival>,
    {
        futures_util::pin_mut!(arrivals);

        let mut mounted = 0;
        while let Some(arrival) = arrivals.next().await {
            mounted += self.inner.handle(&arrival);
        }
        mounted
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("state", &self.state())
            .field("descriptors", &self.inner.descriptors.read().len())
            .finish()
    }
}

impl Registry {
    /// Start a watcher over `source`, with selectors declared by the page's
    /// script tags.
    pub fn watch(&self, source: &dyn ModuleSource) -> Watcher {
        let watcher = Watcher::from_script_tags(self.clone());
        watcher.start(source);
        watcher
    }
}
