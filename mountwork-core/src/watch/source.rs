//! Module Sources
//!
//! A [`ModuleSource`] tells the watcher which component constructors exist
//! now and which arrive later. Arrival is an explicit subscription: the
//! source calls every registered listener when a module is defined.
//!
//! [`ModuleHost`] is the in-process source. Late-loading bundles call
//! [`ModuleHost::define`] once their code has been evaluated.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::component::{ComponentFactory, ComponentName};
use crate::dom::ListenerId;

/// The named exports of a loaded module.
#[derive(Clone, Default)]
pub struct Module {
    exports: IndexMap<ComponentName, ComponentFactory>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named export.
    pub fn with_export(mut self, name: impl Into<ComponentName>, factory: ComponentFactory) -> Self {
        self.exports.insert(name.into(), factory);
        self
    }

    /// The constructor exported as `name`, if the module exposes it yet.
    pub fn export(&self, name: &str) -> Option<ComponentFactory> {
        self.exports.get(name).cloned()
    }

    pub fn export_names(&self) -> Vec<ComponentName> {
        self.exports.keys().cloned().collect()
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("exports", &self.exports.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// "Constructor `name` became available in `module`."
#[derive(Clone, Debug)]
pub struct Arrival {
    pub name: ComponentName,
    pub module: Module,
}

impl Arrival {
    pub fn new(name: impl Into<ComponentName>, module: Module) -> Self {
        Self {
            name: name.into(),
            module,
        }
    }
}

/// Callback invoked for each arrival.
pub type ArrivalListener = Arc<dyn Fn(&Arrival) + Send + Sync>;

/// Push-based source of component constructors.
pub trait ModuleSource: Send + Sync {
    /// Everything defined so far, in definition order.
    fn available(&self) -> Vec<Arrival>;

    /// Call `listener` for every later arrival.
    fn on_arrival(&self, listener: ArrivalListener) -> ListenerId;

    /// Stop calling a listener. Unknown IDs are ignored.
    fn off_arrival(&self, id: ListenerId);
}

/// In-process module namespace.
#[derive(Default)]
pub struct ModuleHost {
    modules: RwLock<IndexMap<ComponentName, Module>>,
    listeners: RwLock<Vec<(ListenerId, ArrivalListener)>>,
}

impl ModuleHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or redefine) the module registered under `name` and notify
    /// listeners.
    pub fn define(&self, name: impl Into<ComponentName>, module: Module) {
        let arrival = Arrival::new(name, module);
        self.modules
            .write()
            .insert(arrival.name.clone(), arrival.module.clone());

        // Snapshot so listeners can define further modules.
        let listeners: Vec<ArrivalListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&arrival);
        }
    }

    /// Shorthand for a module exporting a single constructor under `name`.
    pub fn define_component(&self, name: impl Into<ComponentName>, factory: ComponentFactory) {
        let name = name.into();
        let module = Module::new().with_export(name.clone(), factory);
        self.define(name, module);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl ModuleSource for ModuleHost {
    fn available(&self) -> Vec<Arrival> {
        self.modules
            .read()
            .iter()
            .map(|(name, module)| Arrival::new(name.clone(), module.clone()))
            .collect()
    }

    fn on_arrival(&self, listener: ArrivalListener) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.write().push((id, listener));
        id
    }

    fn off_arrival(&self, id: ListenerId) {
        self.listeners.write().retain(|(existing, _)| *existing != id);
    }
}
