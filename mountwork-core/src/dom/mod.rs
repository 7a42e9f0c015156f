//! DOM Capabilities
//!
//! The registry never touches a concrete DOM. It talks to the page through
//! three narrow capabilities:
//!
//! - [`Query`]: find candidate containers below a root, in document order.
//! - [`Attributes`]: per-element key/value storage (used for the optional
//!   tracked-container marker and for reading script-tag descriptors).
//! - [`EventChannel`]: per-element named events with a payload, used for
//!   readiness signals.
//!
//! [`Dom`] bundles all three. A browser binding implements them over the real
//! document; [`MemoryDom`] implements them over an in-process tree.
//!
//! # Element Handles
//!
//! Elements are addressed by opaque [`ElementId`] handles. The registry keys
//! its bookkeeping by these handles instead of storing flags on the element.

mod memory;
mod selector;

pub use memory::MemoryDom;
pub use selector::{SelectorList, SelectorParseError};

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque handle to an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    /// Get the raw handle value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ElementId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

/// Identifier of a subscribed event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload carried by an event.
pub type EventDetail = Arc<dyn Any + Send + Sync>;

/// Callback invoked when a subscribed event is dispatched.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// A named event with an optional payload.
#[derive(Clone)]
pub struct Event {
    name: String,
    detail: Option<EventDetail>,
}

impl Event {
    /// Create an event without a payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detail: None,
        }
    }

    /// Create an event carrying `detail`.
    pub fn with_detail<T: Any + Send + Sync>(name: impl Into<String>, detail: T) -> Self {
        Self {
            name: name.into(),
            detail: Some(Arc::new(detail)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn detail(&self) -> Option<&EventDetail> {
        self.detail.as_ref()
    }

    /// Borrow the payload as a concrete type.
    pub fn detail_as<T: Any>(&self) -> Option<&T> {
        self.detail.as_deref().and_then(|d| d.downcast_ref::<T>())
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("has_detail", &self.detail.is_some())
            .finish()
    }
}

/// Element lookup.
pub trait Query: Send + Sync {
    /// The document root.
    fn document(&self) -> ElementId;

    /// All elements strictly below `root` matching `selector`, in document
    /// order. `root` itself is never returned.
    fn query_all(&self, root: ElementId, selector: &str) -> Vec<ElementId>;

    /// Whether `node` is strictly below `ancestor`.
    fn is_descendant(&self, ancestor: ElementId, node: ElementId) -> bool;
}

/// Per-element attribute storage.
pub trait Attributes: Send + Sync {
    fn attribute(&self, element: ElementId, name: &str) -> Option<String>;

    fn set_attribute(&self, element: ElementId, name: &str, value: &str);

    fn remove_attribute(&self, element: ElementId, name: &str);
}

/// Per-element publish/subscribe.
pub trait EventChannel: Send + Sync {
    /// Deliver `event` to every listener subscribed to its name on `target`.
    fn dispatch(&self, target: ElementId, event: &Event);

    /// Subscribe `listener` to events named `name` on `target`.
    fn subscribe(&self, target: ElementId, name: &str, listener: Listener) -> ListenerId;

    /// Remove a listener. Unknown IDs are ignored.
    fn unsubscribe(&self, target: ElementId, name: &str, id: ListenerId);
}

/// Everything the registry needs from a document.
pub trait Dom: Query + Attributes + EventChannel + 'static {}

impl<T> Dom for T where T: Query + Attributes + EventChannel + 'static {}
