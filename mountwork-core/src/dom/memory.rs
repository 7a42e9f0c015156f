//! In-Memory Document
//!
//! `MemoryDom` is a headless element tree implementing every DOM capability
//! the registry uses. It backs the test suite and benches, and lets page
//! bootstraps run outside a browser.
//!
//! # Structure
//!
//! Elements live in a single table indexed by [`ElementId`]. Each element
//! knows its parent and its ordered children, so document order is a
//! pre-order walk from the root. Event listeners live in a separate
//! concurrent table keyed by `(element, event name)`.
//!
//! Listeners are cloned out of the table before they run, so a listener may
//! freely subscribe, unsubscribe or dispatch again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::warn;

use super::selector::SelectorList;
use super::{Attributes, ElementId, Event, EventChannel, Listener, ListenerId, Query};

/// Tag name of the document root.
const DOCUMENT_TAG: &str = "#document";

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    attributes: IndexMap<String, String>,
}

impl ElementData {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            parent: None,
            children: Vec::new(),
            attributes: IndexMap::new(),
        }
    }
}

/// An in-process element tree.
///
/// # Example
///
/// ```rust,ignore
/// let dom = MemoryDom::new();
/// let body = dom.append(dom.document(), "body", &[]);
/// let card = dom.append(body, "div", &[("class", "widget")]);
///
/// assert_eq!(dom.query_all(dom.document(), ".widget"), vec![card]);
/// ```
pub struct MemoryDom {
    document: ElementId,
    next_id: AtomicU64,
    elements: RwLock<HashMap<ElementId, ElementData>>,
    listeners: DashMap<(ElementId, String), Vec<(ListenerId, Listener)>>,
}

impl MemoryDom {
    /// Create a document containing only its root.
    pub fn new() -> Self {
        let document = ElementId::from(0);
        let mut elements = HashMap::new();
        elements.insert(document, ElementData::new(DOCUMENT_TAG));

        Self {
            document,
            next_id: AtomicU64::new(1),
            elements: RwLock::new(elements),
            listeners: DashMap::new(),
        }
    }

    /// Create a detached element.
    pub fn create_element(&self, tag: &str, attributes: &[(&str, &str)]) -> ElementId {
        let id = ElementId::from(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut data = ElementData::new(tag);
        for (name, value) in attributes {
            data.attributes.insert(name.to_string(), value.to_string());
        }
        self.elements.write().insert(id, data);
        id
    }

    /// Attach `child` as the last child of `parent`, detaching it from any
    /// previous parent first.
    ///
    /// Returns `false` if either element is unknown or if attaching would
    /// create a cycle.
    pub fn append_child(&self, parent: ElementId, child: ElementId) -> bool {
        if parent == child || self.is_descendant(child, parent) {
            return false;
        }

        let mut elements = self.elements.write();
        if !elements.contains_key(&parent) || !elements.contains_key(&child) {
            return false;
        }

        Self::detach_locked(&mut elements, child);

        if let Some(data) = elements.get_mut(&child) {
            data.parent = Some(parent);
        }
        if let Some(data) = elements.get_mut(&parent) {
            data.children.push(child);
        }
        true
    }

    /// Create an element and append it to `parent`.
    pub fn append(&self, parent: ElementId, tag: &str, attributes: &[(&str, &str)]) -> ElementId {
        let id = self.create_element(tag, attributes);
        self.append_child(parent, id);
        id
    }

    /// Detach an element (and its subtree) from its parent.
    ///
    /// The subtree keeps its own structure and listeners and can be
    /// re-attached later.
    pub fn remove(&self, element: ElementId) {
        let mut elements = self.elements.write();
        Self::detach_locked(&mut elements, element);
    }

    fn detach_locked(elements: &mut HashMap<ElementId, ElementData>, element: ElementId) {
        let parent = elements.get_mut(&element).and_then(|data| data.parent.take());
        if let Some(parent) = parent {
            if let Some(data) = elements.get_mut(&parent) {
                data.children.retain(|c| *c != element);
            }
        }
    }

    /// Parent of an element, if attached.
    pub fn parent(&self, element: ElementId) -> Option<ElementId> {
        self.elements.read().get(&element).and_then(|data| data.parent)
    }

    /// Children of an element, in document order.
    pub fn children(&self, element: ElementId) -> Vec<ElementId> {
        self.elements
            .read()
            .get(&element)
            .map(|data| data.children.clone())
            .unwrap_or_default()
    }

    /// Tag name of an element.
    pub fn tag(&self, element: ElementId) -> Option<String> {
        self.elements.read().get(&element).map(|data| data.tag.clone())
    }

    /// Number of listeners subscribed to `name` on `target`.
    pub fn listener_count(&self, target: ElementId, name: &str) -> usize {
        self.listeners
            .get(&(target, name.to_string()))
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    /// Total element count, including the document root.
    pub fn len(&self) -> usize {
        self.elements.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl Query for MemoryDom {
    fn document(&self) -> ElementId {
        self.document
    }

    fn query_all(&self, root: ElementId, selector: &str) -> Vec<ElementId> {
        let selector_list = match SelectorList::parse(selector) {
            Ok(list) => list,
            Err(err) => {
                warn!(selector, error = %err, "ignoring unsupported selector");
                return Vec::new();
            }
        };

        let elements = self.elements.read();
        let mut matches = Vec::new();

        // Pre-order walk; children pushed in reverse so they pop in order.
        let mut stack: Vec<ElementId> = elements
            .get(&root)
            .map(|data| data.children.iter().rev().copied().collect())
            .unwrap_or_default();

        while let Some(id) = stack.pop() {
            if let Some(data) = elements.get(&id) {
                if selector_list.matches(&data.tag, &data.attributes) {
                    matches.push(id);
                }
                stack.extend(data.children.iter().rev().copied());
            }
        }

        matches
    }

    fn is_descendant(&self, ancestor: ElementId, node: ElementId) -> bool {
        let elements = self.elements.read();
        let mut current = elements.get(&node).and_then(|data| data.parent);

        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = elements.get(&id).and_then(|data| data.parent);
        }

        false
    }
}

impl Attributes for MemoryDom {
    fn attribute(&self, element: ElementId, name: &str) -> Option<String> {
        self.elements
            .read()
            .get(&element)
            .and_then(|data| data.attributes.get(name).cloned())
    }

    fn set_attribute(&self, element: ElementId, name: &str, value: &str) {
        if let Some(data) = self.elements.write().get_mut(&element) {
            data.attributes.insert(name.to_string(), value.to_string());
        }
    }

    fn remove_attribute(&self, element: ElementId, name: &str) {
        if let Some(data) = self.elements.write().get_mut(&element) {
            data.attributes.shift_remove(name);
        }
    }
}

impl EventChannel for MemoryDom {
    fn dispatch(&self, target: ElementId, event: &Event) {
        // Snapshot so listeners can re-enter the channel.
        let listeners: Vec<Listener> = match self.listeners.get(&(target, event.name().to_string())) {
            Some(entry) => entry.iter().map(|(_, listener)| listener.clone()).collect(),
            None => return,
        };

        for listener in listeners {
            listener(event);
        }
    }

    fn subscribe(&self, target: ElementId, name: &str, listener: Listener) -> ListenerId {
        let id = ListenerId::new();
        self.listeners
            .entry((target, name.to_string()))
            .or_default()
            .push((id, listener));
        id
    }

    fn unsubscribe(&self, target: ElementId, name: &str, id: ListenerId) {
        let key = (target, name.to_string());
        let now_empty = match self.listeners.get_mut(&key) {
            Some(mut entry) => {
                entry.retain(|(existing, _)| *existing != id);
                entry.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.listeners.remove_if(&key, |_, entry| entry.is_empty());
        }
    }
}
