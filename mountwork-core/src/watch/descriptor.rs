//! Component Descriptors
//!
//! A descriptor declares that a component exists and where it mounts. Pages
//! usually declare them on the script tags that load the component code:
//!
//! ```html
//! <script src="gallery.js" data-component="Gallery" data-selector=".js-gallery"></script>
//! ```
//!
//! `data-selector` is optional; the default selector is `.{name}`.

use serde::{Deserialize, Serialize};

use crate::component::ComponentName;
use crate::dom::Dom;
use crate::error::Result;
use crate::registry::Selector;

/// Attribute naming the component on a script tag.
pub const COMPONENT_ATTRIBUTE: &str = "data-component";

/// Attribute overriding the selector on a script tag.
pub const SELECTOR_ATTRIBUTE: &str = "data-selector";

/// Declared name and (optional) selector of a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub name: ComponentName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,
}

impl ComponentDescriptor {
    pub fn new(name: impl Into<ComponentName>) -> Self {
        Self {
            name: name.into(),
            selector: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<Selector>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// The declared selector, or `.{name}`.
    pub fn resolved_selector(&self) -> Selector {
        self.selector
            .clone()
            .unwrap_or_else(|| Selector::for_component(&self.name))
    }

    /// Parse a JSON array of descriptors.
    pub fn list_from_json(json: &str) -> Result<Vec<Self>> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Read descriptors from every element matching `selector`.
///
/// Elements without a non-empty `data-component` are skipped. An empty
/// `data-selector` counts as absent.
pub fn scan_script_tags(dom: &dyn Dom, selector: &str) -> Vec<ComponentDescriptor> {
    dom.query_all(dom.document(), selector)
        .into_iter()
        .filter_map(|tag| {
            let name = dom.attribute(tag, COMPONENT_ATTRIBUTE)?;
            if name.is_empty() {
                return None;
            }

            let descriptor = ComponentDescriptor::new(name);
            Some(match dom.attribute(tag, SELECTOR_ATTRIBUTE) {
                Some(selector) if !selector.is_empty() => descriptor.with_selector(selector),
                _ => descriptor,
            })
        })
        .collect()
}
