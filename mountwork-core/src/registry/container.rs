//! Container Records
//!
//! Bookkeeping for one tracked container: which component names have a live
//! instance on it. The registry keeps these in a side table keyed by
//! [`ElementId`](crate::dom::ElementId), so no flags are stored on the element
//! itself.

use indexmap::IndexMap;

use crate::component::{ComponentName, Instance, InstanceId};

/// Instance table of a tracked container.
///
/// Holds at most one instance per component name. Iteration follows mount
/// order.
#[derive(Debug, Default, Clone)]
pub struct ContainerRecord {
    instances: IndexMap<ComponentName, Instance>,
}

impl ContainerRecord {
    /// The instance of `name` on this container.
    pub fn get(&self, name: &str) -> Option<&Instance> {
        self.instances.get(name)
    }

    /// Record `instance` unless its name is already taken.
    ///
    /// Returns `false` (and drops nothing from the table) when occupied.
    pub fn insert_if_vacant(&mut self, instance: Instance) -> bool {
        match self.instances.entry(instance.name().clone()) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(instance);
                true
            }
        }
    }

    /// Remove the entry for `name` if it still holds instance `id`.
    pub fn remove_if(&mut self, name: &str, id: InstanceId) -> Option<Instance> {
        if self.instances.get(name).map(Instance::id) == Some(id) {
            self.instances.shift_remove(name)
        } else {
            None
        }
    }

    /// Clone the live instances, in mount order.
    pub fn snapshot(&self) -> Vec<Instance> {
        self.instances.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
