//! Mountwork Core
//!
//! This crate provides the component lifecycle layer for server-rendered
//! pages. Markup declares where behavior goes (a class, an attribute), and
//! the registry attaches component instances to matching elements.
//! It implements:
//!
//! - Selector-driven registration of component constructors
//! - Mounting and disposal of instances over subtrees
//! - A readiness rendezvous with a timeout
//! - A watcher that registers components whose code loads late
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `dom`: Element tree, attribute and event traits, plus an in-memory DOM
//! - `component`: The component trait, instances and their lifecycle
//! - `registry`: Selector and constructor tables, mount/dispose
//! - `rendezvous`: Waiting for a component to become ready
//! - `watch`: Dynamic registration from late-loading modules
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mountwork_core::{factory, Component, MemoryDom, Registration, Registry};
//!
//! struct Carousel;
//! impl Component for Carousel { /* initialize, dispose */ }
//!
//! let dom = Arc::new(MemoryDom::new());
//! let slide = dom.append(dom.document(), "div", &[("class", "carousel")]);
//!
//! let registry = Registry::new(dom.clone());
//! registry.register([Registration::new(".carousel", "Carousel", factory(|_| Carousel))]);
//! registry.mount_document();
//!
//! let carousel = registry.await_mounted(slide, "Carousel").await?;
//! ```

pub mod component;
pub mod config;
pub mod dom;
pub mod error;
pub mod registry;
pub mod rendezvous;
pub mod watch;

pub use component::{
    factory, Component, ComponentFactory, ComponentName, Context, Instance, InstanceId,
    LifecycleState,
};
pub use config::RegistryConfig;
pub use dom::{Dom, ElementId, Event, MemoryDom};
pub use error::{MountError, Result};
pub use registry::{Registration, Registry, Selector};
pub use watch::{ComponentDescriptor, ModuleHost, ModuleSource, Watcher};
