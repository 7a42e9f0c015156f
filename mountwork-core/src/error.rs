//! Lifecycle Errors
//!
//! Every failure the registry can surface is a [`MountError`]. Failures are
//! scoped to a single component instance: one component failing to
//! initialize never stops the others from mounting or disposing.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::component::ComponentName;
use crate::dom::ElementId;

/// Error type returned by component initialization.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the component lifecycle.
///
/// The type is `Clone` because a failed initialization is stored on the
/// instance and handed to every later [`await_mounted`] caller.
///
/// [`await_mounted`]: crate::registry::Registry::await_mounted
#[derive(Error, Debug, Clone)]
pub enum MountError {
    /// A component did not override `initialize`.
    #[error("method 'initialize' of {component} was not implemented")]
    NotImplemented {
        /// Concrete type name of the component.
        component: String,
    },

    /// A component's initialization returned an error.
    #[error("could not mount component {component}")]
    InitializationFailure {
        component: ComponentName,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// The awaited component was not mounted in time.
    #[error("component {component} was not mounted on {container} within {timeout:?}")]
    Timeout {
        component: ComponentName,
        container: ElementId,
        timeout: Duration,
    },

    /// No constructor is known under this name.
    #[error("no constructor registered for component {name}")]
    MissingConstructor { name: ComponentName },

    /// A registry was created outside a Tokio runtime.
    #[error("no Tokio runtime available to schedule component initialization")]
    NoRuntime,

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(Arc<serde_json::Error>),
}

impl MountError {
    /// Wrap an error returned from a component's initialization.
    ///
    /// `NotImplemented` passes through unchanged; anything else becomes an
    /// `InitializationFailure` naming the component.
    pub(crate) fn from_initialize(component: &ComponentName, error: BoxError) -> Self {
        match error.downcast::<MountError>() {
            Ok(mount_error) => match *mount_error {
                err @ MountError::NotImplemented { .. } => err,
                other => MountError::InitializationFailure {
                    component: component.clone(),
                    source: Arc::new(other),
                },
            },
            Err(other) => MountError::InitializationFailure {
                component: component.clone(),
                source: Arc::from(other),
            },
        }
    }

    /// Check if this is a rendezvous timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, MountError::Timeout { .. })
    }
}

impl From<serde_json::Error> for MountError {
    fn from(err: serde_json::Error) -> Self {
        MountError::InvalidConfig(Arc::new(err))
    }
}

/// Result alias for lifecycle operations.
pub type Result<T, E = MountError> = std::result::Result<T, E>;
