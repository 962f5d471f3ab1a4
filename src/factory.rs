//! Construction strategies and teardown callbacks
//!
//! Every registration, decorator and pre-configuration is backed by an
//! [`Activator`]. Activators are an enum rather than trait objects so the
//! resolver can tell synchronous from asynchronous strategies before calling
//! them.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::{Arguments, Instance, Result};

/// A cleanup callback registered while constructing a service.
///
/// Runs when the scope that owns the constructed instance closes, in reverse
/// order of registration.
pub enum Teardown {
    Sync(Box<dyn FnOnce() -> Result<()> + Send>),
    Async(Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>),
}

impl Teardown {
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Self::Sync(Box::new(teardown))
    }

    pub fn new_async<F, Fut>(teardown: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::Async(Box::new(move || teardown().boxed()))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_async() { "Teardown::Async" } else { "Teardown::Sync" })
    }
}

/// A value paired with the cleanup that must run once it is no longer needed.
///
/// Returned by resource factories; the value is injected and the teardown is
/// handed to the owning scope.
///
/// ```rust
/// use graph_injector::Resource;
/// use std::sync::Arc;
///
/// struct Connection;
///
/// let resource = Resource::new(Connection).with_teardown(|| Ok(()));
/// assert!(resource.teardown().is_some());
/// ```
pub struct Resource<S: ?Sized> {
    value: Arc<S>,
    teardown: Option<Teardown>,
}

impl<S: Send + Sync + 'static> Resource<S> {
    pub fn new(value: S) -> Self {
        Self::from_arc(Arc::new(value))
    }
}

impl<S: ?Sized + Send + Sync + 'static> Resource<S> {
    pub fn from_arc(value: Arc<S>) -> Self {
        Self {
            value,
            teardown: None,
        }
    }

    pub fn with_teardown<F>(mut self, teardown: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.teardown = Some(Teardown::new(teardown));
        self
    }

    pub fn with_async_teardown<F, Fut>(mut self, teardown: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.teardown = Some(Teardown::new_async(teardown));
        self
    }

    pub fn value(&self) -> &Arc<S> {
        &self.value
    }

    pub fn teardown(&self) -> Option<&Teardown> {
        self.teardown.as_ref()
    }

    pub(crate) fn into_built(self) -> Built {
        Built {
            instance: Instance::from_arc(self.value),
            teardown: self.teardown,
        }
    }
}

/// Output of one activation.
pub(crate) struct Built {
    pub(crate) instance: Instance,
    pub(crate) teardown: Option<Teardown>,
}

impl Built {
    pub(crate) fn plain(instance: Instance) -> Self {
        Self {
            instance,
            teardown: None,
        }
    }
}

pub(crate) type SyncActivation = dyn Fn(&mut Arguments) -> Result<Built> + Send + Sync;
pub(crate) type AsyncActivation = dyn Fn(Arguments) -> BoxFuture<'static, Result<Built>> + Send + Sync;

/// How an instance comes into being.
#[derive(Clone)]
pub(crate) enum Activator {
    /// Pre-built value, handed out as is
    Instance(Instance),
    /// Constructor, factory or resource factory
    Sync(Arc<SyncActivation>),
    /// Async factory or async resource factory
    Async(Arc<AsyncActivation>),
}

impl Activator {
    pub(crate) fn factory<S, F>(factory: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&mut Arguments) -> Result<Arc<S>> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(move |args: &mut Arguments| {
            factory(args).map(|value| Built::plain(Instance::from_arc(value)))
        }))
    }

    pub(crate) fn resource<S, F>(factory: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&mut Arguments) -> Result<Resource<S>> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(move |args: &mut Arguments| factory(args).map(Resource::into_built)))
    }

    pub(crate) fn async_factory<S, F, Fut>(factory: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<S>>> + Send + 'static,
    {
        Self::Async(Arc::new(move |args: Arguments| {
            factory(args)
                .map(|result| result.map(|value| Built::plain(Instance::from_arc(value))))
                .boxed()
        }))
    }

    pub(crate) fn async_resource<S, F, Fut>(factory: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resource<S>>> + Send + 'static,
    {
        Self::Async(Arc::new(move |args: Arguments| {
            factory(args)
                .map(|result| result.map(Resource::into_built))
                .boxed()
        }))
    }

    pub(crate) fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Instance(_) => "instance",
            Self::Sync(_) => "sync",
            Self::Async(_) => "async",
        }
    }
}

impl fmt::Debug for Activator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Activator::{}", self.kind())
    }
}
