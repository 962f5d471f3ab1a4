//! One-time side effects run before a service is first built.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use once_cell::sync::OnceCell;

use crate::factory::{Activator, Built, Teardown};
use crate::filters::RegistrationFilter;
use crate::filters::registration::is_not_named;
use crate::registration::add_unbound_params;
use crate::{
    Arguments, DependencySettings, Instance, Parameter, Registration, RegistrationId, Result,
    ServiceKey, TypeKey,
};

/// A side effect run once, before the first build of any of its services.
///
/// ```rust
/// use graph_injector::{Container, PreConfiguration, Registration};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// static RUNS: AtomicUsize = AtomicUsize::new(0);
///
/// struct Database;
///
/// let container = Container::new();
/// container.register(Registration::factory(|_| Ok(Arc::new(Database)))).unwrap();
/// container
///     .pre_configure(PreConfiguration::new::<Database, _>(|_| {
///         RUNS.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     }))
///     .unwrap();
///
/// container.resolve::<Database>().unwrap();
/// container.resolve::<Database>().unwrap();
/// assert_eq!(RUNS.load(Ordering::SeqCst), 1);
/// ```
pub struct PreConfiguration {
    pub(crate) id: RegistrationId,
    pub(crate) services: Vec<ServiceKey>,
    implementation: TypeKey,
    pub(crate) activator: Activator,
    pub(crate) params: Vec<Parameter>,
    pub(crate) dependencies: HashMap<String, DependencySettings>,
    registration_filter: RegistrationFilter,
    continue_on_failure: bool,
    has_run: OnceCell<()>,
}

impl PreConfiguration {
    fn with_activator<S: ?Sized + 'static>(implementation: TypeKey, activator: Activator) -> Self {
        Self {
            id: RegistrationId::next(),
            services: vec![ServiceKey::of::<S>()],
            implementation,
            activator,
            params: Vec::new(),
            dependencies: HashMap::new(),
            registration_filter: is_not_named(),
            continue_on_failure: false,
            has_run: OnceCell::new(),
        }
    }

    pub fn new<S, F>(configure: F) -> Self
    where
        S: ?Sized + 'static,
        F: Fn(&mut Arguments) -> Result<()> + Send + Sync + 'static,
    {
        Self::with_activator::<S>(
            TypeKey::of::<F>(),
            Activator::Sync(Arc::new(move |args: &mut Arguments| {
                configure(args).map(|()| Built::plain(Instance::new(())))
            })),
        )
    }

    /// Pre-configuration whose teardown runs when the container closes.
    pub fn resource<S, F>(configure: F) -> Self
    where
        S: ?Sized + 'static,
        F: Fn(&mut Arguments) -> Result<Teardown> + Send + Sync + 'static,
    {
        Self::with_activator::<S>(
            TypeKey::of::<F>(),
            Activator::Sync(Arc::new(move |args: &mut Arguments| {
                configure(args).map(|teardown| Built {
                    instance: Instance::new(()),
                    teardown: Some(teardown),
                })
            })),
        )
    }

    pub fn new_async<S, F, Fut>(configure: F) -> Self
    where
        S: ?Sized + 'static,
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::with_activator::<S>(
            TypeKey::of::<F>(),
            Activator::Async(Arc::new(move |args: Arguments| {
                configure(args)
                    .map(|result| result.map(|()| Built::plain(Instance::new(()))))
                    .boxed()
            })),
        )
    }

    pub fn resource_async<S, F, Fut>(configure: F) -> Self
    where
        S: ?Sized + 'static,
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Teardown>> + Send + 'static,
    {
        Self::with_activator::<S>(
            TypeKey::of::<F>(),
            Activator::Async(Arc::new(move |args: Arguments| {
                configure(args)
                    .map(|result| {
                        result.map(|teardown| Built {
                            instance: Instance::new(()),
                            teardown: Some(teardown),
                        })
                    })
                    .boxed()
            })),
        )
    }

    /// Also run before the first build of `S`.
    pub fn also<S: ?Sized + 'static>(mut self) -> Self {
        self.services.push(ServiceKey::of::<S>());
        self
    }

    pub fn param(mut self, parameter: Parameter) -> Self {
        self.params.push(parameter);
        self
    }

    pub fn params(mut self, parameters: impl IntoIterator<Item = Parameter>) -> Self {
        self.params.extend(parameters);
        self
    }

    pub fn dependency(mut self, name: impl Into<String>, settings: DependencySettings) -> Self {
        self.dependencies.insert(name.into(), settings);
        self
    }

    /// Registrations that trigger this pre-configuration (unnamed ones by
    /// default).
    pub fn registration_filter(mut self, filter: RegistrationFilter) -> Self {
        self.registration_filter = filter;
        self
    }

    /// Log failures and carry on building the service.
    pub fn continue_on_failure(mut self, yes: bool) -> Self {
        self.continue_on_failure = yes;
        self
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn services(&self) -> &[ServiceKey] {
        &self.services
    }

    pub fn implementation(&self) -> TypeKey {
        self.implementation
    }

    pub fn has_run(&self) -> bool {
        self.has_run.get().is_some()
    }

    pub(crate) fn mark_run(&self) {
        let _ = self.has_run.set(());
    }

    pub(crate) fn continues_on_failure(&self) -> bool {
        self.continue_on_failure
    }

    pub(crate) fn applies_to(&self, registration: &Registration) -> bool {
        !self.has_run() && self.registration_filter.test(registration)
    }

    pub(crate) fn settings(&self, name: &str) -> DependencySettings {
        self.dependencies.get(name).cloned().unwrap_or_default()
    }

    pub(crate) fn prepare(mut self) -> Self {
        add_unbound_params(&mut self.params, &self.dependencies);
        self
    }
}

impl fmt::Debug for PreConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreConfiguration")
            .field("id", &self.id)
            .field("services", &self.services)
            .field("has_run", &self.has_run())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::registration::with_name;

    struct Database;

    #[test]
    fn test_applies_until_run() {
        let pre = PreConfiguration::new::<Database, _>(|_| Ok(())).also::<u8>();
        let unnamed = Registration::value(Database);
        let named = Registration::value(Database).named("replica");

        assert_eq!(pre.services().len(), 2);
        assert!(pre.applies_to(&unnamed));
        assert!(!pre.applies_to(&named));

        pre.mark_run();
        assert!(pre.has_run());
        assert!(!pre.applies_to(&unnamed));
    }

    #[test]
    fn test_filter_override() {
        let pre = PreConfiguration::new::<Database, _>(|_| Ok(())).registration_filter(with_name("replica"));
        assert!(pre.applies_to(&Registration::value(Database).named("replica")));
        assert!(!pre.applies_to(&Registration::value(Database)));
    }
}
