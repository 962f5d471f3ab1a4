//! Decorator registrations: wrappers composed around a resolved service.
//!
//! Decorators for a service key are applied innermost first, ordered by
//! position (lowest innermost) and, at equal position, by registration
//! order with the first registered decorator ending up outermost.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::factory::{Activator, Resource};
use crate::filters::registration::is_not_named;
use crate::filters::{NodeFilter, RegistrationFilter};
use crate::registration::add_unbound_params;
use crate::{
    Arguments, Construct, DependencySettings, DiError, Parameter, Registration, RegistrationId,
    Result, ServiceKey, TypeKey,
};

/// Name given to the decorated parameter by [`DecoratorRegistration::wrap`].
pub const DECORATED: &str = "decorated";

/// A wrapper around instances of one service key.
///
/// ```rust
/// use graph_injector::{Container, DecoratorRegistration, Registration};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync { fn greet(&self) -> String; }
///
/// struct Plain;
/// impl Greeter for Plain { fn greet(&self) -> String { "hello".into() } }
///
/// struct Loud(Arc<dyn Greeter>);
/// impl Greeter for Loud { fn greet(&self) -> String { self.0.greet().to_uppercase() } }
///
/// let container = Container::new();
/// container.register(Registration::instance::<dyn Greeter>(Arc::new(Plain))).unwrap();
/// container
///     .register_decorator(DecoratorRegistration::wrap::<dyn Greeter, _>(|inner| Arc::new(Loud(inner))))
///     .unwrap();
///
/// assert_eq!(container.resolve::<dyn Greeter>().unwrap().greet(), "HELLO");
/// ```
pub struct DecoratorRegistration {
    pub(crate) id: RegistrationId,
    pub(crate) service: ServiceKey,
    implementation: TypeKey,
    pub(crate) activator: Activator,
    pub(crate) params: Vec<Parameter>,
    decorated_arg: Option<String>,
    position: i32,
    pub(crate) dependencies: HashMap<String, DependencySettings>,
    registration_filter: RegistrationFilter,
    node_filter: NodeFilter,
}

impl DecoratorRegistration {
    fn with_activator(service: ServiceKey, implementation: TypeKey, activator: Activator) -> Self {
        Self {
            id: RegistrationId::next(),
            service,
            implementation,
            activator,
            params: Vec::new(),
            decorated_arg: None,
            position: 0,
            dependencies: HashMap::new(),
            registration_filter: is_not_named(),
            node_filter: NodeFilter::default(),
        }
    }

    /// Factory decorator; declare the decorated parameter with
    /// [`param`](Self::param).
    pub fn factory<S, F>(factory: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&mut Arguments) -> Result<Arc<S>> + Send + Sync + 'static,
    {
        Self::with_activator(ServiceKey::of::<S>(), TypeKey::of::<S>(), Activator::factory(factory))
    }

    /// Decorator taking only the decorated instance.
    pub fn wrap<S, F>(wrap: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<S>) -> Arc<S> + Send + Sync + 'static,
    {
        Self::factory(move |args: &mut Arguments| args.get::<S>(DECORATED).map(&wrap))
            .param(Parameter::service::<S>(DECORATED))
            .decorated_arg(DECORATED)
    }

    pub fn resource<S, F>(factory: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&mut Arguments) -> Result<Resource<S>> + Send + Sync + 'static,
    {
        Self::with_activator(ServiceKey::of::<S>(), TypeKey::of::<S>(), Activator::resource(factory))
    }

    pub fn async_factory<S, F, Fut>(factory: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<S>>> + Send + 'static,
    {
        Self::with_activator(
            ServiceKey::of::<S>(),
            TypeKey::of::<S>(),
            Activator::async_factory(factory),
        )
    }

    pub fn async_resource<S, F, Fut>(factory: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resource<S>>> + Send + 'static,
    {
        Self::with_activator(
            ServiceKey::of::<S>(),
            TypeKey::of::<S>(),
            Activator::async_resource(factory),
        )
    }

    /// Decorator type `D` built from its parameters, one of which receives
    /// the decorated `S`.
    pub fn constructor<S, D>(cast: fn(Arc<D>) -> Arc<S>) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        D: Construct,
    {
        let mut decorator = Self::with_activator(
            ServiceKey::of::<S>(),
            TypeKey::of::<D>(),
            Activator::factory(move |args: &mut Arguments| D::construct(args).map(|d| cast(Arc::new(d)))),
        );
        decorator.params = D::parameters();
        decorator
    }

    // =========================================================================
    // Builder
    // =========================================================================

    /// Higher positions wrap lower ones.
    pub fn at_position(mut self, position: i32) -> Self {
        self.position = position;
        self
    }

    /// Parameter receiving the decorated instance. Defaults to the first
    /// parameter asking for the decorated service type.
    pub fn decorated_arg(mut self, name: impl Into<String>) -> Self {
        self.decorated_arg = Some(name.into());
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

    /// Registrations this decorator applies to (unnamed ones by default).
    pub fn registration_filter(mut self, filter: RegistrationFilter) -> Self {
        self.registration_filter = filter;
        self
    }

    /// Tested against the node being decorated.
    pub fn node_filter(mut self, filter: NodeFilter) -> Self {
        self.node_filter = filter;
        self
    }

    pub fn implementation_type<I: ?Sized + 'static>(mut self) -> Self {
        self.implementation = TypeKey::of::<I>();
        self
    }

    pub(crate) fn bind_generic(mut self, binding: crate::GenericBinding) -> Self {
        self.service = self.service.with_binding(Some(binding));
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn service(&self) -> &ServiceKey {
        &self.service
    }

    pub fn implementation(&self) -> TypeKey {
        self.implementation
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    /// Explicit or inferred name of the decorated parameter.
    pub fn decorated_name(&self) -> Option<&str> {
        match &self.decorated_arg {
            Some(name) => Some(name.as_str()),
            None => self
                .params
                .iter()
                .find(|p| p.service_key() == Some(&self.service))
                .map(Parameter::name),
        }
    }

    pub(crate) fn applies_to(&self, registration: &Registration) -> bool {
        self.registration_filter.test(registration)
    }

    pub(crate) fn node_filter_ref(&self) -> &NodeFilter {
        &self.node_filter
    }

    pub(crate) fn settings(&self, name: &str) -> DependencySettings {
        self.dependencies.get(name).cloned().unwrap_or_default()
    }

    pub(crate) fn prepare(mut self) -> Result<Self> {
        let decorated = self.decorated_name().map(str::to_string);
        match decorated {
            Some(name) if self.params.iter().any(|p| p.name() == name) => {}
            Some(name) => {
                return Err(DiError::invalid_registration(
                    self.service.type_name(),
                    format!("decorated argument `{name}` is not a declared parameter"),
                ));
            }
            None => {
                return Err(DiError::invalid_registration(
                    self.service.type_name(),
                    "decorator declares no parameter for the decorated instance",
                ));
            }
        }
        add_unbound_params(&mut self.params, &self.dependencies);
        Ok(self)
    }

    /// Application order: innermost first.
    pub(crate) fn sort(decorators: &mut [Arc<Self>]) {
        decorators.sort_by(|a, b| a.position.cmp(&b.position).then(b.id.cmp(&a.id)));
    }

    pub(crate) fn with_id(mut self, id: RegistrationId) -> Self {
        self.id = id;
        self
    }
}

impl fmt::Debug for DecoratorRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorRegistration")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("implementation", &self.implementation)
            .field("position", &self.position)
            .field("decorated", &self.decorated_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Service;

    fn passthrough() -> DecoratorRegistration {
        DecoratorRegistration::wrap::<Service, _>(|inner| inner)
    }

    #[test]
    fn test_sort_order() {
        let first = Arc::new(passthrough());
        let second = Arc::new(passthrough());
        let outer = Arc::new(passthrough().at_position(10));
        let mut decorators = vec![Arc::clone(&outer), Arc::clone(&first), Arc::clone(&second)];

        DecoratorRegistration::sort(&mut decorators);
        let ids: Vec<_> = decorators.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec![second.id(), first.id(), outer.id()]);
    }

    #[test]
    fn test_decorated_argument_inference() {
        let inferred = DecoratorRegistration::factory(|args| args.get::<Service>("inner"))
            .param(Parameter::service::<u32>("count"))
            .param(Parameter::service::<Service>("inner"));
        assert_eq!(inferred.decorated_name(), Some("inner"));
        assert!(inferred.prepare().is_ok());

        let missing = DecoratorRegistration::factory(|args| args.get::<Service>("inner"));
        assert!(matches!(missing.prepare(), Err(DiError::InvalidRegistration { .. })));

        let wrong = passthrough().decorated_arg("nope");
        assert!(wrong.prepare().is_err());
    }
}
