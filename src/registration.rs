//! Registrations: one binding of a service key to a construction strategy.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::factory::{Activator, Resource, Teardown};
use crate::filters::NodeFilter;
use crate::{
    Arguments, CollectionShape, DependencySettings, DiError, GenericService, Instance, Result,
    ServiceKey, TypeKey,
};

// =============================================================================
// Identity
// =============================================================================

/// Unique, monotonically increasing registration identifier.
///
/// Later registrations always carry larger ids, so ids double as the
/// registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl RegistrationId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Instance caching policy, from shortest to longest lived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Lifespan {
    /// Built on every request
    Transient,
    /// Shared within one top-level resolve call
    #[default]
    OncePerGraph,
    /// Shared within the resolving scope and its children
    Scoped,
    /// Shared for the life of the container
    Singleton,
}

/// Registration tag: a name with an optional value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    name: String,
    value: Option<String>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Same name, and same value when `value` is given.
    pub fn matches(&self, name: &str, value: Option<&str>) -> bool {
        self.name == name && value.is_none_or(|v| self.value.as_deref() == Some(v))
    }
}

// =============================================================================
// Parameters
// =============================================================================

/// What a parameter asks the resolver for.
#[derive(Debug, Clone)]
pub enum ParamKind {
    Service(ServiceKey),
    Collection {
        element: ServiceKey,
        shape: CollectionShape,
    },
    /// Snapshot of the node being built and its ancestors
    DependencyContext,
    /// Handle resolving from the current scope
    Resolver,
    /// Handle resolving within the current graph
    CurrentGraph,
    /// Configured extra argument; its value comes from dependency settings
    Unbound,
}

/// Declared parameter of a constructor, factory, decorator or
/// pre-configuration.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    kind: ParamKind,
    default: Option<Instance>,
}

impl Parameter {
    fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
        }
    }

    pub fn service<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Service(ServiceKey::of::<T>()))
    }

    /// A generic instantiation, eligible for open-generic fallback.
    pub fn generic<T: ?Sized + GenericService>(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Service(ServiceKey::generic::<T>()))
    }

    pub fn list<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::collection::<T>(name, CollectionShape::List)
    }

    pub fn collection<T: ?Sized + 'static>(name: impl Into<String>, shape: CollectionShape) -> Self {
        Self::new(
            name,
            ParamKind::Collection {
                element: ServiceKey::of::<T>(),
                shape,
            },
        )
    }

    pub fn context(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::DependencyContext)
    }

    pub fn resolver(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Resolver)
    }

    pub fn current_graph(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::CurrentGraph)
    }

    pub fn unbound(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Unbound)
    }

    /// Declared default; used ahead of the registry unless the parameter's
    /// value factory says otherwise.
    pub fn with_default<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.default = Some(Instance::new(value));
        self
    }

    pub fn with_shared_default<T: ?Sized + Send + Sync + 'static>(mut self, value: Arc<T>) -> Self {
        self.default = Some(Instance::from_arc(value));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ParamKind {
        &self.kind
    }

    pub fn default(&self) -> Option<&Instance> {
        self.default.as_ref()
    }

    /// The single service this parameter asks for, if any.
    pub(crate) fn service_key(&self) -> Option<&ServiceKey> {
        match &self.kind {
            ParamKind::Service(key) => Some(key),
            _ => None,
        }
    }
}

/// A type the container can build from declared parameters.
///
/// Usually derived with `#[derive(Construct)]` (feature `derive`).
///
/// ```rust
/// use graph_injector::{Arguments, Construct, Container, Parameter, Registration, Result};
/// use std::sync::Arc;
///
/// struct Clock;
/// struct Scheduler { clock: Arc<Clock> }
///
/// impl Construct for Scheduler {
///     fn parameters() -> Vec<Parameter> {
///         vec![Parameter::service::<Clock>("clock")]
///     }
///
///     fn construct(args: &mut Arguments) -> Result<Self> {
///         Ok(Scheduler { clock: args.get("clock")? })
///     }
/// }
///
/// let container = Container::new();
/// container.register(Registration::value(Clock)).unwrap();
/// container.register(Registration::constructor::<Scheduler>()).unwrap();
/// assert!(container.resolve::<Scheduler>().is_ok());
/// ```
pub trait Construct: Sized + Send + Sync + 'static {
    fn parameters() -> Vec<Parameter>;

    fn construct(args: &mut Arguments) -> Result<Self>;
}

// =============================================================================
// Registration
// =============================================================================

type Projection = dyn Fn(&Instance) -> Result<Instance> + Send + Sync;
type ScopedTeardown = dyn Fn(&Instance) -> Result<Teardown> + Send + Sync;

/// One binding of a service key to a construction strategy plus metadata.
///
/// Built with one of the strategy constructors and refined with builder
/// methods, then handed to [`Scope::register`](crate::Scope::register).
///
/// ```rust
/// use graph_injector::{Container, Lifespan, Registration, Tag};
///
/// let container = Container::new();
/// let id = container
///     .register(
///         Registration::factory(|_| Ok(std::sync::Arc::new(42u32)))
///             .named("answer")
///             .tag(Tag::new("numbers"))
///             .with_lifespan(Lifespan::Singleton),
///     )
///     .unwrap();
/// assert_eq!(*container.resolve_from_registration_id::<u32>(id).unwrap(), 42);
/// ```
pub struct Registration {
    pub(crate) id: RegistrationId,
    pub(crate) service: ServiceKey,
    implementation: TypeKey,
    /// Turns the built implementation into the service instance when the
    /// registration is also indexed under its implementation type
    projection: Option<Arc<Projection>>,
    pub(crate) activator: Activator,
    pub(crate) params: Vec<Parameter>,
    lifespan: Lifespan,
    name: Option<String>,
    tags: Vec<Tag>,
    pub(crate) dependencies: HashMap<String, DependencySettings>,
    pub(crate) parent_node_filter: NodeFilter,
    scoped_teardown: Option<Arc<ScopedTeardown>>,
    resource: bool,
}

impl Registration {
    fn with_activator(service: ServiceKey, implementation: TypeKey, activator: Activator) -> Self {
        Self {
            id: RegistrationId::next(),
            service,
            implementation,
            projection: None,
            activator,
            params: Vec::new(),
            lifespan: Lifespan::default(),
            name: None,
            tags: Vec::new(),
            dependencies: HashMap::new(),
            parent_node_filter: NodeFilter::default(),
            scoped_teardown: None,
            resource: false,
        }
    }

    /// A fixed value, always treated as a singleton.
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::instance(Arc::new(value))
    }

    /// A fixed shared value, typically `Arc<dyn Trait>`.
    pub fn instance<S: ?Sized + Send + Sync + 'static>(value: Arc<S>) -> Self {
        let mut registration = Self::with_activator(
            ServiceKey::of::<S>(),
            TypeKey::of::<S>(),
            Activator::Instance(Instance::from_arc(value)),
        );
        registration.lifespan = Lifespan::Singleton;
        registration
    }

    pub fn factory<S, F>(factory: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&mut Arguments) -> Result<Arc<S>> + Send + Sync + 'static,
    {
        Self::with_activator(ServiceKey::of::<S>(), TypeKey::of::<S>(), Activator::factory(factory))
    }

    /// A factory whose value comes with a teardown, run when the owning
    /// scope closes.
    pub fn resource<S, F>(factory: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&mut Arguments) -> Result<Resource<S>> + Send + Sync + 'static,
    {
        let mut registration =
            Self::with_activator(ServiceKey::of::<S>(), TypeKey::of::<S>(), Activator::resource(factory));
        registration.resource = true;
        registration
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
        let mut registration = Self::with_activator(
            ServiceKey::of::<S>(),
            TypeKey::of::<S>(),
            Activator::async_resource(factory),
        );
        registration.resource = true;
        registration
    }

    /// `T` as both service and implementation, built from its parameters.
    pub fn constructor<T: Construct>() -> Self {
        let mut registration = Self::with_activator(
            ServiceKey::of::<T>(),
            TypeKey::of::<T>(),
            Activator::factory(|args: &mut Arguments| T::construct(args).map(Arc::new)),
        );
        registration.params = T::parameters();
        registration
    }

    /// Service `S` implemented by `I`, indexed under both.
    ///
    /// Resolving `I` yields the implementation itself; resolving `S` yields
    /// `cast` of it. With a singleton lifespan both share one `I`.
    pub fn implemented_by<S, I>(cast: fn(Arc<I>) -> Arc<S>) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        I: Construct,
    {
        let mut registration = Self::constructor::<I>();
        registration.service = ServiceKey::of::<S>();
        registration.projection = Some(Arc::new(move |raw: &Instance| {
            raw.require::<I>().map(|i| Instance::from_arc(cast(i)))
        }));
        registration
    }

    /// Placeholder that fails unless a scope registers `S` itself.
    pub(crate) fn expect_scoped<S: ?Sized + Send + Sync + 'static>(name: Option<String>) -> Self {
        let service = std::any::type_name::<S>();
        let expected = name.clone();
        let mut registration = Self::with_activator(
            ServiceKey::of::<S>(),
            TypeKey::of::<S>(),
            Activator::factory(move |_| -> Result<Arc<S>> {
                Err(DiError::NeedsScopedRegistration {
                    service,
                    name: expected.clone(),
                })
            }),
        );
        registration.lifespan = Lifespan::Scoped;
        registration.name = name;
        registration
    }

    // =========================================================================
    // Builder
    // =========================================================================

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn tagged(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Ignored for fixed values, which are always singletons.
    pub fn with_lifespan(mut self, lifespan: Lifespan) -> Self {
        self.lifespan = lifespan;
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

    /// Settings for one parameter. A name with no declared parameter adds an
    /// unbound parameter that the settings must supply.
    pub fn dependency(mut self, name: impl Into<String>, settings: DependencySettings) -> Self {
        self.dependencies.insert(name.into(), settings);
        self
    }

    /// Only used when the requesting node passes `filter`.
    pub fn parent_node_filter(mut self, filter: NodeFilter) -> Self {
        self.parent_node_filter = filter;
        self
    }

    /// Runs with the instance when the scope holding it closes. Scoped only.
    pub fn scoped_teardown<S, F>(mut self, teardown: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<S>) -> Result<()> + Send + Sync + 'static,
    {
        let teardown = Arc::new(teardown);
        self.scoped_teardown = Some(Arc::new(move |instance: &Instance| {
            let value = instance.require::<S>()?;
            let teardown = Arc::clone(&teardown);
            Ok(Teardown::new(move || teardown(value)))
        }));
        self
    }

    pub fn scoped_teardown_async<S, F, Fut>(mut self, teardown: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let teardown = Arc::new(teardown);
        self.scoped_teardown = Some(Arc::new(move |instance: &Instance| {
            let value = instance.require::<S>()?;
            let teardown = Arc::clone(&teardown);
            Ok(Teardown::new_async(move || teardown(value)))
        }));
        self
    }

    /// Records `I` as the implementation type of a factory registration.
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

    #[inline]
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    #[inline]
    pub fn service(&self) -> &ServiceKey {
        &self.service
    }

    #[inline]
    pub fn implementation(&self) -> TypeKey {
        self.implementation
    }

    #[inline]
    pub fn lifespan(&self) -> Lifespan {
        self.lifespan
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_named(&self) -> bool {
        self.name.is_some()
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn has_tag(&self, name: &str, value: Option<&str>) -> bool {
        self.tags.iter().any(|t| t.matches(name, value))
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    pub(crate) fn is_fixed_instance(&self) -> bool {
        matches!(self.activator, Activator::Instance(_))
    }

    /// Also indexed under the implementation type.
    pub(crate) fn is_indexed(&self) -> bool {
        self.projection.is_some() && self.implementation.id() != self.service.type_id()
    }

    /// Instance for `key` from the built implementation.
    pub(crate) fn project(&self, key: &ServiceKey, raw: Instance) -> Result<Instance> {
        match &self.projection {
            Some(projection) if key.type_id() == self.service.type_id() => projection(&raw),
            _ => Ok(raw),
        }
    }

    /// Teardown for a freshly built implementation, typed against the service.
    pub(crate) fn scoped_teardown_for(&self, raw: &Instance) -> Option<Result<Teardown>> {
        let make = self.scoped_teardown.as_ref()?;
        Some(self.project(&self.service, raw.clone()).and_then(|service| make(&service)))
    }

    pub(crate) fn settings(&self, name: &str) -> DependencySettings {
        self.dependencies.get(name).cloned().unwrap_or_default()
    }

    /// Checks invariants and normalizes before the registration is stored.
    pub(crate) fn prepare(mut self) -> Result<Self> {
        let service = self.service.type_name();
        if self.is_fixed_instance() {
            self.lifespan = Lifespan::Singleton;
        }
        if self.scoped_teardown.is_some() && self.lifespan != Lifespan::Scoped {
            return Err(DiError::invalid_registration(
                service,
                "scoped teardowns can only be used with the scoped lifespan",
            ));
        }
        if self.resource && self.lifespan == Lifespan::Singleton {
            return Err(DiError::invalid_registration(
                service,
                "resource factories cannot be singletons",
            ));
        }
        add_unbound_params(&mut self.params, &self.dependencies);
        Ok(self)
    }
}

/// Settings keyed by a name no parameter declares become unbound parameters.
pub(crate) fn add_unbound_params(
    params: &mut Vec<Parameter>,
    dependencies: &HashMap<String, DependencySettings>,
) {
    let mut extra: Vec<&String> = dependencies
        .keys()
        .filter(|name| !params.iter().any(|p| p.name() == name.as_str()))
        .collect();
    extra.sort();
    params.extend(extra.into_iter().map(Parameter::unbound));
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("implementation", &self.implementation)
            .field("lifespan", &self.lifespan)
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("activator", &self.activator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Shape: Send + Sync {}
    struct Square;
    impl Shape for Square {}

    impl Construct for Square {
        fn parameters() -> Vec<Parameter> {
            Vec::new()
        }

        fn construct(_: &mut Arguments) -> Result<Self> {
            Ok(Square)
        }
    }

    #[test]
    fn test_ids_are_ordered() {
        let first = Registration::value(1u8);
        let second = Registration::value(2u8);
        assert!(first.id() < second.id());
        assert_eq!(format!("{}", first.id()), format!("#{}", first.id().value()));
    }

    #[test]
    fn test_fixed_values_are_singletons() {
        let registration = Registration::value(1u8)
            .with_lifespan(Lifespan::Transient)
            .prepare()
            .unwrap();
        assert_eq!(registration.lifespan(), Lifespan::Singleton);
    }

    #[test]
    fn test_scoped_teardown_requires_scoped_lifespan() {
        let registration = Registration::factory(|_| Ok(Arc::new(1u8))).scoped_teardown(|_: Arc<u8>| Ok(()));
        assert!(matches!(
            registration.prepare(),
            Err(DiError::InvalidRegistration { .. })
        ));

        let ok = Registration::factory(|_| Ok(Arc::new(1u8)))
            .with_lifespan(Lifespan::Scoped)
            .scoped_teardown(|_: Arc<u8>| Ok(()))
            .prepare();
        assert!(ok.is_ok());
    }

    #[test]
    fn test_resources_cannot_be_singletons() {
        let registration = Registration::resource(|_| Ok(Resource::new(1u8))).with_lifespan(Lifespan::Singleton);
        assert!(registration.prepare().is_err());
    }

    #[test]
    fn test_configured_names_become_unbound_params() {
        let registration = Registration::factory(|_| Ok(Arc::new(1u8)))
            .param(Parameter::service::<u16>("port"))
            .dependency("port", DependencySettings::value(80u16))
            .dependency("host", DependencySettings::value("localhost"))
            .prepare()
            .unwrap();

        let names: Vec<_> = registration.parameters().iter().map(Parameter::name).collect();
        assert_eq!(names, vec!["port", "host"]);
        assert!(matches!(registration.parameters()[1].kind(), ParamKind::Unbound));
    }

    #[test]
    fn test_implementation_projection() {
        let registration = Registration::implemented_by::<dyn Shape, Square>(|s| s);
        assert!(registration.is_indexed());
        assert_eq!(registration.implementation(), TypeKey::of::<Square>());

        let raw = Instance::new(Square);
        let projected = registration.project(&ServiceKey::of::<dyn Shape>(), raw.clone()).unwrap();
        assert!(projected.is::<dyn Shape>());
        let unprojected = registration.project(&ServiceKey::of::<Square>(), raw).unwrap();
        assert!(unprojected.is::<Square>());
    }

    #[test]
    fn test_tag_matching() {
        let tag = Tag::with_value("env", "prod");
        assert!(tag.matches("env", None));
        assert!(tag.matches("env", Some("prod")));
        assert!(!tag.matches("env", Some("dev")));
        assert!(!Tag::new("env").matches("env", Some("prod")));
    }
}
