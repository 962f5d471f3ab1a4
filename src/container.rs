//! The dependency injection container
//!
//! A `Container` is a handle on one resolution context. The root context
//! is created with [`Container::new`]; child contexts come from
//! [`Container::new_scope`] and share the same API through [`Scope`].

use std::any::TypeId;
use std::sync::Arc;
use std::sync::atomic::Ordering;

#[cfg(feature = "logging")]
use tracing::debug;

use crate::filters::RegistrationFilter;
use crate::filters::registration::{is_not_named, with_id, with_name};
use crate::generic::GenericDecorator;
use crate::resolver::{Engine, Mode, holds_gate, run_async, run_blocking};
use crate::scope::{Scope, ScopeState};
use crate::{
    Bundle, Collection, CollectionShape, DecoratorRegistration, DependencyGraph, DependencySettings,
    DiError, GenericBinding, GenericDefinition, GenericService, Instance, OpenGeneric,
    PreConfiguration, Registration, RegistrationId, Result, ScopeId, ServiceKey, Subclasses,
};

/// What a single-value request does when several registrations match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguityPolicy {
    /// Use the most recently registered match
    #[default]
    LastRegistered,
    /// Fail with [`DiError::AmbiguousRegistration`]
    Error,
}

/// Runtime options shared by a container and all of its scopes.
#[derive(Debug, Clone, Default)]
pub struct ContainerOptions {
    pub ambiguity: AmbiguityPolicy,
}

impl ContainerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ambiguity(mut self, policy: AmbiguityPolicy) -> Self {
        self.ambiguity = policy;
        self
    }
}

/// Dependency injection container.
///
/// Cloning is cheap and yields another handle on the same context.
/// Registries and caches use `DashMap`; top-level resolves of one
/// container tree are serialized so each lifespan cache holds at most one
/// instance per registration.
///
/// The gate is shared by the root and every scope under it and is held
/// while an async resolve awaits, so async resolves in sibling scopes run
/// one at a time. Keep slow async work out of factories when many request
/// scopes resolve concurrently, or give unrelated workloads their own root
/// container.
///
/// # Examples
///
/// ```rust
/// use graph_injector::{Container, Lifespan, Parameter, Registration};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct UserService { db: Arc<Database> }
///
/// let container = Container::new();
/// container.register(Registration::value(Database { url: "postgres://localhost".into() })).unwrap();
/// container
///     .register(
///         Registration::factory(|args| Ok(Arc::new(UserService { db: args.get("db")? })))
///             .param(Parameter::service::<Database>("db"))
///             .with_lifespan(Lifespan::Singleton),
///     )
///     .unwrap();
///
/// let users = container.resolve::<UserService>().unwrap();
/// assert_eq!(users.db.url, "postgres://localhost");
/// ```
#[derive(Clone)]
pub struct Container {
    pub(crate) state: Arc<ScopeState>,
}

impl Container {
    /// Create a new root container.
    #[inline]
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    pub fn with_options(options: ContainerOptions) -> Self {
        let state = ScopeState::root(options);

        #[cfg(feature = "logging")]
        debug!(
            target: "graph_injector",
            scope = %state.id,
            ambiguity = ?state.shared.options.ambiguity,
            "Creating new root DI container"
        );

        Self { state }
    }

    pub(crate) fn from_state(state: Arc<ScopeState>) -> Self {
        Self { state }
    }

    /// Open a child scope.
    ///
    /// The scope sees every registration and scoped instance of its
    /// ancestors; its own registrations and scoped instances stay local.
    pub fn new_scope(&self) -> Result<Scope> {
        self.state.ensure_open()?;
        let state = self.state.child();

        #[cfg(feature = "logging")]
        debug!(
            target: "graph_injector",
            parent = %self.state.id,
            scope = %state.id,
            depth = state.depth,
            "Opening child scope"
        );

        Ok(Scope::new(Container::from_state(state)))
    }

    // =========================================================================
    // Registration Methods
    // =========================================================================

    fn check_writable(&self) -> Result<()> {
        self.state.ensure_open()?;
        if self.state.locked.load(Ordering::Acquire) {
            return Err(DiError::Locked);
        }
        Ok(())
    }

    /// Add a registration to this context.
    pub fn register(&self, registration: Registration) -> Result<RegistrationId> {
        self.check_writable()?;
        let registration = registration.prepare()?;

        #[cfg(feature = "logging")]
        debug!(
            target: "graph_injector",
            service = registration.service().type_name(),
            implementation = registration.implementation().name(),
            registration = %registration.id(),
            lifespan = ?registration.lifespan(),
            name = registration.name(),
            depth = self.state.depth,
            "Registering service"
        );

        Ok(self.state.registry.add(registration).id())
    }

    /// Add a decorator for its service key.
    pub fn register_decorator(&self, decorator: DecoratorRegistration) -> Result<RegistrationId> {
        self.check_writable()?;
        let decorator = decorator.prepare()?;

        #[cfg(feature = "logging")]
        debug!(
            target: "graph_injector",
            service = decorator.service().type_name(),
            decorator = decorator.implementation().name(),
            registration = %decorator.id(),
            position = decorator.position(),
            depth = self.state.depth,
            "Registering decorator"
        );

        Ok(self.state.registry.add_decorator(decorator).id())
    }

    /// Add a side effect run once before its services are first built.
    pub fn pre_configure(&self, pre_configuration: PreConfiguration) -> Result<RegistrationId> {
        self.check_writable()?;
        let pre_configuration = self
            .state
            .registry
            .add_pre_configuration(pre_configuration.prepare());

        #[cfg(feature = "logging")]
        debug!(
            target: "graph_injector",
            services = ?pre_configuration.services(),
            registration = %pre_configuration.id(),
            "Registering pre-configuration"
        );

        Ok(pre_configuration.id())
    }

    /// Register the listed instantiations of a generic definition, plus its
    /// fallback specializer if any.
    pub fn register_open_generic(&self, open_generic: OpenGeneric) -> Result<Vec<RegistrationId>> {
        self.check_writable()?;
        let (definition, registrations, fallback) = open_generic.into_parts()?;
        let registrations = registrations
            .into_iter()
            .map(Registration::prepare)
            .collect::<Result<Vec<_>>>()?;

        #[cfg(feature = "logging")]
        debug!(
            target: "graph_injector",
            definition = definition.name(),
            implementations = registrations.len(),
            fallback = fallback.is_some(),
            "Registering open generic"
        );

        if let Some(fallback) = fallback {
            self.state.registry.add_fallback(definition, fallback);
        }
        Ok(registrations
            .into_iter()
            .map(|r| self.state.registry.add(r).id())
            .collect())
    }

    /// Decorate every instantiation of `definition`; `specializer` builds
    /// the decorator for one binding, or declines with `None`.
    pub fn register_open_generic_decorator<F>(
        &self,
        definition: GenericDefinition,
        specializer: F,
    ) -> Result<RegistrationId>
    where
        F: Fn(&GenericBinding) -> Option<DecoratorRegistration> + Send + Sync + 'static,
    {
        self.check_writable()?;
        let id = RegistrationId::next();

        #[cfg(feature = "logging")]
        debug!(
            target: "graph_injector",
            definition = definition.name(),
            registration = %id,
            "Registering open generic decorator"
        );

        self.state.registry.add_generic_decorator(GenericDecorator {
            id,
            definition,
            specializer: Arc::new(specializer),
        });
        Ok(id)
    }

    /// Register every listed implementation of `B`.
    pub fn register_subclasses<B>(&self, subclasses: Subclasses<B>) -> Result<Vec<RegistrationId>>
    where
        B: ?Sized + Send + Sync + 'static,
    {
        subclasses
            .into_registrations()
            .into_iter()
            .map(|r| self.register(r))
            .collect()
    }

    /// Placeholder for a service every scope must register itself.
    ///
    /// Resolving `T` through the placeholder fails with
    /// [`DiError::NeedsScopedRegistration`].
    pub fn expect_to_be_scoped<T>(&self, name: Option<&str>) -> Result<RegistrationId>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register(Registration::expect_scoped::<T>(name.map(str::to_string)))
    }

    /// Apply a group of registrations.
    pub fn apply_bundle<B: Bundle + ?Sized>(&self, bundle: &B) -> Result<()> {
        bundle.apply(self)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    pub(crate) fn resolve_instance(&self, key: ServiceKey, filter: RegistrationFilter) -> Result<Instance> {
        let engine = Engine::new(Arc::clone(&self.state), key.clone(), Mode::Blocking);
        run_blocking(&self.state, engine.resolve_root(key, filter))
    }

    pub(crate) async fn resolve_instance_async(
        &self,
        key: ServiceKey,
        filter: RegistrationFilter,
    ) -> Result<Instance> {
        let engine = Engine::new(Arc::clone(&self.state), key.clone(), Mode::Async);
        run_async(&self.state, engine.resolve_root(key, filter)).await
    }

    pub(crate) fn resolve_instances(
        &self,
        element: ServiceKey,
        settings: DependencySettings,
    ) -> Result<Vec<Instance>> {
        let engine = Engine::new(Arc::clone(&self.state), element.clone().many(), Mode::Blocking);
        run_blocking(&self.state, engine.resolve_root_many(element, settings))
    }

    pub(crate) async fn resolve_instances_async(
        &self,
        element: ServiceKey,
        settings: DependencySettings,
    ) -> Result<Vec<Instance>> {
        let engine = Engine::new(Arc::clone(&self.state), element.clone().many(), Mode::Async);
        run_async(&self.state, engine.resolve_root_many(element, settings)).await
    }

    /// Resolve the most recent unnamed registration of `T`.
    ///
    /// Fails with [`DiError::AsyncRequired`] if anything in the graph is
    /// async; use [`resolve_async`](Self::resolve_async) then.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve_with::<T>(is_not_named())
    }

    /// Resolve the most recent registration of `T` passing `filter`.
    pub fn resolve_with<T: ?Sized + Send + Sync + 'static>(&self, filter: RegistrationFilter) -> Result<Arc<T>> {
        self.resolve_instance(ServiceKey::of::<T>(), filter)?
            .require::<T>()
    }

    pub fn resolve_named<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        self.resolve_with::<T>(with_name(name))
    }

    /// Resolve a generic instantiation, falling back to the open generic's
    /// specializer when nothing is registered for it.
    pub fn resolve_generic<T: ?Sized + GenericService + Send + Sync>(&self) -> Result<Arc<T>> {
        self.resolve_instance(ServiceKey::generic::<T>(), is_not_named())?
            .require::<T>()
    }

    pub fn resolve_from_registration_id<T: ?Sized + Send + Sync + 'static>(
        &self,
        id: RegistrationId,
    ) -> Result<Arc<T>> {
        self.resolve_with::<T>(with_id(id))
    }

    /// Resolve `T`, or `None` on any error.
    #[inline]
    pub fn try_resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.resolve::<T>().ok()
    }

    /// Every unnamed registration of `T`, most recent first.
    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        self.resolve_collection::<T>(CollectionShape::List, DependencySettings::default())
            .map(Collection::into_vec)
    }

    /// A collection of `T` shaped by `shape` and selected by `settings`.
    pub fn resolve_collection<T: ?Sized + Send + Sync + 'static>(
        &self,
        shape: CollectionShape,
        settings: DependencySettings,
    ) -> Result<Collection<T>> {
        let items = self.resolve_instances(ServiceKey::of::<T>(), settings)?;
        Collection::from_instances(shape, &items)
    }

    /// Resolve `T` and report the tree that was built for it.
    pub fn resolve_graph<T: ?Sized + Send + Sync + 'static>(&self) -> Result<(Arc<T>, DependencyGraph)> {
        let key = ServiceKey::of::<T>();
        let engine = Engine::new(Arc::clone(&self.state), key.clone(), Mode::Blocking);
        let instance = run_blocking(&self.state, engine.resolve_root(key, is_not_named()))?;
        Ok((instance.require::<T>()?, engine.report()))
    }

    pub async fn resolve_async<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve_with_async::<T>(is_not_named()).await
    }

    pub async fn resolve_with_async<T: ?Sized + Send + Sync + 'static>(
        &self,
        filter: RegistrationFilter,
    ) -> Result<Arc<T>> {
        self.resolve_instance_async(ServiceKey::of::<T>(), filter)
            .await?
            .require::<T>()
    }

    pub async fn resolve_named_async<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        self.resolve_with_async::<T>(with_name(name)).await
    }

    pub async fn resolve_generic_async<T: ?Sized + GenericService + Send + Sync>(&self) -> Result<Arc<T>> {
        self.resolve_instance_async(ServiceKey::generic::<T>(), is_not_named())
            .await?
            .require::<T>()
    }

    pub async fn resolve_all_async<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        let items = self
            .resolve_instances_async(ServiceKey::of::<T>(), DependencySettings::default())
            .await?;
        Collection::<T>::from_instances(CollectionShape::List, &items).map(Collection::into_vec)
    }

    /// Run the pre-configurations of `T` that have not run yet, whatever
    /// their registration filters say.
    pub fn force_run_pre_configuration<T: ?Sized + 'static>(&self) -> Result<()> {
        let key = ServiceKey::of::<T>();
        let engine = Engine::new(Arc::clone(&self.state), key.clone(), Mode::Blocking);
        run_blocking(&self.state, engine.force_pre_configurations(key))
    }

    pub async fn force_run_pre_configuration_async<T: ?Sized + 'static>(&self) -> Result<()> {
        let key = ServiceKey::of::<T>();
        let engine = Engine::new(Arc::clone(&self.state), key.clone(), Mode::Async);
        run_async(&self.state, engine.force_pre_configurations(key)).await
    }

    // =========================================================================
    // Query Methods
    // =========================================================================

    /// Whether `T` has a registration here or in an ancestor.
    #[inline]
    pub fn has_registration<T: ?Sized + 'static>(&self) -> bool {
        let type_id = TypeId::of::<T>();
        self.state.chain().any(|s| s.registry.contains(type_id))
    }

    /// Ids of every registration of `T`, nearest scope and most recent first.
    pub fn registration_ids<T: ?Sized + 'static>(&self) -> Vec<RegistrationId> {
        let type_id = TypeId::of::<T>();
        self.state
            .chain()
            .flat_map(|s| s.registry.registrations(type_id))
            .map(|r| r.id())
            .collect()
    }

    /// Number of registrations made directly in this context.
    #[inline]
    pub fn len(&self) -> usize {
        self.state.registry.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn scope_id(&self) -> ScopeId {
        self.state.id
    }

    /// Nesting depth; the root container is 0.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.state.depth
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.state.is_root()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Teardowns waiting for this context to close.
    pub fn pending_teardowns(&self) -> usize {
        self.state.pending_teardowns()
    }

    // =========================================================================
    // Lifecycle Methods
    // =========================================================================

    /// Lock this context to prevent further registrations.
    ///
    /// Scopes opened from it can still register their own services.
    #[inline]
    pub fn lock(&self) {
        self.state.locked.store(true, Ordering::Release);

        #[cfg(feature = "logging")]
        debug!(
            target: "graph_injector",
            scope = %self.state.id,
            registrations = self.state.registry.len(),
            "Container locked - no further registrations allowed"
        );
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.state.locked.load(Ordering::Acquire)
    }

    /// Run this context's teardowns, most recent first, and refuse further
    /// use. Closing twice is a no-op.
    ///
    /// Every teardown runs even if some fail; failures come back together
    /// as [`DiError::Teardown`]. With an async teardown pending nothing
    /// runs: this fails with [`DiError::AsyncRequired`] and the context
    /// stays open for [`close_async`](Self::close_async).
    pub fn close(&self) -> Result<()> {
        let _gate = (!holds_gate())
            .then(|| futures::executor::block_on(self.state.shared.gate.lock()));
        self.state.close()
    }

    /// Like [`close`](Self::close), awaiting async teardowns.
    pub async fn close_async(&self) -> Result<()> {
        let _gate = if holds_gate() {
            None
        } else {
            Some(self.state.shared.gate.lock().await)
        };
        self.state.close_async().await
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("scope", &self.state.id)
            .field("depth", &self.state.depth)
            .field("registry", &self.state.registry)
            .field("locked", &self.is_locked())
            .field("closed", &self.is_closed())
            .finish()
    }
}
