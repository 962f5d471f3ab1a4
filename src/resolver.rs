//! The resolution engine.
//!
//! One async implementation serves both call modes. Blocking calls poll it
//! once with `now_or_never`: sync factories complete inline and async ones
//! are refused before they are called, so that single poll always finishes.
//!
//! Per-graph state sits behind a `parking_lot::Mutex` that is only locked
//! inside short synchronous sections, never across an await or a user
//! callback that may resolve.

use std::cell::Cell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;

#[cfg(feature = "logging")]
use tracing::{debug, trace, warn};

use crate::arguments::ArgumentValue;
use crate::cache::CacheKey;
use crate::context::NodeKind;
use crate::error::AsyncSite;
use crate::factory::{Activator, Built};
use crate::filters::RegistrationFilter;
use crate::filters::registration::{is_not_named, with_name};
use crate::graph::DependencyGraph;
use crate::node::{GraphState, Node, NodeId};
use crate::scope::ScopeState;
use crate::{
    AmbiguityPolicy, Arguments, Collection, CollectionShape, Container, DecoratorRegistration,
    DependencySettings, DiError, Instance, Lifespan, ParamKind, Parameter, PreConfiguration,
    Registration, RegistrationId, Result, ScopeId, ServiceKey,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Blocking,
    Async,
}

/// Anything the engine can activate: registrations, decorators and
/// pre-configurations.
pub(crate) trait Activatable: Send + Sync {
    fn activator(&self) -> &Activator;

    fn parameters(&self) -> &[Parameter];

    fn settings(&self, name: &str) -> DependencySettings;

    /// Name reported in argument and async errors.
    fn owner(&self) -> &'static str;
}

impl Activatable for Registration {
    fn activator(&self) -> &Activator {
        &self.activator
    }

    fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    fn settings(&self, name: &str) -> DependencySettings {
        Registration::settings(self, name)
    }

    fn owner(&self) -> &'static str {
        self.service.type_name()
    }
}

impl Activatable for DecoratorRegistration {
    fn activator(&self) -> &Activator {
        &self.activator
    }

    fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    fn settings(&self, name: &str) -> DependencySettings {
        DecoratorRegistration::settings(self, name)
    }

    fn owner(&self) -> &'static str {
        self.implementation().name()
    }
}

impl Activatable for PreConfiguration {
    fn activator(&self) -> &Activator {
        &self.activator
    }

    fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    fn settings(&self, name: &str) -> DependencySettings {
        PreConfiguration::settings(self, name)
    }

    fn owner(&self) -> &'static str {
        self.implementation().name()
    }
}

/// A registration together with the scope level that holds it.
struct Candidate {
    registration: Arc<Registration>,
    owner: Arc<ScopeState>,
}

// =============================================================================
// Engine
// =============================================================================

/// One resolve call: the scope it runs in and the graph it builds.
#[derive(Clone)]
pub(crate) struct Engine {
    scope: Arc<ScopeState>,
    graph: Arc<Mutex<GraphState>>,
    mode: Mode,
}

impl Engine {
    pub(crate) fn new(scope: Arc<ScopeState>, request: ServiceKey, mode: Mode) -> Self {
        Self {
            scope,
            graph: Arc::new(Mutex::new(GraphState::new(request))),
            mode,
        }
    }

    #[inline]
    fn with_graph<R>(&self, f: impl FnOnce(&mut GraphState) -> R) -> R {
        f(&mut self.graph.lock())
    }

    fn root(&self) -> NodeId {
        self.with_graph(|g| g.root())
    }

    /// Owned report of everything built so far.
    pub(crate) fn report(&self) -> DependencyGraph {
        self.with_graph(|g| DependencyGraph::from_state(g))
    }

    pub(crate) async fn resolve_root(&self, key: ServiceKey, filter: RegistrationFilter) -> Result<Instance> {
        #[cfg(feature = "logging")]
        debug!(
            target: "graph_injector",
            service = key.type_name(),
            filter = filter.label(),
            scope = %self.scope.id,
            "Resolving service"
        );

        let root = self.root();
        self.resolve_single(root, key, filter, None).await
    }

    pub(crate) async fn resolve_root_many(
        &self,
        element: ServiceKey,
        settings: DependencySettings,
    ) -> Result<Vec<Instance>> {
        #[cfg(feature = "logging")]
        debug!(
            target: "graph_injector",
            service = element.type_name(),
            scope = %self.scope.id,
            "Resolving collection"
        );

        let root = self.root();
        self.resolve_many(root, element, settings, None).await
    }

    /// Runs every pending pre-configuration of `key`, ignoring registration
    /// filters.
    pub(crate) async fn force_pre_configurations(&self, key: ServiceKey) -> Result<()> {
        let root = self.root();
        let mut pending: Vec<Arc<PreConfiguration>> = self
            .scope
            .chain()
            .flat_map(|s| s.registry.pre_configurations(key.type_id()))
            .filter(|p| !p.has_run())
            .collect();
        pending.sort_by_key(|p| p.id());
        for pre in pending {
            self.run_pre_configuration(root, key.clone(), &pre).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Selection
    // =========================================================================

    fn resolve_single<'a>(
        &'a self,
        parent: NodeId,
        key: ServiceKey,
        filter: RegistrationFilter,
        parameter: Option<String>,
    ) -> BoxFuture<'a, Result<Instance>> {
        async move {
            let cycle = self.with_graph(|g| {
                g.is_cyclic(parent, &key)
                    .then(|| g.chain(parent, parameter.as_deref()))
            });
            if let Some(chain) = cycle {
                return Err(DiError::CyclicDependency {
                    service: key.type_name(),
                    chain,
                });
            }

            let candidate = self.select(parent, &key, &filter, parameter.as_deref())?;
            self.build_registration(parent, key, candidate, parameter).await
        }
        .boxed()
    }

    fn select(
        &self,
        requester: NodeId,
        key: &ServiceKey,
        filter: &RegistrationFilter,
        parameter: Option<&str>,
    ) -> Result<Candidate> {
        let mut candidates = self.candidates(requester, key, filter);
        if candidates.is_empty() {
            candidates = self.specialized(requester, key, filter)?;
        }

        if self.scope.shared.options.ambiguity == AmbiguityPolicy::Error {
            if let Some(first) = candidates.first() {
                // Registrations in a nearer scope override, they do not compete
                let count = candidates
                    .iter()
                    .take_while(|c| Arc::ptr_eq(&c.owner, &first.owner))
                    .count();
                if count > 1 {
                    return Err(DiError::AmbiguousRegistration {
                        service: key.type_name(),
                        filter: filter.label().to_string(),
                        count,
                    });
                }
            }
        }

        match candidates.into_iter().next() {
            Some(candidate) => Ok(candidate),
            None => Err(DiError::Resolution {
                service: key.type_name(),
                filter: filter.label().to_string(),
                chain: self.with_graph(|g| g.chain(requester, parameter)),
            }),
        }
    }

    /// Matching registrations, nearest scope first and most recent first
    /// within a scope.
    fn candidates(&self, requester: NodeId, key: &ServiceKey, filter: &RegistrationFilter) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for scope in self.scope.chain() {
            for registration in scope.registry.registrations(key.type_id()) {
                if filter.test(&registration) {
                    candidates.push(Candidate {
                        registration,
                        owner: Arc::clone(scope),
                    });
                }
            }
        }
        self.with_graph(|g| {
            candidates.retain(|c| c.registration.parent_node_filter.test(g.view(requester)));
        });
        candidates
    }

    fn specialized(
        &self,
        requester: NodeId,
        key: &ServiceKey,
        filter: &RegistrationFilter,
    ) -> Result<Vec<Candidate>> {
        if key.binding().is_none() {
            return Ok(Vec::new());
        }
        for scope in self.scope.chain() {
            let Some(registration) = scope.registry.specialize(key)? else {
                continue;
            };
            let accepted = filter.test(&registration)
                && self.with_graph(|g| registration.parent_node_filter.test(g.view(requester)));
            if accepted {
                return Ok(vec![Candidate {
                    registration,
                    owner: Arc::clone(scope),
                }]);
            }
        }
        Ok(Vec::new())
    }

    // =========================================================================
    // Lifespan caches
    // =========================================================================

    fn cached(&self, lifespan: Lifespan, owner: &Arc<ScopeState>, key: &CacheKey) -> Option<Instance> {
        match (lifespan, self.scope.is_root()) {
            (Lifespan::Transient, _) => None,
            (Lifespan::OncePerGraph, _) | (Lifespan::Scoped, true) => {
                self.with_graph(|g| g.once_per_graph.get(key).cloned())
            }
            (Lifespan::Scoped, false) => self
                .scope
                .chain()
                .filter(|s| !s.is_root())
                .find_map(|s| s.cache.get(key)),
            (Lifespan::Singleton, _) => owner.cache.get(key),
        }
    }

    fn store(&self, lifespan: Lifespan, owner: &Arc<ScopeState>, key: CacheKey, instance: Instance) {
        match (lifespan, self.scope.is_root()) {
            (Lifespan::Transient, _) => {}
            (Lifespan::OncePerGraph, _) | (Lifespan::Scoped, true) => {
                self.with_graph(|g| g.once_per_graph.insert(key, instance));
            }
            (Lifespan::Scoped, false) => self.scope.cache.insert(key, instance),
            (Lifespan::Singleton, _) => owner.cache.insert(key, instance),
        }
    }

    /// Hands a teardown to the scope that owns the instance.
    fn keep(&self, built: Built, service: &'static str, lifespan: Lifespan, owner: &Arc<ScopeState>) -> Instance {
        if let Some(teardown) = built.teardown {
            let holder = if lifespan == Lifespan::Singleton { owner } else { &self.scope };
            holder.push_teardown(service, teardown);
        }
        built.instance
    }

    // =========================================================================
    // Construction
    // =========================================================================

    async fn build_registration(
        &self,
        parent: NodeId,
        key: ServiceKey,
        candidate: Candidate,
        parameter: Option<String>,
    ) -> Result<Instance> {
        let Candidate { registration, owner } = candidate;
        let lifespan = registration.lifespan();
        let cache_key = CacheKey::new(registration.id(), key.type_id());

        if let Some(instance) = self.cached(lifespan, &owner, &cache_key) {
            self.with_graph(|g| {
                let mut node = Node::for_registration(&registration, key.clone()).parameter(parameter.as_deref());
                node.cached = true;
                node.instance = Some(instance.clone());
                g.add_child(parent, node);
            });

            #[cfg(feature = "logging")]
            trace!(
                target: "graph_injector",
                service = key.type_name(),
                registration = %registration.id(),
                lifespan = ?lifespan,
                "Reused cached instance"
            );

            return Ok(instance);
        }

        let node = self.with_graph(|g| {
            g.add_child(
                parent,
                Node::for_registration(&registration, key.clone()).parameter(parameter.as_deref()),
            )
        });
        self.run_pre_configurations(node, &registration).await?;

        let raw = if registration.is_indexed() {
            // Shared by the service and implementation keys of one registration
            let raw_key = CacheKey::raw(registration.id(), registration.implementation().id());
            match self.cached(lifespan, &owner, &raw_key) {
                Some(raw) => raw,
                None => {
                    let raw = self.build_raw(node, &registration, lifespan, &owner).await?;
                    self.store(lifespan, &owner, raw_key, raw.clone());
                    raw
                }
            }
        } else {
            self.build_raw(node, &registration, lifespan, &owner).await?
        };
        let instance = registration.project(&key, raw)?;

        let instance = self
            .decorate(node, &key, &registration, lifespan, &owner, instance)
            .await?;
        self.store(lifespan, &owner, cache_key, instance.clone());
        self.with_graph(|g| g.node_mut(node).instance = Some(instance.clone()));

        #[cfg(feature = "logging")]
        trace!(
            target: "graph_injector",
            service = key.type_name(),
            implementation = registration.implementation().name(),
            registration = %registration.id(),
            lifespan = ?lifespan,
            "Built instance"
        );

        Ok(instance)
    }

    async fn build_raw(
        &self,
        node: NodeId,
        registration: &Registration,
        lifespan: Lifespan,
        owner: &Arc<ScopeState>,
    ) -> Result<Instance> {
        let built = self.activate(node, registration, AsyncSite::Factory, None).await?;
        let raw = self.keep(built, registration.service().type_name(), lifespan, owner);
        if let Some(teardown) = registration.scoped_teardown_for(&raw) {
            self.scope.push_teardown(registration.service().type_name(), teardown?);
        }
        Ok(raw)
    }

    /// Resolves the declared parameters of `target` and calls it.
    ///
    /// `decorated` names the parameter that receives the wrapped instance.
    async fn activate<A>(
        &self,
        node: NodeId,
        target: &A,
        site: AsyncSite,
        decorated: Option<(&str, Instance)>,
    ) -> Result<Built>
    where
        A: Activatable + ?Sized,
    {
        let call = match target.activator() {
            Activator::Instance(instance) => return Ok(Built::plain(instance.clone())),
            Activator::Async(_) if self.mode == Mode::Blocking => {
                return Err(DiError::AsyncRequired {
                    service: target.owner(),
                    site,
                });
            }
            other => other.clone(),
        };

        let mut args = Arguments::new(target.owner());
        for parameter in target.parameters() {
            let value = match &decorated {
                Some((name, inner)) if parameter.name() == *name => ArgumentValue::Instance(inner.clone()),
                _ => {
                    self.argument(node, target.owner(), parameter, target.settings(parameter.name()))
                        .await?
                }
            };
            args.push(parameter.name(), value);
        }

        match call {
            Activator::Sync(activation) => activation(&mut args),
            Activator::Async(activation) => activation(args).await,
            Activator::Instance(instance) => Ok(Built::plain(instance)),
        }
    }

    async fn argument(
        &self,
        node: NodeId,
        owner: &'static str,
        parameter: &Parameter,
        settings: DependencySettings,
    ) -> Result<ArgumentValue> {
        let name = parameter.name();
        let context = self.with_graph(|g| g.context(node, name));
        if let Some(value) = settings.value_factory.supply(parameter.default(), &context) {
            return Ok(ArgumentValue::Instance(value));
        }

        match parameter.kind() {
            ParamKind::DependencyContext => Ok(ArgumentValue::Context(context)),
            ParamKind::Resolver => Ok(ArgumentValue::Resolver(Resolver::new(Container::from_state(
                Arc::clone(&self.scope),
            )))),
            ParamKind::CurrentGraph => Ok(ArgumentValue::Graph(GraphResolver {
                scope: Arc::clone(&self.scope),
                graph: Arc::clone(&self.graph),
                node,
            })),
            ParamKind::Service(key) => self
                .resolve_single(node, key.clone(), settings.registration_filter(), Some(name.to_string()))
                .await
                .map(ArgumentValue::Instance),
            ParamKind::Collection { element, shape } => {
                let shape = *shape;
                self.resolve_many(node, element.clone(), settings, Some(name.to_string()))
                    .await
                    .map(|items| ArgumentValue::Collection { shape, items })
            }
            ParamKind::Unbound => Err(DiError::argument(owner, name, "no value configured")),
        }
    }

    fn resolve_many<'a>(
        &'a self,
        parent: NodeId,
        element: ServiceKey,
        settings: DependencySettings,
        parameter: Option<String>,
    ) -> BoxFuture<'a, Result<Vec<Instance>>> {
        async move {
            let many = element.clone().many();
            let cycle = self.with_graph(|g| {
                g.is_cyclic(parent, &many)
                    .then(|| g.chain(parent, parameter.as_deref()))
            });
            if let Some(chain) = cycle {
                return Err(DiError::CyclicDependency {
                    service: element.type_name(),
                    chain,
                });
            }

            let collection = self.with_graph(|g| {
                g.add_child(parent, Node::new(NodeKind::Collection, many).parameter(parameter.as_deref()))
            });

            // Members are requested on behalf of the collection's parent
            let filter = settings.registration_filter();
            let mut owners: HashMap<RegistrationId, Arc<ScopeState>> = HashMap::new();
            let registrations: Vec<Arc<Registration>> = self
                .candidates(parent, &element, &filter)
                .into_iter()
                .map(|c| {
                    owners.insert(c.registration.id(), c.owner);
                    c.registration
                })
                .collect();

            let mut selected = settings.list_reducer.reduce(registrations);
            if let Some(modifier) = &settings.list_modifier {
                selected = modifier.apply(selected);
            }

            let mut items = Vec::with_capacity(selected.len());
            for registration in selected {
                let owner = owners
                    .get(&registration.id())
                    .cloned()
                    .unwrap_or_else(|| Arc::clone(&self.scope));
                let candidate = Candidate { registration, owner };
                items.push(
                    self.build_registration(collection, element.clone(), candidate, None)
                        .await?,
                );
            }

            #[cfg(feature = "logging")]
            trace!(
                target: "graph_injector",
                service = element.type_name(),
                count = items.len(),
                "Resolved collection"
            );

            Ok(items)
        }
        .boxed()
    }

    // =========================================================================
    // Decorators and pre-configurations
    // =========================================================================

    async fn decorate(
        &self,
        node: NodeId,
        key: &ServiceKey,
        registration: &Registration,
        lifespan: Lifespan,
        owner: &Arc<ScopeState>,
        instance: Instance,
    ) -> Result<Instance> {
        let binding = match key.binding() {
            Some(binding) => Some(binding),
            None if key.type_id() == registration.service().type_id() => registration.service().binding(),
            None => None,
        };

        let mut decorators: Vec<Arc<DecoratorRegistration>> = Vec::new();
        for scope in self.scope.chain() {
            decorators.extend(scope.registry.decorators(key.type_id()));
            if let Some(binding) = binding {
                decorators.extend(scope.registry.specialized_decorators(key, binding)?);
            }
        }
        decorators.retain(|d| {
            d.applies_to(registration) && self.with_graph(|g| d.node_filter_ref().test(g.view(node)))
        });
        if decorators.is_empty() {
            return Ok(instance);
        }
        DecoratorRegistration::sort(&mut decorators);

        let mut current = instance;
        let mut current_node = node;
        for decorator in decorators {
            let Some(decorated) = decorator.decorated_name().map(str::to_string) else {
                return Err(DiError::Internal(format!(
                    "decorator {} has no decorated parameter",
                    decorator.id()
                )));
            };
            let decorator_node = self.with_graph(|g| {
                let parameter = g.node(current_node).parameter.clone();
                let mut wrapper = Node::new(NodeKind::Decorator, key.clone()).implementation(decorator.implementation());
                wrapper.parameter = parameter;
                g.add_decorator(current_node, wrapper)
            });

            let built = self
                .activate(
                    decorator_node,
                    decorator.as_ref(),
                    AsyncSite::Decorator,
                    Some((decorated.as_str(), current)),
                )
                .await?;
            current = self.keep(built, decorator.implementation().name(), lifespan, owner);
            self.with_graph(|g| g.node_mut(decorator_node).instance = Some(current.clone()));
            current_node = decorator_node;

            #[cfg(feature = "logging")]
            trace!(
                target: "graph_injector",
                service = key.type_name(),
                decorator = decorator.implementation().name(),
                position = decorator.position(),
                "Applied decorator"
            );
        }
        Ok(current)
    }

    async fn run_pre_configurations(&self, node: NodeId, registration: &Registration) -> Result<()> {
        let service = registration.service();
        let mut pending: Vec<Arc<PreConfiguration>> = self
            .scope
            .chain()
            .flat_map(|s| s.registry.pre_configurations(service.type_id()))
            .filter(|p| p.applies_to(registration))
            .collect();
        pending.sort_by_key(|p| p.id());

        for pre in pending {
            self.run_pre_configuration(node, service.clone(), &pre).await?;
        }
        Ok(())
    }

    async fn run_pre_configuration(&self, parent: NodeId, service: ServiceKey, pre: &PreConfiguration) -> Result<()> {
        if pre.has_run() {
            return Ok(());
        }
        let node = self.with_graph(|g| {
            g.add_child(
                parent,
                Node::new(NodeKind::PreConfiguration, service).implementation(pre.implementation()),
            )
        });

        match self.activate(node, pre, AsyncSite::PreConfiguration, None).await {
            Ok(built) => {
                if let Some(teardown) = built.teardown {
                    self.scope
                        .root_state()
                        .push_teardown(pre.implementation().name(), teardown);
                }
            }
            Err(error) if pre.continues_on_failure() && !matches!(error, DiError::AsyncRequired { .. }) => {
                #[cfg(feature = "logging")]
                warn!(
                    target: "graph_injector",
                    pre_configuration = %pre.id(),
                    error = %error,
                    "Pre-configuration failed, continuing"
                );
                #[cfg(not(feature = "logging"))]
                let _ = error;
            }
            Err(error) => return Err(error),
        }
        pre.mark_run();

        #[cfg(feature = "logging")]
        debug!(
            target: "graph_injector",
            pre_configuration = %pre.id(),
            implementation = pre.implementation().name(),
            "Ran pre-configuration"
        );

        Ok(())
    }
}

// =============================================================================
// Driving the engine
// =============================================================================

thread_local! {
    /// Blocking resolves running on this thread; nested ones skip the gate.
    static BLOCKING_DEPTH: Cell<usize> = const { Cell::new(0) };
}

tokio::task_local! {
    /// Set while an async resolve holds the gate; nested ones skip it.
    static GATE_HELD: ();
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        BLOCKING_DEPTH.with(|d| d.set(d.get() + 1));
        DepthGuard
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        BLOCKING_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

pub(crate) fn poll_once<T>(future: impl Future<Output = Result<T>>) -> Result<T> {
    future
        .now_or_never()
        .unwrap_or_else(|| Err(DiError::Internal("blocking resolution suspended".into())))
}

/// Whether the caller runs inside a resolve that already holds the gate:
/// a blocking resolve on this thread, or an async resolve on this task.
pub(crate) fn holds_gate() -> bool {
    BLOCKING_DEPTH.with(|d| d.get() > 0) || GATE_HELD.try_with(|_| ()).is_ok()
}

/// Runs `future` to completion on the calling thread under the
/// container's gate.
pub(crate) fn run_blocking<T>(scope: &Arc<ScopeState>, future: impl Future<Output = Result<T>>) -> Result<T> {
    scope.ensure_open()?;
    let _gate = (!holds_gate()).then(|| futures::executor::block_on(scope.shared.gate.lock()));
    let _depth = DepthGuard::enter();
    poll_once(future)
}

pub(crate) async fn run_async<T>(scope: &Arc<ScopeState>, future: impl Future<Output = Result<T>>) -> Result<T> {
    scope.ensure_open()?;
    if holds_gate() {
        return future.await;
    }
    let _gate = scope.shared.gate.lock().await;
    GATE_HELD.scope((), future).await
}

// =============================================================================
// Handles injected into factories
// =============================================================================

/// Resolves from the scope that is building the current service.
///
/// Injected through [`Parameter::resolver`]. Each call is a new top-level
/// resolve. Calls made while the resolve that injected it is still
/// running share that resolve's gate; calls from a kept handle take the
/// gate like [`Container::resolve`].
#[derive(Clone)]
pub struct Resolver {
    container: Container,
}

impl Resolver {
    pub(crate) fn new(container: Container) -> Self {
        Self { container }
    }

    pub fn scope_id(&self) -> ScopeId {
        self.container.state.id
    }

    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve_with::<T>(is_not_named())
    }

    pub fn resolve_with<T: ?Sized + Send + Sync + 'static>(&self, filter: RegistrationFilter) -> Result<Arc<T>> {
        self.container
            .resolve_instance(ServiceKey::of::<T>(), filter)?
            .require::<T>()
    }

    pub fn resolve_named<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        self.resolve_with::<T>(with_name(name))
    }

    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        let items = self
            .container
            .resolve_instances(ServiceKey::of::<T>(), DependencySettings::default())?;
        Collection::<T>::from_instances(CollectionShape::List, &items).map(Collection::into_vec)
    }

    pub async fn resolve_async<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.container
            .resolve_instance_async(ServiceKey::of::<T>(), is_not_named())
            .await?
            .require::<T>()
    }

    pub async fn resolve_all_async<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        let items = self
            .container
            .resolve_instances_async(ServiceKey::of::<T>(), DependencySettings::default())
            .await?;
        Collection::<T>::from_instances(CollectionShape::List, &items).map(Collection::into_vec)
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").field("scope", &self.scope_id()).finish()
    }
}

/// Resolves within the graph that is building the current service, so
/// once-per-graph instances are shared with it.
///
/// Injected through [`Parameter::current_graph`]. Only meaningful during
/// construction; do not keep it in the built service.
#[derive(Clone)]
pub struct GraphResolver {
    scope: Arc<ScopeState>,
    graph: Arc<Mutex<GraphState>>,
    node: NodeId,
}

impl GraphResolver {
    fn engine(&self, mode: Mode) -> Engine {
        Engine {
            scope: Arc::clone(&self.scope),
            graph: Arc::clone(&self.graph),
            mode,
        }
    }

    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve_with::<T>(is_not_named())
    }

    pub fn resolve_with<T: ?Sized + Send + Sync + 'static>(&self, filter: RegistrationFilter) -> Result<Arc<T>> {
        let engine = self.engine(Mode::Blocking);
        poll_once(engine.resolve_single(self.node, ServiceKey::of::<T>(), filter, None))?.require::<T>()
    }

    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        let engine = self.engine(Mode::Blocking);
        let items = poll_once(engine.resolve_many(
            self.node,
            ServiceKey::of::<T>(),
            DependencySettings::default(),
            None,
        ))?;
        Collection::<T>::from_instances(CollectionShape::List, &items).map(Collection::into_vec)
    }

    pub async fn resolve_async<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let engine = self.engine(Mode::Async);
        engine
            .resolve_single(self.node, ServiceKey::of::<T>(), is_not_named(), None)
            .await?
            .require::<T>()
    }
}

impl std::fmt::Debug for GraphResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphResolver")
            .field("scope", &self.scope.id)
            .field("nodes", &self.graph.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Lifespan, Registration};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Leaf;

    struct Branch {
        leaf: Arc<Leaf>,
    }

    fn branch() -> Registration {
        Registration::factory(|args| Ok(Arc::new(Branch { leaf: args.get("leaf")? })))
            .param(Parameter::service::<Leaf>("leaf"))
    }

    #[test]
    fn test_blocking_mode_refuses_async_factories_before_arguments() {
        static LEAVES: AtomicUsize = AtomicUsize::new(0);

        let container = Container::new();
        container
            .register(Registration::factory(|_| {
                LEAVES.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Leaf))
            }))
            .unwrap();
        container
            .register(
                Registration::async_factory(|args: Arguments| async move {
                    Ok::<_, DiError>(Arc::new(Branch { leaf: args.get("leaf")? }))
                })
                .param(Parameter::service::<Leaf>("leaf")),
            )
            .unwrap();

        match container.resolve::<Branch>() {
            Err(DiError::AsyncRequired { site, .. }) => assert_eq!(site, AsyncSite::Factory),
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
        assert_eq!(LEAVES.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_async_mode_awaits_async_factories() {
        let container = Container::new();
        container
            .register(Registration::async_factory(|_| async { Ok(Arc::new(Leaf)) }))
            .unwrap();
        container.register(branch()).unwrap();

        let built = container.resolve_async::<Branch>().await.unwrap();
        let _: &Leaf = &built.leaf;
    }

    #[test]
    fn test_missing_dependency_reports_chain() {
        let container = Container::new();
        container.register(branch()).unwrap();

        let err = container.resolve::<Branch>().err().unwrap();
        let chain = err.chain().unwrap();
        assert_eq!(chain.links().len(), 1);
        assert_eq!(chain.failed_parameter(), Some("leaf"));
        assert!(err.to_string().contains("filter: is_not_named"));
    }

    #[test]
    fn test_resolver_handle_resolves_inside_a_factory() {
        let container = Container::new();
        container.register(Registration::value(Leaf)).unwrap();
        container
            .register(
                Registration::factory(|args| {
                    let resolver = args.resolver("resolver")?;
                    Ok(Arc::new(Branch { leaf: resolver.resolve()? }))
                })
                .param(Parameter::resolver("resolver")),
            )
            .unwrap();

        let built = container.resolve::<Branch>().unwrap();
        assert!(Arc::ptr_eq(&built.leaf, &container.resolve::<Leaf>().unwrap()));
    }

    #[test]
    fn test_graph_resolver_shares_once_per_graph_instances() {
        struct Pair {
            first: Arc<Leaf>,
            second: Arc<Leaf>,
        }

        let container = Container::new();
        container
            .register(Registration::factory(|_| Ok(Arc::new(Leaf))).with_lifespan(Lifespan::OncePerGraph))
            .unwrap();
        container
            .register(
                Registration::factory(|args| {
                    let graph = args.current_graph("graph")?;
                    Ok(Arc::new(Pair {
                        first: args.get("leaf")?,
                        second: graph.resolve()?,
                    }))
                })
                .param(Parameter::service::<Leaf>("leaf"))
                .param(Parameter::current_graph("graph")),
            )
            .unwrap();

        let pair = container.resolve::<Pair>().unwrap();
        assert!(Arc::ptr_eq(&pair.first, &pair.second));
    }

    #[test]
    fn test_nested_blocking_resolve_skips_the_gate() {
        let container = Container::new();
        container.register(Registration::value(Leaf)).unwrap();
        let captured = container.clone();
        container
            .register(Registration::factory(move |_| {
                Ok(Arc::new(Branch {
                    leaf: captured.resolve::<Leaf>()?,
                }))
            }))
            .unwrap();

        assert!(container.resolve::<Branch>().is_ok());
    }

    #[test]
    fn test_kept_resolver_builds_singletons_once() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);

        struct Locator {
            resolver: Resolver,
        }

        let container = Container::new();
        container
            .register(
                Registration::factory(|_| {
                    BUILT.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(50));
                    Ok(Arc::new(Leaf))
                })
                .with_lifespan(Lifespan::Singleton),
            )
            .unwrap();
        container
            .register(
                Registration::factory(|args| Ok(Arc::new(Locator { resolver: args.resolver("resolver")? })))
                    .param(Parameter::resolver("resolver"))
                    .with_lifespan(Lifespan::Singleton),
            )
            .unwrap();

        let locator = container.resolve::<Locator>().unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locator = Arc::clone(&locator);
                std::thread::spawn(move || locator.resolver.resolve::<Leaf>().unwrap())
            })
            .collect();
        let leaves: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
        assert!(leaves.iter().all(|leaf| Arc::ptr_eq(leaf, &leaves[0])));
    }

    #[tokio::test]
    async fn test_nested_async_resolve_shares_the_gate() {
        let container = Container::new();
        container.register(Registration::value(Leaf)).unwrap();
        let captured = container.clone();
        container
            .register(Registration::async_factory(move |_| {
                let captured = captured.clone();
                async move {
                    let leaf = captured.resolve_async::<Leaf>().await?;
                    Ok::<_, DiError>(Arc::new(Branch { leaf }))
                }
            }))
            .unwrap();

        let built = tokio::time::timeout(std::time::Duration::from_secs(5), container.resolve_async::<Branch>())
            .await
            .expect("nested resolve waited on the gate");
        assert!(built.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_async_singleton_shared_across_scopes() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);

        let root = Container::new();
        root.register(
            Registration::async_factory(|_| async {
                BUILT.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Ok(Arc::new(Leaf))
            })
            .with_lifespan(Lifespan::Singleton),
        )
        .unwrap();

        let first = root.new_scope().unwrap();
        let second = root.new_scope().unwrap();
        let (a, b) = tokio::join!(first.resolve_async::<Leaf>(), second.resolve_async::<Leaf>());

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_value_factory_overrides_injected_handles() {
        let other = Container::new();
        other.register(Registration::value(Leaf)).unwrap();

        let container = Container::new();
        container
            .register(
                Registration::factory(|args| {
                    let resolver = args.resolver("resolver")?;
                    Ok(Arc::new(Branch { leaf: resolver.resolve()? }))
                })
                .param(Parameter::resolver("resolver"))
                .dependency("resolver", DependencySettings::value(Resolver::new(other.clone()))),
            )
            .unwrap();

        let built = container.resolve::<Branch>().unwrap();
        assert!(Arc::ptr_eq(&built.leaf, &other.resolve::<Leaf>().unwrap()));
        assert!(!container.has_registration::<Leaf>());
    }
}
