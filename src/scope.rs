//! Scopes: nested resolution contexts with their own registrations,
//! instance cache and teardown stack.

use std::any::TypeId;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;

#[cfg(feature = "logging")]
use tracing::{debug, warn};

use crate::cache::InstanceCache;
use crate::error::{AsyncSite, TeardownErrors};
use crate::factory::Teardown;
use crate::registry::Registry;
use crate::{Container, ContainerOptions, DiError, Registration, Result};

/// Unique scope identifier.
///
/// Each scope gets a unique ID for tracking and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    #[inline]
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

// =============================================================================
// Scope state
// =============================================================================

/// State shared by every scope of one container tree.
pub(crate) struct Shared {
    /// Serializes top-level resolutions and closes
    pub(crate) gate: tokio::sync::Mutex<()>,
    pub(crate) options: ContainerOptions,
    /// Bundle types applied with `RunOncePerType`
    pub(crate) applied_bundles: DashMap<TypeId, &'static str, RandomState>,
}

struct PendingTeardown {
    service: &'static str,
    teardown: Teardown,
}

pub(crate) struct ScopeState {
    pub(crate) id: ScopeId,
    pub(crate) parent: Option<Arc<ScopeState>>,
    pub(crate) depth: u32,
    pub(crate) registry: Registry,
    pub(crate) cache: InstanceCache,
    teardowns: Mutex<Vec<PendingTeardown>>,
    closed: AtomicBool,
    pub(crate) locked: AtomicBool,
    pub(crate) shared: Arc<Shared>,
}

impl ScopeState {
    pub(crate) fn root(options: ContainerOptions) -> Arc<Self> {
        let shared = Arc::new(Shared {
            gate: tokio::sync::Mutex::new(()),
            options,
            applied_bundles: DashMap::with_hasher(RandomState::new()),
        });
        Arc::new(Self::with(None, 0, shared))
    }

    pub(crate) fn child(self: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self::with(
            Some(Arc::clone(self)),
            self.depth + 1,
            Arc::clone(&self.shared),
        ))
    }

    fn with(parent: Option<Arc<ScopeState>>, depth: u32, shared: Arc<Shared>) -> Self {
        Self {
            id: ScopeId::next(),
            parent,
            depth,
            registry: Registry::new(),
            cache: InstanceCache::new(),
            teardowns: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            locked: AtomicBool::new(false),
            shared,
        }
    }

    #[inline]
    pub(crate) fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// This scope, then each ancestor up to the root.
    pub(crate) fn chain(self: &Arc<Self>) -> impl Iterator<Item = &Arc<ScopeState>> {
        std::iter::successors(Some(self), |s| s.parent.as_ref())
    }

    pub(crate) fn root_state(self: &Arc<Self>) -> &Arc<ScopeState> {
        let mut current = self;
        while let Some(parent) = &current.parent {
            current = parent;
        }
        current
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Fails when this scope or any ancestor is closed.
    pub(crate) fn ensure_open(self: &Arc<Self>) -> Result<()> {
        match self.chain().find(|s| s.is_closed()) {
            Some(closed) => Err(DiError::ScopeClosed { scope: closed.id }),
            None => Ok(()),
        }
    }

    pub(crate) fn push_teardown(&self, service: &'static str, teardown: Teardown) {
        self.teardowns.lock().push(PendingTeardown { service, teardown });
    }

    pub(crate) fn pending_teardowns(&self) -> usize {
        self.teardowns.lock().len()
    }

    fn pending_async_teardown(&self) -> Option<&'static str> {
        self.teardowns
            .lock()
            .iter()
            .rev()
            .find(|p| p.teardown.is_async())
            .map(|p| p.service)
    }

    /// Marks the scope closed; `None` when it already was.
    fn begin_close(&self) -> Option<Vec<PendingTeardown>> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return None;
        }
        let mut pending = std::mem::take(&mut *self.teardowns.lock());
        pending.reverse();

        #[cfg(feature = "logging")]
        debug!(
            target: "graph_injector",
            scope = %self.id,
            depth = self.depth,
            teardowns = pending.len(),
            "Closing scope"
        );

        Some(pending)
    }

    fn finish_close(&self, errors: TeardownErrors) -> Result<()> {
        self.cache.clear();
        errors.into_result()
    }

    /// Runs synchronous teardowns, most recent first. With any async
    /// teardown pending the scope stays open for `close_async`.
    pub(crate) fn close(&self) -> Result<()> {
        if let Some(service) = self.pending_async_teardown() {
            return Err(DiError::AsyncRequired {
                service,
                site: AsyncSite::Teardown,
            });
        }
        let Some(pending) = self.begin_close() else {
            return Ok(());
        };
        let mut errors = TeardownErrors::default();
        for PendingTeardown { service, teardown } in pending {
            let outcome = match teardown {
                Teardown::Sync(run) => run(),
                Teardown::Async(_) => Err(DiError::AsyncRequired {
                    service,
                    site: AsyncSite::Teardown,
                }),
            };
            if let Err(error) = outcome {
                record_failure(&mut errors, service, error);
            }
        }
        self.finish_close(errors)
    }

    pub(crate) async fn close_async(&self) -> Result<()> {
        let Some(pending) = self.begin_close() else {
            return Ok(());
        };
        let mut errors = TeardownErrors::default();
        for PendingTeardown { service, teardown } in pending {
            let outcome = match teardown {
                Teardown::Sync(run) => run(),
                Teardown::Async(run) => run().await,
            };
            if let Err(error) = outcome {
                record_failure(&mut errors, service, error);
            }
        }
        self.finish_close(errors)
    }
}

fn record_failure(errors: &mut TeardownErrors, service: &'static str, error: DiError) {
    #[cfg(feature = "logging")]
    warn!(
        target: "graph_injector",
        service = service,
        error = %error,
        "Teardown failed"
    );
    errors.push(service, error);
}

impl Drop for ScopeState {
    fn drop(&mut self) {
        #[cfg(feature = "logging")]
        if !self.is_closed() && !self.teardowns.get_mut().is_empty() {
            warn!(
                target: "graph_injector",
                scope = %self.id,
                teardowns = self.teardowns.get_mut().len(),
                "Scope dropped without being closed; teardowns skipped"
            );
        }
    }
}

// =============================================================================
// Scope handles
// =============================================================================

/// A child resolution context.
///
/// Derefs to [`Container`], so it registers and resolves with the same
/// API; its registrations and scoped instances are visible only to itself
/// and its own children. Close it with [`close`](Container::close) or
/// [`close_async`](Container::close_async), or hold it in a
/// [`ScopeGuard`].
///
/// # Examples
///
/// ```rust
/// use graph_injector::{Container, Lifespan, Registration};
/// use std::sync::Arc;
///
/// struct RequestId(u32);
///
/// let root = Container::new();
/// root.register(Registration::factory(|_| Ok(Arc::new(RequestId(7)))).with_lifespan(Lifespan::Scoped))
///     .unwrap();
///
/// let scope = root.new_scope().unwrap();
/// let a = scope.resolve::<RequestId>().unwrap();
/// let b = scope.resolve::<RequestId>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// scope.close().unwrap();
/// ```
#[derive(Clone)]
pub struct Scope {
    container: Container,
}

impl Scope {
    pub(crate) fn new(container: Container) -> Self {
        Self { container }
    }

    /// Get the scope identifier.
    #[inline]
    pub fn id(&self) -> ScopeId {
        self.container.state.id
    }

    /// The scope as a container handle.
    #[inline]
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Close when the returned guard drops.
    pub fn guard(self) -> ScopeGuard {
        ScopeGuard { scope: Some(self) }
    }
}

impl Deref for Scope {
    type Target = Container;

    fn deref(&self) -> &Container {
        &self.container
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id())
            .field("depth", &self.container.depth())
            .field("closed", &self.container.is_closed())
            .finish()
    }
}

/// Closes its scope when dropped.
///
/// Drop can only run synchronous teardowns; call
/// [`close_async`](ScopeGuard::close_async) first when the scope holds
/// async ones.
pub struct ScopeGuard {
    scope: Option<Scope>,
}

impl ScopeGuard {
    /// Close now, reporting teardown failures.
    pub fn close(mut self) -> Result<()> {
        match self.scope.take() {
            Some(scope) => scope.close(),
            None => Ok(()),
        }
    }

    pub async fn close_async(mut self) -> Result<()> {
        match self.scope.take() {
            Some(scope) => scope.close_async().await,
            None => Ok(()),
        }
    }
}

impl Deref for ScopeGuard {
    type Target = Scope;

    fn deref(&self) -> &Scope {
        // Only `close`/`close_async` take the scope, and both consume the guard.
        match &self.scope {
            Some(scope) => scope,
            None => unreachable!("scope guard used after close"),
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Some(scope) = self.scope.take() {
            #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
            if let Err(error) = scope.close() {
                #[cfg(feature = "logging")]
                warn!(
                    target: "graph_injector",
                    scope = %scope.id(),
                    error = %error,
                    "Scope guard closed with errors"
                );
            }
        }
    }
}

/// Builder for creating scopes with pre-configured registrations.
///
/// Useful for web adapters that register the same per-request values in
/// every scope.
///
/// # Examples
///
/// ```rust
/// use graph_injector::{Container, Registration, ScopeBuilder};
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// static COUNTER: AtomicU64 = AtomicU64::new(0);
///
/// struct RequestId(u64);
///
/// let root = Container::new();
/// let builder = ScopeBuilder::new()
///     .with_value(|| RequestId(COUNTER.fetch_add(1, Ordering::SeqCst)));
///
/// let first = builder.build(&root).unwrap();
/// let second = builder.build(&root).unwrap();
/// assert_ne!(first.resolve::<RequestId>().unwrap().0, second.resolve::<RequestId>().unwrap().0);
/// ```
pub struct ScopeBuilder {
    #[allow(clippy::type_complexity)]
    registrations: Vec<Box<dyn Fn() -> Registration + Send + Sync>>,
}

impl ScopeBuilder {
    #[inline]
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// Register a fresh value in each scope.
    pub fn with_value<T, F>(mut self, value: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.registrations
            .push(Box::new(move || Registration::value(value())));
        self
    }

    /// Register the registration `make` returns in each scope.
    pub fn with_registration<F>(mut self, make: F) -> Self
    where
        F: Fn() -> Registration + Send + Sync + 'static,
    {
        self.registrations.push(Box::new(make));
        self
    }

    /// Open a child scope of `parent` with every registration applied.
    pub fn build(&self, parent: &Container) -> Result<Scope> {
        let scope = parent.new_scope()?;
        for make in &self.registrations {
            scope.register(make())?;
        }
        Ok(scope)
    }
}

impl Default for ScopeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `f` in a fresh child scope of `parent`, closing it afterwards.
///
/// The closure's error wins over teardown errors.
pub fn with_scope<R, F>(parent: &Container, f: F) -> Result<R>
where
    F: FnOnce(&Scope) -> Result<R>,
{
    let scope = parent.new_scope()?;
    let outcome = f(&scope);
    let closed = scope.close();
    let value = outcome?;
    closed.map(|()| value)
}

/// Async [`with_scope`]; async teardowns run too.
pub async fn with_scope_async<R, F, Fut>(parent: &Container, f: F) -> Result<R>
where
    F: FnOnce(Scope) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let scope = parent.new_scope()?;
    let outcome = f(scope.clone()).await;
    let closed = scope.close_async().await;
    let value = outcome?;
    closed.map(|()| value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Lifespan;
    use std::sync::atomic::AtomicUsize;

    struct GlobalService;

    struct RequestService {
        id: String,
    }

    #[test]
    fn test_scope_registrations_stay_local() {
        let root = Container::new();
        root.register(Registration::value(GlobalService)).unwrap();

        let scope = root.new_scope().unwrap();
        scope
            .register(Registration::value(RequestService { id: "req-1".into() }))
            .unwrap();

        assert!(scope.has_registration::<GlobalService>());
        assert!(scope.has_registration::<RequestService>());
        assert!(!root.has_registration::<RequestService>());
        assert_eq!(scope.resolve::<RequestService>().unwrap().id, "req-1");
    }

    #[test]
    fn test_scope_ids_unique() {
        let root = Container::new();
        let s1 = root.new_scope().unwrap();
        let s2 = root.new_scope().unwrap();
        let s3 = s2.new_scope().unwrap();

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert!(format!("{}", s1.id()).starts_with("scope-"));
    }

    #[test]
    fn test_scope_builder() {
        let root = Container::new();
        root.register(Registration::value(GlobalService)).unwrap();

        let builder = ScopeBuilder::new().with_value(|| RequestService { id: "built".into() });
        let scope = builder.build(&root).unwrap();

        assert!(scope.has_registration::<GlobalService>());
        assert_eq!(scope.resolve::<RequestService>().unwrap().id, "built");
    }

    #[test]
    fn test_closed_scope_and_children_reject_work() {
        let root = Container::new();
        let scope = root.new_scope().unwrap();
        let child = scope.new_scope().unwrap();
        scope.close().unwrap();

        assert!(matches!(
            scope.register(Registration::value(1u8)),
            Err(DiError::ScopeClosed { .. })
        ));
        assert!(matches!(child.resolve::<u8>(), Err(DiError::ScopeClosed { scope: id }) if id == scope.id()));
        assert!(scope.close().is_ok());
    }

    #[test]
    fn test_guard_closes_on_drop() {
        static CLOSED: AtomicUsize = AtomicUsize::new(0);

        let root = Container::new();
        root.register(
            Registration::factory(|_| Ok(Arc::new(1u8)))
                .with_lifespan(Lifespan::Scoped)
                .scoped_teardown(|_: Arc<u8>| {
                    CLOSED.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        )
        .unwrap();

        {
            let guard = root.new_scope().unwrap().guard();
            guard.resolve::<u8>().unwrap();
            assert_eq!(CLOSED.load(Ordering::SeqCst), 0);
        }
        assert_eq!(CLOSED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_with_scope_closes_after_closure() {
        static CLOSED: AtomicUsize = AtomicUsize::new(0);

        let root = Container::new();
        root.register(
            Registration::factory(|_| Ok(Arc::new(1u8)))
                .with_lifespan(Lifespan::Scoped)
                .scoped_teardown(|_: Arc<u8>| {
                    CLOSED.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        )
        .unwrap();

        let value = with_scope(&root, |scope| {
            let value = scope.resolve::<u8>()?;
            assert_eq!(CLOSED.load(Ordering::SeqCst), 0);
            Ok(*value)
        })
        .unwrap();
        assert_eq!(value, 1);
        assert_eq!(CLOSED.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_scope_async_runs_async_teardowns() {
        static CLOSED: AtomicUsize = AtomicUsize::new(0);

        let root = Container::new();
        root.register(
            Registration::factory(|_| Ok(Arc::new(1u8)))
                .with_lifespan(Lifespan::Scoped)
                .scoped_teardown_async(|_: Arc<u8>| async {
                    CLOSED.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        )
        .unwrap();

        let value = with_scope_async(&root, |scope| async move {
            let value = scope.resolve_async::<u8>().await?;
            Ok::<_, DiError>(*value)
        })
        .await
        .unwrap();
        assert_eq!(value, 1);
        assert_eq!(CLOSED.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sync_close_leaves_async_teardowns_for_close_async() {
        static CLOSED: AtomicUsize = AtomicUsize::new(0);

        let root = Container::new();
        root.register(
            Registration::factory(|_| Ok(Arc::new(1u8)))
                .with_lifespan(Lifespan::Scoped)
                .scoped_teardown_async(|_: Arc<u8>| async {
                    CLOSED.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        )
        .unwrap();

        let scope = root.new_scope().unwrap();
        scope.resolve_async::<u8>().await.unwrap();
        assert!(matches!(
            scope.close(),
            Err(DiError::AsyncRequired {
                site: AsyncSite::Teardown,
                ..
            })
        ));
        assert!(!scope.is_closed());
        assert_eq!(scope.pending_teardowns(), 1);

        scope.close_async().await.unwrap();
        assert!(scope.is_closed());
        assert_eq!(CLOSED.load(Ordering::SeqCst), 1);
    }
}
