//! Registrations that forward one service to another.

use std::sync::Arc;

use crate::{Lifespan, Parameter, Registration};

/// Service `S` supplied by resolving `I` in the graph being built.
///
/// `I`'s lifespan decides sharing: a once-per-graph `I` is the same object
/// whether a consumer asks for `I` or for `S`.
///
/// ```rust
/// use graph_injector::{Container, Registration, factories};
/// use std::sync::Arc;
///
/// trait Clock: Send + Sync {}
/// struct SystemClock;
/// impl Clock for SystemClock {}
///
/// let container = Container::new();
/// container.register(Registration::value(SystemClock)).unwrap();
/// container
///     .register(factories::use_from_current_graph::<dyn Clock, SystemClock>(|c| c))
///     .unwrap();
/// assert!(container.resolve::<dyn Clock>().is_ok());
/// ```
pub fn use_from_current_graph<S, I>(cast: fn(Arc<I>) -> Arc<S>) -> Registration
where
    S: ?Sized + Send + Sync + 'static,
    I: ?Sized + Send + Sync + 'static,
{
    Registration::factory(move |args| args.current_graph("graph")?.resolve::<I>().map(cast))
        .param(Parameter::current_graph("graph"))
        .implementation_type::<I>()
        .with_lifespan(Lifespan::Transient)
}

/// Service `S` supplied by a separate top-level resolve of `I` from the
/// resolving scope.
pub fn use_registered<S, I>(cast: fn(Arc<I>) -> Arc<S>) -> Registration
where
    S: ?Sized + Send + Sync + 'static,
    I: ?Sized + Send + Sync + 'static,
{
    Registration::factory(move |args| args.resolver("resolver")?.resolve::<I>().map(cast))
        .param(Parameter::resolver("resolver"))
        .implementation_type::<I>()
        .with_lifespan(Lifespan::Transient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Container;

    trait Store: Send + Sync {}

    struct MemoryStore;

    impl Store for MemoryStore {}

    struct Consumer {
        concrete: Arc<MemoryStore>,
        abstracted: Arc<dyn Store>,
    }

    fn container(forward: Registration) -> Container {
        let container = Container::new();
        container
            .register(Registration::factory(|_| Ok(Arc::new(MemoryStore))))
            .unwrap();
        container.register(forward).unwrap();
        container
            .register(
                Registration::factory(|args| {
                    Ok(Arc::new(Consumer {
                        concrete: args.get("concrete")?,
                        abstracted: args.get("abstracted")?,
                    }))
                })
                .params([
                    Parameter::service::<MemoryStore>("concrete"),
                    Parameter::service::<dyn Store>("abstracted"),
                ]),
            )
            .unwrap();
        container
    }

    fn same(consumer: &Consumer) -> bool {
        Arc::as_ptr(&consumer.concrete) as *const () == Arc::as_ptr(&consumer.abstracted) as *const ()
    }

    #[test]
    fn test_current_graph_shares_once_per_graph_instance() {
        let container = container(use_from_current_graph::<dyn Store, MemoryStore>(|s| s));
        let consumer = container.resolve::<Consumer>().unwrap();
        assert!(same(&consumer));
    }

    #[test]
    fn test_registered_resolves_a_separate_graph() {
        let container = container(use_registered::<dyn Store, MemoryStore>(|s| s));
        let consumer = container.resolve::<Consumer>().unwrap();
        assert!(!same(&consumer));
    }
}
