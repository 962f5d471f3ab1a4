//! Ordered registration storage for one scope level.
//!
//! Uses DashMap with ahash for concurrent access; every list is kept in
//! registration order and handed out most recent first.

use std::any::TypeId;
use std::sync::Arc;

use ahash::RandomState;
use dashmap::DashMap;

use crate::generic::{GenericDecorator, Specializer};
use crate::{
    DecoratorRegistration, DiError, GenericBinding, GenericDefinition, PreConfiguration,
    Registration, RegistrationId, Result, ServiceKey,
};

type Map<K, V> = DashMap<K, V, RandomState>;

fn map<K: Eq + std::hash::Hash, V>() -> Map<K, V> {
    // 8 shards: registries are small and created per scope
    DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8)
}

pub(crate) struct Registry {
    registrations: Map<TypeId, Vec<Arc<Registration>>>,
    decorators: Map<TypeId, Vec<Arc<DecoratorRegistration>>>,
    generic_decorators: Map<GenericDefinition, Vec<Arc<GenericDecorator>>>,
    pre_configurations: Map<TypeId, Vec<Arc<PreConfiguration>>>,
    fallbacks: Map<GenericDefinition, Arc<Specializer>>,
    /// Fallback results per requested instantiation
    specialized: Map<TypeId, Option<Arc<Registration>>>,
    specialized_decorators: Map<(RegistrationId, TypeId), Option<Arc<DecoratorRegistration>>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            registrations: map(),
            decorators: map(),
            generic_decorators: map(),
            pre_configurations: map(),
            fallbacks: map(),
            specialized: map(),
            specialized_decorators: map(),
        }
    }

    // =========================================================================
    // Registrations
    // =========================================================================

    /// Store under the service type, and under the implementation type for
    /// indexed registrations.
    pub(crate) fn add(&self, registration: Registration) -> Arc<Registration> {
        let registration = Arc::new(registration);
        self.registrations
            .entry(registration.service().type_id())
            .or_default()
            .push(Arc::clone(&registration));
        if registration.is_indexed() {
            self.registrations
                .entry(registration.implementation().id())
                .or_default()
                .push(Arc::clone(&registration));
        }
        registration
    }

    /// Registrations for `type_id`, most recent first.
    pub(crate) fn registrations(&self, type_id: TypeId) -> Vec<Arc<Registration>> {
        self.registrations
            .get(&type_id)
            .map(|list| list.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn contains(&self, type_id: TypeId) -> bool {
        self.registrations.get(&type_id).is_some_and(|list| !list.is_empty())
    }

    pub(crate) fn len(&self) -> usize {
        self.registrations.iter().map(|list| list.len()).sum()
    }

    // =========================================================================
    // Decorators and pre-configurations
    // =========================================================================

    pub(crate) fn add_decorator(&self, decorator: DecoratorRegistration) -> Arc<DecoratorRegistration> {
        let decorator = Arc::new(decorator);
        self.decorators
            .entry(decorator.service().type_id())
            .or_default()
            .push(Arc::clone(&decorator));
        decorator
    }

    pub(crate) fn decorators(&self, type_id: TypeId) -> Vec<Arc<DecoratorRegistration>> {
        self.decorators
            .get(&type_id)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    pub(crate) fn add_generic_decorator(&self, decorator: GenericDecorator) {
        self.generic_decorators
            .entry(decorator.definition)
            .or_default()
            .push(Arc::new(decorator));
    }

    /// Generic decorators specialized for `key`, cached per instantiation.
    pub(crate) fn specialized_decorators(
        &self,
        key: &ServiceKey,
        binding: &GenericBinding,
    ) -> Result<Vec<Arc<DecoratorRegistration>>> {
        let generic: Vec<Arc<GenericDecorator>> = self
            .generic_decorators
            .get(binding.definition())
            .map(|list| list.clone())
            .unwrap_or_default();

        let mut specialized = Vec::with_capacity(generic.len());
        for decorator in generic {
            let cache_key = (decorator.id, key.type_id());
            let cached = self.specialized_decorators.get(&cache_key).map(|d| d.clone());
            let entry = match cached {
                Some(entry) => entry,
                None => {
                    let entry = decorator.specialize(binding)?.map(Arc::new);
                    self.specialized_decorators.insert(cache_key, entry.clone());
                    entry
                }
            };
            specialized.extend(entry);
        }
        Ok(specialized)
    }

    pub(crate) fn add_pre_configuration(&self, pre_configuration: PreConfiguration) -> Arc<PreConfiguration> {
        let pre_configuration = Arc::new(pre_configuration);
        for service in pre_configuration.services() {
            self.pre_configurations
                .entry(service.type_id())
                .or_default()
                .push(Arc::clone(&pre_configuration));
        }
        pre_configuration
    }

    /// Pre-configurations for `type_id`, in registration order.
    pub(crate) fn pre_configurations(&self, type_id: TypeId) -> Vec<Arc<PreConfiguration>> {
        self.pre_configurations
            .get(&type_id)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    // =========================================================================
    // Open generics
    // =========================================================================

    pub(crate) fn add_fallback(&self, definition: GenericDefinition, specializer: Arc<Specializer>) {
        self.fallbacks.insert(definition, specializer);
    }

    /// Fallback registration for a generic instantiation this level has no
    /// registration for.
    pub(crate) fn specialize(&self, key: &ServiceKey) -> Result<Option<Arc<Registration>>> {
        let Some(binding) = key.binding() else {
            return Ok(None);
        };
        if let Some(cached) = self.specialized.get(&key.type_id()) {
            return Ok(cached.clone());
        }
        let Some(specializer) = self.fallbacks.get(binding.definition()).map(|s| Arc::clone(&s)) else {
            return Ok(None);
        };

        let specialized = match specializer(binding) {
            Some(registration) => {
                if registration.service().type_id() != key.type_id() {
                    return Err(DiError::invalid_registration(
                        key.type_name(),
                        format!(
                            "fallback for {binding} produced a registration for {}",
                            registration.service().type_name()
                        ),
                    ));
                }
                Some(Arc::new(registration.bind_generic(binding.clone()).prepare()?))
            }
            None => None,
        };

        #[cfg(feature = "logging")]
        tracing::debug!(
            target: "graph_injector",
            binding = %binding,
            found = specialized.is_some(),
            "Specialized open generic"
        );

        self.specialized.insert(key.type_id(), specialized.clone());
        Ok(specialized)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("registrations", &self.len())
            .field("decorated_services", &self.decorators.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Arguments, Construct, GenericService, Parameter, TypeKey};
    use std::marker::PhantomData;

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

    static BOX: GenericDefinition = GenericDefinition::new("Boxed", &["T"]);
    struct Boxed<T>(PhantomData<T>);
    impl<T: Send + Sync + 'static> GenericService for Boxed<T> {
        fn generic_binding() -> GenericBinding {
            BOX.bind([TypeKey::of::<T>()])
        }
    }

    #[test]
    fn test_most_recent_first() {
        let registry = Registry::new();
        let first = registry.add(Registration::value(1u8));
        let second = registry.add(Registration::value(2u8));

        let ids: Vec<_> = registry.registrations(TypeId::of::<u8>()).iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![second.id(), first.id()]);
        assert!(registry.contains(TypeId::of::<u8>()));
        assert!(!registry.contains(TypeId::of::<u16>()));
    }

    #[test]
    fn test_indexed_under_implementation() {
        let registry = Registry::new();
        registry.add(Registration::implemented_by::<dyn Shape, Square>(|s| s));

        assert_eq!(registry.registrations(TypeId::of::<dyn Shape>()).len(), 1);
        assert_eq!(registry.registrations(TypeId::of::<Square>()).len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_fallback_runs_once_per_instantiation() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let registry = Registry::new();
        registry.add_fallback(
            BOX,
            Arc::new(|binding: &GenericBinding| {
                CALLS.fetch_add(1, Ordering::SeqCst);
                (binding.arg("T") == Some(TypeKey::of::<u8>()))
                    .then(|| Registration::value(Boxed::<u8>(PhantomData)))
            }),
        );

        let key = ServiceKey::generic::<Boxed<u8>>();
        let first = registry.specialize(&key).unwrap().unwrap();
        let second = registry.specialize(&key).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.service().binding().is_some());

        assert!(registry.specialize(&ServiceKey::generic::<Boxed<u16>>()).unwrap().is_none());
        assert!(registry.specialize(&ServiceKey::of::<Boxed<u8>>()).unwrap().is_none());
        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
    }
}
