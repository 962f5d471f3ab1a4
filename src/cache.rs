//! Lifespan caches.
//!
//! Keyed by registration identity and the service type the instance was
//! produced for, so one registration indexed under two types keeps one
//! entry per type. Raw entries hold the undecorated implementation shared
//! between those types.

use std::any::TypeId;

use ahash::RandomState;
use dashmap::DashMap;

use crate::{Instance, RegistrationId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub(crate) registration: RegistrationId,
    pub(crate) service: TypeId,
    pub(crate) raw: bool,
}

impl CacheKey {
    pub(crate) fn new(registration: RegistrationId, service: TypeId) -> Self {
        Self {
            registration,
            service,
            raw: false,
        }
    }

    pub(crate) fn raw(registration: RegistrationId, implementation: TypeId) -> Self {
        Self {
            registration,
            service: implementation,
            raw: true,
        }
    }
}

/// Instance cache of one scope.
pub(crate) struct InstanceCache {
    entries: DashMap<CacheKey, Instance, RandomState>,
}

impl InstanceCache {
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
        }
    }

    #[inline]
    pub(crate) fn get(&self, key: &CacheKey) -> Option<Instance> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    #[inline]
    pub(crate) fn insert(&self, key: CacheKey, instance: Instance) {
        self.entries.insert(key, instance);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_and_service_entries_are_distinct() {
        let cache = InstanceCache::new();
        let id = crate::Registration::value(1u8).id();
        let service = CacheKey::new(id, TypeId::of::<u8>());
        let raw = CacheKey::raw(id, TypeId::of::<u8>());

        cache.insert(service, Instance::new(1u8));
        assert!(cache.get(&raw).is_none());
        cache.insert(raw, Instance::new(2u8));
        assert_eq!(cache.len(), 2);
        assert_eq!(*cache.get(&raw).unwrap().downcast::<u8>().unwrap(), 2);

        cache.clear();
        assert!(cache.get(&service).is_none());
    }
}
