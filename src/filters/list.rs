//! Post-processing of collection lookups.
//!
//! A [`ListReducer`] decides, registration by registration, whether a
//! candidate joins the collection given what was accepted so far. A
//! [`ListModifier`] may then reorder or trim the accepted registrations.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::Registration;

type ReduceFn = dyn Fn(&Registration, &[Arc<Registration>]) -> bool + Send + Sync;
type ModifyFn = dyn Fn(Vec<Arc<Registration>>) -> Vec<Arc<Registration>> + Send + Sync;

#[derive(Clone)]
pub struct ListReducer {
    accept: Arc<ReduceFn>,
    label: Cow<'static, str>,
}

impl ListReducer {
    pub fn new<F>(label: impl Into<Cow<'static, str>>, accept: F) -> Self
    where
        F: Fn(&Registration, &[Arc<Registration>]) -> bool + Send + Sync + 'static,
    {
        Self {
            accept: Arc::new(accept),
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn reduce(&self, candidates: Vec<Arc<Registration>>) -> Vec<Arc<Registration>> {
        let mut accepted: Vec<Arc<Registration>> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if (self.accept)(&candidate, &accepted) {
                accepted.push(candidate);
            }
        }
        accepted
    }
}

impl Default for ListReducer {
    fn default() -> Self {
        all_items()
    }
}

impl fmt::Debug for ListReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[derive(Clone)]
pub struct ListModifier {
    modify: Arc<ModifyFn>,
}

impl ListModifier {
    pub fn new<F>(modify: F) -> Self
    where
        F: Fn(Vec<Arc<Registration>>) -> Vec<Arc<Registration>> + Send + Sync + 'static,
    {
        Self {
            modify: Arc::new(modify),
        }
    }

    /// Stable sort of the accepted registrations by `key`.
    pub fn sort_by_key<K, F>(key: F) -> Self
    where
        K: Ord,
        F: Fn(&Registration) -> K + Send + Sync + 'static,
    {
        Self::new(move |mut registrations| {
            registrations.sort_by_key(|r| key(r));
            registrations
        })
    }

    /// Keep at most `n` registrations.
    pub fn take(n: usize) -> Self {
        Self::new(move |mut registrations| {
            registrations.truncate(n);
            registrations
        })
    }

    pub(crate) fn apply(&self, registrations: Vec<Arc<Registration>>) -> Vec<Arc<Registration>> {
        (self.modify)(registrations)
    }
}

impl fmt::Debug for ListModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ListModifier")
    }
}

pub fn all_items() -> ListReducer {
    ListReducer::new("all_items", |_, _| true)
}

/// Skip registrations whose implementation type was already accepted.
pub fn implementation_does_not_already_exist() -> ListReducer {
    ListReducer::new("implementation_does_not_already_exist", |candidate, accepted| {
        accepted
            .iter()
            .all(|r| r.implementation() != candidate.implementation())
    })
}

/// Skip registrations whose name (or absence of name) was already accepted.
pub fn name_does_not_already_exist() -> ListReducer {
    ListReducer::new("name_does_not_already_exist", |candidate, accepted| {
        accepted.iter().all(|r| r.name() != candidate.name())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha;
    struct Beta;

    fn registrations() -> Vec<Arc<Registration>> {
        vec![
            Arc::new(Registration::value(Alpha).named("one")),
            Arc::new(Registration::value(Beta).named("one")),
            Arc::new(Registration::value(Alpha).named("two")),
            Arc::new(Registration::value(Beta)),
        ]
    }

    #[test]
    fn test_reducers() {
        assert_eq!(all_items().reduce(registrations()).len(), 4);

        let unique_impls = implementation_does_not_already_exist().reduce(registrations());
        assert_eq!(unique_impls.len(), 2);
        assert_eq!(unique_impls[0].name(), Some("one"));

        let unique_names = name_does_not_already_exist().reduce(registrations());
        let names: Vec<_> = unique_names.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec![Some("one"), Some("two"), None]);
    }

    #[test]
    fn test_modifiers() {
        let sorted = ListModifier::sort_by_key(|r| r.name().map(str::to_string))
            .apply(registrations());
        assert_eq!(sorted[0].name(), None);
        assert_eq!(ListModifier::take(1).apply(registrations()).len(), 1);
    }
}
