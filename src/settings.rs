//! Per-parameter resolution settings.

use crate::filters::{ListModifier, ListReducer, RegistrationFilter, registration::is_not_named};
use crate::value_factories::{self, ValueFactory};

/// How one parameter of a registration is resolved.
///
/// ```rust
/// use graph_injector::DependencySettings;
/// use graph_injector::filters::registration::with_name;
///
/// let settings = DependencySettings::new().filter(with_name("replica"));
/// assert_eq!(settings.registration_filter().label(), "with_name(\"replica\")");
/// ```
#[derive(Clone, Debug, Default)]
pub struct DependencySettings {
    pub(crate) value_factory: ValueFactory,
    pub(crate) filter: Option<RegistrationFilter>,
    pub(crate) list_reducer: ListReducer,
    pub(crate) list_modifier: Option<ListModifier>,
}

impl DependencySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings that always supply `value`.
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::new().value_factory(value_factories::set_value(value))
    }

    pub fn value_factory(mut self, value_factory: ValueFactory) -> Self {
        self.value_factory = value_factory;
        self
    }

    pub fn filter(mut self, filter: RegistrationFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn list_reducer(mut self, reducer: ListReducer) -> Self {
        self.list_reducer = reducer;
        self
    }

    pub fn list_modifier(mut self, modifier: ListModifier) -> Self {
        self.list_modifier = Some(modifier);
        self
    }

    /// The filter candidates must pass (unnamed registrations by default).
    pub fn registration_filter(&self) -> RegistrationFilter {
        self.filter.clone().unwrap_or_else(is_not_named)
    }
}
