//! Policies for supplying a parameter's value before any registry lookup.
//!
//! A value factory receives the parameter's declared default (if any) and
//! the [`DependencyContext`]. Returning `Some` supplies the value directly;
//! returning `None` sends the parameter to the registry.

use std::fmt;
use std::sync::Arc;

use crate::{DependencyContext, Instance};

type ValueFn = dyn Fn(Option<&Instance>, &DependencyContext) -> Option<Instance> + Send + Sync;

#[derive(Clone)]
pub struct ValueFactory {
    supply: Arc<ValueFn>,
}

impl ValueFactory {
    pub fn new<F>(supply: F) -> Self
    where
        F: Fn(Option<&Instance>, &DependencyContext) -> Option<Instance> + Send + Sync + 'static,
    {
        Self {
            supply: Arc::new(supply),
        }
    }

    #[inline]
    pub(crate) fn supply(&self, default: Option<&Instance>, context: &DependencyContext) -> Option<Instance> {
        (self.supply)(default, context)
    }
}

impl Default for ValueFactory {
    fn default() -> Self {
        use_default_value()
    }
}

impl fmt::Debug for ValueFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValueFactory")
    }
}

/// Use the declared default when there is one.
pub fn use_default_value() -> ValueFactory {
    ValueFactory::new(|default, _| default.cloned())
}

/// Always supply `value`.
pub fn set_value<T: Send + Sync + 'static>(value: T) -> ValueFactory {
    let value = Instance::new(value);
    ValueFactory::new(move |_, _| Some(value.clone()))
}

/// Always supply an already shared value (`Arc<dyn Trait>` and friends).
pub fn set_shared<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> ValueFactory {
    let value = Instance::from_arc(value);
    ValueFactory::new(move |_, _| Some(value.clone()))
}

/// Ignore the declared default and resolve from the registry.
pub fn dont_use_default_value() -> ValueFactory {
    ValueFactory::new(|_, _| None)
}
