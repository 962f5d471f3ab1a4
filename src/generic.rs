//! Open generics and enumerated implementation families.
//!
//! Rust cannot discover "all instantiations of a generic" or "all
//! implementors of a trait" at runtime, so both are registered from an
//! explicit list. An open generic may also carry a fallback specializer,
//! called once per distinct binding that the list does not cover.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::filters::{NodeFilter, TypeFilter};
use crate::{
    Construct, DecoratorRegistration, DiError, GenericBinding, GenericDefinition, GenericService,
    Lifespan, Registration, RegistrationId, Result, Tag, TypeKey,
};

pub(crate) type Specializer = dyn Fn(&GenericBinding) -> Option<Registration> + Send + Sync;
pub(crate) type DecoratorSpecializer =
    dyn Fn(&GenericBinding) -> Option<DecoratorRegistration> + Send + Sync;

// =============================================================================
// Open generic registrations
// =============================================================================

/// Instantiations of one generic service definition.
///
/// ```rust
/// use graph_injector::{
///     Container, GenericBinding, GenericDefinition, GenericService, OpenGeneric, Registration, TypeKey,
/// };
/// use std::marker::PhantomData;
/// use std::sync::Arc;
///
/// static REPOSITORY: GenericDefinition = GenericDefinition::new("Repository", &["T"]);
///
/// struct Repository<T>(PhantomData<T>);
/// impl<T: Send + Sync + 'static> GenericService for Repository<T> {
///     fn generic_binding() -> GenericBinding {
///         REPOSITORY.bind([TypeKey::of::<T>()])
///     }
/// }
///
/// let container = Container::new();
/// container
///     .register_open_generic(
///         OpenGeneric::new(REPOSITORY)
///             .implementation::<Repository<u8>>(Registration::value(Repository::<u8>(PhantomData)))
///             .fallback(|binding| {
///                 (binding.arg("T") == Some(TypeKey::of::<u16>()))
///                     .then(|| Registration::value(Repository::<u16>(PhantomData)))
///             }),
///     )
///     .unwrap();
///
/// assert!(container.resolve_generic::<Repository<u8>>().is_ok());
/// assert!(container.resolve_generic::<Repository<u16>>().is_ok());
/// assert!(container.resolve_generic::<Repository<u32>>().is_err());
/// ```
pub struct OpenGeneric {
    definition: GenericDefinition,
    implementations: Vec<Registration>,
    fallback: Option<Arc<Specializer>>,
}

impl OpenGeneric {
    pub fn new(definition: GenericDefinition) -> Self {
        Self {
            definition,
            implementations: Vec::new(),
            fallback: None,
        }
    }

    /// A concrete instantiation `S`, registered under `S` with its binding.
    pub fn implementation<S: ?Sized + GenericService>(mut self, registration: Registration) -> Self {
        let registration = if registration.service().type_id() == TypeKey::of::<S>().id() {
            registration.bind_generic(S::generic_binding())
        } else {
            registration
        };
        self.implementations.push(registration);
        self
    }

    /// Builds a registration for a binding no listed instantiation covers.
    /// The result is cached per binding.
    pub fn fallback<F>(mut self, specializer: F) -> Self
    where
        F: Fn(&GenericBinding) -> Option<Registration> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(specializer));
        self
    }

    pub fn definition(&self) -> &GenericDefinition {
        &self.definition
    }

    pub(crate) fn into_parts(self) -> Result<(GenericDefinition, Vec<Registration>, Option<Arc<Specializer>>)> {
        for registration in &self.implementations {
            let bound = registration
                .service()
                .binding()
                .is_some_and(|b| *b.definition() == self.definition);
            if !bound {
                return Err(DiError::invalid_registration(
                    registration.service().type_name(),
                    format!("not an instantiation of {}", self.definition.name()),
                ));
            }
        }
        Ok((self.definition, self.implementations, self.fallback))
    }
}

impl fmt::Debug for OpenGeneric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenGeneric")
            .field("definition", &self.definition)
            .field("implementations", &self.implementations.len())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// Decorator for every instantiation of a generic definition.
pub(crate) struct GenericDecorator {
    pub(crate) id: RegistrationId,
    pub(crate) definition: GenericDefinition,
    pub(crate) specializer: Arc<DecoratorSpecializer>,
}

impl GenericDecorator {
    /// Specialized decorator for `binding`, keeping this decorator's
    /// registration order.
    pub(crate) fn specialize(&self, binding: &GenericBinding) -> Result<Option<DecoratorRegistration>> {
        match (self.specializer)(binding) {
            Some(decorator) => decorator
                .with_id(self.id)
                .bind_generic(binding.clone())
                .prepare()
                .map(Some),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Enumerated implementation families
// =============================================================================

type NameFn = dyn Fn(TypeKey) -> Option<String> + Send + Sync;

/// Implementations of base service `B`, each registered under `B` and
/// under its own type.
///
/// ```rust
/// use graph_injector::{Arguments, Construct, Container, Parameter, Result, Subclasses};
/// use std::sync::Arc;
///
/// trait Handler: Send + Sync {}
///
/// struct Login;
/// impl Handler for Login {}
/// impl Construct for Login {
///     fn parameters() -> Vec<Parameter> { Vec::new() }
///     fn construct(_: &mut Arguments) -> Result<Self> { Ok(Login) }
/// }
///
/// let container = Container::new();
/// container
///     .register_subclasses(Subclasses::<dyn Handler>::new().add::<Login>(|l| l))
///     .unwrap();
///
/// assert_eq!(container.resolve_all::<dyn Handler>().unwrap().len(), 1);
/// assert!(container.resolve::<Login>().is_ok());
/// ```
pub struct Subclasses<B: ?Sized> {
    entries: Vec<Registration>,
    lifespan: Lifespan,
    tags: Vec<Tag>,
    type_filter: Option<TypeFilter>,
    name: Option<Arc<NameFn>>,
    parent_node_filter: Option<NodeFilter>,
    _base: PhantomData<fn() -> Arc<B>>,
}

impl<B: ?Sized + Send + Sync + 'static> Subclasses<B> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            lifespan: Lifespan::default(),
            tags: Vec::new(),
            type_filter: None,
            name: None,
            parent_node_filter: None,
            _base: PhantomData,
        }
    }

    pub fn add<I: Construct>(mut self, cast: fn(Arc<I>) -> Arc<B>) -> Self {
        self.entries.push(Registration::implemented_by::<B, I>(cast));
        self
    }

    pub fn lifespan(mut self, lifespan: Lifespan) -> Self {
        self.lifespan = lifespan;
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Only implementations whose type passes `filter` are registered.
    pub fn type_filter(mut self, filter: TypeFilter) -> Self {
        self.type_filter = Some(filter);
        self
    }

    /// Registration name derived from the implementation type.
    pub fn name_with<F>(mut self, name: F) -> Self
    where
        F: Fn(TypeKey) -> Option<String> + Send + Sync + 'static,
    {
        self.name = Some(Arc::new(name));
        self
    }

    pub fn parent_node_filter(mut self, filter: NodeFilter) -> Self {
        self.parent_node_filter = Some(filter);
        self
    }

    pub(crate) fn into_registrations(self) -> Vec<Registration> {
        let Self {
            entries,
            lifespan,
            tags,
            type_filter,
            name,
            parent_node_filter,
            ..
        } = self;

        entries
            .into_iter()
            .filter(|r| type_filter.as_ref().is_none_or(|f| f.test(&r.implementation())))
            .map(|r| {
                let implementation = r.implementation();
                let mut r = r.with_lifespan(lifespan).tagged(tags.iter().cloned());
                if let Some(name) = name.as_ref().and_then(|f| f(implementation)) {
                    r = r.named(name);
                }
                if let Some(filter) = &parent_node_filter {
                    r = r.parent_node_filter(filter.clone());
                }
                r
            })
            .collect()
    }
}

impl<B: ?Sized + Send + Sync + 'static> Default for Subclasses<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::types::name_starts_with;
    use crate::{Arguments, Parameter};

    static HOLDER: GenericDefinition = GenericDefinition::new("Holder", &["T"]);

    struct Holder<T>(PhantomData<T>);

    impl<T: 'static> GenericService for Holder<T> {
        fn generic_binding() -> GenericBinding {
            HOLDER.bind([TypeKey::of::<T>()])
        }
    }

    trait Animal: Send + Sync {}

    macro_rules! animal {
        ($name:ident) => {
            struct $name;
            impl Animal for $name {}
            impl Construct for $name {
                fn parameters() -> Vec<Parameter> {
                    Vec::new()
                }
                fn construct(_: &mut Arguments) -> Result<Self> {
                    Ok($name)
                }
            }
        };
    }

    animal!(Cat);
    animal!(Dog);

    #[test]
    fn test_implementations_must_bind_the_definition() {
        let ok = OpenGeneric::new(HOLDER)
            .implementation::<Holder<u8>>(Registration::value(Holder::<u8>(PhantomData)));
        let (_, registrations, _) = ok.into_parts().unwrap();
        assert_eq!(
            registrations[0].service().binding().and_then(|b| b.arg("T")),
            Some(TypeKey::of::<u8>())
        );

        let wrong = OpenGeneric::new(HOLDER).implementation::<Holder<u8>>(Registration::value(1u8));
        assert!(matches!(wrong.into_parts(), Err(DiError::InvalidRegistration { .. })));
    }

    #[test]
    fn test_subclass_options() {
        let registrations = Subclasses::<dyn Animal>::new()
            .add::<Cat>(|c| c)
            .add::<Dog>(|d| d)
            .lifespan(Lifespan::Singleton)
            .tags([Tag::new("pet")])
            .type_filter(!name_starts_with("Dog"))
            .name_with(|t| Some(t.short_name().to_lowercase()))
            .into_registrations();

        assert_eq!(registrations.len(), 1);
        let cat = &registrations[0];
        assert_eq!(cat.implementation(), TypeKey::of::<Cat>());
        assert_eq!(cat.lifespan(), Lifespan::Singleton);
        assert_eq!(cat.name(), Some("cat"));
        assert!(cat.has_tag("pet", None));
        assert!(cat.is_indexed());
    }
}
