//! Service identity: type keys, service keys and open-generic bindings

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A runtime identifier for a Rust type.
///
/// Equality and hashing use the [`TypeId`]; the name is kept for filters and
/// diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name, as reported by [`std::any::type_name`].
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The type name without its module path or generic arguments.
    ///
    /// `alloc::vec::Vec<u8>` becomes `Vec`, `dyn app::Greeter` becomes `Greeter`.
    pub fn short_name(&self) -> &'static str {
        let base = self.base_path();
        let base = base.rsplit("::").next().unwrap_or(base);
        base.trim_start_matches("dyn ")
    }

    /// Module path of the type (`app::handlers` for `app::handlers::Login`).
    pub fn module_path(&self) -> &'static str {
        let base = self.base_path().trim_start_matches("dyn ");
        match base.rfind("::") {
            Some(index) => &base[..index],
            None => "",
        }
    }

    fn base_path(&self) -> &'static str {
        match self.name.find('<') {
            Some(index) => &self.name[..index],
            None => self.name,
        }
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// =============================================================================
// Open generics
// =============================================================================

/// An unparameterized generic service, e.g. `Repository<T>`.
///
/// ```rust
/// use graph_injector::GenericDefinition;
///
/// static REPOSITORY: GenericDefinition = GenericDefinition::new("Repository", &["T"]);
/// assert_eq!(REPOSITORY.arity(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericDefinition {
    name: &'static str,
    params: &'static [&'static str],
}

impl GenericDefinition {
    pub const fn new(name: &'static str, params: &'static [&'static str]) -> Self {
        Self { name, params }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn params(&self) -> &'static [&'static str] {
        self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Bind concrete type arguments, in parameter order.
    pub fn bind(&self, args: impl IntoIterator<Item = TypeKey>) -> GenericBinding {
        GenericBinding {
            definition: *self,
            args: args.into_iter().collect(),
        }
    }
}

/// A generic definition specialized with concrete type arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericBinding {
    definition: GenericDefinition,
    args: Arc<[TypeKey]>,
}

impl GenericBinding {
    pub fn definition(&self) -> &GenericDefinition {
        &self.definition
    }

    pub fn args(&self) -> &[TypeKey] {
        &self.args
    }

    /// Type bound to the named parameter.
    pub fn arg(&self, param: &str) -> Option<TypeKey> {
        let index = self.definition.params.iter().position(|p| *p == param)?;
        self.args.get(index).copied()
    }
}

impl fmt::Display for GenericBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<", self.definition.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(arg.short_name())?;
        }
        f.write_str(">")
    }
}

/// Implemented by concrete instantiations of a generic service so requests for
/// them can fall back to open-generic registrations.
///
/// ```rust
/// use graph_injector::{GenericBinding, GenericDefinition, GenericService, TypeKey};
/// use std::marker::PhantomData;
///
/// static REPOSITORY: GenericDefinition = GenericDefinition::new("Repository", &["T"]);
///
/// struct Repository<T>(PhantomData<T>);
///
/// impl<T: 'static> GenericService for Repository<T> {
///     fn generic_binding() -> GenericBinding {
///         REPOSITORY.bind([TypeKey::of::<T>()])
///     }
/// }
///
/// let binding = Repository::<u32>::generic_binding();
/// assert_eq!(binding.arg("T"), Some(TypeKey::of::<u32>()));
/// ```
pub trait GenericService: 'static {
    fn generic_binding() -> GenericBinding;
}

// =============================================================================
// Service keys
// =============================================================================

/// Identifies a requested dependency.
///
/// Two keys are equal when they name the same type and the same
/// single/collection shape; the generic binding is derived from the type.
#[derive(Clone)]
pub struct ServiceKey {
    ty: TypeKey,
    binding: Option<GenericBinding>,
    many: bool,
}

impl ServiceKey {
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            ty: TypeKey::of::<T>(),
            binding: None,
            many: false,
        }
    }

    /// Key for a generic instantiation, carrying its type-argument binding.
    #[inline]
    pub fn generic<T: ?Sized + GenericService>() -> Self {
        Self {
            ty: TypeKey::of::<T>(),
            binding: Some(T::generic_binding()),
            many: false,
        }
    }

    /// The collection flavour of this key.
    #[inline]
    pub fn many(mut self) -> Self {
        self.many = true;
        self
    }

    #[inline]
    pub(crate) fn single(mut self) -> Self {
        self.many = false;
        self
    }

    #[inline]
    pub fn type_key(&self) -> TypeKey {
        self.ty
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.ty.id
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.ty.name
    }

    #[inline]
    pub fn binding(&self) -> Option<&GenericBinding> {
        self.binding.as_ref()
    }

    #[inline]
    pub fn is_many(&self) -> bool {
        self.many
    }

    pub(crate) fn with_binding(mut self, binding: Option<GenericBinding>) -> Self {
        self.binding = binding;
        self
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.many == other.many
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty.hash(state);
        self.many.hash(state);
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.many {
            write!(f, "[{}]", self.ty.name)
        } else {
            f.write_str(self.ty.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::marker::PhantomData;

    mod shapes {
        pub struct Square;
        pub trait Shape {}
    }

    static HOLDER: GenericDefinition = GenericDefinition::new("Holder", &["T", "U"]);

    struct Holder<T, U>(PhantomData<(T, U)>);

    impl<T: 'static, U: 'static> GenericService for Holder<T, U> {
        fn generic_binding() -> GenericBinding {
            HOLDER.bind([TypeKey::of::<T>(), TypeKey::of::<U>()])
        }
    }

    #[test]
    fn test_type_key_names() {
        let key = TypeKey::of::<shapes::Square>();
        assert_eq!(key.short_name(), "Square");
        assert!(key.module_path().ends_with("key::tests::shapes"));

        let key = TypeKey::of::<dyn shapes::Shape>();
        assert_eq!(key.short_name(), "Shape");
        assert!(key.module_path().ends_with("shapes"));

        let key = TypeKey::of::<Vec<u8>>();
        assert_eq!(key.short_name(), "Vec");
    }

    #[test]
    fn test_service_key_equality_ignores_binding() {
        let plain = ServiceKey::of::<Holder<u8, String>>();
        let generic = ServiceKey::generic::<Holder<u8, String>>();
        assert_eq!(plain, generic);
        assert!(plain.binding().is_none());
        assert_ne!(plain.clone(), plain.many());
    }

    #[test]
    fn test_binding_args_by_param_name() {
        let binding = Holder::<u8, String>::generic_binding();
        assert_eq!(binding.arg("T"), Some(TypeKey::of::<u8>()));
        assert_eq!(binding.arg("U"), Some(TypeKey::of::<String>()));
        assert_eq!(binding.arg("V"), None);
        assert_eq!(binding.to_string(), "Holder<u8, String>");
        assert_ne!(binding, Holder::<u8, u8>::generic_binding());
    }
}
