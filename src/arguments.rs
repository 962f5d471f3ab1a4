//! Resolved arguments handed to factories, constructors and decorators.

use std::sync::Arc;

use crate::{
    Collection, CollectionShape, DependencyContext, DiError, GraphResolver, Instance, Resolver,
    Result,
};

pub(crate) enum ArgumentValue {
    Instance(Instance),
    Collection {
        shape: CollectionShape,
        items: Vec<Instance>,
    },
    Context(DependencyContext),
    Resolver(Resolver),
    Graph(GraphResolver),
}

impl ArgumentValue {
    fn describe(&self) -> &'static str {
        match self {
            Self::Instance(_) => "a service",
            Self::Collection { .. } => "a collection",
            Self::Context(_) => "a dependency context",
            Self::Resolver(_) => "a resolver",
            Self::Graph(_) => "a graph resolver",
        }
    }
}

/// Named argument values for one activation, in declaration order.
///
/// ```rust
/// use graph_injector::{Container, Parameter, Registration};
/// use std::sync::Arc;
///
/// struct Config { url: String }
/// struct Pool { url: String }
///
/// let container = Container::new();
/// container.register(Registration::value(Config { url: "db://".into() })).unwrap();
/// container
///     .register(
///         Registration::factory(|args| {
///             let config = args.get::<Config>("config")?;
///             Ok(Arc::new(Pool { url: config.url.clone() }))
///         })
///         .param(Parameter::service::<Config>("config")),
///     )
///     .unwrap();
///
/// assert_eq!(container.resolve::<Pool>().unwrap().url, "db://");
/// ```
pub struct Arguments {
    owner: &'static str,
    values: Vec<(String, ArgumentValue)>,
}

impl Arguments {
    pub(crate) fn new(owner: &'static str) -> Self {
        Self {
            owner,
            values: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, name: impl Into<String>, value: ArgumentValue) {
        self.values.push((name.into(), value));
    }

    fn lookup(&self, name: &str) -> Result<&ArgumentValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| DiError::argument(self.owner, name, "not declared or not supplied"))
    }

    fn wrong_shape(&self, name: &str, expected: &str, found: &ArgumentValue) -> DiError {
        DiError::argument(
            self.owner,
            name,
            format!("expected {expected}, found {}", found.describe()),
        )
    }

    /// Names of the supplied arguments, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.iter().any(|(n, _)| n == name)
    }

    /// The raw instance supplied for `name`.
    pub fn instance(&self, name: &str) -> Result<Instance> {
        match self.lookup(name)? {
            ArgumentValue::Instance(instance) => Ok(instance.clone()),
            other => Err(self.wrong_shape(name, "a service", other)),
        }
    }

    pub fn get<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        self.instance(name)?.require::<T>()
    }

    /// `None` when the argument is missing or of another type.
    pub fn try_get<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        match self.lookup(name).ok()? {
            ArgumentValue::Instance(instance) => instance.downcast::<T>(),
            _ => None,
        }
    }

    /// Clone of a plain value argument.
    pub fn value<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Result<T> {
        self.get::<T>(name).map(|v| (*v).clone())
    }

    pub fn collection<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Collection<T>> {
        match self.lookup(name)? {
            ArgumentValue::Collection { shape, items } => Collection::from_instances(*shape, items),
            // Supplied by a value factory rather than the registry
            ArgumentValue::Instance(instance) => match instance.downcast::<Vec<Arc<T>>>() {
                Some(items) => Ok(Collection::List((*items).clone())),
                None => Err(self.wrong_shape(name, "a collection", &ArgumentValue::Instance(instance.clone()))),
            },
            other => Err(self.wrong_shape(name, "a collection", other)),
        }
    }

    pub fn list<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Vec<Arc<T>>> {
        self.collection::<T>(name).map(Collection::into_vec)
    }

    pub fn context(&self, name: &str) -> Result<DependencyContext> {
        match self.lookup(name)? {
            ArgumentValue::Context(context) => Ok(context.clone()),
            other => self.supplied(name, "a dependency context", other),
        }
    }

    pub fn resolver(&self, name: &str) -> Result<Resolver> {
        match self.lookup(name)? {
            ArgumentValue::Resolver(resolver) => Ok(resolver.clone()),
            other => self.supplied(name, "a resolver", other),
        }
    }

    pub fn current_graph(&self, name: &str) -> Result<GraphResolver> {
        match self.lookup(name)? {
            ArgumentValue::Graph(graph) => Ok(graph.clone()),
            other => self.supplied(name, "a graph resolver", other),
        }
    }

    /// A handle a value factory supplied in place of the engine's own.
    fn supplied<T: Clone + Send + Sync + 'static>(&self, name: &str, expected: &str, value: &ArgumentValue) -> Result<T> {
        match value {
            ArgumentValue::Instance(instance) => match instance.downcast::<T>() {
                Some(handle) => Ok((*handle).clone()),
                None => Err(self.wrong_shape(name, expected, value)),
            },
            other => Err(self.wrong_shape(name, expected, other)),
        }
    }
}

impl std::fmt::Debug for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arguments")
            .field("owner", &self.owner)
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arguments() -> Arguments {
        let mut args = Arguments::new("tests::Owner");
        args.push("port", ArgumentValue::Instance(Instance::new(8080u16)));
        args.push(
            "ports",
            ArgumentValue::Collection {
                shape: CollectionShape::Tuple,
                items: vec![Instance::new(1u16), Instance::new(2u16)],
            },
        );
        args
    }

    #[test]
    fn test_typed_access() {
        let args = arguments();
        assert_eq!(args.value::<u16>("port").unwrap(), 8080);
        assert!(args.try_get::<u32>("port").is_none());
        assert!(args.try_get::<u16>("missing").is_none());
        assert_eq!(args.list::<u16>("ports").unwrap().len(), 2);
        assert_eq!(args.names().collect::<Vec<_>>(), vec!["port", "ports"]);
    }

    #[test]
    fn test_shape_errors_name_the_argument() {
        let args = arguments();
        let err = args.collection::<u16>("port").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Argument `port` of tests::Owner: expected a collection, found a service"
        );
        assert!(matches!(args.get::<u16>("nope"), Err(DiError::Argument { .. })));
        assert!(matches!(args.get::<String>("port"), Err(DiError::TypeMismatch { .. })));
        assert!(matches!(args.resolver("port"), Err(DiError::Argument { .. })));
    }
}
