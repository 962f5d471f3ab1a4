//! # graph-injector - Graph-Resolving Dependency Injection for Rust
//!
//! A dependency injection container that builds each requested service as
//! a tree of nodes: every constructor parameter becomes a child node
//! resolved from the registry, with lifespans, decorators, filters and
//! scopes deciding what gets built and what gets reused.
//!
//! ## Features
//!
//! - **Registrations** - values, factories, constructors, resources with
//!   teardown, async factories, names and tags
//! - **Lifespans** - transient, once per graph, scoped, singleton
//! - **Decorators** - positioned wrappers around any service
//! - **Scopes** - nested contexts with their own registrations and teardowns
//! - **Filters** - composable registration, node and type predicates
//! - **Open generics** - enumerated instantiations plus a fallback specializer
//! - **Observable** - `tracing` events with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use graph_injector::{Container, Lifespan, Parameter, Registration};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let container = Container::new();
//! container
//!     .register(Registration::value(Database { url: "postgres://localhost".into() }))
//!     .unwrap();
//! container
//!     .register(
//!         Registration::factory(|args| Ok(Arc::new(UserService { db: args.get("db")? })))
//!             .param(Parameter::service::<Database>("db"))
//!             .with_lifespan(Lifespan::Singleton),
//!     )
//!     .unwrap();
//!
//! let users = container.resolve::<UserService>().unwrap();
//! assert_eq!(users.db.url, "postgres://localhost");
//! ```
//!
//! ## Scopes
//!
//! ```rust
//! use graph_injector::{Container, Lifespan, Registration, Resource};
//!
//! struct AppConfig { name: String }
//! struct Session { user: String }
//!
//! let root = Container::new();
//! root.register(Registration::value(AppConfig { name: "MyApp".into() })).unwrap();
//! root.register(
//!     Registration::resource(|_| Ok(Resource::new(Session { user: "anonymous".into() }).with_teardown(|| Ok(()))))
//!         .with_lifespan(Lifespan::Scoped),
//! )
//! .unwrap();
//!
//! let request = root.new_scope().unwrap();
//! assert_eq!(request.resolve::<AppConfig>().unwrap().name, "MyApp");
//! assert_eq!(request.resolve::<Session>().unwrap().user, "anonymous");
//! request.close().unwrap();
//! ```

// Lets the derive macros' `::graph_injector` paths work inside this crate
extern crate self as graph_injector;

mod arguments;
mod bundle;
mod cache;
mod collection;
mod container;
mod context;
mod decorator;
mod error;
mod factory;
mod generic;
mod graph;
mod instance;
mod key;
mod node;
mod preconfig;
mod registration;
mod registry;
mod resolver;
mod scope;
mod settings;

pub mod factories;
pub mod filters;
#[cfg(feature = "logging")]
pub mod logging;
pub mod value_factories;

pub use arguments::Arguments;
pub use bundle::{Bundle, RunOnce, RunOncePerType};
pub use collection::{Collection, CollectionShape};
pub use container::{AmbiguityPolicy, Container, ContainerOptions};
pub use context::{DependencyContext, NodeInfo, NodeKind};
pub use decorator::{DECORATED, DecoratorRegistration};
pub use error::*;
pub use factory::{Resource, Teardown};
pub use generic::{OpenGeneric, Subclasses};
pub use graph::{DependencyGraph, GraphEntry};
pub use instance::Instance;
pub use key::{GenericBinding, GenericDefinition, GenericService, ServiceKey, TypeKey};
pub use node::NodeView;
pub use preconfig::PreConfiguration;
pub use registration::{Construct, Lifespan, ParamKind, Parameter, Registration, RegistrationId, Tag};
pub use resolver::{GraphResolver, Resolver};
pub use scope::{Scope, ScopeBuilder, ScopeGuard, ScopeId, with_scope, with_scope_async};
pub use settings::DependencySettings;
pub use value_factories::ValueFactory;

#[cfg(feature = "derive")]
pub use graph_injector_derive::Construct;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::filters::registration::{has_tag, is_named, is_not_named, with_name};
    pub use crate::{
        Arguments, Construct, Container, DecoratorRegistration, DependencySettings, DiError,
        Lifespan, Parameter, PreConfiguration, Registration, Resource, Result, Scope, Tag,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Database {
        url: String,
    }

    #[test]
    fn test_value_registration() {
        let container = Container::new();
        container
            .register(Registration::value(Database { url: "test".into() }))
            .unwrap();

        let first = container.resolve::<Database>().unwrap();
        let second = container.resolve::<Database>().unwrap();
        assert_eq!(first.url, "test");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_transient_creates_new_instance() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        struct Counter(u32);

        let container = Container::new();
        container
            .register(
                Registration::factory(|_| Ok(Arc::new(Counter(COUNTER.fetch_add(1, Ordering::SeqCst)))))
                    .with_lifespan(Lifespan::Transient),
            )
            .unwrap();

        let c1 = container.resolve::<Counter>().unwrap();
        let c2 = container.resolve::<Counter>().unwrap();
        assert_ne!(c1.0, c2.0);
    }

    #[test]
    fn test_override_in_scope() {
        let root = Container::new();
        root.register(Registration::value(Database {
            url: "production".into(),
        }))
        .unwrap();

        let test_scope = root.new_scope().unwrap();
        test_scope
            .register(Registration::value(Database { url: "test".into() }))
            .unwrap();

        assert_eq!(root.resolve::<Database>().unwrap().url, "production");
        assert_eq!(test_scope.resolve::<Database>().unwrap().url, "test");
        assert!(test_scope.has_registration::<Database>());
    }

    #[test]
    fn test_prelude_filters() {
        use crate::prelude::*;

        let container = Container::new();
        container
            .register(Registration::value(1u8).tag(Tag::new("small")))
            .unwrap();
        container
            .register(Registration::value(2u8).named("two"))
            .unwrap();

        assert_eq!(*container.resolve_with::<u8>(has_tag("small", None)).unwrap(), 1);
        assert_eq!(*container.resolve_with::<u8>(with_name("two")).unwrap(), 2);
        assert_eq!(*container.resolve_with::<u8>(is_named()).unwrap(), 2);
    }
}
