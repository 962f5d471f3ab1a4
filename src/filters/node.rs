//! Filters over nodes of the resolution tree.
//!
//! Used as a registration's parent node filter (tested against the node that
//! is requesting the service) and as a decorator's node filter (tested
//! against the node being decorated).

use std::borrow::Cow;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};
use std::sync::Arc;

use super::TypeFilter;
use crate::{NodeView, ServiceKey, TypeKey};

type NodeTest = dyn for<'g> Fn(NodeView<'g>) -> bool + Send + Sync;

#[derive(Clone)]
pub struct NodeFilter {
    test: Arc<NodeTest>,
    label: Cow<'static, str>,
}

impl NodeFilter {
    pub fn new<F>(label: impl Into<Cow<'static, str>>, test: F) -> Self
    where
        F: for<'g> Fn(NodeView<'g>) -> bool + Send + Sync + 'static,
    {
        Self {
            test: Arc::new(test),
            label: label.into(),
        }
    }

    #[inline]
    pub fn test(&self, node: NodeView<'_>) -> bool {
        (self.test)(node)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Default for NodeFilter {
    fn default() -> Self {
        all_nodes()
    }
}

impl fmt::Debug for NodeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl BitAnd for NodeFilter {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        let label = format!("({} & {})", self.label, rhs.label);
        Self::new(label, move |n| self.test(n) && rhs.test(n))
    }
}

impl BitOr for NodeFilter {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        let label = format!("({} | {})", self.label, rhs.label);
        Self::new(label, move |n| self.test(n) || rhs.test(n))
    }
}

impl BitXor for NodeFilter {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        let label = format!("({} ^ {})", self.label, rhs.label);
        Self::new(label, move |n| self.test(n) ^ rhs.test(n))
    }
}

impl Not for NodeFilter {
    type Output = Self;

    fn not(self) -> Self {
        let label = format!("!{}", self.label);
        Self::new(label, move |n| !self.test(n))
    }
}

pub fn all_nodes() -> NodeFilter {
    NodeFilter::new("all_nodes", |_| true)
}

pub fn is_root() -> NodeFilter {
    NodeFilter::new("is_root", |n| n.is_root())
}

pub fn implementation_type_is<I: ?Sized + 'static>() -> NodeFilter {
    let implementation = TypeKey::of::<I>();
    NodeFilter::new(
        format!("implementation_type_is({})", implementation.short_name()),
        move |n| n.implementation() == Some(implementation),
    )
}

pub fn service_type_is<S: ?Sized + 'static>() -> NodeFilter {
    let service = ServiceKey::of::<S>();
    NodeFilter::new(
        format!("service_type_is({})", service.type_key().short_name()),
        move |n| *n.service() == service,
    )
}

pub fn service_type_matches(filter: TypeFilter) -> NodeFilter {
    NodeFilter::new(format!("service_type_matches({})", filter.label()), move |n| {
        filter.test(&n.service().type_key())
    })
}

pub fn implementation_type_matches(filter: TypeFilter) -> NodeFilter {
    NodeFilter::new(
        format!("implementation_type_matches({})", filter.label()),
        move |n| n.implementation().is_some_and(|i| filter.test(&i)),
    )
}

pub fn registration_name_is(name: impl Into<String>) -> NodeFilter {
    let name = name.into();
    NodeFilter::new(format!("registration_name_is({name:?})"), move |n| {
        n.registration_name() == Some(name.as_str())
    })
}

pub fn has_registration_tag(name: impl Into<String>, value: Option<&str>) -> NodeFilter {
    let name = name.into();
    let value = value.map(str::to_string);
    NodeFilter::new(format!("has_registration_tag({name})"), move |n| {
        n.has_registration_tag(&name, value.as_deref())
    })
}

pub fn has_dependant_service_type<S: ?Sized + 'static>() -> NodeFilter {
    let service = ServiceKey::of::<S>();
    NodeFilter::new(
        format!("has_dependant_service_type({})", service.type_key().short_name()),
        move |n| n.has_dependant_service_type(&service),
    )
}

pub fn has_dependant_implementation_type<I: ?Sized + 'static>() -> NodeFilter {
    let implementation = TypeKey::of::<I>();
    NodeFilter::new(
        format!("has_dependant_implementation_type({})", implementation.short_name()),
        move |n| n.has_dependant_implementation_type(implementation),
    )
}

/// Test the node's parent instead of the node; rejects the root.
pub fn jump_parent(filter: NodeFilter) -> NodeFilter {
    NodeFilter::new(format!("jump_parent({})", filter.label()), move |n| {
        n.parent().is_some_and(|p| filter.test(p))
    })
}

/// Parent node filter: the requesting node was built from `I`.
pub fn parent_implementation_is<I: ?Sized + 'static>() -> NodeFilter {
    let implementation = TypeKey::of::<I>();
    NodeFilter::new(
        format!("parent_implementation_is({})", implementation.short_name()),
        move |n| n.implementation() == Some(implementation),
    )
}

/// Parent node filter: the requesting node was requested as `S`.
pub fn parent_service_type_is<S: ?Sized + 'static>() -> NodeFilter {
    let service = ServiceKey::of::<S>();
    NodeFilter::new(
        format!("parent_service_type_is({})", service.type_key().short_name()),
        move |n| !n.is_root() && *n.service() == service,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NodeKind;
    use crate::filters::types;
    use crate::node::{GraphState, Node, NodeId};
    use crate::{Registration, Tag};

    struct App;
    struct Repository;
    struct SqlRepository;
    struct Pool;

    /// root -> App ("main", layer=web) -> Repository (SqlRepository) -> Pool
    fn graph() -> (GraphState, [NodeId; 3]) {
        let mut graph = GraphState::new(ServiceKey::of::<App>());
        let app_registration = Arc::new(
            Registration::value(App)
                .named("main")
                .tag(Tag::with_value("layer", "web")),
        );
        let app = graph.add_child(
            graph.root(),
            Node::for_registration(&app_registration, ServiceKey::of::<App>()),
        );
        let repository = graph.add_child(
            app,
            Node::new(NodeKind::Service, ServiceKey::of::<Repository>())
                .implementation(TypeKey::of::<SqlRepository>())
                .parameter(Some("repository")),
        );
        let pool = graph.add_child(
            repository,
            Node::new(NodeKind::Service, ServiceKey::of::<Pool>()).implementation(TypeKey::of::<Pool>()),
        );
        (graph, [app, repository, pool])
    }

    #[test]
    fn test_root_and_type_filters() {
        let (graph, [app, repository, pool]) = graph();
        let root = graph.view(graph.root());

        assert!(all_nodes().test(root));
        assert!(is_root().test(root));
        assert!(!is_root().test(graph.view(app)));

        assert!(implementation_type_is::<SqlRepository>().test(graph.view(repository)));
        assert!(!implementation_type_is::<SqlRepository>().test(graph.view(pool)));
        assert!(service_type_is::<Repository>().test(graph.view(repository)));
        assert!(!service_type_is::<SqlRepository>().test(graph.view(repository)));

        assert!(service_type_matches(types::name_ends_with("Repository")).test(graph.view(repository)));
        assert!(!service_type_matches(types::name_ends_with("Repository")).test(graph.view(pool)));
        assert!(implementation_type_matches(types::named("SqlRepository")).test(graph.view(repository)));
        assert!(!implementation_type_matches(types::named("SqlRepository")).test(root));
    }

    #[test]
    fn test_registration_filters() {
        let (graph, [app, repository, _]) = graph();

        assert!(registration_name_is("main").test(graph.view(app)));
        assert!(!registration_name_is("main").test(graph.view(repository)));
        assert!(has_registration_tag("layer", None).test(graph.view(app)));
        assert!(has_registration_tag("layer", Some("web")).test(graph.view(app)));
        assert!(!has_registration_tag("layer", Some("db")).test(graph.view(app)));
        assert!(!has_registration_tag("layer", None).test(graph.view(repository)));
    }

    #[test]
    fn test_dependant_filters() {
        let (graph, [app, repository, pool]) = graph();

        assert!(has_dependant_service_type::<Pool>().test(graph.view(app)));
        assert!(!has_dependant_service_type::<Pool>().test(graph.view(pool)));
        assert!(has_dependant_implementation_type::<SqlRepository>().test(graph.view(graph.root())));
        assert!(!has_dependant_implementation_type::<SqlRepository>().test(graph.view(repository)));
    }

    #[test]
    fn test_parent_filters() {
        let (graph, [app, repository, _]) = graph();
        let root = graph.view(graph.root());

        assert!(jump_parent(implementation_type_is::<App>()).test(graph.view(repository)));
        assert!(!jump_parent(implementation_type_is::<App>()).test(graph.view(app)));
        assert!(jump_parent(is_root()).test(graph.view(app)));
        assert!(!jump_parent(all_nodes()).test(root));

        assert!(parent_implementation_is::<App>().test(graph.view(app)));
        assert!(parent_service_type_is::<App>().test(graph.view(app)));
        // The root is requested as App too, but is not a service node
        assert!(!parent_service_type_is::<App>().test(root));
    }

    #[test]
    fn test_combinators_and_labels() {
        let (graph, [app, repository, _]) = graph();

        let filter = is_root() | registration_name_is("main");
        assert_eq!(filter.label(), "(is_root | registration_name_is(\"main\"))");
        assert!(filter.test(graph.view(app)));
        assert!(!filter.test(graph.view(repository)));

        let both = !is_root() & service_type_is::<Repository>();
        assert!(both.test(graph.view(repository)));
        assert!(!both.test(graph.view(app)));

        let either = service_type_is::<App>() ^ registration_name_is("main");
        assert!(!either.test(graph.view(app)));
        assert!(either.test(graph.view(graph.root())));
    }
}
