//! Per-resolve construction tree.
//!
//! Nodes live in an arena owned by one resolve call and refer to each other
//! by index, so a child's parent link never owns the parent.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::CacheKey;
use crate::context::{DependencyContext, NodeInfo, NodeKind};
use crate::error::{ChainLink, DependencyChain};
use crate::{Instance, Lifespan, Registration, ServiceKey, Tag, TypeKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(usize);

pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) service: ServiceKey,
    pub(crate) implementation: Option<TypeKey>,
    pub(crate) registration: Option<Arc<Registration>>,
    /// Parameter through which the parent asked for this node
    pub(crate) parameter: Option<String>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) instance: Option<Instance>,
    pub(crate) decorated: Option<NodeId>,
    pub(crate) decorator: Option<NodeId>,
    /// Instance came from a lifespan cache rather than being built here
    pub(crate) cached: bool,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, service: ServiceKey) -> Self {
        Self {
            kind,
            parent: None,
            service,
            implementation: None,
            registration: None,
            parameter: None,
            children: Vec::new(),
            instance: None,
            decorated: None,
            decorator: None,
            cached: false,
        }
    }

    pub(crate) fn for_registration(registration: &Arc<Registration>, service: ServiceKey) -> Self {
        let mut node = Self::new(NodeKind::Service, service);
        node.implementation = Some(registration.implementation());
        node.registration = Some(Arc::clone(registration));
        node
    }

    pub(crate) fn implementation(mut self, implementation: TypeKey) -> Self {
        self.implementation = Some(implementation);
        self
    }

    pub(crate) fn parameter(mut self, parameter: Option<&str>) -> Self {
        self.parameter = parameter.map(str::to_string);
        self
    }
}

pub(crate) struct GraphState {
    nodes: Vec<Node>,
    pub(crate) once_per_graph: HashMap<CacheKey, Instance>,
}

impl GraphState {
    pub(crate) fn new(request: ServiceKey) -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Root, request)],
            once_per_graph: HashMap::new(),
        }
    }

    #[inline]
    pub(crate) fn root(&self) -> NodeId {
        NodeId(0)
    }

    #[inline]
    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub(crate) fn view(&self, id: NodeId) -> NodeView<'_> {
        NodeView { graph: self, id }
    }

    pub(crate) fn add_child(&mut self, parent: NodeId, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Put `node` in place of `decorated` under the same parent.
    pub(crate) fn add_decorator(&mut self, decorated: NodeId, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        let parent = self.nodes[decorated.0].parent;
        node.parent = parent;
        node.decorated = Some(decorated);
        self.nodes.push(node);
        self.nodes[decorated.0].decorator = Some(id);
        if let Some(parent) = parent {
            for child in self.nodes[parent.0].children.iter_mut() {
                if *child == decorated {
                    *child = id;
                }
            }
        }
        id
    }

    /// Nodes above `id`, nearest first, excluding `id` itself.
    pub(crate) fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(id).parent, move |p| self.node(*p).parent)
    }

    /// Whether requesting `key` under `parent` would revisit an ancestor.
    pub(crate) fn is_cyclic(&self, parent: NodeId, key: &ServiceKey) -> bool {
        std::iter::once(parent)
            .chain(self.ancestors(parent))
            .map(|id| self.node(id))
            .any(|node| node.kind != NodeKind::Root && node.service == *key)
    }

    pub(crate) fn chain(&self, from: NodeId, failed_parameter: Option<&str>) -> DependencyChain {
        let mut links: Vec<ChainLink> = std::iter::once(from)
            .chain(self.ancestors(from))
            .map(|id| self.node(id))
            .filter(|node| node.kind != NodeKind::Root)
            .map(|node| ChainLink {
                service: node.service.type_name(),
                implementation: node.implementation.map(|i| i.name()),
                registration_name: node
                    .registration
                    .as_ref()
                    .and_then(|r| r.name().map(str::to_string)),
                parameter: node.parameter.clone(),
            })
            .collect();
        links.reverse();
        DependencyChain::new(links, failed_parameter.map(str::to_string))
    }

    pub(crate) fn info(&self, id: NodeId) -> NodeInfo {
        let node = self.node(id);
        let registration = node.registration.as_deref();
        let bottom = self.view(id).bottom_decorated();
        NodeInfo {
            kind: node.kind,
            service: node.service.clone(),
            implementation: node.implementation,
            registration_name: registration.and_then(|r| r.name().map(str::to_string)),
            tags: registration.map(|r| r.tags().to_vec()).unwrap_or_default(),
            lifespan: registration.map(Registration::lifespan),
            bottom_decorated_implementation: bottom.implementation(),
        }
    }

    /// Snapshot for parameter `name` of node `id`.
    pub(crate) fn context(&self, id: NodeId, name: &str) -> DependencyContext {
        DependencyContext {
            name: name.to_string(),
            node: self.info(id),
            ancestors: self.ancestors(id).map(|a| self.info(a)).collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Borrowed view of a node, handed to node filters.
#[derive(Clone, Copy)]
pub struct NodeView<'g> {
    graph: &'g GraphState,
    id: NodeId,
}

impl<'g> NodeView<'g> {
    fn node(&self) -> &'g Node {
        self.graph.node(self.id)
    }

    pub fn kind(&self) -> NodeKind {
        self.node().kind
    }

    pub fn is_root(&self) -> bool {
        self.node().kind == NodeKind::Root
    }

    pub fn service(&self) -> &'g ServiceKey {
        &self.node().service
    }

    pub fn implementation(&self) -> Option<TypeKey> {
        self.node().implementation
    }

    pub fn registration(&self) -> Option<&'g Registration> {
        self.node().registration.as_deref()
    }

    pub fn registration_name(&self) -> Option<&'g str> {
        self.registration().and_then(Registration::name)
    }

    pub fn tags(&self) -> &'g [Tag] {
        self.registration().map(Registration::tags).unwrap_or(&[])
    }

    pub fn has_registration_tag(&self, name: &str, value: Option<&str>) -> bool {
        self.registration().is_some_and(|r| r.has_tag(name, value))
    }

    pub fn lifespan(&self) -> Option<Lifespan> {
        self.registration().map(Registration::lifespan)
    }

    pub fn parent(&self) -> Option<NodeView<'g>> {
        self.node().parent.map(|id| self.graph.view(id))
    }

    pub fn children(&self) -> impl Iterator<Item = NodeView<'g>> + use<'g> {
        let graph = self.graph;
        self.node().children.iter().map(move |id| graph.view(*id))
    }

    /// The node this decorator wraps.
    pub fn decorated(&self) -> Option<NodeView<'g>> {
        self.node().decorated.map(|id| self.graph.view(id))
    }

    /// Follows `decorated` links down to the undecorated node.
    pub fn bottom_decorated(&self) -> NodeView<'g> {
        let mut current = *self;
        while let Some(inner) = current.decorated() {
            current = inner;
        }
        current
    }

    /// Follows decorator links up to the outermost decorator.
    pub fn top_decorator(&self) -> NodeView<'g> {
        let mut current = *self;
        while let Some(id) = current.node().decorator {
            current = current.graph.view(id);
        }
        current
    }

    /// Any descendant requested as `key`.
    pub fn has_dependant_service_type(&self, key: &ServiceKey) -> bool {
        self.children()
            .any(|c| c.service() == key || c.has_dependant_service_type(key))
    }

    /// Any descendant built from `implementation`.
    pub fn has_dependant_implementation_type(&self, implementation: TypeKey) -> bool {
        self.children().any(|c| {
            c.implementation() == Some(implementation)
                || c.has_dependant_implementation_type(implementation)
        })
    }

    pub fn info(&self) -> NodeInfo {
        self.graph.info(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Root;
    struct Child;
    struct Leaf;

    fn graph() -> (GraphState, NodeId, NodeId) {
        let mut graph = GraphState::new(ServiceKey::of::<Root>());
        let root = graph.root();
        let top = graph.add_child(
            root,
            Node::new(NodeKind::Service, ServiceKey::of::<Root>())
                .implementation(TypeKey::of::<Root>()),
        );
        let child = graph.add_child(
            top,
            Node::new(NodeKind::Service, ServiceKey::of::<Child>())
                .implementation(TypeKey::of::<Child>())
                .parameter(Some("child")),
        );
        (graph, top, child)
    }

    #[test]
    fn test_cycle_detection_skips_root() {
        let (graph, top, child) = graph();
        assert!(graph.is_cyclic(child, &ServiceKey::of::<Root>()));
        assert!(graph.is_cyclic(child, &ServiceKey::of::<Child>()));
        assert!(!graph.is_cyclic(child, &ServiceKey::of::<Leaf>()));
        assert!(!graph.is_cyclic(graph.root(), &ServiceKey::of::<Root>()));
        assert!(!graph.is_cyclic(top, &ServiceKey::of::<Root>().many()));
    }

    #[test]
    fn test_decorator_replaces_child() {
        let (mut graph, top, child) = graph();
        let decorator = graph.add_decorator(
            child,
            Node::new(NodeKind::Decorator, ServiceKey::of::<Child>())
                .implementation(TypeKey::of::<Leaf>()),
        );
        assert_eq!(graph.node(top).children, vec![decorator]);

        let view = graph.view(decorator);
        assert_eq!(view.parent().unwrap().implementation(), Some(TypeKey::of::<Root>()));
        assert_eq!(view.bottom_decorated().implementation(), Some(TypeKey::of::<Child>()));
        assert_eq!(graph.view(child).top_decorator().implementation(), Some(TypeKey::of::<Leaf>()));
        assert_eq!(
            graph.info(decorator).bottom_decorated_implementation(),
            Some(TypeKey::of::<Child>())
        );
    }

    #[test]
    fn test_dependants_and_chain() {
        let (graph, top, child) = graph();
        assert!(graph.view(top).has_dependant_service_type(&ServiceKey::of::<Child>()));
        assert!(graph.view(graph.root()).has_dependant_implementation_type(TypeKey::of::<Child>()));
        assert!(!graph.view(child).has_dependant_service_type(&ServiceKey::of::<Leaf>()));

        let chain = graph.chain(child, Some("leaf"));
        assert_eq!(chain.links().len(), 2);
        assert_eq!(chain.links()[1].parameter.as_deref(), Some("child"));
        assert_eq!(chain.failed_parameter(), Some("leaf"));

        let context = graph.context(child, "leaf");
        assert_eq!(context.name(), "leaf");
        assert_eq!(context.parent().unwrap().implementation(), Some(TypeKey::of::<Root>()));
        assert_eq!(context.ancestors().len(), 2);
    }
}
