//! Read-only views of the node being constructed and its ancestors.
//!
//! A [`DependencyContext`] is a snapshot handed to factories and value
//! factories. It is only meaningful during construction and should not be
//! stored by the constructed service.

use crate::{Lifespan, ServiceKey, Tag, TypeKey};

/// What a node in the resolution tree stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The top of a resolve call
    Root,
    /// A registration being built
    Service,
    /// A collection request whose children are the members
    Collection,
    /// A decorator wrapping the node it decorates
    Decorator,
    /// A pre-configuration run before its service
    PreConfiguration,
}

/// Owned description of one node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub(crate) kind: NodeKind,
    pub(crate) service: ServiceKey,
    pub(crate) implementation: Option<TypeKey>,
    pub(crate) registration_name: Option<String>,
    pub(crate) tags: Vec<Tag>,
    pub(crate) lifespan: Option<Lifespan>,
    pub(crate) bottom_decorated_implementation: Option<TypeKey>,
}

impl NodeInfo {
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn service(&self) -> &ServiceKey {
        &self.service
    }

    pub fn implementation(&self) -> Option<TypeKey> {
        self.implementation
    }

    pub fn registration_name(&self) -> Option<&str> {
        self.registration_name.as_deref()
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn has_registration_tag(&self, name: &str, value: Option<&str>) -> bool {
        self.tags.iter().any(|t| t.matches(name, value))
    }

    pub fn lifespan(&self) -> Option<Lifespan> {
        self.lifespan
    }

    /// Implementation of the innermost decorated node; the node's own
    /// implementation when it is not a decorator.
    pub fn bottom_decorated_implementation(&self) -> Option<TypeKey> {
        self.bottom_decorated_implementation.or(self.implementation)
    }
}

/// Context for the parameter currently being supplied.
#[derive(Debug, Clone)]
pub struct DependencyContext {
    pub(crate) name: String,
    pub(crate) node: NodeInfo,
    pub(crate) ancestors: Vec<NodeInfo>,
}

impl DependencyContext {
    /// Name of the parameter being resolved.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node that owns the parameter.
    pub fn node(&self) -> &NodeInfo {
        &self.node
    }

    pub fn service(&self) -> &ServiceKey {
        &self.node.service
    }

    pub fn implementation(&self) -> Option<TypeKey> {
        self.node.implementation
    }

    /// The node that requested the owning node (the root node for a
    /// top-level request).
    pub fn parent(&self) -> Option<&NodeInfo> {
        self.ancestors.first()
    }

    /// Ancestors of the owning node, nearest first.
    pub fn ancestors(&self) -> &[NodeInfo] {
        &self.ancestors
    }
}
