//! Error types for dependency resolution

use std::fmt;
use thiserror::Error;

use crate::ScopeId;

/// Errors that can occur while registering, resolving or tearing down services
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// No registration satisfied a required dependency
    #[error("No registration found for {service} (filter: {filter}){chain}")]
    Resolution {
        service: &'static str,
        filter: String,
        chain: DependencyChain,
    },

    /// A service key reappeared among its own ancestors
    #[error("Cyclic dependency detected while resolving {service}{chain}")]
    CyclicDependency {
        service: &'static str,
        chain: DependencyChain,
    },

    /// More than one registration matched a single-value request
    #[error("Ambiguous registration for {service}: {count} candidates match (filter: {filter})")]
    AmbiguousRegistration {
        service: &'static str,
        filter: String,
        count: usize,
    },

    /// A synchronous operation reached an async-only factory, decorator or teardown
    #[error("{service} requires asynchronous resolution: its {site} is async")]
    AsyncRequired {
        service: &'static str,
        site: AsyncSite,
    },

    /// The scope (or one of its ancestors) was already closed
    #[error("{scope} is closed")]
    ScopeClosed { scope: ScopeId },

    /// One or more teardown callbacks failed while closing a scope
    #[error("{0}")]
    Teardown(TeardownErrors),

    /// Factory failed to create service
    #[error("Failed to create service {type_name}: {reason}")]
    CreationFailed {
        type_name: &'static str,
        reason: String,
    },

    /// Placeholder registration reached outside of a scope that overrides it
    #[error("{service} must be registered in a scope before it can be resolved{}", name_suffix(.name))]
    NeedsScopedRegistration {
        service: &'static str,
        name: Option<String>,
    },

    /// Registration rejected at registration time
    #[error("Invalid registration for {service}: {reason}")]
    InvalidRegistration {
        service: &'static str,
        reason: String,
    },

    /// A factory asked for an argument it did not declare, or of the wrong shape
    #[error("Argument `{name}` of {owner}: {reason}")]
    Argument {
        owner: &'static str,
        name: String,
        reason: String,
    },

    /// A resolved instance could not be viewed as the requested type
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Container is locked and cannot be modified
    #[error("Container is locked - cannot register new services")]
    Locked,

    /// Teardown callback failure reported by user code
    #[error("Teardown failed: {0}")]
    TeardownFailed(String),

    /// Internal error
    #[error("Internal DI error: {0}")]
    Internal(String),
}

fn name_suffix(name: &Option<String>) -> String {
    match name {
        Some(name) => format!(" (name: {name})"),
        None => String::new(),
    }
}

impl DiError {
    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed<T: ?Sized + 'static>(reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    /// Create an error to return from a teardown callback
    #[inline]
    pub fn teardown_failed(reason: impl Into<String>) -> Self {
        Self::TeardownFailed(reason.into())
    }

    /// Create an InvalidRegistration error
    #[inline]
    pub fn invalid_registration(service: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidRegistration {
            service,
            reason: reason.into(),
        }
    }

    /// Create a TypeMismatch error
    #[inline]
    pub fn type_mismatch<T: ?Sized + 'static>(found: &'static str) -> Self {
        Self::TypeMismatch {
            expected: std::any::type_name::<T>(),
            found,
        }
    }

    /// Create an Argument error
    #[inline]
    pub(crate) fn argument(owner: &'static str, name: &str, reason: impl Into<String>) -> Self {
        Self::Argument {
            owner,
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Dependency chain attached to the error, if any
    pub fn chain(&self) -> Option<&DependencyChain> {
        match self {
            Self::Resolution { chain, .. } | Self::CyclicDependency { chain, .. } => Some(chain),
            _ => None,
        }
    }
}

/// Where an async-only callable was met during synchronous work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncSite {
    Factory,
    Decorator,
    PreConfiguration,
    Teardown,
}

impl fmt::Display for AsyncSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Factory => "factory",
            Self::Decorator => "decorator",
            Self::PreConfiguration => "pre-configuration",
            Self::Teardown => "teardown",
        })
    }
}

// =============================================================================
// Dependency chain
// =============================================================================

/// One requesting node in a failed resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub service: &'static str,
    pub implementation: Option<&'static str>,
    pub registration_name: Option<String>,
    /// Parameter through which this node was requested by its parent
    pub parameter: Option<String>,
}

/// Ancestor chain of a failed request, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyChain {
    links: Vec<ChainLink>,
    /// Parameter of the innermost link that could not be satisfied
    failed_parameter: Option<String>,
}

impl DependencyChain {
    pub(crate) fn new(links: Vec<ChainLink>, failed_parameter: Option<String>) -> Self {
        Self {
            links,
            failed_parameter,
        }
    }

    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    pub fn failed_parameter(&self) -> Option<&str> {
        self.failed_parameter.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl fmt::Display for DependencyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.links.is_empty() {
            return Ok(());
        }
        f.write_str("\ndependency chain:")?;
        for (depth, link) in self.links.iter().enumerate() {
            write!(f, "\n{:indent$}-> {}", "", link.service, indent = depth * 2 + 2)?;
            if let Some(implementation) = link.implementation {
                if implementation != link.service {
                    write!(f, " [{implementation}]")?;
                }
            }
            if let Some(name) = &link.registration_name {
                write!(f, " name={name:?}")?;
            }
            if let Some(parameter) = &link.parameter {
                write!(f, " (as `{parameter}`)")?;
            }
        }
        if let Some(parameter) = &self.failed_parameter {
            write!(f, "\n{:indent$}x parameter `{parameter}`", "", indent = self.links.len() * 2 + 2)?;
        }
        Ok(())
    }
}

// =============================================================================
// Teardown aggregate
// =============================================================================

/// A single failed teardown callback.
#[derive(Debug, Clone)]
pub struct TeardownFailure {
    pub service: &'static str,
    pub error: Box<DiError>,
}

/// Every teardown callback that failed while closing one scope.
#[derive(Debug, Clone, Default)]
pub struct TeardownErrors(Vec<TeardownFailure>);

impl TeardownErrors {
    pub(crate) fn push(&mut self, service: &'static str, error: DiError) {
        self.0.push(TeardownFailure {
            service,
            error: Box::new(error),
        });
    }

    pub fn failures(&self) -> &[TeardownFailure] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn into_result(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(DiError::Teardown(self))
        }
    }
}

impl fmt::Display for TeardownErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} teardown callback(s) failed", self.0.len())?;
        for failure in &self.0 {
            write!(f, "\n  {}: {}", failure.service, failure.error)?;
        }
        Ok(())
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_display_lists_every_link() {
        let chain = DependencyChain::new(
            vec![
                ChainLink {
                    service: "app::Handler",
                    implementation: None,
                    registration_name: None,
                    parameter: None,
                },
                ChainLink {
                    service: "app::Repo",
                    implementation: Some("app::SqlRepo"),
                    registration_name: Some("primary".into()),
                    parameter: Some("repo".into()),
                },
            ],
            Some("pool".into()),
        );
        let err = DiError::Resolution {
            service: "app::Pool",
            filter: "is_not_named".into(),
            chain,
        };
        let text = err.to_string();
        assert!(text.contains("No registration found for app::Pool (filter: is_not_named)"));
        assert!(text.contains("-> app::Handler"));
        assert!(text.contains("-> app::Repo [app::SqlRepo] name=\"primary\" (as `repo`)"));
        assert!(text.contains("x parameter `pool`"));
    }

    #[test]
    fn test_teardown_errors_aggregate() {
        let mut errors = TeardownErrors::default();
        assert!(errors.clone().into_result().is_ok());

        errors.push("a::First", DiError::teardown_failed("boom"));
        errors.push("a::Second", DiError::teardown_failed("bang"));
        let err = errors.into_result().unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("2 teardown callback(s) failed"));
        assert!(text.contains("a::First: Teardown failed: boom"));
        assert!(text.contains("a::Second: Teardown failed: bang"));
    }

    #[test]
    fn test_needs_scoped_registration_message() {
        let err = DiError::NeedsScopedRegistration {
            service: "app::Request",
            name: Some("current".into()),
        };
        assert_eq!(
            err.to_string(),
            "app::Request must be registered in a scope before it can be resolved (name: current)"
        );
    }
}
