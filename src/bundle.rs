//! Bundles: reusable groups of registrations.
//!
//! A bundle is anything that can register services on a container. Plain
//! closures taking `&Container` are bundles, so most applications never
//! implement the trait by hand.
//!
//! ```rust
//! use graph_injector::{Container, Registration, RunOnce};
//!
//! struct Settings { verbose: bool }
//!
//! let settings = RunOnce::new(|container: &Container| {
//!     container.register(Registration::value(Settings { verbose: true }))?;
//!     Ok(())
//! });
//!
//! let container = Container::new();
//! container.apply_bundle(&settings).unwrap();
//! container.apply_bundle(&settings).unwrap();
//! assert_eq!(container.registration_ids::<Settings>().len(), 1);
//! ```

use std::any::TypeId;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, warn};

use crate::{Container, Result};

/// A group of registrations applied together.
pub trait Bundle: Send + Sync {
    fn apply(&self, container: &Container) -> Result<()>;

    /// Name used in log messages.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<F> Bundle for F
where
    F: Fn(&Container) -> Result<()> + Send + Sync,
{
    fn apply(&self, container: &Container) -> Result<()> {
        self(container)
    }
}

/// Applies the wrapped bundle the first time only, whatever container it
/// is applied to.
pub struct RunOnce<B> {
    bundle: B,
    applied: AtomicBool,
}

impl<B: Bundle> RunOnce<B> {
    pub fn new(bundle: B) -> Self {
        Self {
            bundle,
            applied: AtomicBool::new(false),
        }
    }

    pub fn has_run(&self) -> bool {
        self.applied.load(Ordering::Acquire)
    }
}

impl<B: Bundle> Bundle for RunOnce<B> {
    fn apply(&self, container: &Container) -> Result<()> {
        if self.applied.swap(true, Ordering::AcqRel) {
            #[cfg(feature = "logging")]
            warn!(
                target: "graph_injector",
                bundle = self.bundle.name(),
                "Bundle already applied, skipping"
            );
            return Ok(());
        }

        #[cfg(feature = "logging")]
        debug!(target: "graph_injector", bundle = self.bundle.name(), "Applying bundle");

        self.bundle.apply(container)
    }

    fn name(&self) -> &'static str {
        self.bundle.name()
    }
}

/// Applies bundle type `B` once per container tree; later applications of
/// any `B` value to the same tree are skipped.
pub struct RunOncePerType<B> {
    bundle: B,
}

impl<B: Bundle + 'static> RunOncePerType<B> {
    pub fn new(bundle: B) -> Self {
        Self { bundle }
    }
}

impl<B: Bundle + 'static> Bundle for RunOncePerType<B> {
    fn apply(&self, container: &Container) -> Result<()> {
        let applied = &container.state.shared.applied_bundles;
        if applied.insert(TypeId::of::<B>(), self.bundle.name()).is_some() {
            #[cfg(feature = "logging")]
            warn!(
                target: "graph_injector",
                bundle = self.bundle.name(),
                "Bundle type already applied to this container, skipping"
            );
            return Ok(());
        }

        #[cfg(feature = "logging")]
        debug!(target: "graph_injector", bundle = self.bundle.name(), "Applying bundle");

        self.bundle.apply(container)
    }

    fn name(&self) -> &'static str {
        self.bundle.name()
    }
}
