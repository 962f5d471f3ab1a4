//! Filters used to pick registrations, constrain parents and trim collections.
//!
//! Every filter carries a label so resolution errors can show which filter
//! rejected all candidates. Filters compose with `&`, `|`, `^` and `!`:
//!
//! ```rust
//! use graph_injector::filters::registration::{has_tag, is_named};
//!
//! let filter = has_tag("db", Some("primary")) & !is_named();
//! assert_eq!(filter.label(), "(has_tag(db=primary) & !is_named)");
//! ```

mod predicate;

pub mod list;
pub mod node;
pub mod registration;
pub mod types;

pub use list::{ListModifier, ListReducer};
pub use node::NodeFilter;
pub use predicate::Predicate;

use crate::{Registration, TypeKey};

/// Predicate over candidate registrations.
pub type RegistrationFilter = Predicate<Registration>;

/// Predicate over types (implementation or service types).
pub type TypeFilter = Predicate<TypeKey>;
