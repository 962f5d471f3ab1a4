//! Filters over types, used when enumerating implementations.

use super::TypeFilter;
use crate::TypeKey;

/// Short type name equals `name`.
pub fn named(name: &'static str) -> TypeFilter {
    TypeFilter::new(format!("named({name})"), move |t: &TypeKey| t.short_name() == name)
}

pub fn name_starts_with(prefix: &'static str) -> TypeFilter {
    TypeFilter::new(format!("name_starts_with({prefix})"), move |t: &TypeKey| {
        t.short_name().starts_with(prefix)
    })
}

pub fn name_ends_with(suffix: &'static str) -> TypeFilter {
    TypeFilter::new(format!("name_ends_with({suffix})"), move |t: &TypeKey| {
        t.short_name().ends_with(suffix)
    })
}

/// Type declared directly in one of the given module paths.
pub fn is_in_module(modules: &[&'static str]) -> TypeFilter {
    let modules = modules.to_vec();
    TypeFilter::new(format!("is_in_module({})", modules.join(", ")), move |t: &TypeKey| {
        modules.iter().any(|m| t.module_path() == *m)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    mod handlers {
        pub struct LoginHandler;
        pub struct LogoutHandler;
    }

    #[test]
    fn test_name_matching() {
        let login = TypeKey::of::<handlers::LoginHandler>();
        let logout = TypeKey::of::<handlers::LogoutHandler>();

        assert!(named("LoginHandler").test(&login));
        assert!(!named("LoginHandler").test(&logout));
        assert!(name_starts_with("Log").test(&logout));
        assert!(name_ends_with("Handler").test(&login));
        assert!(!(name_starts_with("Login") & name_ends_with("Handler")).test(&logout));
    }

    #[test]
    fn test_module_matching() {
        let login = TypeKey::of::<handlers::LoginHandler>();
        assert!(is_in_module(&["app::other", login.module_path()]).test(&login));
        assert!(!is_in_module(&["graph_injector"]).test(&login));
    }
}
