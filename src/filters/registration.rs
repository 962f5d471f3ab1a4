//! Filters over candidate [`Registration`]s.

use super::RegistrationFilter;
use crate::{Registration, RegistrationId, TypeKey};

/// Accepts every registration, named ones included.
pub fn all_registrations() -> RegistrationFilter {
    RegistrationFilter::new("all_registrations", |_| true)
}

pub fn with_name(name: impl Into<String>) -> RegistrationFilter {
    let name = name.into();
    RegistrationFilter::new(format!("with_name({name:?})"), move |r: &Registration| {
        r.name() == Some(name.as_str())
    })
}

pub fn name_starts_with(prefix: impl Into<String>) -> RegistrationFilter {
    let prefix = prefix.into();
    RegistrationFilter::new(format!("name_starts_with({prefix:?})"), move |r: &Registration| {
        r.name().is_some_and(|n| n.starts_with(prefix.as_str()))
    })
}

pub fn name_ends_with(suffix: impl Into<String>) -> RegistrationFilter {
    let suffix = suffix.into();
    RegistrationFilter::new(format!("name_ends_with({suffix:?})"), move |r: &Registration| {
        r.name().is_some_and(|n| n.ends_with(suffix.as_str()))
    })
}

pub fn is_named() -> RegistrationFilter {
    RegistrationFilter::new("is_named", |r: &Registration| r.is_named())
}

/// The default filter: only unnamed registrations take part in plain lookups.
pub fn is_not_named() -> RegistrationFilter {
    RegistrationFilter::new("is_not_named", |r: &Registration| !r.is_named())
}

pub fn with_implementation<I: ?Sized + 'static>() -> RegistrationFilter {
    let implementation = TypeKey::of::<I>();
    RegistrationFilter::new(
        format!("with_implementation({})", implementation.short_name()),
        move |r: &Registration| r.implementation() == implementation,
    )
}

pub fn with_id(id: RegistrationId) -> RegistrationFilter {
    RegistrationFilter::new(format!("with_id({id})"), move |r: &Registration| r.id() == id)
}

/// Tag present; when `value` is given the tag value must match too.
pub fn has_tag(name: impl Into<String>, value: Option<&str>) -> RegistrationFilter {
    let name = name.into();
    let value = value.map(str::to_string);
    let label = match &value {
        Some(v) => format!("has_tag({name}={v})"),
        None => format!("has_tag({name})"),
    };
    RegistrationFilter::new(label, move |r: &Registration| {
        r.has_tag(&name, value.as_deref())
    })
}

/// Tag present with one of the given values.
pub fn has_tag_with_value_in<I, S>(name: impl Into<String>, values: I) -> RegistrationFilter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let name = name.into();
    let values: Vec<String> = values.into_iter().map(Into::into).collect();
    RegistrationFilter::new(
        format!("has_tag_with_value_in({name}, {values:?})"),
        move |r: &Registration| {
            r.tags()
                .iter()
                .any(|t| t.name() == name && t.value().is_some_and(|v| values.iter().any(|x| x == v)))
        },
    )
}

/// Tag missing entirely, or present with the given value.
pub fn has_tag_with_value_or_missing_tag(name: impl Into<String>, value: impl Into<String>) -> RegistrationFilter {
    let name = name.into();
    let value = value.into();
    RegistrationFilter::new(
        format!("has_tag_with_value_or_missing_tag({name}={value})"),
        move |r: &Registration| r.has_tag(&name, Some(&value)) || !r.has_tag(&name, None),
    )
}

/// The registration's service is a generic instantiation binding `param` to `T`.
pub fn has_generic_args_matching<T: ?Sized + 'static>(param: &'static str) -> RegistrationFilter {
    let expected = TypeKey::of::<T>();
    RegistrationFilter::new(
        format!("has_generic_args_matching({param}={})", expected.short_name()),
        move |r: &Registration| {
            r.service()
                .binding()
                .and_then(|b| b.arg(param))
                .is_some_and(|arg| arg == expected)
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tag;

    struct Thing;

    fn thing(name: Option<&str>, tags: &[Tag]) -> Registration {
        let mut registration = Registration::value(Thing).tagged(tags.iter().cloned());
        if let Some(name) = name {
            registration = registration.named(name);
        }
        registration
    }

    #[test]
    fn test_name_filters() {
        let named = thing(Some("primary-db"), &[]);
        let unnamed = thing(None, &[]);

        assert!(with_name("primary-db").test(&named));
        assert!(!with_name("primary").test(&named));
        assert!(name_starts_with("primary").test(&named));
        assert!(name_ends_with("-db").test(&named));
        assert!(!name_ends_with("-db").test(&unnamed));
        assert!(is_named().test(&named));
        assert!(is_not_named().test(&unnamed));
        assert!(!is_not_named().test(&named));
        assert!(all_registrations().test(&named));
    }

    #[test]
    fn test_tag_filters() {
        let tagged = thing(None, &[Tag::with_value("env", "prod")]);
        let bare_tag = thing(None, &[Tag::new("env")]);
        let untagged = thing(None, &[]);

        assert!(has_tag("env", None).test(&tagged));
        assert!(has_tag("env", Some("prod")).test(&tagged));
        assert!(!has_tag("env", Some("dev")).test(&tagged));
        assert!(has_tag("env", None).test(&bare_tag));

        let in_set = has_tag_with_value_in("env", ["dev", "prod"]);
        assert!(in_set.test(&tagged));
        assert!(!in_set.test(&bare_tag));

        let prod_or_missing = has_tag_with_value_or_missing_tag("env", "prod");
        assert!(prod_or_missing.test(&tagged));
        assert!(prod_or_missing.test(&untagged));
        assert!(!prod_or_missing.test(&bare_tag));
    }

    #[test]
    fn test_implementation_filter() {
        let registration = thing(None, &[]);
        assert!(with_implementation::<Thing>().test(&registration));
        assert!(!with_implementation::<u8>().test(&registration));
    }
}
