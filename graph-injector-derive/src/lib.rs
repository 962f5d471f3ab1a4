//! Derive macros for graph-injector
//!
//! `#[derive(Construct)]` implements `graph_injector::Construct` for a
//! struct with named fields, declaring one parameter per `#[inject]` field.
//!
//! ```rust,ignore
//! use graph_injector::{Construct, Container, Registration};
//! use std::sync::Arc;
//!
//! struct Database { url: String }
//! trait Plugin: Send + Sync {}
//!
//! #[derive(Construct)]
//! struct UserService {
//!     #[inject]
//!     db: Arc<Database>,
//!     #[inject(list)]
//!     plugins: Vec<Arc<dyn Plugin>>,
//!     // Fields without #[inject] use Default
//!     request_count: u64,
//! }
//!
//! let container = Container::new();
//! container.register(Registration::value(Database { url: "postgres://localhost".into() })).unwrap();
//! container.register(Registration::constructor::<UserService>()).unwrap();
//! let service = container.resolve::<UserService>().unwrap();
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, Type, parse_macro_input};

/// Derive `Construct` from field attributes.
///
/// # Attributes
///
/// - `#[inject]` - A service; the field type must be `Arc<T>`.
/// - `#[inject(list)]` - Every unnamed registration of `T`; the field type
///   must be `Vec<Arc<T>>`.
/// - `#[inject(resolver)]` - A `Resolver` for the building scope.
///
/// The parameter name is the field name.
#[proc_macro_derive(Construct, attributes(inject))]
pub fn derive_construct(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(error) => error.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Construct can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Construct can only be derived for structs",
            ));
        }
    };

    let mut parameters = Vec::new();
    let mut field_inits = Vec::new();

    for field in fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let param_name = field_name.to_string();
        let field_type = &field.ty;

        match find_inject_attr(&field.attrs)? {
            Some(InjectAttr::Service) => {
                let inner = extract_arc_inner_type(field_type).ok_or_else(|| {
                    syn::Error::new_spanned(field_type, "Fields marked with #[inject] must have type Arc<T>")
                })?;
                parameters.push(quote! {
                    ::graph_injector::Parameter::service::<#inner>(#param_name)
                });
                field_inits.push(quote! { #field_name: args.get::<#inner>(#param_name)? });
            }
            Some(InjectAttr::List) => {
                let inner = extract_vec_arc_inner_type(field_type).ok_or_else(|| {
                    syn::Error::new_spanned(
                        field_type,
                        "Fields marked with #[inject(list)] must have type Vec<Arc<T>>",
                    )
                })?;
                parameters.push(quote! {
                    ::graph_injector::Parameter::list::<#inner>(#param_name)
                });
                field_inits.push(quote! { #field_name: args.list::<#inner>(#param_name)? });
            }
            Some(InjectAttr::Resolver) => {
                parameters.push(quote! {
                    ::graph_injector::Parameter::resolver(#param_name)
                });
                field_inits.push(quote! { #field_name: args.resolver(#param_name)? });
            }
            None => {
                field_inits.push(quote! {
                    #field_name: ::std::default::Default::default()
                });
            }
        }
    }

    Ok(quote! {
        impl #impl_generics ::graph_injector::Construct for #name #ty_generics #where_clause {
            fn parameters() -> ::std::vec::Vec<::graph_injector::Parameter> {
                ::std::vec![#(#parameters),*]
            }

            fn construct(
                args: &mut ::graph_injector::Arguments,
            ) -> ::graph_injector::Result<Self> {
                ::std::result::Result::Ok(Self {
                    #(#field_inits),*
                })
            }
        }
    })
}

enum InjectAttr {
    Service,
    List,
    Resolver,
}

fn find_inject_attr(attrs: &[Attribute]) -> syn::Result<Option<InjectAttr>> {
    let Some(attr) = attrs.iter().find(|a| a.path().is_ident("inject")) else {
        return Ok(None);
    };
    if attr.meta.require_path_only().is_ok() {
        return Ok(Some(InjectAttr::Service));
    }

    let kind: syn::Ident = attr.parse_args()?;
    match kind.to_string().as_str() {
        "list" => Ok(Some(InjectAttr::List)),
        "resolver" => Ok(Some(InjectAttr::Resolver)),
        _ => Err(syn::Error::new_spanned(
            kind,
            "expected #[inject], #[inject(list)] or #[inject(resolver)]",
        )),
    }
}

/// `T` from `Wrapper<T>` when the last path segment is `wrapper`.
fn single_type_argument<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    match &segment.arguments {
        syn::PathArguments::AngleBracketed(args) => match args.args.first() {
            Some(syn::GenericArgument::Type(inner)) => Some(inner),
            _ => None,
        },
        _ => None,
    }
}

fn extract_arc_inner_type(ty: &Type) -> Option<&Type> {
    single_type_argument(ty, "Arc")
}

fn extract_vec_arc_inner_type(ty: &Type) -> Option<&Type> {
    single_type_argument(ty, "Vec").and_then(extract_arc_inner_type)
}
