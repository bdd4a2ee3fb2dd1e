//! Derive macros for composable HTTP pipelines
//!
//! # Available Macros
//!
//! - `#[derive(PathParams)]` - Typed view over a route's path parameters
//!
//! # Example
//!
//! ```ignore
//! use composable_http_macros::PathParams;
//!
//! #[derive(PathParams, Debug)]
//! struct RepoParams {
//!     org: String,
//!     #[param(rename = "repo")]
//!     repository: String,
//! }
//!
//! // Registering with a pattern whose names differ fails at build time:
//! let app = Pipeline::app().get_typed::<RepoParams, _, _>("/:org/:repo", handler);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, LitStr, Type};

/// Derive macro for typed path parameters
///
/// Implements `PathParams` for a struct with named `String` fields. The
/// expansion names items through `composable_http_runtime`, so the deriving
/// crate only needs the runtime as a dependency. Each field binds the parameter of the same name; use
/// `#[param(rename = "...")]` when the pattern uses a different name.
///
/// # Panics
///
/// This macro will produce a compile error (not a runtime panic) if:
/// - Applied to anything but a struct with named fields
/// - A `#[param(...)]` attribute is malformed
/// - Two fields bind the same parameter name
/// - A field is not a `String`
///
/// # Example
///
/// ```ignore
/// #[derive(PathParams)]
/// struct UserParams {
///     id: String,
/// }
///
/// // UserParams::NAMES == ["id"]
/// ```
#[proc_macro_derive(PathParams, attributes(param))]
pub fn derive_path_params(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Struct(data_struct) = &input.data else {
        return syn::Error::new_spanned(input, "#[derive(PathParams)] can only be used on structs")
            .to_compile_error()
            .into();
    };

    let Fields::Named(fields) = &data_struct.fields else {
        return syn::Error::new_spanned(
            input,
            "#[derive(PathParams)] requires a struct with named fields",
        )
        .to_compile_error()
        .into();
    };

    let mut param_names = Vec::new();
    let mut initializers = Vec::new();

    for field in &fields.named {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        if let Err(err) = require_string(&field.ty) {
            return err.to_compile_error().into();
        }
        let param = match renamed(&field.attrs) {
            Ok(Some(rename)) => rename,
            Ok(None) => ident.to_string().trim_start_matches("r#").to_string(),
            Err(err) => return err.to_compile_error().into(),
        };

        if param_names.contains(&param) {
            return syn::Error::new_spanned(
                field,
                format!("path parameter `{param}` is bound by more than one field"),
            )
            .to_compile_error()
            .into();
        }

        initializers.push(quote! {
            #ident: ::std::string::String::from(params.require(#param)?)
        });
        param_names.push(param);
    }

    let expanded = quote! {
        impl #impl_generics ::composable_http_runtime::__core::PathParams for #name #ty_generics #where_clause {
            const NAMES: &'static [&'static str] = &[#(#param_names),*];

            #[allow(unused_variables)]
            fn from_params(
                params: &::composable_http_runtime::__core::Params,
            ) -> ::std::result::Result<Self, ::composable_http_runtime::__core::ContextError> {
                ::std::result::Result::Ok(Self {
                    #(#initializers),*
                })
            }
        }
    };

    TokenStream::from(expanded)
}

/// Path values are strings; other field types are rejected at the field.
fn require_string(ty: &Type) -> syn::Result<()> {
    let is_string = match ty {
        Type::Path(path) if path.qself.is_none() => path
            .path
            .segments
            .last()
            .is_some_and(|last| last.ident == "String" && last.arguments.is_none()),
        _ => false,
    };
    if is_string {
        Ok(())
    } else {
        Err(syn::Error::new_spanned(
            ty,
            "#[derive(PathParams)] fields must be `String`; parse typed values in the handler",
        ))
    }
}

/// Read `#[param(rename = "...")]` if present.
fn renamed(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut rename = None;
    for attr in attrs.iter().filter(|a| a.path().is_ident("param")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                rename = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported param attribute, expected `rename`"))
            }
        })?;
    }
    Ok(rename)
}
