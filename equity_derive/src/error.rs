//! Derive macro for error types.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations.
//! Replacement for `thiserror` crate.
//!
//! # Usage
//!
//! ```ignore
//! use equity_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum CompileError {
//!     #[error("undefined name: {0}")]
//!     Undefined(String),
//!
//!     #[error("{context}: {source}")]
//!     Context {
//!         context: String,
//!         #[source]
//!         source: Box<CompileError>,
//!     },
//!
//!     #[error("unterminated string literal at offset {offset}")]
//!     UnterminatedString { offset: usize, line: usize },
//! }
//! ```
//!
//! # Supported Features
//!
//! - Unit variants: `#[error("message")]`
//! - Tuple variants with positional args: `#[error("error: {0}")]`
//! - Struct variants with named args: `#[error("expected {expected}")]`
//! - Fields that the message does not mention are not interpolated, so a variant
//!   may carry extra data (source positions, raw bytes) without printing it
//! - A field annotated with `#[source]` is returned from `Error::source`

use proc_macro::TokenStream;
use quote::{format_ident, quote, ToTokens};
use std::collections::HashSet;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Lit, Meta};

/// Derives `Display` and `Error` for an enum or struct.
///
/// Each variant must have an `#[error("...")]` attribute specifying
/// the display message. Supports field interpolation using `{0}`, `{1}`
/// for tuple fields or `{field_name}` for struct fields.
pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_error_derive(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_error_derive(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let (display_body, source_body) = match &input.data {
        Data::Enum(data_enum) => {
            let mut display_arms = Vec::new();
            let mut source_arms = Vec::new();

            for variant in &data_enum.variants {
                let variant_name = &variant.ident;
                let error_msg = extract_error_message(variant)?;
                let used = referenced_arguments(&error_msg);

                match &variant.fields {
                    Fields::Unit => {
                        display_arms.push(quote! {
                            Self::#variant_name => write!(f, #error_msg),
                        });
                    }
                    Fields::Unnamed(fields) => {
                        let count = fields.unnamed.len();
                        let format_str = convert_positional_to_named(&error_msg, count);
                        let used = referenced_arguments(&format_str);
                        let bindings: Vec<_> = (0..count)
                            .map(|i| {
                                let ident = format_ident!("f{}", i);
                                if used.contains(&ident.to_string()) {
                                    quote! { #ident }
                                } else {
                                    quote! { _ }
                                }
                            })
                            .collect();
                        let args: Vec<_> = (0..count)
                            .map(|i| format_ident!("f{}", i))
                            .filter(|ident| used.contains(&ident.to_string()))
                            .collect();
                        display_arms.push(quote! {
                            Self::#variant_name(#(#bindings),*) => write!(f, #format_str, #(#args = #args),*),
                        });

                        if let Some(index) = fields.unnamed.iter().position(has_source_attr) {
                            let bindings: Vec<_> = (0..count)
                                .map(|i| {
                                    if i == index {
                                        quote! { source }
                                    } else {
                                        quote! { _ }
                                    }
                                })
                                .collect();
                            source_arms.push(quote! {
                                Self::#variant_name(#(#bindings),*) => ::std::option::Option::Some(source as &(dyn ::std::error::Error + 'static)),
                            });
                        }
                    }
                    Fields::Named(fields) => {
                        let field_names: Vec<_> = fields
                            .named
                            .iter()
                            .filter_map(|f| f.ident.as_ref())
                            .filter(|ident| used.contains(&ident.to_string()))
                            .collect();
                        display_arms.push(quote! {
                            Self::#variant_name { #(#field_names,)* .. } => write!(f, #error_msg, #(#field_names = #field_names),*),
                        });

                        if let Some(field) = fields.named.iter().find(|f| has_source_attr(f)) {
                            let ident = &field.ident;
                            source_arms.push(quote! {
                                Self::#variant_name { #ident, .. } => ::std::option::Option::Some(#ident as &(dyn ::std::error::Error + 'static)),
                            });
                        }
                    }
                }
            }

            let source_body = if source_arms.is_empty() {
                quote! { ::std::option::Option::None }
            } else {
                quote! {
                    match self {
                        #(#source_arms)*
                        _ => ::std::option::Option::None,
                    }
                }
            };

            (
                quote! {
                    match self {
                        #(#display_arms)*
                    }
                },
                source_body,
            )
        }
        Data::Struct(data_struct) => {
            let error_msg = extract_error_message_from_attrs(
                &input.attrs,
                &input.ident,
                &format!("type `{}`", input.ident),
            )?;

            match &data_struct.fields {
                Fields::Unit => (quote! { write!(f, #error_msg) }, quote! { ::std::option::Option::None }),
                Fields::Named(fields) => {
                    let used = referenced_arguments(&error_msg);
                    let field_names: Vec<_> = fields
                        .named
                        .iter()
                        .filter_map(|f| f.ident.as_ref())
                        .filter(|ident| used.contains(&ident.to_string()))
                        .collect();
                    let source_body = match fields.named.iter().find(|f| has_source_attr(f)) {
                        Some(field) => {
                            let ident = &field.ident;
                            quote! { ::std::option::Option::Some(&self.#ident as &(dyn ::std::error::Error + 'static)) }
                        }
                        None => quote! { ::std::option::Option::None },
                    };
                    (
                        quote! { write!(f, #error_msg, #(#field_names = self.#field_names),*) },
                        source_body,
                    )
                }
                Fields::Unnamed(fields) => {
                    let count = fields.unnamed.len();
                    let format_str = convert_positional_to_named(&error_msg, count);
                    let used = referenced_arguments(&format_str);
                    let (field_idents, field_indices): (Vec<_>, Vec<_>) = (0..count)
                        .map(|i| (format_ident!("f{}", i), syn::Index::from(i)))
                        .filter(|(ident, _)| used.contains(&ident.to_string()))
                        .unzip();
                    let source_body = match fields.unnamed.iter().position(has_source_attr) {
                        Some(index) => {
                            let index = syn::Index::from(index);
                            quote! { ::std::option::Option::Some(&self.#index as &(dyn ::std::error::Error + 'static)) }
                        }
                        None => quote! { ::std::option::Option::None },
                    };
                    (
                        quote! { write!(f, #format_str, #(#field_idents = self.#field_indices),*) },
                        source_body,
                    )
                }
            }
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Error derive does not support unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #display_body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {
            #[allow(unreachable_patterns)]
            fn source(&self) -> ::std::option::Option<&(dyn ::std::error::Error + 'static)> {
                #source_body
            }
        }
    })
}

fn has_source_attr(field: &syn::Field) -> bool {
    field.attrs.iter().any(|attr| attr.path().is_ident("source"))
}

/// Extracts the error message from a variant's `#[error("...")]` attribute.
fn extract_error_message(variant: &syn::Variant) -> syn::Result<String> {
    let variant_name = variant.ident.to_string();
    extract_error_message_from_attrs(
        &variant.attrs,
        &variant.ident,
        &format!("variant `{}`", variant_name),
    )
}

/// Extracts the error message from attributes.
fn extract_error_message_from_attrs<T: ToTokens>(
    attrs: &[syn::Attribute],
    target: &T,
    target_desc: &str,
) -> syn::Result<String> {
    for attr in attrs {
        if !attr.path().is_ident("error") {
            continue;
        }
        let Meta::List(meta_list) = &attr.meta else {
            return Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute; use #[error(\"message\")] to describe the error",
            ));
        };
        let lit = syn::parse2::<Lit>(meta_list.tokens.clone()).map_err(|_| {
            syn::Error::new_spanned(
                &attr.meta,
                "failed to parse #[error] attribute; expected a string literal like #[error(\"stack underflow: {0}\")]",
            )
        })?;
        return match lit {
            Lit::Str(lit_str) => Ok(lit_str.value()),
            _ => Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute: message must be a string literal, e.g. #[error(\"invalid opcode: {0}\")]",
            )),
        };
    }

    Err(syn::Error::new_spanned(
        target,
        format!(
            "missing #[error(\"...\")] attribute on {}; every error variant must declare a display message",
            target_desc
        ),
    ))
}

/// Collects the argument names a format string interpolates (`{name}`, `{name:?}`).
///
/// Escaped braces (`{{`, `}}`) are skipped.
fn referenced_arguments(format_str: &str) -> HashSet<String> {
    let mut names = HashSet::new();
    let mut chars = format_str.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '{' {
            continue;
        }
        if chars.peek() == Some(&'{') {
            chars.next();
            continue;
        }
        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next == '}' || next == ':' {
                break;
            }
            name.push(next);
            chars.next();
        }
        let name = name.trim();
        if !name.is_empty() {
            names.insert(name.to_string());
        }
    }
    names
}

/// Converts positional format args `{0}`, `{1}` to named args `{f0}`, `{f1}`.
fn convert_positional_to_named(format_str: &str, field_count: usize) -> String {
    let mut result = format_str.to_string();
    for i in (0..field_count).rev() {
        for suffix in ["}", ":"] {
            let positional = format!("{{{}{}", i, suffix);
            let named = format!("{{f{}{}", i, suffix);
            result = result.replace(&positional, &named);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referenced_arguments_skips_escapes_and_specs() {
        let names = referenced_arguments("{{literal}} {a} {b:?} {c:>4}");
        assert!(names.contains("a"));
        assert!(names.contains("b"));
        assert!(names.contains("c"));
        assert!(!names.contains("literal"));
    }

    #[test]
    fn positional_arguments_are_renamed() {
        assert_eq!(
            convert_positional_to_named("{0} then {1:?}", 2),
            "{f0} then {f1:?}"
        );
    }
}
