//! Derive macros for the equity crate.
//!
//! Provides `#[derive(Error)]`, the error type boilerplate used by the compiler
//! and the virtual machine (thiserror replacement).

mod error;

use proc_macro::TokenStream;

/// Automatically implements `Display` and `Error` traits for error types.
#[proc_macro_derive(Error, attributes(error, source))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
