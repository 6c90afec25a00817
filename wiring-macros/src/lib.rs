//! Derive macros for Wiring.
//!
//! - [`Inject`]: field injection for named-field structs

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod inject;

/// Implements `Injectable` from `#[ioc]` field attributes.
///
/// Accepted forms, all taking a tag of the shape `name[,omitempty]`:
///
/// ```rust,ignore
/// #[derive(Default, Inject)]
/// struct Handler {
///     #[ioc]                        // default binding of the field's type
///     clock: SystemClock,
///     #[ioc = "primary"]            // named binding
///     db: Arc<Database>,
///     #[ioc("cache,omitempty")]     // left at its default on failure
///     cache: Arc<Cache>,
///     hits: u64,                    // not injected
/// }
/// ```
///
/// The field's type is the lookup key as written. A field of type
/// `Option<Arc<Cache>>` asks for a binding of `Option<Arc<Cache>>`; use
/// `omitempty` to make a field optional.
///
/// Non-generic structs are also recorded so that the registry can build
/// them implicitly when asked for one.
#[proc_macro_derive(Inject, attributes(ioc))]
pub fn derive_inject(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    inject::derive_inject_impl(input)
}
