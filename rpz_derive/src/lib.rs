// all helper functions for derive macros used in RPZ structures
use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod rpz_enum;
use rpz_enum::rpz_enum;

#[proc_macro_derive(RpzEnum)]
pub fn rpz_macro_enum(input: TokenStream) -> TokenStream {
    // Parse the input tokens into a syntax tree
    let ast = parse_macro_input!(input as DeriveInput);

    // inject code
    rpz_enum(&ast)
}

// parse a type definition from a string, test helper
#[cfg(test)]
pub(crate) fn get_derive_input(code: &str) -> DeriveInput {
    syn::parse_str::<DeriveInput>(code).unwrap()
}
