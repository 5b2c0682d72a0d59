#![deny(warnings)]
#![warn(unused_extern_crates)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

mod entry;

#[allow(unused_extern_crates)]
extern crate proc_macro;

use proc_macro::TokenStream;

/// Run a test against a freshly built in-memory directory server. The test function takes
/// `&DirectoryServer`; `name = value` arguments override fields of `TestConfiguration`.
#[proc_macro_attribute]
pub fn dir_test(args: TokenStream, item: TokenStream) -> TokenStream {
    entry::dir_test(&args, item)
}

