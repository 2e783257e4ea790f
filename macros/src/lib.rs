//! Procedural macros for TAP testing in wifi-provision-esp32.
//!
//! This crate provides the `#[tap_test]` attribute macro for defining tests
//! that run on real hardware (or the host) through the TAP runner binary,
//! where the standard `cargo test` harness is unavailable.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn, ReturnType};

/// Mark a function as a TAP test.
///
/// The function is registered with the test collector and executed when the
/// test binary runs. Tests can either:
/// - Return nothing (panics indicate failure)
/// - Return `Result<(), E>` where `E: std::error::Error` (Err indicates failure)
///
/// # Example
///
/// ```ignore
/// use wifi_provision_esp32_macros::tap_test;
///
/// #[tap_test]
/// fn addition_works() {
///     assert_eq!(2 + 2, 4);
/// }
///
/// #[tap_test]
/// fn parsing_works() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///     let value: i32 = "42".parse()?;
///     assert_eq!(value, 42);
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn tap_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        panic!("tap_test: attribute arguments are not supported");
    }

    let input_fn = parse_macro_input!(item as ItemFn);

    let fn_name = &input_fn.sig.ident;
    let fn_name_str = fn_name.to_string();
    let fn_block = &input_fn.block;
    let fn_vis = &input_fn.vis;
    let fn_attrs = &input_fn.attrs;
    let fn_output = &input_fn.sig.output;

    // Result-returning tests report Err; unit tests report panics
    let returns_result = matches!(fn_output, ReturnType::Type(_, _));

    let test_fn = quote! {
        #(#fn_attrs)*
        #fn_vis fn #fn_name() #fn_output #fn_block
    };

    let register_call = if returns_result {
        quote! {
            runner.run(#fn_name_str, #fn_name);
        }
    } else {
        quote! {
            runner.run_assert(#fn_name_str, #fn_name);
        }
    };

    let expanded = quote! {
        #test_fn

        ::inventory::submit! {
            ::wifi_provision_esp32::testing::TapTestEntry::new(
                #fn_name_str,
                |runner: &mut ::wifi_provision_esp32::testing::TestRunner| {
                    #register_call
                }
            )
        }
    };

    TokenStream::from(expanded)
}
