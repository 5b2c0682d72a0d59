use proc_macro::TokenStream;
use proc_macro2::Ident;
use quote::quote;
use syn::{parse::Parser, punctuated::Punctuated, spanned::Spanned, ExprAssign, Token};

fn token_stream_with_error(mut tokens: TokenStream, error: syn::Error) -> TokenStream {
    tokens.extend(TokenStream::from(error.into_compile_error()));
    tokens
}

const ALLOWED_ATTRIBUTES: &[&str] = &["search_max_results", "search_time_limit_ms", "with_rules"];

fn assignment_name(assign: &ExprAssign) -> Option<String> {
    match assign.left.as_ref() {
        syn::Expr::Path(path) => path.path.get_ident().map(|i| i.to_string()),
        _ => None,
    }
}

fn parse_attributes(
    args: &TokenStream,
    input: &syn::ItemFn,
) -> Result<proc_macro2::TokenStream, syn::Error> {
    let args: Punctuated<ExprAssign, syn::token::Comma> =
        Punctuated::<ExprAssign, Token![,]>::parse_terminated.parse(args.clone())?;

    let mut field_modifications = quote! {};

    for pair in args.pairs() {
        let assign = pair.value();
        let allowed = assignment_name(assign)
            .map(|name| ALLOWED_ATTRIBUTES.contains(&name.as_str()))
            .unwrap_or(false);

        if !allowed {
            let msg = "Invalid test config attribute. The following are allowed";
            return Err(syn::Error::new_spanned(
                input.sig.fn_token,
                format!("{}: {}", msg, ALLOWED_ATTRIBUTES.join(", ")),
            ));
        }

        let field_name = &assign.left;
        let field_value = &assign.right;
        field_modifications.extend(quote! {
            #field_name: #field_value,
        });
    }

    Ok(quote!(crate::testkit::TestConfiguration {
        #field_modifications
        ..crate::testkit::TestConfiguration::default()
    }))
}

pub(crate) fn dir_test(args: &TokenStream, item: TokenStream) -> TokenStream {
    let input: syn::ItemFn = match syn::parse(item.clone()) {
        Ok(it) => it,
        Err(e) => return token_stream_with_error(item, e),
    };

    if let Some(attr) = input.attrs.iter().find(|attr| attr.path().is_ident("test")) {
        let msg = "second test attribute is supplied";
        return token_stream_with_error(item, syn::Error::new_spanned(attr, msg));
    };

    if let Some(asyncness) = input.sig.asyncness {
        let msg = "directory tests are synchronous, remove the `async` keyword";
        return token_stream_with_error(item, syn::Error::new_spanned(asyncness, msg));
    }

    // Setup the config filling the remaining fields with the default values
    let default_config_struct = match parse_attributes(args, &input) {
        Ok(dc) => dc,
        Err(e) => return token_stream_with_error(args.clone(), e),
    };

    let test_fn = &input.sig.ident;
    let test_driver = Ident::new(&format!("dir_{}", test_fn), input.sig.span());

    // Effectively we are just injecting a real test function around this which we will
    // call.
    let result = quote! {
        #input

        #[::core::prelude::v1::test]
        fn #test_driver() {
            let test_config = #default_config_struct;
            let test_server = crate::testkit::setup_test(test_config);

            #test_fn(&test_server);

            let inconsistencies = test_server.verify();
            assert!(
                inconsistencies.is_empty(),
                "directory inconsistent after test: {:?}",
                inconsistencies
            );
        }
    };

    result.into()
}
