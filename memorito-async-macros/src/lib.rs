use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, parse_quote, ItemFn};

// Import shared utilities from memorito-macro-utils
use memorito_macro_utils::{
    collect_arguments, parse_async_attributes, result_types, return_type, static_ident,
};

/// A procedural macro that shares in-flight calls of an async function.
///
/// Callers that invoke the function with the same arguments while a previous
/// call is still running await that same computation instead of starting a
/// new one. Once the computation settles its entry is dropped, so results
/// are never cached beyond that point and failures are retried on the next
/// call.
///
/// # Requirements
///
/// - **Function must be async**: The function must be declared with `async fn`
/// - **Arguments**: owned values implementing `Serialize`
/// - **Return type**: `Clone + Send + Sync`; the returned future must be `Send`
/// - **Result-returning functions**: the error type must implement
///   `From<MemoizeError>`; argument serialization failures are returned as `Err`
/// - **Other functions**: argument serialization failures panic
///
/// # Macro Parameters
///
/// - `name` (optional): Diagnostic name. Default: the function name.
///
/// # Examples
///
/// ```ignore
/// use memorito_async::memoized_async;
///
/// #[memoized_async]
/// async fn fetch_user(id: u64) -> Result<User, ApiError> {
///     // Concurrent requests for the same user share this request
///     api::get_user(id).await
/// }
/// ```
#[proc_macro_attribute]
pub fn memoized_async(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    match expand(attr.into(), input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => TokenStream::from(quote! { #err; }),
    }
}

fn expand(attr: TokenStream2, input: ItemFn) -> Result<TokenStream2, TokenStream2> {
    let attrs = parse_async_attributes(attr)?;

    if input.sig.asyncness.is_none() {
        return Err(quote! {
            compile_error!("`#[memoized_async]` requires an `async fn`; use `memorito::memoized` for sync functions")
        });
    }

    let args = collect_arguments(&input.sig)?;

    let fn_attrs = &input.attrs;
    let vis = &input.vis;
    let block = &input.block;
    let fn_name = &input.sig.ident;
    let fn_name_string = fn_name.to_string();
    let fn_name_str = attrs.custom_name.as_ref().unwrap_or(&fn_name_string);
    let memo_ident = static_ident(fn_name);
    let inner_ident = format_ident!("__memorito_{}", fn_name);

    let idents: Vec<_> = args.iter().map(|arg| &arg.ident).collect();
    let types: Vec<_> = args.iter().map(|arg| &arg.ty).collect();
    let pats: Vec<_> = args.iter().map(|arg| &arg.pat).collect();

    let mut outer_sig = input.sig.clone();
    outer_sig.inputs = parse_quote! { #(#idents: #types),* };

    let mut inner_sig = input.sig.clone();
    inner_sig.ident = inner_ident.clone();
    inner_sig.inputs = parse_quote! { #(#pats: #types),* };

    let (memo_type, closure, call) = match result_types(&input.sig.output) {
        Some((ok_type, err_type)) => (
            quote! { ::memorito_async::AsyncMemoized<(#(#types,)*), #ok_type, #err_type> },
            quote! { |(#(#idents,)*): (#(#types,)*)| #inner_ident(#(#idents),*) },
            quote! { #memo_ident.call((#(#idents,)*))?.await },
        ),
        None => {
            let ret_type = return_type(&input.sig.output);
            (
                quote! { ::memorito_async::AsyncMemoized<(#(#types,)*), #ret_type> },
                quote! {
                    |(#(#idents,)*): (#(#types,)*)| async move {
                        Ok::<#ret_type, ::memorito_async::MemoizeError>(#inner_ident(#(#idents),*).await)
                    }
                },
                quote! {
                    match #memo_ident.call((#(#idents,)*)) {
                        Ok(__in_flight) => match __in_flight.await {
                            Ok(__value) => __value,
                            Err(__err) => panic!("`{}` can not be memoized: {}", #fn_name_str, __err),
                        },
                        Err(__err) => panic!("`{}` can not be memoized: {}", #fn_name_str, __err),
                    }
                },
            )
        }
    };

    Ok(quote! {
        #(#fn_attrs)*
        #vis #outer_sig {
            #inner_sig #block

            static #memo_ident: ::memorito_async::once_cell::sync::Lazy<#memo_type> =
                ::memorito_async::once_cell::sync::Lazy::new(|| {
                    ::memorito_async::memoize_async(#closure).with_name(#fn_name_str)
                });

            #call
        }
    })
}
