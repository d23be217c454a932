use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, parse_quote, ItemFn};

// Import shared utilities
use memorito_macro_utils::{
    collect_arguments, parse_memoized_attributes, result_types, return_type, static_ident,
};

/// A procedural macro that memoizes a free function.
///
/// The function body moves into a nested function and the annotated function
/// becomes a thin wrapper around a `static` [`Memoized`] created on first
/// call. Arguments are turned into the cache key through `serde`, so every
/// argument must implement `Serialize`; the return value must implement
/// `Clone`.
///
/// # Macro Parameters
///
/// - `name` (optional): Diagnostic name, also the key under which statistics
///   are published in `stats_registry`. Default: the function name.
/// - `time` (optional): Time-to-live of each entry in milliseconds.
///   Default: entries never expire.
///
/// # Cache Behavior
///
/// - **Global scope**: one cache per function, shared by every thread
/// - **Result-returning functions**: only `Ok` values are cached; the error
///   type must implement `From<MemoizeError>` so that argument serialization
///   failures come back as `Err`
/// - **Other functions**: every result is cached; a serialization failure panics.
///   Arguments whose serialization can fail at runtime (maps with non-string
///   keys, `ByIdentity` of an empty `Option`) belong in a function returning
///   `Result`, or in [`try_memoize`], so the failure comes back as `Err`
/// - **Global clear**: `memorito::clear_all()` empties the cache of every
///   memoized function
/// - **Recursion**: recursive calls go through the cache; the lock is not held
///   while the body runs
///
/// # Restrictions
///
/// The cache type is spelled out in a `static`, so the function can not be
/// generic, take `self` or borrow its arguments.
///
/// # Methods
///
/// There is no per-instance form of the attribute: a `static` inside a method
/// can not name `Self`. Cache methods with [`memoize_method`] and
/// `this_namespace`, which keys one bucket per receiver without keeping the
/// receiver alive:
///
/// ```ignore
/// use memorito::{memoize_method, MemoizeOptions, Memoized};
/// use once_cell::sync::Lazy;
/// use std::sync::Arc;
///
/// struct Invoice {
///     lines: Vec<u64>,
/// }
///
/// static TOTAL: Lazy<Memoized<Arc<Invoice>, (), u64>> = Lazy::new(|| {
///     memoize_method(
///         |invoice: &Arc<Invoice>, (): ()| invoice.lines.iter().sum(),
///         MemoizeOptions::new().name("total").this_namespace(true),
///     )
/// });
///
/// impl Invoice {
///     fn total(self: &Arc<Self>) -> u64 {
///         TOTAL.call_on(self, ()).unwrap_or_default()
///     }
/// }
/// ```
///
/// # Examples
///
/// ```ignore
/// use memorito::memoized;
///
/// #[memoized]
/// fn fibonacci(n: u64) -> u64 {
///     if n < 2 {
///         return n;
///     }
///     fibonacci(n - 1) + fibonacci(n - 2)
/// }
///
/// #[memoized(name = "profile", time = 30_000)]
/// fn load_profile(user_id: u64) -> Result<Profile, ProfileError> {
///     database::load(user_id)
/// }
/// ```
///
/// [`Memoized`]: https://docs.rs/memorito-core/latest/memorito_core/struct.Memoized.html
/// [`memoize_method`]: https://docs.rs/memorito-core/latest/memorito_core/fn.memoize_method.html
/// [`try_memoize`]: https://docs.rs/memorito-core/latest/memorito_core/fn.try_memoize.html
#[proc_macro_attribute]
pub fn memoized(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    match expand(attr.into(), input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => TokenStream::from(quote! { #err; }),
    }
}

fn expand(attr: TokenStream2, input: ItemFn) -> Result<TokenStream2, TokenStream2> {
    let attrs = parse_memoized_attributes(attr)?;

    if input.sig.asyncness.is_some() {
        return Err(quote! {
            compile_error!("`#[memoized]` does not support async functions; use `memorito_async::memoized_async`")
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

    // The outer function binds plain identifiers; patterns stay on the inner one
    let mut outer_sig = input.sig.clone();
    outer_sig.inputs = parse_quote! { #(#idents: #types),* };

    let mut inner_sig = input.sig.clone();
    inner_sig.ident = inner_ident.clone();
    inner_sig.inputs = parse_quote! { #(#pats: #types),* };

    let time_option = attrs.time.map(|ttl| quote! { .time(#ttl) });
    let options = quote! {
        ::memorito_core::MemoizeOptions::new()
            .name(#fn_name_str)
            #time_option
    };
    let closure = quote! {
        |(#(#idents,)*): (#(#types,)*)| #inner_ident(#(#idents),*)
    };

    let (memo_type, constructor, call) = match result_types(&input.sig.output) {
        Some((ok_type, err_type)) => (
            quote! { ::memorito_core::Memoized<(), (#(#types,)*), #ok_type, #err_type> },
            quote! { ::memorito_core::try_memoize(#closure, #options) },
            quote! { #memo_ident.call((#(#idents,)*)) },
        ),
        None => {
            let ret_type = return_type(&input.sig.output);
            (
                quote! { ::memorito_core::Memoized<(), (#(#types,)*), #ret_type> },
                quote! { ::memorito_core::memoize_with(#closure, #options) },
                quote! {
                    match #memo_ident.call((#(#idents,)*)) {
                        Ok(__value) => __value,
                        Err(__err) => panic!(
                            "`{}` can not be memoized: {} (return a `Result` to receive this as an error)",
                            #fn_name_str, __err
                        ),
                    }
                },
            )
        }
    };

    Ok(quote! {
        #(#fn_attrs)*
        #vis #outer_sig {
            #inner_sig #block

            static #memo_ident: ::once_cell::sync::Lazy<#memo_type> =
                ::once_cell::sync::Lazy::new(|| #constructor);

            #call
        }
    })
}
