//! Shared utilities for memorito procedural macros
//!
//! This crate provides common parsing and code generation utilities
//! used by both `memorito-macros` and `memorito-async-macros`.

use proc_macro2::{Ident, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{
    punctuated::Punctuated, Expr, FnArg, GenericArgument, MetaNameValue, Pat, PathArguments,
    ReturnType, Signature, Token, Type,
};

/// Parsed macro attributes for sync memoization
#[derive(Default)]
pub struct MemoizedAttributes {
    /// `Duration` expression for the TTL
    pub time: Option<TokenStream2>,
    pub custom_name: Option<String>,
}

/// Parsed macro attributes for async memoization
#[derive(Default)]
pub struct AsyncMemoizedAttributes {
    pub custom_name: Option<String>,
}

/// One argument of a memoized function.
pub struct MemoizedArgument {
    /// Name the outer function binds the argument to.
    pub ident: Ident,
    /// Pattern as written by the user; the inner function keeps it.
    pub pat: Box<Pat>,
    pub ty: Box<Type>,
}

/// Parse the `time` attribute (milliseconds)
pub fn parse_time_attribute(nv: &MetaNameValue) -> TokenStream2 {
    match &nv.value {
        Expr::Lit(expr_lit) => match &expr_lit.lit {
            syn::Lit::Int(lit_int) => match lit_int.base10_parse::<u64>() {
                Ok(val) => quote! { ::std::time::Duration::from_millis(#val) },
                Err(_) => quote! { compile_error!("`time` must be a positive integer (milliseconds)") },
            },
            _ => quote! { compile_error!("Invalid literal for `time`: expected integer (milliseconds)") },
        },
        _ => quote! { compile_error!("Invalid syntax for `time`: expected `time = <integer>`") },
    }
}

/// Parse the `name` attribute
pub fn parse_name_attribute(nv: &MetaNameValue) -> Option<String> {
    match &nv.value {
        Expr::Lit(expr_lit) => match &expr_lit.lit {
            syn::Lit::Str(s) => Some(s.value()),
            _ => None,
        },
        _ => None,
    }
}

fn parse_name_values(attr: TokenStream2) -> Result<Punctuated<MetaNameValue, Token![,]>, TokenStream2> {
    use syn::parse::Parser;

    let parser = Punctuated::<MetaNameValue, Token![,]>::parse_terminated;
    parser.parse2(attr).map_err(|e| {
        let msg = format!("Failed to parse attributes: {}", e);
        quote! { compile_error!(#msg) }
    })
}

fn unknown_attribute(nv: &MetaNameValue, expected: &str) -> TokenStream2 {
    let path = &nv.path;
    let msg = format!(
        "Unknown attribute `{}`: expected {}",
        quote!(#path).to_string().replace(' ', ""),
        expected
    );
    quote! { compile_error!(#msg) }
}

/// Parse `#[memoized(...)]` attributes from a token stream
pub fn parse_memoized_attributes(attr: TokenStream2) -> Result<MemoizedAttributes, TokenStream2> {
    let mut attrs = MemoizedAttributes::default();

    for nv in parse_name_values(attr)? {
        if nv.path.is_ident("time") {
            attrs.time = Some(parse_time_attribute(&nv));
        } else if nv.path.is_ident("name") {
            attrs.custom_name = parse_name_attribute(&nv);
        } else {
            return Err(unknown_attribute(&nv, "`name` or `time`"));
        }
    }

    Ok(attrs)
}

/// Parse `#[memoized_async(...)]` attributes from a token stream
pub fn parse_async_attributes(attr: TokenStream2) -> Result<AsyncMemoizedAttributes, TokenStream2> {
    let mut attrs = AsyncMemoizedAttributes::default();

    for nv in parse_name_values(attr)? {
        if nv.path.is_ident("name") {
            attrs.custom_name = parse_name_attribute(&nv);
        } else {
            return Err(unknown_attribute(&nv, "`name`"));
        }
    }

    Ok(attrs)
}

/// Checks that `sig` can back a `static` cache and collects its arguments.
///
/// The cache type is spelled out in a `static`, so the function can not be
/// generic, take `self`, or borrow its arguments.
pub fn collect_arguments(sig: &Signature) -> Result<Vec<MemoizedArgument>, TokenStream2> {
    if !sig.generics.params.is_empty() {
        return Err(quote! { compile_error!("Memoized functions can not be generic") });
    }

    let mut args = Vec::new();
    for (index, arg) in sig.inputs.iter().enumerate() {
        match arg {
            FnArg::Receiver(_) => {
                return Err(quote! {
                    compile_error!("Memoized functions can not take `self`; use `memoize_method` with `this_namespace` instead")
                });
            }
            FnArg::Typed(pat_type) => {
                if contains_borrow(&pat_type.ty) {
                    return Err(quote! {
                        compile_error!("Memoized functions must take owned arguments (e.g. `String` instead of `&str`)")
                    });
                }
                args.push(MemoizedArgument {
                    ident: format_ident!("__memorito_arg{}", index),
                    pat: pat_type.pat.clone(),
                    ty: pat_type.ty.clone(),
                });
            }
        }
    }
    Ok(args)
}

fn contains_borrow(ty: &Type) -> bool {
    match ty {
        Type::Reference(_) | Type::ImplTrait(_) => true,
        Type::Tuple(tuple) => tuple.elems.iter().any(contains_borrow),
        Type::Array(array) => contains_borrow(&array.elem),
        Type::Slice(slice) => contains_borrow(&slice.elem),
        Type::Paren(paren) => contains_borrow(&paren.elem),
        Type::Group(group) => contains_borrow(&group.elem),
        Type::Path(path) => path.path.segments.iter().any(|segment| match &segment.arguments {
            PathArguments::AngleBracketed(generic) => generic.args.iter().any(|arg| match arg {
                GenericArgument::Type(ty) => contains_borrow(ty),
                GenericArgument::Lifetime(_) => true,
                _ => false,
            }),
            _ => false,
        }),
        _ => false,
    }
}

/// Returns the return type, `()` when omitted
pub fn return_type(output: &ReturnType) -> TokenStream2 {
    match output {
        ReturnType::Default => quote! { () },
        ReturnType::Type(_, ty) => quote! { #ty },
    }
}

/// Splits `Result<T, E>` into `T` and `E`
pub fn result_types(output: &ReturnType) -> Option<(&Type, &Type)> {
    let ReturnType::Type(_, ty) = output else {
        return None;
    };
    let Type::Path(path) = ty.as_ref() else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Result" {
        return None;
    }
    let PathArguments::AngleBracketed(generic) = &segment.arguments else {
        return None;
    };
    let mut types = generic.args.iter().filter_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    });
    match (types.next(), types.next(), types.next()) {
        (Some(ok), Some(err), None) => Some((ok, err)),
        _ => None,
    }
}

/// Name of the `static` holding the cache for `fn_name`
pub fn static_ident(fn_name: &Ident) -> Ident {
    format_ident!("__MEMORITO_{}", fn_name.to_string().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_parse_memoized_attributes() {
        let attrs = parse_memoized_attributes(quote! { name = "lookup", time = 250 }).unwrap();
        assert_eq!(attrs.custom_name.as_deref(), Some("lookup"));
        assert!(attrs.time.unwrap().to_string().contains("from_millis"));

        let defaults = parse_memoized_attributes(TokenStream2::new()).unwrap();
        assert!(defaults.custom_name.is_none());
        assert!(defaults.time.is_none());
    }

    #[test]
    fn test_unknown_attribute_is_rejected() {
        let err = parse_memoized_attributes(quote! { limit = 10 }).err().unwrap();
        assert!(err.to_string().contains("Unknown attribute `limit`"));

        assert!(parse_async_attributes(quote! { time = 10 }).is_err());
    }

    #[test]
    fn test_collect_arguments() {
        let sig: Signature = parse_quote! { fn add(a: u32, mut b: Vec<String>) -> u32 };
        let args = collect_arguments(&sig).unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].ident.to_string(), "__memorito_arg0");
    }

    #[test]
    fn test_collect_arguments_rejects_borrows_and_generics() {
        let borrowed: Signature = parse_quote! { fn len(s: &str) -> usize };
        assert!(collect_arguments(&borrowed).is_err());

        let nested: Signature = parse_quote! { fn len(s: Vec<&'static str>) -> usize };
        assert!(collect_arguments(&nested).is_err());

        let generic: Signature = parse_quote! { fn id<T>(t: T) -> T };
        assert!(collect_arguments(&generic).is_err());
    }

    #[test]
    fn test_result_types() {
        let output: ReturnType = parse_quote! { -> Result<u32, LookupError> };
        let (ok, err) = result_types(&output).unwrap();
        assert_eq!(quote!(#ok).to_string(), "u32");
        assert_eq!(quote!(#err).to_string(), "LookupError");

        let plain: ReturnType = parse_quote! { -> u32 };
        assert!(result_types(&plain).is_none());

        let alias: ReturnType = parse_quote! { -> io::Result<u32> };
        assert!(result_types(&alias).is_none());
    }
}
