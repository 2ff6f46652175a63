//! #[aop] 方法属性宏实现
//!
//! 用于自动为方法应用 AOP 切面

use crate::utils::{result_ok_type, type_name};
use proc_macro2::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{Error, FnArg, Ident, ItemFn, LitStr, Pat, Result, ReturnType, Token, Type, Visibility};

/// `#[aop(...)]` 的参数
pub struct AopArgs {
    declaring_type: LitStr,
    method_name: Option<LitStr>,
    declared_in: Vec<LitStr>,
    extends: Vec<LitStr>,
    visibility: Option<LitStr>,
    capture_args: bool,
}

impl Parse for AopArgs {
    fn parse(input: ParseStream) -> Result<Self> {
        if input.is_empty() {
            return Err(input.error(
                "#[aop] expects the declaring type, e.g. #[aop(\"hello.aop.order.OrderService\")]",
            ));
        }

        let mut args = AopArgs {
            declaring_type: input.parse()?,
            method_name: None,
            declared_in: Vec::new(),
            extends: Vec::new(),
            visibility: None,
            capture_args: false,
        };

        while !input.is_empty() {
            input.parse::<Token![,]>()?;
            if input.is_empty() {
                break;
            }

            let key: Ident = input.parse()?;
            if key == "capture_args" {
                args.capture_args = true;
                continue;
            }

            input.parse::<Token![=]>()?;
            let value: LitStr = input.parse()?;
            match key.to_string().as_str() {
                "name" => args.method_name = Some(value),
                "declared_in" => args.declared_in.push(value),
                "extends" => args.extends.push(value),
                "visibility" => args.visibility = Some(value),
                other => {
                    return Err(Error::new(
                        key.span(),
                        format!("unknown #[aop] option `{}`", other),
                    ))
                }
            }
        }

        Ok(args)
    }
}

/// 实现 #[aop] 属性宏
///
/// 方法体被移入闭包，由 `chimera_aop::intercept_global` 在通知链中执行
pub fn impl_aop_method(args: AopArgs, mut item: ItemFn) -> Result<TokenStream> {
    if item.sig.asyncness.is_none() {
        return Err(Error::new_spanned(
            &item.sig.fn_token,
            "#[aop] currently only supports async methods",
        ));
    }

    let return_type = match &item.sig.output {
        ReturnType::Type(_, ty) => result_ok_type(ty).map(type_name),
        ReturnType::Default => None,
    }
    .ok_or_else(|| {
        Error::new_spanned(
            &item.sig.output,
            "#[aop] currently only supports methods returning Result<T, E>",
        )
    })?;

    let declaring_type = &args.declaring_type;
    let method_name = args
        .method_name
        .as_ref()
        .map(LitStr::value)
        .unwrap_or_else(|| item.sig.ident.to_string());
    let visibility = visibility_tokens(&args, &item.vis)?;
    let declared_in = &args.declared_in;
    let extends = &args.extends;

    let mut param_types = Vec::new();
    let mut captured = Vec::new();
    for input in &item.sig.inputs {
        let FnArg::Typed(typed) = input else {
            continue;
        };
        param_types.push(type_name(&typed.ty));
        if args.capture_args {
            match typed.pat.as_ref() {
                Pat::Ident(pat) => {
                    let ident = &pat.ident;
                    // 借用参数取其拥有所有权的副本，连接点参数要求 'static
                    captured.push(match typed.ty.as_ref() {
                        Type::Reference(_) => quote!(::std::borrow::ToOwned::to_owned(&*#ident)),
                        _ => quote!(::std::clone::Clone::clone(&#ident)),
                    });
                }
                other => {
                    return Err(Error::new_spanned(
                        other,
                        "capture_args requires plain identifier parameters",
                    ))
                }
            }
        }
    }

    let body = &item.block;
    let wrapped = quote! {
        {
            static __AOP_SIGNATURE: ::chimera_aop::once_cell::sync::Lazy<
                ::std::sync::Arc<::chimera_aop::Signature>,
            > = ::chimera_aop::once_cell::sync::Lazy::new(|| {
                ::chimera_aop::Signature::builder(#declaring_type, #method_name)
                    #(.param(#param_types))*
                    .returns(#return_type)
                    .visibility(#visibility)
                    #(.declared_in(#declared_in))*
                    #(.extends(#extends))*
                    .build()
            });

            let __aop_args = ::chimera_aop::Arguments::new()
                #(.with(#captured))*;

            ::chimera_aop::intercept_global(&__AOP_SIGNATURE, __aop_args, move || async move #body)
                .await
        }
    };

    item.block = Box::new(syn::parse2(wrapped)?);
    Ok(quote! { #item })
}

fn visibility_tokens(args: &AopArgs, vis: &Visibility) -> Result<TokenStream> {
    let variant = match &args.visibility {
        Some(lit) => match lit.value().as_str() {
            "public" => quote!(Public),
            "protected" => quote!(Protected),
            "package" => quote!(Package),
            "private" => quote!(Private),
            other => {
                return Err(Error::new(
                    lit.span(),
                    format!("unknown visibility `{}`", other),
                ))
            }
        },
        None => match vis {
            Visibility::Public(_) => quote!(Public),
            Visibility::Restricted(_) => quote!(Package),
            Visibility::Inherited => quote!(Private),
        },
    };
    Ok(quote!(::chimera_aop::Visibility::#variant))
}
