//! Implementation of the `#[script_class]` attribute macro.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{FnArg, ImplItem, ImplItemFn, ItemImpl, LitStr, Pat, ReturnType, Type, parse_macro_input};

use crate::attrs::{ScriptClassAttrs, VirtualAttrs, is_native_virtual};

pub fn script_class_impl(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut attrs = ScriptClassAttrs::default();
    let parser = syn::meta::parser(|meta| attrs.parse(meta));
    parse_macro_input!(attr with parser);

    let input = parse_macro_input!(item as ItemImpl);

    match script_class_inner(attrs, input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// One `#[native_virtual]` method.
struct VirtualMethod {
    virtual_name: String,
    ident: syn::Ident,
    params: Vec<Type>,
    returns_value: bool,
}

fn script_class_inner(attrs: ScriptClassAttrs, mut input: ItemImpl) -> syn::Result<TokenStream2> {
    if let Some((_, path, _)) = &input.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "#[script_class] goes on an inherent impl block",
        ));
    }
    let Some(base) = attrs.base else {
        return Err(syn::Error::new(
            proc_macro2::Span::call_site(),
            "#[script_class] needs a native base class: #[script_class(base = \"Node\")]",
        ));
    };

    let self_ty = input.self_ty.clone();
    let name = match attrs.name {
        Some(name) => name,
        None => LitStr::new(&type_name(&self_ty)?, proc_macro2::Span::call_site()),
    };

    let mut virtuals = Vec::new();
    for item in &mut input.items {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        if let Some(virtual_attrs) = VirtualAttrs::from_attrs(&method.attrs)? {
            virtuals.push(virtual_method(method, virtual_attrs)?);
            method.attrs.retain(|attr| !is_native_virtual(attr));
        }
    }

    for (index, method) in virtuals.iter().enumerate() {
        if virtuals[..index].iter().any(|other| other.virtual_name == method.virtual_name) {
            return Err(syn::Error::new_spanned(
                &method.ident,
                format!("virtual '{}' is overridden twice", method.virtual_name),
            ));
        }
    }

    let override_names = virtuals.iter().map(|v| &v.virtual_name);
    let arms = virtuals.iter().map(dispatch_arm);
    let (impl_generics, _, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        #input

        impl #impl_generics ::nativebind::ScriptClass for #self_ty #where_clause {
            const NAME: &'static str = #name;
            const BASE: &'static str = #base;
            const OVERRIDES: &'static [&'static str] = &[#(#override_names),*];

            fn call_virtual(
                &mut self,
                method: &str,
                args: &[::nativebind::__private::Variant],
            ) -> ::nativebind::BridgeResult<::nativebind::__private::Variant> {
                match method {
                    #(#arms)*
                    _ => ::core::result::Result::Err(::nativebind::BridgeError::UnknownVirtual {
                        class: ::std::string::String::from(#base),
                        method: ::std::string::String::from(method),
                    }),
                }
            }
        }
    })
}

fn virtual_method(method: &ImplItemFn, attrs: VirtualAttrs) -> syn::Result<VirtualMethod> {
    let sig = &method.sig;
    if !matches!(sig.inputs.first(), Some(FnArg::Receiver(_))) {
        return Err(syn::Error::new_spanned(sig, "#[native_virtual] methods take `&self` or `&mut self`"));
    }
    if sig.asyncness.is_some() || !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(sig, "#[native_virtual] methods cannot be async or generic"));
    }

    let mut params = Vec::new();
    for arg in sig.inputs.iter().skip(1) {
        let FnArg::Typed(pat_type) = arg else {
            continue;
        };
        if !matches!(*pat_type.pat, Pat::Ident(_) | Pat::Wild(_)) {
            return Err(syn::Error::new_spanned(&pat_type.pat, "expected a plain parameter name"));
        }
        if let Type::Reference(reference) = &*pat_type.ty {
            return Err(syn::Error::new_spanned(
                reference,
                "virtual parameters are unboxed by value; take an owned type",
            ));
        }
        params.push((*pat_type.ty).clone());
    }

    Ok(VirtualMethod {
        virtual_name: attrs.name.unwrap_or_else(|| sig.ident.to_string()),
        ident: sig.ident.clone(),
        params,
        returns_value: matches!(&sig.output, ReturnType::Type(_, ty) if !is_unit(ty)),
    })
}

fn dispatch_arm(method: &VirtualMethod) -> TokenStream2 {
    let virtual_name = &method.virtual_name;
    let ident = &method.ident;
    let arity = method.params.len();
    let bindings: Vec<_> = (0..arity).map(|i| format_ident!("arg{}", i)).collect();
    let unboxes = method.params.iter().zip(&bindings).enumerate().map(|(index, (ty, binding))| {
        quote! {
            let #binding: #ty = ::nativebind::__private::unbox(&args[#index])
                .map_err(|err| err.at_argument(#index))?;
        }
    });

    let call = if method.returns_value {
        quote! {
            let result = self.#ident(#(#bindings),*);
            ::core::result::Result::Ok(::nativebind::__private::ToVariant::to_variant(&result))
        }
    } else {
        quote! {
            self.#ident(#(#bindings),*);
            ::core::result::Result::Ok(::nativebind::__private::Variant::Nil)
        }
    };

    quote! {
        #virtual_name => {
            if args.len() != #arity {
                return ::core::result::Result::Err(::nativebind::BridgeError::ArityMismatch {
                    target: ::std::format!("{}::{}", <Self as ::nativebind::ScriptClass>::NAME, method),
                    expected: #arity,
                    got: args.len(),
                });
            }
            #(#unboxes)*
            #call
        }
    }
}

fn is_unit(ty: &Type) -> bool {
    matches!(ty, Type::Tuple(tuple) if tuple.elems.is_empty())
}

fn type_name(ty: &Type) -> syn::Result<String> {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string())
            .ok_or_else(|| syn::Error::new_spanned(ty, "expected a named type")),
        _ => Err(syn::Error::new_spanned(
            ty,
            "#[script_class] needs a named type, or pass `name = \"...\"`",
        )),
    }
}
