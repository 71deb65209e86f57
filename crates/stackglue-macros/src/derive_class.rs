//! Implementation of the `#[derive(Class)]` macro.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, parse_macro_input, parse_quote};

pub fn derive_class_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_class_inner(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_class_inner(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    if let Data::Union(data) = &input.data {
        return Err(syn::Error::new_spanned(
            data.union_token,
            "#[derive(Class)] cannot be used on unions",
        ));
    }

    // Instances are stored as `Box<dyn Any>`.
    let mut generics = input.generics.clone();
    generics.make_where_clause().predicates.push(parse_quote!(Self: 'static));
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::stackglue::IntoStack for #name #ty_generics #where_clause {
            type Context = ::stackglue::ClassReturn;
            const CATEGORY: ::stackglue::ValueCategory = ::stackglue::ValueCategory::Class;

            fn context(
                export: &::stackglue::ExportContext<'_>,
            ) -> ::core::result::Result<Self::Context, ::stackglue::BindError> {
                export.class_return::<Self>()
            }

            fn push(
                self,
                cx: &Self::Context,
                vm: &mut ::stackglue::vm::Vm,
            ) -> ::core::result::Result<usize, ::stackglue::CallError> {
                ::core::result::Result::Ok(cx.push_owned(vm, self))
            }

            fn anchor(cx: &Self::Context) -> ::core::option::Option<::stackglue::vm::Value> {
                ::core::option::Option::Some(::stackglue::vm::Value::Table(cx.metatable()))
            }
        }
    })
}
