//! Implementation of the `#[derive(Enum)]` macro.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, parse_macro_input};

pub fn derive_enum_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_enum_inner(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_enum_inner(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(&input.generics, "bound enums cannot be generic"));
    }
    let variants = unit_variants(input)?;
    if variants.is_empty() {
        return Err(syn::Error::new_spanned(name, "bound enums need at least one variant"));
    }

    Ok(quote! {
        impl ::stackglue::BoundEnum for #name {
            fn to_integral(&self) -> i64 {
                match self {
                    #( Self::#variants => Self::#variants as i64, )*
                }
            }

            fn from_integral(value: i64) -> ::core::option::Option<Self> {
                #(
                    if value == Self::#variants as i64 {
                        return ::core::option::Option::Some(Self::#variants);
                    }
                )*
                ::core::option::Option::None
            }
        }

        impl ::stackglue::FromStack for #name {
            type Context = ::stackglue::EnumTarget;
            const CATEGORY: ::stackglue::ValueCategory = ::stackglue::ValueCategory::Enum;

            fn context(
                catalog: &::stackglue::TypeCatalog,
            ) -> ::core::result::Result<Self::Context, ::stackglue::BindError> {
                catalog.enum_target::<Self>()
            }

            fn extract(
                cx: &Self::Context,
                vm: &::stackglue::vm::Vm,
                value: &::stackglue::vm::Value,
            ) -> ::core::result::Result<Self, ::stackglue::ConversionError> {
                cx.decode::<Self>(vm, value)
            }
        }

        impl ::stackglue::IntoStack for #name {
            type Context = ::stackglue::EnumTarget;
            const CATEGORY: ::stackglue::ValueCategory = ::stackglue::ValueCategory::Enum;

            fn context(
                export: &::stackglue::ExportContext<'_>,
            ) -> ::core::result::Result<Self::Context, ::stackglue::BindError> {
                export.catalog().enum_target::<Self>()
            }

            fn push(
                self,
                cx: &Self::Context,
                vm: &mut ::stackglue::vm::Vm,
            ) -> ::core::result::Result<usize, ::stackglue::CallError> {
                ::core::result::Result::Ok(cx.encode(vm, &self))
            }
        }
    })
}

/// Variant names of a fieldless enum.
fn unit_variants(input: &DeriveInput) -> syn::Result<Vec<&Ident>> {
    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "#[derive(Enum)] can only be used on enums",
        ));
    };

    data.variants
        .iter()
        .map(|variant| match variant.fields {
            Fields::Unit => Ok(&variant.ident),
            _ => Err(syn::Error::new_spanned(
                variant,
                "bound enum variants cannot have fields",
            )),
        })
        .collect()
}
