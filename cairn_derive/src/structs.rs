//! Codegen for `#[derive(Archive)]` on a struct with named fields.
//!
//! Grounded on the teacher's `archive/struct.rs`, stripped to the
//! subset `cairn` needs: no remote wrapping, no niching, no derived
//! `PartialEq`/`PartialOrd`. Each field is projected to its own
//! [`cairn::place::Place`] via `field_unchecked` (mirroring
//! `generate_resolve_statements`) so a struct with more than one
//! pointer-bearing field resolves every field at its true offset.

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{DataStruct, DeriveInput, Field, Fields};

use crate::pointer::is_pointer_type;

pub fn expand(input: &DeriveInput, data: &DataStruct) -> syn::Result<TokenStream> {
    let name = &input.ident;

    let fields: Vec<&Field> = match &data.fields {
        Fields::Named(named) => named.named.iter().collect(),
        Fields::Unit => Vec::new(),
        Fields::Unnamed(_) => {
            return Err(syn::Error::new_spanned(
                &data.fields,
                "#[derive(Archive)] only supports structs with named fields (or no fields)",
            ))
        }
    };

    let field_idents: Vec<_> = fields.iter().map(|f| f.ident.clone().unwrap()).collect();
    let field_tys: Vec<_> = fields.iter().map(|f| f.ty.clone()).collect();
    let is_pointer_flags: Vec<_> = field_tys.iter().map(|ty| is_pointer_type(ty)).collect();

    let archived_name = format_ident!("Archived{}", name);
    let resolver_name = format_ident!("{}Resolver", name);

    let struct_generics = input.generics.clone();
    let (struct_impl_generics, ty_generics, struct_where) = struct_generics.split_for_impl();

    let mut serialize_generics = struct_generics.clone();
    serialize_generics
        .params
        .push(syn::parse_quote!(__CairnS));
    let (serialize_impl_generics, _, _) = serialize_generics.split_for_impl();

    let mut deserialize_generics = struct_generics.clone();
    deserialize_generics
        .params
        .push(syn::parse_quote!(__CairnD));
    let (deserialize_impl_generics, _, _) = deserialize_generics.split_for_impl();

    let archived_fields = field_idents.iter().zip(&field_tys).map(|(ident, ty)| {
        quote! { #ident: <#ty as ::cairn::traits::Archive>::Archived }
    });

    let resolver_fields = field_idents.iter().zip(&field_tys).map(|(ident, ty)| {
        quote! { #ident: <#ty as ::cairn::traits::Archive>::Resolver }
    });

    let resolve_stmts = field_idents.iter().zip(&field_tys).map(|(ident, ty)| {
        quote! {
            let field_place = unsafe {
                out.field_unchecked(core::ptr::addr_of_mut!((*out_ptr).#ident))
            };
            <#ty as ::cairn::traits::Archive>::resolve(&self.#ident, resolver.#ident, field_place);
        }
    });

    let serialize_bounds = field_tys
        .iter()
        .map(|ty| quote! { #ty: ::cairn::traits::Serialize<__CairnS>, });

    let serialize_stmts = field_idents.iter().zip(&field_tys).map(|(ident, ty)| {
        quote! {
            #ident: <#ty as ::cairn::traits::Serialize<__CairnS>>::serialize(
                &self.#ident,
                serializer,
            )?,
        }
    });

    let deserialize_bounds = field_tys.iter().map(|ty| {
        quote! {
            <#ty as ::cairn::traits::Archive>::Archived:
                ::cairn::traits::Deserialize<#ty, __CairnD>,
        }
    });

    let deserialize_stmts = field_idents.iter().zip(&field_tys).map(|(ident, ty)| {
        quote! {
            #ident: <
                <#ty as ::cairn::traits::Archive>::Archived
                as ::cairn::traits::Deserialize<#ty, __CairnD>
            >::deserialize(&self.#ident, deserializer)?,
        }
    });

    let field_descriptors = field_idents.iter().zip(&field_tys).zip(&is_pointer_flags).map(
        |((ident, ty), is_pointer)| {
            quote! {
                ::cairn::field_walk::FieldDescriptor {
                    name: stringify!(#ident),
                    offset: core::mem::offset_of!(#archived_name #ty_generics, #ident),
                    size: core::mem::size_of::<<#ty as ::cairn::traits::Archive>::Archived>(),
                    is_pointer: #is_pointer,
                },
            }
        },
    );

    let verify_bounds = field_tys
        .iter()
        .map(|ty| quote! { <#ty as ::cairn::traits::Archive>::Archived: ::cairn::de::Verify, });

    let verify_stmts = field_idents.iter().map(|ident| {
        quote! {
            ::cairn::de::Verify::verify(&self.#ident, verifier)?;
        }
    });

    let fold_stmts = field_tys.iter().map(|ty| {
        quote! {
            let h = <#ty as ::cairn::fingerprint::Fingerprinted>::fold(h, seen);
        }
    });

    let struct_name_str = name.to_string();

    let expanded = quote! {
        #[repr(C)]
        #[allow(missing_docs)]
        pub struct #archived_name #ty_generics #struct_where {
            #(#archived_fields,)*
        }

        // SAFETY: every field's archived type is itself `Portable` (a
        // supertrait bound of `Archive::Archived`), and this struct adds
        // no fields of its own, so any byte pattern valid for each field
        // independently is valid for the whole struct.
        unsafe impl #struct_impl_generics ::cairn::traits::Portable
            for #archived_name #ty_generics #struct_where {}

        #[allow(missing_docs)]
        pub struct #resolver_name #ty_generics #struct_where {
            #(#resolver_fields,)*
        }

        impl #struct_impl_generics ::cairn::traits::Archive for #name #ty_generics #struct_where {
            type Archived = #archived_name #ty_generics;
            type Resolver = #resolver_name #ty_generics;

            fn resolve(
                &self,
                resolver: Self::Resolver,
                out: ::cairn::place::Place<Self::Archived>,
            ) {
                let out_ptr = out.ptr();
                #(#resolve_stmts)*
            }
        }

        impl #serialize_impl_generics ::cairn::traits::Serialize<__CairnS> for #name #ty_generics
        where
            __CairnS: ::cairn::__reexport::rancor::Fallible + ::cairn::ser::RawSink + ?Sized,
            #(#serialize_bounds)*
        {
            fn serialize(
                &self,
                serializer: &mut __CairnS,
            ) -> Result<Self::Resolver, __CairnS::Error> {
                Ok(#resolver_name {
                    #(#serialize_stmts)*
                })
            }
        }

        impl #deserialize_impl_generics
            ::cairn::traits::Deserialize<#name #ty_generics, __CairnD>
            for #archived_name #ty_generics
        where
            __CairnD: ::cairn::__reexport::rancor::Fallible + ?Sized,
            #(#deserialize_bounds)*
        {
            fn deserialize(
                &self,
                deserializer: &mut __CairnD,
            ) -> Result<#name #ty_generics, __CairnD::Error> {
                Ok(#name {
                    #(#deserialize_stmts)*
                })
            }
        }

        impl #struct_impl_generics ::cairn::field_walk::FieldWalk
            for #archived_name #ty_generics #struct_where
        {
            const FIELDS: &'static [::cairn::field_walk::FieldDescriptor] = &[
                #(#field_descriptors)*
            ];
        }

        impl #struct_impl_generics ::cairn::de::Verify for #archived_name #ty_generics
        where
            #(#verify_bounds)*
        {
            fn verify(
                &self,
                verifier: &mut ::cairn::de::Verifier,
            ) -> Result<(), ::cairn::error::Error> {
                #(#verify_stmts)*
                Ok(())
            }
        }

        impl #struct_impl_generics ::cairn::fingerprint::Fingerprinted for #name #ty_generics #struct_where {
            fn type_key() -> u64 {
                ::cairn::checksum::fnv1a(
                    ::cairn::checksum::FNV_OFFSET_BASIS_U64,
                    concat!(module_path!(), "::", #struct_name_str).as_bytes(),
                )
            }

            fn shape() -> ::cairn::fingerprint::Shape {
                ::cairn::fingerprint::Shape::Struct(#struct_name_str)
            }

            fn fold(hash: u64, seen: &mut ::cairn::fingerprint::BTreeSet<u64>) -> u64 {
                let key = <Self as ::cairn::fingerprint::Fingerprinted>::type_key();
                if !seen.insert(key) {
                    return ::cairn::checksum::fnv1a(hash, &key.to_le_bytes());
                }
                let h = ::cairn::checksum::fnv1a(
                    ::cairn::checksum::fnv1a(hash, b"struct"),
                    #struct_name_str.as_bytes(),
                );
                #(#fold_stmts)*
                h
            }
        }
    };

    Ok(expanded)
}
