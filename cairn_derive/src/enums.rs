//! Codegen for `#[derive(Archive)]` on an enum.
//!
//! Generalizes the `ArchivedOption`/`SomeShape` technique in
//! `cairn::impls` from one payload-carrying variant to any number:
//! the archived enum is an ordinary `#[repr(C, u8)]` Rust enum (whose
//! layout the reference is guaranteed to place the discriminant first,
//! followed by that variant's fields as if in a `repr(C)` struct), and
//! each data-carrying variant gets a parallel shadow struct
//! (`tag: u8` followed by the same fields) so [`Archive::resolve`] can
//! project each field to its true offset through `cast_unchecked` +
//! `field_unchecked` rather than constructing the variant by value
//! (impossible in general once a field's archived form holds a
//! self-relative pointer whose target position isn't known until the
//! surrounding place's position is).
//!
//! Reading an already-resolved archived enum needs none of this --
//! ordinary `match self { ... }` works, since the shadow structs exist
//! only to give the *writer* field-level places.

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{DataEnum, DeriveInput, Fields};

pub fn expand(input: &DeriveInput, data: &DataEnum) -> syn::Result<TokenStream> {
    let name = &input.ident;
    let generics = input.generics.clone();
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let archived_name = format_ident!("Archived{}", name);
    let resolver_name = format_ident!("{}Resolver", name);

    struct VariantInfo<'a> {
        ident: &'a syn::Ident,
        field_idents: Vec<syn::Ident>,
        field_tys: Vec<syn::Type>,
        shadow_name: syn::Ident,
    }

    let mut variants = Vec::new();
    for variant in &data.variants {
        let field_idents: Vec<syn::Ident> = match &variant.fields {
            Fields::Named(named) => named.named.iter().map(|f| f.ident.clone().unwrap()).collect(),
            Fields::Unit => Vec::new(),
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    variant,
                    "#[derive(Archive)] only supports enum variants with named fields (or no fields)",
                ))
            }
        };
        let field_tys: Vec<syn::Type> = match &variant.fields {
            Fields::Named(named) => named.named.iter().map(|f| f.ty.clone()).collect(),
            Fields::Unit => Vec::new(),
            Fields::Unnamed(_) => unreachable!(),
        };
        let shadow_name = format_ident!("{}{}Shape", archived_name, variant.ident);
        variants.push(VariantInfo {
            ident: &variant.ident,
            field_idents,
            field_tys,
            shadow_name,
        });
    }

    let archived_variants = variants.iter().map(|v| {
        let ident = v.ident;
        if v.field_idents.is_empty() {
            quote! { #ident }
        } else {
            let fields = v.field_idents.iter().zip(&v.field_tys).map(|(fi, ty)| {
                quote! { #fi: <#ty as ::cairn::traits::Archive>::Archived }
            });
            quote! { #ident { #(#fields,)* } }
        }
    });

    let resolver_variants = variants.iter().map(|v| {
        let ident = v.ident;
        if v.field_idents.is_empty() {
            quote! { #ident }
        } else {
            let fields = v.field_idents.iter().zip(&v.field_tys).map(|(fi, ty)| {
                quote! { #fi: <#ty as ::cairn::traits::Archive>::Resolver }
            });
            quote! { #ident { #(#fields,)* } }
        }
    });

    let shadow_structs = variants.iter().filter(|v| !v.field_idents.is_empty()).map(|v| {
        let shadow_name = &v.shadow_name;
        let fields = v.field_idents.iter().zip(&v.field_tys).map(|(fi, ty)| {
            quote! { #fi: <#ty as ::cairn::traits::Archive>::Archived }
        });
        quote! {
            #[repr(C)]
            struct #shadow_name {
                tag: u8,
                #(#fields,)*
            }
        }
    });

    let resolve_match_arms = variants.iter().enumerate().map(|(idx, v)| {
        let ident = v.ident;
        let tag = idx as u8;
        if v.field_idents.is_empty() {
            quote! {
                (#name::#ident, #resolver_name::#ident) => unsafe {
                    out.write_unchecked(#archived_name::#ident);
                },
            }
        } else {
            let shadow_name = &v.shadow_name;
            let pat_fields = &v.field_idents;
            let resolver_bind: Vec<syn::Ident> = v
                .field_idents
                .iter()
                .map(|fi| format_ident!("__resolver_{}", fi))
                .collect();
            let project_stmts = v.field_idents.iter().zip(&v.field_tys).zip(&resolver_bind).map(
                |((fi, ty), rb)| {
                    quote! {
                        let field_place = unsafe {
                            shape.field_unchecked(core::ptr::addr_of_mut!((*shape_ptr).#fi))
                        };
                        <#ty as ::cairn::traits::Archive>::resolve(#fi, #rb, field_place);
                    }
                },
            );
            quote! {
                (
                    #name::#ident { #(#pat_fields),* },
                    #resolver_name::#ident { #(#pat_fields: #resolver_bind),* },
                ) => {
                    // SAFETY: `#archived_name` is `#[repr(C, u8)]`, so the
                    // `#tag`-th variant's layout is the discriminant
                    // followed by its fields exactly as `#shadow_name`
                    // declares them.
                    let shape = unsafe { out.cast_unchecked::<#shadow_name>() };
                    let shape_ptr = shape.ptr();
                    unsafe {
                        core::ptr::addr_of_mut!((*shape_ptr).tag).write(#tag);
                    }
                    #(#project_stmts)*
                },
            }
        }
    });

    let unreachable_arm = quote! {
        _ => unreachable!("resolver variant did not match value variant"),
    };

    let serialize_arms = variants.iter().map(|v| {
        let ident = v.ident;
        if v.field_idents.is_empty() {
            quote! {
                #name::#ident => #resolver_name::#ident,
            }
        } else {
            let fields = &v.field_idents;
            let ser_fields = v.field_idents.iter().zip(&v.field_tys).map(|(fi, ty)| {
                quote! {
                    #fi: <#ty as ::cairn::traits::Serialize<__CairnS>>::serialize(#fi, serializer)?,
                }
            });
            quote! {
                #name::#ident { #(#fields),* } => #resolver_name::#ident {
                    #(#ser_fields)*
                },
            }
        }
    });

    let deserialize_arms = variants.iter().map(|v| {
        let ident = v.ident;
        if v.field_idents.is_empty() {
            quote! {
                #archived_name::#ident => #name::#ident,
            }
        } else {
            let fields = &v.field_idents;
            let de_fields = v.field_idents.iter().zip(&v.field_tys).map(|(fi, ty)| {
                quote! {
                    #fi: <
                        <#ty as ::cairn::traits::Archive>::Archived
                        as ::cairn::traits::Deserialize<#ty, __CairnD>
                    >::deserialize(#fi, deserializer)?,
                }
            });
            quote! {
                #archived_name::#ident { #(#fields),* } => #name::#ident {
                    #(#de_fields)*
                },
            }
        }
    });

    let verify_arms = variants.iter().map(|v| {
        let ident = v.ident;
        if v.field_idents.is_empty() {
            quote! {
                #archived_name::#ident => Ok(()),
            }
        } else {
            let fields = &v.field_idents;
            quote! {
                #archived_name::#ident { #(#fields),* } => {
                    #(::cairn::de::Verify::verify(#fields, verifier)?;)*
                    Ok(())
                },
            }
        }
    });

    let verify_bounds = variants.iter().flat_map(|v| &v.field_tys).map(|ty| {
        quote! { <#ty as ::cairn::traits::Archive>::Archived: ::cairn::de::Verify, }
    });

    let serialize_bounds = variants.iter().flat_map(|v| &v.field_tys).map(|ty| {
        quote! { #ty: ::cairn::traits::Serialize<__CairnS>, }
    });
    let deserialize_bounds = variants.iter().flat_map(|v| &v.field_tys).map(|ty| {
        quote! {
            <#ty as ::cairn::traits::Archive>::Archived:
                ::cairn::traits::Deserialize<#ty, __CairnD>,
        }
    });

    let mut serialize_generics = generics.clone();
    serialize_generics
        .params
        .push(syn::parse_quote!(__CairnS));
    let (serialize_impl_generics, _, _) = serialize_generics.split_for_impl();

    let mut deserialize_generics = generics.clone();
    deserialize_generics
        .params
        .push(syn::parse_quote!(__CairnD));
    let (deserialize_impl_generics, _, _) = deserialize_generics.split_for_impl();

    let fold_stmts = variants.iter().flat_map(|v| &v.field_tys).map(|ty| {
        quote! {
            let h = <#ty as ::cairn::fingerprint::Fingerprinted>::fold(h, seen);
        }
    });

    let enum_name_str = name.to_string();

    let expanded = quote! {
        #[repr(C, u8)]
        #[allow(missing_docs)]
        pub enum #archived_name #ty_generics #where_clause {
            #(#archived_variants,)*
        }

        // SAFETY: every variant's fields are themselves `Portable`, and
        // `repr(C, u8)` gives the enum a well-defined tag-then-fields
        // layout with no niche-packed bit patterns this crate relies on
        // being invalid.
        unsafe impl #impl_generics ::cairn::traits::Portable
            for #archived_name #ty_generics #where_clause {}

        #(#shadow_structs)*

        #[allow(missing_docs)]
        pub enum #resolver_name #ty_generics #where_clause {
            #(#resolver_variants,)*
        }

        impl #impl_generics ::cairn::traits::Archive for #name #ty_generics #where_clause {
            type Archived = #archived_name #ty_generics;
            type Resolver = #resolver_name #ty_generics;

            #[allow(unreachable_patterns)]
            fn resolve(
                &self,
                resolver: Self::Resolver,
                out: ::cairn::place::Place<Self::Archived>,
            ) {
                match (self, resolver) {
                    #(#resolve_match_arms)*
                    #unreachable_arm
                }
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
                Ok(match self {
                    #(#serialize_arms)*
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
                Ok(match self {
                    #(#deserialize_arms)*
                })
            }
        }

        impl #impl_generics ::cairn::de::Verify for #archived_name #ty_generics
        where
            #(#verify_bounds)*
        {
            fn verify(
                &self,
                verifier: &mut ::cairn::de::Verifier,
            ) -> Result<(), ::cairn::error::Error> {
                match self {
                    #(#verify_arms)*
                }
            }
        }

        impl #impl_generics ::cairn::fingerprint::Fingerprinted for #name #ty_generics #where_clause {
            fn type_key() -> u64 {
                ::cairn::checksum::fnv1a(
                    ::cairn::checksum::FNV_OFFSET_BASIS_U64,
                    concat!(module_path!(), "::", #enum_name_str).as_bytes(),
                )
            }

            fn shape() -> ::cairn::fingerprint::Shape {
                ::cairn::fingerprint::Shape::Enum(#enum_name_str)
            }

            fn fold(hash: u64, seen: &mut ::cairn::fingerprint::BTreeSet<u64>) -> u64 {
                let key = <Self as ::cairn::fingerprint::Fingerprinted>::type_key();
                if !seen.insert(key) {
                    return ::cairn::checksum::fnv1a(hash, &key.to_le_bytes());
                }
                let h = ::cairn::checksum::fnv1a(
                    ::cairn::checksum::fnv1a(hash, b"enum"),
                    #enum_name_str.as_bytes(),
                );
                #(#fold_stmts)*
                h
            }
        }
    };

    Ok(expanded)
}
