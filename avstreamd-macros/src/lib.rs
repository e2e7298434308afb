//! Derives used by the avstreamd output writers.

use darling::Error;
use darling::ast::NestedMeta;
use quote::quote;
use syn::{Data, DeriveInput, Fields, ItemStruct, parse_macro_input};

use proc_macro::TokenStream;

/// Serializes every field in declaration order through
/// `crate::byteorder::{WriteBytesBe, WriteBytesLe}`.
#[proc_macro_derive(ToBytes)]
pub fn derive_to_bytes(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let fields: Vec<syn::Member> = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(nf) => nf
                .named
                .iter()
                .filter_map(|f| f.ident.clone())
                .map(syn::Member::Named)
                .collect(),
            Fields::Unnamed(uf) => (0..uf.unnamed.len())
                .map(|i| syn::Index::from(i).into())
                .collect(),
            Fields::Unit => Vec::new(),
        },
        _ => {
            return syn::Error::new_spanned(name, "ToBytes can only be derived for structs")
                .to_compile_error()
                .into();
        }
    };

    let expanded = quote! {
        impl crate::byteorder::WriteBytesBe for #name {
            fn write_be(&self, dst: &mut Vec<u8>) {
                #( crate::byteorder::WriteBytesBe::write_be(&self.#fields, dst); )*
            }
        }

        impl crate::byteorder::WriteBytesLe for #name {
            fn write_le(&self, dst: &mut Vec<u8>) {
                #( crate::byteorder::WriteBytesLe::write_le(&self.#fields, dst); )*
            }
        }
    };

    TokenStream::from(expanded)
}

/// Tags a `ToBytes` struct with the four character code of the CAF chunk
/// it is written as, e.g. `#[caf_chunk_type(b"desc")]`.
#[proc_macro_attribute]
pub fn caf_chunk_type(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = match NestedMeta::parse_meta_list(attr.into()) {
        Ok(v) => v,
        Err(e) => {
            return TokenStream::from(Error::from(e).write_errors());
        }
    };

    let Some(first) = args.first() else {
        return TokenStream::from(
            Error::custom("caf_chunk_type expects a byte string, e.g. b\"desc\"").write_errors(),
        );
    };

    let type_bytes = match first {
        NestedMeta::Lit(syn::Lit::ByteStr(bs)) => bs.value(),
        other => {
            return TokenStream::from(
                syn::Error::new_spanned(other, "caf_chunk_type expects a byte string")
                    .to_compile_error(),
            );
        }
    };

    if type_bytes.len() != 4 {
        return TokenStream::from(
            syn::Error::new_spanned(first, "caf_chunk_type expects 4 bytes").to_compile_error(),
        );
    }

    let input = parse_macro_input!(item as ItemStruct);
    let name = &input.ident;

    let expanded = quote! {
        #input

        impl crate::caf::CafChunk for #name {
            fn chunk_type(&self) -> &[u8; 4] {
                const BYTES: [u8; 4] = [#(#type_bytes),*];
                &BYTES
            }

            fn chunk_data(&self) -> Vec<u8> {
                let mut vec = Vec::new();
                crate::byteorder::WriteBytesBe::write_be(self, &mut vec);
                vec
            }
        }
    };
    TokenStream::from(expanded)
}
