//! Macros to `derive` the `pzem-logger` reading traits

use proc_macro::TokenStream;
use quote::quote;

mod args;
mod entry;
mod mapping;

/// Derive macro to implement `pzem_logger::reading::Readings`
#[proc_macro_derive(Readings, attributes(reading))]
pub fn derive_readings(input: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(input as syn::DeriveInput);

    let name = &ast.ident;

    let mapping = mapping::Mapping::new(&ast);

    let field_name = mapping.field_name_vec();
    let reading_name = mapping.name_vec();
    let unit = mapping.unit_vec();
    let decimals = mapping.decimals_vec();
    let round = mapping.round_vec();
    let cnt = mapping.0.len();

    let tokens = quote! {
        impl pzem_logger::reading::Readings for #name {
            const FIELDS: &'static [pzem_logger::reading::ReadingField] = &[
                #(
                    pzem_logger::reading::ReadingField {
                        name: #reading_name,
                        unit: #unit,
                        decimals: #decimals,
                    },
                )*
            ];

            fn reading_set(&self) -> pzem_logger::reading::ReadingSet {
                let mut set = pzem_logger::reading::ReadingSet::with_capacity(#cnt);
                #(
                    set.insert(#reading_name, pzem_logger::reading::Value::from(self.#field_name));
                )*
                set
            }

            fn round(&mut self) {
                #(#round)*
            }
        }
    };

    tokens.into()
}

/// Add a doc line to every field from its `reading` attribute.
#[proc_macro_attribute]
pub fn reading_doc(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut ast = syn::parse_macro_input!(item as syn::DeriveInput);
    match &mut ast.data {
        syn::Data::Struct(ref mut struct_data) => {
            match &mut struct_data.fields {
                syn::Fields::Named(fields_named) => {
                    for field in &mut fields_named.named {
                        if field
                            .attrs
                            .iter()
                            .any(|attr| attr.path().is_ident("reading"))
                        {
                            let entry: entry::Entry = field.clone().into();
                            let doc = entry.doc();
                            let doc: syn::Attribute = syn::parse_quote!(#[doc = #doc]);
                            field.attrs.push(doc);
                        }
                    }
                }
                _ => panic!("`reading_doc` has to be applied to structs with named fields"),
            }

            quote! {
                #ast
            }
            .into()
        }
        _ => panic!("`reading_doc` has to be applied with structs"),
    }
}
