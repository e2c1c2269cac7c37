use crate::args::ReadingArgs;
use proc_macro2::{Ident, Span, TokenStream};
use quote::quote;
use syn::Field;

/// Single entry in a reading set. Parsed from a struct field and its optional `reading` attribute.
#[derive(Debug, Clone)]
pub struct Entry {
    pub field_name: String,
    /// Name of the reading in the set, defaults to the field name.
    pub name: String,
    pub unit: String,
    pub decimals: Option<u8>,
}

impl From<Field> for Entry {
    fn from(value: Field) -> Self {
        let field_name = value
            .ident
            .unwrap_or_else(|| panic!("Unexpected unnamed struct field."))
            .to_string();
        let args = ReadingArgs::find(&value.attrs, &field_name).unwrap_or_default();

        Self {
            name: args.name.unwrap_or_else(|| field_name.clone()),
            unit: args.unit.unwrap_or_default(),
            decimals: args.decimals,
            field_name,
        }
    }
}

impl Entry {
    pub fn field_name_ident(&self) -> Ident {
        Ident::new(&self.field_name, Span::call_site())
    }

    pub fn decimals_tokens(&self) -> TokenStream {
        match self.decimals {
            Some(decimals) => quote! { ::core::option::Option::Some(#decimals) },
            None => quote! { ::core::option::Option::None },
        }
    }

    /// `self.<field> = round_to(self.<field>, decimals);` for fields declaring decimals.
    pub fn round_tokens(&self) -> Option<TokenStream> {
        let decimals = self.decimals?;
        let field = self.field_name_ident();
        Some(quote! {
            self.#field = pzem_logger::codec::round_to(self.#field, #decimals);
        })
    }

    pub fn doc(&self) -> String {
        let mut doc = format!("Reading `{}`", self.name);
        if !self.unit.is_empty() {
            doc.push_str(&format!(", unit - `{}`", self.unit));
        }
        if let Some(decimals) = self.decimals {
            doc.push_str(&format!(", rounded to {decimals} decimals"));
        }
        doc.push('.');
        doc
    }
}
