use crate::entry::Entry;
use proc_macro2::{Ident, TokenStream};
use syn::{Data, DeriveInput, Fields};

#[derive(Debug, Clone)]
pub struct Mapping(pub Vec<Entry>);

impl Mapping {
    pub fn new(ast: &DeriveInput) -> Self {
        let data_struct = match ast.data.clone() {
            Data::Struct(data_struct) => data_struct,
            _ => panic!("Trait can be implemented only for a struct."),
        };

        let named_fields = match data_struct.fields {
            Fields::Named(fields_named) => fields_named.named,
            _ => panic!("Trait can be implemented only for a struct with named fields."),
        };

        // Declaration order is the reading set order.
        Self(named_fields.into_iter().map(From::from).collect::<Vec<_>>())
    }

    pub fn field_name_vec(&self) -> Vec<Ident> {
        self.0
            .iter()
            .map(|x| x.field_name_ident())
            .collect::<Vec<_>>()
    }

    pub fn name_vec(&self) -> Vec<String> {
        self.0.iter().map(|x| x.name.clone()).collect::<Vec<_>>()
    }

    pub fn unit_vec(&self) -> Vec<String> {
        self.0.iter().map(|x| x.unit.clone()).collect::<Vec<_>>()
    }

    pub fn decimals_vec(&self) -> Vec<TokenStream> {
        self.0
            .iter()
            .map(|x| x.decimals_tokens())
            .collect::<Vec<_>>()
    }

    pub fn round_vec(&self) -> Vec<TokenStream> {
        self.0.iter().filter_map(|x| x.round_tokens()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_keeps_declaration_order() {
        let ast: DeriveInput = syn::parse_quote! {
            struct Meter {
                #[reading(unit = "V", decimals = 1)]
                voltage: f64,
                #[reading(name = "pow_factor", decimals = 1)]
                power_factor: f64,
                alarm: bool,
            }
        };

        let mapping = Mapping::new(&ast);

        assert_eq!(
            mapping.name_vec(),
            vec!["voltage".to_string(), "pow_factor".into(), "alarm".into()]
        );
        assert_eq!(
            mapping.unit_vec(),
            vec!["V".to_string(), String::new(), String::new()]
        );
        let decimals = mapping.0.iter().map(|e| e.decimals).collect::<Vec<_>>();
        assert_eq!(decimals, vec![Some(1), Some(1), None]);
        assert_eq!(mapping.0[1].field_name, "power_factor");
        assert_eq!(mapping.round_vec().len(), 2);
    }

    #[test]
    fn test_entry_doc() {
        let ast: DeriveInput = syn::parse_quote! {
            struct Meter {
                #[reading(unit = "A", decimals = 3)]
                current: f64,
                energy: f64,
            }
        };

        let mapping = Mapping::new(&ast);

        assert_eq!(
            mapping.0[0].doc(),
            "Reading `current`, unit - `A`, rounded to 3 decimals."
        );
        assert_eq!(mapping.0[1].doc(), "Reading `energy`.");
    }
}
