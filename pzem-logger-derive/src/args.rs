use syn::{Attribute, LitInt, LitStr};

/// Keys accepted by `#[reading(...)]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadingArgs {
    pub name: Option<String>,
    pub unit: Option<String>,
    pub decimals: Option<u8>,
}

impl ReadingArgs {
    /// Parse `#[reading(name = "..", unit = "..", decimals = N)]` on `field`.
    ///
    /// Unknown keys and literals of the wrong kind abort the expansion.
    pub fn parse(attr: &Attribute, field: &str) -> Self {
        let mut args = Self::default();
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                args.name = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("unit") {
                args.unit = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("decimals") {
                args.decimals = Some(meta.value()?.parse::<LitInt>()?.base10_parse()?);
            } else {
                return Err(meta.error("expected `name`, `unit` or `decimals`"));
            }
            Ok(())
        })
        .unwrap_or_else(|err| panic!("Invalid `reading` attribute on `{field}`: {err}"));
        args
    }

    /// Arguments of the first `reading` attribute among `attrs`, if any.
    pub fn find(attrs: &[Attribute], field: &str) -> Option<Self> {
        attrs
            .iter()
            .find(|attr| attr.path().is_ident("reading"))
            .map(|attr| Self::parse(attr, field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(attr: Attribute) -> ReadingArgs {
        ReadingArgs::parse(&attr, "field")
    }

    #[test]
    fn test_parse_all_keys() {
        let parsed = args(syn::parse_quote!(#[reading(name = "pow_factor", unit = "W", decimals = 2)]));
        assert_eq!(
            parsed,
            ReadingArgs {
                name: Some("pow_factor".to_string()),
                unit: Some("W".to_string()),
                decimals: Some(2),
            }
        );
    }

    #[test]
    fn test_missing_keys_stay_unset() {
        assert_eq!(args(syn::parse_quote!(#[reading(unit = "Hz")])).decimals, None);
    }

    #[test]
    #[should_panic(expected = "expected `name`, `unit` or `decimals`")]
    fn test_unknown_key_is_rejected() {
        args(syn::parse_quote!(#[reading(scale = 10)]));
    }

    #[test]
    #[should_panic(expected = "Invalid `reading` attribute on `field`")]
    fn test_decimals_must_be_integer() {
        args(syn::parse_quote!(#[reading(decimals = "one")]));
    }
}
