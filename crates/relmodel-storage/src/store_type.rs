//! Parsing of store type names such as `nvarchar(50)` or `DECIMAL(10, 2)`.

use std::sync::OnceLock;

use regex::Regex;

/// A store type name split into its base name and parenthesized facets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreTypeName {
    /// Lower-cased base name without facets (`nvarchar`).
    pub base: String,
    /// Facets inside the parentheses, trimmed (`["10", "2"]`).
    pub facets: Vec<String>,
}

fn store_type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(?P<base>[^(]*?)\s*(?:\((?P<facets>[^)]*)\).*)?$")
            .expect("store type pattern is a valid regex")
    })
}

impl StoreTypeName {
    /// Parse a store type name.
    ///
    /// Anything after the closing parenthesis is ignored.
    pub fn parse(type_name: &str) -> Self {
        let Some(caps) = store_type_pattern().captures(type_name) else {
            return Self {
                base: type_name.trim().to_lowercase(),
                facets: Vec::new(),
            };
        };

        let base = caps
            .name("base")
            .map_or("", |m| m.as_str())
            .to_lowercase();
        let facets = caps
            .name("facets")
            .map(|m| {
                m.as_str()
                    .split(',')
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self { base, facets }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_name() {
        let name = StoreTypeName::parse("INT");
        assert_eq!(name.base, "int");
        assert!(name.facets.is_empty());
    }

    #[test]
    fn test_parse_size_suffix() {
        let name = StoreTypeName::parse("NVarChar(50)");
        assert_eq!(name.base, "nvarchar");
        assert_eq!(name.facets, ["50"]);
    }

    #[test]
    fn test_parse_max() {
        let name = StoreTypeName::parse("varbinary(MAX)");
        assert_eq!(name.base, "varbinary");
        assert_eq!(name.facets, ["MAX"]);
    }

    #[test]
    fn test_parse_precision_scale() {
        let name = StoreTypeName::parse("decimal(10, 2)");
        assert_eq!(name.base, "decimal");
        assert_eq!(name.facets, ["10", "2"]);
    }

    #[test]
    fn test_parse_multi_word_base() {
        let name = StoreTypeName::parse("national character varying(20)");
        assert_eq!(name.base, "national character varying");
        assert_eq!(name.facets, ["20"]);
    }
}
