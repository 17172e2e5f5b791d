//! Schema/table identifier parsing, validation and quoting.

use super::{DbError, DbResult};
use std::fmt;

/// Schema used when a table name carries no schema part.
pub const DEFAULT_SCHEMA: &str = "public";

/// Check `name` against `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_identifier(name: &str) -> DbResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}

/// Quote an identifier for Postgres: wrap in `"` and double any embedded `"`.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A validated `schema.table` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    schema: String,
    table: String,
}

impl QualifiedName {
    /// Build from already separated parts, validating both.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> DbResult<Self> {
        let schema = schema.into();
        let table = table.into();
        validate_identifier(&schema)?;
        validate_identifier(&table)?;
        Ok(Self { schema, table })
    }

    /// Parse `schema.table` or `table`.
    ///
    /// Splits at the first `.` and strips surrounding `"` from each side.
    /// An unqualified name lands in `default_schema`. An empty schema part
    /// (`.lookup`) is rejected like any other invalid identifier.
    pub fn parse(name: &str, default_schema: &str) -> DbResult<Self> {
        match name.split_once('.') {
            Some((schema, table)) => Self::new(schema.trim_matches('"'), table.trim_matches('"')),
            None => Self::new(default_schema, name.trim_matches('"')),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

/// Renders as `"schema"."table"`, ready for SQL text.
impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.table)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_qualified_name() {
        let q = QualifiedName::parse("stg.lookup", DEFAULT_SCHEMA).unwrap();
        assert_eq!(q.schema(), "stg");
        assert_eq!(q.table(), "lookup");
    }

    #[test]
    fn unqualified_name_uses_default_schema() {
        let q = QualifiedName::parse("lookup", DEFAULT_SCHEMA).unwrap();
        assert_eq!(q.schema(), "public");
        assert_eq!(q.table(), "lookup");

        let q = QualifiedName::parse("lookup", "analytics").unwrap();
        assert_eq!(q.schema(), "analytics");
    }

    #[test]
    fn strips_surrounding_quotes() {
        let q = QualifiedName::parse("\"stg\".\"lookup_assets\"", DEFAULT_SCHEMA).unwrap();
        assert_eq!(q.schema(), "stg");
        assert_eq!(q.table(), "lookup_assets");

        let q = QualifiedName::parse("\"lookup\"", DEFAULT_SCHEMA).unwrap();
        assert_eq!(q.table(), "lookup");
    }

    #[test]
    fn empty_schema_part_is_rejected() {
        assert!(matches!(
            QualifiedName::parse(".lookup", DEFAULT_SCHEMA),
            Err(DbError::InvalidIdentifier(s)) if s.is_empty()
        ));
    }

    #[test]
    fn extra_dots_end_up_in_the_table_and_fail() {
        assert!(QualifiedName::parse("db.stg.lookup", DEFAULT_SCHEMA).is_err());
        assert!(QualifiedName::parse("stg.", DEFAULT_SCHEMA).is_err());
    }

    #[test]
    fn injection_attempts_are_rejected() {
        for name in [
            "lookup; DROP TABLE users",
            "stg.lookup--",
            "look up",
            "my-table",
            "1table",
            "stg.\"x\"\"y\"",
            "tab\u{e9}",
        ] {
            assert!(
                QualifiedName::parse(name, DEFAULT_SCHEMA).is_err(),
                "accepted {name:?}"
            );
        }
    }

    #[test]
    fn display_quotes_both_parts() {
        let q = QualifiedName::new("stg", "lookup").unwrap();
        assert_eq!(q.to_string(), "\"stg\".\"lookup\"");
    }

    #[test]
    fn quote_identifier_doubles_embedded_quotes() {
        assert_eq!(quote_identifier("adj close"), "\"adj close\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    proptest! {
        #[test]
        fn valid_identifiers_accepted(name in "[A-Za-z_][A-Za-z0-9_]{0,40}") {
            prop_assert!(validate_identifier(&name).is_ok());
        }

        #[test]
        fn forbidden_characters_rejected(
            prefix in "[A-Za-z_][A-Za-z0-9_]{0,10}",
            bad in prop::sample::select(vec![' ', '-', ';', '.', '"', '\'', '(']),
            suffix in "[A-Za-z0-9_]{0,10}",
        ) {
            let name = format!("{prefix}{bad}{suffix}");
            prop_assert!(validate_identifier(&name).is_err());
        }

        #[test]
        fn leading_digit_rejected(name in "[0-9][A-Za-z0-9_]{0,20}") {
            prop_assert!(validate_identifier(&name).is_err());
        }
    }
}
