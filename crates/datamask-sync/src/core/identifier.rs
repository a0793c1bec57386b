//! Identifier validation and quoting.
//!
//! Table and column names come from configuration and cannot be bound as
//! statement parameters, so every name is validated and quoted here before it
//! is interpolated into SQL.

use crate::error::{Result, SyncError};

/// PostgreSQL truncates identifiers beyond 63 bytes.
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes, and
/// identifiers exceeding the PostgreSQL length limit.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SyncError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(SyncError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(SyncError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// ```ignore
/// assert_eq!(quote_pg("users")?, "\"users\"");
/// assert_eq!(quote_pg("table\"name")?, "\"table\"\"name\"");
/// ```
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Split a configured table name into `(schema, table)`.
///
/// `"sales.orders"` becomes `("sales", "orders")`; an unqualified name is
/// placed in `public`.
pub fn split_table_name(name: &str) -> (&str, &str) {
    match name.split_once('.') {
        Some((schema, table)) if !schema.is_empty() && !table.is_empty() => (schema, table),
        _ => ("public", name),
    }
}

/// Quote a configured table name, honoring an optional schema prefix.
pub fn qualify_table(name: &str) -> Result<String> {
    let (schema, table) = split_table_name(name);
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Quote a string as a SQL literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_rejects_empty() {
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let err = validate_identifier("users\0; DROP TABLE x").unwrap_err();
        assert!(err.to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_length_limit() {
        assert!(validate_identifier(&"a".repeat(63)).is_ok());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_quote_pg_escapes_double_quote() {
        assert_eq!(quote_pg("clientes").unwrap(), "\"clientes\"");
        assert_eq!(quote_pg("a\"b").unwrap(), "\"a\"\"b\"");
    }

    #[test]
    fn test_quote_pg_sql_injection_safely_quoted() {
        let quoted = quote_pg("x\"; DROP TABLE clientes; --").unwrap();
        assert_eq!(quoted, "\"x\"\"; DROP TABLE clientes; --\"");
    }

    #[test]
    fn test_qualify_table() {
        assert_eq!(qualify_table("clientes").unwrap(), "\"public\".\"clientes\"");
        assert_eq!(qualify_table("sales.orders").unwrap(), "\"sales\".\"orders\"");
    }

    #[test]
    fn test_split_table_name_without_schema() {
        assert_eq!(split_table_name("orders"), ("public", "orders"));
        assert_eq!(split_table_name(".orders"), ("public", ".orders"));
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }
}
