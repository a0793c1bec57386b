//! SQL script rendering for backups.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::core::identifier::{qualify_table, quote_literal, quote_pg};
use crate::core::schema::TableSchema;
use crate::core::value::{RowSet, SqlValue};
use crate::error::Result;

/// Builds a restorable script table by table.
#[derive(Debug)]
pub struct ScriptWriter {
    out: String,
}

impl ScriptWriter {
    /// Start a script; everything after the header runs in one transaction.
    pub fn new(created_at: DateTime<Utc>) -> Self {
        let mut out = String::new();
        out.push_str("-- datamask-sync backup\n");
        let _ = writeln!(out, "-- created_at: {}", created_at.to_rfc3339());
        out.push_str("BEGIN;\n");
        Self { out }
    }

    /// Append DDL and one INSERT per row for a table.
    pub fn add_table(&mut self, schema: &TableSchema, rows: &RowSet) -> Result<()> {
        let qualified = qualify_table(&schema.full_name())?;
        let _ = writeln!(self.out, "\n-- Table: {} ({} rows)", schema.full_name(), rows.len());
        self.out.push_str(&create_table_sql(schema)?);

        if rows.is_empty() {
            return Ok(());
        }
        let columns = rows
            .columns
            .iter()
            .map(|c| quote_pg(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        for row in &rows.rows {
            let values: Vec<String> = row.iter().map(sql_literal).collect();
            let _ = writeln!(
                self.out,
                "INSERT INTO {} ({}) VALUES ({});",
                qualified,
                columns,
                values.join(", ")
            );
        }
        Ok(())
    }

    /// Close the transaction and return the script.
    pub fn finish(mut self) -> String {
        self.out.push_str("\nCOMMIT;\n");
        self.out
    }
}

/// `CREATE TABLE IF NOT EXISTS` for a table's columns and primary key.
pub fn create_table_sql(schema: &TableSchema) -> Result<String> {
    let mut defs = Vec::with_capacity(schema.columns.len() + 1);
    for col in &schema.columns {
        let null = if col.is_nullable { "" } else { " NOT NULL" };
        defs.push(format!("    {} {}{}", quote_pg(&col.name)?, col.data_type, null));
    }
    if schema.has_pk() {
        let pk = schema
            .primary_key
            .iter()
            .map(|c| quote_pg(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        defs.push(format!("    PRIMARY KEY ({})", pk));
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);\n",
        qualify_table(&schema.full_name())?,
        defs.join(",\n")
    ))
}

/// Render a value as a SQL literal.
pub fn sql_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null(_) => "NULL".to_string(),
        SqlValue::Bool(true) => "TRUE".to_string(),
        SqlValue::Bool(false) => "FALSE".to_string(),
        SqlValue::I16(v) => v.to_string(),
        SqlValue::I32(v) => v.to_string(),
        SqlValue::I64(v) => v.to_string(),
        SqlValue::F32(v) if v.is_finite() => v.to_string(),
        SqlValue::F64(v) if v.is_finite() => v.to_string(),
        SqlValue::F32(v) => format!("'{}'", float_special(f64::from(*v))),
        SqlValue::F64(v) => format!("'{}'", float_special(*v)),
        SqlValue::Decimal(v) => v.to_string(),
        SqlValue::Bytes(v) => format!("'\\x{}'::bytea", hex::encode(v)),
        other => quote_literal(&other.to_plain_string().unwrap_or_default()),
    }
}

fn float_special(v: f64) -> &'static str {
    if v.is_nan() {
        "NaN"
    } else if v.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::Column;
    use crate::core::value::SqlNullType;
    use chrono::NaiveDate;

    fn clientes() -> TableSchema {
        TableSchema {
            schema: "public".into(),
            name: "clientes".into(),
            columns: vec![
                Column {
                    name: "id".into(),
                    data_type: "integer".into(),
                    is_nullable: false,
                    ordinal_pos: 1,
                },
                Column {
                    name: "nombre".into(),
                    data_type: "character varying(100)".into(),
                    is_nullable: true,
                    ordinal_pos: 2,
                },
            ],
            primary_key: vec!["id".into()],
        }
    }

    #[test]
    fn test_literals() {
        assert_eq!(sql_literal(&SqlValue::Null(SqlNullType::I32)), "NULL");
        assert_eq!(sql_literal(&SqlValue::Bool(true)), "TRUE");
        assert_eq!(sql_literal(&SqlValue::text("O'Brien")), "'O''Brien'");
        assert_eq!(sql_literal(&SqlValue::Bytes(vec![0xde, 0xad])), "'\\xdead'::bytea");
        assert_eq!(sql_literal(&SqlValue::F64(f64::NAN)), "'NaN'");
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(sql_literal(&SqlValue::DateTime(ts)), "'2024-01-02 03:04:05'");
    }

    #[test]
    fn test_create_table_sql() {
        let ddl = create_table_sql(&clientes()).unwrap();
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"public\".\"clientes\" ("));
        assert!(ddl.contains("\"id\" integer NOT NULL"));
        assert!(ddl.contains("\"nombre\" character varying(100),"));
        assert!(ddl.contains("PRIMARY KEY (\"id\")"));
    }

    #[test]
    fn test_script_is_transactional() {
        let mut writer = ScriptWriter::new(Utc::now());
        let rows = RowSet::new(
            vec!["id".into(), "nombre".into()],
            vec![vec![SqlValue::I32(1), SqlValue::text("Ana")]],
        );
        writer.add_table(&clientes(), &rows).unwrap();
        let script = writer.finish();
        assert!(script.contains("BEGIN;\n"));
        assert!(script.ends_with("COMMIT;\n"));
        assert!(script.contains(
            "INSERT INTO \"public\".\"clientes\" (\"id\", \"nombre\") VALUES (1, 'Ana');"
        ));
    }
}
