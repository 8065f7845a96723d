//! Vendor dialects as a capability interface.
//!
//! Everything vendor-specific the engine needs is behind [`Dialect`]:
//! identifier quoting, generic-to-native type mapping, split predicates for
//! parallel reads, derived connection properties and storage clauses for
//! DDL synthesis. Connectors hold an `Arc<dyn Dialect>` and never branch on
//! a vendor name themselves.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::connection::ConnectionConfig;
use crate::error::{Error, Result};
use crate::schema::{StoreFormat, TableInfo};
use crate::types::GenericType;

/// One share of a parallel read.
///
/// `index` is in `0..total`; the predicate built from a spec must select a
/// disjoint slice per index so `total` readers cover a table exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSpec {
    /// Numeric column the table is split on
    pub column: String,
    /// Total number of parallel readers
    pub total: u32,
    /// This reader's share, zero-based
    pub index: u32,
}

impl SplitSpec {
    /// Create a split spec
    pub fn new(column: impl Into<String>, total: u32, index: u32) -> Self {
        Self {
            column: column.into(),
            total,
            index,
        }
    }
}

/// Vendor-specific behavior the engine delegates instead of subclassing.
pub trait Dialect: Send + Sync {
    /// Dialect name as spelled in configuration
    fn name(&self) -> &'static str;

    /// Quote an identifier, escaping embedded quote characters
    fn quote_identifier(&self, ident: &str) -> String;

    /// Native type name for a generic column type.
    ///
    /// A dialect with no native representation fails here, which surfaces
    /// as a configuration-time error before any data moves.
    fn map_type(&self, ty: GenericType) -> Result<String>;

    /// WHERE predicate selecting one share of a modulo-split parallel read
    fn split_predicate(&self, spec: &SplitSpec) -> String;

    /// Driver properties derived from connection settings.
    ///
    /// The default passes user properties through untouched. Dialects that
    /// derive their own entries must let a user-supplied value for the same
    /// key win.
    fn connection_properties(&self, conn: &ConnectionConfig) -> BTreeMap<String, String> {
        conn.properties.clone()
    }

    /// Trailing DDL clauses after the column list.
    ///
    /// The default supports neither partitioned tables nor non-text storage
    /// formats and rejects both.
    fn storage_clauses(&self, table: &TableInfo) -> Result<Vec<String>> {
        if !table.partition_keys().is_empty() {
            return Err(Error::schema(format!(
                "dialect `{}` does not support partitioned tables",
                self.name()
            )));
        }
        if table.store_format() != StoreFormat::Text {
            return Err(Error::schema(format!(
                "dialect `{}` has no `{}` storage clause",
                self.name(),
                table.store_format()
            )));
        }
        Ok(Vec::new())
    }
}

impl std::fmt::Debug for dyn Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialect").field("name", &self.name()).finish_non_exhaustive()
    }
}

/// Look up a built-in dialect by its configuration name.
pub fn dialect_for(name: &str) -> Result<Arc<dyn Dialect>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "ansi" | "generic" => Ok(Arc::new(AnsiDialect)),
        "oracle" => Ok(Arc::new(OracleDialect)),
        "hive" => Ok(Arc::new(HiveDialect)),
        other => Err(Error::config(format!(
            "unknown dialect `{}` (known: ansi, hive, oracle)",
            other
        ))),
    }
}

/// Plain ANSI SQL, the fallback for stores without a dedicated dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnsiDialect;

impl Dialect for AnsiDialect {
    fn name(&self) -> &'static str {
        "ansi"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn map_type(&self, ty: GenericType) -> Result<String> {
        let native = match ty {
            GenericType::Boolean => "BOOLEAN",
            GenericType::TinyInt | GenericType::SmallInt => "SMALLINT",
            GenericType::Int => "INTEGER",
            GenericType::BigInt => "BIGINT",
            GenericType::Float => "REAL",
            GenericType::Double => "DOUBLE PRECISION",
            GenericType::Decimal => "DECIMAL",
            GenericType::Char => "CHAR",
            GenericType::Varchar | GenericType::String => "VARCHAR",
            GenericType::Binary => "BLOB",
            GenericType::Date => "DATE",
            GenericType::Timestamp => "TIMESTAMP",
        };
        Ok(native.to_string())
    }

    fn split_predicate(&self, spec: &SplitSpec) -> String {
        format!(
            "MOD({}, {}) = {}",
            self.quote_identifier(&spec.column),
            spec.total,
            spec.index
        )
    }
}

/// Oracle.
///
/// Derives the vendor timeout properties from the connect timeout and has
/// no native boolean type, so `boolean` columns are rejected at mapping
/// time.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

impl Dialect for OracleDialect {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn map_type(&self, ty: GenericType) -> Result<String> {
        let native = match ty {
            GenericType::Boolean => {
                return Err(Error::type_mapping(ty.name(), self.name()));
            }
            GenericType::TinyInt => "NUMBER(3)",
            GenericType::SmallInt => "NUMBER(5)",
            GenericType::Int => "NUMBER(10)",
            GenericType::BigInt => "NUMBER(19)",
            GenericType::Float => "BINARY_FLOAT",
            GenericType::Double => "BINARY_DOUBLE",
            GenericType::Decimal => "NUMBER",
            GenericType::Char => "CHAR",
            GenericType::Varchar => "VARCHAR2(4000)",
            GenericType::String => "CLOB",
            GenericType::Binary => "BLOB",
            GenericType::Date => "DATE",
            GenericType::Timestamp => "TIMESTAMP",
        };
        Ok(native.to_string())
    }

    fn split_predicate(&self, spec: &SplitSpec) -> String {
        format!(
            "MOD({}, {}) = {}",
            self.quote_identifier(&spec.column),
            spec.total,
            spec.index
        )
    }

    fn connection_properties(&self, conn: &ConnectionConfig) -> BTreeMap<String, String> {
        let timeout_ms = conn.connect_timeout_secs.saturating_mul(1000).to_string();
        let mut props = BTreeMap::new();
        props.insert("oracle.net.CONNECT_TIMEOUT".to_string(), timeout_ms.clone());
        props.insert("oracle.jdbc.ReadTimeout".to_string(), timeout_ms);
        // User-supplied entries overwrite derived ones.
        for (key, value) in &conn.properties {
            props.insert(key.clone(), value.clone());
        }
        props
    }
}

/// Hive.
///
/// The one built-in dialect with partitioned tables and storage clauses;
/// character types collapse to `STRING`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HiveDialect;

impl Dialect for HiveDialect {
    fn name(&self) -> &'static str {
        "hive"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn map_type(&self, ty: GenericType) -> Result<String> {
        let native = match ty {
            GenericType::Boolean => "BOOLEAN",
            GenericType::TinyInt => "TINYINT",
            GenericType::SmallInt => "SMALLINT",
            GenericType::Int => "INT",
            GenericType::BigInt => "BIGINT",
            GenericType::Float => "FLOAT",
            GenericType::Double => "DOUBLE",
            GenericType::Decimal => "DECIMAL",
            GenericType::Char | GenericType::Varchar | GenericType::String => "STRING",
            GenericType::Binary => "BINARY",
            GenericType::Date => "DATE",
            GenericType::Timestamp => "TIMESTAMP",
        };
        Ok(native.to_string())
    }

    fn split_predicate(&self, spec: &SplitSpec) -> String {
        format!(
            "pmod({}, {}) = {}",
            self.quote_identifier(&spec.column),
            spec.total,
            spec.index
        )
    }

    fn storage_clauses(&self, table: &TableInfo) -> Result<Vec<String>> {
        let mut clauses = Vec::new();
        if !table.partition_keys().is_empty() {
            let keys = table
                .partition_keys()
                .iter()
                .map(|key| format!("{} STRING", self.quote_identifier(key)))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("PARTITIONED BY ({})", keys));
        }
        clauses.push(format!(
            "ROW FORMAT DELIMITED FIELDS TERMINATED BY '{}'",
            delimiter_literal(table.delimiter())
        ));
        clauses.push(format!("STORED AS {}", table.store_format().stored_as()));
        if !table.storage_options().is_empty() {
            let props = table
                .storage_options()
                .iter()
                .map(|(key, value)| format!("'{}'='{}'", key, value))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("TBLPROPERTIES ({})", props));
        }
        Ok(clauses)
    }
}

/// Render a field delimiter as a HiveQL string literal.
///
/// Control characters become octal escapes (the conventional `'\001'`
/// spelling); a quote is backslash-escaped.
fn delimiter_literal(delimiter: char) -> String {
    if delimiter.is_control() {
        format!("\\{:03o}", delimiter as u32)
    } else if delimiter == '\'' {
        "\\'".to_string()
    } else {
        delimiter.to_string()
    }
}
