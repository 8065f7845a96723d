//! Column metadata and table descriptions.
//!
//! [`MetaColumn`] is the configuration-level column spelling, including the
//! `-1` "unspecified" index sentinel; [`resolve_columns`] turns a raw list
//! into one where every index is explicit and unique. [`TableInfo`] is an
//! immutable table description whose `CREATE TABLE` DDL is synthesized once
//! at build time through a [`Dialect`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::types::GenericType;

/// Index value meaning "not specified in configuration"
pub const UNSPECIFIED_INDEX: i32 = -1;

/// Field delimiter used when configuration does not name one.
///
/// The conventional non-printing `\u{0001}` so plain text survives
/// delimited encoding unescaped.
pub const DEFAULT_DELIMITER: char = '\u{0001}';

/// One column as spelled in job configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MetaColumn {
    /// Column name
    pub name: String,
    /// Generic column type
    #[serde(rename = "type")]
    pub column_type: GenericType,
    /// Position in the source row, or [`UNSPECIFIED_INDEX`]
    #[serde(default = "default_index")]
    pub index: i32,
    /// Constant value injected instead of reading from the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

fn default_index() -> i32 {
    UNSPECIFIED_INDEX
}

impl MetaColumn {
    /// Create a column with an unspecified index
    pub fn new(name: impl Into<String>, column_type: GenericType) -> Self {
        Self {
            name: name.into(),
            column_type,
            index: UNSPECIFIED_INDEX,
            value: None,
        }
    }

    /// Set an explicit source index
    pub fn with_index(mut self, index: i32) -> Self {
        self.index = index;
        self
    }

    /// Create a constant column carrying a fixed value
    pub fn constant(
        name: impl Into<String>,
        column_type: GenericType,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            column_type,
            index: UNSPECIFIED_INDEX,
            value: Some(value.into()),
        }
    }

    /// Whether this column carries a constant instead of source data
    pub fn is_constant(&self) -> bool {
        self.value.is_some()
    }
}

/// How [`resolve_columns`] treats the `-1` index sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexPolicy {
    /// Replace `-1` with the column's declaration position
    #[default]
    DeclarationOrder,
    /// Keep `-1` as-is for connectors that interpret it themselves
    PreserveSentinel,
}

/// Validate a column list and make every index explicit.
///
/// Rejects an empty list, indices below `-1`, duplicate names and duplicate
/// resolved indices; errors name the offending columns. Explicit indices
/// are always preserved, so gaps are legal (a writer may project a subset
/// of a wider source row).
pub fn resolve_columns(
    columns: Vec<MetaColumn>,
    policy: IndexPolicy,
) -> Result<Vec<MetaColumn>> {
    if columns.is_empty() {
        return Err(Error::schema("column list is empty"));
    }

    let mut seen_names = HashSet::new();
    let mut resolved = Vec::with_capacity(columns.len());
    for (position, mut column) in columns.into_iter().enumerate() {
        if !seen_names.insert(column.name.clone()) {
            return Err(Error::schema(format!(
                "duplicate column name `{}`",
                column.name
            )));
        }
        if column.index < UNSPECIFIED_INDEX {
            return Err(Error::schema(format!(
                "column `{}` has invalid index {}",
                column.name, column.index
            )));
        }
        if column.index == UNSPECIFIED_INDEX && policy == IndexPolicy::DeclarationOrder {
            column.index = position as i32;
        }
        resolved.push(column);
    }

    let mut seen_indices: HashMap<i32, &str> = HashMap::new();
    for column in &resolved {
        if column.index == UNSPECIFIED_INDEX {
            continue;
        }
        if let Some(first) = seen_indices.insert(column.index, &column.name) {
            return Err(Error::schema(format!(
                "columns `{}` and `{}` share index {}",
                first, column.name, column.index
            )));
        }
    }

    Ok(resolved)
}

/// Physical storage format recorded in table metadata.
///
/// Only `text` affects how the engine encodes rows; the others flow into
/// DDL synthesis for stores that create their own readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StoreFormat {
    /// Delimited text
    #[default]
    Text,
    /// ORC
    Orc,
    /// Parquet
    Parquet,
}

impl StoreFormat {
    /// Canonical lowercase name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Orc => "orc",
            Self::Parquet => "parquet",
        }
    }

    /// Spelling used in a `STORED AS` clause
    pub const fn stored_as(&self) -> &'static str {
        match self {
            Self::Text => "TEXTFILE",
            Self::Orc => "ORC",
            Self::Parquet => "PARQUET",
        }
    }

    /// File extension for data files of this format
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Text => ".txt",
            Self::Orc => ".orc",
            Self::Parquet => ".parquet",
        }
    }
}

impl fmt::Display for StoreFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable description of a target table.
///
/// Built through [`TableInfo::builder`]; construction validates the shape
/// and synthesizes the `CREATE TABLE` statement through the dialect, so an
/// existing `TableInfo` is always internally consistent and its DDL is
/// byte-identical across runs for the same inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    database: String,
    table_name: String,
    columns: Vec<(String, GenericType)>,
    partition_keys: Vec<String>,
    delimiter: char,
    store_format: StoreFormat,
    storage_options: BTreeMap<String, String>,
    create_table_sql: String,
}

impl TableInfo {
    /// Start building a description of `database`.`table_name`
    pub fn builder(
        database: impl Into<String>,
        table_name: impl Into<String>,
    ) -> TableInfoBuilder {
        TableInfoBuilder {
            database: database.into(),
            table_name: table_name.into(),
            columns: Vec::new(),
            partition_keys: Vec::new(),
            delimiter: DEFAULT_DELIMITER,
            store_format: StoreFormat::default(),
            storage_options: BTreeMap::new(),
        }
    }

    /// Database (or schema) name
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Table name
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// `database.table` for diagnostics, unquoted
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.database, self.table_name)
    }

    /// Data columns in declaration order
    pub fn columns(&self) -> &[(String, GenericType)] {
        &self.columns
    }

    /// Number of data columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Partition key names, not part of [`Self::columns`]
    pub fn partition_keys(&self) -> &[String] {
        &self.partition_keys
    }

    /// Field delimiter for text storage
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Physical storage format
    pub fn store_format(&self) -> StoreFormat {
        self.store_format
    }

    /// Extra table properties, sorted by key
    pub fn storage_options(&self) -> &BTreeMap<String, String> {
        &self.storage_options
    }

    /// Synthesized `CREATE TABLE IF NOT EXISTS` statement
    pub fn create_table_sql(&self) -> &str {
        &self.create_table_sql
    }
}

/// Builder for [`TableInfo`].
#[derive(Debug, Clone)]
pub struct TableInfoBuilder {
    database: String,
    table_name: String,
    columns: Vec<(String, GenericType)>,
    partition_keys: Vec<String>,
    delimiter: char,
    store_format: StoreFormat,
    storage_options: BTreeMap<String, String>,
}

impl TableInfoBuilder {
    /// Append a data column
    pub fn column(mut self, name: impl Into<String>, ty: GenericType) -> Self {
        self.columns.push((name.into(), ty));
        self
    }

    /// Append data columns from resolved metadata
    pub fn columns<'a, I>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = &'a MetaColumn>,
    {
        for column in columns {
            self.columns.push((column.name.clone(), column.column_type));
        }
        self
    }

    /// Append a partition key
    pub fn partition_key(mut self, name: impl Into<String>) -> Self {
        self.partition_keys.push(name.into());
        self
    }

    /// Set the field delimiter for text storage
    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the physical storage format
    pub fn store_format(mut self, format: StoreFormat) -> Self {
        self.store_format = format;
        self
    }

    /// Set one extra table property
    pub fn storage_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.storage_options.insert(key.into(), value.into());
        self
    }

    /// Validate the shape and synthesize DDL through `dialect`.
    ///
    /// Fails when the column list is empty, a partition key duplicates a
    /// data column, or the dialect cannot map a column type.
    pub fn build(self, dialect: &dyn Dialect) -> Result<TableInfo> {
        if self.columns.is_empty() {
            return Err(Error::schema(format!(
                "table `{}.{}` has no columns",
                self.database, self.table_name
            )));
        }
        for key in &self.partition_keys {
            if self.columns.iter().any(|(name, _)| name == key) {
                return Err(Error::schema(format!(
                    "partition key `{}` duplicates a data column",
                    key
                )));
            }
        }

        let mut info = TableInfo {
            database: self.database,
            table_name: self.table_name,
            columns: self.columns,
            partition_keys: self.partition_keys,
            delimiter: self.delimiter,
            store_format: self.store_format,
            storage_options: self.storage_options,
            create_table_sql: String::new(),
        };

        let column_list = info
            .columns
            .iter()
            .map(|(name, ty)| {
                Ok(format!(
                    "{} {}",
                    dialect.quote_identifier(name),
                    dialect.map_type(*ty)?
                ))
            })
            .collect::<Result<Vec<_>>>()?
            .join(", ");

        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {}.{} ({})",
            dialect.quote_identifier(&info.database),
            dialect.quote_identifier(&info.table_name),
            column_list
        );
        for clause in dialect.storage_clauses(&info)? {
            sql.push(' ');
            sql.push_str(&clause);
        }
        info.create_table_sql = sql;
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{AnsiDialect, HiveDialect, OracleDialect};

    #[test]
    fn test_meta_column_deserialization() {
        let column: MetaColumn =
            serde_json::from_str(r#"{"name": "id", "type": "bigint"}"#).unwrap();
        assert_eq!(column.name, "id");
        assert_eq!(column.column_type, GenericType::BigInt);
        assert_eq!(column.index, UNSPECIFIED_INDEX);
        assert!(!column.is_constant());
    }

    #[test]
    fn test_resolve_assigns_declaration_order() {
        let resolved = resolve_columns(
            vec![
                MetaColumn::new("a", GenericType::Int),
                MetaColumn::new("b", GenericType::String),
                MetaColumn::new("c", GenericType::Double),
            ],
            IndexPolicy::DeclarationOrder,
        )
        .unwrap();
        for (i, column) in resolved.iter().enumerate() {
            assert_eq!(column.index, i as i32);
        }
    }

    #[test]
    fn test_resolve_keeps_explicit_indices() {
        let resolved = resolve_columns(
            vec![
                MetaColumn::new("a", GenericType::Int).with_index(4),
                MetaColumn::new("b", GenericType::String).with_index(0),
            ],
            IndexPolicy::DeclarationOrder,
        )
        .unwrap();
        assert_eq!(resolved[0].index, 4);
        assert_eq!(resolved[1].index, 0);
    }

    #[test]
    fn test_resolve_preserve_sentinel() {
        let resolved = resolve_columns(
            vec![MetaColumn::new("a", GenericType::Int)],
            IndexPolicy::PreserveSentinel,
        )
        .unwrap();
        assert_eq!(resolved[0].index, UNSPECIFIED_INDEX);
    }

    #[test]
    fn test_resolve_rejects_duplicate_indices() {
        let err = resolve_columns(
            vec![
                MetaColumn::new("a", GenericType::Int),
                MetaColumn::new("b", GenericType::String).with_index(0),
            ],
            IndexPolicy::DeclarationOrder,
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("`a`"), "{}", message);
        assert!(message.contains("`b`"), "{}", message);
        assert!(message.contains("share index 0"), "{}", message);
    }

    #[test]
    fn test_resolve_rejects_bad_input() {
        assert!(resolve_columns(vec![], IndexPolicy::DeclarationOrder).is_err());

        let err = resolve_columns(
            vec![MetaColumn::new("a", GenericType::Int).with_index(-3)],
            IndexPolicy::DeclarationOrder,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid index -3"));

        let err = resolve_columns(
            vec![
                MetaColumn::new("a", GenericType::Int),
                MetaColumn::new("a", GenericType::String),
            ],
            IndexPolicy::DeclarationOrder,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate column name `a`"));
    }

    #[test]
    fn test_constant_column() {
        let column = MetaColumn::constant("pt", GenericType::String, "20240128");
        assert!(column.is_constant());
        assert_eq!(column.value.as_deref(), Some("20240128"));
    }

    #[test]
    fn test_hive_ddl_golden() {
        let table = TableInfo::builder("dw", "orders")
            .column("id", GenericType::BigInt)
            .column("name", GenericType::String)
            .partition_key("pt")
            .build(&HiveDialect)
            .unwrap();
        assert_eq!(
            table.create_table_sql(),
            "CREATE TABLE IF NOT EXISTS `dw`.`orders` (`id` BIGINT, `name` STRING) \
             PARTITIONED BY (`pt` STRING) \
             ROW FORMAT DELIMITED FIELDS TERMINATED BY '\\001' \
             STORED AS TEXTFILE"
        );
    }

    #[test]
    fn test_ddl_is_deterministic() {
        let build = || {
            TableInfo::builder("dw", "orders")
                .column("id", GenericType::BigInt)
                .column("name", GenericType::String)
                .partition_key("pt")
                .store_format(StoreFormat::Orc)
                .storage_option("orc.compress", "SNAPPY")
                .storage_option("external.table.purge", "true")
                .build(&HiveDialect)
                .unwrap()
        };
        let first = build();
        let second = build();
        assert_eq!(first.create_table_sql(), second.create_table_sql());
        // Options render sorted regardless of insertion order.
        assert!(first.create_table_sql().contains(
            "TBLPROPERTIES ('external.table.purge'='true', 'orc.compress'='SNAPPY')"
        ));
    }

    #[test]
    fn test_oracle_ddl_has_no_storage_clauses() {
        let table = TableInfo::builder("dw", "orders")
            .column("id", GenericType::BigInt)
            .build(&OracleDialect)
            .unwrap();
        assert_eq!(
            table.create_table_sql(),
            "CREATE TABLE IF NOT EXISTS \"dw\".\"orders\" (\"id\" NUMBER(19))"
        );
    }

    #[test]
    fn test_build_fails_fast_on_unmappable_type() {
        let err = TableInfo::builder("dw", "flags")
            .column("ok", GenericType::Boolean)
            .build(&OracleDialect)
            .unwrap_err();
        assert!(err.to_string().contains("no native type for `boolean`"));
    }

    #[test]
    fn test_build_rejects_partition_on_plain_dialect() {
        let err = TableInfo::builder("dw", "orders")
            .column("id", GenericType::BigInt)
            .partition_key("pt")
            .build(&AnsiDialect)
            .unwrap_err();
        assert!(err.to_string().contains("does not support partitioned tables"));
    }

    #[test]
    fn test_build_rejects_partition_key_collision() {
        let err = TableInfo::builder("dw", "orders")
            .column("pt", GenericType::String)
            .partition_key("pt")
            .build(&HiveDialect)
            .unwrap_err();
        assert!(err.to_string().contains("partition key `pt`"));
    }

    #[test]
    fn test_build_rejects_empty_columns() {
        let err = TableInfo::builder("dw", "empty")
            .build(&AnsiDialect)
            .unwrap_err();
        assert!(err.to_string().contains("has no columns"));
    }
}
