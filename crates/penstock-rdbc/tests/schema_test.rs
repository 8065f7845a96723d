//! Unit tests for penstock-rdbc schema resolution and DDL synthesis

use penstock_rdbc::dialect::{dialect_for, HiveDialect};
use penstock_rdbc::schema::{resolve_columns, IndexPolicy, MetaColumn, StoreFormat, TableInfo};
use penstock_rdbc::types::GenericType;

fn config_columns() -> Vec<MetaColumn> {
    serde_json::from_str(
        r#"[
            {"name": "id", "type": "bigint"},
            {"name": "amount", "type": "decimal"},
            {"name": "note", "type": "string"},
            {"name": "batch", "type": "string", "value": "b-001"}
        ]"#,
    )
    .unwrap()
}

#[test]
fn test_configured_columns_resolve_in_declaration_order() {
    let resolved = resolve_columns(config_columns(), IndexPolicy::DeclarationOrder).unwrap();
    assert_eq!(resolved.len(), 4);
    for (i, column) in resolved.iter().enumerate() {
        assert_eq!(column.index, i as i32, "column `{}`", column.name);
    }
    assert!(resolved[3].is_constant());
}

#[test]
fn test_resolved_columns_feed_table_builder() {
    let resolved = resolve_columns(config_columns(), IndexPolicy::DeclarationOrder).unwrap();
    let dialect = dialect_for("hive").unwrap();
    let table = TableInfo::builder("dw", "payments")
        .columns(&resolved)
        .partition_key("pt")
        .build(dialect.as_ref())
        .unwrap();

    assert_eq!(table.column_count(), 4);
    assert_eq!(table.qualified_name(), "dw.payments");
    let sql = table.create_table_sql();
    assert!(sql.contains("`amount` DECIMAL"), "{}", sql);
    assert!(sql.contains("PARTITIONED BY (`pt` STRING)"), "{}", sql);
}

#[test]
fn test_ddl_stable_across_dialect_instances() {
    let build = |dialect: &dyn penstock_rdbc::dialect::Dialect| {
        TableInfo::builder("dw", "payments")
            .column("id", GenericType::BigInt)
            .column("note", GenericType::String)
            .partition_key("pt")
            .store_format(StoreFormat::Parquet)
            .storage_option("parquet.compression", "SNAPPY")
            .delimiter('\t')
            .build(dialect)
            .unwrap()
    };
    let first = build(&HiveDialect);
    let second = build(dialect_for("hive").unwrap().as_ref());
    assert_eq!(first.create_table_sql(), second.create_table_sql());
    assert!(first.create_table_sql().contains("STORED AS PARQUET"));
    assert!(first
        .create_table_sql()
        .contains("FIELDS TERMINATED BY '\\011'"));
}

#[test]
fn test_unmappable_column_fails_before_any_ddl_exists() {
    let dialect = dialect_for("oracle").unwrap();
    let err = TableInfo::builder("dw", "flags")
        .column("id", GenericType::BigInt)
        .column("active", GenericType::Boolean)
        .build(dialect.as_ref())
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("no native type for `boolean` in dialect `oracle`"));
}

#[test]
fn test_store_format_extensions() {
    assert_eq!(StoreFormat::Text.extension(), ".txt");
    assert_eq!(StoreFormat::Orc.extension(), ".orc");
    assert_eq!(StoreFormat::Parquet.extension(), ".parquet");
    assert_eq!(StoreFormat::default(), StoreFormat::Text);
}

#[test]
fn test_store_format_config_spelling() {
    let format: StoreFormat = serde_json::from_str("\"parquet\"").unwrap();
    assert_eq!(format, StoreFormat::Parquet);
    assert!(serde_json::from_str::<StoreFormat>("\"avro\"").is_err());
}
