//! # penstock-rdbc
//!
//! Vendor-neutral database abstractions for the penstock data
//! synchronization engine: a generic type system, column and table
//! metadata, and the [`Dialect`] capability interface that carries
//! everything vendor-specific.
//!
//! ## Design
//!
//! The engine never branches on a vendor name. A connector resolves a
//! dialect once from configuration and delegates quoting, type mapping,
//! split predicates, connection properties and DDL storage clauses to it.
//! Table descriptions are built through a validating builder and are
//! immutable afterwards; the `CREATE TABLE` statement they carry is
//! synthesized exactly once and is byte-identical across runs for the same
//! inputs.
//!
//! ## Example
//!
//! ```
//! use penstock_rdbc::dialect::HiveDialect;
//! use penstock_rdbc::schema::TableInfo;
//! use penstock_rdbc::types::GenericType;
//!
//! let table = TableInfo::builder("dw", "orders")
//!     .column("id", GenericType::BigInt)
//!     .column("name", GenericType::String)
//!     .partition_key("pt")
//!     .build(&HiveDialect)
//!     .unwrap();
//!
//! assert!(table.create_table_sql().starts_with("CREATE TABLE IF NOT EXISTS"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod connection;
pub mod dialect;
pub mod error;
pub mod schema;
pub mod types;

pub use connection::{ConnectionConfig, DEFAULT_CONNECT_TIMEOUT_SECS};
pub use dialect::{dialect_for, AnsiDialect, Dialect, HiveDialect, OracleDialect, SplitSpec};
pub use error::{Error, Result};
pub use schema::{
    resolve_columns, IndexPolicy, MetaColumn, StoreFormat, TableInfo, TableInfoBuilder,
    DEFAULT_DELIMITER, UNSPECIFIED_INDEX,
};
pub use types::{GenericType, Row, Value};

/// Commonly used imports.
pub mod prelude {
    pub use crate::connection::ConnectionConfig;
    pub use crate::dialect::{dialect_for, Dialect, SplitSpec};
    pub use crate::error::{Error, Result};
    pub use crate::schema::{resolve_columns, IndexPolicy, MetaColumn, StoreFormat, TableInfo};
    pub use crate::types::{GenericType, Row, Value};
}
