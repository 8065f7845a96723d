//! Generic type system shared by dialects, schema resolution and formats.
//!
//! [`GenericType`] is the vendor-neutral column type spelled in job
//! configuration; each dialect maps it to a native type name. [`Value`] is
//! the runtime cell representation rows are made of, with a canonical text
//! rendering used by delimited formats.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Vendor-neutral column type.
///
/// Parsed from configuration with [`FromStr`]; unknown spellings fail fast
/// with a configuration error rather than defaulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum GenericType {
    /// True/false
    Boolean,
    /// 8-bit integer
    TinyInt,
    /// 16-bit integer
    SmallInt,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    BigInt,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// Exact decimal
    Decimal,
    /// Fixed-width character
    Char,
    /// Bounded character
    Varchar,
    /// Unbounded character
    String,
    /// Raw bytes
    Binary,
    /// Calendar date
    Date,
    /// Point in time (UTC)
    Timestamp,
}

impl GenericType {
    /// Canonical lowercase name, the spelling `Display` and serde use
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::TinyInt => "tinyint",
            Self::SmallInt => "smallint",
            Self::Int => "int",
            Self::BigInt => "bigint",
            Self::Float => "float",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::Char => "char",
            Self::Varchar => "varchar",
            Self::String => "string",
            Self::Binary => "binary",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
        }
    }

    /// Whether the type holds character data
    pub const fn is_character(&self) -> bool {
        matches!(self, Self::Char | Self::Varchar | Self::String)
    }

    /// Whether the type holds numeric data
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::TinyInt
                | Self::SmallInt
                | Self::Int
                | Self::BigInt
                | Self::Float
                | Self::Double
                | Self::Decimal
        )
    }
}

impl fmt::Display for GenericType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GenericType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let ty = match s.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Self::Boolean,
            "tinyint" | "byte" => Self::TinyInt,
            "smallint" | "short" => Self::SmallInt,
            "int" | "integer" => Self::Int,
            "bigint" | "long" => Self::BigInt,
            "float" | "real" => Self::Float,
            "double" => Self::Double,
            "decimal" | "numeric" => Self::Decimal,
            "char" => Self::Char,
            "varchar" => Self::Varchar,
            "string" | "text" => Self::String,
            "binary" | "bytes" => Self::Binary,
            "date" => Self::Date,
            "timestamp" | "datetime" => Self::Timestamp,
            other => {
                return Err(Error::config(format!("unknown column type `{}`", other)));
            }
        };
        Ok(ty)
    }
}

/// Runtime cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// 32-bit integer (also carries tinyint/smallint)
    Int32(i32),
    /// 64-bit integer
    Int64(i64),
    /// 64-bit float (also carries float)
    Float64(f64),
    /// Exact decimal
    Decimal(Decimal),
    /// Character data
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Calendar date
    Date(NaiveDate),
    /// Point in time (UTC)
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Whether this value is NULL
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Boolean view, if the value is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Widening integer view
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Widening float view
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int32(v) => Some(f64::from(*v)),
            Self::Int64(v) => Some(*v as f64),
            Self::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrowed string view, if the value is character data
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Canonical text rendering used by delimited formats.
    ///
    /// NULL renders as the empty string; bytes render as lowercase hex;
    /// timestamps render as RFC 3339. [`Value::parse_as`] is the inverse.
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(v) => v.to_string(),
            Self::Int32(v) => v.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::Float64(v) => v.to_string(),
            Self::Decimal(v) => v.to_string(),
            Self::String(v) => v.clone(),
            Self::Bytes(v) => {
                let mut out = String::with_capacity(v.len() * 2);
                for byte in v {
                    out.push_str(&format!("{:02x}", byte));
                }
                out
            }
            Self::Date(v) => v.format("%Y-%m-%d").to_string(),
            Self::Timestamp(v) => v.to_rfc3339(),
        }
    }

    /// Interpret text as a value of the given generic type.
    ///
    /// Empty text is NULL for every type (the rendering of NULL is the
    /// empty string, so a zero-length string cell is not representable in
    /// delimited text). Failures are coercion errors, caught by callers at
    /// the row boundary.
    pub fn parse_as(ty: GenericType, text: &str) -> Result<Self> {
        if text.is_empty() {
            return Ok(Self::Null);
        }
        let coercion = || Error::type_coercion(text, ty.name());
        let value = match ty {
            GenericType::Boolean => Self::Bool(text.parse().map_err(|_| coercion())?),
            GenericType::TinyInt | GenericType::SmallInt | GenericType::Int => {
                Self::Int32(text.parse().map_err(|_| coercion())?)
            }
            GenericType::BigInt => Self::Int64(text.parse().map_err(|_| coercion())?),
            GenericType::Float | GenericType::Double => {
                Self::Float64(text.parse().map_err(|_| coercion())?)
            }
            GenericType::Decimal => Self::Decimal(text.parse().map_err(|_| coercion())?),
            GenericType::Char | GenericType::Varchar | GenericType::String => {
                Self::String(text.to_string())
            }
            GenericType::Binary => Self::Bytes(decode_hex(text).ok_or_else(coercion)?),
            GenericType::Date => Self::Date(
                NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| coercion())?,
            ),
            GenericType::Timestamp => Self::Timestamp(
                DateTime::parse_from_rfc3339(text)
                    .map_err(|_| coercion())?
                    .with_timezone(&Utc),
            ),
        };
        Ok(value)
    }
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Ordered sequence of cell values.
///
/// A row is positional; the schema it conforms to travels separately as a
/// resolved [`MetaColumn`](crate::schema::MetaColumn) list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Create a row from values
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no cells
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cell at position `index`
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// All cells in order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume into the cell vector
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Append a cell
    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

impl FromIterator<Value> for Row {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&value.render())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_type_parsing() {
        assert_eq!("int".parse::<GenericType>().unwrap(), GenericType::Int);
        assert_eq!("INTEGER".parse::<GenericType>().unwrap(), GenericType::Int);
        assert_eq!("long".parse::<GenericType>().unwrap(), GenericType::BigInt);
        assert_eq!("text".parse::<GenericType>().unwrap(), GenericType::String);
        assert_eq!(
            " timestamp ".parse::<GenericType>().unwrap(),
            GenericType::Timestamp
        );
    }

    #[test]
    fn test_generic_type_unknown_fails_fast() {
        let err = "uint128".parse::<GenericType>().unwrap_err();
        assert!(err.to_string().contains("unknown column type `uint128`"));
    }

    #[test]
    fn test_generic_type_display_roundtrip() {
        for ty in [
            GenericType::Boolean,
            GenericType::BigInt,
            GenericType::Decimal,
            GenericType::Timestamp,
        ] {
            assert_eq!(ty.name().parse::<GenericType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::from(42_i32).as_i64(), Some(42));
        assert_eq!(Value::from(42_i64).as_f64(), Some(42.0));
        assert_eq!(Value::from("hello").as_str(), Some("hello"));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert!(Value::from(None::<i32>).is_null());
        assert_eq!(Value::Null.as_i64(), None);
    }

    #[test]
    fn test_value_render_parse_roundtrip() {
        let cases = [
            (GenericType::Boolean, Value::Bool(true)),
            (GenericType::Int, Value::Int32(-7)),
            (GenericType::BigInt, Value::Int64(1 << 40)),
            (GenericType::Double, Value::Float64(2.5)),
            (GenericType::String, Value::String("plain".into())),
            (GenericType::Binary, Value::Bytes(vec![0xde, 0xad, 0xbe])),
            (
                GenericType::Date,
                Value::Date(NaiveDate::from_ymd_opt(2024, 1, 28).unwrap()),
            ),
        ];
        for (ty, value) in cases {
            let text = value.render();
            assert_eq!(Value::parse_as(ty, &text).unwrap(), value);
        }
    }

    #[test]
    fn test_value_null_renders_empty() {
        assert_eq!(Value::Null.render(), "");
        assert_eq!(Value::parse_as(GenericType::Int, "").unwrap(), Value::Null);
        assert_eq!(
            Value::parse_as(GenericType::String, "").unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_value_coercion_failure() {
        let err = Value::parse_as(GenericType::Int, "abc").unwrap_err();
        assert!(err.is_coercion());
        assert!(err.to_string().contains("`abc`"));

        assert!(Value::parse_as(GenericType::Date, "01/28/2024").is_err());
        assert!(Value::parse_as(GenericType::Binary, "xyz").is_err());
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let ts = Value::Timestamp(Utc::now());
        let text = ts.render();
        assert_eq!(Value::parse_as(GenericType::Timestamp, &text).unwrap(), ts);
    }

    #[test]
    fn test_row_basics() {
        let row = Row::new(vec![Value::from(1), Value::from("a"), Value::Null]);
        assert_eq!(row.len(), 3);
        assert_eq!(row.get(1), Some(&Value::String("a".into())));
        assert_eq!(row.get(9), None);
        assert_eq!(row.to_string(), "1, a, ");
    }
}
