//! Delimited text codec
//!
//! One line per row, one field per configured column, joined by the field
//! delimiter. Constant columns are injected on encode and parsed like any
//! other field on decode (the written file carries them). Every failure
//! here is a row error: the caller routes it dirty and keeps going.

use penstock_rdbc::schema::MetaColumn;
use penstock_rdbc::types::{Row, Value};

use crate::error::{Result, SyncError};

/// Encodes rows to delimited lines and back for a fixed column list.
#[derive(Debug, Clone)]
pub struct DelimitedCodec {
    columns: Vec<MetaColumn>,
    delimiter: char,
    /// Number of non-constant columns
    data_width: usize,
    /// Whether the non-constant indices are exactly 0..data_width
    contiguous: bool,
}

impl DelimitedCodec {
    /// Create a codec over resolved columns.
    ///
    /// Non-constant columns must carry explicit indices; a leftover
    /// `-1` sentinel is a configuration error here.
    pub fn new(columns: Vec<MetaColumn>, delimiter: char) -> Result<Self> {
        let mut indices: Vec<i32> = Vec::new();
        for column in &columns {
            if column.is_constant() {
                continue;
            }
            if column.index < 0 {
                return Err(SyncError::config(format!(
                    "column `{}` has unresolved index",
                    column.name
                )));
            }
            indices.push(column.index);
        }
        indices.sort_unstable();
        let data_width = indices.len();
        let contiguous = indices
            .iter()
            .enumerate()
            .all(|(i, idx)| *idx == i as i32);
        Ok(Self {
            columns,
            delimiter,
            data_width,
            contiguous,
        })
    }

    /// Columns this codec reads and writes
    pub fn columns(&self) -> &[MetaColumn] {
        &self.columns
    }

    /// Encode one row as a delimited line (no trailing newline).
    pub fn encode(&self, row: &Row) -> Result<String> {
        if self.contiguous && row.len() != self.data_width {
            return Err(SyncError::row(format!(
                "field count {}, expected {}",
                row.len(),
                self.data_width
            )));
        }

        let mut line = String::new();
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                line.push(self.delimiter);
            }
            let rendered = match &column.value {
                Some(constant) => constant.clone(),
                None => {
                    let idx = column.index as usize;
                    let cell = row.get(idx).ok_or_else(|| {
                        SyncError::row(format!(
                            "column `{}` reads index {} but row has {} fields",
                            column.name,
                            idx,
                            row.len()
                        ))
                    })?;
                    self.coerce(cell, column)?.render()
                }
            };
            if rendered.contains(self.delimiter) || rendered.contains('\n') {
                return Err(SyncError::row(format!(
                    "column `{}` value contains the field delimiter or a newline",
                    column.name
                )));
            }
            line.push_str(&rendered);
        }
        Ok(line)
    }

    /// Decode one delimited line into a typed row.
    pub fn decode(&self, line: &str) -> Result<Row> {
        let fields: Vec<&str> = line.split(self.delimiter).collect();
        if fields.len() != self.columns.len() {
            return Err(SyncError::row(format!(
                "field count {}, expected {}",
                fields.len(),
                self.columns.len()
            )));
        }
        let mut values = Vec::with_capacity(fields.len());
        for (column, field) in self.columns.iter().zip(fields) {
            let value = Value::parse_as(column.column_type, field)
                .map_err(|e| SyncError::row(format!("column `{}`: {}", column.name, e)))?;
            values.push(value);
        }
        Ok(Row::new(values))
    }

    // Text cells under a typed column are re-parsed so a value that cannot
    // be interpreted fails at the row boundary instead of landing as-is.
    fn coerce(&self, cell: &Value, column: &MetaColumn) -> Result<Value> {
        match cell {
            Value::String(s) if !column.column_type.is_character() => {
                Value::parse_as(column.column_type, s)
                    .map_err(|e| SyncError::row(format!("column `{}`: {}", column.name, e)))
            }
            other => Ok(other.clone()),
        }
    }
}
