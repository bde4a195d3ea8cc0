//! Scalar values and records.
//!
//! Rows are decoded into [`SqlValue`], a closed set of backend scalars, and
//! then coerced into transport-safe [`Cell`]s. A [`Record`] keeps the cells of
//! one row in the column order reported by the backend.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// A backend-native scalar read from a row slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SqlValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// TEXT/BLOB/VARCHAR payloads surfaced as raw bytes by some drivers
    Bytes(Vec<u8>),
}

/// A transport-safe value, serialized as the bare JSON scalar.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Coerce a backend scalar into a transport value.
///
/// Byte sequences are decoded as UTF-8 (invalid sequences are replaced with
/// U+FFFD); every other variant passes through unchanged.
pub fn coerce(raw: SqlValue) -> Cell {
    match raw {
        SqlValue::Null => Cell::Null,
        SqlValue::Bool(v) => Cell::Bool(v),
        SqlValue::Int(v) => Cell::Int(v),
        SqlValue::Float(v) => Cell::Float(v),
        SqlValue::Text(v) => Cell::Text(v),
        SqlValue::Bytes(v) => Cell::Text(match String::from_utf8(v) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }),
    }
}

/// One materialized row: column name to cell, in declared column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Cell)>,
}

impl Record {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Set a column's value.
    ///
    /// A repeated column name keeps its first position and takes the latest value,
    /// so keys stay unique within a record.
    pub fn insert(&mut self, column: impl Into<String>, cell: Cell) {
        let column = column.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = cell,
            None => self.fields.push((column, cell)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, cell)| cell)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.fields.iter().map(|(name, cell)| (name.as_str(), cell))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, cell) in &self.fields {
            map.serialize_entry(name, cell)?;
        }
        map.end()
    }
}

/// The records of one result set, in row order.
pub type ResultSet = Vec<Record>;
