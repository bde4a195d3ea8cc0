//! Query-related data models.
//!
//! Positional statement arguments and the JSON envelopes returned by the
//! relational tools.

use crate::db::materialize::ProcedureOutcome;
use crate::db::value::ResultSet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub use crate::config::DEFAULT_QUERY_TIMEOUT_SECS;

/// A positional argument for a parameterized statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Arrays and objects, bound as JSON text
    Json(JsonValue),
}

impl QueryParam {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
        }
    }
}

/// Discriminator of a relational response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Select,
    Procedure,
    Insert,
    Modification,
    CreateProcedure,
    DropProcedure,
    CreateTable,
    AlterTable,
    DropTable,
}

/// Envelope for statements that return rows.
///
/// `data` and `result_sets` are mutually exclusive: a single result set is
/// reported under `data`, two or more under `result_sets`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResultSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_sets: Option<Vec<ResultSet>>,
    pub count: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl QueryResult {
    /// Plain query with one result set; `count` is the number of records.
    pub fn select(records: ResultSet) -> Self {
        Self {
            kind: ResponseKind::Select,
            count: records.len(),
            data: Some(records),
            result_sets: None,
            success: true,
            message: None,
        }
    }

    /// Plain query that may have produced several result sets.
    pub fn select_sets(sets: Vec<ResultSet>) -> Self {
        match ProcedureOutcome::from_sets(sets) {
            ProcedureOutcome::Single(records) => Self::select(records),
            ProcedureOutcome::Multiple(sets) => Self {
                kind: ResponseKind::Select,
                data: None,
                count: sets.len(),
                message: Some(format!("Query returned {} result sets", sets.len())),
                result_sets: Some(sets),
                success: true,
            },
        }
    }

    /// Walked result sets; `count` is 1 for a single set, otherwise the number of sets.
    pub fn from_outcome(kind: ResponseKind, outcome: ProcedureOutcome) -> Self {
        let message = Some(outcome.summary());
        let count = outcome.set_count();
        match outcome {
            ProcedureOutcome::Single(records) => Self {
                kind,
                data: Some(records),
                result_sets: None,
                count,
                success: true,
                message,
            },
            ProcedureOutcome::Multiple(sets) => Self {
                kind,
                data: None,
                result_sets: Some(sets),
                count,
                success: true,
                message,
            },
        }
    }
}

/// Envelope for statements that do not return rows.
#[derive(Debug, Clone, Serialize)]
pub struct ExecResult {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    pub success: bool,
    pub rows_affected: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExecResult {
    pub fn modification(rows_affected: u64) -> Self {
        Self {
            kind: ResponseKind::Modification,
            success: true,
            rows_affected,
            last_insert_id: None,
            message: None,
        }
    }

    pub fn insert(rows_affected: u64, last_insert_id: u64) -> Self {
        Self {
            kind: ResponseKind::Insert,
            success: true,
            rows_affected,
            last_insert_id: Some(last_insert_id),
            message: None,
        }
    }

    /// Schema change with no meaningful row count.
    pub fn ddl(kind: ResponseKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            success: true,
            rows_affected: 0,
            last_insert_id: None,
            message: Some(message.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
