//! Relational database layer.
//!
//! This module provides:
//! - Connection pool management (named sessions)
//! - Statement execution and classification
//! - Row decoding and value coercion
//! - Result materialization across multiple result sets

pub mod cursor;
pub mod decode;
pub mod executor;
pub mod materialize;
pub mod params;
pub mod pool;
pub mod statement;
pub mod value;

pub use cursor::{BufferedCursor, ResultCursor};
pub use executor::{ExecOutcome, PoolCursor, StatementExecutor};
pub use materialize::{ProcedureOutcome, materialize, materialize_result_sets, walk};
pub use pool::{ConnectionManager, ConnectionSummary, DbPool};
pub use statement::{StatementKind, classify};
pub use value::{Cell, Record, ResultSet, SqlValue, coerce};
