//! Result materialization.
//!
//! Turns a [`ResultCursor`] into [`ResultSet`]s of coerced records:
//! - [`materialize`] reads the current result set only
//! - [`walk`] drives every result set the statement produced
//! - [`ProcedureOutcome::from_sets`] picks the single/multiple wire shape
//!
//! All of them are all-or-nothing: on failure no partial result is returned.

use crate::db::cursor::ResultCursor;
use crate::db::value::{Record, ResultSet, SqlValue, coerce};
use crate::error::{DbError, DbResult};
use tracing::debug;

/// Read the rows of the current result set.
fn read_rows<C: ResultCursor>(cursor: &mut C, columns: &[String]) -> DbResult<ResultSet> {
    let mut records = ResultSet::new();
    let mut slots = vec![SqlValue::Null; columns.len()];

    while cursor.next_row() {
        cursor.scan(&mut slots)?;
        let mut record = Record::with_capacity(columns.len());
        for (name, slot) in columns.iter().zip(slots.iter_mut()) {
            record.insert(name.as_str(), coerce(std::mem::take(slot)));
        }
        records.push(record);
    }

    Ok(records)
}

/// Surface an error the cursor hit while iterating.
fn check_terminal<C: ResultCursor>(cursor: &mut C) -> DbResult<()> {
    match cursor.err() {
        Some(e @ DbError::Iteration { .. }) => Err(e),
        Some(e) => Err(DbError::iteration(e.to_tool_message())),
        None => Ok(()),
    }
}

/// Materialize a statement known to produce exactly one result set.
pub fn materialize<C: ResultCursor>(cursor: &mut C) -> DbResult<ResultSet> {
    let columns = cursor.columns()?;
    let records = read_rows(cursor, &columns)?;
    check_terminal(cursor)?;
    Ok(records)
}

/// Materialize every result set the cursor holds, in order.
///
/// A metadata failure on the first result set is an error. After at least
/// one set it is taken as the end of results, since some backends signal
/// exhaustion that way.
pub fn walk<C: ResultCursor>(cursor: &mut C) -> DbResult<Vec<ResultSet>> {
    let mut sets = Vec::new();

    loop {
        let columns = match cursor.columns() {
            Ok(columns) => columns,
            Err(e) if sets.is_empty() => return Err(e),
            Err(e) => {
                debug!(error = %e, result_sets = sets.len(), "Metadata read ended result walk");
                break;
            }
        };

        sets.push(read_rows(cursor, &columns)?);

        if !cursor.next_result_set() {
            break;
        }
    }

    check_terminal(cursor)?;
    Ok(sets)
}

/// The wire shape of one or more result sets.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcedureOutcome {
    /// Exactly one result set (zero sets count as one empty set).
    Single(ResultSet),
    /// Two or more result sets, in order.
    Multiple(Vec<ResultSet>),
}

impl ProcedureOutcome {
    pub fn from_sets(mut sets: Vec<ResultSet>) -> Self {
        match sets.len() {
            0 => Self::Single(ResultSet::new()),
            1 => Self::Single(sets.pop().unwrap_or_default()),
            _ => Self::Multiple(sets),
        }
    }

    pub fn set_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multiple(sets) => sets.len(),
        }
    }

    /// Total records across all result sets.
    pub fn total_records(&self) -> usize {
        match self {
            Self::Single(records) => records.len(),
            Self::Multiple(sets) => sets.iter().map(Vec::len).sum(),
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Single(_) => format!(
                "Successfully executed procedure with 1 result set. Total records: {}",
                self.total_records()
            ),
            Self::Multiple(sets) => format!(
                "Successfully executed procedure with {} result sets. Total records: {}",
                sets.len(),
                self.total_records()
            ),
        }
    }
}

/// Walk all result sets and select the wire shape.
pub fn materialize_result_sets<C: ResultCursor>(cursor: &mut C) -> DbResult<ProcedureOutcome> {
    let sets = walk(cursor)?;
    Ok(ProcedureOutcome::from_sets(sets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::cursor::scripted::{ScriptedCursor, ScriptedSet};
    use crate::db::value::Cell;

    fn users() -> ScriptedSet {
        ScriptedSet::new(
            &["id", "name"],
            vec![
                vec![SqlValue::Int(1), SqlValue::Bytes(b"ann".to_vec())],
                vec![SqlValue::Int(2), SqlValue::Null],
            ],
        )
    }

    fn totals() -> ScriptedSet {
        ScriptedSet::new(&["total"], vec![vec![SqlValue::Float(9.5)]])
    }

    #[test]
    fn test_materialize_preserves_order_and_coerces_bytes() {
        let mut cursor = ScriptedCursor::new(vec![users()]);
        let records = materialize(&mut cursor).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].columns().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(records[0].get("name"), Some(&Cell::Text("ann".into())));
        assert_eq!(records[1].get("name"), Some(&Cell::Null));
        assert_eq!(cursor.columns_calls, 1);
    }

    #[test]
    fn test_materialize_scan_failure_discards_rows() {
        let mut set = users();
        set.fail_scan_at = Some(1);
        let mut cursor = ScriptedCursor::new(vec![set]);
        let err = materialize(&mut cursor).unwrap_err();
        assert!(matches!(err, DbError::Materialization { .. }));
    }

    #[test]
    fn test_materialize_columns_failure() {
        let mut set = users();
        set.fail_columns = true;
        let mut cursor = ScriptedCursor::new(vec![set]);
        assert!(materialize(&mut cursor).is_err());
    }

    #[test]
    fn test_materialize_terminal_error() {
        let mut cursor = ScriptedCursor::new(vec![users()])
            .with_terminal_error(DbError::iteration("conn reset"));
        let err = materialize(&mut cursor).unwrap_err();
        assert!(matches!(err, DbError::Iteration { .. }));
        assert_eq!(err.to_string(), "Row iteration error: conn reset");
    }

    #[test]
    fn test_terminal_error_keeps_cause_suggestion() {
        let cause = DbError::connection("server closed the connection", "Reconnect and retry");
        let mut cursor = ScriptedCursor::new(vec![users()]).with_terminal_error(cause);
        let err = materialize(&mut cursor).unwrap_err();
        assert!(matches!(err, DbError::Iteration { .. }));
        let message = err.to_tool_message();
        assert!(message.contains("server closed the connection"));
        assert!(message.contains("Reconnect and retry"));
    }

    #[test]
    fn test_single_set_selects_single_arm() {
        let mut cursor = ScriptedCursor::new(vec![users()]);
        let outcome = materialize_result_sets(&mut cursor).unwrap();
        assert!(matches!(outcome, ProcedureOutcome::Single(ref r) if r.len() == 2));
        assert_eq!(outcome.set_count(), 1);
    }

    #[test]
    fn test_single_empty_set_selects_single_arm() {
        let mut cursor = ScriptedCursor::new(vec![ScriptedSet::new(&["id"], vec![])]);
        let outcome = materialize_result_sets(&mut cursor).unwrap();
        assert_eq!(outcome, ProcedureOutcome::Single(Vec::new()));
        assert_eq!(outcome.total_records(), 0);
    }

    #[test]
    fn test_multiple_sets_with_heterogeneous_columns() {
        let mut cursor =
            ScriptedCursor::new(vec![users(), ScriptedSet::new(&["x"], vec![]), totals()]);
        let outcome = materialize_result_sets(&mut cursor).unwrap();
        let ProcedureOutcome::Multiple(sets) = &outcome else {
            panic!("expected multiple result sets");
        };
        assert_eq!(sets.len(), 3);
        assert_eq!(outcome.total_records(), 3);
        assert_eq!(sets[2][0].get("total"), Some(&Cell::Float(9.5)));
        assert_eq!(
            outcome.summary(),
            "Successfully executed procedure with 3 result sets. Total records: 3"
        );
    }

    #[test]
    fn test_walk_first_metadata_failure_is_error() {
        let mut set = users();
        set.fail_columns = true;
        let mut cursor = ScriptedCursor::new(vec![set, totals()]);
        assert!(walk(&mut cursor).is_err());
    }

    #[test]
    fn test_walk_later_metadata_failure_ends_results() {
        let mut cursor = ScriptedCursor::new(vec![users(), totals()]).with_phantom_trailing_set();
        let sets = walk(&mut cursor).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(cursor.columns_calls, 3);
    }

    #[test]
    fn test_walk_scan_failure_in_later_set_aborts() {
        let mut failing = totals();
        failing.fail_scan_at = Some(0);
        let mut cursor = ScriptedCursor::new(vec![users(), failing]);
        assert!(walk(&mut cursor).is_err());
    }

    #[test]
    fn test_walk_terminal_error_after_all_sets() {
        let mut cursor = ScriptedCursor::new(vec![users(), totals()])
            .with_terminal_error(DbError::iteration("broken pipe"));
        let err = materialize_result_sets(&mut cursor).unwrap_err();
        assert!(matches!(err, DbError::Iteration { .. }));
    }

    #[test]
    fn test_materialization_is_idempotent_across_cursors() {
        let a = walk(&mut ScriptedCursor::new(vec![users(), totals()])).unwrap();
        let b = walk(&mut ScriptedCursor::new(vec![users(), totals()])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_from_sets_zero_is_empty_single() {
        let outcome = ProcedureOutcome::from_sets(Vec::new());
        assert_eq!(outcome, ProcedureOutcome::Single(Vec::new()));
        assert_eq!(
            outcome.summary(),
            "Successfully executed procedure with 1 result set. Total records: 0"
        );
    }
}
