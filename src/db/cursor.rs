//! Cursor abstraction over one or more result sets.
//!
//! [`ResultCursor`] is the handle the materializer drives. [`BufferedCursor`]
//! implements it over the item stream sqlx produces for a statement, where
//! each `Either::Left` closes the current result set and each
//! `Either::Right` is a row of it.

use crate::db::decode::DecodeRow;
use crate::db::value::SqlValue;
use crate::error::{DbError, DbResult};
use futures_util::{Stream, StreamExt};
use sqlx::Either;

/// A stateful handle over the result sets of one statement execution.
pub trait ResultCursor {
    /// Column names of the current result set.
    fn columns(&mut self) -> DbResult<Vec<String>>;

    /// Advance to the next row of the current result set.
    fn next_row(&mut self) -> bool;

    /// Scan the current row into `slots`, one slot per column.
    fn scan(&mut self, slots: &mut [SqlValue]) -> DbResult<()>;

    /// Advance to the next result set, if any.
    fn next_result_set(&mut self) -> bool;

    /// Take the error that ended iteration early, if one occurred.
    fn err(&mut self) -> Option<DbError>;
}

/// The rows of one result set.
struct Frame<R> {
    rows: Vec<R>,
}

/// A cursor over rows already fetched from the backend.
///
/// Rows are decoded lazily in [`ResultCursor::scan`], so decode failures
/// surface as scan failures.
pub struct BufferedCursor<R> {
    frames: Vec<Frame<R>>,
    frame_idx: usize,
    row_idx: Option<usize>,
    fallback_columns: Vec<String>,
    deferred: Option<DbError>,
}

impl<R: DecodeRow> BufferedCursor<R> {
    /// Drain a sqlx `fetch_many` stream into result sets.
    ///
    /// A failure before anything was received is returned directly; a later
    /// failure ends collection and is reported through [`ResultCursor::err`].
    pub async fn collect<Q, S>(mut stream: S) -> DbResult<Self>
    where
        S: Stream<Item = Result<Either<Q, R>, sqlx::Error>> + Unpin,
    {
        let mut frames = Vec::new();
        let mut pending = Vec::new();
        let mut received = false;
        let mut deferred = None;

        while let Some(item) = stream.next().await {
            match item {
                Ok(Either::Left(_)) => frames.push(Frame {
                    rows: std::mem::take(&mut pending),
                }),
                Ok(Either::Right(row)) => pending.push(row),
                Err(e) if !received => return Err(e.into()),
                Err(e) => {
                    deferred = Some(DbError::from(e));
                    break;
                }
            }
            received = true;
        }

        if !pending.is_empty() || frames.is_empty() {
            frames.push(Frame { rows: pending });
        }

        Ok(Self {
            frames,
            frame_idx: 0,
            row_idx: None,
            fallback_columns: Vec::new(),
            deferred,
        })
    }

    /// Column names to report for a result set that has no rows.
    pub fn with_fallback_columns(mut self, columns: Vec<String>) -> Self {
        self.fallback_columns = columns;
        self
    }

    /// Drop the trailing status-only frame a MySQL `CALL` appends.
    pub fn without_call_status(mut self) -> Self {
        let trailing_empty = self.frames.last().is_some_and(|f| f.rows.is_empty());
        if self.frames.len() > 1 && trailing_empty {
            self.frames.pop();
        }
        self
    }

    /// Number of result sets held by the cursor.
    pub fn result_set_count(&self) -> usize {
        self.frames.len()
    }

    fn current_row(&self) -> Option<&R> {
        let frame = self.frames.get(self.frame_idx)?;
        frame.rows.get(self.row_idx?)
    }
}

impl<R: DecodeRow> ResultCursor for BufferedCursor<R> {
    fn columns(&mut self) -> DbResult<Vec<String>> {
        let frame = self.frames.get(self.frame_idx).ok_or_else(|| {
            DbError::materialization(format!("no result set at position {}", self.frame_idx))
        })?;
        Ok(match frame.rows.first() {
            Some(row) => row.column_names(),
            None => self.fallback_columns.clone(),
        })
    }

    fn next_row(&mut self) -> bool {
        let Some(frame) = self.frames.get(self.frame_idx) else {
            return false;
        };
        let next = self.row_idx.map_or(0, |i| i + 1);
        if next < frame.rows.len() {
            self.row_idx = Some(next);
            true
        } else {
            self.row_idx = Some(frame.rows.len());
            false
        }
    }

    fn scan(&mut self, slots: &mut [SqlValue]) -> DbResult<()> {
        let row = self
            .current_row()
            .ok_or_else(|| DbError::materialization("scan called without a current row"))?;
        for (idx, slot) in slots.iter_mut().enumerate() {
            *slot = row.decode_value(idx)?;
        }
        Ok(())
    }

    fn next_result_set(&mut self) -> bool {
        if self.frame_idx + 1 < self.frames.len() {
            self.frame_idx += 1;
            self.row_idx = None;
            true
        } else {
            false
        }
    }

    fn err(&mut self) -> Option<DbError> {
        self.deferred.take()
    }
}
