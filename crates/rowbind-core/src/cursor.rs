//! Row sources.

use rowbind_error::{BindError, Result, SourceError};
use tracing::warn;

/// One row of raw cells. An empty cell is SQL NULL or an empty string.
pub type RawRow = Vec<Vec<u8>>;

/// Rows reserved up front when the caller sets no limit.
pub const DEFAULT_ROW_RESERVE: usize = 1024;

/// A forward-only tabular cursor.
pub trait Cursor {
    /// Move to the next row. `false` when exhausted or on error.
    fn advance(&mut self) -> bool;

    /// Column names of the result set, valid after the first `advance`.
    fn column_names(&mut self) -> std::result::Result<Vec<String>, SourceError>;

    /// Copy the current row into `slots`, one buffer per column.
    fn read_row(&mut self, slots: &mut [Vec<u8>]) -> std::result::Result<(), SourceError>;

    /// Error that ended iteration, if any.
    fn last_error(&mut self) -> Option<SourceError>;

    fn close(&mut self) -> std::result::Result<(), SourceError>;
}

impl<C: Cursor + ?Sized> Cursor for Box<C> {
    fn advance(&mut self) -> bool {
        (**self).advance()
    }

    fn column_names(&mut self) -> std::result::Result<Vec<String>, SourceError> {
        (**self).column_names()
    }

    fn read_row(&mut self, slots: &mut [Vec<u8>]) -> std::result::Result<(), SourceError> {
        (**self).read_row(slots)
    }

    fn last_error(&mut self) -> Option<SourceError> {
        (**self).last_error()
    }

    fn close(&mut self) -> std::result::Result<(), SourceError> {
        (**self).close()
    }
}

/// Combine a destination's row capacity with a caller-supplied cap.
///
/// `None` on either side is unbounded; `Some(0)` fetches nothing.
pub const fn effective_limit(capacity: Option<usize>, caller: Option<usize>) -> Option<usize> {
    match (capacity, caller) {
        (Some(capacity), Some(caller)) => {
            if capacity < caller {
                Some(capacity)
            } else {
                Some(caller)
            }
        }
        (Some(limit), None) | (None, Some(limit)) => Some(limit),
        (None, None) => None,
    }
}

/// Move to the first row and read the column list.
///
/// `Ok(None)` when there is nothing to read.
pub(crate) fn open_result_set<C: Cursor + ?Sized>(
    cursor: &mut C,
    limit: Option<usize>,
) -> Result<Option<Vec<String>>> {
    if limit == Some(0) {
        return Ok(None);
    }
    if !cursor.advance() {
        return match cursor.last_error() {
            Some(err) => Err(BindError::Source(err)),
            None => Ok(None),
        };
    }
    let columns = cursor.column_names().map_err(BindError::Source)?;
    if columns.is_empty() {
        return Ok(None);
    }
    Ok(Some(columns))
}

/// Read the current row into fresh buffers.
pub(crate) fn read_current<C: Cursor + ?Sized>(cursor: &mut C, width: usize) -> Result<RawRow> {
    let mut row = vec![Vec::new(); width];
    cursor.read_row(&mut row).map_err(BindError::Source)?;
    Ok(row)
}

/// Close `cursor` and merge the outcome of consuming it with the close
/// result. The consumption error wins when both fail.
pub(crate) fn close_after<C: Cursor + ?Sized, T>(cursor: &mut C, outcome: Result<T>) -> Result<T> {
    let closed = cursor.close();
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(BindError::Source(err)),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(error = %close_err, "cursor close failed after an earlier error");
            Err(err)
        }
    }
}

/// Read up to `limit` rows. The cursor is left open.
pub fn read_rows<C: Cursor + ?Sized>(
    cursor: &mut C,
    limit: Option<usize>,
) -> Result<(Vec<String>, Vec<RawRow>)> {
    let Some(columns) = open_result_set(cursor, limit)? else {
        return Ok((Vec::new(), Vec::new()));
    };

    let reserve = limit.map_or(DEFAULT_ROW_RESERVE, |limit| limit.min(DEFAULT_ROW_RESERVE));
    let mut rows = Vec::with_capacity(reserve);
    loop {
        rows.push(read_current(cursor, columns.len())?);
        if limit.is_some_and(|limit| rows.len() >= limit) || !cursor.advance() {
            break;
        }
    }
    if let Some(err) = cursor.last_error() {
        return Err(BindError::Source(err));
    }
    Ok((columns, rows))
}

// ---------------------------------------------------------------------------
// In-memory cursor
// ---------------------------------------------------------------------------

/// Cursor over materialized rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryCursor {
    columns: Vec<String>,
    rows: Vec<RawRow>,
    next: usize,
    current: Option<usize>,
    fail_read_at: Option<usize>,
    fail_advance_at: Option<usize>,
    fail_close: bool,
    deferred: Option<String>,
    closed: bool,
}

impl MemoryCursor {
    pub fn new(columns: Vec<String>, rows: Vec<RawRow>) -> Self {
        Self {
            columns,
            rows,
            ..Self::default()
        }
    }

    /// Build from string cells; empty strings become empty cells.
    pub fn from_strs(columns: &[&str], rows: &[&[&str]]) -> Self {
        Self::new(
            columns.iter().map(|c| (*c).to_owned()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.as_bytes().to_vec()).collect())
                .collect(),
        )
    }

    /// Fail `read_row` on the row at `index`.
    #[must_use]
    pub fn fail_read_at(mut self, index: usize) -> Self {
        self.fail_read_at = Some(index);
        self
    }

    /// Stop iteration before the row at `index` and report an error from
    /// `last_error`.
    #[must_use]
    pub fn fail_advance_at(mut self, index: usize) -> Self {
        self.fail_advance_at = Some(index);
        self
    }

    #[must_use]
    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Rows handed out through `advance` so far.
    pub fn rows_advanced(&self) -> usize {
        self.next
    }
}

impl Cursor for MemoryCursor {
    fn advance(&mut self) -> bool {
        if self.closed || self.next >= self.rows.len() {
            self.current = None;
            return false;
        }
        if self.fail_advance_at == Some(self.next) {
            self.current = None;
            self.deferred = Some(format!("cursor failed before row {}", self.next));
            return false;
        }
        self.current = Some(self.next);
        self.next += 1;
        true
    }

    fn column_names(&mut self) -> std::result::Result<Vec<String>, SourceError> {
        if self.closed {
            return Err("cursor is closed".into());
        }
        Ok(self.columns.clone())
    }

    fn read_row(&mut self, slots: &mut [Vec<u8>]) -> std::result::Result<(), SourceError> {
        let Some(index) = self.current else {
            return Err("no current row".into());
        };
        if self.fail_read_at == Some(index) {
            return Err(format!("read failed at row {index}").into());
        }
        let row = &self.rows[index];
        if row.len() != slots.len() {
            return Err(format!("expected {} cells, row has {}", slots.len(), row.len()).into());
        }
        for (slot, cell) in slots.iter_mut().zip(row) {
            slot.clear();
            slot.extend_from_slice(cell);
        }
        Ok(())
    }

    fn last_error(&mut self) -> Option<SourceError> {
        self.deferred.take().map(Into::into)
    }

    fn close(&mut self) -> std::result::Result<(), SourceError> {
        self.closed = true;
        if self.fail_close {
            return Err("close failed".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryCursor {
        MemoryCursor::from_strs(&["a", "b"], &[&["1", "x"], &["2", ""], &["3", "z"]])
    }

    #[test]
    fn test_limits() {
        assert_eq!(effective_limit(None, None), None);
        assert_eq!(effective_limit(Some(5), None), Some(5));
        assert_eq!(effective_limit(None, Some(3)), Some(3));
        assert_eq!(effective_limit(Some(5), Some(3)), Some(3));
        assert_eq!(effective_limit(Some(2), Some(3)), Some(2));
        assert_eq!(effective_limit(Some(0), None), Some(0));
        assert_eq!(effective_limit(None, Some(0)), Some(0));
    }

    #[test]
    fn test_reads_all_rows() {
        let mut cursor = sample();
        let (columns, rows) = read_rows(&mut cursor, None).expect("read");
        assert_eq!(columns, ["a", "b"]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], vec![b"2".to_vec(), Vec::new()]);
        assert!(!cursor.is_closed());
    }

    #[test]
    fn test_stops_at_limit_without_extra_advance() {
        let mut cursor = sample();
        let (_, rows) = read_rows(&mut cursor, Some(2)).expect("read");
        assert_eq!(rows.len(), 2);
        assert_eq!(cursor.rows_advanced(), 2);
    }

    #[test]
    fn test_zero_limit_reads_nothing() {
        let mut cursor = sample();
        let (columns, rows) = read_rows(&mut cursor, Some(0)).expect("read");
        assert!(columns.is_empty());
        assert!(rows.is_empty());
        assert_eq!(cursor.rows_advanced(), 0);
    }

    #[test]
    fn test_empty_result_set() {
        let mut cursor = MemoryCursor::from_strs(&["a"], &[]);
        let (columns, rows) = read_rows(&mut cursor, None).expect("read");
        assert!(columns.is_empty());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_read_error_propagates() {
        let mut cursor = sample().fail_read_at(1);
        let err = read_rows(&mut cursor, None).expect_err("read error");
        assert!(err.is_source());
        assert_eq!(err.to_string(), "source error: read failed at row 1");
    }

    #[test]
    fn test_deferred_error_propagates() {
        let mut cursor = sample().fail_advance_at(2);
        let err = read_rows(&mut cursor, None).expect_err("deferred error");
        assert_eq!(err.to_string(), "source error: cursor failed before row 2");

        let mut cursor = sample().fail_advance_at(0);
        assert!(read_rows(&mut cursor, None).is_err());
    }

    #[test]
    fn test_ragged_row_is_a_source_error() {
        let mut cursor = MemoryCursor::new(
            vec!["a".to_owned(), "b".to_owned()],
            vec![vec![b"1".to_vec()]],
        );
        assert!(read_rows(&mut cursor, None).expect_err("ragged").is_source());
    }

    #[test]
    fn test_boxed_cursor_delegates() {
        let mut cursor: Box<dyn Cursor> = Box::new(sample());
        let (_, rows) = read_rows(&mut cursor, Some(1)).expect("read");
        assert_eq!(rows.len(), 1);
        assert!(cursor.close().is_ok());
    }
}
