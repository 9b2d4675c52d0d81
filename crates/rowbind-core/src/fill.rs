//! The binder: fill entry points for batch, cursor and channel sources.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use rowbind_error::Result;
use tracing::debug;

use crate::config::BindConfig;
use crate::cursor::{Cursor, RawRow, close_after, effective_limit, read_rows};
use crate::naming::{NamingPolicy, TagNaming};
use crate::resolver::{ColumnCache, FieldResolver};
use crate::shape::{Destination, Element, Layout, RowContext, Slot, decode_fresh};
use crate::stream;

/// Fills typed destinations from tabular rows.
///
/// A binder owns a [`FieldResolver`], so the column map for each record type
/// is built once and reused for every later fill with the same column count.
#[derive(Debug)]
pub struct Binder {
    resolver: FieldResolver,
    config: BindConfig,
}

impl Binder {
    pub fn new(naming: impl NamingPolicy + 'static) -> Self {
        Self {
            resolver: FieldResolver::new(naming),
            config: BindConfig::default(),
        }
    }

    /// Binder with explicit configuration.
    pub fn with_config(naming: impl NamingPolicy + 'static, config: BindConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            resolver: FieldResolver::new(naming),
            config,
        })
    }

    /// Binder sharing a column map cache with other binders.
    pub fn with_cache(
        naming: Arc<dyn NamingPolicy>,
        cache: Arc<ColumnCache>,
        config: BindConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            resolver: FieldResolver::with_cache(naming, cache),
            config,
        })
    }

    pub fn resolver(&self) -> &FieldResolver {
        &self.resolver
    }

    pub fn config(&self) -> &BindConfig {
        &self.config
    }

    fn context<'a>(&self, columns: &'a [String], layout: &'a Layout) -> RowContext<'a> {
        RowContext {
            columns,
            layout,
            policy: self.config.parse_policy,
        }
    }

    /// Fill `dest` from materialized rows and return the number of rows used.
    ///
    /// Single-value destinations take the first row. An array takes as many
    /// rows as it has elements; a `Vec` is replaced by one element per row.
    /// The first error aborts the fill and leaves `dest` partially written.
    pub fn fill<D: Destination>(
        &self,
        columns: &[String],
        rows: &[RawRow],
        dest: &mut D,
    ) -> Result<usize> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(0);
        }
        let layout = <D::Elem as Element>::layout(&self.resolver, columns);
        let ctx = self.context(columns, &layout);

        let count = match dest.slot() {
            Slot::One(value) => {
                value.decode_row(&ctx, &rows[0])?;
                1
            }
            Slot::Array(items) => {
                let count = items.len().min(rows.len());
                for (item, row) in items.iter_mut().zip(rows) {
                    *item = decode_fresh(&ctx, row)?;
                }
                count
            }
            Slot::List(items) => {
                items.clear();
                items.reserve(rows.len());
                for row in rows {
                    items.push(decode_fresh(&ctx, row)?);
                }
                rows.len()
            }
        };
        debug!(shape = ?D::SHAPE, rows = count, "filled destination");
        Ok(count)
    }

    /// Fill `dest` from a channel of rows, decoding on `fan_out` workers.
    ///
    /// `fan_out` of 0 or 1 decodes on the calling thread. Elements keep
    /// channel order. Rows that fail to decode are logged and skipped. A
    /// channel that closes without sending a row leaves `dest` untouched.
    pub fn fill_stream<D: Destination>(
        &self,
        columns: &[String],
        rows: Receiver<RawRow>,
        dest: &mut D,
        fan_out: usize,
    ) -> Result<usize> {
        stream::consume(&self.resolver, &self.config, columns, rows, dest, None, fan_out)
    }

    /// Fill `dest` from `cursor` using the configured fan-out, then close the
    /// cursor.
    pub fn scan<C, D>(&self, cursor: &mut C, dest: &mut D) -> Result<usize>
    where
        C: Cursor + Send + ?Sized,
        D: Destination,
    {
        self.scan_with(cursor, dest, None, self.config.fan_out)
    }

    /// Fill `dest` from at most `limit` rows of `cursor`, then close it.
    ///
    /// A `fan_out` of 0 reads every row first and fills synchronously; any
    /// other value streams (see [`Binder::fill_stream`]). Single-row
    /// destinations always use the synchronous path.
    pub fn scan_with<C, D>(
        &self,
        cursor: &mut C,
        dest: &mut D,
        limit: Option<usize>,
        fan_out: usize,
    ) -> Result<usize>
    where
        C: Cursor + Send + ?Sized,
        D: Destination,
    {
        let capacity = D::SHAPE.capacity();
        let limit = effective_limit(capacity, limit);
        let outcome = if fan_out == 0 || D::SHAPE.is_single() {
            self.fill_from(cursor, dest, limit)
        } else {
            stream::scan(&self.resolver, &self.config, cursor, dest, limit, fan_out)
        };
        close_after(cursor, outcome)
    }

    /// Synchronous [`Binder::scan_with`] for cursors that cannot cross threads.
    pub fn scan_batch<C, D>(&self, cursor: &mut C, dest: &mut D, limit: Option<usize>) -> Result<usize>
    where
        C: Cursor + ?Sized,
        D: Destination,
    {
        let limit = effective_limit(D::SHAPE.capacity(), limit);
        let outcome = self.fill_from(cursor, dest, limit);
        close_after(cursor, outcome)
    }

    fn fill_from<C, D>(&self, cursor: &mut C, dest: &mut D, limit: Option<usize>) -> Result<usize>
    where
        C: Cursor + ?Sized,
        D: Destination,
    {
        let (columns, rows) = read_rows(cursor, limit)?;
        self.fill(&columns, &rows, dest)
    }
}

impl Default for Binder {
    fn default() -> Self {
        Self::new(TagNaming::default())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rowbind_error::BindError;

    use super::*;
    use crate::config::ParsePolicy;
    use crate::cursor::MemoryCursor;

    crate::record! {
        #[derive(Debug, Default, Clone, PartialEq)]
        pub struct Point {
            pub x: i32,
            pub y: i32,
        }
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    fn rows(cells: &[&[&str]]) -> Vec<RawRow> {
        cells
            .iter()
            .map(|row| row.iter().map(|cell| cell.as_bytes().to_vec()).collect())
            .collect()
    }

    #[test]
    fn test_empty_input_is_noop() {
        let binder = Binder::default();
        let mut dest = vec![Point::default()];
        assert_eq!(binder.fill(&cols(&["x"]), &[], &mut dest).expect("fill"), 0);
        assert_eq!(binder.fill(&[], &rows(&[&["1"]]), &mut dest).expect("fill"), 0);
        assert_eq!(dest.len(), 1);
    }

    #[test]
    fn test_single_record_takes_first_row() {
        let binder = Binder::default();
        let mut point = Point { x: 9, y: 9 };
        let count = binder
            .fill(&cols(&["x"]), &rows(&[&["1"], &["2"]]), &mut point)
            .expect("fill");
        assert_eq!(count, 1);
        // unmapped fields keep their value
        assert_eq!(point, Point { x: 1, y: 9 });
    }

    #[test]
    fn test_array_fills_available_rows_only() {
        let binder = Binder::default();
        let mut dest = [Point { x: -1, y: -1 }, Point { x: -1, y: -1 }, Point { x: -1, y: -1 }];
        let count = binder
            .fill(&cols(&["x", "y"]), &rows(&[&["1", "2"], &["3", "4"]]), &mut dest)
            .expect("fill");
        assert_eq!(count, 2);
        assert_eq!(dest[0], Point { x: 1, y: 2 });
        assert_eq!(dest[1], Point { x: 3, y: 4 });
        assert_eq!(dest[2], Point { x: -1, y: -1 });
    }

    #[test]
    fn test_list_is_replaced() {
        let binder = Binder::default();
        let mut dest = vec![Point { x: 5, y: 5 }; 4];
        binder
            .fill(&cols(&["y"]), &rows(&[&["1"], &["2"]]), &mut dest)
            .expect("fill");
        assert_eq!(dest, [Point { x: 0, y: 1 }, Point { x: 0, y: 2 }]);
    }

    #[test]
    fn test_strict_policy_aborts_fill() {
        let config = BindConfig {
            parse_policy: ParsePolicy::Strict,
            ..BindConfig::default()
        };
        let binder = Binder::with_config(TagNaming::default(), config).expect("valid config");
        let mut dest: Vec<Point> = Vec::new();
        let err = binder
            .fill(&cols(&["x"]), &rows(&[&["1"], &["nope"], &["3"]]), &mut dest)
            .expect_err("strict");
        assert!(matches!(err, BindError::UnsupportedConversion { target: "i32", .. }));
        assert_eq!(dest, [Point { x: 1, y: 0 }]);
    }

    #[test]
    fn test_scan_closes_cursor_in_both_modes() {
        let binder = Binder::default();
        for fan_out in [0, 1, 4] {
            let mut cursor = MemoryCursor::from_strs(&["x", "y"], &[&["1", "2"], &["3", "4"]]);
            let mut dest: Vec<Point> = Vec::new();
            let count = binder
                .scan_with(&mut cursor, &mut dest, None, fan_out)
                .expect("scan");
            assert_eq!(count, 2);
            assert_eq!(dest[1], Point { x: 3, y: 4 });
            assert!(cursor.is_closed());
        }
    }

    #[test]
    fn test_close_error_is_reported() {
        let binder = Binder::default();
        let mut cursor = MemoryCursor::from_strs(&["x"], &[&["1"]]).fail_close();
        let mut point = Point::default();
        let err = binder.scan(&mut cursor, &mut point).expect_err("close error");
        assert!(err.is_source());
        assert_eq!(point.x, 1);
    }

    #[test]
    fn test_read_error_wins_over_close_error() {
        let binder = Binder::default();
        let mut cursor = MemoryCursor::from_strs(&["x"], &[&["1"], &["2"]])
            .fail_read_at(1)
            .fail_close();
        let mut dest: Vec<Point> = Vec::new();
        let err = binder.scan(&mut cursor, &mut dest).expect_err("read error");
        assert_eq!(err.to_string(), "source error: read failed at row 1");
        assert!(cursor.is_closed());
    }

    #[test]
    fn test_scalar_and_map_destinations_read_one_row() {
        let binder = Binder::default();
        let mut cursor = MemoryCursor::from_strs(&["n", "m"], &[&["7", "8"], &["9", "10"]]);
        let mut n: Option<u8> = None;
        assert_eq!(binder.scan_with(&mut cursor, &mut n, None, 8).expect("scan"), 1);
        assert_eq!(n, Some(7));
        assert_eq!(cursor.rows_advanced(), 1);

        let mut cursor = MemoryCursor::from_strs(&["n", "m"], &[&["7", "8"]]);
        let mut map: HashMap<String, String> = HashMap::new();
        binder.scan(&mut cursor, &mut map).expect("scan");
        assert_eq!(map["m"], "8");
    }

    #[test]
    fn test_caller_limit_caps_list() {
        let binder = Binder::default();
        let mut cursor = MemoryCursor::from_strs(&["x"], &[&["1"], &["2"], &["3"]]);
        let mut dest: Vec<i64> = Vec::new();
        binder.scan_batch(&mut cursor, &mut dest, Some(2)).expect("scan");
        assert_eq!(dest, [1, 2]);

        let mut cursor = MemoryCursor::from_strs(&["x"], &[&["1"]]);
        let mut dest: Vec<i64> = vec![5];
        assert_eq!(binder.scan_with(&mut cursor, &mut dest, Some(0), 0).expect("scan"), 0);
        assert_eq!(dest, [5]);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = BindConfig::default();
        config.stream.queue_capacity = 0;
        let err = Binder::with_config(TagNaming::default(), config).expect_err("invalid");
        assert!(matches!(err, BindError::InvalidConfig { .. }));
    }
}
