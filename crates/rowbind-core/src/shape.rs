//! Destination shapes.
//!
//! Every destination type declares its [`Shape`] as an associated constant,
//! so the fill engine picks a strategy at compile time and dispatches with a
//! plain `match` on [`Slot`].
//!
//! - [`Element`] is anything that absorbs exactly one row: a scalar, a
//!   record, a string-keyed map or the raw cells of the row.
//! - [`Destination`] is what a caller hands to the binder: a single
//!   element, a fixed array or a growable `Vec` of elements, optionally
//!   behind `Option`/`Box` indirections that are allocated on demand.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rowbind_error::{BindError, Result};

use crate::config::ParsePolicy;
use crate::convert::{assign, convert_assign};
use crate::record::{Bind, FieldMut, Fields};
use crate::resolver::{ColumnMap, FieldResolver};

/// Classification of a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// One coercible value taken from the first cell.
    Scalar,
    /// Record resolved column by column.
    Record,
    /// String-keyed map, one entry per column.
    Map,
    /// All cells of a row, in column order.
    Cells,
    /// Fixed number of elements.
    Array(usize),
    /// Growable sequence.
    List,
}

impl Shape {
    /// Rows the shape can absorb, `None` when unbounded.
    pub const fn capacity(self) -> Option<usize> {
        match self {
            Self::Array(len) => Some(len),
            Self::List => None,
            Self::Scalar | Self::Record | Self::Map | Self::Cells => Some(1),
        }
    }

    /// Whether the shape is filled from a single row.
    pub const fn is_single(self) -> bool {
        matches!(self.capacity(), Some(1))
    }
}

/// Per-element decoding plan, computed once per fill.
#[derive(Debug, Clone)]
pub enum Layout {
    /// No column resolution required.
    Direct,
    /// Record fields resolved against the column list.
    Fields(Arc<ColumnMap>),
}

/// Everything an element needs to decode one row.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub columns: &'a [String],
    pub layout: &'a Layout,
    pub policy: ParsePolicy,
}

/// A value that absorbs one row.
pub trait Element: Default + Send + 'static {
    const SHAPE: Shape;

    fn layout(_resolver: &FieldResolver, _columns: &[String]) -> Layout {
        Layout::Direct
    }

    fn decode_row(&mut self, ctx: &RowContext<'_>, row: &[Vec<u8>]) -> Result<()>;
}

/// Mutable access to a destination's storage.
pub enum Slot<'a, E> {
    One(&'a mut E),
    Array(&'a mut [E]),
    List(&'a mut Vec<E>),
}

/// A value the binder can fill.
pub trait Destination {
    type Elem: Element;
    const SHAPE: Shape;

    /// Storage to fill, allocating any `Option` indirection on the way.
    fn slot(&mut self) -> Slot<'_, Self::Elem>;
}

// ---------------------------------------------------------------------------
// Row decoders
// ---------------------------------------------------------------------------

/// Coerce the first cell of `row` into `value`.
pub fn decode_scalar<B: Bind>(value: &mut B, ctx: &RowContext<'_>, row: &[Vec<u8>]) -> Result<()> {
    match row.first() {
        Some(cell) => assign(value, cell, ctx.policy),
        None => Ok(()),
    }
}

/// Decode `row` into a freshly defaulted element.
pub(crate) fn decode_fresh<E: Element>(ctx: &RowContext<'_>, row: &[Vec<u8>]) -> Result<E> {
    let mut value = E::default();
    value.decode_row(ctx, row)?;
    Ok(value)
}

/// Assign every mapped column of `row` into `record`.
pub fn decode_record(record: &mut dyn Fields, ctx: &RowContext<'_>, row: &[Vec<u8>]) -> Result<()> {
    let Layout::Fields(map) = ctx.layout else {
        return Err(BindError::unsupported_shape(
            record.type_name(),
            "record decoded without a column map",
        ));
    };
    for (idx, path) in map.slots().iter().enumerate() {
        let (Some(path), Some(cell)) = (path, row.get(idx)) else {
            continue;
        };
        assign_path(record, path, cell, ctx.policy)?;
    }
    Ok(())
}

fn assign_path(
    record: &mut dyn Fields,
    path: &[&'static str],
    raw: &[u8],
    policy: ParsePolicy,
) -> Result<()> {
    let Some((head, rest)) = path.split_first() else {
        return Ok(());
    };
    let type_name = record.type_name();
    match record.field_mut(head) {
        Some(FieldMut::Record(inner)) if !rest.is_empty() => assign_path(inner, rest, raw, policy),
        Some(FieldMut::Scalar(target)) if rest.is_empty() => {
            convert_assign(Some(target), raw, policy)
        }
        Some(FieldMut::Record(inner)) => {
            if raw.is_empty() {
                Ok(())
            } else {
                Err(BindError::unsupported_conversion(raw, inner.type_name()))
            }
        }
        Some(FieldMut::Scalar(_)) => Err(BindError::unsupported_shape(
            type_name,
            format!("field {head} is not a record"),
        )),
        None => Err(BindError::unsupported_shape(
            type_name,
            format!("no field named {head}"),
        )),
    }
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

macro_rules! scalar_shape {
    ($($ty:ty),+ $(,)?) => {$(
        impl Element for $ty {
            const SHAPE: Shape = Shape::Scalar;

            fn decode_row(&mut self, ctx: &RowContext<'_>, row: &[Vec<u8>]) -> Result<()> {
                decode_scalar(self, ctx, row)
            }
        }

        impl Destination for $ty {
            type Elem = Self;
            const SHAPE: Shape = Shape::Scalar;

            fn slot(&mut self) -> Slot<'_, Self> {
                Slot::One(self)
            }
        }
    )+};
}

scalar_shape! {
    bool, String,
    i8, i16, i32, i64, i128, isize,
    u8, u16, u32, u64, u128, usize,
    f32, f64,
    NaiveDateTime, NaiveDate, NaiveTime,
    DateTime<Local>, DateTime<Utc>, DateTime<FixedOffset>,
}

// `Vec<u8>` is a scalar when used as an element; as a destination it is a
// list of `u8` rows.
impl Element for Vec<u8> {
    const SHAPE: Shape = Shape::Scalar;

    fn decode_row(&mut self, ctx: &RowContext<'_>, row: &[Vec<u8>]) -> Result<()> {
        decode_scalar(self, ctx, row)
    }
}

// ---------------------------------------------------------------------------
// Maps and row cells
// ---------------------------------------------------------------------------

/// Cell representation stored in maps and cell rows without coercion.
pub trait CellValue: Default + Send + 'static {
    fn from_cell(raw: &[u8]) -> Self;
}

impl CellValue for String {
    fn from_cell(raw: &[u8]) -> Self {
        String::from_utf8_lossy(raw).into_owned()
    }
}

impl CellValue for Vec<u8> {
    fn from_cell(raw: &[u8]) -> Self {
        raw.to_vec()
    }
}

fn map_entries<'r, V: CellValue>(
    columns: &'r [String],
    row: &'r [Vec<u8>],
) -> impl Iterator<Item = (String, V)> + 'r {
    columns
        .iter()
        .zip(row)
        .map(|(column, cell)| (column.clone(), V::from_cell(cell)))
}

impl<V: CellValue> Element for HashMap<String, V> {
    const SHAPE: Shape = Shape::Map;

    fn decode_row(&mut self, ctx: &RowContext<'_>, row: &[Vec<u8>]) -> Result<()> {
        *self = map_entries(ctx.columns, row).collect();
        Ok(())
    }
}

impl<V: CellValue> Destination for HashMap<String, V> {
    type Elem = Self;
    const SHAPE: Shape = Shape::Map;

    fn slot(&mut self) -> Slot<'_, Self> {
        Slot::One(self)
    }
}

impl<V: CellValue> Element for BTreeMap<String, V> {
    const SHAPE: Shape = Shape::Map;

    fn decode_row(&mut self, ctx: &RowContext<'_>, row: &[Vec<u8>]) -> Result<()> {
        *self = map_entries(ctx.columns, row).collect();
        Ok(())
    }
}

impl<V: CellValue> Destination for BTreeMap<String, V> {
    type Elem = Self;
    const SHAPE: Shape = Shape::Map;

    fn slot(&mut self) -> Slot<'_, Self> {
        Slot::One(self)
    }
}

macro_rules! cells_shape {
    ($($value:ty),+) => {$(
        impl Element for Vec<$value> {
            const SHAPE: Shape = Shape::Cells;

            fn decode_row(&mut self, ctx: &RowContext<'_>, row: &[Vec<u8>]) -> Result<()> {
                self.clear();
                self.extend(row.iter().take(ctx.columns.len()).map(|cell| <$value>::from_cell(cell)));
                Ok(())
            }
        }
    )+};
}

cells_shape!(String, Vec<u8>);

// ---------------------------------------------------------------------------
// Sequences and indirection
// ---------------------------------------------------------------------------

impl<E: Element> Destination for Vec<E> {
    type Elem = E;
    const SHAPE: Shape = Shape::List;

    fn slot(&mut self) -> Slot<'_, E> {
        Slot::List(self)
    }
}

impl<E: Element, const N: usize> Destination for [E; N] {
    type Elem = E;
    const SHAPE: Shape = Shape::Array(N);

    fn slot(&mut self) -> Slot<'_, E> {
        Slot::Array(self)
    }
}

impl<D: Destination + Default> Destination for Option<D> {
    type Elem = D::Elem;
    const SHAPE: Shape = D::SHAPE;

    fn slot(&mut self) -> Slot<'_, D::Elem> {
        self.get_or_insert_with(D::default).slot()
    }
}

impl<D: Destination> Destination for Box<D> {
    type Elem = D::Elem;
    const SHAPE: Shape = D::SHAPE;

    fn slot(&mut self) -> Slot<'_, D::Elem> {
        (**self).slot()
    }
}

impl<E: Element> Element for Option<E> {
    const SHAPE: Shape = E::SHAPE;

    fn layout(resolver: &FieldResolver, columns: &[String]) -> Layout {
        E::layout(resolver, columns)
    }

    fn decode_row(&mut self, ctx: &RowContext<'_>, row: &[Vec<u8>]) -> Result<()> {
        self.insert(E::default()).decode_row(ctx, row)
    }
}

impl<E: Element> Element for Box<E> {
    const SHAPE: Shape = E::SHAPE;

    fn layout(resolver: &FieldResolver, columns: &[String]) -> Layout {
        E::layout(resolver, columns)
    }

    fn decode_row(&mut self, ctx: &RowContext<'_>, row: &[Vec<u8>]) -> Result<()> {
        (**self).decode_row(ctx, row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    fn row(cells: &[&str]) -> Vec<Vec<u8>> {
        cells.iter().map(|cell| cell.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_shape_constants() {
        assert_eq!(<i32 as Destination>::SHAPE, Shape::Scalar);
        assert_eq!(<Vec<i32> as Destination>::SHAPE, Shape::List);
        assert_eq!(<[String; 4] as Destination>::SHAPE, Shape::Array(4));
        assert_eq!(<Option<Box<Vec<i32>>> as Destination>::SHAPE, Shape::List);
        assert_eq!(<HashMap<String, String> as Destination>::SHAPE, Shape::Map);
        assert_eq!(<Vec<Vec<String>> as Destination>::SHAPE, Shape::List);
        assert_eq!(<Vec<String> as Element>::SHAPE, Shape::Cells);
        assert_eq!(<Option<u8> as Element>::SHAPE, Shape::Scalar);
    }

    #[test]
    fn test_capacities() {
        assert_eq!(Shape::Scalar.capacity(), Some(1));
        assert_eq!(Shape::Array(0).capacity(), Some(0));
        assert_eq!(Shape::Array(7).capacity(), Some(7));
        assert_eq!(Shape::List.capacity(), None);
        assert!(Shape::Array(1).is_single());
        assert!(!Shape::List.is_single());
    }

    #[test]
    fn test_option_destination_allocates() {
        let mut dest: Option<Box<Vec<i32>>> = None;
        match dest.slot() {
            Slot::List(items) => items.push(3),
            _ => panic!("expected a list slot"),
        }
        assert_eq!(dest.as_deref().map(Vec::as_slice), Some(&[3][..]));
    }

    #[test]
    fn test_map_takes_cells_verbatim() {
        let columns = cols(&["a", "b"]);
        let layout = Layout::Direct;
        let ctx = RowContext {
            columns: &columns,
            layout: &layout,
            policy: ParsePolicy::Strict,
        };
        let mut map: HashMap<String, String> = HashMap::from([("stale".to_owned(), String::new())]);
        map.decode_row(&ctx, &row(&["1", ""])).expect("map");
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"], "1");
        assert_eq!(map["b"], "");

        let mut bytes: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        bytes.decode_row(&ctx, &row(&["x", "y"])).expect("byte map");
        assert_eq!(bytes["b"], b"y");
    }

    #[test]
    fn test_cells_take_whole_row() {
        let columns = cols(&["a", "b", "c"]);
        let layout = Layout::Direct;
        let ctx = RowContext {
            columns: &columns,
            layout: &layout,
            policy: ParsePolicy::Lenient,
        };
        let mut cells: Vec<String> = vec!["old".to_owned()];
        cells.decode_row(&ctx, &row(&["1", "", "three"])).expect("cells");
        assert_eq!(cells, ["1", "", "three"]);
    }

    #[test]
    fn test_scalar_takes_first_cell() {
        let columns = cols(&["n", "m"]);
        let layout = Layout::Direct;
        let ctx = RowContext {
            columns: &columns,
            layout: &layout,
            policy: ParsePolicy::Strict,
        };
        let mut value = 0_u64;
        value.decode_row(&ctx, &row(&["0x20", "9"])).expect("scalar");
        assert_eq!(value, 32);

        let mut boxed: Option<Box<i16>> = None;
        boxed.decode_row(&ctx, &row(&["-3"])).expect("indirect element");
        assert_eq!(boxed.as_deref(), Some(&-3));
    }

    crate::record! {
        #[derive(Debug, Default, Clone, PartialEq)]
        pub struct Pair {
            pub left: i32,
            pub right: Vec<u8>,
        }
    }

    #[test]
    fn test_record_without_map_is_rejected() {
        let columns = cols(&["left"]);
        let layout = Layout::Direct;
        let ctx = RowContext {
            columns: &columns,
            layout: &layout,
            policy: ParsePolicy::Strict,
        };
        let mut pair = Pair::default();
        let err = decode_record(&mut pair, &ctx, &row(&["1"])).expect_err("needs a map");
        assert!(matches!(err, BindError::UnsupportedShape { .. }));
    }

    #[test]
    fn test_record_decodes_mapped_columns() {
        let resolver = FieldResolver::default();
        let columns = cols(&["right", "skip", "left"]);
        let layout = Pair::layout(&resolver, &columns);
        let ctx = RowContext {
            columns: &columns,
            layout: &layout,
            policy: ParsePolicy::Strict,
        };
        let mut pair = Pair::default();
        pair.decode_row(&ctx, &row(&["raw", "ignored", "-5"])).expect("record");
        assert_eq!(
            pair,
            Pair {
                left: -5,
                right: b"raw".to_vec(),
            }
        );
    }
}
