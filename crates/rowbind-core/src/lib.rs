//! Binding engine for tabular query results.
//!
//! Rows arrive as a list of column names plus one raw byte buffer per cell.
//! The engine resolves columns to record fields ([`resolver`]), coerces the
//! bytes into typed values ([`convert`]) and fills whatever destination the
//! caller hands over ([`shape`], [`fill`]), either in one batch or streamed
//! through a worker pool ([`stream`]).

pub mod config;
pub mod convert;
pub mod cursor;
pub mod fill;
pub mod naming;
pub mod record;
pub mod resolver;
pub mod shape;
pub mod stream;
pub mod table;

pub use config::{BindConfig, ParsePolicy, StreamConfig};
pub use convert::{ScanBytes, Target, convert_assign};
pub use cursor::{Cursor, MemoryCursor, RawRow, effective_limit, read_rows};
pub use fill::Binder;
pub use naming::{Fallback, NamingPolicy, SnakeCaseNaming, TagNaming, to_hump, to_snake};
pub use record::{Bind, FieldDef, Record};
pub use resolver::{ColumnCache, ColumnMap, FieldResolver};
pub use rowbind_error::{BindError, Result, SourceError};
pub use shape::{Destination, Element, Shape};
pub use stream::{ReaderHandle, spawn_reader};
pub use table::{rows_to_byte_maps, rows_to_string_maps, rows_to_table};
