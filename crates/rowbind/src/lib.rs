//! Public API facade for rowbind.
//!
//! Bind the rows of a query result into typed values: scalars, records
//! declared with [`record!`], string-keyed maps, raw cell rows and arrays or
//! `Vec`s of any of those, optionally behind `Option`/`Box`.
//!
//! ```ignore
//! use rowbind::{Binder, MemoryCursor, record};
//!
//! record! {
//!     #[derive(Debug, Default)]
//!     pub struct User {
//!         #[tag(sql = "user_id")]
//!         pub id: i64,
//!         pub name: String,
//!     }
//! }
//!
//! let mut cursor = MemoryCursor::from_strs(&["user_id", "name"], &[&["7", "ada"]]);
//! let mut users: Vec<User> = Vec::new();
//! Binder::default().scan(&mut cursor, &mut users)?;
//! ```

pub use rowbind_core::{
    BindConfig, Binder, ColumnCache, Cursor, Destination, Element, Fallback, FieldDef,
    FieldResolver, MemoryCursor, NamingPolicy, ParsePolicy, RawRow, ReaderHandle, Record,
    ScanBytes, Shape, SnakeCaseNaming, StreamConfig, TagNaming, effective_limit, read_rows,
    record, rows_to_byte_maps, rows_to_string_maps, rows_to_table, scan_bytes_type, spawn_reader,
    to_hump, to_snake,
};
pub use rowbind_core::{config, convert, cursor, naming, resolver, shape, stream, table};
pub use rowbind_error::{BindError, Result, SourceError};
