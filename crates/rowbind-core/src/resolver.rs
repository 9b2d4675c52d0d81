//! Column-to-field resolution with a per-type cache.
//!
//! A [`ColumnMap`] has one slot per source column. A slot holds the path of
//! field names from the record root, through embedded records, to the field
//! that receives that column, or nothing when no field claims the column.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::naming::{NamingPolicy, TagNaming};
use crate::record::{FieldDef, Record};

/// Field names leading from the record root to a leaf field.
pub type FieldPath = Vec<&'static str>;

/// Column position to field path mapping for one record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    type_name: &'static str,
    slots: Vec<Option<FieldPath>>,
}

impl ColumnMap {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Number of columns this map was built for.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Option<FieldPath>] {
        &self.slots
    }

    pub fn slot(&self, column: usize) -> Option<&[&'static str]> {
        self.slots.get(column)?.as_deref()
    }

    /// Number of columns that resolved to a field.
    pub fn bound(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Build the column map for `fields` against `columns`.
///
/// When a column name repeats, the last position wins the lookup. When two
/// fields claim the same column, the first one in depth-first declaration
/// order keeps it.
pub fn build_column_map(
    type_name: &'static str,
    fields: &[FieldDef],
    columns: &[String],
    naming: &dyn NamingPolicy,
) -> ColumnMap {
    let lookup: HashMap<&str, usize> = columns
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();
    let mut slots = vec![None; columns.len()];
    let mut prefix = Vec::new();
    bind_fields(fields, &mut prefix, &lookup, &mut slots, naming);
    ColumnMap { type_name, slots }
}

fn bind_fields(
    fields: &[FieldDef],
    prefix: &mut Vec<&'static str>,
    lookup: &HashMap<&str, usize>,
    slots: &mut [Option<FieldPath>],
    naming: &dyn NamingPolicy,
) -> bool {
    let mut bound = false;
    for field in fields {
        let Some(claimed) = naming.column_name(field).filter(|name| !name.is_empty()) else {
            continue;
        };

        if let Some(children) = field.nested_fields() {
            prefix.push(field.name);
            let nested_bound = bind_fields(&children, prefix, lookup, slots, naming);
            prefix.pop();
            if nested_bound {
                bound = true;
                continue;
            }
        }

        if !field.exported {
            continue;
        }

        if let Some(&idx) = lookup.get(claimed.as_str()) {
            if slots[idx].is_none() {
                let mut path = prefix.clone();
                path.push(field.name);
                slots[idx] = Some(path);
                bound = true;
            }
        }
    }
    bound
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Memoized column maps keyed by record type.
///
/// An entry is only reused for a column list of the same length; any other
/// length rebuilds and replaces it.
#[derive(Debug, Default)]
pub struct ColumnCache {
    entries: RwLock<HashMap<TypeId, Arc<ColumnMap>>>,
}

impl ColumnCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, key: TypeId, columns: usize) -> Option<Arc<ColumnMap>> {
        let entries = self.entries.read();
        let map = entries.get(&key)?;
        if map.len() == columns {
            Some(Arc::clone(map))
        } else {
            debug!(
                record = map.type_name(),
                cached = map.len(),
                columns,
                "column map length mismatch, rebuilding"
            );
            None
        }
    }

    fn store(&self, key: TypeId, map: Arc<ColumnMap>) {
        self.entries.write().insert(key, map);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

/// Resolves record fields to source columns through a naming policy.
pub struct FieldResolver {
    cache: Arc<ColumnCache>,
    naming: Arc<dyn NamingPolicy>,
}

impl FieldResolver {
    pub fn new(naming: impl NamingPolicy + 'static) -> Self {
        Self::with_cache(Arc::new(naming), Arc::new(ColumnCache::new()))
    }

    /// Share a cache between resolvers. Every resolver sharing a cache must
    /// use the same naming policy, since entries are keyed by type alone.
    pub fn with_cache(naming: Arc<dyn NamingPolicy>, cache: Arc<ColumnCache>) -> Self {
        Self { cache, naming }
    }

    pub fn cache(&self) -> &Arc<ColumnCache> {
        &self.cache
    }

    pub fn naming(&self) -> &dyn NamingPolicy {
        self.naming.as_ref()
    }

    /// Column map for `R` against `columns`, built on first use.
    pub fn resolve<R: Record>(&self, columns: &[String]) -> Arc<ColumnMap> {
        let key = TypeId::of::<R>();
        if let Some(map) = self.cache.lookup(key, columns.len()) {
            return map;
        }

        let type_name = std::any::type_name::<R>();
        let map = Arc::new(build_column_map(
            type_name,
            &R::fields(),
            columns,
            self.naming.as_ref(),
        ));
        debug!(
            record = type_name,
            columns = columns.len(),
            bound = map.bound(),
            "built column map"
        );
        self.cache.store(key, Arc::clone(&map));
        map
    }
}

impl Default for FieldResolver {
    fn default() -> Self {
        Self::new(TagNaming::default())
    }
}

impl fmt::Debug for FieldResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldResolver")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
