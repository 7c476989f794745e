//! Per-connection cache of table column metadata.
//!
//! Entries are shared with the statements that bound them through
//! [`ColumnInfoHandle`]. The cache keeps one handle of its own, so an entry
//! is referenced by statements exactly when its strong count exceeds one.
//! Only unreferenced entries are ever recycled, least recently used first,
//! and only once the cache holds at least the recycle threshold.

use std::collections::{HashMap, TryReserveError};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tracing::debug;

use crate::catalog::{CatalogColumn, Oid, RelationFlags, TableColumns, UniqueKey};
use crate::ident::Ident;

/// Default cache size past which unreferenced entries are recycled.
pub const DEFAULT_RECYCLE_THRESHOLD: usize = 128;

/// Relation facts fetched on demand for the oid check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationInfo {
    /// `relhasoids`/`relhassubclass`.
    pub flags: RelationFlags,
    /// Fallback identifying key when the table has no oids.
    pub unique_key: Option<UniqueKey>,
    /// Primary key columns in key order.
    pub primary_key: Vec<Ident>,
}

/// The memoized catalog answer for one table.
#[derive(Debug)]
pub struct CachedColumnMetadata {
    schema: Ident,
    table: Ident,
    oid: Oid,
    columns: Vec<CatalogColumn>,
    relation: OnceLock<RelationInfo>,
}

impl CachedColumnMetadata {
    fn new(columns: TableColumns) -> Self {
        Self {
            schema: columns.schema,
            table: columns.table,
            oid: columns.oid,
            columns: columns.columns,
            relation: OnceLock::new(),
        }
    }

    /// Schema the table lives in.
    #[must_use]
    pub const fn schema(&self) -> &Ident {
        &self.schema
    }

    /// Table name as the catalog spells it.
    #[must_use]
    pub const fn table(&self) -> &Ident {
        &self.table
    }

    /// Table OID.
    #[must_use]
    pub const fn oid(&self) -> Oid {
        self.oid
    }

    /// Columns in catalog order.
    #[must_use]
    pub fn columns(&self) -> &[CatalogColumn] {
        &self.columns
    }

    /// Finds a column by its exact catalog name.
    #[must_use]
    pub fn column(&self, name: &Ident) -> Option<&CatalogColumn> {
        self.columns.iter().find(|c| &c.name == name)
    }

    /// Finds a column by attribute number.
    #[must_use]
    pub fn column_by_attnum(&self, attnum: i16) -> Option<&CatalogColumn> {
        self.columns.iter().find(|c| c.attnum == attnum)
    }

    /// Relation facts, if the oid check has run for this entry.
    #[must_use]
    pub fn relation_info(&self) -> Option<&RelationInfo> {
        self.relation.get()
    }

    /// Records relation facts. The first recorded value is final.
    pub(crate) fn set_relation_info(&self, info: RelationInfo) {
        // Losing the race means another statement stored the same facts.
        let _ = self.relation.set(info);
    }

    fn matches_name(&self, schema: &Ident, table: &Ident) -> bool {
        &self.schema == schema && &self.table == table
    }
}

/// A counted reference to a cache entry held by a table descriptor.
///
/// Dropping the handle releases the reference.
#[derive(Clone)]
pub struct ColumnInfoHandle(Arc<CachedColumnMetadata>);

impl ColumnInfoHandle {
    /// Returns true if both handles point at the same cache entry.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl Deref for ColumnInfoHandle {
    type Target = CachedColumnMetadata;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for ColumnInfoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnInfoHandle")
            .field("schema", &self.0.schema)
            .field("table", &self.0.table)
            .field("oid", &self.0.oid)
            .finish()
    }
}

/// Two handles are equal when they point at the same entry.
impl PartialEq for ColumnInfoHandle {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl Eq for ColumnInfoHandle {}

/// Counters for cache activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that missed.
    pub misses: u64,
    /// Inserts that collapsed onto an existing entry.
    pub collapsed: u64,
    /// Entries recycled to make room.
    pub evictions: u64,
    /// Entries dropped by explicit invalidation.
    pub invalidations: u64,
}

#[derive(Debug)]
struct Slot {
    entry: Arc<CachedColumnMetadata>,
    last_access: u64,
}

impl Slot {
    fn references(&self) -> usize {
        Arc::strong_count(&self.entry) - 1
    }
}

/// LRU cache of table column metadata keyed by OID and by schema plus name.
#[derive(Debug)]
pub struct MetadataCache {
    slots: Vec<Slot>,
    threshold: usize,
    /// Unqualified names the search path resolved outside the current
    /// schema, by table name.
    search_path: HashMap<Ident, Oid>,
    /// Logical clock for LRU ordering.
    tick: u64,
    stats: CacheStats,
}

impl MetadataCache {
    /// Creates an empty cache with the given recycle threshold.
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            slots: Vec::new(),
            threshold,
            search_path: HashMap::new(),
            tick: 0,
            stats: CacheStats {
                hits: 0,
                misses: 0,
                collapsed: 0,
                evictions: 0,
                invalidations: 0,
            },
        }
    }

    /// Number of cached tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The recycle threshold.
    #[must_use]
    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    /// Activity counters.
    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }

    fn touch(&mut self, index: usize) -> ColumnInfoHandle {
        self.tick += 1;
        let slot = &mut self.slots[index];
        slot.last_access = self.tick;
        ColumnInfoHandle(Arc::clone(&slot.entry))
    }

    /// Looks up a table by schema and name and takes a reference to it.
    pub fn lookup(&mut self, schema: &Ident, table: &Ident) -> Option<ColumnInfoHandle> {
        let found = self
            .slots
            .iter()
            .position(|slot| slot.entry.matches_name(schema, table));
        self.record_lookup(found)
    }

    /// Looks up an unqualified table name: first in `current_schema`, then
    /// wherever the search path resolved it last time.
    pub fn lookup_unqualified(
        &mut self,
        current_schema: &Ident,
        table: &Ident,
    ) -> Option<ColumnInfoHandle> {
        let found = self
            .slots
            .iter()
            .position(|slot| slot.entry.matches_name(current_schema, table))
            .or_else(|| {
                let oid = *self.search_path.get(table)?;
                self.slots.iter().position(|slot| slot.entry.oid == oid)
            });
        self.record_lookup(found)
    }

    /// Records that the unqualified name `table` resolved to `oid` through
    /// the search path.
    pub fn remember_search_path(&mut self, table: Ident, oid: Oid) {
        self.search_path.insert(table, oid);
    }

    /// Looks up a table by OID and takes a reference to it.
    pub fn lookup_oid(&mut self, oid: Oid) -> Option<ColumnInfoHandle> {
        let found = self.slots.iter().position(|slot| slot.entry.oid == oid);
        self.record_lookup(found)
    }

    fn record_lookup(&mut self, found: Option<usize>) -> Option<ColumnInfoHandle> {
        if let Some(index) = found {
            self.stats.hits += 1;
            Some(self.touch(index))
        } else {
            self.stats.misses += 1;
            None
        }
    }

    /// Stores a catalog answer and takes a reference to it.
    ///
    /// An answer for a table that is already cached (same OID, or same
    /// schema and name) collapses onto the existing entry instead of
    /// creating a second one.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot list cannot grow.
    pub fn insert(&mut self, columns: TableColumns) -> Result<ColumnInfoHandle, TryReserveError> {
        let existing = self.slots.iter().position(|slot| {
            (columns.oid != 0 && slot.entry.oid == columns.oid)
                || slot.entry.matches_name(&columns.schema, &columns.table)
        });
        if let Some(index) = existing {
            self.stats.collapsed += 1;
            debug!(oid = columns.oid, table = %columns.table, "Collapsed onto cached table");
            return Ok(self.touch(index));
        }

        if self.slots.len() >= self.threshold {
            self.recycle();
        }
        self.slots.try_reserve(1)?;
        self.slots.push(Slot {
            entry: Arc::new(CachedColumnMetadata::new(columns)),
            last_access: 0,
        });
        Ok(self.touch(self.slots.len() - 1))
    }

    /// Drops the least recently used unreferenced entry, if any.
    fn recycle(&mut self) {
        let victim = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.references() == 0)
            .min_by_key(|(_, slot)| slot.last_access)
            .map(|(index, _)| index);
        if let Some(index) = victim {
            let slot = self.slots.swap_remove(index);
            self.forget_search_path(slot.entry.oid);
            self.stats.evictions += 1;
            debug!(
                oid = slot.entry.oid,
                table = %slot.entry.table,
                "Recycled cached table"
            );
        }
    }

    /// Drops the entry for `oid`. Statements holding a handle keep their
    /// snapshot. Returns true if an entry was dropped.
    pub fn invalidate_oid(&mut self, oid: Oid) -> bool {
        let found = self.slots.iter().position(|slot| slot.entry.oid == oid);
        self.remove(found)
    }

    /// Drops the entry for `schema.table`. Returns true if an entry was dropped.
    pub fn invalidate_table(&mut self, schema: &Ident, table: &Ident) -> bool {
        let found = self
            .slots
            .iter()
            .position(|slot| slot.entry.matches_name(schema, table));
        self.remove(found)
    }

    fn remove(&mut self, found: Option<usize>) -> bool {
        let Some(index) = found else {
            return false;
        };
        let slot = self.slots.swap_remove(index);
        self.forget_search_path(slot.entry.oid);
        self.stats.invalidations += 1;
        debug!(oid = slot.entry.oid, refs = slot.references(), "Invalidated cached table");
        true
    }

    fn forget_search_path(&mut self, oid: Oid) {
        self.search_path.retain(|_, resolved| *resolved != oid);
    }

    /// Number of statement references to the entry for `schema.table`.
    #[must_use]
    pub fn references(&self, schema: &Ident, table: &Ident) -> Option<usize> {
        self.slots
            .iter()
            .find(|slot| slot.entry.matches_name(schema, table))
            .map(Slot::references)
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.search_path.clear();
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(DEFAULT_RECYCLE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, oid: Oid) -> TableColumns {
        TableColumns {
            schema: Ident::from("public"),
            table: Ident::from(name),
            oid,
            columns: vec![CatalogColumn::new("id", 1, 23)],
        }
    }

    fn public() -> Ident {
        Ident::from("public")
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut cache = MetadataCache::default();
        let handle = cache.insert(table("t", 100)).unwrap();
        let again = cache.lookup(&public(), &Ident::from("t")).unwrap();
        assert!(ColumnInfoHandle::ptr_eq(&handle, &again));
        assert_eq!(cache.references(&public(), &Ident::from("t")), Some(2));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_insert_collapses_by_oid_and_name() {
        let mut cache = MetadataCache::default();
        let a = cache.insert(table("t", 100)).unwrap();
        let b = cache.insert(table("t", 100)).unwrap();
        let mut renamed = table("t_renamed", 100);
        renamed.schema = Ident::from("other");
        let c = cache.insert(renamed).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(ColumnInfoHandle::ptr_eq(&a, &b));
        assert!(ColumnInfoHandle::ptr_eq(&a, &c));
        assert_eq!(cache.stats().collapsed, 2);
    }

    #[test]
    fn test_dropping_handle_releases_reference() {
        let mut cache = MetadataCache::default();
        let handle = cache.insert(table("t", 100)).unwrap();
        assert_eq!(cache.references(&public(), &Ident::from("t")), Some(1));
        drop(handle);
        assert_eq!(cache.references(&public(), &Ident::from("t")), Some(0));
    }

    #[test]
    fn test_recycles_least_recently_used_unreferenced() {
        let mut cache = MetadataCache::new(2);
        drop(cache.insert(table("a", 1)).unwrap());
        drop(cache.insert(table("b", 2)).unwrap());
        // Touch "a" so "b" becomes the oldest.
        drop(cache.lookup_oid(1).unwrap());
        drop(cache.insert(table("c", 3)).unwrap());
        assert_eq!(cache.len(), 2);
        assert!(cache.lookup_oid(2).is_none());
        assert!(cache.lookup_oid(1).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_referenced_entries_are_never_recycled() {
        let mut cache = MetadataCache::new(1);
        let held = cache.insert(table("a", 1)).unwrap();
        let other = cache.insert(table("b", 2)).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(held.oid(), 1);
        assert_eq!(other.oid(), 2);
    }

    #[test]
    fn test_invalidate_keeps_snapshot() {
        let mut cache = MetadataCache::default();
        let handle = cache.insert(table("t", 100)).unwrap();
        assert!(cache.invalidate_oid(100));
        assert!(!cache.invalidate_oid(100));
        assert!(cache.is_empty());
        assert_eq!(handle.columns().len(), 1);

        let fresh = cache.insert(table("t", 100)).unwrap();
        assert!(!ColumnInfoHandle::ptr_eq(&handle, &fresh));
        assert!(cache.invalidate_table(&public(), &Ident::from("t")));
    }

    #[test]
    fn test_unqualified_lookup_follows_search_path() {
        let mut cache = MetadataCache::default();
        let mut audit = table("audit", 200);
        audit.schema = Ident::from("logs");
        drop(cache.insert(audit).unwrap());
        let name = Ident::from("audit");

        assert!(cache.lookup_unqualified(&public(), &name).is_none());
        cache.remember_search_path(name.clone(), 200);
        let handle = cache.lookup_unqualified(&public(), &name).unwrap();
        assert_eq!(handle.schema(), "logs");
        assert_eq!(cache.stats().hits, 1);

        drop(handle);
        assert!(cache.invalidate_oid(200));
        cache.insert(table("other", 200)).unwrap();
        assert!(cache.lookup_unqualified(&public(), &name).is_none());
    }

    #[test]
    fn test_relation_info_is_set_once() {
        let mut cache = MetadataCache::default();
        let handle = cache.insert(table("t", 100)).unwrap();
        assert!(handle.relation_info().is_none());
        let info = RelationInfo {
            flags: RelationFlags {
                has_oids: true,
                has_subclass: false,
            },
            unique_key: None,
            primary_key: vec![],
        };
        handle.set_relation_info(info.clone());
        handle.set_relation_info(RelationInfo {
            flags: RelationFlags::default(),
            unique_key: None,
            primary_key: vec![],
        });
        assert_eq!(handle.relation_info(), Some(&info));
    }

    #[test]
    fn test_column_lookup() {
        let mut cache = MetadataCache::default();
        let handle = cache.insert(table("t", 100)).unwrap();
        assert_eq!(handle.column(&Ident::from("id")).unwrap().attnum, 1);
        assert!(handle.column(&Ident::from("ID")).is_none());
        assert!(handle.column_by_attnum(1).is_some());
    }
}
