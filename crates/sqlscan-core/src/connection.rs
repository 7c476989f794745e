//! Connection context shared by every statement on one backend connection.
//!
//! A connection owns the catalog service, the options, and the mutable
//! per-connection state (metadata cache, current schema, resolved
//! encoding). The state sits behind a reentrant lock: a catalog service may
//! call back into the connection while a lookup already holds it. Inner
//! `RefCell` borrows are always released before calling the catalog.

use std::cell::RefCell;

use parking_lot::ReentrantMutex;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, ColumnInfoHandle, MetadataCache, RelationInfo};
use crate::catalog::{CatalogService, Oid};
use crate::config::ConnectionOptions;
use crate::encoding::Encoding;
use crate::error::{CatalogError, ParseError};
use crate::ident::Ident;

#[derive(Debug)]
struct ConnectionState {
    cache: MetadataCache,
    current_schema: Option<Ident>,
    encoding: Option<Encoding>,
}

/// A backend connection as seen by the scanner.
#[derive(Debug)]
pub struct Connection<C> {
    catalog: C,
    options: ConnectionOptions,
    state: ReentrantMutex<RefCell<ConnectionState>>,
}

impl<C: CatalogService> Connection<C> {
    /// Creates a connection context over a catalog service.
    #[must_use]
    pub fn new(catalog: C, options: ConnectionOptions) -> Self {
        let cache = MetadataCache::new(options.cache_recycle_threshold);
        Self {
            catalog,
            options,
            state: ReentrantMutex::new(RefCell::new(ConnectionState {
                cache,
                current_schema: None,
                encoding: None,
            })),
        }
    }

    /// The catalog service.
    #[must_use]
    pub const fn catalog(&self) -> &C {
        &self.catalog
    }

    /// The connection options.
    #[must_use]
    pub const fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Returns the client encoding, resolving it on first use.
    ///
    /// The explicit option wins, then the server's `pg_client_encoding()`,
    /// then the process locale. Unknown names and failed probes fall back
    /// to single-byte.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        let guard = self.state.lock();
        if let Some(encoding) = guard.borrow().encoding {
            return encoding;
        }

        let name = match &self.options.client_encoding {
            Some(name) => Some(name.clone()),
            None => match self.catalog.client_encoding() {
                Ok(name) => name,
                Err(err) => {
                    warn!(error = %err, "Cannot read client encoding from server");
                    None
                }
            },
        };

        let encoding = match name {
            Some(name) => Encoding::from_name(&name).unwrap_or_else(|| {
                warn!(encoding = %name, "Unknown client encoding, treating as single-byte");
                Encoding::SingleByte
            }),
            None => Encoding::from_env().unwrap_or_default(),
        };
        info!(encoding = ?encoding, "Resolved client encoding");
        guard.borrow_mut().encoding = Some(encoding);
        encoding
    }

    /// Returns the current schema, asking the server on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the server round trip fails.
    pub fn current_schema(&self) -> Result<Ident, CatalogError> {
        let guard = self.state.lock();
        if let Some(schema) = guard.borrow().current_schema.clone() {
            return Ok(schema);
        }
        self.refresh_current_schema()
    }

    /// Asks the server for the current schema again and caches the answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the server round trip fails.
    pub fn refresh_current_schema(&self) -> Result<Ident, CatalogError> {
        let guard = self.state.lock();
        let schema = self.catalog.current_schema()?;
        debug!(schema = %schema, "Fetched current schema");
        guard.borrow_mut().current_schema = Some(schema.clone());
        Ok(schema)
    }

    /// Returns the cached column metadata of `schema.table`, fetching it
    /// from the catalog on a miss. A missing schema means the current
    /// schema; if the table is not there the search path gets a second try.
    ///
    /// Returns `Ok(None)` when the catalog does not know the table.
    pub(crate) fn table_columns(
        &self,
        schema: Option<&Ident>,
        table: &Ident,
    ) -> Result<Option<ColumnInfoHandle>, ParseError> {
        let guard = self.state.lock();
        let lookup_schema = match schema {
            Some(schema) => schema.clone(),
            None => self.current_schema()?,
        };

        let cached = if schema.is_some() {
            guard.borrow_mut().cache.lookup(&lookup_schema, table)
        } else {
            guard.borrow_mut().cache.lookup_unqualified(&lookup_schema, table)
        };
        if let Some(handle) = cached {
            debug!(schema = %lookup_schema, table = %table, "Column metadata cache hit");
            return Ok(Some(handle));
        }

        debug!(schema = %lookup_schema, table = %table, "Looking up columns");
        let mut found = self
            .catalog
            .lookup_columns(Some(&lookup_schema), Some(table), None)?;
        let mut via_search_path = false;
        if found.is_none() && schema.is_none() {
            debug!(table = %table, "Retrying column lookup through the search path");
            found = self.catalog.lookup_columns(None, Some(table), None)?;
            via_search_path = true;
        }

        let Some(columns) = found else {
            return Ok(None);
        };
        let mut state = guard.borrow_mut();
        let handle = state.cache.insert(columns)?;
        if via_search_path {
            state.cache.remember_search_path(table.clone(), handle.oid());
        }
        Ok(Some(handle))
    }

    /// Makes sure the relation facts of a cached table are loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if a catalog probe fails.
    pub(crate) fn ensure_relation_info(&self, handle: &ColumnInfoHandle) -> Result<(), CatalogError> {
        let _guard = self.state.lock();
        if handle.relation_info().is_some() {
            return Ok(());
        }
        let oid = handle.oid();
        let flags = self.catalog.lookup_relation_flags(oid)?;
        let unique_key = if flags.has_oids {
            None
        } else {
            self.catalog.lookup_unique_key(oid)?
        };
        let primary_key = self.catalog.lookup_primary_key(oid)?;
        debug!(
            oid,
            has_oids = flags.has_oids,
            has_subclass = flags.has_subclass,
            unique_key = ?unique_key.as_ref().map(|k| &k.column),
            "Loaded relation info"
        );
        handle.set_relation_info(RelationInfo {
            flags,
            unique_key,
            primary_key,
        });
        Ok(())
    }

    /// Drops the cached metadata of a table by OID, e.g. after `DROP TABLE`.
    /// Returns true if an entry was dropped.
    pub fn invalidate_oid(&self, oid: Oid) -> bool {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.cache.invalidate_oid(oid)
    }

    /// Drops the cached metadata of `schema.table`. Returns true if an entry
    /// was dropped.
    pub fn invalidate_table(&self, schema: &Ident, table: &Ident) -> bool {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.cache.invalidate_table(schema, table)
    }

    /// Number of live statement references to the cached `schema.table`.
    #[must_use]
    pub fn cache_references(&self, schema: &Ident, table: &Ident) -> Option<usize> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.cache.references(schema, table)
    }

    /// Number of cached tables.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.cache.len()
    }

    /// Cache activity counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.cache.stats()
    }
}
