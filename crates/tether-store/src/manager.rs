//! Store manager
//!
//! The facade coordinating schema registration, statement compilation, the
//! identity cache and the relation engine. Descriptors and statements are
//! built lazily, once per type, and live for the manager's lifetime.
//!
//! Not safe for concurrent use: shared record handles are `Rc<RefCell<_>>`
//! and the connection is owned directly, so callers serialize access
//! externally (single-owner discipline).

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row as SqlRow, ToSql};
use tracing::{debug, info};

use tether_core::errors::{Result, TetherError};
use tether_core::record::{Record, RecordVtable, Row, Shared, SharedDyn, SharedHandle, Value};
use tether_core::schema::{EntitySchema, StoredColumn, ToOneDef};

use crate::cache::IdentityCache;
use crate::errors::from_rusqlite;
use crate::statements::{self, CompiledStatements};
use crate::{db, relations};

/// Compiled artifacts for one registered record type
struct RegisteredType {
    schema: EntitySchema,
    statements: CompiledStatements,
}

/// Per-call guard against cyclic reference resolution
type Visited = HashSet<(&'static str, i64)>;

/// The persistence facade
///
/// Owns the connection, the per-type schema/statement registry and the
/// identity cache of loaded records.
pub struct StoreManager {
    conn: Connection,
    registry: HashMap<&'static str, Rc<RegisteredType>>,
    cache: IdentityCache,
}

impl StoreManager {
    /// Open a manager over a SQLite database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = db::open(path)?;
        db::configure(&conn)?;
        Ok(Self::with_connection(conn))
    }

    /// Open a manager over an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = db::open_in_memory()?;
        db::configure(&conn)?;
        Ok(Self::with_connection(conn))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn,
            registry: HashMap::new(),
            cache: IdentityCache::new(),
        }
    }

    /// The underlying connection, for fixtures and collaborators
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Check that the backing store answers queries
    pub fn ping(&self) -> Result<()> {
        self.conn
            .query_row("SELECT 1", [], |_row| Ok(()))
            .map_err(from_rusqlite)
    }

    /// Drop and recreate the table for a record type
    ///
    /// Idempotent by replacement and destructive; a development and
    /// test-fixture operation, not a migration.
    pub fn create_table<T: Record>(&mut self) -> Result<()> {
        let vtable = RecordVtable::of::<T>();
        let registered = self.register(&vtable)?;
        let batch = statements::create_table_batch(&registered.schema)?;
        for sql in &batch {
            self.conn.execute(sql, []).map_err(from_rusqlite)?;
        }
        info!(table = registered.schema.name(), "created table");
        Ok(())
    }

    /// Insert a record, assign the store-generated id back into it and
    /// cache it under the new key
    ///
    /// Whether the record was already saved is the caller's responsibility;
    /// no uniqueness check happens beyond the store's own constraints.
    pub fn save<T: Record>(&mut self, record: &Shared<T>) -> Result<()> {
        let vtable = RecordVtable::of::<T>();
        let registered = self.register(&vtable)?;
        let values = record.borrow().values();
        {
            let mut stmt = self
                .conn
                .prepare_cached(&registered.statements.insert)
                .map_err(from_rusqlite)?;
            stmt.execute(params_from_iter(values.iter().map(SqlValue)))
                .map_err(from_rusqlite)?;
        }
        let id = self.conn.last_insert_rowid();
        record.borrow_mut().set_id(id);
        self.cache
            .put(vtable.type_name, id, SharedHandle::new(record.clone()));
        debug!(type_name = vtable.type_name, id, "saved record");
        Ok(())
    }

    /// Write a record's current column values to its existing row
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no row carries the record's id.
    pub fn update<T: Record>(&mut self, record: &Shared<T>) -> Result<()> {
        let vtable = RecordVtable::of::<T>();
        let registered = self.register(&vtable)?;
        let (mut values, id) = {
            let current = record.borrow();
            (current.values(), current.id())
        };
        values.push(Value::Integer(id));

        let affected = {
            let mut stmt = self
                .conn
                .prepare_cached(&registered.statements.update)
                .map_err(from_rusqlite)?;
            stmt.execute(params_from_iter(values.iter().map(SqlValue)))
                .map_err(from_rusqlite)?
        };
        if affected == 0 {
            return Err(TetherError::NotFound {
                type_name: vtable.type_name.to_string(),
                id,
            });
        }
        debug!(type_name = vtable.type_name, id, "updated record");
        Ok(())
    }

    /// Fetch the shared instance for (T, id)
    ///
    /// A cache hit returns the existing instance without touching the
    /// store. A miss loads the row, resolves to-one references through
    /// nested retrieves (cache-benefiting, cycle-guarded) and caches the
    /// fully built record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no row matches, or `ReferenceCycle` when
    /// resolution revisits a record that is still being loaded.
    pub fn retrieve<T: Record>(&mut self, id: i64) -> Result<Shared<T>> {
        let mut visited = Visited::new();
        let handle = self.retrieve_handle(&RecordVtable::of::<T>(), id, &mut visited)?;
        handle.downcast::<T>().ok_or_else(|| TetherError::TypeCollision {
            type_name: T::type_name().to_string(),
        })
    }

    /// Fill every to-many collection of a record from the store
    ///
    /// Clear-then-repopulate: each collection is rebuilt from the current
    /// child rows, so repeated calls stay idempotent. Children are
    /// retrieved through the cache.
    pub fn populate<T: Record>(&mut self, record: &Shared<T>) -> Result<()> {
        let vtable = RecordVtable::of::<T>();
        let registered = self.register(&vtable)?;
        let id = record.borrow().id();

        for relation in &registered.statements.relations {
            let child_ids: Vec<i64> = {
                let mut stmt = self
                    .conn
                    .prepare_cached(&relation.populate)
                    .map_err(from_rusqlite)?;
                let rows = stmt.query_map([id], |row| row.get(0)).map_err(from_rusqlite)?;
                rows.collect::<rusqlite::Result<Vec<i64>>>()
                    .map_err(from_rusqlite)?
            };

            // Fetch before touching the collection, so a failed retrieve
            // leaves the record as it was.
            let mut children = Vec::with_capacity(child_ids.len());
            for child_id in child_ids {
                let mut visited = Visited::new();
                children.push(self.retrieve_handle(
                    &(relation.target_vtable)(),
                    child_id,
                    &mut visited,
                )?);
            }

            let mut owner = record.borrow_mut();
            owner.clear_collection(relation.field);
            for child in children {
                owner.push_to_collection(relation.field, child.as_any())?;
            }
        }
        Ok(())
    }

    /// Delete a record's row and keep cached object graphs consistent
    ///
    /// In the store, the foreign key of every current child is nulled. In
    /// the cache, children held in the record's collections lose their
    /// back-reference, and cached parents have this record spliced out of
    /// their collections. Finally the row itself is deleted and the
    /// record's cache entry removed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the row was already absent, distinct from
    /// earlier statement failures.
    pub fn delete<T: Record>(&mut self, record: &Shared<T>) -> Result<()> {
        let vtable = RecordVtable::of::<T>();
        let registered = self.register(&vtable)?;
        let id = record.borrow().id();

        // Store side: decouple all current children.
        for relation in &registered.statements.relations {
            let mut stmt = self
                .conn
                .prepare_cached(&relation.decouple)
                .map_err(from_rusqlite)?;
            stmt.execute([id]).map_err(from_rusqlite)?;
        }

        // Cache side: clear back-references of children held in memory.
        let dynamic: SharedDyn = record.clone();
        relations::detach_cached_children(&dynamic, &registered.statements, id);

        // Splice this record out of cached parents' collections.
        for def in registered.schema.to_one() {
            let Some(parent_id) = record.borrow().reference_id(def.field) else {
                continue;
            };
            let Some(parent) = self.cache.get(def.target, parent_id) else {
                continue;
            };
            let Some(parent_registered) = self.registry.get(def.target) else {
                continue;
            };
            relations::splice_child_from_parent(
                parent.record(),
                &parent_registered.statements,
                vtable.type_name,
                def.field,
                id,
            );
        }

        // Finally the row itself.
        let affected = {
            let mut stmt = self
                .conn
                .prepare_cached(&registered.statements.delete)
                .map_err(from_rusqlite)?;
            stmt.execute([id]).map_err(from_rusqlite)?
        };
        if affected == 0 {
            return Err(TetherError::NotFound {
                type_name: vtable.type_name.to_string(),
                id,
            });
        }

        self.cache.evict(vtable.type_name, id);
        debug!(type_name = vtable.type_name, id, "deleted record");
        Ok(())
    }

    /// Remove a record's cache entry without touching the store, forcing
    /// the next retrieve to hit the backing store
    pub fn eject_from_cache<T: Record>(&mut self, record: &Shared<T>) {
        let id = record.borrow().id();
        let evicted = self.cache.evict(T::type_name(), id);
        debug!(type_name = T::type_name(), id, evicted, "ejected record");
    }

    /// Build-and-memoize the schema and statement set for a type
    fn register(&mut self, vtable: &RecordVtable) -> Result<Rc<RegisteredType>> {
        if let Some(existing) = self.registry.get(vtable.type_name) {
            return Ok(existing.clone());
        }
        let schema = (vtable.schema)()?;
        let compiled = statements::compile(&schema)?;
        debug!(type_name = vtable.type_name, "registered record type");
        let registered = Rc::new(RegisteredType {
            schema,
            statements: compiled,
        });
        self.registry.insert(vtable.type_name, registered.clone());
        Ok(registered)
    }

    /// Load a record by vtable, resolving references recursively
    fn retrieve_handle(
        &mut self,
        vtable: &RecordVtable,
        id: i64,
        visited: &mut Visited,
    ) -> Result<SharedHandle> {
        let name = vtable.type_name;
        if let Some(handle) = self.cache.get(name, id) {
            return Ok(handle);
        }
        if !visited.insert((name, id)) {
            return Err(TetherError::ReferenceCycle {
                type_name: name.to_string(),
                id,
            });
        }
        let registered = self.register(vtable)?;

        let fetched = {
            let mut stmt = self
                .conn
                .prepare_cached(&registered.statements.select)
                .map_err(from_rusqlite)?;
            stmt.query_row([id], |row| scan_row(&registered.schema, row))
                .optional()
                .map_err(from_rusqlite)?
        };
        let Some((row_id, scanned, pending)) = fetched else {
            return Err(TetherError::NotFound {
                type_name: name.to_string(),
                id,
            });
        };

        let handle = (vtable.construct)(scanned)?;
        handle.record().borrow_mut().set_id(row_id);
        for (def, foreign_key) in pending {
            let Some(foreign_key) = foreign_key else {
                continue;
            };
            let target = self.retrieve_handle(&(def.target_vtable)(), foreign_key, visited)?;
            handle
                .record()
                .borrow_mut()
                .set_reference(def.field, target.as_any())?;
        }

        // Cached only once fully built and resolved, so a failed load
        // leaves previously cached objects untouched.
        self.cache.put(name, id, handle.clone());
        Ok(handle)
    }
}

/// Decode one selected row into scalar column values plus the raw foreign
/// keys of its to-one fields, which are resolved after the scan
fn scan_row(
    schema: &EntitySchema,
    row: &SqlRow<'_>,
) -> rusqlite::Result<(i64, Row, Vec<(ToOneDef, Option<i64>)>)> {
    let row_id: i64 = row.get(0)?;
    let mut scanned = Row::new(schema.name());
    let mut pending = Vec::new();

    for (index, column) in schema.stored().iter().enumerate() {
        let position = index + 1;
        match column {
            StoredColumn::Scalar(def) => {
                let value = match row.get_ref(position)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(value) => Value::Integer(value),
                    ValueRef::Text(bytes) => {
                        Value::Text(String::from_utf8_lossy(bytes).into_owned())
                    }
                    other => {
                        return Err(rusqlite::Error::InvalidColumnType(
                            position,
                            def.field.to_string(),
                            other.data_type(),
                        ))
                    }
                };
                scanned.insert(def.field, value);
            }
            StoredColumn::Reference(def) => {
                let foreign_key: Option<i64> = row.get(position)?;
                pending.push((def.clone(), foreign_key));
            }
        }
    }

    Ok((row_id, scanned, pending))
}

/// Parameter adapter binding [`Value`] through rusqlite
struct SqlValue<'a>(&'a Value);

impl ToSql for SqlValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Integer(value) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*value)),
            Value::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
        })
    }
}
