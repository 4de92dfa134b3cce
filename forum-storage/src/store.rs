//! SQLite-backed record store.
//!
//! One table per resource type, each `(id INTEGER PRIMARY KEY AUTOINCREMENT,
//! data TEXT NOT NULL)` where `data` is the record's attribute object as
//! JSON. All access goes through [`SqliteStore::transaction`]; the handle
//! passed to the closure commits when the closure returns `Ok` and rolls
//! back otherwise (including when it is dropped during a panic or an
//! aborted request).

use crate::error::{StorageError, StorageResult};
use crate::query::{check_identifier, Compiled, Condition, Query};
use forum_model::Model;
use forum_types::RecordId;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Persistent store for resource records backed by SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    tables: Arc<BTreeSet<String>>,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path with one table per name.
    pub fn open(path: &Path, tables: &[&str]) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, tables)
    }

    /// Opens an in-memory store (for testing and ephemeral servers).
    pub fn open_in_memory(tables: &[&str]) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, tables)
    }

    fn with_connection(conn: Connection, tables: &[&str]) -> StorageResult<Self> {
        let mut names = BTreeSet::new();
        for table in tables {
            names.insert(check_identifier(table)?.to_string());
        }
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            tables: Arc::new(names),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        for table in self.tables.iter() {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{table}\" (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    data TEXT NOT NULL
                );"
            ))?;
        }
        Ok(())
    }

    /// Names of the tables this store manages.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }

    /// Runs `f` inside a single database transaction.
    ///
    /// The connection lock is held for the whole closure, so transactions
    /// from concurrent requests are serialised.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&StoreTx<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| E::from(StorageError::Poisoned))?;
        let tx = conn
            .transaction()
            .map_err(|e| E::from(StorageError::from(e)))?;
        let handle = StoreTx {
            tx,
            tables: &self.tables,
        };

        match f(&handle) {
            Ok(value) => {
                handle
                    .tx
                    .commit()
                    .map_err(|e| E::from(StorageError::from(e)))?;
                Ok(value)
            }
            Err(e) => {
                debug!("Rolling back transaction");
                drop(handle);
                Err(e)
            }
        }
    }
}

/// Handle to an open transaction.
pub struct StoreTx<'a> {
    tx: rusqlite::Transaction<'a>,
    tables: &'a BTreeSet<String>,
}

impl StoreTx<'_> {
    fn table<'t>(&self, table: &'t str) -> StorageResult<&'t str> {
        if self.tables.contains(table) {
            Ok(table)
        } else {
            Err(StorageError::UnknownTable(table.to_string()))
        }
    }

    fn run_select(&self, resource_type: &str, compiled: &Compiled) -> StorageResult<Vec<Model>> {
        let mut stmt = self.tx.prepare(&compiled.sql)?;
        let rows = stmt.query_map(params_from_iter(compiled.params.iter()), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id, data) = row?;
            result.push(decode(resource_type, id, &data)?);
        }
        Ok(result)
    }

    /// Looks up one record by id, optionally restricted by a scope condition.
    /// A record outside the scope is reported exactly like a missing one.
    pub fn find(
        &self,
        table: &str,
        id: RecordId,
        scope: Option<&Condition>,
    ) -> StorageResult<Option<Model>> {
        let table = self.table(table)?;
        let condition = Condition::all([Some(Condition::id(id)), scope.cloned()]);
        let query = Query {
            table: table.to_string(),
            condition,
            order: Vec::new(),
            limit: Some(1),
            offset: 0,
        };
        let compiled = Compiled::select(&query)?;
        Ok(self.run_select(table, &compiled)?.into_iter().next())
    }

    pub fn query(&self, query: &Query) -> StorageResult<Vec<Model>> {
        let table = self.table(&query.table)?;
        let compiled = Compiled::select(query)?;
        self.run_select(table, &compiled)
    }

    pub fn count(&self, table: &str, condition: Option<&Condition>) -> StorageResult<usize> {
        let table = self.table(table)?;
        let mut compiled = Compiled {
            sql: format!("SELECT COUNT(*) FROM \"{table}\""),
            params: Vec::new(),
        };
        compiled.where_clause(condition)?;
        let count: i64 = self.tx.query_row(
            &compiled.sql,
            params_from_iter(compiled.params.iter()),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Inserts a new record and assigns its id.
    pub fn insert(&self, model: &mut Model) -> StorageResult<RecordId> {
        let table = self.table(&model.resource_type)?;
        let data = serde_json::to_string(&model.attributes)?;
        self.tx.execute(
            &format!("INSERT INTO \"{table}\" (data) VALUES (?1)"),
            params![data],
        )?;
        let id = RecordId::new(self.tx.last_insert_rowid());
        model.id = Some(id);
        Ok(id)
    }

    /// Writes back an existing record.
    pub fn update(&self, model: &Model) -> StorageResult<()> {
        let table = self.table(&model.resource_type)?;
        let id = model
            .id
            .ok_or_else(|| StorageError::InvalidData(format!("cannot update unsaved {table} record")))?;
        let data = serde_json::to_string(&model.attributes)?;
        let changed = self.tx.execute(
            &format!("UPDATE \"{table}\" SET data = ?1 WHERE id = ?2"),
            params![data, id.get()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("{table}/{id}")));
        }
        Ok(())
    }

    /// Inserts unsaved records, updates saved ones.
    pub fn save(&self, model: &mut Model) -> StorageResult<RecordId> {
        match model.id {
            Some(id) => {
                self.update(model)?;
                Ok(id)
            }
            None => self.insert(model),
        }
    }

    /// Deletes one record. Returns whether a row was removed.
    pub fn delete(&self, table: &str, id: RecordId) -> StorageResult<bool> {
        let table = self.table(table)?;
        let changed = self.tx.execute(
            &format!("DELETE FROM \"{table}\" WHERE id = ?1"),
            params![id.get()],
        )?;
        Ok(changed > 0)
    }

    /// Deletes every record matching `condition`.
    pub fn delete_where(&self, table: &str, condition: &Condition) -> StorageResult<usize> {
        let table = self.table(table)?;
        let mut compiled = Compiled {
            sql: format!("DELETE FROM \"{table}\""),
            params: Vec::new(),
        };
        compiled.where_clause(Some(condition))?;
        Ok(self
            .tx
            .execute(&compiled.sql, params_from_iter(compiled.params.iter()))?)
    }

    /// Whether a row with this id exists, ignoring any visibility scope.
    pub fn exists(&self, table: &str, id: RecordId) -> StorageResult<bool> {
        let table = self.table(table)?;
        let found: Option<i64> = self
            .tx
            .query_row(
                &format!("SELECT id FROM \"{table}\" WHERE id = ?1"),
                params![id.get()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn decode(resource_type: &str, id: i64, data: &str) -> StorageResult<Model> {
    let attributes: Map<String, Value> = match serde_json::from_str(data)? {
        Value::Object(map) => map,
        other => {
            return Err(StorageError::InvalidData(format!(
                "{resource_type}/{id}: expected object, found {other}"
            )))
        }
    };
    Ok(Model {
        resource_type: resource_type.to_string(),
        id: Some(RecordId::new(id)),
        attributes,
    })
}
