//! SQLite storage adapter
//!
//! One database = one SQLite file `<root>/<name>.sqlite3`, or one in-memory
//! connection when the backend has no root. Connections are opened lazily and
//! cached; a single mutex serializes access to the cache and the connections.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension};

use super::errors::{BackendError, BackendResult};
use super::types::{ColumnInfo, QueryRows, Value};
use super::StorageBackend;
use crate::sql::{
    database_command, is_valid_identifier, quote_identifier, split_statements, DatabaseCommand,
};

const FILE_EXTENSION: &str = "sqlite3";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed storage instance
#[derive(Debug)]
pub struct SqliteBackend {
    name: String,
    root: Option<PathBuf>,
    databases: Mutex<HashMap<String, Connection>>,
}

impl SqliteBackend {
    /// Open (creating if needed) a backend rooted at `root`.
    pub fn open(name: impl Into<String>, root: impl Into<PathBuf>) -> BackendResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            name: name.into(),
            root: Some(root),
            databases: Mutex::new(HashMap::new()),
        })
    }

    /// A backend whose databases live only in memory.
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: None,
            databases: Mutex::new(HashMap::new()),
        }
    }

    /// Data directory, if this backend is persistent.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Connection>> {
        // a panic while holding the lock leaves the connections usable
        self.databases
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn path_for(&self, database: &str) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("{}.{}", database, FILE_EXTENSION)))
    }

    fn exists_locked(&self, open: &HashMap<String, Connection>, database: &str) -> bool {
        open.contains_key(database)
            || self
                .path_for(database)
                .map(|path| path.is_file())
                .unwrap_or(false)
    }

    fn open_connection(&self, database: &str) -> BackendResult<Connection> {
        let conn = match self.path_for(database) {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Run `f` against the connection of an existing database.
    fn with_connection<T>(
        &self,
        database: &str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> BackendResult<T> {
        if !is_valid_identifier(database) {
            return Err(BackendError::InvalidName(database.to_string()));
        }

        let mut open = self.lock();
        if !open.contains_key(database) {
            if !self.exists_locked(&open, database) {
                return Err(BackendError::UnknownDatabase(database.to_string()));
            }
            let conn = self.open_connection(database)?;
            open.insert(database.to_string(), conn);
        }

        let conn = open
            .get(database)
            .ok_or_else(|| BackendError::UnknownDatabase(database.to_string()))?;
        Ok(f(conn)?)
    }

    fn run_database_command(&self, command: DatabaseCommand) -> BackendResult<u64> {
        match command {
            DatabaseCommand::Create {
                name,
                if_not_exists,
            } => {
                if !is_valid_identifier(&name) {
                    return Err(BackendError::InvalidName(name));
                }
                let mut open = self.lock();
                if self.exists_locked(&open, &name) {
                    return if if_not_exists {
                        Ok(0)
                    } else {
                        Err(BackendError::DatabaseExists(name))
                    };
                }
                let conn = self.open_connection(&name)?;
                open.insert(name, conn);
                Ok(1)
            }
            DatabaseCommand::Drop { name, if_exists } => {
                let mut open = self.lock();
                if !self.exists_locked(&open, &name) {
                    return if if_exists {
                        Ok(0)
                    } else {
                        Err(BackendError::UnknownDatabase(name))
                    };
                }
                open.remove(&name);
                if let Some(path) = self.path_for(&name) {
                    if path.is_file() {
                        fs::remove_file(path)?;
                    }
                }
                Ok(0)
            }
            DatabaseCommand::Use(name) => {
                self.select_database(&name)?;
                Ok(0)
            }
        }
    }
}

impl StorageBackend for SqliteBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn select_database(&self, database: &str) -> BackendResult<()> {
        if !is_valid_identifier(database) {
            return Err(BackendError::InvalidName(database.to_string()));
        }
        let open = self.lock();
        if self.exists_locked(&open, database) {
            Ok(())
        } else {
            Err(BackendError::UnknownDatabase(database.to_string()))
        }
    }

    fn execute(&self, database: Option<&str>, statement: &str) -> BackendResult<u64> {
        single_statement(statement)?;
        if let Some(command) = database_command(statement) {
            return self.run_database_command(command);
        }

        let database = database.ok_or(BackendError::NoDatabaseSelected)?;
        self.with_connection(database, |conn| {
            let mut stmt = conn.prepare(statement)?;
            if stmt.column_count() > 0 {
                // row-returning statements report no affected rows
                let mut rows = stmt.query([])?;
                while rows.next()?.is_some() {}
                Ok(0)
            } else {
                Ok(stmt.execute([])? as u64)
            }
        })
    }

    fn query(
        &self,
        database: &str,
        statement: &str,
        params: &[Value],
    ) -> BackendResult<QueryRows> {
        single_statement(statement)?;
        let bound: Vec<SqlValue> = params.iter().map(to_sql_value).collect();
        self.with_connection(database, |conn| {
            let mut stmt = conn.prepare(statement)?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect();

            let mut rows = stmt.query(params_from_iter(bound.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(columns.len());
                for i in 0..columns.len() {
                    values.push(from_value_ref(row.get_ref(i)?));
                }
                out.push(values);
            }

            Ok(QueryRows { columns, rows: out })
        })
    }

    fn list_databases(&self) -> BackendResult<Vec<String>> {
        let open = self.lock();
        let mut names: BTreeSet<String> = open.keys().cloned().collect();

        if let Some(root) = &self.root {
            for entry in fs::read_dir(root)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if is_valid_identifier(stem) {
                        names.insert(stem.to_string());
                    }
                }
            }
        }

        Ok(names.into_iter().collect())
    }

    fn list_tables(&self, database: &str) -> BackendResult<Vec<String>> {
        self.with_connection(database, |conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })
    }

    fn describe_columns(&self, database: &str, table: &str) -> BackendResult<Vec<ColumnInfo>> {
        let columns = self.with_connection(database, |conn| {
            let pragma = format!("PRAGMA table_info({})", quote_identifier(table));
            let mut stmt = conn.prepare(&pragma)?;
            let columns = stmt
                .query_map([], |row| {
                    let not_null: i64 = row.get(3)?;
                    let pk: i64 = row.get(5)?;
                    Ok(ColumnInfo {
                        name: row.get(1)?,
                        data_type: row.get(2)?,
                        nullable: not_null == 0,
                        key: if pk > 0 { "PRI".to_string() } else { String::new() },
                        default: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(columns)
        })?;

        if columns.is_empty() {
            return Err(BackendError::UnknownTable {
                database: database.to_string(),
                table: table.to_string(),
            });
        }
        Ok(columns)
    }

    fn show_create_table(&self, database: &str, table: &str) -> BackendResult<String> {
        let sql = self.with_connection(database, |conn| {
            conn.query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })?;

        sql.ok_or_else(|| BackendError::UnknownTable {
            database: database.to_string(),
            table: table.to_string(),
        })
    }
}

/// SQLite prepares only the first statement of a text and ignores the rest.
fn single_statement(statement: &str) -> BackendResult<()> {
    if split_statements(statement).len() > 1 {
        return Err(BackendError::Statement(
            "multiple statements are not supported".to_string(),
        ));
    }
    Ok(())
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Real(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Blob(v) => SqlValue::Blob(v.clone()),
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => Value::Blob(v.to_vec()),
    }
}
