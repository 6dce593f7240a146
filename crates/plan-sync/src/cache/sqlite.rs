//! SQLite-backed reference cache.
//!
//! One table per dictionary (`id TEXT PRIMARY KEY, data TEXT`) plus a
//! `config` key/value table. Upserts keep the original rowid, so `get_all`
//! returns records in first-insertion order.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{record_id, DictionaryTable, ReferenceStore};
use crate::error::CacheError;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a file-backed cache.
    pub fn open(path: &str) -> Result<Self, CacheError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;
             CREATE TABLE IF NOT EXISTS config (
                 key   TEXT PRIMARY KEY,
                 value TEXT NOT NULL
             );",
        )?;
        for table in DictionaryTable::ALL {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (
                     id   TEXT PRIMARY KEY,
                     data TEXT NOT NULL
                 );",
                table.name()
            ))?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn insert_rows(
        conn: &Connection,
        table: DictionaryTable,
        records: &[Value],
    ) -> Result<(), CacheError> {
        let mut stmt = conn.prepare_cached(&format!(
            "INSERT INTO \"{}\" (id, data) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
            table.name()
        ))?;
        for record in records {
            let id = record_id(table, record)?;
            stmt.execute(params![id, serde_json::to_string(record)?])?;
        }
        Ok(())
    }
}

fn decode(raw: String) -> Result<Value, CacheError> {
    Ok(serde_json::from_str(&raw)?)
}

impl ReferenceStore for SqliteStore {
    fn get(&self, table: DictionaryTable, id: &str) -> Result<Option<Value>, CacheError> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                &format!("SELECT data FROM \"{}\" WHERE id = ?1", table.name()),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(decode).transpose()
    }

    fn get_all(&self, table: DictionaryTable) -> Result<Vec<Value>, CacheError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached(&format!("SELECT data FROM \"{}\" ORDER BY rowid", table.name()))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(decode(raw?)?);
        }
        Ok(out)
    }

    fn bulk_put(&self, table: DictionaryTable, records: &[Value]) -> Result<(), CacheError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        Self::insert_rows(&tx, table, records)?;
        tx.commit()?;
        Ok(())
    }

    fn clear(&self, table: DictionaryTable) -> Result<(), CacheError> {
        self.conn
            .lock()
            .execute(&format!("DELETE FROM \"{}\"", table.name()), [])?;
        Ok(())
    }

    fn replace_all(&self, snapshot: &[(DictionaryTable, Vec<Value>)]) -> Result<(), CacheError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for (table, records) in snapshot {
            tx.execute(&format!("DELETE FROM \"{}\"", table.name()), [])?;
            Self::insert_rows(&tx, *table, records)?;
        }
        // Dropping `tx` on an early return rolls everything back.
        tx.commit()?;
        Ok(())
    }

    fn get_config(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .conn
            .lock()
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_config(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.conn.lock().execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}
