use super::{PersistenceResult, RecordStore, validate_key};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

/// Records kept as JSON text in a single `records` table keyed by record name.
pub struct SqliteRecordStore {
    connection: Mutex<Connection>,
}

impl SqliteRecordStore {
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> PersistenceResult<Self> {
        let connection = Connection::open(path)?;
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    pub fn open_in_memory() -> PersistenceResult<Self> {
        let connection = Connection::open_in_memory()?;
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn initialize_schema(connection: &Connection) -> PersistenceResult<()> {
        let ddl = r#"
            CREATE TABLE IF NOT EXISTS records (
                key TEXT PRIMARY KEY,
                value_json TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#;
        connection.execute_batch(ddl)?;
        Ok(())
    }
}

impl RecordStore for SqliteRecordStore {
    fn load_record(&self, key: &str) -> PersistenceResult<Option<Value>> {
        let conn = self.connection.lock();
        let mut stmt = conn.prepare("SELECT value_json FROM records WHERE key = ?1")?;
        let json: Option<String> = stmt
            .query_row(params![key], |row| row.get(0))
            .optional()?;

        let Some(json) = json else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&json)?))
    }

    fn save_record(&self, key: &str, value: &Value) -> PersistenceResult<()> {
        validate_key(key)?;
        let json = serde_json::to_string(value)?;
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO records (key, value_json, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json,
                                            updated_at = excluded.updated_at",
            params![key, json],
        )?;
        tx.commit()?;
        tracing::debug!(key, bytes = json.len(), "sqlite record written");
        Ok(())
    }

    fn remove_record(&self, key: &str) -> PersistenceResult<bool> {
        let conn = self.connection.lock();
        let removed = conn.execute("DELETE FROM records WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }
}
