use anyhow::{Context, Result};
use rusqlite::{params, Connection, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;

/// String-keyed JSON blob storage.
///
/// Everything the app persists (conversation logs, unread counters, the
/// settings snapshot) lives in the single `app_state` table.
pub struct AppDatabase {
    conn: Mutex<Connection>,
}

impl AppDatabase {
    /// Helper to lock the connection
    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Database lock poisoned: {}", e))
    }

    /// Create or open the database
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.ensure_schema()?;
        Ok(db)
    }

    /// Volatile database, used when nothing should outlive the process.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.ensure_schema()?;
        Ok(db)
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            r#"CREATE TABLE IF NOT EXISTS app_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )"#,
            [],
        )?;
        Ok(())
    }

    /// Get a state value
    pub fn get_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock_conn()?;
        let result = conn.query_row(
            "SELECT value FROM app_state WHERE key = ?1",
            [key],
            |row| row.get(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a state value
    pub fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO app_state (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete_state(&self, key: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM app_state WHERE key = ?1", [key])?;
        Ok(())
    }

    /// Keys starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT key FROM app_state WHERE substr(key, 1, ?2) = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map(params![prefix, prefix.chars().count() as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Atomic read-modify-write of one key.
    ///
    /// `f` sees the current value and returns the value to store (`None`
    /// deletes the key) plus an output handed back to the caller. The read
    /// and the write run in one IMMEDIATE transaction while the connection
    /// mutex is held, so two updates of the same key cannot interleave.
    pub fn update_state<T, F>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce(Option<&str>) -> Result<(Option<String>, T)>,
    {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<String> = match tx.query_row(
            "SELECT value FROM app_state WHERE key = ?1",
            [key],
            |row| row.get(0),
        ) {
            Ok(value) => Some(value),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        let (next, output) = f(current.as_deref())?;
        match next {
            Some(value) => {
                tx.execute(
                    "INSERT OR REPLACE INTO app_state (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )?;
            }
            None => {
                tx.execute("DELETE FROM app_state WHERE key = ?1", [key])?;
            }
        }
        tx.commit()
            .with_context(|| format!("Failed to commit update of '{}'", key))?;

        Ok(output)
    }
}
