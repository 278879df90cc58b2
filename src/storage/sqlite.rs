//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::session::StoredCookie;
use crate::storage::schema::{initialize_schema, COOKIES_TABLE, HIGHEST_ID_TABLE};
use crate::storage::traits::{Storage, StorageError, StorageResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Option<Connection>,
}

impl SqliteStorage {
    /// Opens or creates the database at `path` and ensures both namespaces exist
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError::Open)` - Failed to open or initialize the database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let open_err = |source| StorageError::Open {
            path: path.display().to_string(),
            source,
        };

        let conn = Connection::open(path).map_err(open_err)?;

        // A committed cursor must be on disk before set_highest_id returns
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
        ",
        )
        .map_err(open_err)?;

        initialize_schema(&conn).map_err(open_err)?;

        Ok(Self { conn: Some(conn) })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let open_err = |source| StorageError::Open {
            path: ":memory:".to_string(),
            source,
        };
        let conn = Connection::open_in_memory().map_err(open_err)?;
        initialize_schema(&conn).map_err(open_err)?;
        Ok(Self { conn: Some(conn) })
    }

    /// Returns true once `close` has been called
    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    fn conn(&self) -> StorageResult<&Connection> {
        self.conn.as_ref().ok_or(StorageError::Closed)
    }

    fn conn_mut(&mut self) -> StorageResult<&mut Connection> {
        self.conn.as_mut().ok_or(StorageError::Closed)
    }

    /// Upserts one value inside its own committed transaction
    fn put(&mut self, sql: &str, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.conn_mut()?;
        let tx = conn.transaction().map_err(StorageError::Write)?;
        tx.execute(sql, params![key.as_bytes(), value])
            .map_err(StorageError::Write)?;
        tx.commit().map_err(StorageError::Write)?;
        Ok(())
    }
}

impl Storage for SqliteStorage {
    // ===== Progress Cursors =====

    fn get_highest_id(&self, blog_name: &str) -> StorageResult<Option<i64>> {
        let raw: Option<String> = self
            .conn()?
            .query_row(
                "SELECT value FROM highest_id WHERE blog_name = ?1",
                params![blog_name.as_bytes()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::Read)?;

        raw.map(|value| decode_highest_id(blog_name, &value))
            .transpose()
    }

    fn set_highest_id(&mut self, blog_name: &str, highest_id: i64) -> StorageResult<()> {
        self.put(
            "INSERT INTO highest_id (blog_name, value) VALUES (?1, ?2)
             ON CONFLICT(blog_name) DO UPDATE SET value = excluded.value",
            blog_name,
            &highest_id.to_string(),
        )
    }

    fn list_highest_ids(&self) -> StorageResult<Vec<(String, i64)>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT blog_name, value FROM highest_id ORDER BY blog_name")
            .map_err(StorageError::Read)?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?)))
            .map_err(StorageError::Read)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::Read)?;

        rows.into_iter()
            .map(|(key, value)| {
                let blog_name = String::from_utf8(key).map_err(|e| StorageError::Decode {
                    namespace: HIGHEST_ID_TABLE,
                    key: String::from_utf8_lossy(e.as_bytes()).into_owned(),
                    message: "blog name is not valid UTF-8".to_string(),
                })?;
                let id = decode_highest_id(&blog_name, &value)?;
                Ok((blog_name, id))
            })
            .collect()
    }

    // ===== Session Cookies =====

    fn get_cookies(&self, domain_key: &str) -> StorageResult<Vec<StoredCookie>> {
        let raw: Option<String> = self
            .conn()?
            .query_row(
                "SELECT value FROM cookies WHERE domain_key = ?1",
                params![domain_key.as_bytes()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::Read)?;

        match raw {
            None => Ok(Vec::new()),
            Some(data) if data.is_empty() => Ok(Vec::new()),
            Some(data) => serde_json::from_str(&data).map_err(|e| StorageError::Decode {
                namespace: COOKIES_TABLE,
                key: domain_key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn set_cookies(&mut self, domain_key: &str, cookies: &[StoredCookie]) -> StorageResult<()> {
        let data = serde_json::to_string(cookies)?;
        self.put(
            "INSERT INTO cookies (domain_key, value) VALUES (?1, ?2)
             ON CONFLICT(domain_key) DO UPDATE SET value = excluded.value",
            domain_key,
            &data,
        )
    }

    // ===== Lifecycle =====

    fn close(&mut self) -> StorageResult<()> {
        let conn = self.conn.take().ok_or(StorageError::Closed)?;
        conn.close().map_err(|(_, e)| StorageError::Close(e))
    }
}

/// Parses a stored cursor, refusing anything that is not a decimal i64
fn decode_highest_id(blog_name: &str, value: &str) -> StorageResult<i64> {
    value.parse::<i64>().map_err(|e| StorageError::Decode {
        namespace: HIGHEST_ID_TABLE,
        key: blog_name.to_string(),
        message: format!("'{}' is not a post id: {}", value, e),
    })
}
