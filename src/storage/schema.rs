//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Tumblr-Scraper database.

/// Namespace holding the highest post id per blog
pub const HIGHEST_ID_TABLE: &str = "highest_id";

/// Namespace holding serialized session cookies per domain key
pub const COOKIES_TABLE: &str = "cookies";

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Highest post id seen per blog, stored as a decimal string
CREATE TABLE IF NOT EXISTS highest_id (
    blog_name BLOB PRIMARY KEY,
    value TEXT NOT NULL
);

-- Session cookies per domain key, stored as a JSON array
CREATE TABLE IF NOT EXISTS cookies (
    domain_key BLOB PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
