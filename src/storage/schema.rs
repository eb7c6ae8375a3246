//! Physical table management for edge types.
//!
//! Every edge type owns one table with a fixed column set. Type names end up
//! inside DDL and DML text, so they only reach SQL through [`EdgeTypeName`],
//! which admits plain identifiers and nothing else.

use std::fmt;

use rusqlite::{params, Connection, OptionalExtension};

/// Longest accepted type name.
pub const MAX_TYPE_NAME_LEN: usize = 63;

/// Column order shared by the create, insert and select statements.
pub const EDGE_COLUMNS: [&str; 9] = [
    "id",
    "src_id",
    "src_type",
    "dest_id",
    "dest_type",
    "score",
    "data",
    "status",
    "updated",
];

/// Columns overwritten when an incoming row wins the last-write-wins merge.
pub const MERGED_COLUMNS: [&str; 6] = ["src_type", "dest_type", "score", "data", "status", "updated"];

/// A validated edge type name, safe to interpolate as an SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeTypeName(String);

impl EdgeTypeName {
    /// Accepts `[A-Za-z_][A-Za-z0-9_]*` up to [`MAX_TYPE_NAME_LEN`] characters,
    /// excluding SQLite's reserved `sqlite_` prefix.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.is_empty() {
            return Err("edge type name is empty".into());
        }
        if raw.len() > MAX_TYPE_NAME_LEN {
            return Err(format!(
                "edge type name '{raw}' is longer than {MAX_TYPE_NAME_LEN} characters"
            ));
        }
        let mut chars = raw.chars();
        let head_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!(
                "edge type name '{raw}' may only contain letters, digits and '_' and must not start with a digit"
            ));
        }
        if raw.to_ascii_lowercase().starts_with("sqlite_") {
            return Err(format!("edge type name '{raw}' uses a reserved prefix"));
        }
        Ok(Self(raw.to_string()))
    }

    /// The raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name as a double-quoted identifier.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Index identifier. `:` never appears in a valid type name, so index
    /// names cannot collide with another type's table.
    fn index(&self, suffix: &str) -> String {
        format!("\"{}:{suffix}\"", self.0)
    }
}

impl fmt::Display for EdgeTypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// DDL creating the table and its five indexes; every statement is idempotent.
pub fn create_statements(name: &EdgeTypeName) -> String {
    let table = name.quoted();
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY NOT NULL,
            src_id INTEGER,
            src_type TEXT,
            dest_id INTEGER,
            dest_type TEXT,
            score REAL,
            data TEXT,
            status TEXT,
            updated TEXT
        );
        CREATE INDEX IF NOT EXISTS {src} ON {table} (src_id);
        CREATE INDEX IF NOT EXISTS {dest} ON {table} (dest_id);
        CREATE INDEX IF NOT EXISTS {score} ON {table} (score);
        CREATE INDEX IF NOT EXISTS {status} ON {table} (status);
        CREATE INDEX IF NOT EXISTS {combi} ON {table} (src_id, dest_id, score, status);",
        src = name.index("src_id"),
        dest = name.index("dest_id"),
        score = name.index("score"),
        status = name.index("status"),
        combi = name.index("combi"),
    )
}

/// Creates the table and indexes for `name` unless they already exist.
pub fn ensure_type(conn: &mut Connection, name: &EdgeTypeName) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(&create_statements(name))?;
    tx.commit()
}

/// Drops the table for `name`, and with it its indexes. Missing tables are ignored.
pub fn drop_type(conn: &Connection, name: &EdgeTypeName) -> rusqlite::Result<()> {
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", name.quoted()))
}

/// Whether a table for `name` exists. Names compare case-insensitively, as
/// SQLite identifiers do.
pub fn type_exists(conn: &Connection, name: &EdgeTypeName) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
        params![name.as_str()],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

/// Names of the indexes defined on the table for `name`.
pub fn index_names(conn: &Connection, name: &EdgeTypeName) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'index' AND tbl_name = ?1 COLLATE NOCASE AND sql IS NOT NULL
         ORDER BY name",
    )?;
    let rows = stmt.query_map(params![name.as_str()], |row| row.get(0))?;
    rows.collect()
}
