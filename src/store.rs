use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};

use crate::frame::{Cell, ColumnSpec, Frame, SchemaError};

pub const STORE_FILE: &str = "vaep_store.sqlite";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTable {
    Features,
    Labels,
    Predictions,
}

impl StoreTable {
    pub fn name(self) -> &'static str {
        match self {
            StoreTable::Features => "features",
            StoreTable::Labels => "labels",
            StoreTable::Predictions => "predictions",
        }
    }
}

pub fn game_key(game_id: i64) -> String {
    format!("game_{game_id}")
}

pub fn store_path(data_folder: &Path) -> PathBuf {
    data_folder.join(STORE_FILE)
}

/// SHA-256 over the ordered column specs, base64 encoded.
pub fn schema_fingerprint(columns: &[ColumnSpec]) -> String {
    let mut hasher = Sha256::new();
    for c in columns {
        hasher.update(c.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(format!("{:?}", c.kind).as_bytes());
        hasher.update([b'\n']);
    }
    STANDARD.encode(hasher.finalize())
}

/// Frames keyed by `(table, key)` in one SQLite file. Writes overwrite.
pub struct TableStore {
    conn: Connection,
}

impl TableStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn put(&self, table: StoreTable, key: &str, frame: &Frame) -> Result<()> {
        let columns_json = serde_json::to_string(&frame.columns).context("serialize columns")?;
        let rows_json = serde_json::to_string(&frame.rows).context("serialize rows")?;
        self.conn
            .execute(
                r#"
                INSERT INTO frames (store, key, fingerprint, columns_json, rows_json, n_rows, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(store, key) DO UPDATE SET
                    fingerprint = excluded.fingerprint,
                    columns_json = excluded.columns_json,
                    rows_json = excluded.rows_json,
                    n_rows = excluded.n_rows,
                    updated_at = excluded.updated_at
                "#,
                params![
                    table.name(),
                    key,
                    schema_fingerprint(&frame.columns),
                    columns_json,
                    rows_json,
                    frame.n_rows() as i64,
                    Utc::now().to_rfc3339(),
                ],
            )
            .with_context(|| format!("upsert {}/{key}", table.name()))?;
        Ok(())
    }

    pub fn get(&self, table: StoreTable, key: &str) -> Result<Option<Frame>> {
        let stored: Option<(String, String, String)> = self
            .conn
            .query_row(
                "SELECT fingerprint, columns_json, rows_json FROM frames WHERE store = ?1 AND key = ?2",
                params![table.name(), key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .with_context(|| format!("load {}/{key}", table.name()))?;

        let Some((fingerprint, columns_json, rows_json)) = stored else {
            return Ok(None);
        };
        let columns: Vec<ColumnSpec> =
            serde_json::from_str(&columns_json).context("decode stored columns")?;
        let computed = schema_fingerprint(&columns);
        if computed != fingerprint {
            return Err(SchemaError::Fingerprint {
                key: format!("{}/{key}", table.name()),
                stored: fingerprint,
                computed,
            }
            .into());
        }
        let rows: Vec<Vec<Cell>> = serde_json::from_str(&rows_json).context("decode stored rows")?;
        Ok(Some(Frame { columns, rows }))
    }

    /// Like `get`, but a missing key is an error.
    pub fn require(&self, table: StoreTable, key: &str) -> Result<Frame> {
        self.get(table, key)?
            .with_context(|| format!("no {} table stored for {key}", table.name()))
    }

    /// Game ids with a frame in `table`, ascending.
    pub fn game_ids(&self, table: StoreTable) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM frames WHERE store = ?1")
            .context("prepare key query")?;
        let rows = stmt
            .query_map(params![table.name()], |row| row.get::<_, String>(0))
            .context("query keys")?;
        let mut ids = Vec::new();
        for key in rows {
            let key = key.context("decode key row")?;
            if let Some(id) = key.strip_prefix("game_").and_then(|s| s.parse::<i64>().ok()) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    #[cfg(test)]
    fn corrupt_fingerprint(&self, table: StoreTable, key: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE frames SET fingerprint = 'stale' WHERE store = ?1 AND key = ?2",
            params![table.name(), key],
        )?;
        Ok(())
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS frames (
            store TEXT NOT NULL,
            key TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            columns_json TEXT NOT NULL,
            rows_json TEXT NOT NULL,
            n_rows INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (store, key)
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}
