// --- Audio mapping table (SQLite) -------------------------------------------
//
// sequence identifier -> audio file name. The resolver only reads this table;
// the admin endpoints write it.
//
// rusqlite is synchronous, so every operation opens the database inside
// spawn_blocking. The schema is created on demand.

use std::{collections::HashMap, path::PathBuf};

use rusqlite::{params, Connection};
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::error::MappingError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingEntry {
    pub sequence: String,
    pub audio_file: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct MappingStore {
    path: PathBuf,
}

impl MappingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load_all(&self) -> Result<HashMap<String, String>, MappingError> {
        let entries = self.list().await?;
        Ok(entries
            .into_iter()
            .map(|e| (e.sequence, e.audio_file))
            .collect())
    }

    pub async fn list(&self) -> Result<Vec<MappingEntry>, MappingError> {
        self.with_conn(|conn| db_list(conn)).await
    }

    pub async fn upsert(&self, sequence: &str, audio_file: &str) -> Result<(), MappingError> {
        let sequence = sequence.to_string();
        let audio_file = audio_file.to_string();
        self.with_conn(move |conn| db_upsert(conn, &sequence, &audio_file))
            .await
    }

    /// Returns whether a row was deleted.
    pub async fn remove(&self, sequence: &str) -> Result<bool, MappingError> {
        let sequence = sequence.to_string();
        self.with_conn(move |conn| db_remove(conn, &sequence)).await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, MappingError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<T, MappingError> {
            if let Some(parent) = path.parent() {
                // Let open() report the real error if this fails.
                let _ = std::fs::create_dir_all(parent);
            }
            let mut conn = Connection::open(&path)?;
            db_init(&conn)?;
            Ok(f(&mut conn)?)
        })
        .await?
    }
}

fn db_init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;

        CREATE TABLE IF NOT EXISTS audio_mappings (
            sequence    TEXT PRIMARY KEY,
            audio_file  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        "#,
    )
}

fn db_list(conn: &Connection) -> rusqlite::Result<Vec<MappingEntry>> {
    let mut stmt = conn.prepare(
        "SELECT sequence, audio_file, updated_at FROM audio_mappings ORDER BY sequence ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(MappingEntry {
            sequence: row.get(0)?,
            audio_file: row.get(1)?,
            updated_at: row.get(2)?,
        })
    })?;
    let out = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(out)
}

fn db_upsert(conn: &mut Connection, sequence: &str, audio_file: &str) -> rusqlite::Result<()> {
    let now = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    conn.execute(
        "INSERT INTO audio_mappings (sequence, audio_file, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(sequence) DO UPDATE SET audio_file = excluded.audio_file,
                                             updated_at = excluded.updated_at",
        params![sequence, audio_file, now],
    )?;
    Ok(())
}

fn db_remove(conn: &mut Connection, sequence: &str) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "DELETE FROM audio_mappings WHERE sequence = ?1",
        params![sequence],
    )?;
    Ok(n > 0)
}
