//! `SQLite` metadata store: schema, pragmas, and the image table contract.
//!
//! One table, keyed by absolute path:
//!
//! ```sql
//! CREATE TABLE images (
//!     path       TEXT PRIMARY KEY,
//!     tags       TEXT,        -- comma-joined tag strings
//!     embedding  BLOB,        -- little-endian f32 components
//!     indexed_at TEXT         -- ISO-8601, second precision
//! )
//! ```
//!
//! The vector sidecar must hold exactly the same path set; every mutation
//! here is paired with one there by the indexer.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use crate::model::types::{ImageRecord, SearchResult};

/// Thread-safe handle over the metadata database.
pub struct MetadataStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl MetadataStore {
    /// Open (creating if needed) the database at `path` and ensure schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create data dir {}", parent.display()))?;
        }
        let start = Instant::now();
        let conn = Connection::open(path)
            .with_context(|| format!("open metadata db at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS images (
                path       TEXT PRIMARY KEY,
                tags       TEXT,
                embedding  BLOB,
                indexed_at TEXT
            )",
            [],
        )?;
        info!(
            path = %path.display(),
            elapsed_ms = start.elapsed().as_millis(),
            "opened metadata database"
        );
        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Upsert one image record. `indexed_at` defaults to the current local
    /// time at second precision.
    pub fn add_image(
        &self,
        path: &Path,
        tags: &[String],
        embedding: &[f32],
        indexed_at: Option<&str>,
    ) -> Result<()> {
        let stamp = match indexed_at {
            Some(s) => s.to_string(),
            None => now_timestamp(),
        };
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO images (path, tags, embedding, indexed_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    path_key(path),
                    tags.join(","),
                    embedding_to_blob(embedding),
                    stamp
                ],
            )
            .with_context(|| format!("upsert image {}", path.display()))?;
        Ok(())
    }

    /// Delete one record. No error if the path was never indexed.
    pub fn remove_image(&self, path: &Path) -> Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM images WHERE path = ?1", params![path_key(path)])
            .with_context(|| format!("remove image {}", path.display()))?;
        Ok(())
    }

    pub fn get_all_images(&self) -> Result<Vec<SearchResult>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT path, tags, indexed_at FROM images")?;
        let rows = stmt
            .query_map([], row_to_result)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Records whose path lies under `folder`.
    ///
    /// Prefix match requires the trailing separator so a folder named
    /// `Photos` does not also match `PhotosNew`; the folder path itself is
    /// matched exactly as a degenerate case.
    pub fn get_images_in_folder(&self, folder: &Path) -> Result<Vec<SearchResult>> {
        let exact = path_key(folder);
        let mut prefix = exact.clone();
        if !prefix.ends_with(std::path::MAIN_SEPARATOR) {
            prefix.push(std::path::MAIN_SEPARATOR);
        }
        let pattern = format!("{}%", escape_like(&prefix));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT path, tags, indexed_at FROM images
             WHERE path LIKE ?1 ESCAPE '\\' OR path = ?2",
        )?;
        let rows = stmt
            .query_map(params![pattern, exact], row_to_result)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Substring match against the stored tag strings, case-sensitive as
    /// stored. Row order is whatever the store returns.
    pub fn search_by_tag(&self, query: &str) -> Result<Vec<SearchResult>> {
        let pattern = format!("%{}%", escape_like(query));
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT path, tags, indexed_at FROM images WHERE tags LIKE ?1 ESCAPE '\\'",
        )?;
        let rows = stmt
            .query_map(params![pattern], row_to_result)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Replace the tag set for an already-indexed path.
    pub fn update_tags(&self, path: &Path, tags: &[String]) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "UPDATE images SET tags = ?1 WHERE path = ?2",
                params![tags.join(","), path_key(path)],
            )
            .with_context(|| format!("update tags for {}", path.display()))?;
        Ok(())
    }

    /// Full record including the embedding, or `None` if not indexed.
    pub fn get_image(&self, path: &Path) -> Result<Option<ImageRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT path, tags, embedding, indexed_at FROM images WHERE path = ?1",
                params![path_key(path)],
                |row| {
                    let path: String = row.get(0)?;
                    let tags: Option<String> = row.get(1)?;
                    let blob: Option<Vec<u8>> = row.get(2)?;
                    let indexed_at: Option<String> = row.get(3)?;
                    Ok(ImageRecord {
                        path: PathBuf::from(path),
                        tags: split_tags(tags.as_deref()),
                        embedding: blob_to_embedding(blob.as_deref().unwrap_or_default()),
                        indexed_at: indexed_at.unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn image_count(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .lock()
                .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn row_to_result(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchResult> {
    let path: String = row.get(0)?;
    let tags: Option<String> = row.get(1)?;
    let indexed_at: Option<String> = row.get(2)?;
    Ok(SearchResult {
        path: PathBuf::from(path),
        tags: split_tags(tags.as_deref()),
        indexed_at: indexed_at.unwrap_or_default(),
    })
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn split_tags(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// LIKE wildcards in user input or paths are literal characters here.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '\\' || c == '%' || c == '_' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn now_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for component in embedding {
        blob.extend_from_slice(&component.to_le_bytes());
    }
    blob
}

pub fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
