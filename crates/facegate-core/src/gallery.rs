//! Gallery of enrolled (identity, embedding) records.
//!
//! Append is the only mutation the pipeline performs. Scans return an owned
//! snapshot of everything committed before the scan started, in append order.

use crate::types::{Embedding, GalleryRecord, RecordId, EMBEDDING_DIM};
use rusqlite::{params, Connection};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("identity label must not be empty")]
    InvalidIdentity,
    #[error("embedding has a non-finite value at index {0}")]
    NonFiniteEmbedding(usize),
    #[error("record {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("store lock poisoned")]
    Poisoned,
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store task failed: {0}")]
    Task(String),
}

/// How a scan treats a stored record whose embedding cannot be decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanPolicy {
    /// Fail the whole scan with [`StoreError::Corrupt`].
    #[default]
    Strict,
    /// Log a warning and skip the record.
    Lenient,
}

impl FromStr for ScanPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            other => Err(format!("unknown scan policy: {other}")),
        }
    }
}

/// Immutable, ordered view of the gallery at scan time. Iterate it as often as needed.
#[derive(Debug, Clone, Default)]
pub struct GallerySnapshot {
    records: Arc<Vec<GalleryRecord>>,
}

impl GallerySnapshot {
    pub fn records(&self) -> &[GalleryRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GalleryRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a GallerySnapshot {
    type Item = &'a GalleryRecord;
    type IntoIter = std::slice::Iter<'a, GalleryRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Storage backend for enrolled faces.
pub trait GalleryStore: Send + Sync {
    /// Store a new record. Never overwrites or merges with an existing identity.
    fn append(&self, identity: &str, embedding: &Embedding) -> Result<RecordId, StoreError>;

    /// Snapshot every record committed before the call, in append order.
    fn scan(&self) -> Result<GallerySnapshot, StoreError>;
}

fn validate(identity: &str, embedding: &Embedding) -> Result<(), StoreError> {
    if identity.trim().is_empty() {
        return Err(StoreError::InvalidIdentity);
    }
    if let Some(index) = embedding.first_non_finite() {
        return Err(StoreError::NonFiniteEmbedding(index));
    }
    Ok(())
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// In-process gallery. Scans share the committed vector; appends copy on write.
#[derive(Default)]
pub struct MemoryGallery {
    records: RwLock<Arc<Vec<GalleryRecord>>>,
}

impl MemoryGallery {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GalleryStore for MemoryGallery {
    fn append(&self, identity: &str, embedding: &Embedding) -> Result<RecordId, StoreError> {
        validate(identity, embedding)?;

        let record = GalleryRecord {
            id: RecordId::generate(),
            identity: identity.to_string(),
            embedding: embedding.clone(),
            created_at: now_rfc3339(),
        };
        let id = record.id.clone();

        let mut guard = self.records.write().map_err(|_| StoreError::Poisoned)?;
        // Clones the vector only while a snapshot still holds the old one.
        Arc::make_mut(&mut guard).push(record);

        tracing::debug!(%id, identity, "record appended");
        Ok(id)
    }

    fn scan(&self) -> Result<GallerySnapshot, StoreError> {
        let guard = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(GallerySnapshot {
            records: Arc::clone(&guard),
        })
    }
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS gallery (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    id         TEXT NOT NULL UNIQUE,
    identity   TEXT NOT NULL,
    embedding  BLOB,
    created_at TEXT NOT NULL
);
";

/// SQLite-backed gallery. Embeddings are stored as little-endian f32 blobs.
pub struct SqliteGallery {
    conn: Mutex<Connection>,
    policy: ScanPolicy,
}

impl SqliteGallery {
    /// Open or create the gallery database at `path`.
    pub fn open(path: impl AsRef<Path>, policy: ScanPolicy) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), ?policy, "gallery opened");
        Self::with_connection(conn, policy)
    }

    pub fn open_in_memory(policy: ScanPolicy) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, policy)
    }

    fn with_connection(conn: Connection, policy: ScanPolicy) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            policy,
        })
    }

    /// Administrative removal by record id. Returns whether a record was deleted.
    pub fn remove(&self, id: &RecordId) -> Result<bool, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let deleted = conn.execute("DELETE FROM gallery WHERE id = ?1", params![id.as_str()])?;
        tracing::info!(%id, deleted, "record removal requested");
        Ok(deleted > 0)
    }
}

impl GalleryStore for SqliteGallery {
    fn append(&self, identity: &str, embedding: &Embedding) -> Result<RecordId, StoreError> {
        validate(identity, embedding)?;

        let id = RecordId::generate();
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT INTO gallery (id, identity, embedding, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                id.as_str(),
                identity,
                encode_embedding(embedding),
                now_rfc3339()
            ],
        )?;

        tracing::debug!(%id, identity, "record appended");
        Ok(id)
    }

    fn scan(&self) -> Result<GallerySnapshot, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt =
            conn.prepare("SELECT id, identity, embedding, created_at FROM gallery ORDER BY seq")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<Vec<u8>>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for row in rows {
            let (id, identity, blob, created_at) = row?;
            let decoded = blob
                .ok_or_else(|| "embedding missing".to_string())
                .and_then(|b| decode_embedding(&b));

            match decoded {
                Ok(embedding) => records.push(GalleryRecord {
                    id: RecordId::from(id),
                    identity,
                    embedding,
                    created_at,
                }),
                Err(reason) => match self.policy {
                    ScanPolicy::Strict => return Err(StoreError::Corrupt { id, reason }),
                    ScanPolicy::Lenient => {
                        tracing::warn!(%id, %identity, %reason, "skipping corrupt gallery record");
                        skipped += 1;
                    }
                },
            }
        }

        tracing::debug!(records = records.len(), skipped, "gallery scanned");
        Ok(GallerySnapshot {
            records: Arc::new(records),
        })
    }
}

fn encode_embedding(embedding: &Embedding) -> Vec<u8> {
    let values = embedding.values();
    let mut bytes = Vec::with_capacity(std::mem::size_of_val(values));
    for &value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_embedding(blob: &[u8]) -> Result<Embedding, String> {
    let expected = EMBEDDING_DIM * std::mem::size_of::<f32>();
    if blob.len() != expected {
        return Err(format!(
            "invalid embedding byte length: expected {expected}, got {}",
            blob.len()
        ));
    }

    let values = blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let embedding = Embedding::new(values).map_err(|e| e.to_string())?;
    match embedding.first_non_finite() {
        Some(index) => Err(format!("non-finite value at index {index}")),
        None => Ok(embedding),
    }
}
