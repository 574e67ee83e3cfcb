use std::sync::Arc;

use archivist_core::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::cache::ChangeAwareCache;

const BOM: &str = "\u{feff}";

/// Ledger column order; written explicitly so an empty ledger still carries
/// its header row.
const LEDGER_FIELDS: [&str; 9] = [
    "scopeId",
    "scopeName",
    "version",
    "content",
    "author",
    "createdAt",
    "updatedAt",
    "note",
    "pinned",
];

/// One versioned record in the ledger.
///
/// Versions are unique within a scope and assigned by incrementing the
/// scope's current maximum. At most one record per scope is pinned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedRecord {
    pub scope_id: String,
    pub scope_name: String,
    pub version: u32,
    pub content: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub pinned: bool,
}

/// How a scope lookup matched the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMatch {
    /// Records matched by scope id.
    ById,
    /// No id match; records matched by scope display name.
    ByName,
    /// The scope has no records at all.
    Empty,
}

/// Versioned record store over a single remote CSV ledger.
///
/// The ledger file holds all records for all scopes and must pre-exist in
/// the root folder; it is never auto-created. Every mutation loads the whole
/// ledger, rewrites it in memory, and uploads it back, serialized behind one
/// store-wide lock. That read-modify-write cycle is only safe within a single
/// process.
pub struct RecordStore {
    cache: Arc<ChangeAwareCache>,
    root_folder_id: String,
    ledger_name: String,
    write_lock: Mutex<()>,
}

impl RecordStore {
    pub fn new(
        cache: Arc<ChangeAwareCache>,
        root_folder_id: impl Into<String>,
        ledger_name: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            root_folder_id: root_folder_id.into(),
            ledger_name: ledger_name.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn missing_ledger(&self) -> StoreError {
        StoreError::Config(format!(
            "ledger file '{}' not found in root folder {}; create it remotely first",
            self.ledger_name, self.root_folder_id
        ))
    }

    /// Load the full ledger. Returns the rows and, when the file exists, its
    /// remote id for writing back.
    async fn load(&self) -> Result<(Vec<VersionedRecord>, Option<String>), StoreError> {
        let file = self
            .cache
            .find_file(&self.root_folder_id, &self.ledger_name)
            .await?;
        let Some(file) = file else {
            return Ok((Vec::new(), None));
        };
        let (bytes, _) = self.cache.download_file(&file.id).await?;
        Ok((parse_ledger(&bytes)?, Some(file.id)))
    }

    /// Rewrite the full ledger back to the remote file.
    async fn save(&self, file_id: &str, rows: &[VersionedRecord]) -> Result<(), StoreError> {
        let bytes = serialize_ledger(rows)?;
        self.cache.update_file(file_id, &bytes).await
    }

    /// All records of a scope in display order: unpinned ascending by
    /// version, the pinned record (if any) last.
    #[instrument(skip(self), level = "debug")]
    pub async fn list_versions(
        &self,
        scope_id: &str,
        scope_name: &str,
    ) -> Result<Vec<VersionedRecord>, StoreError> {
        let (rows, _) = self.load().await?;
        let (indices, matched) = scope_indices(&rows, scope_id, scope_name);
        debug!(
            "scope {} resolved {:?} with {} records",
            scope_id,
            matched,
            indices.len()
        );
        let records = indices.into_iter().map(|i| rows[i].clone()).collect();
        Ok(sort_for_display(records))
    }

    /// The record a scope currently surfaces: the pinned one if any,
    /// otherwise the highest version. `None` for an empty scope.
    pub async fn get_current(
        &self,
        scope_id: &str,
        scope_name: &str,
    ) -> Result<Option<VersionedRecord>, StoreError> {
        let mut versions = self.list_versions(scope_id, scope_name).await?;
        Ok(versions.pop())
    }

    /// Append a new record to a scope, assigning the next version number.
    ///
    /// A fresh append becomes the scope's natural current record, so any
    /// existing pin in the scope is cleared.
    #[instrument(skip(self, content, note), level = "debug")]
    pub async fn append(
        &self,
        scope_id: &str,
        scope_name: &str,
        content: &str,
        author: &str,
        note: &str,
    ) -> Result<VersionedRecord, StoreError> {
        let _guard = self.write_lock.lock().await;
        let (mut rows, file_id) = self.load().await?;
        let file_id = file_id.ok_or_else(|| self.missing_ledger())?;

        let (indices, _) = scope_indices(&rows, scope_id, scope_name);
        let next_version = indices
            .iter()
            .map(|&i| rows[i].version)
            .max()
            .unwrap_or(0)
            + 1;
        for &i in &indices {
            rows[i].pinned = false;
        }

        let now = Utc::now();
        let record = VersionedRecord {
            scope_id: scope_id.to_string(),
            scope_name: scope_name.to_string(),
            version: next_version,
            content: content.to_string(),
            author: author.to_string(),
            created_at: now,
            updated_at: now,
            note: note.to_string(),
            pinned: false,
        };
        rows.push(record.clone());
        self.save(&file_id, &rows).await?;

        debug!("appended version {} to scope {}", next_version, scope_id);
        Ok(record)
    }

    /// Edit the record identified by `(scope_id, version)`. Returns `None`
    /// when no such record exists; the ledger is left untouched.
    #[instrument(skip(self, content, note), level = "debug")]
    pub async fn edit(
        &self,
        scope_id: &str,
        version: u32,
        content: &str,
        note: &str,
        author: &str,
    ) -> Result<Option<VersionedRecord>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let (mut rows, file_id) = self.load().await?;
        let file_id = file_id.ok_or_else(|| self.missing_ledger())?;

        let Some(pos) = rows
            .iter()
            .position(|r| r.scope_id == scope_id && r.version == version)
        else {
            return Ok(None);
        };

        rows[pos].content = content.to_string();
        rows[pos].note = note.to_string();
        rows[pos].author = author.to_string();
        rows[pos].updated_at = Utc::now();
        self.save(&file_id, &rows).await?;

        Ok(Some(rows[pos].clone()))
    }

    /// Delete the record identified by `(scope_id, version)`. Returns false
    /// when nothing matched; no write is performed in that case.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete(&self, scope_id: &str, version: u32) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let (mut rows, file_id) = self.load().await?;
        let file_id = file_id.ok_or_else(|| self.missing_ledger())?;

        let before = rows.len();
        rows.retain(|r| !(r.scope_id == scope_id && r.version == version));
        if rows.len() == before {
            return Ok(false);
        }

        self.save(&file_id, &rows).await?;
        debug!("deleted version {} from scope {}", version, scope_id);
        Ok(true)
    }

    /// Toggle the pin on `(scope_id, version)`: pin it (unpinning everything
    /// else in the scope) if unpinned, unpin it otherwise. Returns the new
    /// pinned state, or `None` if the record does not exist.
    #[instrument(skip(self), level = "debug")]
    pub async fn toggle_pin(
        &self,
        scope_id: &str,
        version: u32,
    ) -> Result<Option<bool>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let (mut rows, file_id) = self.load().await?;
        let file_id = file_id.ok_or_else(|| self.missing_ledger())?;

        let Some(pos) = rows
            .iter()
            .position(|r| r.scope_id == scope_id && r.version == version)
        else {
            return Ok(None);
        };

        let newly_pinned = !rows[pos].pinned;
        if newly_pinned {
            for r in rows.iter_mut().filter(|r| r.scope_id == scope_id) {
                r.pinned = false;
            }
        }
        rows[pos].pinned = newly_pinned;
        self.save(&file_id, &rows).await?;

        Ok(Some(newly_pinned))
    }
}

/// Two-step scope lookup: match by id first, fall back to display name.
fn scope_indices(
    rows: &[VersionedRecord],
    scope_id: &str,
    scope_name: &str,
) -> (Vec<usize>, ScopeMatch) {
    let by_id: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| r.scope_id == scope_id)
        .map(|(i, _)| i)
        .collect();
    if !by_id.is_empty() {
        return (by_id, ScopeMatch::ById);
    }

    let by_name: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| r.scope_name == scope_name)
        .map(|(i, _)| i)
        .collect();
    if !by_name.is_empty() {
        return (by_name, ScopeMatch::ByName);
    }

    (Vec::new(), ScopeMatch::Empty)
}

/// Sort for display: unpinned ascending by version, pinned last.
fn sort_for_display(records: Vec<VersionedRecord>) -> Vec<VersionedRecord> {
    let (pinned, mut unpinned): (Vec<_>, Vec<_>) =
        records.into_iter().partition(|r| r.pinned);
    unpinned.sort_by_key(|r| r.version);
    unpinned.extend(pinned);
    unpinned
}

/// Parse the CSV ledger, tolerating a UTF-8 byte-order mark and an empty
/// file.
pub(crate) fn parse_ledger(bytes: &[u8]) -> Result<Vec<VersionedRecord>, StoreError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| StoreError::Serialization(format!("ledger is not valid UTF-8: {}", e)))?;
    let text = text.strip_prefix(BOM).unwrap_or(text);
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new().from_reader(text.as_bytes());
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let record: VersionedRecord = result
            .map_err(|e| StoreError::Serialization(format!("bad ledger row: {}", e)))?;
        rows.push(record);
    }
    Ok(rows)
}

/// Serialize the ledger: BOM, fully quoted fields, header always present.
pub(crate) fn serialize_ledger(rows: &[VersionedRecord]) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    buf.extend_from_slice(BOM.as_bytes());

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .has_headers(false)
        .from_writer(&mut buf);
    writer
        .write_record(LEDGER_FIELDS)
        .map_err(|e| StoreError::Serialization(format!("failed to write header: {}", e)))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| StoreError::Serialization(format!("failed to write row: {}", e)))?;
    }
    writer
        .flush()
        .map_err(|e| StoreError::Serialization(format!("failed to flush ledger: {}", e)))?;
    drop(writer);

    Ok(buf)
}
