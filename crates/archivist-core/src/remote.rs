use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Kind of a remote entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Folder,
    File,
}

/// Immutable snapshot of a remote folder or file.
///
/// Identity is the remote-assigned id; the name is mutable remotely and not
/// unique. Listings are replaced wholesale on re-fetch, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub kind: EntryKind,
}

/// Opaque cursor into the remote backend's change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeToken(String);

impl ChangeToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of the change feed.
#[derive(Debug, Clone)]
pub struct ChangePage {
    /// Whether this page carried any change entries.
    pub has_changes: bool,
    /// Present when the feed has further pages to drain.
    pub next_page_token: Option<ChangeToken>,
    /// Newest cursor to adopt once the feed is drained.
    pub new_baseline: ChangeToken,
}

/// Transport boundary to the remote hierarchical file store.
///
/// Every method is one logical remote round trip against a latency-bound,
/// rate-limited API. Implementations classify failures per `StoreError` and
/// retry transient ones internally; callers see the final outcome.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns the backend identifier (e.g., "drive", "mock").
    fn backend_name(&self) -> &'static str;

    /// List the children of a folder, ordered by name, optionally filtered
    /// by kind.
    async fn list_children(
        &self,
        parent_id: &str,
        kind: Option<EntryKind>,
    ) -> Result<Vec<RemoteEntry>, StoreError>;

    /// Fetch an entry's last modification time.
    async fn get_modified_time(&self, id: &str) -> Result<DateTime<Utc>, StoreError>;

    /// Download a file's bytes together with its current name.
    async fn download(&self, id: &str) -> Result<(Vec<u8>, String), StoreError>;

    /// Create an empty folder under a parent.
    async fn create_folder(&self, name: &str, parent_id: &str)
        -> Result<RemoteEntry, StoreError>;

    /// Create a file with the given content under a parent.
    async fn create_file(
        &self,
        name: &str,
        parent_id: &str,
        bytes: &[u8],
    ) -> Result<RemoteEntry, StoreError>;

    /// Replace an existing file's content in place.
    async fn update_file(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Obtain a cursor at the current head of the change feed.
    async fn change_cursor_start(&self) -> Result<ChangeToken, StoreError>;

    /// Poll the change feed from a cursor.
    async fn poll_changes(&self, token: &ChangeToken) -> Result<ChangePage, StoreError>;
}
