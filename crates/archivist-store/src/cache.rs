use std::collections::HashMap;
use std::sync::Arc;

use archivist_core::{ChangeToken, EntryKind, RemoteEntry, RemoteStore, StoreError};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Cached snapshots, all captured under one change-feed epoch.
///
/// A detected change anywhere drops every map at once; per-entry attribution
/// is deliberately not attempted.
#[derive(Default)]
struct CacheState {
    /// Baseline cursor; `None` until the first read establishes one.
    cursor: Option<ChangeToken>,
    folder_listings: HashMap<String, Vec<RemoteEntry>>,
    file_listings: HashMap<String, Vec<RemoteEntry>>,
    /// file id -> (bytes, filename)
    file_contents: HashMap<String, (Vec<u8>, String)>,
    /// file id -> owning folder id, populated by file listings
    file_to_folder: HashMap<String, String>,
}

impl CacheState {
    fn flush(&mut self) {
        self.folder_listings.clear();
        self.file_listings.clear();
        self.file_contents.clear();
        self.file_to_folder.clear();
    }

    /// Drop cached content for every file known to live in a folder.
    fn evict_folder_files(&mut self, folder_id: &str) {
        let ids: Vec<String> = self
            .file_to_folder
            .iter()
            .filter(|(_, owner)| owner.as_str() == folder_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            self.file_contents.remove(&id);
            self.file_to_folder.remove(&id);
        }
    }
}

/// Caching layer over the remote store, invalidated by the change feed.
///
/// Instead of per-entity freshness checks, every read issues one fixed-cost
/// "has anything changed?" probe. A quiet feed means every cached snapshot is
/// still valid; any reported change flushes the whole cache and re-baselines
/// the cursor at the feed's newest position. The cache's own writes re-baseline
/// immediately after the mutation so the next probe does not mistake them for
/// external changes.
pub struct ChangeAwareCache {
    remote: Arc<dyn RemoteStore>,
    state: Mutex<CacheState>,
}

impl ChangeAwareCache {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Probe the change feed once and reconcile the cache with the result.
    ///
    /// On the first call there is no baseline and nothing cached, so the feed
    /// head simply becomes the baseline. Afterwards: a quiet poll advances the
    /// cursor in place, a poll that found changes flushes everything and
    /// drains the feed's paging to its newest cursor.
    async fn sync_cursor(&self, state: &mut CacheState) -> Result<(), StoreError> {
        let cursor = match state.cursor.clone() {
            Some(cursor) => cursor,
            None => {
                state.cursor = Some(self.remote.change_cursor_start().await?);
                return Ok(());
            }
        };

        let mut page = self.remote.poll_changes(&cursor).await?;
        let mut changed = page.has_changes;
        while let Some(next) = page.next_page_token.take() {
            page = self.remote.poll_changes(&next).await?;
            changed |= page.has_changes;
        }

        if changed {
            debug!("change feed reported changes, flushing cache");
            state.flush();
        }
        state.cursor = Some(page.new_baseline);
        Ok(())
    }

    /// Adopt the backend's current feed head as the new baseline, so our own
    /// just-confirmed write is not replayed as an external change.
    async fn rebaseline(&self, state: &mut CacheState) -> Result<(), StoreError> {
        state.cursor = Some(self.remote.change_cursor_start().await?);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn list_folders(&self, parent_id: &str) -> Result<Vec<RemoteEntry>, StoreError> {
        let mut state = self.state.lock().await;
        self.sync_cursor(&mut state).await?;

        if let Some(cached) = state.folder_listings.get(parent_id) {
            debug!("list_folders cache hit for {}", parent_id);
            return Ok(cached.clone());
        }

        debug!("list_folders cache miss for {}", parent_id);
        let entries = self
            .remote
            .list_children(parent_id, Some(EntryKind::Folder))
            .await?;
        state
            .folder_listings
            .insert(parent_id.to_string(), entries.clone());
        Ok(entries)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteEntry>, StoreError> {
        let mut state = self.state.lock().await;
        self.sync_cursor(&mut state).await?;

        if let Some(cached) = state.file_listings.get(folder_id) {
            debug!("list_files cache hit for {}", folder_id);
            return Ok(cached.clone());
        }

        debug!("list_files cache miss for {}", folder_id);
        let entries = self
            .remote
            .list_children(folder_id, Some(EntryKind::File))
            .await?;
        for entry in &entries {
            state
                .file_to_folder
                .insert(entry.id.clone(), folder_id.to_string());
        }
        state
            .file_listings
            .insert(folder_id.to_string(), entries.clone());
        Ok(entries)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn download_file(&self, file_id: &str) -> Result<(Vec<u8>, String), StoreError> {
        let mut state = self.state.lock().await;
        self.sync_cursor(&mut state).await?;

        if let Some((bytes, name)) = state.file_contents.get(file_id) {
            debug!("download_file cache hit for {}", file_id);
            return Ok((bytes.clone(), name.clone()));
        }

        debug!("download_file cache miss for {}", file_id);
        let (bytes, name) = self.remote.download(file_id).await?;
        state
            .file_contents
            .insert(file_id.to_string(), (bytes.clone(), name.clone()));
        Ok((bytes, name))
    }

    /// Locate a file by exact name within a folder, through the cached file
    /// listing.
    pub async fn find_file(
        &self,
        folder_id: &str,
        name: &str,
    ) -> Result<Option<RemoteEntry>, StoreError> {
        let files = self.list_files(folder_id).await?;
        Ok(files.into_iter().find(|f| f.name == name))
    }

    /// Create a folder remotely, then evict the parent's cached listing and
    /// re-baseline the change cursor.
    #[instrument(skip(self), level = "debug")]
    pub async fn create_folder(
        &self,
        name: &str,
        parent_id: &str,
    ) -> Result<RemoteEntry, StoreError> {
        let created = self.remote.create_folder(name, parent_id).await?;

        let mut state = self.state.lock().await;
        state.folder_listings.remove(parent_id);
        self.rebaseline(&mut state).await?;
        debug!("evicted folder listing for {} after create_folder", parent_id);
        Ok(created)
    }

    /// Upload a new file remotely, then evict the folder's cached file
    /// listing and content index and re-baseline the change cursor.
    #[instrument(skip(self, bytes), level = "debug", fields(bytes_len = bytes.len()))]
    pub async fn upload_file(
        &self,
        bytes: &[u8],
        filename: &str,
        folder_id: &str,
    ) -> Result<RemoteEntry, StoreError> {
        let created = self.remote.create_file(filename, folder_id, bytes).await?;

        let mut state = self.state.lock().await;
        state.file_listings.remove(folder_id);
        state.evict_folder_files(folder_id);
        self.rebaseline(&mut state).await?;
        debug!("evicted file listing for {} after upload_file", folder_id);
        Ok(created)
    }

    /// Rewrite an existing file's content remotely, then evict its cached
    /// bytes and re-baseline the change cursor.
    #[instrument(skip(self, bytes), level = "debug", fields(bytes_len = bytes.len()))]
    pub async fn update_file(&self, file_id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.remote.update_file(file_id, bytes).await?;

        let mut state = self.state.lock().await;
        state.file_contents.remove(file_id);
        self.rebaseline(&mut state).await?;
        debug!("evicted cached content for {} after update_file", file_id);
        Ok(())
    }
}
