//! In-memory remote store used by cache and ledger tests.

use std::collections::HashMap;
use std::sync::Mutex;

use archivist_core::{ChangePage, ChangeToken, EntryKind, RemoteEntry, RemoteStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Scriptable remote backend with a counter-based change feed.
///
/// The feed head is a monotonic counter; every mutation bumps it, and a poll
/// reports changes whenever the polled cursor lags the head. `external_touch`
/// bumps the head without going through the store, simulating an edit made by
/// somebody else.
#[derive(Default)]
pub(crate) struct MockRemote {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    head: u64,
    next_id: u64,
    folders: HashMap<String, Vec<RemoteEntry>>,
    files: HashMap<String, Vec<RemoteEntry>>,
    contents: HashMap<String, (Vec<u8>, String)>,
    list_calls: u32,
    download_calls: u32,
    poll_calls: u32,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an external edit somewhere in the tree.
    pub fn external_touch(&self) {
        self.state.lock().unwrap().head += 1;
    }

    /// Place a file directly into the backend, without feed movement.
    pub fn seed_file(&self, folder_id: &str, name: &str, bytes: &[u8]) -> String {
        let mut state = self.state.lock().unwrap();
        let id = format!("id-{}", state.next_id);
        state.next_id += 1;
        state
            .files
            .entry(folder_id.to_string())
            .or_default()
            .push(RemoteEntry {
                id: id.clone(),
                name: name.to_string(),
                kind: EntryKind::File,
            });
        state
            .contents
            .insert(id.clone(), (bytes.to_vec(), name.to_string()));
        id
    }

    /// Place a folder directly into the backend, without feed movement.
    pub fn seed_folder(&self, parent_id: &str, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = format!("id-{}", state.next_id);
        state.next_id += 1;
        state
            .folders
            .entry(parent_id.to_string())
            .or_default()
            .push(RemoteEntry {
                id: id.clone(),
                name: name.to_string(),
                kind: EntryKind::Folder,
            });
        id
    }

    /// Raw stored bytes of a file, for byte-for-byte assertions.
    pub fn file_bytes(&self, id: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .contents
            .get(id)
            .map(|(bytes, _)| bytes.clone())
    }

    pub fn list_calls(&self) -> u32 {
        self.state.lock().unwrap().list_calls
    }

    pub fn download_calls(&self) -> u32 {
        self.state.lock().unwrap().download_calls
    }

    #[allow(dead_code)]
    pub fn poll_calls(&self) -> u32 {
        self.state.lock().unwrap().poll_calls
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    fn backend_name(&self) -> &'static str {
        "mock"
    }

    async fn list_children(
        &self,
        parent_id: &str,
        kind: Option<EntryKind>,
    ) -> Result<Vec<RemoteEntry>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        let folders = state.folders.get(parent_id).cloned().unwrap_or_default();
        let files = state.files.get(parent_id).cloned().unwrap_or_default();
        Ok(match kind {
            Some(EntryKind::Folder) => folders,
            Some(EntryKind::File) => files,
            None => {
                let mut all = folders;
                all.extend(files);
                all
            }
        })
    }

    async fn get_modified_time(&self, _id: &str) -> Result<DateTime<Utc>, StoreError> {
        Ok(Utc::now())
    }

    async fn download(&self, id: &str) -> Result<(Vec<u8>, String), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.download_calls += 1;
        state
            .contents
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("no file {}", id)))
    }

    async fn create_folder(
        &self,
        name: &str,
        parent_id: &str,
    ) -> Result<RemoteEntry, StoreError> {
        let mut state = self.state.lock().unwrap();
        let id = format!("id-{}", state.next_id);
        state.next_id += 1;
        let entry = RemoteEntry {
            id,
            name: name.to_string(),
            kind: EntryKind::Folder,
        };
        state
            .folders
            .entry(parent_id.to_string())
            .or_default()
            .push(entry.clone());
        state.head += 1;
        Ok(entry)
    }

    async fn create_file(
        &self,
        name: &str,
        parent_id: &str,
        bytes: &[u8],
    ) -> Result<RemoteEntry, StoreError> {
        let mut state = self.state.lock().unwrap();
        let id = format!("id-{}", state.next_id);
        state.next_id += 1;
        let entry = RemoteEntry {
            id: id.clone(),
            name: name.to_string(),
            kind: EntryKind::File,
        };
        state
            .files
            .entry(parent_id.to_string())
            .or_default()
            .push(entry.clone());
        state
            .contents
            .insert(id, (bytes.to_vec(), name.to_string()));
        state.head += 1;
        Ok(entry)
    }

    async fn update_file(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        match state.contents.get_mut(id) {
            Some(stored) => stored.0 = bytes.to_vec(),
            None => return Err(StoreError::NotFound(format!("no file {}", id))),
        }
        state.head += 1;
        Ok(())
    }

    async fn change_cursor_start(&self) -> Result<ChangeToken, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(ChangeToken::new(state.head.to_string()))
    }

    async fn poll_changes(&self, token: &ChangeToken) -> Result<ChangePage, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.poll_calls += 1;
        let seen: u64 = token.as_str().parse().unwrap_or(0);
        Ok(ChangePage {
            has_changes: seen < state.head,
            next_page_token: None,
            new_baseline: ChangeToken::new(state.head.to_string()),
        })
    }
}
