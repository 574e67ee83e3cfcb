use std::time::Duration;

use archivist_core::{
    ChangePage, ChangeToken, EntryKind, RemoteEntry, RemoteStore, RetryPolicy, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const MULTIPART_BOUNDARY: &str = "archivist-upload-boundary";

/// Bearer-token REST client for a Drive-v3-style remote file API.
///
/// Every method is one HTTP round trip wrapped in the shared retry policy;
/// transient failures (connectivity, timeouts, 429/5xx) are retried, terminal
/// statuses map straight onto the error taxonomy. `reqwest::Client` is
/// internally pooled and `Send + Sync`, so one client serves all tasks.
pub struct DriveClient {
    http: HttpClient,
    base_url: String,
    token: String,
    retry: RetryPolicy,
}

impl DriveClient {
    /// Create a client with default timeout and retry settings.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: normalize_base(base_url.into()),
            token: token.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Create a client with an explicit per-request timeout and retry policy.
    pub fn with_options(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, StoreError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Config(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            http,
            base_url: normalize_base(base_url.into()),
            token: token.into(),
            retry,
        })
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header("Authorization", format!("Bearer {}", self.token))
    }

    /// Map a non-success status onto the error taxonomy.
    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => StoreError::NotFound(body),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::PermissionDenied(body),
            StatusCode::BAD_REQUEST => StoreError::InvalidRequest(body),
            // 429 and 5xx are worth retrying
            _ => StoreError::Transport(format!("status {}: {}", status, body)),
        })
    }

    fn transport(err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout(err.to_string())
        } else {
            StoreError::Transport(err.to_string())
        }
    }

    async fn get_json<T>(&self, url: &str, query: &[(&str, &str)]) -> Result<T, StoreError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .auth(self.http.get(url))
            .query(query)
            .send()
            .await
            .map_err(Self::transport)?;
        let response = Self::check(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Serialization(format!("bad response from {}: {}", url, e)))
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    fn backend_name(&self) -> &'static str {
        "drive"
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_children(
        &self,
        parent_id: &str,
        kind: Option<EntryKind>,
    ) -> Result<Vec<RemoteEntry>, StoreError> {
        let clause = match kind {
            Some(EntryKind::Folder) => format!(" and mimeType = '{}'", FOLDER_MIME),
            Some(EntryKind::File) => format!(" and mimeType != '{}'", FOLDER_MIME),
            None => String::new(),
        };
        let q = format!("'{}' in parents{} and trashed = false", parent_id, clause);
        let url = format!("{}/files", self.base_url);
        let params = [
            ("q", q.as_str()),
            ("orderBy", "name"),
            ("fields", "files(id, name, mimeType)"),
        ];

        let list: FileList = self.retry.run(|| self.get_json(&url, &params)).await?;
        debug!("listed {} children of {}", list.files.len(), parent_id);
        Ok(list.files.into_iter().map(DriveFile::into_entry).collect())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_modified_time(&self, id: &str) -> Result<DateTime<Utc>, StoreError> {
        let url = format!("{}/files/{}", self.base_url, id);
        let params = [("fields", "modifiedTime")];
        let meta: FileMeta = self.retry.run(|| self.get_json(&url, &params)).await?;
        let raw = meta
            .modified_time
            .ok_or_else(|| StoreError::Serialization(format!("no modifiedTime for {}", id)))?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::Serialization(format!("bad modifiedTime for {}: {}", id, e)))
    }

    #[instrument(skip(self), level = "debug")]
    async fn download(&self, id: &str) -> Result<(Vec<u8>, String), StoreError> {
        let url = format!("{}/files/{}", self.base_url, id);

        let params = [("fields", "name")];
        let meta: FileMeta = self.retry.run(|| self.get_json(&url, &params)).await?;
        let name = meta
            .name
            .ok_or_else(|| StoreError::Serialization(format!("no name for {}", id)))?;

        let bytes = self
            .retry
            .run(|| async {
                let response = self
                    .auth(self.http.get(&url))
                    .query(&[("alt", "media")])
                    .send()
                    .await
                    .map_err(Self::transport)?;
                let response = Self::check(response).await?;
                response
                    .bytes()
                    .await
                    .map(|b| b.to_vec())
                    .map_err(Self::transport)
            })
            .await?;

        debug!("downloaded {} ({} bytes)", id, bytes.len());
        Ok((bytes, name))
    }

    #[instrument(skip(self), level = "debug")]
    async fn create_folder(
        &self,
        name: &str,
        parent_id: &str,
    ) -> Result<RemoteEntry, StoreError> {
        let url = format!("{}/files", self.base_url);
        let body = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME,
            "parents": [parent_id],
        });

        let created: DriveFile = self
            .retry
            .run(|| async {
                let response = self
                    .auth(self.http.post(&url))
                    .query(&[("fields", "id, name")])
                    .json(&body)
                    .send()
                    .await
                    .map_err(Self::transport)?;
                let response = Self::check(response).await?;
                response.json().await.map_err(|e| {
                    StoreError::Serialization(format!("bad response from {}: {}", url, e))
                })
            })
            .await?;

        debug!("created folder {} under {}", created.id, parent_id);
        Ok(RemoteEntry {
            id: created.id,
            name: created.name,
            kind: EntryKind::Folder,
        })
    }

    #[instrument(skip(self, bytes), level = "debug", fields(bytes_len = bytes.len()))]
    async fn create_file(
        &self,
        name: &str,
        parent_id: &str,
        bytes: &[u8],
    ) -> Result<RemoteEntry, StoreError> {
        let url = format!("{}/upload/files", self.base_url);
        let metadata = serde_json::json!({ "name": name, "parents": [parent_id] });
        let body = multipart_related(&metadata, bytes);

        let created: DriveFile = self
            .retry
            .run(|| async {
                let response = self
                    .auth(self.http.post(&url))
                    .query(&[("uploadType", "multipart"), ("fields", "id, name")])
                    .header(
                        "Content-Type",
                        format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
                    )
                    .body(body.clone())
                    .send()
                    .await
                    .map_err(Self::transport)?;
                let response = Self::check(response).await?;
                response.json().await.map_err(|e| {
                    StoreError::Serialization(format!("bad response from {}: {}", url, e))
                })
            })
            .await?;

        debug!("uploaded {} as {} ({} bytes)", name, created.id, bytes.len());
        Ok(RemoteEntry {
            id: created.id,
            name: created.name,
            kind: EntryKind::File,
        })
    }

    #[instrument(skip(self, bytes), level = "debug", fields(bytes_len = bytes.len()))]
    async fn update_file(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let url = format!("{}/upload/files/{}", self.base_url, id);

        self.retry
            .run(|| async {
                let response = self
                    .auth(self.http.patch(&url))
                    .query(&[("uploadType", "media")])
                    .header("Content-Type", "application/octet-stream")
                    .body(bytes.to_vec())
                    .send()
                    .await
                    .map_err(Self::transport)?;
                Self::check(response).await.map(|_| ())
            })
            .await?;

        debug!("updated {} ({} bytes)", id, bytes.len());
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn change_cursor_start(&self) -> Result<ChangeToken, StoreError> {
        let url = format!("{}/changes/startPageToken", self.base_url);
        let params: [(&str, &str); 0] = [];
        let start: StartPageToken = self.retry.run(|| self.get_json(&url, &params)).await?;
        Ok(ChangeToken::new(start.start_page_token))
    }

    #[instrument(skip(self), level = "debug")]
    async fn poll_changes(&self, token: &ChangeToken) -> Result<ChangePage, StoreError> {
        let url = format!("{}/changes", self.base_url);
        let params = [
            ("pageToken", token.as_str()),
            ("fields", "changes(fileId), nextPageToken, newStartPageToken"),
        ];

        let list: ChangeList = self.retry.run(|| self.get_json(&url, &params)).await?;
        // newStartPageToken only appears on the feed's last page
        let new_baseline = list
            .new_start_page_token
            .map(ChangeToken::new)
            .unwrap_or_else(|| token.clone());

        Ok(ChangePage {
            has_changes: !list.changes.is_empty(),
            next_page_token: list.next_page_token.map(ChangeToken::new),
            new_baseline,
        })
    }
}

fn normalize_base(base_url: String) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Build a `multipart/related` body: a JSON metadata part followed by the
/// raw content part, the format the Drive upload endpoint expects.
fn multipart_related(metadata: &serde_json::Value, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 256);
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n",
            MULTIPART_BOUNDARY
        )
        .as_bytes(),
    );
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(
        format!(
            "\r\n--{}\r\nContent-Type: application/octet-stream\r\n\r\n",
            MULTIPART_BOUNDARY
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
    #[serde(rename = "mimeType", default)]
    mime_type: Option<String>,
}

impl DriveFile {
    fn into_entry(self) -> RemoteEntry {
        let kind = if self.mime_type.as_deref() == Some(FOLDER_MIME) {
            EntryKind::Folder
        } else {
            EntryKind::File
        };
        RemoteEntry {
            id: self.id,
            name: self.name,
            kind,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct FileMeta {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "modifiedTime", default)]
    modified_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StartPageToken {
    #[serde(rename = "startPageToken")]
    start_page_token: String,
}

#[derive(Debug, Deserialize)]
struct ChangeList {
    #[serde(default)]
    changes: Vec<serde_json::Value>,
    #[serde(rename = "nextPageToken", default)]
    next_page_token: Option<String>,
    #[serde(rename = "newStartPageToken", default)]
    new_start_page_token: Option<String>,
}
