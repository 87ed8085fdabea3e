//! Google Drive persistence.
//!
//! `DriveStore` is the storage seam used by the flows and the library. The
//! production implementation is `DriveClient` (Drive REST API v3, bearer token
//! supplied by the caller). Folder scoping lives in `FolderMap`.

mod client;
mod folders;

pub use client::{DriveClient, DRIVE_API_URL, DRIVE_UPLOAD_URL};
pub use folders::{FolderMap, FolderResolution, DEFAULT_SHARED_FOLDER};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Name prefix of every stored idea CSV.
pub const IDEA_FILE_PREFIX: &str = "IDEATION_";

pub const CSV_MIME_TYPE: &str = "text/csv";

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("Drive session expired")]
    AuthExpired,

    #[error("Drive access denied")]
    Forbidden,

    #[error("Drive rate limit exceeded")]
    RateLimited,

    #[error("Drive file not found")]
    NotFound,

    #[error("Drive API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid Drive response: {0}")]
    InvalidResponse(String),
}

impl DriveError {
    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            DriveError::AuthExpired => {
                "Session expired. Please sign in again to renew Drive access.".to_string()
            }
            DriveError::Forbidden => {
                "Access denied. Make sure the app has permission to use your Google Drive."
                    .to_string()
            }
            DriveError::RateLimited => {
                "Too many requests to Google Drive. Please wait a moment and try again."
                    .to_string()
            }
            DriveError::NotFound => "The requested file was not found.".to_string(),
            DriveError::Api { status, message } => {
                format!("Google Drive error ({}): {}", status, message)
            }
            DriveError::Network(_) => {
                "Could not reach Google Drive. Check your connection.".to_string()
            }
            DriveError::InvalidResponse(_) => {
                "Google Drive returned an unexpected response.".to_string()
            }
        }
    }
}

/// Map a non-success HTTP status and its error message to a `DriveError`.
pub fn classify_status(status: u16, message: String) -> DriveError {
    match status {
        401 => DriveError::AuthExpired,
        403 => DriveError::Forbidden,
        404 => DriveError::NotFound,
        429 => DriveError::RateLimited,
        _ => DriveError::Api { status, message },
    }
}

/// File metadata as listed or created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub web_view_link: Option<String>,
}

impl DriveFile {
    /// Link to view the file in a browser.
    pub fn view_url(&self) -> String {
        self.web_view_link
            .clone()
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", self.id))
    }
}

/// Query options for `DriveStore::list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilter {
    pub name_prefix: String,
    pub mime_type: String,
    pub limit: usize,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            name_prefix: IDEA_FILE_PREFIX.to_string(),
            mime_type: CSV_MIME_TYPE.to_string(),
            limit: 50,
        }
    }
}

/// Storage operations needed by the ideation flows.
#[async_trait]
pub trait DriveStore: Send + Sync {
    /// Upload a binary file; returns a viewable URL.
    async fn upload(
        &self,
        bytes: &[u8],
        name: &str,
        mime_type: &str,
        folder: &str,
    ) -> Result<String, DriveError>;

    /// Create a CSV file.
    async fn write(&self, content: &str, name: &str, folder: &str) -> Result<DriveFile, DriveError>;

    /// Replace the content of an existing file.
    async fn update(&self, file_id: &str, content: &str) -> Result<(), DriveError>;

    /// List files in `folder`, newest first.
    async fn list(&self, folder: &str, filter: &ListFilter) -> Result<Vec<DriveFile>, DriveError>;

    /// Read a file's content as text.
    async fn read(&self, file_id: &str) -> Result<String, DriveError>;
}

/// `IDEATION_<project name, whitespace runs as _>_<YYYY-MM-DD>.csv`
pub fn idea_file_name(project_name: &str, date: NaiveDate) -> String {
    let name = project_name.split_whitespace().collect::<Vec<_>>().join("_");
    format!("{}{}_{}.csv", IDEA_FILE_PREFIX, name, date.format("%Y-%m-%d"))
}

/// `IMG_<session uuid>_<n>.<ext>`, `n` starting at 1. The extension follows the
/// image MIME type and defaults to `jpg`.
pub fn image_file_name(session_id: &str, index: usize, mime_type: &str) -> String {
    format!("IMG_{}_{}.{}", session_id, index + 1, image_extension(mime_type))
}

fn image_extension(mime_type: &str) -> &'static str {
    let mime = mime_type.to_ascii_lowercase();
    match mime.split(';').next().map(str::trim) {
        Some("image/png") => "png",
        Some("image/webp") => "webp",
        Some("image/gif") => "gif",
        Some("image/heic") => "heic",
        _ => "jpg",
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory `DriveStore` for flow and library tests.

    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryDrive {
        pub files: Mutex<Vec<(String, DriveFile, String)>>,
        pub uploads: Mutex<Vec<String>>,
        pub writes: Mutex<Vec<(String, String)>>,
        pub fail_uploads: HashSet<String>,
        pub fail_reads: HashSet<String>,
        pub fail_write: bool,
        pub reads: Mutex<usize>,
        pub next_id: Mutex<usize>,
    }

    impl MemoryDrive {
        pub fn insert(&self, folder: &str, name: &str, created: DateTime<Utc>, content: &str) -> String {
            let id = self.allocate_id();
            self.files.lock().unwrap().push((
                folder.to_string(),
                DriveFile {
                    id: id.clone(),
                    name: name.to_string(),
                    created_time: Some(created),
                    web_view_link: None,
                },
                content.to_string(),
            ));
            id
        }

        pub fn content(&self, file_id: &str) -> Option<String> {
            self.files
                .lock()
                .unwrap()
                .iter()
                .find(|(_, f, _)| f.id == file_id)
                .map(|(_, _, c)| c.clone())
        }

        pub fn read_count(&self) -> usize {
            *self.reads.lock().unwrap()
        }

        fn allocate_id(&self) -> String {
            let mut n = self.next_id.lock().unwrap();
            *n += 1;
            format!("file-{}", *n)
        }
    }

    #[async_trait]
    impl DriveStore for MemoryDrive {
        async fn upload(&self, _bytes: &[u8], name: &str, _mime: &str, _folder: &str) -> Result<String, DriveError> {
            if self.fail_uploads.contains(name) {
                return Err(DriveError::Api {
                    status: 500,
                    message: "backend error".to_string(),
                });
            }
            self.uploads.lock().unwrap().push(name.to_string());
            Ok(format!("https://drive.example/{}", name))
        }

        async fn write(&self, content: &str, name: &str, folder: &str) -> Result<DriveFile, DriveError> {
            if self.fail_write {
                return Err(DriveError::RateLimited);
            }
            self.writes.lock().unwrap().push((name.to_string(), content.to_string()));
            let id = self.insert(folder, name, Utc::now(), content);
            Ok(DriveFile {
                id,
                name: name.to_string(),
                created_time: Some(Utc::now()),
                web_view_link: None,
            })
        }

        async fn update(&self, file_id: &str, content: &str) -> Result<(), DriveError> {
            let mut files = self.files.lock().unwrap();
            let entry = files
                .iter_mut()
                .find(|(_, f, _)| f.id == file_id)
                .ok_or(DriveError::NotFound)?;
            entry.2 = content.to_string();
            Ok(())
        }

        async fn list(&self, folder: &str, filter: &ListFilter) -> Result<Vec<DriveFile>, DriveError> {
            let mut listed: Vec<DriveFile> = self
                .files
                .lock()
                .unwrap()
                .iter()
                .filter(|(f, file, _)| f == folder && file.name.starts_with(&filter.name_prefix))
                .map(|(_, file, _)| file.clone())
                .collect();
            listed.sort_by(|a, b| b.created_time.cmp(&a.created_time));
            listed.truncate(filter.limit);
            Ok(listed)
        }

        async fn read(&self, file_id: &str) -> Result<String, DriveError> {
            *self.reads.lock().unwrap() += 1;
            if self.fail_reads.contains(file_id) {
                return Err(DriveError::Forbidden);
            }
            self.content(file_id).ok_or(DriveError::NotFound)
        }
    }
}
