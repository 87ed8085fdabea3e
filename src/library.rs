//! Saved-ideas library: per-identity cache of ideas stored in Drive.

use crate::drive::{DriveError, DriveFile, DriveStore, ListFilter};
use crate::idea::{NormalizedIdea, SavedIdeaRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub const LIBRARY_CACHE_FILE: &str = "saved_ideas.json";

pub const DEFAULT_LIBRARY_LIMIT: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error(transparent)]
    Drive(#[from] DriveError),

    #[error("Failed to access library cache: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize library cache: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Library cache lock poisoned")]
    Poisoned,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LibraryData {
    /// Lowercased identity -> records, newest first.
    entries: HashMap<String, Vec<SavedIdeaRecord>>,
}

fn identity_key(identity: &str) -> String {
    identity.trim().to_ascii_lowercase()
}

fn same_listing(cached: &[SavedIdeaRecord], listed: &[DriveFile]) -> bool {
    let cached: Vec<(&str, Option<DateTime<Utc>>)> = cached
        .iter()
        .map(|r| (r.file_id.as_str(), r.created_time))
        .collect();
    let listed: Vec<(&str, Option<DateTime<Utc>>)> = listed
        .iter()
        .map(|f| (f.id.as_str(), f.created_time))
        .collect();
    cached == listed
}

/// Caches parsed ideas per identity and keeps an optional JSON copy on disk.
pub struct IdeaLibrary {
    data: RwLock<LibraryData>,
    file_path: Option<PathBuf>,
    limit: usize,
}

impl IdeaLibrary {
    /// In-memory library with no cache file.
    pub fn new(limit: usize) -> Self {
        Self {
            data: RwLock::new(LibraryData::default()),
            file_path: None,
            limit,
        }
    }

    /// Library backed by `saved_ideas.json` in `data_dir`, loading any existing cache.
    pub fn with_cache_dir(data_dir: &Path, limit: usize) -> Self {
        let file_path = data_dir.join(LIBRARY_CACHE_FILE);

        if let Some(parent) = file_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Failed to create library directory {}: {}", parent.display(), e);
            }
        }

        let data = Self::load_from_file(&file_path).unwrap_or_default();

        Self {
            data: RwLock::new(data),
            file_path: Some(file_path),
            limit,
        }
    }

    fn load_from_file(file_path: &Path) -> Option<LibraryData> {
        let content = fs::read_to_string(file_path).ok()?;
        match serde_json::from_str(&content) {
            Ok(data) => Some(data),
            Err(e) => {
                log::warn!("Ignoring unreadable library cache {}: {}", file_path.display(), e);
                None
            }
        }
    }

    fn save(&self) -> Result<(), LibraryError> {
        let Some(file_path) = &self.file_path else {
            return Ok(());
        };
        let content = {
            let data = self.data.read().map_err(|_| LibraryError::Poisoned)?;
            serde_json::to_string_pretty(&*data)?
        };
        fs::write(file_path, content)?;
        Ok(())
    }

    fn save_or_warn(&self) {
        if let Err(e) = self.save() {
            log::warn!("Failed to write library cache: {}", e);
        }
    }

    /// Cached records for `identity`, newest first.
    pub fn get(&self, identity: &str) -> Vec<SavedIdeaRecord> {
        self.data
            .read()
            .ok()
            .and_then(|data| data.entries.get(&identity_key(identity)).cloned())
            .unwrap_or_default()
    }

    fn replace(&self, identity: &str, records: Vec<SavedIdeaRecord>) -> Result<(), LibraryError> {
        let mut data = self.data.write().map_err(|_| LibraryError::Poisoned)?;
        data.entries.insert(identity_key(identity), records);
        Ok(())
    }

    /// Re-list `folder` and bring the cache for `identity` up to date.
    ///
    /// Only files not already cached with the same creation time are read.
    /// Files that cannot be read or parsed are skipped.
    pub async fn refresh(
        &self,
        store: &dyn DriveStore,
        identity: &str,
        folder: &str,
    ) -> Result<Vec<SavedIdeaRecord>, LibraryError> {
        let filter = ListFilter {
            limit: self.limit,
            ..ListFilter::default()
        };
        let listed = store.list(folder, &filter).await?;
        let cached = self.get(identity);

        if same_listing(&cached, &listed) {
            log::debug!("Library for {} unchanged ({} ideas)", identity, cached.len());
            return Ok(cached);
        }

        let mut records = Vec::with_capacity(listed.len());
        for file in listed {
            let reusable = cached
                .iter()
                .find(|r| r.file_id == file.id && r.created_time == file.created_time);
            if let Some(record) = reusable {
                records.push(record.clone());
                continue;
            }

            let content = match store.read(&file.id).await {
                Ok(content) => content,
                Err(e) => {
                    log::warn!("Skipping {}: read failed: {}", file.name, e);
                    continue;
                }
            };
            match NormalizedIdea::from_csv(&content) {
                Ok(idea) => records.push(SavedIdeaRecord::new(
                    file.id,
                    file.name,
                    file.created_time,
                    idea,
                )),
                Err(e) => log::warn!("Skipping {}: {}", file.name, e),
            }
        }

        log::info!("Library for {} refreshed: {} ideas", identity, records.len());
        self.replace(identity, records.clone())?;
        self.save_or_warn();
        Ok(records)
    }

    /// Write an edited idea back to its file and replace the cached record.
    ///
    /// The stored value keeps the original identity fields and gets the next version.
    pub async fn update(
        &self,
        store: &dyn DriveStore,
        identity: &str,
        record: &SavedIdeaRecord,
        edited: &NormalizedIdea,
    ) -> Result<SavedIdeaRecord, LibraryError> {
        let next = record.data.revised(|idea| *idea = edited.clone());
        store.update(&record.file_id, &next.to_csv()).await?;

        let updated = SavedIdeaRecord::new(
            record.file_id.clone(),
            record.file_name.clone(),
            record.created_time,
            next,
        );

        {
            let mut data = self.data.write().map_err(|_| LibraryError::Poisoned)?;
            let records = data.entries.entry(identity_key(identity)).or_default();
            match records.iter_mut().find(|r| r.file_id == updated.file_id) {
                Some(slot) => *slot = updated.clone(),
                None => records.insert(0, updated.clone()),
            }
        }
        self.save_or_warn();

        log::info!(
            "Updated idea {} to {}",
            updated.data.idea_id,
            updated.data.version
        );
        Ok(updated)
    }
}
