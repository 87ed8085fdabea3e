//! Static identity -> Drive folder mapping.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Folder used for identities without a mapping (`root` is the Drive alias for My Drive).
pub const DEFAULT_SHARED_FOLDER: &str = "root";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderMap {
    /// Identity (email, matched case-insensitively) -> folder id.
    pub entries: HashMap<String, String>,
    pub default_folder: String,
}

impl Default for FolderMap {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            default_folder: DEFAULT_SHARED_FOLDER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderResolution {
    pub folder_id: String,
    /// True when the identity had no mapping and got the shared default.
    pub shared_fallback: bool,
}

impl FolderMap {
    pub fn new(entries: HashMap<String, String>, default_folder: String) -> Self {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v))
            .collect();
        Self {
            entries,
            default_folder,
        }
    }

    pub fn resolve(&self, identity: &str) -> FolderResolution {
        let key = identity.trim();
        let mapped = self
            .entries
            .iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
            .map(|(_, v)| v);
        match mapped {
            Some(folder_id) => FolderResolution {
                folder_id: folder_id.clone(),
                shared_fallback: false,
            },
            None => {
                // Every unmapped identity lands in the same folder.
                log::warn!(
                    "No Drive folder mapped for {}; using shared default folder",
                    identity
                );
                FolderResolution {
                    folder_id: self.default_folder.clone(),
                    shared_fallback: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> FolderMap {
        FolderMap::new(
            HashMap::from([("Mario@Example.com".to_string(), "folder-mario".to_string())]),
            "shared".to_string(),
        )
    }

    #[test]
    fn test_mapped_identity_is_case_insensitive() {
        let r = map().resolve("mario@example.com");
        assert_eq!(r.folder_id, "folder-mario");
        assert!(!r.shared_fallback);
    }

    #[test]
    fn test_unmapped_identities_share_default() {
        let m = map();
        let a = m.resolve("a@example.com");
        let b = m.resolve("b@example.com");
        assert!(a.shared_fallback && b.shared_fallback);
        assert_eq!(a.folder_id, b.folder_id);
        assert_eq!(a.folder_id, "shared");
    }
}
