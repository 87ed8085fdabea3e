//! Local CSV download.

use crate::idea::NormalizedIdea;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `ideation_<project name>.csv`, with path separators replaced.
pub fn export_file_name(project_name: &str) -> String {
    let name: String = project_name
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    format!("ideation_{}.csv", name)
}

/// Write `idea` as a two-line CSV into `dir` and return the file path.
pub fn export_csv(idea: &NormalizedIdea, dir: &Path) -> Result<PathBuf, ExportError> {
    let path = dir.join(export_file_name(&idea.project_name));
    fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    fs::write(&path, idea.to_csv()).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    log::info!("Exported idea {} to {}", idea.idea_id, path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idea::IdeationForm;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_export_writes_parseable_csv() {
        let dir = tempfile::tempdir().unwrap();
        let form = IdeationForm {
            project_name: "Acme Rockets".to_string(),
            risks: "He said \"hi\", twice".to_string(),
            ..IdeationForm::new()
        };
        let idea = NormalizedIdea::from_raw_form(&form, "a@example.com");

        let path = export_csv(&idea, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "ideation_Acme Rockets.csv");

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert_eq!(NormalizedIdea::from_csv(&content).unwrap(), idea);
    }

    #[test]
    fn test_file_name_strips_separators() {
        assert_eq!(export_file_name("a/b\\c"), "ideation_a_b_c.csv");
    }
}
