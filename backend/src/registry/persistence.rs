// Model list persistence
// Saves and loads the cached model names to/from a flat text file

use crate::error::AppError;
use std::path::{Path, PathBuf};

/// Newline-separated model list on disk
///
/// The file is rewritten in full on every mutation, never appended to.
#[derive(Debug, Clone)]
pub struct ModelListFile {
    path: PathBuf,
}

impl ModelListFile {
    /// Create a handle for the file at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Location of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the file with the given names
    ///
    /// # Returns
    /// * `Ok(())` if successful
    /// * `Err(AppError::Storage)` if the file could not be written
    pub async fn save(&self, models: &[String]) -> Result<(), AppError> {
        tokio::fs::write(&self.path, models.join("\n"))
            .await
            .map_err(|e| {
                AppError::Storage(format!(
                    "Failed to write model list {}: {}",
                    self.path.display(),
                    e
                ))
            })
    }

    /// Load the names from the file
    ///
    /// A missing file yields an empty list. Blank lines are skipped.
    pub async fn load(&self) -> Result<Vec<String>, AppError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AppError::Storage(format!(
                "Failed to read model list {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let file = ModelListFile::new(temp_dir.path().join("models.txt"));

        let models = vec!["llama3:latest".to_string(), "mistral:7b".to_string()];
        file.save(&models).await.unwrap();

        let raw = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(raw, "llama3:latest\nmistral:7b");
        assert_eq!(file.load().await.unwrap(), models);
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let file = ModelListFile::new(temp_dir.path().join("models.txt"));

        file.save(&["a".to_string(), "b".to_string()]).await.unwrap();
        file.save(&["c".to_string()]).await.unwrap();

        assert_eq!(file.load().await.unwrap(), vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = ModelListFile::new(temp_dir.path().join("missing.txt"));
        assert!(file.load().await.unwrap().is_empty());
    }
}
