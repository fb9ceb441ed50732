use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use log::info;
use thiserror::Error;

use crate::effects::{BestEffort, EffectReport};

pub type SharedFileStore = Arc<dyn FileStore>;

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("{0} does not name a file")]
    InvalidReference(String),
    #[error("Could not delete {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Represents storage for uploaded files, addressed by the references the upload layer produced
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Deletes the file behind a reference. A file that is already gone is not an error.
    async fn delete(&self, reference: &str) -> Result<(), FileStoreError>;
}

/// Deletes every referenced file, logging failures instead of stopping at them
pub async fn delete_all<'a, I>(files: &dyn FileStore, references: I) -> EffectReport
where
    I: IntoIterator<Item = &'a String>,
{
    let mut effects = BestEffort::new("delete file");

    for reference in references {
        effects.record(reference, files.delete(reference).await);
    }

    effects.finish()
}

/// Stores files in a single directory on disk.
///
/// References look like `/uploads/classification_images/<file>`,
/// only the last segment is used to find the file inside the directory.
pub struct DiskFileStore {
    root: PathBuf,
}

impl DiskFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, reference: &str) -> Result<PathBuf, FileStoreError> {
        let file_name = reference
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty() && *name != "." && *name != "..")
            .ok_or_else(|| FileStoreError::InvalidReference(reference.to_string()))?;

        Ok(self.root.join(file_name))
    }
}

#[async_trait]
impl FileStore for DiskFileStore {
    async fn delete(&self, reference: &str) -> Result<(), FileStoreError> {
        let path = self.path_of(reference)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FileStoreError::Io {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }
}
