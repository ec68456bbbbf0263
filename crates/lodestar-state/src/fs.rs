//! Filesystem-backed artifact store.
//!
//! Compiled jobs land as one file per job under
//! `<root>/<project>/<job name>`, which is how file-watching workflow
//! schedulers pick up their definitions. Saves with distinct names are
//! independent files and safe to issue concurrently.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use lodestar_types::{CompiledJob, Project};

use crate::error::{self, StoreError};
use crate::stores::{ArtifactStore, ArtifactStoreFactory};

/// Artifact storage rooted at a directory, one subdirectory per project.
pub struct FsArtifactRoot {
    root: PathBuf,
}

impl FsArtifactRoot {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ArtifactStoreFactory for FsArtifactRoot {
    fn open(&self, project: &Project) -> error::Result<Arc<dyn ArtifactStore>> {
        let dir = self.root.join(project.name.as_str());
        std::fs::create_dir_all(&dir)?;
        Ok(Arc::new(FsArtifactStore { dir }))
    }
}

/// Per-project handle writing artifacts into one directory.
pub struct FsArtifactStore {
    dir: PathBuf,
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn list_names(&self) -> error::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn save(&self, job: &CompiledJob) -> error::Result<()> {
        let path = self.dir.join(&job.name);
        tokio::fs::write(&path, &job.contents).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> error::Result<()> {
        let path = self.dir.join(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::not_found("artifact", name))
            }
            Err(e) => Err(e.into()),
        }
    }
}
