use std::path::{Path, PathBuf};

use actix_web::web::Bytes;
use futures_core::Stream;

use crate::{
    error_code::ErrorCode,
    file::File,
    store::{StorageKey, Store, StoreError},
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum FileError {
    #[error("Failed to read or write file")]
    Io(#[from] std::io::Error),
}

impl FileError {
    pub(super) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Io(_) => ErrorCode::FILE_IO_ERROR,
        }
    }
}

/// Filesystem-backed store for development and tests.
#[derive(Clone, Debug)]
pub(crate) struct FileStore {
    root_dir: PathBuf,
}

impl FileStore {
    pub(crate) async fn build(root_dir: PathBuf) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(&root_dir)
            .await
            .map_err(FileError::from)?;

        Ok(FileStore { root_dir })
    }

    fn object_path(&self, key: &StorageKey) -> PathBuf {
        self.root_dir.join(key.to_string())
    }
}

async fn safe_create_parent(path: &Path) -> Result<(), FileError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    Ok(())
}

#[async_trait::async_trait(?Send)]
impl Store for FileStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn health_check(&self) -> Result<(), StoreError> {
        tokio::fs::metadata(&self.root_dir)
            .await
            .map_err(FileError::from)?;

        Ok(())
    }

    #[tracing::instrument(skip(self, stream, _content_type))]
    async fn put<S>(
        &self,
        key: &StorageKey,
        stream: S,
        _content_type: mime::Mime,
    ) -> Result<(), StoreError>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Unpin + 'static,
    {
        let path = self.object_path(key);

        safe_create_parent(&path).await?;

        let mut file = File::create(&path).await.map_err(FileError::from)?;
        file.write_from_stream(stream)
            .await
            .map_err(FileError::from)?;
        file.close().await.map_err(FileError::from)?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn remove(&self, key: &StorageKey) -> Result<(), StoreError> {
        let path = self.object_path(key);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FileError::from(e).into()),
        }
    }
}
