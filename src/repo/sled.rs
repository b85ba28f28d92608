use std::path::PathBuf;

use sled::{Db, Tree};
use uuid::Uuid;

use crate::{
    repo::{RepoError, VideoRecord, VideoRepo},
    sync::spawn_blocking,
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum SledError {
    #[error("Error in database")]
    Sled(#[from] sled::Error),

    #[error("Operation panicked")]
    Panic,
}

impl SledError {
    pub(super) const fn error_code(&self) -> crate::error_code::ErrorCode {
        match self {
            Self::Sled(_) => crate::error_code::ErrorCode::SLED_ERROR,
            Self::Panic => crate::error_code::ErrorCode::PANIC,
        }
    }
}

#[derive(Clone)]
pub(crate) struct SledRepo {
    db: Db,
    videos: Tree,
}

impl SledRepo {
    pub(crate) fn build(path: PathBuf, cache_capacity: u64) -> color_eyre::Result<Self> {
        let db = sled::Config::new()
            .cache_capacity(cache_capacity)
            .path(path)
            .open()?;

        Ok(SledRepo {
            videos: db.open_tree("videos")?,
            db,
        })
    }
}

fn serialize(record: &VideoRecord) -> Result<Vec<u8>, RepoError> {
    serde_json::to_vec(record).map_err(RepoError::Json)
}

#[async_trait::async_trait(?Send)]
impl VideoRepo for SledRepo {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn health_check(&self) -> Result<(), RepoError> {
        let db = self.db.clone();

        spawn_blocking("sled-health", move || db.size_on_disk())
            .await
            .map_err(|_| SledError::Panic)?
            .map_err(SledError::from)?;

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn video(&self, video_id: Uuid) -> Result<Option<VideoRecord>, RepoError> {
        let videos = self.videos.clone();

        let opt = spawn_blocking("sled-video", move || videos.get(video_id.as_bytes()))
            .await
            .map_err(|_| SledError::Panic)?
            .map_err(SledError::from)?;

        opt.map(|ivec| serde_json::from_slice(&ivec).map_err(RepoError::Json))
            .transpose()
    }

    #[tracing::instrument(level = "debug", skip(self, record))]
    async fn create_video(&self, record: &VideoRecord) -> Result<(), RepoError> {
        let videos = self.videos.clone();
        let key = record.id;
        let value = serialize(record)?;

        spawn_blocking("sled-create-video", move || {
            videos.insert(key.as_bytes(), value)
        })
        .await
        .map_err(|_| SledError::Panic)?
        .map_err(SledError::from)?;

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, record))]
    async fn update_video(&self, record: &VideoRecord) -> Result<(), RepoError> {
        let videos = self.videos.clone();
        let key = record.id;
        let value = serialize(record)?;

        spawn_blocking("sled-update-video", move || {
            videos.insert(key.as_bytes(), value)
        })
        .await
        .map_err(|_| SledError::Panic)?
        .map_err(SledError::from)?;

        Ok(())
    }
}

impl std::fmt::Debug for SledRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledRepo").finish()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::SledRepo;
    use crate::repo::{VideoRecord, VideoRepo};

    #[tokio::test]
    async fn records_round_trip() {
        let path = std::env::temp_dir().join(format!("vidstash-sled-{}", Uuid::new_v4()));
        let repo = SledRepo::build(path.clone(), 1024 * 1024).expect("open repo");

        let mut record = VideoRecord {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: String::from("sled round trip"),
            description: Some(String::from("stored and re-read")),
            video_url: None,
            thumbnail_url: None,
            created_at: time::OffsetDateTime::UNIX_EPOCH,
        };

        repo.create_video(&record).await.expect("create");
        assert_eq!(
            repo.video(record.id).await.expect("read"),
            Some(record.clone())
        );

        record.video_url = Some(
            "https://media.example.com/landscape/abc.mp4"
                .parse()
                .expect("valid url"),
        );
        repo.update_video(&record).await.expect("update");
        assert_eq!(
            repo.video(record.id).await.expect("read"),
            Some(record.clone())
        );

        assert_eq!(repo.video(Uuid::new_v4()).await.expect("read"), None);

        repo.health_check().await.expect("healthy");

        drop(repo);
        let _ = std::fs::remove_dir_all(path);
    }
}
