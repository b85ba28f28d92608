use std::{fmt::Debug, sync::Arc};

use url::Url;
use uuid::Uuid;

use crate::error_code::ErrorCode;

pub(crate) mod sled;

pub(crate) type ArcRepo = Arc<dyn VideoRepo>;

/// Metadata record for a video. Pre-exists an upload run; the pipeline reads
/// it once for the ownership check and writes it once with the final URL.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub(crate) struct VideoRecord {
    pub(crate) id: Uuid,

    pub(crate) owner_id: Uuid,

    pub(crate) title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) video_url: Option<Url>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) thumbnail_url: Option<Url>,

    #[serde(with = "time::serde::rfc3339")]
    pub(crate) created_at: time::OffsetDateTime,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum RepoError {
    #[error("Error in sled")]
    SledError(#[from] crate::repo::sled::SledError),

    #[error("Invalid record json")]
    Json(#[source] serde_json::Error),
}

impl RepoError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::SledError(e) => e.error_code(),
            Self::Json(_) => ErrorCode::RECORD_JSON,
        }
    }
}

#[async_trait::async_trait(?Send)]
pub(crate) trait VideoRepo: Send + Sync + Debug {
    async fn health_check(&self) -> Result<(), RepoError>;

    async fn video(&self, video_id: Uuid) -> Result<Option<VideoRecord>, RepoError>;

    async fn create_video(&self, record: &VideoRecord) -> Result<(), RepoError>;

    /// Overwrite the stored record. Last writer wins.
    async fn update_video(&self, record: &VideoRecord) -> Result<(), RepoError>;
}

#[async_trait::async_trait(?Send)]
impl<T> VideoRepo for Arc<T>
where
    T: VideoRepo,
{
    async fn health_check(&self) -> Result<(), RepoError> {
        T::health_check(self).await
    }

    async fn video(&self, video_id: Uuid) -> Result<Option<VideoRecord>, RepoError> {
        T::video(self, video_id).await
    }

    async fn create_video(&self, record: &VideoRecord) -> Result<(), RepoError> {
        T::create_video(self, record).await
    }

    async fn update_video(&self, record: &VideoRecord) -> Result<(), RepoError> {
        T::update_video(self, record).await
    }
}
