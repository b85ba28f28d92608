use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use color_eyre::Report;

use crate::error_code::ErrorCode;

pub(crate) struct Error {
    inner: Report,
}

impl Error {
    pub(crate) fn kind(&self) -> Option<&UploadError> {
        self.inner.downcast_ref()
    }

    pub(crate) fn root_cause(&self) -> &(dyn std::error::Error + 'static) {
        self.inner.root_cause()
    }

    pub(crate) fn error_code(&self) -> ErrorCode {
        self.kind()
            .map(|e| e.error_code())
            .unwrap_or(ErrorCode::UNKNOWN_ERROR)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.inner, f)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl<T> From<T> for Error
where
    UploadError: From<T>,
{
    fn from(error: T) -> Self {
        Error {
            inner: Report::from(UploadError::from(error)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum UploadError {
    #[error("Error in multipart upload")]
    Upload(#[from] actix_form_data::Error),

    #[error("Error in metadata repo")]
    Repo(#[from] crate::repo::RepoError),

    #[error("Error in store")]
    Store(#[from] crate::store::StoreError),

    #[error("Error in ffmpeg")]
    Ffmpeg(#[from] crate::ffmpeg::FfMpegError),

    #[error("Error in io")]
    Io(#[from] std::io::Error),

    #[error("Invalid video id")]
    InvalidVideoId,

    #[error("Requested a video that doesn't exist")]
    MissingVideo,

    #[error("Not the owner of the video")]
    NotOwner,

    #[error("No identity provided with request")]
    MissingIdentity,

    #[error("Upload is larger than the configured limit of {0} bytes")]
    OverSizeLimit(u64),

    #[error("Media type {0} is not accepted")]
    UnsupportedMediaType(String),

    #[error("Upload was missing a file")]
    NoFiles,

    #[error("Failed to build public url")]
    PublicUrl(#[source] url::ParseError),

    #[error("Operation was canceled")]
    Canceled,
}

impl UploadError {
    const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Upload(_) => ErrorCode::FILE_UPLOAD_ERROR,
            Self::Repo(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
            Self::Ffmpeg(e) => e.error_code(),
            Self::Io(_) => ErrorCode::IO_ERROR,
            Self::InvalidVideoId => ErrorCode::INVALID_VIDEO_ID,
            Self::MissingVideo => ErrorCode::VIDEO_NOT_FOUND,
            Self::NotOwner => ErrorCode::NOT_OWNER,
            Self::MissingIdentity => ErrorCode::MISSING_IDENTITY,
            Self::OverSizeLimit(_) => ErrorCode::VALIDATE_FILE_SIZE,
            Self::UnsupportedMediaType(_) => ErrorCode::VALIDATE_MEDIA_TYPE,
            Self::NoFiles => ErrorCode::VALIDATE_NO_FILES,
            Self::PublicUrl(_) => ErrorCode::PUBLIC_URL_ERROR,
            Self::Canceled => ErrorCode::PANIC,
        }
    }
}

impl From<actix_web::error::BlockingError> for UploadError {
    fn from(_: actix_web::error::BlockingError) -> Self {
        UploadError::Canceled
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            Some(
                UploadError::Upload(_)
                | UploadError::InvalidVideoId
                | UploadError::OverSizeLimit(_)
                | UploadError::UnsupportedMediaType(_)
                | UploadError::NoFiles,
            ) => StatusCode::BAD_REQUEST,
            Some(UploadError::MissingIdentity) => StatusCode::UNAUTHORIZED,
            Some(UploadError::NotOwner) => StatusCode::FORBIDDEN,
            Some(UploadError::MissingVideo) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("{:?}", self.inner);
        }

        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "msg": self.root_cause().to_string(),
            "code": self.error_code(),
        }))
    }
}
