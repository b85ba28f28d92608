use std::fmt::Debug;

use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use futures_core::Stream;
use url::Url;
use uuid::Uuid;

use crate::{error_code::ErrorCode, ffmpeg::Orientation};

pub(crate) mod file_store;
pub(crate) mod object_store;

#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreError {
    #[error("Error in file store")]
    FileStore(#[source] crate::store::file_store::FileError),

    #[error("Error in object store")]
    ObjectStore(#[source] crate::store::object_store::ObjectError),
}

impl StoreError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::FileStore(e) => e.error_code(),
            Self::ObjectStore(e) => e.error_code(),
        }
    }
}

impl From<crate::store::file_store::FileError> for StoreError {
    fn from(value: crate::store::file_store::FileError) -> Self {
        Self::FileStore(value)
    }
}

impl From<crate::store::object_store::ObjectError> for StoreError {
    fn from(value: crate::store::object_store::ObjectError) -> Self {
        Self::ObjectStore(value)
    }
}

/// Location of a published video, bucketed by orientation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StorageKey {
    orientation: Orientation,
    name: String,
}

impl StorageKey {
    pub(crate) fn generate(orientation: Orientation) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(Uuid::new_v4().as_bytes());
        bytes[16..].copy_from_slice(Uuid::new_v4().as_bytes());

        StorageKey {
            orientation,
            name: BASE64_URL_SAFE_NO_PAD.encode(bytes),
        }
    }

    pub(crate) fn public_url(&self, base: &Url) -> Result<Url, url::ParseError> {
        base.join(&self.to_string())
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}.mp4", self.orientation.as_str(), self.name)
    }
}

#[async_trait::async_trait(?Send)]
pub(crate) trait Store: Clone + Debug {
    async fn health_check(&self) -> Result<(), StoreError>;

    async fn put<S>(
        &self,
        key: &StorageKey,
        stream: S,
        content_type: mime::Mime,
    ) -> Result<(), StoreError>
    where
        S: Stream<Item = std::io::Result<actix_web::web::Bytes>> + Unpin + 'static;

    async fn remove(&self, key: &StorageKey) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::StorageKey;
    use crate::ffmpeg::Orientation;

    #[test]
    fn generated_keys_are_unique() {
        let a = StorageKey::generate(Orientation::Landscape);
        let b = StorageKey::generate(Orientation::Landscape);

        assert_ne!(a, b);
    }

    #[test]
    fn key_path_is_orientation_prefixed() {
        for orientation in [
            Orientation::Landscape,
            Orientation::Portrait,
            Orientation::Other,
        ] {
            let key = StorageKey::generate(orientation);
            let string = key.to_string();

            assert!(string.starts_with(&format!("{}/", orientation.as_str())));
            assert!(string.ends_with(".mp4"));
        }
    }

    #[test]
    fn key_name_is_url_safe() {
        let key = StorageKey::generate(Orientation::Portrait);
        let string = key.to_string();
        let name = string
            .strip_prefix("portrait/")
            .and_then(|rest| rest.strip_suffix(".mp4"))
            .expect("orientation prefix and mp4 suffix");

        // 32 bytes of base64 without padding
        assert_eq!(name.len(), 43);
        assert!(name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn public_url_joins_base() {
        let base = Url::parse("https://media.example.com/").expect("valid url");
        let key = StorageKey::generate(Orientation::Landscape);

        let url = key.public_url(&base).expect("joinable");

        assert_eq!(
            url.as_str(),
            format!("https://media.example.com/{key}")
        );
    }

    #[test]
    fn public_url_preserves_base_path() {
        let base = Url::parse("https://cdn.example.com/media/").expect("valid url");
        let key = StorageKey::generate(Orientation::Other);

        let url = key.public_url(&base).expect("joinable");

        assert_eq!(url.as_str(), format!("https://cdn.example.com/media/{key}"));
    }
}
