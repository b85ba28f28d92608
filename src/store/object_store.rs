use std::sync::Arc;

use actix_web::web::Bytes;
use futures_core::Stream;
use object_store::{
    aws::AmazonS3Builder, Attribute, Attributes, ObjectStore as _, PutMultipartOpts,
    WriteMultipart,
};
use streem::IntoStreamer;

use crate::{
    error_code::ErrorCode,
    store::{StorageKey, Store, StoreError},
};

// Number of multipart chunks uploaded concurrently per put
const UPLOAD_CONCURRENCY: usize = 8;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ObjectError {
    #[error("Failed to build object store client")]
    BuildStore(#[source] object_store::Error),

    #[error("Error making request")]
    Request(#[from] object_store::Error),

    #[error("Error reading upload")]
    Io(#[from] std::io::Error),
}

impl ObjectError {
    pub(super) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::BuildStore(_) => ErrorCode::OBJECT_BUILD_ERROR,
            Self::Request(_) => ErrorCode::OBJECT_REQUEST_ERROR,
            Self::Io(_) => ErrorCode::OBJECT_IO_ERROR,
        }
    }
}

#[derive(Clone)]
pub(crate) struct ObjectStore {
    bucket_name: String,
    inner: Arc<dyn object_store::ObjectStore>,
}

impl ObjectStore {
    pub(crate) fn build(config: &crate::config::ObjectStorage) -> Result<Self, StoreError> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket_name)
            .with_region(&config.region)
            .with_access_key_id(&config.access_key)
            .with_secret_access_key(&config.secret_key);

        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint.as_str().trim_end_matches('/'))
                .with_allow_http(endpoint.scheme() == "http");
        }

        let s3 = builder
            .build()
            .map_err(ObjectError::BuildStore)
            .map_err(StoreError::from)?;

        Ok(ObjectStore {
            bucket_name: config.bucket_name.clone(),
            inner: Arc::new(s3),
        })
    }
}

#[async_trait::async_trait(?Send)]
impl Store for ObjectStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn health_check(&self) -> Result<(), StoreError> {
        let path = object_store::path::Path::from("healthz");

        match self.inner.head(&path).await {
            Ok(_) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(ObjectError::from(e).into()),
        }
    }

    #[tracing::instrument(skip(self, stream))]
    async fn put<S>(
        &self,
        key: &StorageKey,
        stream: S,
        content_type: mime::Mime,
    ) -> Result<(), StoreError>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Unpin + 'static,
    {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());

        let mut options = PutMultipartOpts::default();
        options.attributes = attributes;

        let path = object_store::path::Path::from(key.to_string());

        let upload = self
            .inner
            .put_multipart_opts(&path, options)
            .await
            .map_err(ObjectError::from)?;

        let mut writer = WriteMultipart::new(upload);

        let stream = std::pin::pin!(stream);
        let mut streamer = stream.into_streamer();

        let mut written = 0;

        while let Some(bytes) = streamer.try_next().await.map_err(ObjectError::from)? {
            written += bytes.len();

            writer
                .wait_for_capacity(UPLOAD_CONCURRENCY)
                .await
                .map_err(ObjectError::from)?;
            writer.write(&bytes);
        }

        writer.finish().await.map_err(ObjectError::from)?;

        tracing::debug!("Uploaded {written} bytes to {key}");

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn remove(&self, key: &StorageKey) -> Result<(), StoreError> {
        let path = object_store::path::Path::from(key.to_string());

        match self.inner.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(ObjectError::from(e).into()),
        }
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("bucket_name", &self.bucket_name)
            .finish()
    }
}
