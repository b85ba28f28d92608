use std::pin::Pin;

use actix_web::web::Bytes;
use futures_core::Stream;
use streem::IntoStreamer;

use crate::error::{Error, UploadError};

pub(crate) type LocalBoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + 'a>>;

/// Cap a byte stream at `limit` bytes, erroring when the cap is crossed.
pub(crate) fn limit<S>(limit: u64, stream: S) -> impl Stream<Item = Result<Bytes, Error>>
where
    S: Stream<Item = Result<Bytes, Error>>,
{
    streem::try_from_fn(|yielder| async move {
        let stream = std::pin::pin!(stream);
        let mut streamer = stream.into_streamer();

        let mut count: u64 = 0;

        while let Some(bytes) = streamer.try_next().await? {
            count = count.saturating_add(bytes.len() as u64);

            if count > limit {
                return Err(UploadError::OverSizeLimit(limit).into());
            }

            yielder.yield_ok(bytes).await;
        }

        Ok(())
    })
}

pub(crate) fn from_err<S, E>(stream: S) -> impl Stream<Item = Result<Bytes, Error>>
where
    S: Stream<Item = Result<Bytes, E>>,
    Error: From<E>,
{
    streem::try_from_fn(|yielder| async move {
        let stream = std::pin::pin!(stream);
        let mut streamer = stream.into_streamer();

        while let Some(res) = streamer.next().await {
            yielder.yield_ok(res?).await;
        }

        Ok(())
    })
}
