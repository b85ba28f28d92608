use std::path::Path;

use actix_web::web::Bytes;
use futures_core::Stream;
use streem::IntoStreamer;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{BytesCodec, FramedRead};

pub(crate) struct File {
    inner: tokio::fs::File,
}

impl File {
    pub(crate) async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(File {
            inner: tokio::fs::File::open(path).await?,
        })
    }

    pub(crate) async fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(File {
            inner: tokio::fs::File::create(path).await?,
        })
    }

    /// Drain `stream` into the file, returning the number of bytes written.
    pub(crate) async fn write_from_stream<S, E>(&mut self, stream: S) -> Result<u64, E>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: From<std::io::Error>,
    {
        let stream = std::pin::pin!(stream);
        let mut streamer = stream.into_streamer();

        let mut written = 0;

        while let Some(res) = streamer.next().await {
            let mut bytes = res?;

            written += bytes.len() as u64;
            self.inner.write_all_buf(&mut bytes).await?;
        }

        Ok(written)
    }

    pub(crate) async fn close(mut self) -> std::io::Result<()> {
        self.inner.flush().await?;
        Ok(())
    }

    pub(crate) fn read_to_stream(self) -> impl Stream<Item = std::io::Result<Bytes>> {
        BytesFreezer {
            inner: FramedRead::new(self.inner, BytesCodec::new()),
        }
    }
}

pin_project_lite::pin_project! {
    struct BytesFreezer<S> {
        #[pin]
        inner: S,
    }
}

impl<S, E> Stream for BytesFreezer<S>
where
    S: Stream<Item = Result<tokio_util::bytes::BytesMut, E>>,
{
    type Item = Result<Bytes, E>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let this = self.project();

        this.inner
            .poll_next(cx)
            .map(|opt| opt.map(|res| res.map(|bytes_mut| bytes_mut.freeze())))
    }
}
