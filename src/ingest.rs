use std::time::Instant;

use actix_web::web::Bytes;
use futures_core::Stream;
use uuid::Uuid;

use crate::{
    error::{Error, UploadError},
    ffmpeg::MediaProcessor,
    file::File,
    repo::{ArcRepo, VideoRecord},
    store::{StorageKey, Store},
    tmp_file::{TmpDir, TmpFile},
};

#[cfg(test)]
mod tests;

struct UploadGuard {
    start: Instant,
    armed: bool,
}

impl UploadGuard {
    fn guard() -> Self {
        metrics::counter!("vidstash.upload.start").increment(1);

        Self {
            start: Instant::now(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        metrics::histogram!(
            "vidstash.upload.duration",
            "completed" => (!self.armed).to_string(),
        )
        .record(self.start.elapsed().as_secs_f64());

        metrics::counter!(
            "vidstash.upload.end",
            "completed" => (!self.armed).to_string(),
        )
        .increment(1);
    }
}

#[derive(Clone, Debug)]
pub(crate) struct UploadRequest {
    pub(crate) video_id: Uuid,
    pub(crate) owner_id: Uuid,
    pub(crate) declared_media_type: mime::Mime,
    pub(crate) declared_size: Option<u64>,
}

/// Run one upload end to end: validate, stage, probe, remux, publish, and
/// update the metadata record. Staged files are removed on every exit path.
#[tracing::instrument(skip(repo, store, media, tmp_dir, media_config, stream))]
pub(crate) async fn ingest<S, M>(
    repo: &ArcRepo,
    store: &S,
    media: &M,
    tmp_dir: &TmpDir,
    media_config: &crate::config::Media,
    request: UploadRequest,
    stream: impl Stream<Item = Result<Bytes, Error>> + Unpin + 'static,
) -> Result<VideoRecord, Error>
where
    S: Store + 'static,
    M: MediaProcessor,
{
    let guard = UploadGuard::guard();

    let mut record = repo
        .video(request.video_id)
        .await?
        .ok_or(UploadError::MissingVideo)?;

    if record.owner_id != request.owner_id {
        return Err(UploadError::NotOwner.into());
    }

    if let Some(declared_size) = request.declared_size {
        if declared_size > media_config.max_upload_bytes {
            return Err(UploadError::OverSizeLimit(media_config.max_upload_bytes).into());
        }
    }

    let declared_media_type = request.declared_media_type.essence_str();
    if !media_config
        .accepted_media_types
        .iter()
        .any(|accepted| accepted == declared_media_type)
    {
        return Err(UploadError::UnsupportedMediaType(declared_media_type.to_string()).into());
    }

    let staged = stage(tmp_dir, media_config.max_upload_bytes, stream).await?;

    let mut derivative = None;
    let result = run_pipeline(
        repo,
        store,
        media,
        media_config,
        &mut record,
        &staged,
        &mut derivative,
    )
    .await;

    cleanup(staged).await;
    if let Some(derivative) = derivative {
        cleanup(derivative).await;
    }

    result?;
    guard.disarm();

    Ok(record)
}

/// Write the upload into the staging directory. On failure the partial file
/// is removed before the error propagates.
async fn stage(
    tmp_dir: &TmpDir,
    limit_bytes: u64,
    stream: impl Stream<Item = Result<Bytes, Error>> + Unpin + 'static,
) -> Result<TmpFile, Error> {
    let staged = tmp_dir.tmp_file(Some(".mp4"));
    let stream = crate::stream::limit(limit_bytes, stream);

    let result = async {
        let mut file = File::create(&staged).await?;
        let written = file.write_from_stream(stream).await?;
        file.close().await?;
        Ok::<u64, Error>(written)
    }
    .await;

    match result {
        Ok(written) => {
            tracing::debug!("Staged {written} bytes");
            Ok(staged)
        }
        Err(e) => {
            cleanup(staged).await;
            Err(e)
        }
    }
}

async fn run_pipeline<S, M>(
    repo: &ArcRepo,
    store: &S,
    media: &M,
    media_config: &crate::config::Media,
    record: &mut VideoRecord,
    staged: &TmpFile,
    derivative: &mut Option<TmpFile>,
) -> Result<(), Error>
where
    S: Store + 'static,
    M: MediaProcessor,
{
    let orientation = media.probe_orientation(staged.as_ref()).await?;

    // Register the derivative path before the remuxer runs, so a failed run's
    // partial output is staged for cleanup like any other file
    let processed = derivative.insert(TmpFile::from_path(crate::ffmpeg::processed_path(
        staged.as_ref(),
    )));

    media
        .remux_fast_start(staged.as_ref(), processed.as_ref())
        .await?;

    let key = StorageKey::generate(orientation);

    let file = File::open(&processed).await?;
    let stream = Box::pin(file.read_to_stream());

    store.put(&key, stream, video_mp4()).await?;

    let url = key
        .public_url(&media_config.public_base_url)
        .map_err(UploadError::PublicUrl)?;

    record.video_url = Some(url);

    if let Err(e) = repo.update_video(record).await {
        if let Err(remove_err) = store.remove(&key).await {
            tracing::warn!("Failed to remove published object {key}: {remove_err}");
        }

        return Err(e.into());
    }

    Ok(())
}

/// Cleanup failures are logged and counted, never surfaced. The upload's
/// outcome was decided before cleanup runs.
async fn cleanup(file: TmpFile) {
    if let Err(e) = file.cleanup().await {
        metrics::counter!("vidstash.upload.cleanup-failure").increment(1);
        tracing::warn!("Failed to remove staged file: {e}");
    }
}

fn video_mp4() -> mime::Mime {
    "video/mp4".parse().unwrap()
}
