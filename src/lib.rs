mod auth;
mod config;
mod error;
mod error_code;
mod ffmpeg;
mod file;
mod ingest;
mod init_tracing;
mod process;
mod repo;
mod store;
mod stream;
mod sync;
mod tmp_file;

use std::{marker::PhantomData, sync::Arc};

use actix_form_data::{Field, Form, FormData, Multipart, Value};
use actix_web::{guard, http::header, web, App, HttpRequest, HttpResponse, HttpServer};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::Instrument;
use tracing_actix_web::TracingLogger;
use uuid::Uuid;

use self::{
    config::Configuration,
    error::{Error, UploadError},
    ffmpeg::FfMpeg,
    ingest::UploadRequest,
    repo::{sled::SledRepo, ArcRepo, VideoRecord},
    store::{file_store::FileStore, object_store::ObjectStore, Store},
    tmp_file::{ArcTmpDir, TmpDir},
};

struct VideoUpload<S: Store + 'static>(Value<VideoRecord>, PhantomData<S>);

impl<S: Store + 'static> FormData for VideoUpload<S> {
    type Item = VideoRecord;
    type Error = Error;

    fn form(req: &HttpRequest) -> Form<Self::Item, Self::Error> {
        // This form expects a single file field, 'video'
        let repo = req
            .app_data::<web::Data<ArcRepo>>()
            .expect("No repo in request")
            .clone();
        let store = req
            .app_data::<web::Data<S>>()
            .expect("No store in request")
            .clone();
        let config = req
            .app_data::<web::Data<Configuration>>()
            .expect("No configuration in request")
            .clone();
        let tmp_dir = req
            .app_data::<web::Data<ArcTmpDir>>()
            .expect("No tmp dir in request")
            .clone();

        let video_id = req
            .match_info()
            .get("video_id")
            .and_then(|s| Uuid::parse_str(s).ok());

        let owner_id = auth::owner_id(req, &config);

        let declared_size = req
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());

        Form::new()
            .max_files(1)
            .max_file_size(config.media.max_upload_bytes as usize)
            .transform_error(transform_error)
            .field(
                "video",
                Field::file(move |filename, content_type, stream| {
                    let repo = repo.clone();
                    let store = store.clone();
                    let config = config.clone();
                    let tmp_dir = tmp_dir.clone();

                    metrics::counter!("vidstash.files", "upload" => "inline").increment(1);

                    let span = tracing::info_span!("video-upload", ?filename);

                    let stream: crate::stream::LocalBoxStream<'static, _> =
                        Box::pin(crate::stream::from_err(stream));

                    Box::pin(
                        async move {
                            let video_id = video_id.ok_or(UploadError::InvalidVideoId)?;
                            let owner_id = owner_id.ok_or(UploadError::MissingIdentity)?;

                            let request = UploadRequest {
                                video_id,
                                owner_id,
                                declared_media_type: content_type,
                                declared_size,
                            };

                            ingest::ingest(
                                &repo,
                                store.get_ref(),
                                &FfMpeg,
                                &tmp_dir,
                                &config.media,
                                request,
                                stream,
                            )
                            .await
                        }
                        .instrument(span),
                    )
                }),
            )
    }

    fn extract(value: Value<Self::Item>) -> Result<Self, Self::Error> {
        Ok(VideoUpload(value, PhantomData))
    }
}

/// Handle responding to a successful upload
#[tracing::instrument(name = "Uploaded video", skip(value))]
async fn upload_video<S: Store + 'static>(
    Multipart(VideoUpload(value, _)): Multipart<VideoUpload<S>>,
) -> Result<HttpResponse, Error> {
    let video = value
        .map()
        .and_then(|mut m| m.remove("video"))
        .and_then(|video| video.file())
        .ok_or(UploadError::NoFiles)?;

    tracing::debug!("Published {} as {:?}", video.filename, video.result.video_url);

    Ok(HttpResponse::Ok().json(&video.result))
}

async fn healthz<S: Store + 'static>(
    repo: web::Data<ArcRepo>,
    store: web::Data<S>,
) -> Result<HttpResponse, Error> {
    repo.health_check().await?;
    store.health_check().await?;
    Ok(HttpResponse::Ok().finish())
}

fn transform_error(error: actix_form_data::Error) -> actix_web::Error {
    let error: Error = error.into();
    let error: actix_web::Error = error.into();
    error
}

fn configure_endpoints<S: Store + 'static>(
    config: &mut web::ServiceConfig,
    repo: ArcRepo,
    store: S,
    configuration: Configuration,
    tmp_dir: ArcTmpDir,
) {
    config
        .app_data(web::Data::new(repo))
        .app_data(web::Data::new(store))
        .app_data(web::Data::new(configuration))
        .app_data(web::Data::new(tmp_dir))
        .route("/healthz", web::get().to(healthz::<S>))
        .service(
            web::scope("/api/videos").service(
                web::resource("/{video_id}/upload")
                    .guard(guard::Post())
                    .route(web::post().to(upload_video::<S>)),
            ),
        );
}

async fn launch<S>(
    repo: ArcRepo,
    store: S,
    tmp_dir: ArcTmpDir,
    config: Configuration,
) -> std::io::Result<()>
where
    S: Store + Send + Sync + 'static,
{
    let address = config.server.address;

    HttpServer::new(move || {
        let repo = repo.clone();
        let store = store.clone();
        let config = config.clone();
        let tmp_dir = tmp_dir.clone();

        App::new()
            .wrap(TracingLogger::default())
            .configure(move |sc| configure_endpoints(sc, repo, store, config, tmp_dir))
    })
    .bind(address)?
    .run()
    .await
}

pub async fn run() -> color_eyre::Result<()> {
    let config = config::configure()?;

    init_tracing::init_tracing(&config.tracing)?;

    if let Some(address) = config.server.metrics_address {
        PrometheusBuilder::new()
            .with_http_listener(address)
            .install()?;
    }

    let tmp_dir = TmpDir::init(&config.media.staging_root).await?;

    let repo: ArcRepo = match config.repo.clone() {
        config::Repo::Sled(sled) => Arc::new(SledRepo::build(sled.path, sled.cache_capacity)?),
    };

    match config.store.clone() {
        config::Store::Filesystem(filesystem) => {
            let store = FileStore::build(filesystem.path).await?;

            launch(repo, store, tmp_dir.clone(), config).await?;
        }
        config::Store::ObjectStorage(object_storage) => {
            let store = ObjectStore::build(&object_storage)?;

            launch(repo, store, tmp_dir.clone(), config).await?;
        }
    }

    if let Err(e) = tmp_dir.cleanup().await {
        tracing::warn!("Failed to remove staging directory: {e}");
    }

    Ok(())
}
