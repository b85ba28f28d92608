use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use actix_web::web::Bytes;
use futures_core::Stream;
use streem::IntoStreamer;
use uuid::Uuid;

use super::{ingest, UploadRequest};
use crate::{
    error::{Error, UploadError},
    ffmpeg::{FfMpegError, MediaProcessor, Orientation},
    repo::{ArcRepo, RepoError, VideoRecord, VideoRepo},
    store::{StorageKey, Store, StoreError},
    stream::LocalBoxStream,
    tmp_file::TmpDir,
};

#[derive(Debug, Default)]
struct TestRepo {
    records: Mutex<HashMap<Uuid, VideoRecord>>,
    fail_update: AtomicBool,
}

impl TestRepo {
    async fn with_record(record: VideoRecord) -> Arc<Self> {
        let repo = Arc::new(TestRepo::default());
        repo.create_video(&record).await.expect("create record");
        repo
    }

    fn stored(&self, video_id: Uuid) -> Option<VideoRecord> {
        self.records.lock().unwrap().get(&video_id).cloned()
    }
}

#[async_trait::async_trait(?Send)]
impl VideoRepo for TestRepo {
    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }

    async fn video(&self, video_id: Uuid) -> Result<Option<VideoRecord>, RepoError> {
        Ok(self.records.lock().unwrap().get(&video_id).cloned())
    }

    async fn create_video(&self, record: &VideoRecord) -> Result<(), RepoError> {
        self.records
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn update_video(&self, record: &VideoRecord) -> Result<(), RepoError> {
        if self.fail_update.load(Ordering::Relaxed) {
            return Err(RepoError::Json(
                serde_json::from_str::<()>("nope").unwrap_err(),
            ));
        }

        self.records
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
struct TestStore {
    inner: Arc<Mutex<TestStoreState>>,
}

#[derive(Debug, Default)]
struct TestStoreState {
    puts: Vec<(String, usize, String)>,
    removed: Vec<String>,
    fail_put: bool,
}

impl TestStore {
    fn failing_put() -> Self {
        let store = TestStore::default();
        store.inner.lock().unwrap().fail_put = true;
        store
    }

    fn puts(&self) -> Vec<(String, usize, String)> {
        self.inner.lock().unwrap().puts.clone()
    }

    fn removed(&self) -> Vec<String> {
        self.inner.lock().unwrap().removed.clone()
    }
}

#[async_trait::async_trait(?Send)]
impl Store for TestStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn put<S>(
        &self,
        key: &StorageKey,
        stream: S,
        content_type: mime::Mime,
    ) -> Result<(), StoreError>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Unpin + 'static,
    {
        let stream = std::pin::pin!(stream);
        let mut streamer = stream.into_streamer();

        let mut len = 0;

        while let Some(bytes) = streamer
            .try_next()
            .await
            .map_err(crate::store::file_store::FileError::from)?
        {
            len += bytes.len();
        }

        let mut state = self.inner.lock().unwrap();

        if state.fail_put {
            return Err(crate::store::file_store::FileError::from(
                std::io::Error::new(std::io::ErrorKind::Other, "put failed"),
            )
            .into());
        }

        state.puts.push((key.to_string(), len, content_type.to_string()));

        Ok(())
    }

    async fn remove(&self, key: &StorageKey) -> Result<(), StoreError> {
        self.inner.lock().unwrap().removed.push(key.to_string());
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct TestMedia {
    orientation: Orientation,
    fail_probe: bool,
    fail_remux: bool,
}

impl TestMedia {
    fn landscape() -> Self {
        TestMedia {
            orientation: Orientation::Landscape,
            fail_probe: false,
            fail_remux: false,
        }
    }
}

#[async_trait::async_trait(?Send)]
impl MediaProcessor for TestMedia {
    async fn probe_orientation(&self, _input_path: &Path) -> Result<Orientation, FfMpegError> {
        if self.fail_probe {
            return Err(FfMpegError::Path);
        }

        Ok(self.orientation)
    }

    async fn remux_fast_start(
        &self,
        input_path: &Path,
        output_path: &Path,
    ) -> Result<(), FfMpegError> {
        // The output lands on disk before a failing run reports its error,
        // matching ffmpeg opening the output before copying streams
        tokio::fs::copy(input_path, output_path)
            .await
            .map_err(|_| FfMpegError::Path)?;

        if self.fail_remux {
            return Err(FfMpegError::Path);
        }

        Ok(())
    }
}

fn test_record(video_id: Uuid, owner_id: Uuid) -> VideoRecord {
    VideoRecord {
        id: video_id,
        owner_id,
        title: String::from("unit test video"),
        description: None,
        video_url: None,
        thumbnail_url: None,
        created_at: time::OffsetDateTime::UNIX_EPOCH,
    }
}

fn test_request(video_id: Uuid, owner_id: Uuid) -> UploadRequest {
    UploadRequest {
        video_id,
        owner_id,
        declared_media_type: "video/mp4".parse().unwrap(),
        declared_size: None,
    }
}

fn media_config(max_upload_bytes: u64) -> crate::config::Media {
    crate::config::Media {
        max_upload_bytes,
        accepted_media_types: vec![String::from("video/mp4")],
        staging_root: std::env::temp_dir(),
        public_base_url: "https://media.example.com/".parse().unwrap(),
    }
}

fn bytes_source(chunks: Vec<Bytes>) -> LocalBoxStream<'static, Result<Bytes, Error>> {
    Box::pin(streem::try_from_fn(|yielder| async move {
        for chunk in chunks {
            yielder.yield_ok(chunk).await;
        }

        Ok(())
    }))
}

struct TestEnv {
    tmp_root: PathBuf,
    tmp_dir: crate::tmp_file::ArcTmpDir,
}

impl TestEnv {
    async fn new() -> Self {
        let tmp_root = std::env::temp_dir().join(format!("vidstash-test-{}", Uuid::new_v4()));
        let tmp_dir = TmpDir::init(&tmp_root).await.expect("create staging dir");

        TestEnv { tmp_root, tmp_dir }
    }

    fn staged_file_count(&self) -> usize {
        let mut count = 0;

        for entry in std::fs::read_dir(&self.tmp_root).expect("read tmp root") {
            let entry = entry.expect("read entry");
            count += std::fs::read_dir(entry.path()).expect("read staging dir").count();
        }

        count
    }

    async fn teardown(self) {
        self.tmp_dir.cleanup().await.expect("remove staging dir");
        let _ = tokio::fs::remove_dir_all(&self.tmp_root).await;
    }
}

#[tokio::test]
async fn successful_upload_publishes_and_cleans_up() {
    let env = TestEnv::new().await;

    let video_id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();

    let test_repo = TestRepo::with_record(test_record(video_id, owner_id)).await;
    let repo: ArcRepo = test_repo.clone();
    let store = TestStore::default();

    let record = ingest(
        &repo,
        &store,
        &TestMedia::landscape(),
        &env.tmp_dir,
        &media_config(1024),
        test_request(video_id, owner_id),
        bytes_source(vec![Bytes::from_static(b"fake mp4 payload")]),
    )
    .await
    .expect("upload succeeds");

    let puts = store.puts();
    assert_eq!(puts.len(), 1);

    let (key, len, content_type) = &puts[0];
    assert!(key.starts_with("landscape/"));
    assert!(key.ends_with(".mp4"));
    assert_eq!(*len, b"fake mp4 payload".len());
    assert_eq!(content_type, "video/mp4");

    let url = record.video_url.as_ref().expect("url was set");
    assert_eq!(url.as_str(), format!("https://media.example.com/{key}"));

    let stored = test_repo.stored(video_id).expect("record still exists");
    assert_eq!(stored, record);

    assert_eq!(env.staged_file_count(), 0);

    env.teardown().await;
}

#[tokio::test]
async fn missing_record_is_not_found() {
    let env = TestEnv::new().await;

    let test_repo = Arc::new(TestRepo::default());
    let repo: ArcRepo = test_repo;
    let store = TestStore::default();

    let result = ingest(
        &repo,
        &store,
        &TestMedia::landscape(),
        &env.tmp_dir,
        &media_config(1024),
        test_request(Uuid::new_v4(), Uuid::new_v4()),
        bytes_source(vec![Bytes::from_static(b"payload")]),
    )
    .await;

    let err = result.expect_err("upload fails");
    assert!(matches!(err.kind(), Some(UploadError::MissingVideo)));
    assert!(store.puts().is_empty());

    env.teardown().await;
}

#[tokio::test]
async fn wrong_owner_is_rejected_before_staging() {
    let env = TestEnv::new().await;

    let video_id = Uuid::new_v4();

    let test_repo = TestRepo::with_record(test_record(video_id, Uuid::new_v4())).await;
    let repo: ArcRepo = test_repo;
    let store = TestStore::default();

    let polled = Arc::new(AtomicBool::new(false));
    let polled_flag = polled.clone();

    let stream: LocalBoxStream<'static, Result<Bytes, Error>> =
        Box::pin(streem::try_from_fn(move |yielder| async move {
            polled_flag.store(true, Ordering::Relaxed);
            yielder.yield_ok(Bytes::from_static(b"payload")).await;
            Ok(())
        }));

    let result = ingest(
        &repo,
        &store,
        &TestMedia::landscape(),
        &env.tmp_dir,
        &media_config(1024),
        test_request(video_id, Uuid::new_v4()),
        stream,
    )
    .await;

    let err = result.expect_err("upload fails");
    assert!(matches!(err.kind(), Some(UploadError::NotOwner)));
    assert!(!polled.load(Ordering::Relaxed), "stream was never read");
    assert_eq!(env.staged_file_count(), 0);

    env.teardown().await;
}

#[tokio::test]
async fn declared_size_over_limit_is_rejected_before_staging() {
    let env = TestEnv::new().await;

    let video_id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();

    let test_repo = TestRepo::with_record(test_record(video_id, owner_id)).await;
    let repo: ArcRepo = test_repo;
    let store = TestStore::default();

    let mut request = test_request(video_id, owner_id);
    request.declared_size = Some(2048);

    let result = ingest(
        &repo,
        &store,
        &TestMedia::landscape(),
        &env.tmp_dir,
        &media_config(1024),
        request,
        bytes_source(vec![Bytes::from_static(b"payload")]),
    )
    .await;

    let err = result.expect_err("upload fails");
    assert!(matches!(err.kind(), Some(UploadError::OverSizeLimit(1024))));
    assert_eq!(env.staged_file_count(), 0);

    env.teardown().await;
}

#[tokio::test]
async fn unsupported_media_type_is_rejected() {
    let env = TestEnv::new().await;

    let video_id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();

    let test_repo = TestRepo::with_record(test_record(video_id, owner_id)).await;
    let repo: ArcRepo = test_repo;
    let store = TestStore::default();

    let mut request = test_request(video_id, owner_id);
    request.declared_media_type = "video/webm".parse().unwrap();

    let result = ingest(
        &repo,
        &store,
        &TestMedia::landscape(),
        &env.tmp_dir,
        &media_config(1024),
        request,
        bytes_source(vec![Bytes::from_static(b"payload")]),
    )
    .await;

    let err = result.expect_err("upload fails");
    assert!(matches!(
        err.kind(),
        Some(UploadError::UnsupportedMediaType(t)) if t == "video/webm"
    ));

    env.teardown().await;
}

#[tokio::test]
async fn oversized_stream_is_capped_and_staging_cleaned() {
    let env = TestEnv::new().await;

    let video_id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();

    let test_repo = TestRepo::with_record(test_record(video_id, owner_id)).await;
    let repo: ArcRepo = test_repo;
    let store = TestStore::default();

    let result = ingest(
        &repo,
        &store,
        &TestMedia::landscape(),
        &env.tmp_dir,
        &media_config(8),
        test_request(video_id, owner_id),
        bytes_source(vec![
            Bytes::from_static(b"eight by"),
            Bytes::from_static(b"too much"),
        ]),
    )
    .await;

    let err = result.expect_err("upload fails");
    assert!(matches!(err.kind(), Some(UploadError::OverSizeLimit(8))));
    assert!(store.puts().is_empty());
    assert_eq!(env.staged_file_count(), 0);

    env.teardown().await;
}

#[tokio::test]
async fn probe_failure_cleans_staging_and_skips_publish() {
    let env = TestEnv::new().await;

    let video_id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();

    let test_repo = TestRepo::with_record(test_record(video_id, owner_id)).await;
    let repo: ArcRepo = test_repo.clone();
    let store = TestStore::default();

    let media = TestMedia {
        fail_probe: true,
        ..TestMedia::landscape()
    };

    let result = ingest(
        &repo,
        &store,
        &media,
        &env.tmp_dir,
        &media_config(1024),
        test_request(video_id, owner_id),
        bytes_source(vec![Bytes::from_static(b"payload")]),
    )
    .await;

    let err = result.expect_err("upload fails");
    assert!(matches!(err.kind(), Some(UploadError::Ffmpeg(_))));
    assert!(store.puts().is_empty());
    assert_eq!(env.staged_file_count(), 0);

    let stored = test_repo.stored(video_id).expect("record still exists");
    assert!(stored.video_url.is_none());

    env.teardown().await;
}

#[tokio::test]
async fn remux_failure_removes_partial_derivative() {
    let env = TestEnv::new().await;

    let video_id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();

    let test_repo = TestRepo::with_record(test_record(video_id, owner_id)).await;
    let repo: ArcRepo = test_repo.clone();
    let store = TestStore::default();

    let media = TestMedia {
        fail_remux: true,
        ..TestMedia::landscape()
    };

    let result = ingest(
        &repo,
        &store,
        &media,
        &env.tmp_dir,
        &media_config(1024),
        test_request(video_id, owner_id),
        bytes_source(vec![Bytes::from_static(b"payload")]),
    )
    .await;

    let err = result.expect_err("upload fails");
    assert!(matches!(err.kind(), Some(UploadError::Ffmpeg(_))));
    assert!(store.puts().is_empty());
    assert_eq!(env.staged_file_count(), 0, "partial derivative was left behind");

    let stored = test_repo.stored(video_id).expect("record still exists");
    assert!(stored.video_url.is_none());

    env.teardown().await;
}

#[tokio::test]
async fn put_failure_cleans_staging_and_leaves_record_untouched() {
    let env = TestEnv::new().await;

    let video_id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();

    let test_repo = TestRepo::with_record(test_record(video_id, owner_id)).await;
    let repo: ArcRepo = test_repo.clone();
    let store = TestStore::failing_put();

    let result = ingest(
        &repo,
        &store,
        &TestMedia::landscape(),
        &env.tmp_dir,
        &media_config(1024),
        test_request(video_id, owner_id),
        bytes_source(vec![Bytes::from_static(b"payload")]),
    )
    .await;

    let err = result.expect_err("upload fails");
    assert!(matches!(err.kind(), Some(UploadError::Store(_))));
    assert_eq!(env.staged_file_count(), 0);

    let stored = test_repo.stored(video_id).expect("record still exists");
    assert!(stored.video_url.is_none());

    env.teardown().await;
}

#[tokio::test]
async fn update_failure_removes_published_object() {
    let env = TestEnv::new().await;

    let video_id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();

    let test_repo = TestRepo::with_record(test_record(video_id, owner_id)).await;
    test_repo.fail_update.store(true, Ordering::Relaxed);
    let repo: ArcRepo = test_repo;
    let store = TestStore::default();

    let result = ingest(
        &repo,
        &store,
        &TestMedia::landscape(),
        &env.tmp_dir,
        &media_config(1024),
        test_request(video_id, owner_id),
        bytes_source(vec![Bytes::from_static(b"payload")]),
    )
    .await;

    let err = result.expect_err("upload fails");
    assert!(matches!(err.kind(), Some(UploadError::Repo(_))));

    let puts = store.puts();
    assert_eq!(puts.len(), 1);
    assert_eq!(store.removed(), vec![puts[0].0.clone()]);
    assert_eq!(env.staged_file_count(), 0);

    env.teardown().await;
}

#[tokio::test]
async fn reupload_publishes_under_a_fresh_key() {
    let env = TestEnv::new().await;

    let video_id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();

    let test_repo = TestRepo::with_record(test_record(video_id, owner_id)).await;
    let repo: ArcRepo = test_repo.clone();
    let store = TestStore::default();

    for payload in [&b"first upload"[..], &b"second upload"[..]] {
        ingest(
            &repo,
            &store,
            &TestMedia::landscape(),
            &env.tmp_dir,
            &media_config(1024),
            test_request(video_id, owner_id),
            bytes_source(vec![Bytes::copy_from_slice(payload)]),
        )
        .await
        .expect("upload succeeds");
    }

    let puts = store.puts();
    assert_eq!(puts.len(), 2);
    assert_ne!(puts[0].0, puts[1].0);

    let stored = test_repo.stored(video_id).expect("record still exists");
    let url = stored.video_url.expect("url was set");
    assert_eq!(
        url.as_str(),
        format!("https://media.example.com/{}", puts[1].0)
    );

    env.teardown().await;
}
