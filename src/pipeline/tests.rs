use super::*;
use crate::provider::StaticWorkList;
use crate::types::FilterReason;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.download.video_dir = dir.path().join("video");
    config.download.image_dir = dir.path().join("images");
    config.download.retries = 2;
    config.download.backoff_base = Duration::from_millis(5);
    config.download.max_jitter = Duration::ZERO;
    config.download.timeout = Duration::from_secs(5);
    config.ledger.path = dir.path().join("data/ledger.jsonl");
    config
}

async fn pipeline(config: Config) -> Pipeline {
    Pipeline::from_config(config).await.unwrap()
}

async fn serve_media(server: &MockServer, route: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Like service answering from a script, then succeeding
struct ScriptedLikes {
    calls: AtomicUsize,
    script: Mutex<Vec<Error>>,
}

impl ScriptedLikes {
    fn new(script: Vec<Error>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(script),
        })
    }
}

#[async_trait]
impl LikeService for ScriptedLikes {
    async fn set_like(&self, _work_id: &str, _user_id: &str, action: crate::types::LikeAction) -> Result<()> {
        assert_eq!(action, crate::types::LikeAction::Unlike);
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() { None } else { Some(script.remove(0)) }
        };
        match next {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn timeout_error() -> Error {
    Error::Timeout {
        url: "http://like".into(),
        timeout: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn video_is_downloaded_and_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    serve_media(&server, "/a.mp4", b"video-bytes").await;

    let pipeline = pipeline(test_config(&dir)).await;
    let works = vec![RawWork::video("w1", "u1", format!("{}/a.mp4", server.uri()))];
    let report = pipeline.run(&StaticWorkList::new(works)).await.unwrap();

    assert_eq!(report.total, 1);
    assert_eq!(report.succeeded_count(), 1);
    let done = &report.succeeded[0];
    assert_eq!(done.files, vec![dir.path().join("video/u1_w1.mp4")]);
    assert_eq!(done.bytes, 11);
    assert_eq!(done.unlike, UnlikeStatus::Skipped);
    assert!(done.recorded);
    assert!(pipeline.ledger().has("w1"));
}

#[tokio::test]
async fn snapshot_is_processed_oldest_first() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    serve_media(&server, "/m.mp4", b"x").await;

    let mut config = test_config(&dir);
    config.pipeline.concurrency_limit = 1;
    let pipeline = pipeline(config).await;
    let mut events = pipeline.subscribe();

    let url = format!("{}/m.mp4", server.uri());
    let works = vec![
        RawWork::video("newest", "u1", url.clone()),
        RawWork::video("middle", "u1", url.clone()),
        RawWork::video("oldest", "u1", url),
    ];
    pipeline.run_snapshot(works).await.unwrap();

    let mut admitted = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Event::Admitted { work_id } = event {
            admitted.push(work_id);
        }
    }
    assert_eq!(admitted, vec!["oldest", "middle", "newest"]);
}

#[tokio::test]
async fn second_run_filters_recorded_work() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline(test_config(&dir)).await;
    let works = vec![RawWork::video("w1", "u1", format!("{}/a.mp4", server.uri()))];

    let first = pipeline.run_snapshot(works.clone()).await.unwrap();
    assert_eq!(first.succeeded_count(), 1);

    let second = pipeline.run_snapshot(works).await.unwrap();
    assert_eq!(second.succeeded_count(), 0);
    assert_eq!(second.filtered[0].reason, FilterReason::AlreadyProcessed);
}

#[tokio::test]
async fn failed_image_blocks_record_but_not_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    serve_media(&server, "/1.jpg", b"one").await;
    Mock::given(method("GET"))
        .and(path("/2.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    serve_media(&server, "/v.mp4", b"video").await;

    let pipeline = pipeline(test_config(&dir)).await;
    let base = server.uri();
    let works = vec![
        RawWork::video("w-video", "u1", format!("{base}/v.mp4")),
        RawWork::image_set(
            "w-images",
            "u1",
            vec![
                format!("{base}/1.jpg"),
                format!("{base}/2.jpg"),
                format!("{base}/3.jpg"),
            ],
        ),
    ];
    let report = pipeline.run_snapshot(works).await.unwrap();

    assert_eq!(report.succeeded_count(), 1);
    assert_eq!(report.succeeded[0].work_id, "w-video");
    assert_eq!(report.failed_count(), 1);
    let failure = &report.failed[0];
    assert_eq!(failure.work_id, "w-images");
    assert_eq!(failure.stage, Stage::Downloading);
    assert_eq!(failure.code, "http_error");

    assert!(!pipeline.ledger().has("w-images"));
    assert!(dir.path().join("images/u1_w-images_0.jpg").exists());
    assert!(!dir.path().join("images/u1_w-images_1.jpg").exists());
}

#[tokio::test]
async fn unlike_failure_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    serve_media(&server, "/a.mp4", b"bytes").await;

    let mut config = test_config(&dir);
    config.pipeline.auto_unlike = true;
    let likes = ScriptedLikes::new(vec![Error::Http {
        status: 500,
        url: "http://like".into(),
    }]);
    let pipeline = pipeline(config).await.with_like_service(likes.clone());

    let works = vec![RawWork::video("w1", "u1", format!("{}/a.mp4", server.uri()))];
    let report = pipeline.run_snapshot(works).await.unwrap();

    assert_eq!(report.succeeded_count(), 1);
    assert_eq!(report.unlike_failures, 1);
    assert!(matches!(report.succeeded[0].unlike, UnlikeStatus::Failed(_)));
    assert!(pipeline.ledger().has("w1"), "item still recorded");
    assert_eq!(likes.calls.load(Ordering::SeqCst), 1, "no retry by default");
}

#[tokio::test]
async fn unlike_retries_transient_failures_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    serve_media(&server, "/a.mp4", b"bytes").await;

    let mut config = test_config(&dir);
    config.pipeline.auto_unlike = true;
    config.pipeline.unlike_retries = 2;
    let likes = ScriptedLikes::new(vec![timeout_error(), timeout_error()]);
    let pipeline = pipeline(config).await.with_like_service(likes.clone());

    let works = vec![RawWork::video("w1", "u1", format!("{}/a.mp4", server.uri()))];
    let report = pipeline.run_snapshot(works).await.unwrap();

    assert_eq!(report.succeeded[0].unlike, UnlikeStatus::Done);
    assert_eq!(report.unlike_failures, 0);
    assert_eq!(likes.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn auto_unlike_without_service_is_run_level_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.pipeline.auto_unlike = true;
    let pipeline = pipeline(config).await;

    let err = pipeline
        .run(&StaticWorkList::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}

#[tokio::test]
async fn provider_failure_aborts_run() {
    struct Broken;

    #[async_trait]
    impl WorkListProvider for Broken {
        async fn fetch_works(&self) -> Result<Vec<RawWork>> {
            Err(Error::Http {
                status: 401,
                url: "http://list".into(),
            })
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(test_config(&dir)).await;
    let mut events = pipeline.subscribe();

    let err = pipeline.run(&Broken).await.unwrap_err();
    assert!(matches!(err, Error::Http { status: 401, .. }));
    assert!(events.try_recv().is_err(), "no item may start");
}

#[tokio::test]
async fn invalid_concurrency_is_rejected_at_construction() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.pipeline.concurrency_limit = 0;
    assert!(matches!(
        Pipeline::from_config(config).await,
        Err(Error::Config { .. })
    ));
}

#[tokio::test]
async fn events_cover_the_item_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    serve_media(&server, "/a.mp4", b"bytes").await;

    let pipeline = pipeline(test_config(&dir)).await;
    let mut events = pipeline.subscribe();

    let works = vec![
        RawWork::video("w1", "u1", format!("{}/a.mp4", server.uri())),
        RawWork::default(),
    ];
    pipeline.run_snapshot(works).await.unwrap();

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(match event {
            Event::Filtered { .. } => "filtered",
            Event::Admitted { .. } => "admitted",
            Event::MediaSaved { .. } => "media_saved",
            Event::Unliked { .. } => "unliked",
            Event::UnlikeFailed { .. } => "unlike_failed",
            Event::Completed { .. } => "completed",
            Event::Failed { .. } => "failed",
            Event::RunComplete { .. } => "run_complete",
        });
    }
    assert_eq!(
        names,
        vec!["filtered", "admitted", "media_saved", "completed", "run_complete"]
    );
}
