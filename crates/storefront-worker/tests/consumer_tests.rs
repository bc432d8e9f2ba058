use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storefront_registry::ObjectStore;
use storefront_registry::storage::{MemoryStorage, PutOptions};
use storefront_worker::{BuildJob, Consumer, JobQueue, SiteBuilder, WorkerError};
use tempfile::TempDir;
use tokio::sync::Notify;

const SITES: &str = "stores";

enum Step {
    Payload(String),
    ConnectionLost,
}

/// Hands out scripted pops, then signals `drained` and blocks forever
struct ScriptedQueue {
    steps: VecDeque<Step>,
    drained: Arc<Notify>,
}

#[async_trait]
impl JobQueue for ScriptedQueue {
    async fn pop(&mut self) -> storefront_worker::Result<BuildJob> {
        match self.steps.pop_front() {
            Some(Step::Payload(payload)) => BuildJob::parse(&payload),
            Some(Step::ConnectionLost) => Err(WorkerError::Queue(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection reset by peer",
            )))),
            None => {
                self.drained.notify_one();
                std::future::pending().await
            }
        }
    }
}

/// Writes a fixed file set per template instead of running a toolchain
struct FakeBuilder {
    output_dir: PathBuf,
    templates: HashMap<String, Vec<(&'static str, &'static str)>>,
}

#[async_trait]
impl SiteBuilder for FakeBuilder {
    async fn build(&self, job: &BuildJob) -> storefront_worker::Result<PathBuf> {
        let files = self
            .templates
            .get(&job.template_name)
            .ok_or_else(|| WorkerError::Build {
                template: job.template_name.clone(),
                message: "npm exited with 1".to_string(),
            })?;

        let output = self.output_dir.join(&job.site_name);
        for (path, content) in files {
            let target = output.join(path);
            std::fs::create_dir_all(target.parent().unwrap())?;
            std::fs::write(target, content)?;
        }
        Ok(output)
    }
}

fn fake_builder(root: &TempDir) -> FakeBuilder {
    let mut templates = HashMap::new();
    templates.insert(
        "classic".to_string(),
        vec![
            ("index.html", "<html>classic</html>"),
            ("_app/app.js", "console.log('classic')"),
            ("fonts/inter.woff2", "font"),
        ],
    );
    FakeBuilder {
        output_dir: root.path().join("built_sites"),
        templates,
    }
}

fn job(site: &str, template: &str) -> BuildJob {
    BuildJob {
        site_name: site.to_string(),
        template_name: template.to_string(),
    }
}

fn payload(site: &str, template: &str) -> Step {
    Step::Payload(serde_json::to_string(&job(site, template)).unwrap())
}

async fn seed(store: &MemoryStorage, key: &str) {
    store
        .put(SITES, key, Bytes::from_static(b"old"), PutOptions::new())
        .await
        .unwrap();
}

fn consumer(
    root: &TempDir,
    store: Arc<MemoryStorage>,
    steps: Vec<Step>,
) -> (Consumer<ScriptedQueue, FakeBuilder, MemoryStorage>, Arc<Notify>) {
    let drained = Arc::new(Notify::new());
    let queue = ScriptedQueue {
        steps: steps.into(),
        drained: drained.clone(),
    };
    (
        Consumer::new(queue, fake_builder(root), store, SITES)
            .with_retry_delay(Duration::from_millis(10)),
        drained,
    )
}

#[tokio::test]
async fn test_process_uploads_build_and_removes_stale_files() {
    let root = TempDir::new().unwrap();
    let store = Arc::new(MemoryStorage::new());
    seed(&store, "acme/old.js").await;
    seed(&store, "acme/data/shop.json").await;
    seed(&store, "other/index.html").await;

    let (consumer, _) = consumer(&root, store.clone(), Vec::new());
    let report = consumer.process(&job("acme", "classic")).await.unwrap();

    assert_eq!(report.uploaded, 3);
    assert_eq!(report.removed, 1);
    assert_eq!(
        report.total_bytes,
        ("<html>classic</html>".len() + "console.log('classic')".len() + "font".len()) as u64
    );

    let keys = store.keys(SITES);
    assert!(keys.contains(&"acme/index.html".to_string()));
    assert!(keys.contains(&"acme/_app/app.js".to_string()));
    assert!(!keys.contains(&"acme/old.js".to_string()));
    assert!(keys.contains(&"acme/data/shop.json".to_string()));
    assert!(keys.contains(&"other/index.html".to_string()));

    let meta = store.head(SITES, "acme/index.html").await.unwrap().unwrap();
    assert_eq!(meta.content_type.as_deref(), Some("text/html"));
    let meta = store.head(SITES, "acme/_app/app.js").await.unwrap().unwrap();
    assert_eq!(meta.content_type.as_deref(), Some("application/javascript"));
    let meta = store.head(SITES, "acme/fonts/inter.woff2").await.unwrap().unwrap();
    assert_eq!(meta.content_type.as_deref(), Some("font/woff"));

    assert!(!root.path().join("built_sites/acme").exists());
}

#[tokio::test]
async fn test_upload_failure_fails_job() {
    let root = TempDir::new().unwrap();
    let store = Arc::new(MemoryStorage::new());
    store.fail_writes_matching("acme/");

    let (consumer, _) = consumer(&root, store.clone(), Vec::new());
    let result = consumer.process(&job("acme", "classic")).await;

    assert!(matches!(result, Err(WorkerError::Registry(_))));
    assert!(store.keys(SITES).is_empty());
}

#[tokio::test]
async fn test_run_skips_bad_jobs_and_continues() {
    let root = TempDir::new().unwrap();
    let store = Arc::new(MemoryStorage::new());

    let (mut consumer, drained) = consumer(
        &root,
        store.clone(),
        vec![
            payload("acme", "classic"),
            Step::Payload("{not json".to_string()),
            payload("beta", "missing-template"),
            payload("gamma", "classic"),
        ],
    );
    consumer.run(async move { drained.notified().await }).await;

    let keys = store.keys(SITES);
    assert!(keys.contains(&"acme/index.html".to_string()));
    assert!(keys.contains(&"gamma/index.html".to_string()));
    assert!(!keys.iter().any(|key| key.starts_with("beta/")));
}

#[tokio::test]
async fn test_run_recovers_after_lost_connection() {
    let root = TempDir::new().unwrap();
    let store = Arc::new(MemoryStorage::new());

    let (mut consumer, drained) = consumer(
        &root,
        store.clone(),
        vec![
            payload("acme", "classic"),
            Step::ConnectionLost,
            Step::ConnectionLost,
            Step::ConnectionLost,
            payload("gamma", "classic"),
        ],
    );
    consumer.run(async move { drained.notified().await }).await;

    let keys = store.keys(SITES);
    assert!(keys.contains(&"acme/index.html".to_string()));
    assert!(keys.contains(&"gamma/index.html".to_string()));
}

#[tokio::test]
async fn test_shutdown_while_waiting_stops_consumer() {
    let root = TempDir::new().unwrap();
    let store = Arc::new(MemoryStorage::new());

    let (mut consumer, _) = consumer(&root, store.clone(), Vec::new());
    tokio::time::timeout(Duration::from_secs(5), consumer.run(async {}))
        .await
        .unwrap();
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_publish_matches_registry_content_types() {
    let root = TempDir::new().unwrap();
    let store = Arc::new(MemoryStorage::new());
    let dir = root.path().join("site");
    for (path, content) in [
        ("index.html", "i"),
        ("app.js", "a"),
        ("img/logo.svg", "s"),
        ("fonts/inter.woff2", "f"),
        ("robots.txt", "r"),
    ] {
        let target = dir.join(path);
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(target, content).unwrap();
    }

    let (consumer, _) = consumer(&root, store.clone(), Vec::new());
    consumer.publish("acme", &dir).await.unwrap();

    for path in ["index.html", "app.js", "img/logo.svg", "fonts/inter.woff2", "robots.txt"] {
        let meta = store.head(SITES, &format!("acme/{path}")).await.unwrap().unwrap();
        assert_eq!(
            meta.content_type.as_deref(),
            Some(storefront::content_type::for_asset(path)),
            "{path}"
        );
    }
}
