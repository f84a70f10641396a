//! Queue-to-worker pipeline: submitted tasks reach exactly one terminal
//! state and results land in the store. Uses the outdated-fetch handler so
//! the whole path runs without SSH.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use amc_rs::config::AmcConfig;
use amc_rs::queue::task::OutdatedFetchArgs;
use amc_rs::queue::{
    Broker, InMemoryBroker, MemoryTaskStore, Task, TaskSpec, TaskState, TaskStore, WorkerContext,
    WorkerPool,
};
use amc_rs::reporter::Reporter;
use amc_rs::wp::{UpdaterConfig, WpUpdater};

fn worker_context() -> Arc<WorkerContext> {
    let http = reqwest::Client::new();
    Arc::new(WorkerContext {
        http: http.clone(),
        updater: WpUpdater::new(
            http,
            UpdaterConfig {
                status_timeout: Duration::from_secs(5),
                update_timeout: Duration::from_secs(5),
                settle: Duration::from_millis(10),
            },
        ),
        reporter: Arc::new(Reporter::new(&Default::default())),
        config: Arc::new(AmcConfig::default()),
    })
}

fn outdated_fetch_task(url: String) -> Task {
    Task::new(
        TaskSpec::WpOutdatedFetch(OutdatedFetchArgs {
            url,
            headers: None,
            basic_auth: None,
            timeout_secs: 5,
        }),
        None,
        None,
    )
}

#[tokio::test]
async fn submitted_task_reaches_succeeded_with_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/custom/v1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "plugins": [], "themes": [],
            "core": {"current_version": "6.6", "latest_version": "6.6", "update_available": false}
        })))
        .mount(&server)
        .await;

    let store: Arc<MemoryTaskStore> = Arc::new(MemoryTaskStore::new(100));
    let (broker, rx) = InMemoryBroker::new(store.clone());
    let _pool = WorkerPool::spawn(rx, store.clone(), worker_context(), 2);

    let task = outdated_fetch_task(server.uri());
    let task_id = broker.submit(task).await.unwrap();

    let record = store
        .wait_terminal(task_id, Duration::from_secs(10))
        .await
        .expect("task reaches a terminal state");
    assert_eq!(record.state, TaskState::Succeeded);
    let result = record.result.unwrap();
    assert_eq!(result["ok"], json!(true));
    assert_eq!(result["summary"]["core_update_available"], json!(false));
}

#[tokio::test]
async fn unreachable_status_endpoint_still_succeeds_with_structured_error() {
    // semantic failure: the handler returns ok=false instead of raising
    let store: Arc<MemoryTaskStore> = Arc::new(MemoryTaskStore::new(100));
    let (broker, rx) = InMemoryBroker::new(store.clone());
    let _pool = WorkerPool::spawn(rx, store.clone(), worker_context(), 1);

    let task = outdated_fetch_task("http://127.0.0.1:1".to_string());
    let task_id = broker.submit(task).await.unwrap();

    let record = store
        .wait_terminal(task_id, Duration::from_secs(10))
        .await
        .expect("terminal state");
    assert_eq!(record.state, TaskState::Succeeded);
    let result = record.result.unwrap();
    assert_eq!(result["ok"], json!(false));
    assert!(result["error"].as_str().unwrap().contains("error"));
}

#[tokio::test]
async fn fifo_submission_keeps_every_task_tracked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/custom/v1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "plugins": [], "themes": [], "core": {}
        })))
        .mount(&server)
        .await;

    let store: Arc<MemoryTaskStore> = Arc::new(MemoryTaskStore::new(100));
    let (broker, rx) = InMemoryBroker::new(store.clone());
    let _pool = WorkerPool::spawn(rx, store.clone(), worker_context(), 4);

    let mut ids = Vec::new();
    for _ in 0..8 {
        ids.push(broker.submit(outdated_fetch_task(server.uri())).await.unwrap());
    }

    for task_id in ids {
        let record = store
            .wait_terminal(task_id, Duration::from_secs(10))
            .await
            .expect("every task terminates");
        assert_eq!(record.state, TaskState::Succeeded);
    }
}
