#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end routing and execution: classifier payload in, manager
//! effect out, with the downgrade and isolation invariants checked at
//! the seams.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tsuzi::classifier::{IntentClassifier, RawIntentPayload};
use tsuzi::config::{ManagersConfig, RouterConfig, SearchConfig, WeatherConfig};
use tsuzi::executor::{AppLauncher, FunctionExecutor};
use tsuzi::history::Turn;
use tsuzi::intent::{Intent, IntentRouter, RouteOutcome};
use tsuzi::managers::{ManagerId, Section};
use tsuzi::registry::ManagerRegistry;
use tsuzi::search::SearchClient;
use tsuzi::{ExecutionResult, Result};

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "tsuzi-e2e-{name}-{}-{}",
        std::process::id(),
        uuid::Uuid::new_v4()
    ))
}

/// Classifier that replays a fixed payload and counts invocations.
struct Scripted {
    content: String,
    calls: AtomicU32,
}

impl Scripted {
    fn new(content: &str) -> Arc<Self> {
        Arc::new(Self {
            content: content.to_owned(),
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl IntentClassifier for Scripted {
    async fn classify(&self, _text: &str, _context: &[Turn]) -> Result<RawIntentPayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RawIntentPayload {
            content: self.content.clone(),
            confidence: 1.0,
        })
    }
}

/// Launcher stub; these tests never spawn real processes.
struct NoopLauncher;

impl AppLauncher for NoopLauncher {
    fn launch_app(&self, _name: &str) -> Result<()> {
        Ok(())
    }
    fn open_url(&self, _url: &str) -> Result<()> {
        Ok(())
    }
}

fn executor_for(dir: PathBuf) -> Arc<FunctionExecutor> {
    let config = ManagersConfig {
        data_dir: dir,
        ..ManagersConfig::default()
    };
    let registry = Arc::new(ManagerRegistry::new(config, None));
    let search = SearchClient::new(&SearchConfig::default()).unwrap();
    Arc::new(FunctionExecutor::new(registry, search, Arc::new(NoopLauncher)))
}

#[tokio::test]
async fn set_timer_flows_from_utterance_to_manager() {
    let dir = temp_dir("timer");
    let executor = executor_for(dir.clone());
    let classifier = Scripted::new("call:set_timer{duration:<escape>10 minutes<escape>}");
    let router = IntentRouter::new(classifier, &RouterConfig::default());

    let outcome = router.route("Set a timer for 10 minutes", &[]).await;
    let RouteOutcome::Routed(Intent::Action { call, .. }) = outcome else {
        panic!("expected action, got {outcome:?}");
    };

    let result = executor.execute(&call).await;
    let ExecutionResult::Success { spoken, .. } = result else {
        panic!("expected success, got {result:?}");
    };
    assert!(spoken.contains("10 minutes"), "{spoken}");

    let timers = executor.registry().timers().unwrap();
    let active = timers.active();
    assert_eq!(active.len(), 1);
    assert!(active[0].remaining <= Duration::from_secs(600));
    assert!(active[0].remaining > Duration::from_secs(595));

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn unknown_functions_never_reach_the_executor() {
    let classifier = Scripted::new("call:order_pizza{size:<escape>large<escape>}");
    let router = IntentRouter::new(classifier.clone(), &RouterConfig::default());

    let outcome = router.route("order a pizza", &[]).await;
    assert!(
        matches!(outcome, RouteOutcome::Routed(Intent::Passthrough { .. })),
        "{outcome:?}"
    );
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn schema_violations_downgrade_to_passthrough() {
    // duration must be an integer for calendar events
    let classifier = Scripted::new(
        "call:create_calendar_event{title:<escape>lunch<escape>,duration:<escape>long<escape>}",
    );
    let router = IntentRouter::new(classifier, &RouterConfig::default());
    let outcome = router.route("lunch tomorrow", &[]).await;
    assert!(matches!(
        outcome,
        RouteOutcome::Routed(Intent::Passthrough { .. })
    ));
}

#[tokio::test]
async fn aggregate_includes_unavailable_sections_without_dropping_ready_ones() {
    // A file where the data dir should be fails every store-backed
    // manager; timers carry no store and must still report.
    let dir = temp_dir("aggregate");
    std::fs::create_dir_all(dir.parent().unwrap()).unwrap();
    std::fs::write(&dir, b"not a directory").unwrap();

    let config = ManagersConfig {
        data_dir: dir.clone(),
        weather: WeatherConfig {
            // Unroutable endpoint with a tight timeout keeps the test fast.
            api_url: "http://127.0.0.1:9/forecast".to_owned(),
            request_timeout_secs: 1,
            ..WeatherConfig::default()
        },
        search: SearchConfig {
            endpoint: "http://127.0.0.1:9/html".to_owned(),
            request_timeout_secs: 1,
            ..SearchConfig::default()
        },
        ..ManagersConfig::default()
    };
    let registry = ManagerRegistry::new(config, None);

    let snapshot = registry.snapshot().await;
    assert!(snapshot.tasks.is_unavailable());
    assert!(snapshot.alarms.is_unavailable());
    assert!(snapshot.weather.is_unavailable());
    assert!(matches!(snapshot.timers, Section::Ready(ref t) if t.is_empty()));

    // The spoken summary still renders.
    let spoken = snapshot.spoken_summary();
    assert!(spoken.contains("unavailable"), "{spoken}");

    let _ = std::fs::remove_file(dir);
}

#[tokio::test]
async fn failed_manager_leaves_siblings_ready() {
    let dir = temp_dir("sibling");
    std::fs::create_dir_all(dir.parent().unwrap()).unwrap();
    std::fs::write(&dir, b"not a directory").unwrap();

    let config = ManagersConfig {
        data_dir: dir.clone(),
        ..ManagersConfig::default()
    };
    let registry = ManagerRegistry::new(config, None);
    assert!(registry.tasks().is_err());
    assert!(registry.timers().is_ok());
    assert_eq!(
        registry.handle(ManagerId::Tasks).state,
        tsuzi::Lifecycle::Failed
    );
    assert_eq!(
        registry.handle(ManagerId::Timers).state,
        tsuzi::Lifecycle::Ready
    );

    let _ = std::fs::remove_file(dir);
}

#[tokio::test]
async fn concurrent_task_creation_yields_distinct_ids() {
    let dir = temp_dir("concurrent-tasks");
    let executor = executor_for(dir.clone());

    let mut handles = Vec::new();
    for i in 0..8 {
        let executor = Arc::clone(&executor);
        handles.push(tokio::spawn(async move {
            let call = tsuzi::FunctionCall::with_arg("add_task", "text", &format!("task {i}"));
            executor.execute(&call).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_success());
    }

    let tasks = executor.registry().tasks().unwrap().list(false).unwrap();
    assert_eq!(tasks.len(), 8);
    let ids: std::collections::HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids.len(), 8, "no id collisions under concurrent mutation");

    let _ = std::fs::remove_dir_all(dir);
}
