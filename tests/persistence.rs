#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Persistence contracts across a simulated restart: SQLite-backed
//! managers recover everything, timers recover nothing.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tsuzi::config::ManagersConfig;
use tsuzi::registry::ManagerRegistry;

fn registry_for(data_dir: &std::path::Path) -> ManagerRegistry {
    ManagerRegistry::new(
        ManagersConfig {
            data_dir: data_dir.to_path_buf(),
            ..ManagersConfig::default()
        },
        None,
    )
}

#[tokio::test]
async fn stores_recover_after_restart_while_timers_do_not() {
    let dir = TempDir::new().unwrap();

    // First process run: one of everything.
    {
        let registry = Arc::new(registry_for(dir.path()));

        registry.tasks().unwrap().add("water the plants").unwrap();
        registry.alarms().unwrap().add("07:30", "workout").unwrap();
        let start = chrono::NaiveDateTime::parse_from_str(
            "2026-08-07 09:00:00",
            "%Y-%m-%d %H:%M:%S",
        )
        .unwrap();
        registry
            .calendar()
            .unwrap()
            .add("standup", start, None, "")
            .unwrap();
        registry
            .timers()
            .unwrap()
            .start("tea", Duration::from_secs(600));

        assert_eq!(registry.timers().unwrap().active().len(), 1);
        // Registry dropped here: the "process" ends.
    }

    // Second process run against the same data directory.
    let registry = registry_for(dir.path());

    let tasks = registry.tasks().unwrap().list(false).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].text, "water the plants");
    assert!(!tasks[0].done);

    let alarms = registry.alarms().unwrap().list(false).unwrap();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].time, "07:30");
    assert!(alarms[0].enabled);

    let events = registry
        .calendar()
        .unwrap()
        .events_on(chrono::NaiveDate::from_ymd_opt(2026, 8, 7).unwrap())
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title, "standup");

    // Ephemeral contract: the timer did not survive.
    assert!(registry.timers().unwrap().active().is_empty());
}

#[tokio::test]
async fn store_identifiers_are_never_reused() {
    let dir = TempDir::new().unwrap();
    let registry = registry_for(dir.path());
    let tasks = registry.tasks().unwrap();

    let mut ids = std::collections::HashSet::new();
    for i in 0..20 {
        let task = tasks.add(&format!("task {i}")).unwrap();
        assert!(ids.insert(task.id.clone()), "duplicate id {}", task.id);
    }
    // Deleting and re-adding never resurrects an id.
    let doomed = tasks.add("doomed").unwrap();
    assert!(tasks.delete(&doomed.id).unwrap());
    let replacement = tasks.add("replacement").unwrap();
    assert_ne!(doomed.id, replacement.id);
}

#[tokio::test]
async fn each_domain_owns_an_independent_store() {
    let dir = TempDir::new().unwrap();
    let registry = registry_for(dir.path());
    registry.tasks().unwrap().add("a task").unwrap();
    registry.alarms().unwrap().add("06:00", "alarm").unwrap();

    assert!(dir.path().join("tasks.db").exists());
    assert!(dir.path().join("alarms.db").exists());
    // The calendar was never touched; its store does not exist yet.
    assert!(!dir.path().join("calendar.db").exists());
}
