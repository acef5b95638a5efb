//! In-memory countdown timers.
//!
//! Unlike alarms, which persist in SQLite and survive restarts, timers
//! are ephemeral countdowns that only live while the process runs — an
//! intentional contract, not a gap. Completion is observable two ways:
//! polling [`TimerManager::active`] or draining the event channel from
//! [`TimerManager::subscribe`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A running countdown.
#[derive(Debug, Clone)]
pub struct Timer {
    pub id: String,
    pub label: String,
    pub duration: Duration,
    pub started_at: Instant,
}

impl Timer {
    /// Time left on the countdown, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.started_at.elapsed())
    }

    /// Whether the countdown has run out.
    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

/// Listing entry for an active timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerStatus {
    pub id: String,
    pub label: String,
    pub remaining: Duration,
}

impl TimerStatus {
    /// Human format: `1h 3m 20s`, `3m 20s`, or `20s`.
    pub fn format_remaining(&self) -> String {
        let total = self.remaining.as_secs();
        let (hours, rest) = (total / 3600, total % 3600);
        let (mins, secs) = (rest / 60, rest % 60);
        if hours > 0 {
            format!("{hours}h {mins}m {secs}s")
        } else if mins > 0 {
            format!("{mins}m {secs}s")
        } else {
            format!("{secs}s")
        }
    }
}

/// Completion event delivered when a countdown runs out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub id: String,
    pub label: String,
}

struct ActiveTimer {
    timer: Timer,
    cancel: CancellationToken,
}

/// Manages in-memory countdown timers.
///
/// Timers are keyed by label; starting a timer with an existing label
/// replaces the old countdown.
pub struct TimerManager {
    timers: Arc<Mutex<HashMap<String, ActiveTimer>>>,
    fired_tx: mpsc::UnboundedSender<TimerFired>,
    fired_rx: Mutex<Option<mpsc::UnboundedReceiver<TimerFired>>>,
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerManager {
    /// Create an empty timer manager.
    pub fn new() -> Self {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            fired_tx,
            fired_rx: Mutex::new(Some(fired_rx)),
        }
    }

    /// Start a countdown. Must be called from within a tokio runtime.
    pub fn start(&self, label: &str, duration: Duration) -> Timer {
        let timer = Timer {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.to_owned(),
            duration,
            started_at: Instant::now(),
        };
        let cancel = CancellationToken::new();

        {
            let mut timers = lock(&self.timers);
            // Replacing a same-label timer cancels its countdown task.
            if let Some(old) = timers.insert(
                label.to_owned(),
                ActiveTimer {
                    timer: timer.clone(),
                    cancel: cancel.clone(),
                },
            ) {
                old.cancel.cancel();
            }
        }

        let timers = Arc::clone(&self.timers);
        let fired_tx = self.fired_tx.clone();
        let fired = TimerFired {
            id: timer.id.clone(),
            label: timer.label.clone(),
        };
        let timer_id = timer.id.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(duration) => {
                    let mut timers = lock(&timers);
                    // Only remove the entry if it is still this countdown.
                    if timers.get(&fired.label).is_some_and(|a| a.timer.id == timer_id) {
                        timers.remove(&fired.label);
                    }
                    drop(timers);
                    info!("timer fired: {}", fired.label);
                    let _ = fired_tx.send(fired);
                }
            }
        });

        timer
    }

    /// All non-expired timers, pruning any that ran out.
    pub fn active(&self) -> Vec<TimerStatus> {
        let mut timers = lock(&self.timers);
        timers.retain(|_, a| !a.timer.is_expired());
        let mut statuses: Vec<TimerStatus> = timers
            .values()
            .map(|a| TimerStatus {
                id: a.timer.id.clone(),
                label: a.timer.label.clone(),
                remaining: a.timer.remaining(),
            })
            .collect();
        statuses.sort_by(|a, b| a.remaining.cmp(&b.remaining));
        statuses
    }

    /// Cancel a timer by label. Returns `true` when one was running.
    pub fn cancel(&self, label: &str) -> bool {
        let mut timers = lock(&self.timers);
        if let Some(active) = timers.remove(label) {
            active.cancel.cancel();
            return true;
        }
        false
    }

    /// Take the completion event receiver. Single consumer: returns
    /// `None` after the first call.
    pub fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<TimerFired>> {
        self.fired_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

fn lock(
    timers: &Arc<Mutex<HashMap<String, ActiveTimer>>>,
) -> std::sync::MutexGuard<'_, HashMap<String, ActiveTimer>> {
    timers.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_and_cancel() {
        let manager = TimerManager::new();
        manager.start("tea", Duration::from_secs(600));
        let active = manager.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].label, "tea");
        assert!(active[0].remaining <= Duration::from_secs(600));

        assert!(manager.cancel("tea"));
        assert!(!manager.cancel("tea"));
        assert!(manager.active().is_empty());
    }

    #[tokio::test]
    async fn completion_event_is_delivered() {
        let manager = TimerManager::new();
        let mut fired = manager.subscribe().expect("first subscribe");
        assert!(manager.subscribe().is_none());

        manager.start("egg", Duration::from_millis(20));
        let event = tokio::time::timeout(Duration::from_secs(1), fired.recv())
            .await
            .expect("timer should fire")
            .expect("channel open");
        assert_eq!(event.label, "egg");
        assert!(manager.active().is_empty());
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let manager = TimerManager::new();
        let mut fired = manager.subscribe().unwrap();
        manager.start("quick", Duration::from_millis(30));
        assert!(manager.cancel("quick"));
        let outcome = tokio::time::timeout(Duration::from_millis(120), fired.recv()).await;
        assert!(outcome.is_err(), "no event expected after cancel");
    }

    #[tokio::test]
    async fn same_label_replaces_countdown() {
        let manager = TimerManager::new();
        let first = manager.start("tea", Duration::from_secs(60));
        let second = manager.start("tea", Duration::from_secs(120));
        assert_ne!(first.id, second.id);
        let active = manager.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
    }

    #[test]
    fn remaining_formats() {
        let status = |secs| TimerStatus {
            id: "t".into(),
            label: "t".into(),
            remaining: Duration::from_secs(secs),
        };
        assert_eq!(status(45).format_remaining(), "45s");
        assert_eq!(status(125).format_remaining(), "2m 5s");
        assert_eq!(status(3800).format_remaining(), "1h 3m 20s");
    }
}
