//! The six capability managers and the aggregate snapshot they feed.
//!
//! Each manager is an isolated unit owning its own state: tasks, alarms,
//! and calendar events persist in per-domain SQLite stores; timers are
//! in-memory by design; weather and news are live fetches behind short
//! caches. No manager depends on another — the aggregate SYSTEM_QUERY
//! snapshot is assembled at this layer, never in storage.

pub mod alarms;
pub mod calendar;
pub mod news;
pub mod tasks;
pub mod timers;
pub mod weather;

pub use alarms::{Alarm, AlarmManager};
pub use calendar::{CalendarEvent, CalendarManager};
pub use news::{Headline, NewsDigest, NewsManager};
pub use tasks::{Task, TaskManager};
pub use timers::{Timer, TimerFired, TimerManager, TimerStatus};
pub use weather::{WeatherManager, WeatherSnapshot};

use crate::error::Result;
use std::fmt;

/// Identifier of one capability manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerId {
    Tasks,
    Alarms,
    Timers,
    Calendar,
    Weather,
    News,
}

impl ManagerId {
    /// All managers, in aggregate-snapshot order.
    pub const ALL: [ManagerId; 6] = [
        ManagerId::Timers,
        ManagerId::Alarms,
        ManagerId::Calendar,
        ManagerId::Tasks,
        ManagerId::Weather,
        ManagerId::News,
    ];

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Alarms => "alarms",
            Self::Timers => "timers",
            Self::Calendar => "calendar",
            Self::Weather => "weather",
            Self::News => "news",
        }
    }
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One manager's contribution to the aggregate snapshot.
///
/// A failed or erroring manager degrades to `Unavailable` without
/// affecting any sibling section.
#[derive(Debug, Clone, PartialEq)]
pub enum Section<T> {
    Ready(T),
    Unavailable { cause: String },
}

impl<T> Section<T> {
    /// Build a section from an operation result.
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(e) => Self::Unavailable {
                cause: e.to_string(),
            },
        }
    }

    /// The ready value, if any.
    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(v) => Some(v),
            Self::Unavailable { .. } => None,
        }
    }

    /// Whether this section degraded.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Point-in-time aggregate read across all six managers.
#[derive(Debug, Clone)]
pub struct SystemSnapshot {
    pub captured_at: chrono::DateTime<chrono::Local>,
    pub timers: Section<Vec<TimerStatus>>,
    pub alarms: Section<Vec<Alarm>>,
    pub calendar_today: Section<Vec<CalendarEvent>>,
    pub tasks: Section<Vec<Task>>,
    pub weather: Section<WeatherSnapshot>,
    pub news: Section<NewsDigest>,
}

impl SystemSnapshot {
    /// Render the snapshot as a short spoken summary. Unavailable
    /// sections are mentioned once, not expanded.
    pub fn spoken_summary(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        parts.push(format!(
            "The current time is {}",
            self.captured_at.format("%H:%M on %A, %B %e")
        ));

        match &self.timers {
            Section::Ready(timers) if !timers.is_empty() => {
                let items: Vec<String> = timers
                    .iter()
                    .map(|t| format!("{} with {} remaining", t.label, t.format_remaining()))
                    .collect();
                parts.push(format!("Active timers. {}", items.join(". ")));
            }
            Section::Unavailable { .. } => parts.push("Timers are unavailable".to_owned()),
            _ => {}
        }

        match &self.alarms {
            Section::Ready(alarms) if !alarms.is_empty() => {
                let items: Vec<String> = alarms
                    .iter()
                    .take(3)
                    .map(|a| format!("{} at {}", a.label, a.time))
                    .collect();
                parts.push(format!("Alarms. {}", items.join(". ")));
            }
            Section::Unavailable { .. } => parts.push("Alarms are unavailable".to_owned()),
            _ => {}
        }

        match &self.calendar_today {
            Section::Ready(events) if !events.is_empty() => {
                let items: Vec<String> = events
                    .iter()
                    .take(3)
                    .map(|e| format!("{} at {}", e.title, e.start_time.format("%H:%M")))
                    .collect();
                parts.push(format!("Today's events. {}", items.join(". ")));
            }
            Section::Ready(_) => parts.push("No events today".to_owned()),
            Section::Unavailable { .. } => parts.push("The calendar is unavailable".to_owned()),
        }

        match &self.tasks {
            Section::Ready(tasks) => {
                let pending: Vec<&Task> = tasks.iter().filter(|t| !t.done).collect();
                if !pending.is_empty() {
                    let items: Vec<String> =
                        pending.iter().take(3).map(|t| t.text.clone()).collect();
                    parts.push(format!("Pending tasks. {}", items.join(". ")));
                }
            }
            Section::Unavailable { .. } => parts.push("Tasks are unavailable".to_owned()),
        }

        match &self.weather {
            Section::Ready(w) => parts.push(format!(
                "Weather. {:.0} degrees. High {:.0}. Low {:.0}",
                w.temperature_c, w.high_c, w.low_c
            )),
            Section::Unavailable { .. } => parts.push("Weather is unavailable".to_owned()),
        }

        if let Section::Ready(digest) = &self.news {
            if !digest.headlines.is_empty() {
                parts.push(format!(
                    "{} news headlines available",
                    digest.headlines.len()
                ));
            }
        }

        let mut summary = parts.join(". ");
        summary.push('.');
        summary
    }
}

/// Run a network-backed operation with one bounded retry on transient
/// failure, with a short jittered backoff.
pub(crate) async fn with_one_retry<T, F, Fut>(op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(e) if e.is_transient() => {
            let jitter: u64 = {
                use rand::Rng;
                rand::thread_rng().gen_range(0..250)
            };
            tracing::warn!("transient failure, retrying once: {e}");
            tokio::time::sleep(std::time::Duration::from_millis(400 + jitter)).await;
            op().await
        }
        Err(e) => Err(e),
    }
}
