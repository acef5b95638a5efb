//! Function executor: resolves validated calls to manager operations.
//!
//! Dispatch is driven by the static registration table; the executor
//! looks managers up through the registry, so a failed manager yields a
//! structured [`ExecutionResult::ManagerUnavailable`] value rather than
//! an error path. Mutating operations are never silently retried — a
//! failure is surfaced to the session loop, which picks the user-facing
//! language. Natural-language argument normalization (durations, clock
//! times, dates) lives here, at the last boundary before the managers.

use crate::error::AssistantError;
use crate::intent::schema::{self, Target};
use crate::intent::FunctionCall;
use crate::managers::ManagerId;
use crate::registry::ManagerRegistry;
use crate::search::{self, SearchClient};
use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Outcome of one function execution. Always a value, never a panic or
/// an unhandled fault.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// The operation completed; `spoken` is a TTS-ready message.
    Success {
        spoken: String,
        data: Option<serde_json::Value>,
    },
    /// The operation could not be carried out (not found, upstream
    /// refused, service did not respond).
    Declined { reason: String },
    /// The owning manager failed to initialize or its backend is down.
    ManagerUnavailable { manager: ManagerId, cause: String },
    /// An argument failed execution-time validation.
    ValidationError { field: String, reason: String },
}

impl ExecutionResult {
    fn success(spoken: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self::Success {
            spoken: spoken.into(),
            data,
        }
    }

    fn declined(reason: impl Into<String>) -> Self {
        Self::Declined {
            reason: reason.into(),
        }
    }

    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }

    /// Whether this result reports a completed operation.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// OS process launching seam.
pub trait AppLauncher: Send + Sync {
    /// Launch an application by name.
    ///
    /// # Errors
    ///
    /// Returns an error when the process cannot be spawned.
    fn launch_app(&self, name: &str) -> crate::error::Result<()>;

    /// Open a URL with the system handler.
    ///
    /// # Errors
    ///
    /// Returns an error when the handler cannot be spawned.
    fn open_url(&self, url: &str) -> crate::error::Result<()>;
}

/// Default launcher using the platform's open conventions.
pub struct SystemLauncher;

impl AppLauncher for SystemLauncher {
    fn launch_app(&self, name: &str) -> crate::error::Result<()> {
        #[cfg(target_os = "macos")]
        let result = Command::new("open").args(["-a", name]).spawn();
        #[cfg(target_os = "windows")]
        let result = Command::new("cmd").args(["/C", "start", "", name]).spawn();
        #[cfg(all(unix, not(target_os = "macos")))]
        let result = Command::new(name).spawn();

        result.map(|_| ()).map_err(AssistantError::Io)
    }

    fn open_url(&self, url: &str) -> crate::error::Result<()> {
        #[cfg(target_os = "macos")]
        let result = Command::new("open").arg(url).spawn();
        #[cfg(target_os = "windows")]
        let result = Command::new("cmd").args(["/C", "start", "", url]).spawn();
        #[cfg(all(unix, not(target_os = "macos")))]
        let result = Command::new("xdg-open").arg(url).spawn();

        result.map(|_| ()).map_err(AssistantError::Io)
    }
}

/// Central executor for all routed functions.
pub struct FunctionExecutor {
    registry: Arc<ManagerRegistry>,
    search: SearchClient,
    launcher: Arc<dyn AppLauncher>,
}

impl FunctionExecutor {
    /// Create an executor over the given registry and seams.
    pub fn new(
        registry: Arc<ManagerRegistry>,
        search: SearchClient,
        launcher: Arc<dyn AppLauncher>,
    ) -> Self {
        Self {
            registry,
            search,
            launcher,
        }
    }

    /// The manager registry behind this executor.
    pub fn registry(&self) -> &Arc<ManagerRegistry> {
        &self.registry
    }

    /// Execute a validated function call.
    pub async fn execute(&self, call: &FunctionCall) -> ExecutionResult {
        let Some(spec) = schema::lookup(&call.name) else {
            // The router never forwards unregistered names; this guards
            // direct library callers.
            return ExecutionResult::declined(format!("unknown function: {}", call.name));
        };
        info!("executing {}", call.name);

        match spec.target {
            Target::Manager(ManagerId::Timers) => self.execute_timer(call),
            Target::Manager(ManagerId::Alarms) => self.execute_alarm(call),
            Target::Manager(ManagerId::Calendar) => self.execute_calendar(call),
            Target::Manager(ManagerId::Tasks) => self.execute_task(call),
            Target::Manager(ManagerId::Weather) => self.execute_weather().await,
            Target::Manager(ManagerId::News) => self.execute_news(call).await,
            Target::Search => self.execute_search(call).await,
            Target::Launcher => self.execute_launcher(call),
            Target::Aggregate => {
                let snapshot = self.registry.snapshot().await;
                ExecutionResult::success(snapshot.spoken_summary(), None)
            }
        }
    }

    fn execute_timer(&self, call: &FunctionCall) -> ExecutionResult {
        let timers = match self.registry.timers() {
            Ok(m) => m,
            Err(u) => return unavailable(u),
        };

        match call.name.as_str() {
            "set_timer" => {
                let duration_text = call.str_arg("duration").unwrap_or_default();
                let label = call.str_arg("label").unwrap_or("Timer");
                let seconds = parse_duration_secs(duration_text);
                if seconds == 0 {
                    return ExecutionResult::invalid(
                        "duration",
                        format!("could not parse {duration_text:?}"),
                    );
                }
                let timer = timers.start(label, Duration::from_secs(seconds));
                ExecutionResult::success(
                    format!("Timer '{label}' set for {duration_text}."),
                    Some(serde_json::json!({
                        "id": timer.id,
                        "label": timer.label,
                        "seconds": seconds,
                    })),
                )
            }
            "cancel_timer" => {
                let label = call.str_arg("label").unwrap_or_default();
                if timers.cancel(label) {
                    ExecutionResult::success(format!("Cancelled the {label} timer."), None)
                } else {
                    ExecutionResult::declined(format!("there is no timer called {label}"))
                }
            }
            other => ExecutionResult::declined(format!("unsupported timer operation: {other}")),
        }
    }

    fn execute_alarm(&self, call: &FunctionCall) -> ExecutionResult {
        let alarms = match self.registry.alarms() {
            Ok(m) => m,
            Err(u) => return unavailable(u),
        };

        let time_text = call.str_arg("time").unwrap_or_default();
        let label = call.str_arg("label").unwrap_or("Alarm");
        let normalized = normalize_time(time_text);
        if NaiveTime::parse_from_str(&normalized, "%H:%M").is_err() {
            return ExecutionResult::invalid("time", format!("could not parse {time_text:?}"));
        }

        match alarms.add(&normalized, label) {
            Ok(alarm) => ExecutionResult::success(
                if label == "Alarm" {
                    format!("Alarm set for {normalized}.")
                } else {
                    format!("Alarm set for {normalized} ({label}).")
                },
                Some(serde_json::json!({ "id": alarm.id, "time": alarm.time })),
            ),
            Err(e) => fail(ManagerId::Alarms, &e),
        }
    }

    fn execute_calendar(&self, call: &FunctionCall) -> ExecutionResult {
        let calendar = match self.registry.calendar() {
            Ok(m) => m,
            Err(u) => return unavailable(u),
        };

        let title = call.str_arg("title").unwrap_or("Event");
        let date_text = call.str_arg("date").unwrap_or("today");
        let time_text = call.str_arg("time").unwrap_or("09:00");
        let duration_minutes = call.int_arg("duration").unwrap_or(60).max(0);

        let date = resolve_date(date_text, Local::now().date_naive());
        let normalized = normalize_time(time_text);
        let Ok(time) = NaiveTime::parse_from_str(&normalized, "%H:%M") else {
            return ExecutionResult::invalid("time", format!("could not parse {time_text:?}"));
        };
        let start = NaiveDateTime::new(date, time);
        let end = start + ChronoDuration::minutes(duration_minutes);

        match calendar.add(title, start, Some(end), "") {
            Ok(event) => ExecutionResult::success(
                format!("Created event '{title}' on {date_text} at {normalized}."),
                Some(serde_json::json!({
                    "id": event.id,
                    "start_time": event.start_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                })),
            ),
            Err(e) => fail(ManagerId::Calendar, &e),
        }
    }

    fn execute_task(&self, call: &FunctionCall) -> ExecutionResult {
        let tasks = match self.registry.tasks() {
            Ok(m) => m,
            Err(u) => return unavailable(u),
        };

        match call.name.as_str() {
            "add_task" => {
                let text = call.str_arg("text").unwrap_or_default();
                if text.is_empty() {
                    return ExecutionResult::invalid("text", "no task text provided");
                }
                match tasks.add(text) {
                    Ok(task) => ExecutionResult::success(
                        format!("Added task: {text}."),
                        Some(serde_json::json!({ "id": task.id })),
                    ),
                    Err(e) => fail(ManagerId::Tasks, &e),
                }
            }
            "complete_task" => {
                let text = call.str_arg("text").unwrap_or_default();
                match tasks.complete_matching(text) {
                    Ok(Some(task)) => ExecutionResult::success(
                        format!("Marked '{}' as done.", task.text),
                        Some(serde_json::json!({ "id": task.id })),
                    ),
                    Ok(None) => ExecutionResult::declined(format!(
                        "no pending task matches {text:?}"
                    )),
                    Err(e) => fail(ManagerId::Tasks, &e),
                }
            }
            other => ExecutionResult::declined(format!("unsupported task operation: {other}")),
        }
    }

    async fn execute_weather(&self) -> ExecutionResult {
        let weather = match self.registry.weather() {
            Ok(m) => m,
            Err(u) => return unavailable(u),
        };
        match weather.fetch().await {
            Ok(snapshot) => ExecutionResult::success(
                format!(
                    "It is {:.0} degrees right now. High {:.0}. Low {:.0}.",
                    snapshot.temperature_c, snapshot.high_c, snapshot.low_c
                ),
                Some(serde_json::json!({
                    "temperature_c": snapshot.temperature_c,
                    "high_c": snapshot.high_c,
                    "low_c": snapshot.low_c,
                    "weather_code": snapshot.weather_code,
                })),
            ),
            Err(e) => fail(ManagerId::Weather, &e),
        }
    }

    async fn execute_news(&self, call: &FunctionCall) -> ExecutionResult {
        let news = match self.registry.news() {
            Ok(m) => m,
            Err(u) => return unavailable(u),
        };
        let topic = call.str_arg("topic");
        match news.fetch(topic, true).await {
            Ok(digest) if digest.headlines.is_empty() => {
                ExecutionResult::declined("no headlines right now")
            }
            Ok(digest) => {
                let titles: Vec<&str> = digest
                    .headlines
                    .iter()
                    .take(3)
                    .map(|h| h.title.as_str())
                    .collect();
                ExecutionResult::success(
                    format!(
                        "Here are the top headlines. {}.",
                        titles.join(". ")
                    ),
                    Some(serde_json::json!({
                        "count": digest.headlines.len(),
                        "curated": digest.curated,
                    })),
                )
            }
            Err(e) => fail(ManagerId::News, &e),
        }
    }

    async fn execute_search(&self, call: &FunctionCall) -> ExecutionResult {
        let query = call.str_arg("query").unwrap_or_default();
        if query.is_empty() {
            return ExecutionResult::invalid("query", "no search query provided");
        }
        match self.search.search(query).await {
            Ok(results) => {
                let spoken = search::spoken_answer(&results)
                    .unwrap_or_else(|| "I could not find anything useful.".to_owned());
                let data: Vec<serde_json::Value> = results
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "title": r.title,
                            "snippet": r.snippet,
                            "url": r.url,
                        })
                    })
                    .collect();
                ExecutionResult::success(spoken, Some(serde_json::json!({ "results": data })))
            }
            Err(e) => ExecutionResult::declined(format!("the search did not respond: {e}")),
        }
    }

    fn execute_launcher(&self, call: &FunctionCall) -> ExecutionResult {
        match call.name.as_str() {
            "launch_app" => {
                let name = call.str_arg("name").unwrap_or_default();
                if name.is_empty() {
                    return ExecutionResult::invalid("name", "no application name provided");
                }
                match self.launcher.launch_app(name) {
                    Ok(()) => ExecutionResult::success(format!("Opened {name} for you."), None),
                    Err(e) => ExecutionResult::declined(format!("could not open {name}: {e}")),
                }
            }
            "play_media" => {
                let query = call.str_arg("query").unwrap_or_default();
                if query.is_empty() {
                    return ExecutionResult::invalid("query", "no music query provided");
                }
                let encoded: String =
                    url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
                let url = format!(
                    "https://open.spotify.com/search/{}",
                    encoded.replace('+', "%20")
                );
                match self.launcher.open_url(&url) {
                    Ok(()) => {
                        ExecutionResult::success(format!("Opening Spotify for {query}."), None)
                    }
                    Err(e) => ExecutionResult::declined(format!("could not open Spotify: {e}")),
                }
            }
            other => ExecutionResult::declined(format!("unsupported launcher operation: {other}")),
        }
    }
}

fn unavailable(u: crate::registry::Unavailable) -> ExecutionResult {
    ExecutionResult::ManagerUnavailable {
        manager: u.manager,
        cause: u.cause,
    }
}

/// Map an operation error to a result value: backend/store trouble means
/// the manager is effectively unavailable, transient trouble declines
/// with an apologetic reason.
fn fail(manager: ManagerId, e: &AssistantError) -> ExecutionResult {
    if e.is_transient() {
        ExecutionResult::declined(format!("the {manager} service did not respond"))
    } else {
        ExecutionResult::ManagerUnavailable {
            manager,
            cause: e.to_string(),
        }
    }
}

/// Parse `10 minutes`, `1 hour 30 minutes`, `30s` and similar into
/// seconds. A bare number is taken as minutes. Returns 0 when nothing
/// parses.
pub fn parse_duration_secs(text: &str) -> u64 {
    let lower = text.to_lowercase();
    let bytes = lower.as_bytes();
    let mut total: u64 = 0;
    let mut first_number: Option<u64> = None;
    let mut i = 0;

    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let value: u64 = lower[start..i].parse().unwrap_or(0);
        if first_number.is_none() {
            first_number = Some(value);
        }

        let mut j = i;
        while j < bytes.len() && bytes[j] == b' ' {
            j += 1;
        }
        let unit_start = j;
        while j < bytes.len() && bytes[j].is_ascii_alphabetic() {
            j += 1;
        }
        let multiplier = match lower[unit_start..j].chars().next() {
            Some('h') => 3600,
            Some('m') => 60,
            Some('s') => 1,
            _ => 0,
        };
        if multiplier > 0 {
            total += value * multiplier;
            i = j;
        }
    }

    if total == 0 {
        // Bare number: assume minutes.
        return first_number.unwrap_or(0) * 60;
    }
    total
}

/// Normalize `7am`, `6:30 pm`, `14:30` to `HH:MM`. Unparseable input is
/// returned unchanged so the caller can validate and report it.
pub fn normalize_time(text: &str) -> String {
    let lower = text.to_lowercase();
    let trimmed = lower.trim();
    let bytes = trimmed.as_bytes();

    let mut i = 0;
    while i < bytes.len() && i < 2 && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == 0 {
        return trimmed.to_owned();
    }
    let Ok(mut hour) = trimmed[..i].parse::<u32>() else {
        return trimmed.to_owned();
    };

    let mut minute = 0;
    let mut rest = &trimmed[i..];
    if let Some(after) = rest.strip_prefix(':') {
        if after.len() >= 2 && after.as_bytes()[..2].iter().all(u8::is_ascii_digit) {
            minute = after[..2].parse().unwrap_or(0);
            rest = &after[2..];
        } else {
            return trimmed.to_owned();
        }
    }

    let rest = rest.trim();
    if rest.starts_with("pm") && hour < 12 {
        hour += 12;
    } else if rest.starts_with("am") && hour == 12 {
        hour = 0;
    }

    if hour > 23 || minute > 59 {
        return trimmed.to_owned();
    }
    format!("{hour:02}:{minute:02}")
}

/// Resolve `today`, `tomorrow`, a weekday name (optionally prefixed by
/// `next`), or a literal `YYYY-MM-DD` against `today`. Anything else
/// resolves to `today`.
pub fn resolve_date(text: &str, today: NaiveDate) -> NaiveDate {
    let lower = text.to_lowercase();
    let trimmed = lower.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date;
    }
    if trimmed.is_empty() || trimmed == "today" {
        return today;
    }
    if trimmed == "tomorrow" {
        return today + ChronoDuration::days(1);
    }

    const DAYS: [&str; 7] = [
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
    ];
    for (index, day) in DAYS.iter().enumerate() {
        if trimmed.contains(day) {
            let current = today.weekday().num_days_from_monday() as i64;
            let mut ahead = index as i64 - current;
            if ahead <= 0 {
                ahead += 7;
            }
            if trimmed.contains("next") {
                ahead += 7;
            }
            return today + ChronoDuration::days(ahead);
        }
    }

    today
}
