//! Lazy, fault-isolating manager registry.
//!
//! Each manager lives in its own lifecycle cell: constructed on first
//! access inside a double-checked critical section, with initialization
//! failures cached so a broken manager (missing store, bad data dir)
//! costs one attempt, not one per call. Failed is terminal until an
//! explicit reload — and strictly local: no cell can affect a sibling's
//! initialization or its contribution to the aggregate snapshot.

use crate::config::ManagersConfig;
use crate::error::Result;
use crate::llm::LanguageBackend;
use crate::managers::{
    AlarmManager, CalendarManager, ManagerId, NewsManager, Section, SystemSnapshot, TaskManager,
    TimerManager, WeatherManager,
};
use crate::search::SearchClient;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// Lifecycle of one manager cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unloaded,
    Ready,
    Failed,
}

/// Introspection view of one manager cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerHandle {
    pub id: ManagerId,
    pub state: Lifecycle,
    pub last_error: Option<String>,
}

/// Access failure: the manager could not be initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unavailable {
    pub manager: ManagerId,
    pub cause: String,
}

/// Access result for one manager.
pub type Access<T> = std::result::Result<Arc<T>, Unavailable>;

enum CellState<T> {
    Unloaded,
    Ready(Arc<T>),
    Failed(String),
}

/// One lazily-initialized manager slot.
struct LazyCell<T> {
    state: RwLock<CellState<T>>,
}

impl<T> LazyCell<T> {
    fn new() -> Self {
        Self {
            state: RwLock::new(CellState::Unloaded),
        }
    }

    /// Double-checked initialization: a read-lock fast path, then a
    /// write-lock re-check before running the constructor, so concurrent
    /// first accesses never construct duplicate instances.
    fn get_or_init<F: FnOnce() -> Result<T>>(&self, init: F) -> std::result::Result<Arc<T>, String> {
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            match &*state {
                CellState::Ready(manager) => return Ok(Arc::clone(manager)),
                CellState::Failed(cause) => return Err(cause.clone()),
                CellState::Unloaded => {}
            }
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            CellState::Ready(manager) => Ok(Arc::clone(manager)),
            CellState::Failed(cause) => Err(cause.clone()),
            CellState::Unloaded => match init() {
                Ok(manager) => {
                    let manager = Arc::new(manager);
                    *state = CellState::Ready(Arc::clone(&manager));
                    Ok(manager)
                }
                Err(e) => {
                    let cause = e.to_string();
                    *state = CellState::Failed(cause.clone());
                    Err(cause)
                }
            },
        }
    }

    fn lifecycle(&self) -> (Lifecycle, Option<String>) {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            CellState::Unloaded => (Lifecycle::Unloaded, None),
            CellState::Ready(_) => (Lifecycle::Ready, None),
            CellState::Failed(cause) => (Lifecycle::Failed, Some(cause.clone())),
        }
    }

    /// Operator-triggered reset back to Unloaded; the next access
    /// re-runs initialization.
    fn reset(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = CellState::Unloaded;
    }
}

/// Owns the six manager cells and assembles the aggregate snapshot.
pub struct ManagerRegistry {
    config: ManagersConfig,
    llm: Option<Arc<dyn LanguageBackend>>,
    tasks: LazyCell<TaskManager>,
    alarms: LazyCell<AlarmManager>,
    timers: LazyCell<TimerManager>,
    calendar: LazyCell<CalendarManager>,
    weather: LazyCell<WeatherManager>,
    news: LazyCell<NewsManager>,
}

impl ManagerRegistry {
    /// Create a registry. No manager is constructed until first use.
    ///
    /// `llm` feeds the news manager's curation step; without it curation
    /// is skipped.
    pub fn new(config: ManagersConfig, llm: Option<Arc<dyn LanguageBackend>>) -> Self {
        Self {
            config,
            llm,
            tasks: LazyCell::new(),
            alarms: LazyCell::new(),
            timers: LazyCell::new(),
            calendar: LazyCell::new(),
            weather: LazyCell::new(),
            news: LazyCell::new(),
        }
    }

    /// The task manager.
    pub fn tasks(&self) -> Access<TaskManager> {
        let data_dir = self.config.data_dir.clone();
        self.tasks
            .get_or_init(|| {
                info!("initializing task manager");
                TaskManager::open(&data_dir)
            })
            .map_err(|cause| unavailable(ManagerId::Tasks, cause))
    }

    /// The alarm manager.
    pub fn alarms(&self) -> Access<AlarmManager> {
        let data_dir = self.config.data_dir.clone();
        self.alarms
            .get_or_init(|| {
                info!("initializing alarm manager");
                AlarmManager::open(&data_dir)
            })
            .map_err(|cause| unavailable(ManagerId::Alarms, cause))
    }

    /// The timer manager.
    pub fn timers(&self) -> Access<TimerManager> {
        self.timers
            .get_or_init(|| {
                info!("initializing timer manager");
                Ok(TimerManager::new())
            })
            .map_err(|cause| unavailable(ManagerId::Timers, cause))
    }

    /// The calendar manager.
    pub fn calendar(&self) -> Access<CalendarManager> {
        let data_dir = self.config.data_dir.clone();
        self.calendar
            .get_or_init(|| {
                info!("initializing calendar manager");
                CalendarManager::open(&data_dir)
            })
            .map_err(|cause| unavailable(ManagerId::Calendar, cause))
    }

    /// The weather manager.
    pub fn weather(&self) -> Access<WeatherManager> {
        let config = self.config.weather.clone();
        self.weather
            .get_or_init(|| {
                info!("initializing weather manager");
                WeatherManager::new(&config)
            })
            .map_err(|cause| unavailable(ManagerId::Weather, cause))
    }

    /// The news manager.
    pub fn news(&self) -> Access<NewsManager> {
        let search_config = self.config.search.clone();
        let news_config = self.config.news.clone();
        let llm = self.llm.clone();
        self.news
            .get_or_init(|| {
                info!("initializing news manager");
                let search = SearchClient::new(&search_config)?;
                Ok(NewsManager::new(search, llm, &news_config))
            })
            .map_err(|cause| unavailable(ManagerId::News, cause))
    }

    /// Lifecycle view of one manager without forcing initialization.
    pub fn handle(&self, id: ManagerId) -> ManagerHandle {
        let (state, last_error) = match id {
            ManagerId::Tasks => self.tasks.lifecycle(),
            ManagerId::Alarms => self.alarms.lifecycle(),
            ManagerId::Timers => self.timers.lifecycle(),
            ManagerId::Calendar => self.calendar.lifecycle(),
            ManagerId::Weather => self.weather.lifecycle(),
            ManagerId::News => self.news.lifecycle(),
        };
        ManagerHandle {
            id,
            state,
            last_error,
        }
    }

    /// Explicitly reset a failed (or loaded) manager back to Unloaded so
    /// the next access retries initialization.
    pub fn reload(&self, id: ManagerId) {
        warn!("reloading manager: {id}");
        match id {
            ManagerId::Tasks => self.tasks.reset(),
            ManagerId::Alarms => self.alarms.reset(),
            ManagerId::Timers => self.timers.reset(),
            ManagerId::Calendar => self.calendar.reset(),
            ManagerId::Weather => self.weather.reset(),
            ManagerId::News => self.news.reset(),
        }
    }

    /// Aggregate read across all managers.
    ///
    /// Every manager is visited independently: a failed or erroring
    /// manager contributes an unavailable section and never hides a
    /// sibling's data.
    pub async fn snapshot(&self) -> SystemSnapshot {
        let timers = match self.timers() {
            Ok(m) => Section::Ready(m.active()),
            Err(u) => Section::Unavailable { cause: u.cause },
        };
        let alarms = match self.alarms() {
            Ok(m) => Section::from_result(m.list(true)),
            Err(u) => Section::Unavailable { cause: u.cause },
        };
        let calendar_today = match self.calendar() {
            Ok(m) => Section::from_result(m.events_on(chrono::Local::now().date_naive())),
            Err(u) => Section::Unavailable { cause: u.cause },
        };
        let tasks = match self.tasks() {
            Ok(m) => Section::from_result(m.list(false)),
            Err(u) => Section::Unavailable { cause: u.cause },
        };
        let weather = match self.weather() {
            Ok(m) => Section::from_result(m.fetch().await),
            Err(u) => Section::Unavailable { cause: u.cause },
        };
        let news = match self.news() {
            // The aggregate uses raw headlines; curation is for direct reads.
            Ok(m) => Section::from_result(m.fetch(None, false).await),
            Err(u) => Section::Unavailable { cause: u.cause },
        };

        SystemSnapshot {
            captured_at: chrono::Local::now(),
            timers,
            alarms,
            calendar_today,
            tasks,
            weather,
            news,
        }
    }
}

fn unavailable(manager: ManagerId, cause: String) -> Unavailable {
    Unavailable { manager, cause }
}
