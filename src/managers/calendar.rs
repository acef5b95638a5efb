//! Calendar manager backed by a per-domain SQLite store.

use crate::error::{AssistantError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Database filename within the data directory.
const DB_FILENAME: &str = "calendar.db";

/// Stored timestamp format.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single calendar event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    /// UUIDv4; never reused within a store's lifetime.
    pub id: String,
    pub title: String,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub notes: String,
}

/// Manages calendar events in `{data_dir}/calendar.db`.
pub struct CalendarManager {
    conn: Mutex<Connection>,
}

impl CalendarManager {
    /// Open (or create) the calendar store.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the
    /// database cannot be opened.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let conn = Connection::open(data_dir.join(DB_FILENAME))
            .map_err(|e| AssistantError::Store(e.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT,
                notes TEXT NOT NULL DEFAULT ''
            )",
            [],
        )
        .map_err(|e| AssistantError::Store(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a new event.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add(
        &self,
        title: &str,
        start_time: NaiveDateTime,
        end_time: Option<NaiveDateTime>,
        notes: &str,
    ) -> Result<CalendarEvent> {
        let event = CalendarEvent {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_owned(),
            start_time,
            end_time,
            notes: notes.to_owned(),
        };
        self.lock()
            .execute(
                "INSERT INTO events (id, title, start_time, end_time, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.id,
                    event.title,
                    event.start_time.format(TIME_FORMAT).to_string(),
                    event.end_time.map(|t| t.format(TIME_FORMAT).to_string()),
                    event.notes,
                ],
            )
            .map_err(|e| AssistantError::Store(e.to_string()))?;
        Ok(event)
    }

    /// Events starting on the given date, in start order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn events_on(&self, date: NaiveDate) -> Result<Vec<CalendarEvent>> {
        let start = format!("{date} 00:00:00");
        let end = format!("{date} 23:59:59");
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, title, start_time, end_time, notes FROM events
                 WHERE start_time BETWEEN ?1 AND ?2 ORDER BY start_time ASC",
            )
            .map_err(|e| AssistantError::Store(e.to_string()))?;
        let rows = stmt
            .query_map(params![start, end], row_to_event)
            .map_err(|e| AssistantError::Store(e.to_string()))?;

        collect_events(rows)
    }

    /// The next `limit` events starting at or after `from`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn upcoming(&self, from: NaiveDateTime, limit: usize) -> Result<Vec<CalendarEvent>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, title, start_time, end_time, notes FROM events
                 WHERE start_time >= ?1 ORDER BY start_time ASC LIMIT ?2",
            )
            .map_err(|e| AssistantError::Store(e.to_string()))?;
        let rows = stmt
            .query_map(
                params![from.format(TIME_FORMAT).to_string(), limit as i64],
                row_to_event,
            )
            .map_err(|e| AssistantError::Store(e.to_string()))?;

        collect_events(rows)
    }

    /// Move an event. Returns `false` when not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn reschedule(
        &self,
        id: &str,
        start_time: NaiveDateTime,
        end_time: Option<NaiveDateTime>,
    ) -> Result<bool> {
        let changed = self
            .lock()
            .execute(
                "UPDATE events SET start_time = ?1, end_time = ?2 WHERE id = ?3",
                params![
                    start_time.format(TIME_FORMAT).to_string(),
                    end_time.map(|t| t.format(TIME_FORMAT).to_string()),
                    id
                ],
            )
            .map_err(|e| AssistantError::Store(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Delete an event. Returns `false` when not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let changed = self
            .lock()
            .execute("DELETE FROM events WHERE id = ?1", params![id])
            .map_err(|e| AssistantError::Store(e.to_string()))?;
        Ok(changed > 0)
    }
}

fn collect_events(
    rows: impl Iterator<Item = rusqlite::Result<CalendarEvent>>,
) -> Result<Vec<CalendarEvent>> {
    let mut events = Vec::new();
    for row in rows {
        events.push(row.map_err(|e| AssistantError::Store(e.to_string()))?);
    }
    Ok(events)
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<CalendarEvent> {
    let start_raw: String = row.get(2)?;
    let end_raw: Option<String> = row.get(3)?;
    let parse = |s: &str| NaiveDateTime::parse_from_str(s, TIME_FORMAT);
    let start_time = parse(&start_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(CalendarEvent {
        id: row.get(0)?,
        title: row.get(1)?,
        start_time,
        end_time: end_raw.as_deref().and_then(|s| parse(s).ok()),
        notes: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_manager() -> (CalendarManager, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "tsuzi-calendar-{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ));
        (CalendarManager::open(&dir).unwrap(), dir)
    }

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn events_on_filters_by_day() {
        let (manager, dir) = temp_manager();
        manager
            .add("standup", at("2026-08-07", "09:00:00"), None, "")
            .unwrap();
        manager
            .add("dentist", at("2026-08-08", "14:00:00"), None, "bring card")
            .unwrap();

        let today = manager
            .events_on(NaiveDate::from_ymd_opt(2026, 8, 7).unwrap())
            .unwrap();
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].title, "standup");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn upcoming_orders_and_limits() {
        let (manager, dir) = temp_manager();
        manager
            .add("later", at("2026-08-09", "10:00:00"), None, "")
            .unwrap();
        manager
            .add("sooner", at("2026-08-08", "10:00:00"), None, "")
            .unwrap();
        manager
            .add("past", at("2026-08-01", "10:00:00"), None, "")
            .unwrap();

        let upcoming = manager.upcoming(at("2026-08-07", "00:00:00"), 5).unwrap();
        assert_eq!(upcoming.len(), 2);
        assert_eq!(upcoming[0].title, "sooner");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn reschedule_and_delete() {
        let (manager, dir) = temp_manager();
        let event = manager
            .add("movable", at("2026-08-07", "09:00:00"), None, "")
            .unwrap();
        assert!(manager
            .reschedule(&event.id, at("2026-08-07", "15:00:00"), None)
            .unwrap());
        let moved = manager
            .events_on(NaiveDate::from_ymd_opt(2026, 8, 7).unwrap())
            .unwrap();
        assert_eq!(moved[0].start_time, at("2026-08-07", "15:00:00"));
        assert!(manager.delete(&event.id).unwrap());
        assert!(!manager.delete(&event.id).unwrap());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn data_survives_reopen() {
        let (manager, dir) = temp_manager();
        manager
            .add("persist", at("2026-08-07", "09:00:00"), None, "notes")
            .unwrap();
        drop(manager);
        let reopened = CalendarManager::open(&dir).unwrap();
        let events = reopened
            .events_on(NaiveDate::from_ymd_opt(2026, 8, 7).unwrap())
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].notes, "notes");
        let _ = std::fs::remove_dir_all(dir);
    }
}
