//! Alarm manager backed by a per-domain SQLite store.
//!
//! Alarms must survive restart: every mutation is committed before the
//! call returns, and older databases are migrated in place when new
//! columns appear.

use crate::error::{AssistantError, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Database filename within the data directory.
const DB_FILENAME: &str = "alarms.db";

/// A single alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    /// UUIDv4; never reused within a store's lifetime.
    pub id: String,
    /// Trigger time in `HH:MM` form.
    pub time: String,
    pub label: String,
    pub enabled: bool,
    /// Whether the reminder for this alarm has already fired.
    pub notified: bool,
}

/// Manages alarms in `{data_dir}/alarms.db`.
pub struct AlarmManager {
    conn: Mutex<Connection>,
}

impl AlarmManager {
    /// Open (or create) the alarm store and migrate older layouts.
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
            "CREATE TABLE IF NOT EXISTS alarms (
                id TEXT PRIMARY KEY,
                time TEXT NOT NULL,
                label TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                notified INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )
        .map_err(|e| AssistantError::Store(e.to_string()))?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a new alarm. `time` must already be normalized to `HH:MM`.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add(&self, time: &str, label: &str) -> Result<Alarm> {
        let alarm = Alarm {
            id: uuid::Uuid::new_v4().to_string(),
            time: time.to_owned(),
            label: label.to_owned(),
            enabled: true,
            notified: false,
        };
        self.lock()
            .execute(
                "INSERT INTO alarms (id, time, label, enabled, notified) VALUES (?1, ?2, ?3, 1, 0)",
                params![alarm.id, alarm.time, alarm.label],
            )
            .map_err(|e| AssistantError::Store(e.to_string()))?;
        Ok(alarm)
    }

    /// All alarms ordered by trigger time, optionally only enabled ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self, enabled_only: bool) -> Result<Vec<Alarm>> {
        let conn = self.lock();
        let sql = if enabled_only {
            "SELECT id, time, label, enabled, notified FROM alarms WHERE enabled = 1 ORDER BY time ASC"
        } else {
            "SELECT id, time, label, enabled, notified FROM alarms ORDER BY time ASC"
        };
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| AssistantError::Store(e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_alarm)
            .map_err(|e| AssistantError::Store(e.to_string()))?;

        let mut alarms = Vec::new();
        for row in rows {
            alarms.push(row.map_err(|e| AssistantError::Store(e.to_string()))?);
        }
        Ok(alarms)
    }

    /// Enable or disable an alarm. Returns `false` when not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        let changed = self
            .lock()
            .execute(
                "UPDATE alarms SET enabled = ?1 WHERE id = ?2",
                params![i32::from(enabled), id],
            )
            .map_err(|e| AssistantError::Store(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Record that an alarm's reminder has fired. Returns `false` when
    /// not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_notified(&self, id: &str) -> Result<bool> {
        let changed = self
            .lock()
            .execute("UPDATE alarms SET notified = 1 WHERE id = ?1", params![id])
            .map_err(|e| AssistantError::Store(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Delete an alarm. Returns `false` when not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let changed = self
            .lock()
            .execute("DELETE FROM alarms WHERE id = ?1", params![id])
            .map_err(|e| AssistantError::Store(e.to_string()))?;
        Ok(changed > 0)
    }
}

/// Add columns introduced after the first release to databases created
/// before them.
fn migrate(conn: &Connection) -> Result<()> {
    let mut stmt = conn
        .prepare("PRAGMA table_info(alarms)")
        .map_err(|e| AssistantError::Store(e.to_string()))?;
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|e| AssistantError::Store(e.to_string()))?
        .filter_map(std::result::Result::ok)
        .collect();

    if !columns.iter().any(|c| c == "notified") {
        conn.execute(
            "ALTER TABLE alarms ADD COLUMN notified INTEGER NOT NULL DEFAULT 0",
            [],
        )
        .map_err(|e| AssistantError::Store(e.to_string()))?;
    }
    Ok(())
}

fn row_to_alarm(row: &rusqlite::Row<'_>) -> rusqlite::Result<Alarm> {
    Ok(Alarm {
        id: row.get(0)?,
        time: row.get(1)?,
        label: row.get(2)?,
        enabled: row.get::<_, i64>(3)? != 0,
        notified: row.get::<_, i64>(4)? != 0,
    })
}
