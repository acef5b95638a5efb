//! To-do task manager backed by a per-domain SQLite store.

use crate::error::{AssistantError, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Database filename within the data directory.
const DB_FILENAME: &str = "tasks.db";

/// A single to-do item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// UUIDv4; never reused within a store's lifetime.
    pub id: String,
    pub text: String,
    pub done: bool,
    pub created_at: DateTime<Utc>,
}

/// Manages tasks in `{data_dir}/tasks.db`.
///
/// Thread-safe via an internal `Mutex<Connection>`; every mutation is
/// committed before the call returns.
#[derive(Debug)]
pub struct TaskManager {
    conn: Mutex<Connection>,
}

impl TaskManager {
    /// Open (or create) the task store.
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
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                done INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
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

    /// Add a new task.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add(&self, text: &str) -> Result<Task> {
        let task = Task {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_owned(),
            done: false,
            created_at: Utc::now(),
        };
        self.lock()
            .execute(
                "INSERT INTO tasks (id, text, done, created_at) VALUES (?1, ?2, 0, ?3)",
                params![task.id, task.text, task.created_at.timestamp()],
            )
            .map_err(|e| AssistantError::Store(e.to_string()))?;
        Ok(task)
    }

    /// All tasks in creation order, optionally only the pending ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self, pending_only: bool) -> Result<Vec<Task>> {
        let conn = self.lock();
        let sql = if pending_only {
            "SELECT id, text, done, created_at FROM tasks WHERE done = 0 ORDER BY created_at ASC"
        } else {
            "SELECT id, text, done, created_at FROM tasks ORDER BY created_at ASC"
        };
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| AssistantError::Store(e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_task)
            .map_err(|e| AssistantError::Store(e.to_string()))?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row.map_err(|e| AssistantError::Store(e.to_string()))?);
        }
        Ok(tasks)
    }

    /// Set a task's completion flag. Returns `false` when no task has
    /// the given id.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn set_done(&self, id: &str, done: bool) -> Result<bool> {
        let changed = self
            .lock()
            .execute(
                "UPDATE tasks SET done = ?1 WHERE id = ?2",
                params![i32::from(done), id],
            )
            .map_err(|e| AssistantError::Store(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Mark the first pending task whose text contains `needle`
    /// (case-insensitive) as done.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn complete_matching(&self, needle: &str) -> Result<Option<Task>> {
        let needle = needle.to_lowercase();
        let candidate = self
            .list(true)?
            .into_iter()
            .find(|t| t.text.to_lowercase().contains(&needle));
        let Some(mut task) = candidate else {
            return Ok(None);
        };
        self.set_done(&task.id, true)?;
        task.done = true;
        Ok(Some(task))
    }

    /// Replace a task's text. Returns `false` when not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn rename(&self, id: &str, text: &str) -> Result<bool> {
        let changed = self
            .lock()
            .execute("UPDATE tasks SET text = ?1 WHERE id = ?2", params![text, id])
            .map_err(|e| AssistantError::Store(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Delete a task. Returns `false` when not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let changed = self
            .lock()
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .map_err(|e| AssistantError::Store(e.to_string()))?;
        Ok(changed > 0)
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let epoch: i64 = row.get(3)?;
    Ok(Task {
        id: row.get(0)?,
        text: row.get(1)?,
        done: row.get::<_, i64>(2)? != 0,
        created_at: Utc
            .timestamp_opt(epoch, 0)
            .single()
            .unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_manager() -> (TaskManager, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "tsuzi-tasks-{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ));
        (TaskManager::open(&dir).unwrap(), dir)
    }

    #[test]
    fn add_list_complete_delete() {
        let (manager, dir) = temp_manager();

        let a = manager.add("buy groceries").unwrap();
        let b = manager.add("call mom").unwrap();
        assert_ne!(a.id, b.id);

        assert_eq!(manager.list(false).unwrap().len(), 2);

        assert!(manager.set_done(&a.id, true).unwrap());
        let pending = manager.list(true).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].text, "call mom");

        assert!(manager.delete(&b.id).unwrap());
        assert!(!manager.delete(&b.id).unwrap());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn complete_matching_is_case_insensitive() {
        let (manager, dir) = temp_manager();
        manager.add("Finish the quarterly Report").unwrap();
        let done = manager.complete_matching("report").unwrap().unwrap();
        assert!(done.done);
        assert!(manager.list(true).unwrap().is_empty());
        assert!(manager.complete_matching("nothing").unwrap().is_none());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn data_survives_reopen() {
        let (manager, dir) = temp_manager();
        manager.add("persist me").unwrap();
        drop(manager);

        let reopened = TaskManager::open(&dir).unwrap();
        let tasks = reopened.list(false).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].text, "persist me");
        let _ = std::fs::remove_dir_all(dir);
    }
}
