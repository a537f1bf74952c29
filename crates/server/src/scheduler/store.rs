//! Persistent task store (SQLite): `tasks` plus their `task_runs` history.
//!
//! Invariant maintained on every write: `next_run` is non-null exactly
//! when the task has a schedule and is active.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::cron::{cron_next, parse_cron, parse_zone};
use llamar_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Paused,
    Completed,
}

impl TaskStatus {
    fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "paused" => TaskStatus::Paused,
            "completed" => TaskStatus::Completed,
            _ => TaskStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Five-field cron or `@shortcut`; `None` = run only on demand.
    pub schedule: Option<String>,
    /// Optional IANA timezone; `None` = local time.
    pub timezone: Option<String>,
    pub prompt: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub last_result: Option<String>,
    pub last_error: Option<String>,
    /// `console`, `file:<path>`, or a named external channel.
    pub notification_sink: String,
}

/// One row of a task's run history.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRun {
    pub id: i64,
    pub task_id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: String,
    pub result: Option<String>,
    pub error: Option<String>,
    pub tokens_used: u64,
}

/// Fields accepted when creating a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub description: String,
    pub schedule: Option<String>,
    pub timezone: Option<String>,
    pub prompt: String,
    pub notification_sink: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    schedule TEXT,
    timezone TEXT,
    prompt TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    last_run INTEGER,
    next_run INTEGER,
    run_count INTEGER NOT NULL DEFAULT 0,
    last_result TEXT,
    last_error TEXT,
    notification_sink TEXT NOT NULL DEFAULT 'console'
);

CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(status, next_run);

CREATE TABLE IF NOT EXISTS task_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL REFERENCES tasks(id),
    started_at INTEGER NOT NULL,
    finished_at INTEGER,
    status TEXT NOT NULL,
    result TEXT,
    error TEXT,
    tokens_used INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_task_runs_task ON task_runs(task_id);
";

pub struct TaskStore {
    conn: Mutex<Connection>,
}

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
}

impl TaskStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::Store(format!("open task store: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Store(format!("task store schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Store(format!("open task store: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Store(format!("task store schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a task. The schedule is validated and `next_run` computed
    /// immediately (active tasks with a schedule always have one).
    pub fn create(&self, new: NewTask) -> Result<Task> {
        if let Some(expr) = &new.schedule {
            parse_cron(expr).map_err(Error::Other)?;
        }
        let now = Utc::now();
        let next_run = new
            .schedule
            .as_deref()
            .and_then(|expr| cron_next(expr, &now, parse_zone(new.timezone.as_deref())));

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tasks \
             (name, description, schedule, timezone, prompt, status, created_at, \
              updated_at, next_run, notification_sink) \
             VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?6, ?7, ?8)",
            params![
                new.name,
                new.description,
                new.schedule,
                new.timezone,
                new.prompt,
                ts(now),
                next_run.map(ts),
                new.notification_sink,
            ],
        )
        .map_err(|e| Error::Store(format!("insert task: {e}")))?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.get(id)?
            .ok_or_else(|| Error::Store("task vanished after insert".into()))
    }

    pub fn get(&self, id: i64) -> Result<Option<Task>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, description, schedule, timezone, prompt, status, \
                    created_at, updated_at, last_run, next_run, run_count, \
                    last_result, last_error, notification_sink \
             FROM tasks WHERE id = ?1",
            params![id],
            row_to_task,
        )
        .optional()
        .map_err(|e| Error::Store(format!("get task: {e}")))
    }

    pub fn list(&self) -> Result<Vec<Task>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, description, schedule, timezone, prompt, status, \
                        created_at, updated_at, last_run, next_run, run_count, \
                        last_result, last_error, notification_sink \
                 FROM tasks ORDER BY id",
            )
            .map_err(|e| Error::Store(format!("list tasks: {e}")))?;
        let rows = stmt
            .query_map([], row_to_task)
            .map_err(|e| Error::Store(format!("list tasks: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Store(format!("list tasks: {e}")))
    }

    /// Active tasks whose `next_run` is at or before `now`, ascending.
    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, description, schedule, timezone, prompt, status, \
                        created_at, updated_at, last_run, next_run, run_count, \
                        last_result, last_error, notification_sink \
                 FROM tasks \
                 WHERE status = 'active' AND next_run IS NOT NULL AND next_run <= ?1 \
                 ORDER BY next_run ASC",
            )
            .map_err(|e| Error::Store(format!("due tasks: {e}")))?;
        let rows = stmt
            .query_map(params![ts(now)], row_to_task)
            .map_err(|e| Error::Store(format!("due tasks: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Store(format!("due tasks: {e}")))
    }

    /// Change status, re-deriving `next_run` to keep the invariant.
    pub fn set_status(&self, id: i64, status: TaskStatus) -> Result<Option<Task>> {
        let task = match self.get(id)? {
            Some(task) => task,
            None => return Ok(None),
        };
        let now = Utc::now();
        let next_run = if status == TaskStatus::Active {
            task.schedule
                .as_deref()
                .and_then(|expr| cron_next(expr, &now, parse_zone(task.timezone.as_deref())))
        } else {
            None
        };

        let conn = self.conn.lock();
        conn.execute(
            "UPDATE tasks SET status = ?1, next_run = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.as_str(), next_run.map(ts), ts(now), id],
        )
        .map_err(|e| Error::Store(format!("set status: {e}")))?;
        drop(conn);
        self.get(id)
    }

    /// Record one completed run: append history, update `last_run`,
    /// advance `next_run`, bump `run_count`.
    pub fn record_run(
        &self,
        id: i64,
        started_at: DateTime<Utc>,
        success: bool,
        result: Option<&str>,
        error: Option<&str>,
        tokens_used: u64,
    ) -> Result<()> {
        let task = self
            .get(id)?
            .ok_or_else(|| Error::Store(format!("unknown task {id}")))?;
        let now = Utc::now();
        let next_run = if task.status == TaskStatus::Active {
            task.schedule
                .as_deref()
                .and_then(|expr| cron_next(expr, &now, parse_zone(task.timezone.as_deref())))
        } else {
            None
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO task_runs \
             (task_id, started_at, finished_at, status, result, error, tokens_used) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                ts(started_at),
                ts(now),
                if success { "success" } else { "failure" },
                result,
                error,
                tokens_used as i64,
            ],
        )
        .map_err(|e| Error::Store(format!("insert task run: {e}")))?;

        conn.execute(
            "UPDATE tasks SET last_run = ?1, next_run = ?2, run_count = run_count + 1, \
                    last_result = ?3, last_error = ?4, updated_at = ?1 \
             WHERE id = ?5",
            params![ts(now), next_run.map(ts), result, error, id],
        )
        .map_err(|e| Error::Store(format!("update task after run: {e}")))?;
        Ok(())
    }

    pub fn runs(&self, task_id: i64, limit: usize) -> Result<Vec<TaskRun>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, task_id, started_at, finished_at, status, result, error, tokens_used \
                 FROM task_runs WHERE task_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(|e| Error::Store(format!("task runs: {e}")))?;
        let rows = stmt
            .query_map(params![task_id, limit as i64], |row| {
                Ok(TaskRun {
                    id: row.get(0)?,
                    task_id: row.get(1)?,
                    started_at: from_ts(Some(row.get(2)?)).unwrap_or_else(Utc::now),
                    finished_at: from_ts(row.get(3)?),
                    status: row.get(4)?,
                    result: row.get(5)?,
                    error: row.get(6)?,
                    tokens_used: row.get::<_, i64>(7)? as u64,
                })
            })
            .map_err(|e| Error::Store(format!("task runs: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Store(format!("task runs: {e}")))
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM task_runs WHERE task_id = ?1", params![id])
            .map_err(|e| Error::Store(format!("delete task runs: {e}")))?;
        let removed = conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .map_err(|e| Error::Store(format!("delete task: {e}")))?;
        Ok(removed > 0)
    }
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        schedule: row.get(3)?,
        timezone: row.get(4)?,
        prompt: row.get(5)?,
        status: TaskStatus::from_db(&row.get::<_, String>(6)?),
        created_at: from_ts(Some(row.get(7)?)).unwrap_or_else(Utc::now),
        updated_at: from_ts(Some(row.get(8)?)).unwrap_or_else(Utc::now),
        last_run: from_ts(row.get(9)?),
        next_run: from_ts(row.get(10)?),
        run_count: row.get::<_, i64>(11)? as u64,
        last_result: row.get(12)?,
        last_error: row.get(13)?,
        notification_sink: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task(schedule: Option<&str>) -> NewTask {
        NewTask {
            name: "digest".into(),
            description: "daily digest".into(),
            schedule: schedule.map(str::to_string),
            timezone: Some("UTC".into()),
            prompt: "Summarize the day".into(),
            notification_sink: "console".into(),
        }
    }

    #[test]
    fn create_computes_next_run() {
        let store = TaskStore::open_in_memory().unwrap();
        let task = store.create(new_task(Some("@hourly"))).unwrap();
        assert_eq!(task.status, TaskStatus::Active);
        assert!(task.next_run.is_some());
        assert!(task.next_run.unwrap() > Utc::now());
    }

    #[test]
    fn unscheduled_task_has_no_next_run() {
        let store = TaskStore::open_in_memory().unwrap();
        let task = store.create(new_task(None)).unwrap();
        assert!(task.next_run.is_none());
        assert_eq!(task.status, TaskStatus::Active);
    }

    #[test]
    fn invalid_schedule_is_rejected() {
        let store = TaskStore::open_in_memory().unwrap();
        assert!(store.create(new_task(Some("99 99 * * *"))).is_err());
    }

    #[test]
    fn pause_clears_next_run_and_resume_restores_it() {
        let store = TaskStore::open_in_memory().unwrap();
        let task = store.create(new_task(Some("@daily"))).unwrap();

        let paused = store.set_status(task.id, TaskStatus::Paused).unwrap().unwrap();
        assert!(paused.next_run.is_none());

        let resumed = store.set_status(task.id, TaskStatus::Active).unwrap().unwrap();
        assert!(resumed.next_run.is_some());
    }

    #[test]
    fn due_returns_only_ripe_active_tasks() {
        let store = TaskStore::open_in_memory().unwrap();
        let ripe = store.create(new_task(Some("* * * * *"))).unwrap();
        store.create(new_task(None)).unwrap();
        let paused = store.create(new_task(Some("* * * * *"))).unwrap();
        store.set_status(paused.id, TaskStatus::Paused).unwrap();

        // Nothing due right now (next_run is in the future)...
        assert!(store.due(Utc::now()).unwrap().is_empty());
        // ...but everything scheduled becomes due two minutes from now.
        let due = store.due(Utc::now() + chrono::Duration::minutes(2)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, ripe.id);
    }

    #[test]
    fn record_run_updates_history_and_counters() {
        let store = TaskStore::open_in_memory().unwrap();
        let task = store.create(new_task(Some("* * * * *"))).unwrap();
        let first_next = task.next_run.unwrap();

        let started = Utc::now();
        store
            .record_run(task.id, started, true, Some("all good"), None, 321)
            .unwrap();

        let task = store.get(task.id).unwrap().unwrap();
        assert_eq!(task.run_count, 1);
        assert!(task.last_run.is_some());
        assert_eq!(task.last_result.as_deref(), Some("all good"));
        assert!(task.next_run.unwrap() >= first_next);

        let runs = store.runs(task.id, 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, "success");
        assert_eq!(runs[0].tokens_used, 321);
    }

    #[test]
    fn failed_run_records_error() {
        let store = TaskStore::open_in_memory().unwrap();
        let task = store.create(new_task(Some("@hourly"))).unwrap();
        store
            .record_run(task.id, Utc::now(), false, None, Some("LLM unreachable"), 0)
            .unwrap();
        let task = store.get(task.id).unwrap().unwrap();
        assert_eq!(task.last_error.as_deref(), Some("LLM unreachable"));
        let runs = store.runs(task.id, 1).unwrap();
        assert_eq!(runs[0].status, "failure");
    }

    #[test]
    fn delete_removes_task_and_history() {
        let store = TaskStore::open_in_memory().unwrap();
        let task = store.create(new_task(Some("@hourly"))).unwrap();
        store
            .record_run(task.id, Utc::now(), true, Some("x"), None, 0)
            .unwrap();
        assert!(store.delete(task.id).unwrap());
        assert!(store.get(task.id).unwrap().is_none());
        assert!(store.runs(task.id, 10).unwrap().is_empty());
        assert!(!store.delete(task.id).unwrap());
    }
}
