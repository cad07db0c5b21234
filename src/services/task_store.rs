//! SQLite persistence for screening jobs and their result rows.
//!
//! Every method is independently atomic; callers never rely on
//! transactions spanning more than one call.

use crate::types::{Job, JobParams, JobStatus, Signal, TaskStats};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";

const JOB_COLUMNS: &str = "task_id, status, lookback_days, batch_size, max_instruments,
    universe_filter, scan_entire_universe, total_instruments, processed_count, found_count,
    current_batch, total_batches, created_at, started_at, ended_at, error_message";

/// SQLite store for job metadata and results.
pub struct TaskStore {
    conn: Mutex<Connection>,
}

impl TaskStore {
    /// Open (or create) a store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("Task store initialized");
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory task store initialized");
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                lookback_days INTEGER NOT NULL,
                batch_size INTEGER NOT NULL,
                max_instruments INTEGER NOT NULL,
                universe_filter TEXT,
                scan_entire_universe INTEGER NOT NULL DEFAULT 0,
                total_instruments INTEGER NOT NULL DEFAULT 0,
                processed_count INTEGER NOT NULL DEFAULT 0,
                found_count INTEGER NOT NULL DEFAULT 0,
                current_batch INTEGER NOT NULL DEFAULT 0,
                total_batches INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                ended_at INTEGER,
                error_message TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS task_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                instrument_code TEXT NOT NULL,
                name TEXT NOT NULL,
                industry TEXT NOT NULL DEFAULT '',
                start_date TEXT NOT NULL,
                start_price REAL NOT NULL,
                current_price REAL NOT NULL,
                run_length INTEGER NOT NULL,
                drop_ratio REAL NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_task_results_task ON task_results(task_id)",
            [],
        )?;

        Ok(())
    }

    // ========== Job Methods ==========

    /// Insert a new job in `running` state.
    pub fn create_job(&self, job_id: &str, job_params: &JobParams) -> Result<(), rusqlite::Error> {
        let conn = self.conn();
        let now = chrono::Utc::now().timestamp_millis();

        conn.execute(
            "INSERT INTO tasks
             (task_id, status, lookback_days, batch_size, max_instruments, universe_filter,
              scan_entire_universe, created_at, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                job_id,
                JobStatus::Running.as_str(),
                job_params.lookback_days,
                job_params.batch_size as i64,
                job_params.max_instruments as i64,
                job_params.universe_filter,
                job_params.scan_entire_universe,
                now,
            ],
        )?;

        debug!("Created job {}", job_id);
        Ok(())
    }

    /// Record the universe size once it is known.
    pub fn record_universe(
        &self,
        job_id: &str,
        total_instruments: usize,
        total_batches: usize,
    ) -> Result<(), rusqlite::Error> {
        self.conn().execute(
            "UPDATE tasks SET total_instruments = ?1, total_batches = ?2 WHERE task_id = ?3",
            params![total_instruments as i64, total_batches as i64, job_id],
        )?;
        Ok(())
    }

    /// Record the batch currently being scanned (1-based).
    pub fn record_batch(&self, job_id: &str, current_batch: usize) -> Result<(), rusqlite::Error> {
        self.conn().execute(
            "UPDATE tasks SET current_batch = ?1 WHERE task_id = ?2",
            params![current_batch as i64, job_id],
        )?;
        Ok(())
    }

    /// Checkpoint counters, optionally changing the status.
    pub fn update_progress(
        &self,
        job_id: &str,
        processed: usize,
        found: usize,
        status: Option<JobStatus>,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn();

        match status {
            Some(status) => conn.execute(
                "UPDATE tasks SET processed_count = ?1, found_count = ?2, status = ?3
                 WHERE task_id = ?4",
                params![processed as i64, found as i64, status.as_str(), job_id],
            )?,
            None => conn.execute(
                "UPDATE tasks SET processed_count = ?1, found_count = ?2 WHERE task_id = ?3",
                params![processed as i64, found as i64, job_id],
            )?,
        };

        Ok(())
    }

    /// Change the status of a live job without touching its counters.
    pub fn update_status(&self, job_id: &str, status: JobStatus) -> Result<(), rusqlite::Error> {
        self.conn().execute(
            "UPDATE tasks SET status = ?1 WHERE task_id = ?2",
            params![status.as_str(), job_id],
        )?;
        Ok(())
    }

    /// Move a job to a final status and stamp its end time.
    pub fn complete_job(
        &self,
        job_id: &str,
        status: JobStatus,
        found_count: Option<usize>,
        error_message: Option<&str>,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn();
        let now = chrono::Utc::now().timestamp_millis();

        match found_count {
            Some(found) => conn.execute(
                "UPDATE tasks SET status = ?1, ended_at = ?2, found_count = ?3, error_message = ?4
                 WHERE task_id = ?5",
                params![status.as_str(), now, found as i64, error_message, job_id],
            )?,
            None => conn.execute(
                "UPDATE tasks SET status = ?1, ended_at = ?2, error_message = ?3
                 WHERE task_id = ?4",
                params![status.as_str(), now, error_message, job_id],
            )?,
        };

        info!("Job {} finished as {}", job_id, status);
        Ok(())
    }

    /// Mark jobs left running/paused by a previous process as failed.
    pub fn fail_interrupted_jobs(&self) -> Result<usize, rusqlite::Error> {
        let now = chrono::Utc::now().timestamp_millis();
        let count = self.conn().execute(
            "UPDATE tasks SET status = ?1, ended_at = ?2, error_message = 'interrupted by restart'
             WHERE status IN (?3, ?4)",
            params![
                JobStatus::Failed.as_str(),
                now,
                JobStatus::Running.as_str(),
                JobStatus::Paused.as_str(),
            ],
        )?;

        if count > 0 {
            warn!("Marked {} interrupted jobs as failed", count);
        }
        Ok(count)
    }

    /// List jobs, newest first.
    pub fn list_jobs(&self, limit: usize, offset: usize) -> Vec<Job> {
        let conn = self.conn();
        let query = format!(
            "SELECT {} FROM tasks ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
            JOB_COLUMNS
        );

        let mut stmt = match conn.prepare(&query) {
            Ok(stmt) => stmt,
            Err(e) => {
                error!("Error preparing job list query: {}", e);
                return Vec::new();
            }
        };

        let jobs = stmt
            .query_map(params![limit as i64, offset as i64], job_from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default();

        jobs
    }

    /// Get a single job.
    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        let conn = self.conn();
        let query = format!("SELECT {} FROM tasks WHERE task_id = ?1", JOB_COLUMNS);

        match conn.query_row(&query, params![job_id], job_from_row).optional() {
            Ok(job) => job,
            Err(e) => {
                error!("Error fetching job {}: {}", job_id, e);
                None
            }
        }
    }

    /// Delete a job and its results. Returns whether the job existed.
    pub fn delete_job(&self, job_id: &str) -> Result<bool, rusqlite::Error> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM task_results WHERE task_id = ?1", params![job_id])?;
        let deleted = tx.execute("DELETE FROM tasks WHERE task_id = ?1", params![job_id])?;
        tx.commit()?;

        Ok(deleted > 0)
    }

    /// Aggregate counts by status.
    pub fn get_stats(&self) -> TaskStats {
        let conn = self.conn();

        let result = conn.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'running' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'paused' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'cancelled' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(found_count), 0)
             FROM tasks",
            [],
            |row| {
                Ok(TaskStats {
                    total_tasks: row.get(0)?,
                    running_tasks: row.get(1)?,
                    paused_tasks: row.get(2)?,
                    completed_tasks: row.get(3)?,
                    cancelled_tasks: row.get(4)?,
                    failed_tasks: row.get(5)?,
                    total_found: row.get(6)?,
                })
            },
        );

        result.unwrap_or_else(|e| {
            error!("Error computing task stats: {}", e);
            TaskStats::default()
        })
    }

    // ========== Result Methods ==========

    /// Replace all result rows of a job.
    pub fn save_results(&self, job_id: &str, signals: &[Signal]) -> Result<(), rusqlite::Error> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM task_results WHERE task_id = ?1", params![job_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO task_results
                 (task_id, instrument_code, name, industry, start_date, start_price,
                  current_price, run_length, drop_ratio)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for signal in signals {
                stmt.execute(params![
                    job_id,
                    signal.instrument_code,
                    signal.name,
                    signal.industry,
                    signal.start_date.format(DATE_FORMAT).to_string(),
                    signal.start_price,
                    signal.current_price,
                    signal.run_length as i64,
                    signal.drop_ratio,
                ])?;
            }
        }
        tx.commit()?;

        debug!("Saved {} results for job {}", signals.len(), job_id);
        Ok(())
    }

    /// Results of a job, deepest retracement first.
    pub fn get_results(&self, job_id: &str) -> Vec<Signal> {
        let conn = self.conn();

        let mut stmt = match conn.prepare(
            "SELECT instrument_code, name, industry, start_date, start_price, current_price,
                    run_length, drop_ratio
             FROM task_results
             WHERE task_id = ?1
             ORDER BY drop_ratio DESC, id ASC",
        ) {
            Ok(stmt) => stmt,
            Err(e) => {
                error!("Error preparing results query: {}", e);
                return Vec::new();
            }
        };

        let results = stmt
            .query_map(params![job_id], |row| {
                let start_date: String = row.get(3)?;
                Ok(Signal {
                    instrument_code: row.get(0)?,
                    name: row.get(1)?,
                    industry: row.get(2)?,
                    start_date: NaiveDate::parse_from_str(&start_date, DATE_FORMAT).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
                    })?,
                    start_price: row.get(4)?,
                    current_price: row.get(5)?,
                    run_length: row.get::<_, i64>(6)? as usize,
                    drop_ratio: row.get(7)?,
                })
            })
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default();

        results
    }
}

fn job_from_row(row: &Row<'_>) -> Result<Job, rusqlite::Error> {
    let status: String = row.get(1)?;
    Ok(Job {
        job_id: row.get(0)?,
        status: JobStatus::from_str(&status).unwrap_or(JobStatus::Failed),
        lookback_days: row.get(2)?,
        batch_size: row.get::<_, i64>(3)? as usize,
        max_instruments: row.get::<_, i64>(4)? as usize,
        universe_filter: row.get(5)?,
        scan_entire_universe: row.get(6)?,
        total_instruments: row.get::<_, i64>(7)? as usize,
        processed_count: row.get::<_, i64>(8)? as usize,
        found_count: row.get::<_, i64>(9)? as usize,
        current_batch: row.get::<_, i64>(10)? as usize,
        total_batches: row.get::<_, i64>(11)? as usize,
        created_at: row.get(12)?,
        started_at: row.get(13)?,
        ended_at: row.get(14)?,
        error: row.get(15)?,
    })
}
