use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a screening job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// No job exists yet. Only ever reported by progress snapshots.
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl JobStatus {
    /// Parse from the stored string form.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Running or paused: the job holds the single-flight slot.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters accepted when starting a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobParams {
    pub lookback_days: u32,
    pub batch_size: usize,
    /// Cap applied when `scan_entire_universe` is false.
    pub max_instruments: usize,
    /// Optional industry / sector selector.
    pub universe_filter: Option<String>,
    pub scan_entire_universe: bool,
}

/// Durable record of one screening run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    pub lookback_days: u32,
    pub batch_size: usize,
    pub max_instruments: usize,
    pub universe_filter: Option<String>,
    pub scan_entire_universe: bool,
    pub total_instruments: usize,
    pub processed_count: usize,
    pub found_count: usize,
    pub current_batch: usize,
    pub total_batches: usize,
    /// Unix millis.
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub error: Option<String>,
}

/// One maximal run of consecutive limit-up days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitUpRun {
    pub start_date: NaiveDate,
    /// Close on the first day of the run (the breakout price).
    pub start_price: f64,
    pub length: usize,
    pub member_dates: Vec<NaiveDate>,
}

/// A qualifying match for one instrument within one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub instrument_code: String,
    pub name: String,
    pub industry: String,
    pub start_date: NaiveDate,
    pub start_price: f64,
    pub current_price: f64,
    pub run_length: usize,
    /// Retracement below the breakout price, in percent.
    pub drop_ratio: f64,
}

/// Sort signals by retracement depth, deepest first.
pub fn rank_by_drop_ratio(signals: &mut [Signal]) {
    signals.sort_by(|a, b| b.drop_ratio.total_cmp(&a.drop_ratio));
}

/// Point-in-time view of a job's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub job_id: Option<String>,
    pub status: JobStatus,
    pub current: usize,
    pub total: usize,
    pub found: usize,
    pub current_batch: usize,
    pub total_batches: usize,
    pub is_paused: bool,
    /// Human readable status line.
    pub message: String,
    /// Percent complete, one decimal.
    pub progress: f64,
    pub error: Option<String>,
}

impl ProgressSnapshot {
    /// Snapshot reported before any job was started.
    pub fn idle() -> Self {
        Self {
            message: "idle".to_string(),
            ..Default::default()
        }
    }
}

/// Result of a start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "jobId", rename_all = "snake_case")]
pub enum StartOutcome {
    Started(String),
    AlreadyRunning(String),
}

impl StartOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Started(id) | Self::AlreadyRunning(id) => id,
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

/// Aggregate job counts by status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total_tasks: i64,
    pub running_tasks: i64,
    pub paused_tasks: i64,
    pub completed_tasks: i64,
    pub cancelled_tasks: i64,
    pub failed_tasks: i64,
    pub total_found: i64,
}
