//! Generation jobs: one unit of scheduled work for one module.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use worldforge_core::error::DomainError;

use super::registry::ModuleKey;

/// Appended to error messages cut at the configured maximum length.
pub const ELLIPSIS: &str = "...";

/// Recorded on jobs reclaimed from a worker that stopped reporting.
pub const STALE_JOB_ERROR: &str = "requeued after worker timeout";

/// Status of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Queued, claimable.
    Waiting,
    /// Claimed by a worker.
    Running,
    /// Generation stored.
    Succeeded,
    /// Generation failed; waits for an explicit retry.
    Failed,
}

impl JobStatus {
    /// Returns the stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }

    /// Whether the job still holds its world in `GENERATING`.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Waiting | Self::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(Self::Waiting),
            "RUNNING" => Ok(Self::Running),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            other => Err(DomainError::Validation(format!("unknown job status: {other}"))),
        }
    }
}

/// Kind of generation work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    /// Generate the final narrative text of a module.
    ModuleFinal,
}

impl JobType {
    /// Returns the stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ModuleFinal => "MODULE_FINAL",
        }
    }
}

impl FromStr for JobType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MODULE_FINAL" => Ok(Self::ModuleFinal),
            other => Err(DomainError::Validation(format!("unknown job type: {other}"))),
        }
    }
}

/// One unit of generation work within a publish round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldGenerationJob {
    /// Job identifier.
    pub id: Uuid,
    /// The world being generated.
    pub world_id: Uuid,
    /// The module this job generates.
    pub module_key: ModuleKey,
    /// Kind of work.
    pub job_type: JobType,
    /// Current status.
    pub status: JobStatus,
    /// Dispatch order within the round, starting at 1.
    pub sequence: i32,
    /// Number of times a worker has started this job.
    pub attempts: i32,
    /// When the current or last attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the last attempt finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Bounded error text of the last failed attempt.
    pub last_error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last write timestamp.
    pub updated_at: DateTime<Utc>,
}

impl WorldGenerationJob {
    /// Creates a fresh queued job.
    #[must_use]
    pub fn waiting(world_id: Uuid, module_key: ModuleKey, sequence: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            world_id,
            module_key,
            job_type: JobType::ModuleFinal,
            status: JobStatus::Waiting,
            sequence,
            attempts: 0,
            started_at: None,
            finished_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the job as claimed by a worker.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.attempts += 1;
        self.started_at = Some(now);
        self.finished_at = None;
        self.last_error = None;
        self.updated_at = now;
    }

    /// Records a successful attempt.
    pub fn succeed(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Succeeded;
        self.finished_at = Some(now);
        self.updated_at = now;
    }

    /// Records a failed attempt with the error cut to `max_error_length`.
    pub fn fail(&mut self, message: &str, max_error_length: usize, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.finished_at = Some(now);
        self.last_error = Some(truncate_error(message, max_error_length));
        self.updated_at = now;
    }

    /// Puts a failed job back in the queue. Attempts are kept.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Conflict` unless the job is `FAILED`.
    pub fn reset_for_retry(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != JobStatus::Failed {
            return Err(DomainError::Conflict(format!(
                "only failed jobs can be retried; job for '{}' is {}",
                self.module_key, self.status
            )));
        }
        self.status = JobStatus::Waiting;
        self.started_at = None;
        self.finished_at = None;
        self.last_error = None;
        self.updated_at = now;
        Ok(())
    }

    /// Puts a job abandoned in `RUNNING` back in the queue.
    pub fn requeue_stale(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Waiting;
        self.started_at = None;
        self.last_error = Some(STALE_JOB_ERROR.to_owned());
        self.updated_at = now;
    }

    /// Diagnostic recorded when the job's world no longer exists.
    #[must_use]
    pub fn orphan_error(&self) -> String {
        format!("world {} not found for job {}", self.world_id, self.id)
    }
}

/// Cuts `message` to at most `max_length` characters, appending
/// [`ELLIPSIS`] when anything was removed.
#[must_use]
pub fn truncate_error(message: &str, max_length: usize) -> String {
    match message.char_indices().nth(max_length) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &message[..cut]),
        None => message.to_owned(),
    }
}
