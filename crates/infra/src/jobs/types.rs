//! Core job types and policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use verenigingen_core::TenantId;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job kind/type for routing to appropriate handlers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Re-collect a failed direct-debit entry.
    BatchRetry { batch_id: String, invoice_id: String },
    /// One stage of an eBoekhouden migration run.
    MigrationStage { migration_id: String, stage: String },
    /// Projection rebuild job.
    ProjectionRebuild { projection_name: String },
    /// Generic/custom job.
    Custom { kind: String },
}

impl JobKind {
    pub fn batch_retry(batch_id: impl Into<String>, invoice_id: impl Into<String>) -> Self {
        Self::BatchRetry {
            batch_id: batch_id.into(),
            invoice_id: invoice_id.into(),
        }
    }

    pub fn migration_stage(migration_id: impl Into<String>, stage: impl Into<String>) -> Self {
        Self::MigrationStage {
            migration_id: migration_id.into(),
            stage: stage.into(),
        }
    }

    pub fn projection_rebuild(projection_name: impl Into<String>) -> Self {
        Self::ProjectionRebuild {
            projection_name: projection_name.into(),
        }
    }

    pub fn custom(kind: impl Into<String>) -> Self {
        Self::Custom { kind: kind.into() }
    }

    /// Routing name used for handler registration.
    pub fn type_name(&self) -> &str {
        match self {
            JobKind::BatchRetry { .. } => "sepa.batch_retry",
            JobKind::MigrationStage { .. } => "boekhouden.migration_stage",
            JobKind::ProjectionRebuild { projection_name } => projection_name,
            JobKind::Custom { kind } => kind,
        }
    }
}

/// Job execution status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be picked up.
    Pending,
    /// Currently being executed.
    Running,
    /// Completed successfully.
    Completed,
    /// Failed, will be retried.
    Failed { error: String, attempt: u32 },
    /// Exhausted retries, moved to the dead-letter queue for manual review.
    DeadLettered { error: String, attempts: u32 },
    /// Cancelled by user/system.
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::DeadLettered { .. } | JobStatus::Cancelled
        )
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, JobStatus::Failed { .. })
    }
}

/// Backoff strategy for retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed,
    /// Exponential backoff: base * 2^attempt.
    #[default]
    Exponential,
    /// Linear backoff: base * attempt.
    Linear,
    /// Explicit per-attempt delays; attempts beyond the list reuse the last
    /// step. Collection retries use this (2h, 24h, 72h).
    Stepped { steps: Vec<Duration> },
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_attempts: u32,
    /// Base delay between retries.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Backoff strategy.
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Create a policy with fixed delays.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Create a policy with exponential backoff.
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Create a policy with an explicit delay schedule (one entry per retry).
    pub fn stepped(steps: Vec<Duration>) -> Self {
        let max_attempts = steps.len() as u32;
        let max_delay = steps.iter().copied().max().unwrap_or(Duration::ZERO);
        Self {
            max_attempts,
            base_delay: steps.first().copied().unwrap_or(Duration::ZERO),
            max_delay,
            strategy: BackoffStrategy::Stepped { steps },
        }
    }

    /// The failed-collection policy: retry after 2 hours, 24 hours and
    /// 72 hours, then hand over to manual review.
    pub fn sepa_collection() -> Self {
        Self::stepped(vec![
            Duration::from_secs(2 * 3600),
            Duration::from_secs(24 * 3600),
            Duration::from_secs(72 * 3600),
        ])
    }

    /// Calculate delay for a given attempt number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        match &self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let exp = 2_f64.powi((attempt - 1) as i32);
                Duration::from_millis((base_ms * exp).min(max_ms) as u64)
            }
            BackoffStrategy::Linear => {
                let linear = base_ms * f64::from(attempt);
                Duration::from_millis(linear.min(max_ms) as u64)
            }
            BackoffStrategy::Stepped { steps } => {
                if steps.is_empty() {
                    return Duration::ZERO;
                }
                let idx = (attempt as usize - 1).min(steps.len() - 1);
                steps[idx]
            }
        }
    }

    /// Check if more retries are allowed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// A background job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID.
    pub id: JobId,
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Job kind for routing.
    pub kind: JobKind,
    /// JSON payload.
    pub payload: serde_json::Value,
    /// Current status.
    pub status: JobStatus,
    /// Retry policy.
    pub retry_policy: RetryPolicy,
    /// Current attempt number (starts at 0).
    pub attempt: u32,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the job should next be executed (for scheduled/delayed jobs).
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Execution history (errors from previous attempts).
    pub history: Vec<JobAttemptRecord>,
}

/// Record of a job execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl Job {
    /// Create a new job.
    pub fn new(tenant_id: TenantId, kind: JobKind, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            tenant_id,
            kind,
            payload,
            status: JobStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            history: Vec::new(),
        }
    }

    /// Set a custom retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Schedule the job for later execution.
    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    /// Schedule the job with a delay from now.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.scheduled_at = Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
        self
    }

    /// Check if the job is ready to execute.
    pub fn is_ready(&self) -> bool {
        match self.scheduled_at {
            Some(at) => Utc::now() >= at,
            None => true,
        }
    }

    /// Mark job as running.
    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.attempt += 1;
        self.updated_at = Utc::now();
    }

    /// Mark job as completed.
    pub fn mark_completed(&mut self, started_at: DateTime<Utc>) {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.updated_at = now;
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            success: true,
            error: None,
            duration_ms: (now - started_at).num_milliseconds().max(0) as u64,
        });
    }

    /// Mark job as failed.
    ///
    /// Schedules the next retry per the policy, or dead-letters when the
    /// attempts are exhausted.
    pub fn mark_failed(&mut self, error: String, started_at: DateTime<Utc>) {
        let now = Utc::now();
        self.updated_at = now;
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            success: false,
            error: Some(error.clone()),
            duration_ms: (now - started_at).num_milliseconds().max(0) as u64,
        });

        if self.retry_policy.should_retry(self.attempt) {
            let delay = self.retry_policy.delay_for_attempt(self.attempt);
            self.scheduled_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
            self.status = JobStatus::Failed {
                error,
                attempt: self.attempt,
            };
        } else {
            self.status = JobStatus::DeadLettered {
                error,
                attempts: self.attempt,
            };
        }
    }

    /// Mark job as cancelled.
    pub fn mark_cancelled(&mut self) {
        self.status = JobStatus::Cancelled;
        self.updated_at = Utc::now();
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed successfully.
    Success,
    /// Job failed with an error.
    Failure(String),
    /// Job should be retried immediately (transient failure).
    RetryNow,
    /// Job should be retried after a delay.
    RetryAfter(Duration),
}

/// Entry in the dead-letter queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: Job,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(job: Job, reason: String) -> Self {
        Self {
            job,
            dead_lettered_at: Utc::now(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sepa_policy_follows_the_fixed_schedule() {
        let policy = RetryPolicy::sepa_collection();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2 * 3600));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(24 * 3600));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(72 * 3600));
        // Past the schedule, the last step repeats.
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(72 * 3600));
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let policy = RetryPolicy::exponential(
            5,
            Duration::from_millis(500),
            Duration::from_secs(3),
        );
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(3));
    }

    #[test]
    fn job_dead_letters_after_exhausting_retries() {
        let mut job = Job::new(
            TenantId::new(),
            JobKind::batch_retry("batch-1", "invoice-1"),
            serde_json::json!({}),
        )
        .with_retry_policy(RetryPolicy::sepa_collection());

        // Two failed attempts stay retriable; the third exhausts the policy.
        for _ in 0..2 {
            job.mark_running();
            job.mark_failed("AC04".to_string(), Utc::now());
            assert!(job.status.is_retriable());
        }

        job.mark_running();
        job.mark_failed("AC04".to_string(), Utc::now());
        assert!(matches!(
            job.status,
            JobStatus::DeadLettered { attempts: 3, .. }
        ));
        assert_eq!(job.history.len(), 3);
    }

    #[test]
    fn failed_job_is_scheduled_for_the_future() {
        let mut job = Job::new(
            TenantId::new(),
            JobKind::batch_retry("batch-1", "invoice-1"),
            serde_json::json!({}),
        )
        .with_retry_policy(RetryPolicy::sepa_collection());

        job.mark_running();
        job.mark_failed("MS03".to_string(), Utc::now());

        assert!(matches!(job.status, JobStatus::Failed { attempt: 1, .. }));
        assert!(!job.is_ready());
        let scheduled = job.scheduled_at.unwrap();
        assert!(scheduled > Utc::now() + chrono::Duration::minutes(110));
    }
}
