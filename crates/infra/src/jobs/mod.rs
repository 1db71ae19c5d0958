//! Background job system with retry, backoff, and dead-letter handling.
//!
//! Jobs are tenant-scoped and typed: SEPA collection retries (the fixed
//! 2h/24h/72h schedule), eBoekhouden migration stages, projection rebuilds.
//! Exhausted jobs land in a dead-letter queue for manual review, which is
//! where a failed debit goes after its third retry.

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{JobExecutor, JobExecutorConfig, JobExecutorHandle};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, JobId, JobKind, JobResult, JobStatus, RetryPolicy,
};
