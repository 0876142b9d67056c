//! Scheduled cleaning jobs.
//!
//! Each job reads its settings from a flat attribute map, logs into a fresh
//! session and runs one cleaning service over the whole store:
//!
//! - **Revisions**: prunes stale revisions of everything below `cleanup.path`
//!   using the retention policies found in the same attributes.
//! - **Deleted items**: purges attic items past `minimum.minutes.to.live`.
//! - **Unpublished items**: deletes never-published documents whose
//!   depublication date is past `minimum.minutes.to.live`.
//!
//! Jobs follow a consistent pattern:
//! 1. Configuration in `[jobs.<name>]` (see `config/jobs.rs`)
//! 2. Worker function that runs in a loop with the configured interval
//! 3. Run function that performs a single pass
//! 4. Structured result type for tracking state
//!
//! # Example
//!
//! ```toml
//! [jobs.unpublished]
//! enabled = true
//! interval_secs = 3600
//!
//! [jobs.unpublished.attributes]
//! "minimum.minutes.to.live" = 10080
//! "depublication.date.property.name" = "ns:offlineDate"
//! ```

mod cleaning;

pub use cleaning::{CleaningJob, JobError, JobRunResult, run_job, start_cleaning_worker};
