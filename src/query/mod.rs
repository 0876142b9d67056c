//! Two-phase batched query execution.
//!
//! Discovery collects every matching identifier up front, then replay fetches
//! and processes the items one at a time with batch throttling. Collecting
//! first keeps paging stable while processing mutates the result set.

mod executor;

pub use executor::{
    BatchedQueryExecutor, DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_DISCOVERY_PAGE_SIZE,
    ExecutionReport, ExecutorError, ItemOutcome,
};
