//! Revision history cleaner for hierarchical content stores.
//!
//! Keeps the revision history of versioned content bounded:
//!
//! - [`retention`] decides which revisions of one item a [`policy`] no
//!   longer keeps.
//! - [`tasks`] apply that decision (or a full truncation, or a workflow
//!   delete) to a single item.
//! - [`services`] run a task over every item a query selects, in throttled
//!   batches driven by [`query::BatchedQueryExecutor`].
//! - [`jobs`] schedule the three store-wide passes; [`lifecycle`] reacts to
//!   publish and delete events from the [`events`] bus.

pub mod config;
pub mod events;
pub mod jobs;
pub mod lifecycle;
pub mod observability;
pub mod policy;
pub mod query;
pub mod retention;
pub mod services;
pub mod store;
pub mod tasks;
