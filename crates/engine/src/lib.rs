//! Audience resolution, de-duplication and the delivery job queue.
//!
//! Leaves first:
//! - `directory` / `resolver`: who a broadcast reaches
//! - `dedup`: one recipient per channel address, roster import
//! - `scheduler`: when a job's attempts may be claimed
//! - `store`: live jobs and attempts with atomic claiming
//! - `tracker`: live counts for the console
//! - `journal`: durable copy of jobs and attempts
//! - `jobs`: submission, listing, cancellation

pub mod dedup;
pub mod directory;
pub mod jobs;
pub mod journal;
pub mod resolver;
pub mod scheduler;
pub mod store;
pub mod tracker;
