//! Rollcall HTTP API: job submission, tracking and roster import over the
//! delivery engine.

pub mod routes;
pub mod state;
