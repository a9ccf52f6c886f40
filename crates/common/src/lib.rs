//! Types, errors and configuration shared by every Rollcall crate.

pub mod config;
pub mod db;
pub mod error;
pub mod types;
