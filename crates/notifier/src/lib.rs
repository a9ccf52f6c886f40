//! Delivery side of Rollcall: transports per channel and the worker pool
//! that drains the attempt store through them.

pub mod channels;
pub mod error;
pub mod pool;
pub mod transport;
pub mod worker;
