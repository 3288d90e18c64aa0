//! Periodic collection of drained buses.
//!
//! Fired rules delete themselves, so a bus can drain to empty without any
//! placement touching it afterwards. The sweep reconciles the pool on a
//! timer and deletes those buses.

mod worker;

pub use worker::{SweepWorker, SweepWorkerConfig};
