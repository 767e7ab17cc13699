//! Task scheduling for Robofleet.
//!
//! [`LocalScheduler`] runs orchestrator [`Job`](robofleet_orchestrator::Job)s
//! on a tokio runtime: immediately, after a delay, or on a fixed interval.
//! Each job gets its own store connection on the blocking pool, and can queue
//! follow-up jobs through the same scheduler.

pub mod error;
pub mod job;
pub mod local;

pub use error::{Result, SchedulerError};
pub use local::{LocalScheduler, TaskStatus};
pub use robofleet_orchestrator::{Job, TaskHandle, TaskSubmitter};
