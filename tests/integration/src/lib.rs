//! Integration tests for the fleet orchestration workspace
//!
//! This test suite validates:
//! - Reconcilers racing on separate connections to one SQLite file
//! - Scheduler delays, chaining and periodic passes end to end

pub mod test_utils;

#[cfg(test)]
mod concurrency_tests;

#[cfg(test)]
mod scheduler_flow_tests;
