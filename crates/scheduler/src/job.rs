//! Job execution
//!
//! Runs on a blocking worker thread. Every job opens its own store
//! connection, so concurrent jobs never share a transaction.

use robofleet_core::FleetConfig;
use robofleet_orchestrator::{FleetOrchestrator, Job, TaskSubmitter};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::Result;

/// Execute `job` to completion and return its JSON result.
///
/// Follow-up work is queued through `submitter`.
pub fn execute(job: &Job, config: &FleetConfig, submitter: &dyn TaskSubmitter) -> Result<Value> {
    let mut fleet = FleetOrchestrator::open(config)?;

    let value = match job {
        Job::HealthCheck => serde_json::to_value(fleet.run_fleet_health_check()?)?,
        Job::ProcessScheduled => serde_json::to_value(fleet.run_mission_dispatch()?)?,
        Job::SimulateProgress { mission_id } => {
            serde_json::to_value(fleet.advance_mission_progress(*mission_id))?
        }
        Job::ScheduleMission {
            mission_id,
            delay_seconds,
        } => serde_json::to_value(fleet.schedule_mission_start(
            *mission_id,
            *delay_seconds,
            submitter,
        )?)?,
        Job::SimulateUntilComplete { mission_id } => {
            let outcome = fleet.advance_mission_progress(*mission_id);
            let next = outcome.value().filter(|report| !report.completed).is_some();
            if next {
                let delay = Duration::from_secs(config.simulation.step_delay_secs);
                let handle = submitter.submit(job.clone(), delay)?;
                debug!(mission_id = %mission_id, task_id = %handle.task_id, ?delay, "Next progress step queued");
            } else if outcome.success {
                info!(mission_id = %mission_id, "Simulation chain finished");
            }
            serde_json::to_value(outcome)?
        }
        Job::SendCommand {
            robot_id,
            command,
            payload,
        } => serde_json::to_value(fleet.execute_robot_command(
            *robot_id,
            command,
            payload.as_ref(),
        ))?,
    };

    Ok(value)
}
