//! Named units of work and the submission seam
//!
//! The orchestrator only describes jobs; running them on a delay or a fixed
//! interval is the job of whatever implements [`TaskSubmitter`].

use robofleet_core::{MissionId, RobotId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// A unit of work the scheduler can run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "job", content = "args")]
pub enum Job {
    /// Mark stale robots offline and report fleet statistics
    #[serde(rename = "fleet.health_check")]
    HealthCheck,

    /// Assign idle robots and start due missions
    #[serde(rename = "missions.process_scheduled")]
    ProcessScheduled,

    /// Advance one mission by one step
    #[serde(rename = "missions.simulate_progress")]
    SimulateProgress { mission_id: MissionId },

    /// Submit a progress step after `delay_seconds`
    #[serde(rename = "missions.schedule")]
    ScheduleMission {
        mission_id: MissionId,
        delay_seconds: u64,
    },

    /// Advance one step, then resubmit until the mission completes
    #[serde(rename = "missions.simulate_until_complete")]
    SimulateUntilComplete { mission_id: MissionId },

    /// Run a named command against one robot
    #[serde(rename = "robots.send_command")]
    SendCommand {
        robot_id: RobotId,
        command: String,
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::HealthCheck => "fleet.health_check",
            Job::ProcessScheduled => "missions.process_scheduled",
            Job::SimulateProgress { .. } => "missions.simulate_progress",
            Job::ScheduleMission { .. } => "missions.schedule",
            Job::SimulateUntilComplete { .. } => "missions.simulate_until_complete",
            Job::SendCommand { .. } => "robots.send_command",
        }
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies a submitted job for later polling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    pub task_id: Uuid,
    pub job: String,
}

impl TaskHandle {
    pub fn new(job: &Job) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            job: job.name().to_string(),
        }
    }
}

/// Job could not be queued
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Task submission rejected: {0}")]
pub struct SubmitError(pub String);

/// Accepts jobs for immediate or delayed execution
pub trait TaskSubmitter: Send + Sync {
    /// Queue `job` to run after `delay`; `Duration::ZERO` runs it now
    fn submit(&self, job: Job, delay: Duration) -> std::result::Result<TaskHandle, SubmitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_wire_names() {
        let json = serde_json::to_value(Job::HealthCheck).unwrap();
        assert_eq!(json["job"], "fleet.health_check");

        let id = Uuid::new_v4();
        let job = Job::ScheduleMission {
            mission_id: id,
            delay_seconds: 10,
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["job"], job.name());
        assert_eq!(json["args"]["delay_seconds"], 10);

        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_command_payload_is_optional() {
        let id = Uuid::new_v4();
        let job: Job = serde_json::from_value(serde_json::json!({
            "job": "robots.send_command",
            "args": { "robot_id": id, "command": "emergency_stop" }
        }))
        .unwrap();
        assert_eq!(
            job,
            Job::SendCommand {
                robot_id: id,
                command: "emergency_stop".to_string(),
                payload: None,
            }
        );
    }
}
