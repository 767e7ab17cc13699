//! Status transition tables
//!
//! The only place that decides whether a status change is legal. Registries
//! route every status write through these functions so no component can set
//! an arbitrary status directly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{MissionStatus, RobotStatus};

/// Rejected status change
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {entity} transition from {from} on {event}")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: String,
    pub event: String,
}

/// Commands understood by the robot command executor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RobotCommand {
    ReturnToBase,
    StartCharging,
    EmergencyStop,
}

impl RobotCommand {
    /// Parse a command name; `None` for names this fleet does not understand
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "return_to_base" => Some(RobotCommand::ReturnToBase),
            "start_charging" => Some(RobotCommand::StartCharging),
            "emergency_stop" => Some(RobotCommand::EmergencyStop),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RobotCommand::ReturnToBase => "return_to_base",
            RobotCommand::StartCharging => "start_charging",
            RobotCommand::EmergencyStop => "emergency_stop",
        }
    }
}

/// Something that changes a robot's status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotEvent {
    /// No update within the staleness window
    HeartbeatLost,
    /// Dispatcher started a mission on the robot
    MissionStarted,
    /// The robot's mission finished or was withdrawn
    MissionReleased,
    /// Operator command
    Command(RobotCommand),
    /// Robot reported its own status
    Telemetry(RobotStatus),
}

impl std::fmt::Display for RobotEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RobotEvent::HeartbeatLost => f.write_str("heartbeat_lost"),
            RobotEvent::MissionStarted => f.write_str("mission_started"),
            RobotEvent::MissionReleased => f.write_str("mission_released"),
            RobotEvent::Command(cmd) => write!(f, "command:{}", cmd.as_str()),
            RobotEvent::Telemetry(status) => write!(f, "telemetry:{status}"),
        }
    }
}

/// Apply `event` to a robot in status `current`
pub fn robot_transition(
    current: RobotStatus,
    event: RobotEvent,
) -> Result<RobotStatus, TransitionError> {
    use RobotStatus::*;

    match (current, event) {
        (Offline | Maintenance, RobotEvent::HeartbeatLost) => Err(reject("robot", current, event)),
        (_, RobotEvent::HeartbeatLost) => Ok(Offline),
        (_, RobotEvent::MissionStarted) => Ok(Active),
        (_, RobotEvent::MissionReleased) => Ok(Idle),
        (_, RobotEvent::Command(RobotCommand::ReturnToBase)) => Ok(Active),
        (_, RobotEvent::Command(RobotCommand::StartCharging)) => Ok(Charging),
        (_, RobotEvent::Command(RobotCommand::EmergencyStop)) => Ok(Idle),
        (_, RobotEvent::Telemetry(reported)) => Ok(reported),
    }
}

/// Check that a mission may move from `current` to `next`
pub fn mission_transition(
    current: MissionStatus,
    next: MissionStatus,
) -> Result<MissionStatus, TransitionError> {
    use MissionStatus::*;

    match (current, next) {
        (Pending, Assigned)
        | (Assigned, InProgress)
        | (InProgress, Completed)
        | (Pending | Assigned | InProgress, Cancelled)
        | (Assigned | InProgress, Failed) => Ok(next),
        _ => Err(TransitionError {
            entity: "mission",
            from: current.to_string(),
            event: next.to_string(),
        }),
    }
}

fn reject(entity: &'static str, from: RobotStatus, event: RobotEvent) -> TransitionError {
    TransitionError {
        entity,
        from: from.to_string(),
        event: event.to_string(),
    }
}
