//! Robot Command Executor
//!
//! Maps operator command names to robot status changes. Delivery to real
//! hardware is simulated; the optional payload is accepted and logged but
//! not interpreted.

use robofleet_core::{Error, RobotCommand, RobotEvent, RobotId};
use robofleet_registry::{FleetStore, RobotRegistry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Result of one command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandReport {
    pub message: String,
    pub robot_id: RobotId,
}

#[derive(Debug, Clone, Default)]
pub struct RobotCommandExecutor;

impl RobotCommandExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Apply `command` to `robot_id`.
    ///
    /// Unknown command names succeed without touching the robot.
    pub fn execute(
        &self,
        store: &mut FleetStore,
        robot_id: RobotId,
        command: &str,
        payload: Option<&serde_json::Value>,
    ) -> Result<CommandReport> {
        let tx = store.begin()?;
        let robot = tx
            .get_robot(robot_id)?
            .ok_or_else(|| Error::robot_not_found(robot_id))?;

        if let Some(payload) = payload {
            debug!(robot_id = %robot_id, command, %payload, "Command payload received");
        }

        let message = match RobotCommand::parse(command) {
            Some(cmd) => {
                let updated = tx.transition_robot(robot_id, RobotEvent::Command(cmd))?;
                info!(robot_id = %robot_id, command, from = %robot.status, to = %updated.status, "Robot command applied");
                describe(cmd, &robot.name)
            }
            None => {
                warn!(robot_id = %robot_id, command, "Unknown robot command");
                format!("Unknown command: {command}")
            }
        };

        tx.commit()?;
        Ok(CommandReport { message, robot_id })
    }
}

fn describe(command: RobotCommand, name: &str) -> String {
    match command {
        RobotCommand::ReturnToBase => format!("Robot {name} returning to base"),
        RobotCommand::StartCharging => format!("Robot {name} started charging"),
        RobotCommand::EmergencyStop => format!("Robot {name} emergency stopped"),
    }
}
