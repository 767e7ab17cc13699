//! Fleet orchestration for Robofleet.
//!
//! This crate holds the reconcilers that keep robots and missions
//! consistent: the [`FleetHealthMonitor`], the [`MissionDispatcher`], the
//! [`MissionProgressSimulator`] and the [`RobotCommandExecutor`]. The
//! [`FleetOrchestrator`] bundles them over one store and is the surface the
//! scheduler jobs and the worker call.
//!
//! Every operation opens its own transaction and commits once, so repeated
//! or concurrent invocations from separate processes are safe.

pub mod commands;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod outcome;
pub mod progress;
pub mod tasks;

#[cfg(test)]
mod fixtures;

pub use commands::{CommandReport, RobotCommandExecutor};
pub use dispatcher::{DispatchReport, MissionDispatcher};
pub use error::{ErrorPayload, FleetError, Result};
pub use health::{FleetHealthMonitor, FleetHealthReport};
pub use outcome::Outcome;
pub use progress::{MissionProgressSimulator, ProgressReport};
pub use tasks::{Job, SubmitError, TaskHandle, TaskSubmitter};

use robofleet_core::{
    Error, FleetConfig, Mission, MissionId, MissionStatus, NewMission, NewRobot, Robot,
    RobotEvent, RobotId, TelemetryUpdate,
};
use robofleet_registry::{FleetStore, MissionRegistry, RobotRegistry};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Acknowledgement of a delayed mission start
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleReport {
    pub scheduled: bool,
    pub mission_id: MissionId,
    /// Seconds until the first progress step
    pub delay: u64,
}

/// Fleet operations over one store connection
pub struct FleetOrchestrator {
    store: FleetStore,
    health: FleetHealthMonitor,
    dispatcher: MissionDispatcher,
    simulator: MissionProgressSimulator,
    commands: RobotCommandExecutor,
}

impl FleetOrchestrator {
    pub fn new(store: FleetStore, config: &FleetConfig) -> Self {
        Self {
            store,
            health: FleetHealthMonitor::from_config(&config.health),
            dispatcher: MissionDispatcher::new(),
            simulator: MissionProgressSimulator::from_config(&config.simulation),
            commands: RobotCommandExecutor::new(),
        }
    }

    /// Open the configured store and wrap it
    pub fn open(config: &FleetConfig) -> Result<Self> {
        let store = FleetStore::open(&config.store)?;
        Ok(Self::new(store, config))
    }

    pub fn store_mut(&mut self) -> &mut FleetStore {
        &mut self.store
    }

    /// Mark stale robots offline and report fleet statistics
    pub fn run_fleet_health_check(&mut self) -> Result<FleetHealthReport> {
        self.health.run(&mut self.store)
    }

    /// Assign idle robots to due missions and start them
    pub fn run_mission_dispatch(&mut self) -> Result<DispatchReport> {
        self.dispatcher.run(&mut self.store)
    }

    /// Advance one in-progress mission by one step
    pub fn advance_mission_progress(&mut self, mission_id: MissionId) -> Outcome<ProgressReport> {
        self.simulator.advance(&mut self.store, mission_id).into()
    }

    /// Submit the progress simulator for `mission_id` after `delay_seconds`
    pub fn schedule_mission_start(
        &self,
        mission_id: MissionId,
        delay_seconds: u64,
        submitter: &dyn TaskSubmitter,
    ) -> Result<ScheduleReport> {
        let handle = submitter.submit(
            Job::SimulateProgress { mission_id },
            Duration::from_secs(delay_seconds),
        )?;
        info!(mission_id = %mission_id, delay_seconds, task_id = %handle.task_id, "Mission start scheduled");

        Ok(ScheduleReport {
            scheduled: true,
            mission_id,
            delay: delay_seconds,
        })
    }

    /// Apply a named command to one robot
    pub fn execute_robot_command(
        &mut self,
        robot_id: RobotId,
        command: &str,
        payload: Option<&serde_json::Value>,
    ) -> Outcome<CommandReport> {
        self.commands
            .execute(&mut self.store, robot_id, command, payload)
            .into()
    }

    /// Register a robot; it starts OFFLINE until its first report
    pub fn register_robot(&mut self, new: NewRobot) -> Result<Robot> {
        let robot = self.store.write(|tx| tx.register_robot(new))?;
        info!(robot_id = %robot.id, serial = %robot.serial_number, "Robot registered");
        Ok(robot)
    }

    /// Record a robot self-report, refreshing its staleness clock
    pub fn record_telemetry(&mut self, robot_id: RobotId, update: &TelemetryUpdate) -> Result<Robot> {
        Ok(self.store.write(|tx| tx.record_telemetry(robot_id, update))?)
    }

    /// Create a pending mission
    pub fn create_mission(&mut self, new: NewMission) -> Result<Mission> {
        let mission = self.store.write(|tx| tx.create_mission(new))?;
        info!(mission_id = %mission.id, scheduled_at = ?mission.scheduled_at, "Mission created");
        Ok(mission)
    }

    /// Assign a pending mission to a specific robot
    pub fn assign_mission(&mut self, mission_id: MissionId, robot_id: RobotId) -> Result<Mission> {
        self.store.write(|tx| -> Result<Mission> {
            if tx.get_robot(robot_id)?.is_none() {
                return Err(Error::robot_not_found(robot_id).into());
            }
            if tx.get_mission(mission_id)?.is_none() {
                return Err(Error::mission_not_found(mission_id).into());
            }
            let mission = tx.assign_mission(mission_id, robot_id)?;
            info!(mission_id = %mission_id, robot_id = %robot_id, "Mission assigned");
            Ok(mission)
        })
    }

    pub fn cancel_mission(&mut self, mission_id: MissionId) -> Result<Mission> {
        self.close_mission(mission_id, MissionStatus::Cancelled)
    }

    pub fn fail_mission(&mut self, mission_id: MissionId) -> Result<Mission> {
        self.close_mission(mission_id, MissionStatus::Failed)
    }

    /// Move a mission to a terminal status, releasing its robot if it was running
    fn close_mission(&mut self, mission_id: MissionId, terminal: MissionStatus) -> Result<Mission> {
        self.store.write(|tx| -> Result<Mission> {
            let before = tx
                .get_mission(mission_id)?
                .ok_or_else(|| Error::mission_not_found(mission_id))?;
            let mission = tx.close_mission(mission_id, terminal)?;

            if before.status == MissionStatus::InProgress {
                if let Some(robot_id) = before.robot_id {
                    if tx.get_robot(robot_id)?.is_some() {
                        tx.transition_robot(robot_id, RobotEvent::MissionReleased)?;
                        debug!(mission_id = %mission_id, robot_id = %robot_id, "Robot released");
                    }
                }
            }

            info!(mission_id = %mission_id, status = %terminal, "Mission closed");
            Ok(mission)
        })
    }
}
