//! Core functionality for the Robofleet orchestration system.
//!
//! This crate provides the fleet data model, the status transition tables,
//! the error taxonomy, configuration and logging used across the workspace.

pub mod config;
pub mod error;
pub mod logging;
pub mod transitions;
pub mod types;

pub use config::{
    DispatchConfig, FleetConfig, HealthConfig, LoggingConfig, SchedulerConfig, SimulationConfig,
    StoreConfig,
};
pub use error::{Error, ErrorKind, Result};
pub use transitions::{
    mission_transition, robot_transition, RobotCommand, RobotEvent, TransitionError,
};
pub use types::{
    Mission, MissionId, MissionPriority, MissionStatus, NewMission, NewRobot, Position, Robot,
    RobotId, RobotStatus, RobotType, TelemetryUpdate, PROGRESS_COMPLETE,
};
