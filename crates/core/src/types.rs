//! Fleet record types
//!
//! Robots and missions as stored by the registries. Status fields are closed
//! enums; legal status changes live in [`crate::transitions`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// Robot identifier
pub type RobotId = Uuid;
/// Mission identifier
pub type MissionId = Uuid;

/// Robot category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RobotType {
    /// Autonomous mobile robot
    Amr,
    /// Automated guided vehicle
    Agv,
    /// Aerial platform
    Drone,
    /// Fixed or mobile manipulator arm
    Manipulator,
    /// Humanoid platform
    Humanoid,
}

/// Operational status of a robot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    /// Unreachable or not reporting
    Offline,
    /// Online and available for assignment
    Idle,
    /// Executing a mission or moving under command
    Active,
    /// Docked and charging
    Charging,
    /// Withdrawn from service
    Maintenance,
}

/// Mission urgency
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MissionPriority {
    Low,
    Normal,
    High,
    Critical,
}

/// Lifecycle status of a mission
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    /// Created, waiting for a robot
    Pending,
    /// Robot chosen, not yet started
    Assigned,
    /// Robot executing
    InProgress,
    /// Finished successfully
    Completed,
    /// Withdrawn by an operator
    Cancelled,
    /// Aborted with an error
    Failed,
}

macro_rules! str_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            /// Storage and wire representation
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $s,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok($ty::$variant),)+
                    other => Err(Error::Validation(format!("unknown {} '{}'", $kind, other))),
                }
            }
        }
    };
}

str_enum!(RobotType, "robot type", {
    Amr => "amr",
    Agv => "agv",
    Drone => "drone",
    Manipulator => "manipulator",
    Humanoid => "humanoid",
});

str_enum!(RobotStatus, "robot status", {
    Offline => "offline",
    Idle => "idle",
    Active => "active",
    Charging => "charging",
    Maintenance => "maintenance",
});

str_enum!(MissionPriority, "mission priority", {
    Low => "low",
    Normal => "normal",
    High => "high",
    Critical => "critical",
});

str_enum!(MissionStatus, "mission status", {
    Pending => "pending",
    Assigned => "assigned",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
    Failed => "failed",
});

impl RobotStatus {
    /// Counted as online by fleet statistics
    pub fn is_online(&self) -> bool {
        !matches!(self, RobotStatus::Offline)
    }
}

impl MissionStatus {
    /// No further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MissionStatus::Completed | MissionStatus::Cancelled | MissionStatus::Failed
        )
    }
}

/// Cartesian position in the site frame (meters)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A registered robot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Robot {
    pub id: RobotId,
    pub name: String,
    pub serial_number: String,
    pub robot_type: RobotType,
    pub description: Option<String>,
    pub status: RobotStatus,
    pub position: Option<Position>,
    /// Degrees, 0 inclusive to 360 exclusive
    pub heading: Option<f64>,
    /// Percent, 0 to 100
    pub battery_level: Option<f64>,
    pub firmware_version: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Bumped on every mutation; staleness is measured from here
    pub updated_at: DateTime<Utc>,
}

impl Robot {
    /// True if the robot has not been touched since `cutoff`
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.updated_at < cutoff
    }

    /// Battery reported and strictly below `threshold`
    pub fn is_low_battery(&self, threshold: f64) -> bool {
        self.battery_level.is_some_and(|level| level < threshold)
    }
}

/// A unit of work for one robot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mission {
    pub id: MissionId,
    pub name: String,
    pub description: Option<String>,
    pub priority: MissionPriority,
    pub status: MissionStatus,
    /// Percent complete, 0 to 100
    pub progress: f64,
    pub target: Option<Position>,
    /// Weak reference; the mission does not own the robot
    pub robot_id: Option<RobotId>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upper bound of mission progress
pub const PROGRESS_COMPLETE: f64 = 100.0;

impl Mission {
    /// Eligible for the dispatcher at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, MissionStatus::Pending | MissionStatus::Assigned)
            && self.scheduled_at.is_some_and(|at| at <= now)
    }

    /// Check the record-level invariants of a mission
    pub fn check_invariants(&self) -> Result<(), Error> {
        if !(0.0..=PROGRESS_COMPLETE).contains(&self.progress) {
            return Err(Error::Validation(format!(
                "progress {} outside [0, 100]",
                self.progress
            )));
        }
        if self.robot_id.is_some()
            && matches!(self.status, MissionStatus::Pending)
        {
            return Err(Error::Validation(
                "pending mission must not reference a robot".to_string(),
            ));
        }
        if self.completed_at.is_some() != (self.status == MissionStatus::Completed) {
            return Err(Error::Validation(
                "completed_at must be set exactly when status is completed".to_string(),
            ));
        }
        if self.progress >= PROGRESS_COMPLETE && self.status != MissionStatus::Completed {
            return Err(Error::Validation(
                "full progress requires completed status".to_string(),
            ));
        }
        if matches!(self.status, MissionStatus::InProgress | MissionStatus::Completed)
            && self.started_at.is_none()
        {
            return Err(Error::Validation(
                "started mission is missing started_at".to_string(),
            ));
        }
        Ok(())
    }
}

/// Registration request for a robot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRobot {
    pub name: String,
    pub serial_number: String,
    #[serde(default = "default_robot_type")]
    pub robot_type: RobotType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
}

fn default_robot_type() -> RobotType {
    RobotType::Amr
}

impl NewRobot {
    pub fn new(name: impl Into<String>, serial_number: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            serial_number: serial_number.into(),
            robot_type: RobotType::Amr,
            description: None,
            firmware_version: None,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        check_len("name", &self.name, 100)?;
        check_len("serial_number", &self.serial_number, 50)
    }

    /// Materialize the record; new robots start offline until they report
    pub fn into_robot(self, now: DateTime<Utc>) -> Robot {
        Robot {
            id: Uuid::new_v4(),
            name: self.name,
            serial_number: self.serial_number,
            robot_type: self.robot_type,
            description: self.description,
            status: RobotStatus::Offline,
            position: None,
            heading: None,
            battery_level: None,
            firmware_version: self.firmware_version,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Creation request for a mission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMission {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: MissionPriority,
    #[serde(default)]
    pub target: Option<Position>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

fn default_priority() -> MissionPriority {
    MissionPriority::Normal
}

impl NewMission {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            priority: MissionPriority::Normal,
            target: None,
            scheduled_at: None,
        }
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        check_len("name", &self.name, 200)
    }

    /// Materialize the record as pending with zero progress
    pub fn into_mission(self, now: DateTime<Utc>) -> Mission {
        Mission {
            id: Uuid::new_v4(),
            name: self.name,
            description: self.description,
            priority: self.priority,
            status: MissionStatus::Pending,
            progress: 0.0,
            target: self.target,
            robot_id: None,
            scheduled_at: self.scheduled_at,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Robot self-report; every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TelemetryUpdate {
    pub status: Option<RobotStatus>,
    pub position: Option<Position>,
    pub heading: Option<f64>,
    pub battery_level: Option<f64>,
}

impl TelemetryUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(heading) = self.heading {
            if !(0.0..360.0).contains(&heading) {
                return Err(Error::Validation(format!(
                    "heading {heading} outside [0, 360)"
                )));
            }
        }
        if let Some(level) = self.battery_level {
            if !(0.0..=100.0).contains(&level) {
                return Err(Error::Validation(format!(
                    "battery_level {level} outside [0, 100]"
                )));
            }
        }
        Ok(())
    }
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), Error> {
    let len = value.chars().count();
    if len == 0 || len > max {
        return Err(Error::Validation(format!(
            "{field} must be between 1 and {max} characters"
        )));
    }
    Ok(())
}
