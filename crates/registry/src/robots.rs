//! Robot Registry
//!
//! Robot records keyed by id. Status only changes through
//! [`robot_transition`]; every other write goes through [`RobotPatch`] or
//! telemetry. Both bump `updated_at`.

use robofleet_core::{
    robot_transition, NewRobot, Position, Robot, RobotEvent, RobotId, RobotStatus, RobotType,
    TelemetryUpdate,
};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::store::{from_millis, to_millis, FleetTransaction, Scan, SkippedRow};

const ROBOT_COLUMNS: &str = "id, name, serial_number, robot_type, description, status, \
     position_x, position_y, position_z, heading, battery_level, firmware_version, \
     created_at, updated_at";

/// Filter for robot scans
#[derive(Debug, Clone, Default)]
pub struct RobotQuery {
    /// Match any of these statuses; empty matches all
    pub statuses: Vec<RobotStatus>,
    pub limit: Option<usize>,
}

impl RobotQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: RobotStatus) -> Self {
        Self {
            statuses: vec![status],
            limit: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Non-status attribute changes
#[derive(Debug, Clone, Default)]
pub struct RobotPatch {
    pub name: Option<String>,
    pub robot_type: Option<RobotType>,
    pub description: Option<String>,
    pub firmware_version: Option<String>,
    pub position: Option<Position>,
    pub heading: Option<f64>,
    pub battery_level: Option<f64>,
}

impl RobotPatch {
    fn apply(&self, robot: &mut Robot) {
        if let Some(name) = &self.name {
            robot.name = name.clone();
        }
        if let Some(robot_type) = self.robot_type {
            robot.robot_type = robot_type;
        }
        if let Some(description) = &self.description {
            robot.description = Some(description.clone());
        }
        if let Some(firmware) = &self.firmware_version {
            robot.firmware_version = Some(firmware.clone());
        }
        if let Some(position) = self.position {
            robot.position = Some(position);
        }
        if let Some(heading) = self.heading {
            robot.heading = Some(heading);
        }
        if let Some(level) = self.battery_level {
            robot.battery_level = Some(level);
        }
    }
}

/// Read/write access to robot records inside a transaction
pub trait RobotRegistry {
    /// Fetch one robot; `Ok(None)` if it does not exist
    fn get_robot(&self, id: RobotId) -> Result<Option<Robot>>;

    /// Robots matching `query`, ordered by creation time then id
    fn scan_robots(&self, query: &RobotQuery) -> Result<Scan<Robot>>;

    /// Store a fully-formed record as is
    fn insert_robot(&self, robot: &Robot) -> Result<()>;

    /// Apply attribute changes; status is untouched
    fn update_robot(&self, id: RobotId, patch: &RobotPatch) -> Result<Robot>;

    /// Apply `event` to the robot's current status
    fn transition_robot(&self, id: RobotId, event: RobotEvent) -> Result<Robot>;

    /// Apply `event` only if the robot is still in `expected`.
    ///
    /// Returns `Ok(None)` when the precondition no longer holds or the robot
    /// is gone; nothing is written in that case.
    fn transition_robot_if(
        &self,
        id: RobotId,
        expected: RobotStatus,
        event: RobotEvent,
    ) -> Result<Option<Robot>>;

    /// Validate and register a new robot
    fn register_robot(&self, new: NewRobot) -> Result<Robot>;

    /// Record a robot self-report (the heartbeat)
    fn record_telemetry(&self, id: RobotId, update: &TelemetryUpdate) -> Result<Robot>;
}

impl RobotRegistry for FleetTransaction<'_> {
    fn get_robot(&self, id: RobotId) -> Result<Option<Robot>> {
        let raw = self
            .conn()
            .query_row(
                &format!("SELECT {ROBOT_COLUMNS} FROM robots WHERE id = ?1"),
                [id.to_string()],
                RawRobot::from_row,
            )
            .optional()?;

        raw.map(|raw| {
            let row_id = raw.id.clone();
            raw.decode().map_err(|reason| RegistryError::Corrupt {
                entity: "robot",
                id: row_id,
                reason,
            })
        })
        .transpose()
    }

    fn scan_robots(&self, query: &RobotQuery) -> Result<Scan<Robot>> {
        let mut sql = format!("SELECT {ROBOT_COLUMNS} FROM robots");
        let statuses: Vec<&str> = query.statuses.iter().map(|s| s.as_str()).collect();
        if !statuses.is_empty() {
            let placeholders = (1..=statuses.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" WHERE status IN ({placeholders})"));
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC");
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(statuses.iter()), RawRobot::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut scan = Scan {
            records: Vec::with_capacity(rows.len()),
            skipped: Vec::new(),
        };
        for raw in rows {
            let id = raw.id.clone();
            match raw.decode() {
                Ok(robot) => scan.records.push(robot),
                Err(reason) => scan.skipped.push(SkippedRow { id, reason }),
            }
        }
        Ok(scan)
    }

    fn insert_robot(&self, robot: &Robot) -> Result<()> {
        let (x, y, z) = split_position(robot.position);
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO robots ({ROBOT_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    robot.id.to_string(),
                    robot.name,
                    robot.serial_number,
                    robot.robot_type.as_str(),
                    robot.description,
                    robot.status.as_str(),
                    x,
                    y,
                    z,
                    robot.heading,
                    robot.battery_level,
                    robot.firmware_version,
                    to_millis(robot.created_at),
                    to_millis(robot.updated_at),
                ],
            )
            .map_err(|e| {
                if RegistryError::is_constraint_violation(&e) {
                    RegistryError::Duplicate(format!(
                        "robot with serial number '{}' or id {} already exists",
                        robot.serial_number, robot.id
                    ))
                } else {
                    RegistryError::Database(e)
                }
            })?;

        debug!(robot_id = %robot.id, serial = %robot.serial_number, "Robot inserted");
        Ok(())
    }

    fn update_robot(&self, id: RobotId, patch: &RobotPatch) -> Result<Robot> {
        let mut robot = self
            .get_robot(id)?
            .ok_or_else(|| RegistryError::robot_not_found(id))?;
        patch.apply(&mut robot);
        robot.updated_at = self.now();

        let (x, y, z) = split_position(robot.position);
        self.conn().execute(
            r#"
            UPDATE robots SET
                name = ?2, robot_type = ?3, description = ?4, firmware_version = ?5,
                position_x = ?6, position_y = ?7, position_z = ?8,
                heading = ?9, battery_level = ?10, updated_at = ?11
            WHERE id = ?1
            "#,
            params![
                id.to_string(),
                robot.name,
                robot.robot_type.as_str(),
                robot.description,
                robot.firmware_version,
                x,
                y,
                z,
                robot.heading,
                robot.battery_level,
                self.now_ms(),
            ],
        )?;

        Ok(robot)
    }

    fn transition_robot(&self, id: RobotId, event: RobotEvent) -> Result<Robot> {
        let current = self
            .get_robot(id)?
            .ok_or_else(|| RegistryError::robot_not_found(id))?;

        self.transition_robot_if(id, current.status, event)?
            .ok_or_else(|| RegistryError::Conflict {
                entity: "robot",
                id: id.to_string(),
                reason: format!("status changed from {} during update", current.status),
            })
    }

    fn transition_robot_if(
        &self,
        id: RobotId,
        expected: RobotStatus,
        event: RobotEvent,
    ) -> Result<Option<Robot>> {
        let next = robot_transition(expected, event)?;

        let changed = self.conn().execute(
            "UPDATE robots SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![next.as_str(), self.now_ms(), id.to_string(), expected.as_str()],
        )?;

        if changed == 0 {
            debug!(robot_id = %id, expected = %expected, %event, "Robot precondition no longer holds");
            return Ok(None);
        }

        debug!(robot_id = %id, from = %expected, to = %next, %event, "Robot status changed");
        self.get_robot(id)
    }

    fn register_robot(&self, new: NewRobot) -> Result<Robot> {
        new.validate()?;
        let robot = new.into_robot(self.now());
        self.insert_robot(&robot)?;
        Ok(robot)
    }

    fn record_telemetry(&self, id: RobotId, update: &TelemetryUpdate) -> Result<Robot> {
        update.validate()?;

        if let Some(status) = update.status {
            self.transition_robot(id, RobotEvent::Telemetry(status))?;
        }

        let patch = RobotPatch {
            position: update.position,
            heading: update.heading,
            battery_level: update.battery_level,
            ..Default::default()
        };
        self.update_robot(id, &patch)
    }
}

fn split_position(position: Option<Position>) -> (Option<f64>, Option<f64>, Option<f64>) {
    match position {
        Some(p) => (Some(p.x), Some(p.y), Some(p.z)),
        None => (None, None, None),
    }
}

/// Column values before enum and timestamp decoding
struct RawRobot {
    id: String,
    name: String,
    serial_number: String,
    robot_type: String,
    description: Option<String>,
    status: String,
    position_x: Option<f64>,
    position_y: Option<f64>,
    position_z: Option<f64>,
    heading: Option<f64>,
    battery_level: Option<f64>,
    firmware_version: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl RawRobot {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            serial_number: row.get(2)?,
            robot_type: row.get(3)?,
            description: row.get(4)?,
            status: row.get(5)?,
            position_x: row.get(6)?,
            position_y: row.get(7)?,
            position_z: row.get(8)?,
            heading: row.get(9)?,
            battery_level: row.get(10)?,
            firmware_version: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn decode(self) -> std::result::Result<Robot, String> {
        let position = match (self.position_x, self.position_y, self.position_z) {
            (Some(x), Some(y), Some(z)) => Some(Position::new(x, y, z)),
            (None, None, None) => None,
            _ => return Err("partial position".to_string()),
        };

        Ok(Robot {
            id: self.id.parse::<RobotId>().map_err(|e| format!("bad id: {e}"))?,
            name: self.name,
            serial_number: self.serial_number,
            robot_type: self.robot_type.parse::<RobotType>().map_err(|e| e.to_string())?,
            description: self.description,
            status: self.status.parse::<RobotStatus>().map_err(|e| e.to_string())?,
            position,
            heading: self.heading,
            battery_level: self.battery_level,
            firmware_version: self.firmware_version,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}
