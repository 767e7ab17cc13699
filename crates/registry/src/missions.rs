//! Mission Registry
//!
//! Mission records keyed by id. Every status write is checked against
//! [`mission_transition`] and applied as a conditional update on the status
//! the caller observed, so a stale read can never overwrite a newer state.

use chrono::{DateTime, Utc};
use robofleet_core::{
    mission_transition, Mission, MissionId, MissionPriority, MissionStatus, NewMission, Position,
    RobotId, PROGRESS_COMPLETE,
};
use rusqlite::{params, OptionalExtension, Row, ToSql};
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::store::{from_millis, to_millis, FleetTransaction, Scan, SkippedRow};

const MISSION_COLUMNS: &str = "id, name, description, priority, status, progress, \
     target_x, target_y, target_z, robot_id, scheduled_at, started_at, completed_at, \
     created_at, updated_at";

/// Filter for mission scans
#[derive(Debug, Clone, Default)]
pub struct MissionQuery {
    /// Match any of these statuses; empty matches all
    pub statuses: Vec<MissionStatus>,
    /// Only missions with `scheduled_at <= at`
    pub scheduled_before: Option<DateTime<Utc>>,
    /// Only missions referencing this robot
    pub robot_id: Option<RobotId>,
    pub limit: Option<usize>,
}

impl MissionQuery {
    pub fn all() -> Self {
        Self::default()
    }

    /// Pending or assigned missions whose schedule has come due
    pub fn due(now: DateTime<Utc>) -> Self {
        Self {
            statuses: vec![MissionStatus::Pending, MissionStatus::Assigned],
            scheduled_before: Some(now),
            ..Self::default()
        }
    }

    pub fn with_status(status: MissionStatus) -> Self {
        Self {
            statuses: vec![status],
            ..Self::default()
        }
    }

    pub fn for_robot(mut self, robot_id: RobotId) -> Self {
        self.robot_id = Some(robot_id);
        self
    }
}

/// Non-status attribute changes
#[derive(Debug, Clone, Default)]
pub struct MissionPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub priority: Option<MissionPriority>,
    pub target: Option<Position>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Read/write access to mission records inside a transaction
pub trait MissionRegistry {
    /// Fetch one mission; `Ok(None)` if it does not exist
    fn get_mission(&self, id: MissionId) -> Result<Option<Mission>>;

    /// Missions matching `query`, ordered by schedule, creation time, id
    fn scan_missions(&self, query: &MissionQuery) -> Result<Scan<Mission>>;

    /// Store a fully-formed record as is
    fn insert_mission(&self, mission: &Mission) -> Result<()>;

    /// Validate and create a pending mission
    fn create_mission(&self, new: NewMission) -> Result<Mission>;

    /// Apply attribute changes; status and progress are untouched
    fn update_mission(&self, id: MissionId, patch: &MissionPatch) -> Result<Mission>;

    /// PENDING -> ASSIGNED with `robot_id`
    fn assign_mission(&self, id: MissionId, robot_id: RobotId) -> Result<Mission>;

    /// ASSIGNED -> IN_PROGRESS, stamping `started_at`
    fn start_mission(&self, id: MissionId) -> Result<Mission>;

    /// Set progress on an in-progress mission still at `observed` progress.
    ///
    /// Reaching 100 completes the mission. Returns `Ok(None)` if the mission
    /// moved on since it was read; nothing is written in that case.
    fn advance_mission_if(
        &self,
        id: MissionId,
        observed: f64,
        progress: f64,
    ) -> Result<Option<Mission>>;

    /// Move a mission into CANCELLED or FAILED
    fn close_mission(&self, id: MissionId, terminal: MissionStatus) -> Result<Mission>;
}

impl FleetTransaction<'_> {
    fn require_mission(&self, id: MissionId) -> Result<Mission> {
        self.get_mission(id)?
            .ok_or_else(|| RegistryError::mission_not_found(id))
    }

    /// Conditional status write; `extra` is appended to the SET clause
    fn set_mission_status(
        &self,
        mission: &Mission,
        next: MissionStatus,
        extra: &str,
        extra_params: &[&dyn ToSql],
    ) -> Result<Mission> {
        mission_transition(mission.status, next)?;

        let sql = format!(
            "UPDATE missions SET status = ?1, updated_at = ?2{extra} WHERE id = ?3 AND status = ?4"
        );
        let id = mission.id.to_string();
        let now_ms = self.now_ms();
        let next_str = next.as_str().to_string();
        let from_str = mission.status.as_str().to_string();
        let mut all: Vec<&dyn ToSql> = vec![&next_str as &dyn ToSql, &now_ms, &id, &from_str];
        all.extend_from_slice(extra_params);

        let changed = self.conn().execute(&sql, all.as_slice())?;
        if changed == 0 {
            return Err(RegistryError::Conflict {
                entity: "mission",
                id,
                reason: format!("status changed from {} during update", mission.status),
            });
        }

        debug!(mission_id = %mission.id, from = %mission.status, to = %next, "Mission status changed");
        self.require_mission(mission.id)
    }
}

impl MissionRegistry for FleetTransaction<'_> {
    fn get_mission(&self, id: MissionId) -> Result<Option<Mission>> {
        let raw = self
            .conn()
            .query_row(
                &format!("SELECT {MISSION_COLUMNS} FROM missions WHERE id = ?1"),
                [id.to_string()],
                RawMission::from_row,
            )
            .optional()?;

        raw.map(|raw| {
            let row_id = raw.id.clone();
            raw.decode().map_err(|reason| RegistryError::Corrupt {
                entity: "mission",
                id: row_id,
                reason,
            })
        })
        .transpose()
    }

    fn scan_missions(&self, query: &MissionQuery) -> Result<Scan<Mission>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if !query.statuses.is_empty() {
            let start = values.len();
            for status in &query.statuses {
                values.push(Box::new(status.as_str()));
            }
            let placeholders = (start + 1..=values.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("status IN ({placeholders})"));
        }
        if let Some(before) = query.scheduled_before {
            values.push(Box::new(to_millis(before)));
            clauses.push(format!(
                "scheduled_at IS NOT NULL AND scheduled_at <= ?{}",
                values.len()
            ));
        }
        if let Some(robot_id) = query.robot_id {
            values.push(Box::new(robot_id.to_string()));
            clauses.push(format!("robot_id = ?{}", values.len()));
        }

        let mut sql = format!("SELECT {MISSION_COLUMNS} FROM missions");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY scheduled_at ASC, created_at ASC, id ASC");
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
                RawMission::from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut scan = Scan {
            records: Vec::with_capacity(rows.len()),
            skipped: Vec::new(),
        };
        for raw in rows {
            let id = raw.id.clone();
            match raw.decode() {
                Ok(mission) => scan.records.push(mission),
                Err(reason) => scan.skipped.push(SkippedRow { id, reason }),
            }
        }
        Ok(scan)
    }

    fn insert_mission(&self, mission: &Mission) -> Result<()> {
        mission.check_invariants()?;

        let (x, y, z) = match mission.target {
            Some(p) => (Some(p.x), Some(p.y), Some(p.z)),
            None => (None, None, None),
        };
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO missions ({MISSION_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
                ),
                params![
                    mission.id.to_string(),
                    mission.name,
                    mission.description,
                    mission.priority.as_str(),
                    mission.status.as_str(),
                    mission.progress,
                    x,
                    y,
                    z,
                    mission.robot_id.map(|id| id.to_string()),
                    mission.scheduled_at.map(to_millis),
                    mission.started_at.map(to_millis),
                    mission.completed_at.map(to_millis),
                    to_millis(mission.created_at),
                    to_millis(mission.updated_at),
                ],
            )
            .map_err(|e| {
                if RegistryError::is_constraint_violation(&e) {
                    RegistryError::Duplicate(format!("mission {} already exists", mission.id))
                } else {
                    RegistryError::Database(e)
                }
            })?;

        debug!(mission_id = %mission.id, status = %mission.status, "Mission inserted");
        Ok(())
    }

    fn create_mission(&self, new: NewMission) -> Result<Mission> {
        new.validate()?;
        let mission = new.into_mission(self.now());
        self.insert_mission(&mission)?;
        Ok(mission)
    }

    fn update_mission(&self, id: MissionId, patch: &MissionPatch) -> Result<Mission> {
        let mut mission = self.require_mission(id)?;
        if let Some(name) = &patch.name {
            mission.name = name.clone();
        }
        if let Some(description) = &patch.description {
            mission.description = Some(description.clone());
        }
        if let Some(priority) = patch.priority {
            mission.priority = priority;
        }
        if let Some(target) = patch.target {
            mission.target = Some(target);
        }
        if let Some(at) = patch.scheduled_at {
            mission.scheduled_at = Some(at);
        }

        let (x, y, z) = match mission.target {
            Some(p) => (Some(p.x), Some(p.y), Some(p.z)),
            None => (None, None, None),
        };
        self.conn().execute(
            r#"
            UPDATE missions SET
                name = ?2, description = ?3, priority = ?4,
                target_x = ?5, target_y = ?6, target_z = ?7,
                scheduled_at = ?8, updated_at = ?9
            WHERE id = ?1
            "#,
            params![
                id.to_string(),
                mission.name,
                mission.description,
                mission.priority.as_str(),
                x,
                y,
                z,
                mission.scheduled_at.map(to_millis),
                self.now_ms(),
            ],
        )?;

        self.require_mission(id)
    }

    fn assign_mission(&self, id: MissionId, robot_id: RobotId) -> Result<Mission> {
        let mission = self.require_mission(id)?;
        let robot = robot_id.to_string();
        self.set_mission_status(
            &mission,
            MissionStatus::Assigned,
            ", robot_id = ?5",
            &[&robot],
        )
    }

    fn start_mission(&self, id: MissionId) -> Result<Mission> {
        let mission = self.require_mission(id)?;
        if mission.robot_id.is_none() {
            return Err(RegistryError::Validation(format!(
                "mission {id} has no robot to start with"
            )));
        }
        let started_at = self.now_ms();
        self.set_mission_status(
            &mission,
            MissionStatus::InProgress,
            ", started_at = ?5",
            &[&started_at],
        )
    }

    fn advance_mission_if(
        &self,
        id: MissionId,
        observed: f64,
        progress: f64,
    ) -> Result<Option<Mission>> {
        if !(observed..=PROGRESS_COMPLETE).contains(&progress) {
            return Err(RegistryError::Validation(format!(
                "progress must move forward within [{observed}, 100], got {progress}"
            )));
        }

        let completes = progress >= PROGRESS_COMPLETE;
        let next = if completes {
            mission_transition(MissionStatus::InProgress, MissionStatus::Completed)?
        } else {
            MissionStatus::InProgress
        };
        let now_ms = self.now_ms();
        let completed_at = completes.then_some(now_ms);

        let changed = self.conn().execute(
            r#"
            UPDATE missions SET
                progress = ?1, status = ?2, completed_at = ?3, updated_at = ?4
            WHERE id = ?5 AND status = ?6 AND progress = ?7
            "#,
            params![
                progress,
                next.as_str(),
                completed_at,
                now_ms,
                id.to_string(),
                MissionStatus::InProgress.as_str(),
                observed,
            ],
        )?;

        if changed == 0 {
            debug!(mission_id = %id, observed, "Mission moved on since it was read");
            return Ok(None);
        }

        debug!(mission_id = %id, progress, completed = completes, "Mission progress recorded");
        self.get_mission(id)
    }

    fn close_mission(&self, id: MissionId, terminal: MissionStatus) -> Result<Mission> {
        if !matches!(terminal, MissionStatus::Cancelled | MissionStatus::Failed) {
            return Err(RegistryError::Validation(format!(
                "{terminal} is not an external terminal status"
            )));
        }
        let mission = self.require_mission(id)?;
        self.set_mission_status(&mission, terminal, "", &[])
    }
}

/// Column values before enum and timestamp decoding
struct RawMission {
    id: String,
    name: String,
    description: Option<String>,
    priority: String,
    status: String,
    progress: f64,
    target_x: Option<f64>,
    target_y: Option<f64>,
    target_z: Option<f64>,
    robot_id: Option<String>,
    scheduled_at: Option<i64>,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl RawMission {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            priority: row.get(3)?,
            status: row.get(4)?,
            progress: row.get(5)?,
            target_x: row.get(6)?,
            target_y: row.get(7)?,
            target_z: row.get(8)?,
            robot_id: row.get(9)?,
            scheduled_at: row.get(10)?,
            started_at: row.get(11)?,
            completed_at: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    fn decode(self) -> std::result::Result<Mission, String> {
        let target = match (self.target_x, self.target_y, self.target_z) {
            (Some(x), Some(y), Some(z)) => Some(Position::new(x, y, z)),
            (None, None, None) => None,
            _ => return Err("partial target position".to_string()),
        };
        let optional_ts = |ms: Option<i64>| ms.map(from_millis).transpose();

        Ok(Mission {
            id: self.id.parse::<MissionId>().map_err(|e| format!("bad id: {e}"))?,
            name: self.name,
            description: self.description,
            priority: self
                .priority
                .parse::<MissionPriority>()
                .map_err(|e| e.to_string())?,
            status: self
                .status
                .parse::<MissionStatus>()
                .map_err(|e| e.to_string())?,
            progress: self.progress,
            target,
            robot_id: self
                .robot_id
                .map(|id| id.parse::<RobotId>())
                .transpose()
                .map_err(|e| format!("bad robot_id: {e}"))?,
            scheduled_at: optional_ts(self.scheduled_at)?,
            started_at: optional_ts(self.started_at)?,
            completed_at: optional_ts(self.completed_at)?,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}
