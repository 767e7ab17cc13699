//! Mission Progress Simulator
//!
//! Stands in for robot-reported progress: each call adds one quantum to an
//! IN_PROGRESS mission. Reaching 100 completes the mission and releases its
//! robot to IDLE. The write is conditional on the progress and status read in
//! the same transaction, so two concurrent steps never both count.

use chrono::{DateTime, Utc};
use robofleet_core::{
    Error, MissionId, MissionStatus, RobotEvent, SimulationConfig, PROGRESS_COMPLETE,
};
use robofleet_registry::{FleetStore, MissionRegistry, RobotRegistry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

/// Default progress added per step
pub const DEFAULT_PROGRESS_QUANTUM: f64 = 25.0;

/// Result of one progress step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressReport {
    pub mission_id: MissionId,
    pub progress: f64,
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct MissionProgressSimulator {
    quantum: f64,
}

impl Default for MissionProgressSimulator {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_QUANTUM)
    }
}

impl MissionProgressSimulator {
    pub fn new(quantum: f64) -> Self {
        Self { quantum }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.progress_quantum)
    }

    pub fn advance(&self, store: &mut FleetStore, mission_id: MissionId) -> Result<ProgressReport> {
        self.advance_at(store, mission_id, Utc::now())
    }

    /// Advance `mission_id` by one quantum as of `now`
    pub fn advance_at(
        &self,
        store: &mut FleetStore,
        mission_id: MissionId,
        now: DateTime<Utc>,
    ) -> Result<ProgressReport> {
        let tx = store.begin_at(now)?;

        let mission = tx
            .get_mission(mission_id)?
            .ok_or_else(|| Error::mission_not_found(mission_id))?;
        if mission.status != MissionStatus::InProgress {
            return Err(Error::InvalidState(format!(
                "Mission not in progress: {}",
                mission.status
            ))
            .into());
        }

        let next = (mission.progress + self.quantum).min(PROGRESS_COMPLETE);
        let updated = tx
            .advance_mission_if(mission_id, mission.progress, next)?
            .ok_or_else(|| {
                Error::TransientConflict(format!(
                    "mission {mission_id} moved past {} concurrently",
                    mission.progress
                ))
            })?;

        let completed = updated.status == MissionStatus::Completed;
        if completed {
            if let Some(robot_id) = updated.robot_id {
                if tx.get_robot(robot_id)?.is_some() {
                    tx.transition_robot(robot_id, RobotEvent::MissionReleased)?;
                    debug!(mission_id = %mission_id, robot_id = %robot_id, "Robot released");
                } else {
                    debug!(mission_id = %mission_id, robot_id = %robot_id, "Assigned robot no longer registered");
                }
            }
        }

        tx.commit()?;

        info!(
            mission_id = %mission_id,
            progress = updated.progress,
            completed,
            "Mission progress advanced"
        );
        Ok(ProgressReport {
            mission_id,
            progress: updated.progress,
            completed,
        })
    }
}
