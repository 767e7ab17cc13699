//! Mission Dispatcher
//!
//! Periodic reconciler over due missions (PENDING or ASSIGNED with
//! `scheduled_at <= now`), in schedule order. A pending mission is given the
//! first IDLE robot; an assigned mission is started and its robot set ACTIVE.
//! An assigned mission whose robot record is gone is started on its own.
//!
//! Each mission runs in its own savepoint. A robot is claimed with a
//! conditional `IDLE -> ACTIVE` update, so a robot can back at most one
//! mission; if the claim loses, the mission's writes are discarded and it
//! stays PENDING for the next pass.

use chrono::{DateTime, Utc};
use robofleet_core::{Error, Mission, MissionStatus, RobotEvent, RobotStatus};
use robofleet_registry::{
    FleetStore, FleetTransaction, MissionQuery, MissionRegistry, RobotQuery, RobotRegistry,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{FleetError, Result};

/// Counters for one dispatch pass
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchReport {
    /// Due missions examined
    pub processed: usize,
    /// Missions moved to IN_PROGRESS
    pub started: usize,
    /// Pending missions given an idle robot
    pub auto_assigned: usize,
    /// Missions left unchanged because of a conflict
    pub skipped: usize,
}

/// What happened to one mission
#[derive(Debug, Default)]
struct Step {
    assigned: bool,
    started: bool,
}

/// Assigns idle robots to due missions and starts them
#[derive(Debug, Clone, Default)]
pub struct MissionDispatcher;

impl MissionDispatcher {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, store: &mut FleetStore) -> Result<DispatchReport> {
        self.run_at(store, Utc::now())
    }

    /// Run one pass as of `now`
    pub fn run_at(&self, store: &mut FleetStore, now: DateTime<Utc>) -> Result<DispatchReport> {
        let tx = store.begin_at(now)?;

        let scan = tx.scan_missions(&MissionQuery::due(now))?;
        let mut report = DispatchReport {
            skipped: scan.skipped.len(),
            ..Default::default()
        };
        for row in &scan.skipped {
            warn!(mission_id = %row.id, reason = %row.reason, "Skipping unreadable mission record");
        }

        for mission in scan.records {
            report.processed += 1;
            let mission_id = mission.id;

            match tx.savepoint("dispatch_mission", |tx| dispatch_one(tx, mission)) {
                Ok(step) => {
                    report.auto_assigned += usize::from(step.assigned);
                    report.started += usize::from(step.started);
                }
                Err(err) => {
                    warn!(mission_id = %mission_id, error = %err, "Mission left unchanged this pass");
                    report.skipped += 1;
                }
            }
        }

        tx.commit()?;

        info!(
            processed = report.processed,
            started = report.started,
            auto_assigned = report.auto_assigned,
            skipped = report.skipped,
            "Mission dispatch complete"
        );
        Ok(report)
    }
}

fn dispatch_one(tx: &FleetTransaction<'_>, mut mission: Mission) -> Result<Step> {
    let mut step = Step::default();
    let mut claimed = false;

    if mission.status == MissionStatus::Pending {
        // Sees robots this pass already claimed, so they are not offered twice
        let idle = tx.scan_robots(&RobotQuery::with_status(RobotStatus::Idle))?;
        let Some(robot) = idle.records.into_iter().next() else {
            debug!(mission_id = %mission.id, "No idle robot for pending mission");
            return Ok(step);
        };

        mission = tx.assign_mission(mission.id, robot.id)?;
        tx.transition_robot_if(robot.id, RobotStatus::Idle, RobotEvent::MissionStarted)?
            .ok_or_else(|| {
                FleetError::Core(Error::TransientConflict(format!(
                    "robot {} was claimed by another mission",
                    robot.id
                )))
            })?;
        claimed = true;
        step.assigned = true;
        debug!(mission_id = %mission.id, robot_id = %robot.id, "Mission auto-assigned");
    }

    if mission.status == MissionStatus::Assigned {
        let Some(robot_id) = mission.robot_id else {
            return Ok(step);
        };

        if !claimed {
            match tx.get_robot(robot_id)? {
                Some(robot) => {
                    tx.transition_robot_if(robot.id, robot.status, RobotEvent::MissionStarted)?
                        .ok_or_else(|| {
                            FleetError::Core(Error::TransientConflict(format!(
                                "robot {} changed status before mission start",
                                robot.id
                            )))
                        })?;
                }
                None => {
                    warn!(mission_id = %mission.id, robot_id = %robot_id, "Assigned robot missing; starting mission without it");
                }
            }
        }

        tx.start_mission(mission.id)?;
        step.started = true;
        debug!(mission_id = %mission.id, robot_id = %robot_id, "Mission started");
    }

    Ok(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{due_mission, load_mission, load_robot, robot};
    use chrono::Duration;

    fn earlier(minutes: i64) -> DateTime<Utc> {
        Utc::now() - Duration::minutes(minutes)
    }

    #[test]
    fn test_pending_mission_assigned_and_started() {
        let mut store = FleetStore::open_in_memory().unwrap();
        let r = robot(&mut store, "R1", RobotStatus::Idle);
        let m = due_mission(&mut store, "M1", earlier(1));

        let report = MissionDispatcher::new().run(&mut store).unwrap();

        assert_eq!(
            report,
            DispatchReport {
                processed: 1,
                started: 1,
                auto_assigned: 1,
                skipped: 0,
            }
        );
        let mission = load_mission(&mut store, m.id);
        assert_eq!(mission.status, MissionStatus::InProgress);
        assert_eq!(mission.robot_id, Some(r.id));
        assert!(mission.started_at.is_some());
        assert_eq!(load_robot(&mut store, r.id).status, RobotStatus::Active);
    }

    #[test]
    fn test_one_idle_robot_two_missions() {
        let mut store = FleetStore::open_in_memory().unwrap();
        let r = robot(&mut store, "R1", RobotStatus::Idle);
        let first = due_mission(&mut store, "M1", earlier(2));
        let second = due_mission(&mut store, "M2", earlier(1));

        let report = MissionDispatcher::new().run(&mut store).unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.auto_assigned, 1);
        assert_eq!(report.started, 1);

        let first = load_mission(&mut store, first.id);
        let second = load_mission(&mut store, second.id);
        assert_eq!(first.robot_id, Some(r.id));
        assert_eq!(second.status, MissionStatus::Pending);
        assert_eq!(second.robot_id, None);
    }

    #[test]
    fn test_no_idle_robot_leaves_mission_pending() {
        let mut store = FleetStore::open_in_memory().unwrap();
        robot(&mut store, "R1", RobotStatus::Charging);
        let m = due_mission(&mut store, "M1", earlier(1));

        let report = MissionDispatcher::new().run(&mut store).unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.auto_assigned, 0);
        assert_eq!(report.skipped, 0);
        assert_eq!(load_mission(&mut store, m.id).status, MissionStatus::Pending);
    }

    #[test]
    fn test_future_and_unscheduled_missions_ignored() {
        let mut store = FleetStore::open_in_memory().unwrap();
        robot(&mut store, "R1", RobotStatus::Idle);
        due_mission(&mut store, "M1", Utc::now() + Duration::hours(1));

        let report = MissionDispatcher::new().run(&mut store).unwrap();
        assert_eq!(report, DispatchReport::default());
    }

    #[test]
    fn test_preassigned_mission_started_on_active_robot() {
        let mut store = FleetStore::open_in_memory().unwrap();
        let r = robot(&mut store, "R1", RobotStatus::Active);
        let m = due_mission(&mut store, "M1", earlier(1));
        {
            let tx = store.begin().unwrap();
            tx.assign_mission(m.id, r.id).unwrap();
            tx.commit().unwrap();
        }

        let report = MissionDispatcher::new().run(&mut store).unwrap();

        assert_eq!(report.started, 1);
        assert_eq!(report.auto_assigned, 0);
        assert_eq!(load_mission(&mut store, m.id).status, MissionStatus::InProgress);
    }

    #[test]
    fn test_preassigned_mission_started_whatever_robot_status() {
        for status in [
            RobotStatus::Offline,
            RobotStatus::Charging,
            RobotStatus::Maintenance,
        ] {
            let mut store = FleetStore::open_in_memory().unwrap();
            let r = robot(&mut store, "R1", status);
            let m = due_mission(&mut store, "M1", earlier(1));
            {
                let tx = store.begin().unwrap();
                tx.assign_mission(m.id, r.id).unwrap();
                tx.commit().unwrap();
            }

            let report = MissionDispatcher::new().run(&mut store).unwrap();
            assert_eq!(
                report,
                DispatchReport {
                    processed: 1,
                    started: 1,
                    auto_assigned: 0,
                    skipped: 0,
                }
            );
            let mission = load_mission(&mut store, m.id);
            assert_eq!(mission.status, MissionStatus::InProgress);
            assert!(mission.started_at.is_some());
            assert_eq!(load_robot(&mut store, r.id).status, RobotStatus::Active);

            // Started missions are no longer due
            let again = MissionDispatcher::new().run(&mut store).unwrap();
            assert_eq!(again, DispatchReport::default());
        }
    }

    #[test]
    fn test_preassigned_mission_with_missing_robot_started() {
        let mut store = FleetStore::open_in_memory().unwrap();
        let m = due_mission(&mut store, "M1", earlier(1));
        let gone = uuid::Uuid::new_v4();
        {
            let tx = store.begin().unwrap();
            tx.assign_mission(m.id, gone).unwrap();
            tx.commit().unwrap();
        }

        let report = MissionDispatcher::new().run(&mut store).unwrap();

        assert_eq!(report.started, 1);
        assert_eq!(report.skipped, 0);
        let mission = load_mission(&mut store, m.id);
        assert_eq!(mission.status, MissionStatus::InProgress);
        assert_eq!(mission.robot_id, Some(gone));
        let tx = store.begin().unwrap();
        assert!(tx.get_robot(gone).unwrap().is_none());
    }

    #[test]
    fn test_repeat_pass_is_a_no_op() {
        let mut store = FleetStore::open_in_memory().unwrap();
        robot(&mut store, "R1", RobotStatus::Idle);
        due_mission(&mut store, "M1", earlier(1));

        MissionDispatcher::new().run(&mut store).unwrap();
        let second = MissionDispatcher::new().run(&mut store).unwrap();
        assert_eq!(second, DispatchReport::default());
    }
}
