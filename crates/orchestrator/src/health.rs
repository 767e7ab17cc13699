//! Fleet Health Monitor
//!
//! Periodic reconciler. Robots that have not been updated within the
//! staleness window are marked OFFLINE; everything else is read-only
//! statistics. Robots already OFFLINE or under MAINTENANCE are never touched.

use chrono::{DateTime, Duration, Utc};
use robofleet_core::{HealthConfig, Robot, RobotEvent, RobotStatus};
use robofleet_registry::{FleetStore, FleetTransaction, RobotQuery, RobotRegistry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{FleetError, Result};

/// Fleet statistics for one health pass
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FleetHealthReport {
    pub total: usize,
    /// Any status other than OFFLINE
    pub online: usize,
    pub offline: usize,
    pub low_battery: usize,
    /// Robots this pass moved to OFFLINE
    pub marked_offline: usize,
    /// Records that could not be read or updated; excluded from the counts above
    pub skipped: usize,
}

/// Marks stale robots offline and aggregates fleet statistics
#[derive(Debug, Clone)]
pub struct FleetHealthMonitor {
    stale_after: Duration,
    low_battery_threshold: f64,
}

impl FleetHealthMonitor {
    pub fn new(stale_after: Duration, low_battery_threshold: f64) -> Self {
        Self {
            stale_after,
            low_battery_threshold,
        }
    }

    pub fn from_config(config: &HealthConfig) -> Self {
        Self::new(config.stale_after(), config.low_battery_threshold)
    }

    /// Run one pass against the current time
    pub fn run(&self, store: &mut FleetStore) -> Result<FleetHealthReport> {
        self.run_at(store, Utc::now())
    }

    /// Run one pass as of `now`; all status changes commit together
    pub fn run_at(&self, store: &mut FleetStore, now: DateTime<Utc>) -> Result<FleetHealthReport> {
        let cutoff = now
            .checked_sub_signed(self.stale_after)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let tx = store.begin_at(now)?;

        let scan = tx.scan_robots(&RobotQuery::all())?;
        let mut report = FleetHealthReport {
            skipped: scan.skipped.len(),
            ..Default::default()
        };
        for row in &scan.skipped {
            warn!(robot_id = %row.id, reason = %row.reason, "Skipping unreadable robot record");
        }

        for robot in scan.records {
            let robot = if needs_offline(&robot, cutoff) {
                match tx.savepoint("health_robot", |tx| mark_offline(tx, &robot)) {
                    Ok(updated) => {
                        report.marked_offline += 1;
                        updated
                    }
                    Err(err) => {
                        warn!(robot_id = %robot.id, error = %err, "Failed to mark robot offline");
                        report.skipped += 1;
                        continue;
                    }
                }
            } else {
                robot
            };

            report.total += 1;
            if robot.status.is_online() {
                report.online += 1;
            } else {
                report.offline += 1;
            }
            if robot.is_low_battery(self.low_battery_threshold) {
                debug!(robot_id = %robot.id, battery = ?robot.battery_level, "Robot battery low");
                report.low_battery += 1;
            }
        }

        tx.commit()?;

        info!(
            total = report.total,
            online = report.online,
            offline = report.offline,
            low_battery = report.low_battery,
            marked_offline = report.marked_offline,
            skipped = report.skipped,
            "Fleet health check complete"
        );
        Ok(report)
    }
}

fn needs_offline(robot: &Robot, cutoff: DateTime<Utc>) -> bool {
    !matches!(robot.status, RobotStatus::Offline | RobotStatus::Maintenance)
        && robot.is_stale(cutoff)
}

fn mark_offline(tx: &FleetTransaction<'_>, robot: &Robot) -> Result<Robot> {
    let updated = tx
        .transition_robot_if(robot.id, robot.status, RobotEvent::HeartbeatLost)?
        .ok_or_else(|| {
            FleetError::Core(robofleet_core::Error::TransientConflict(format!(
                "robot {} left {} before it could be marked offline",
                robot.id, robot.status
            )))
        })?;
    debug!(robot_id = %robot.id, from = %robot.status, last_update = %robot.updated_at, "Robot marked offline");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{load_robot, robot, robot_at, with_battery};

    fn monitor() -> FleetHealthMonitor {
        FleetHealthMonitor::from_config(&HealthConfig::default())
    }

    #[test]
    fn test_stale_robot_marked_offline() {
        let mut store = FleetStore::open_in_memory().unwrap();
        let now = Utc::now();
        let stale = robot_at(&mut store, "R1", RobotStatus::Active, now - Duration::minutes(6));
        let fresh = robot_at(&mut store, "R2", RobotStatus::Active, now - Duration::minutes(4));

        let report = monitor().run_at(&mut store, now).unwrap();

        assert_eq!(report.marked_offline, 1);
        assert_eq!(load_robot(&mut store, stale.id).status, RobotStatus::Offline);
        assert_eq!(load_robot(&mut store, fresh.id).status, RobotStatus::Active);
    }

    #[test]
    fn test_second_run_marks_nothing() {
        let mut store = FleetStore::open_in_memory().unwrap();
        let now = Utc::now();
        robot_at(&mut store, "R1", RobotStatus::Idle, now - Duration::minutes(10));
        robot_at(&mut store, "R2", RobotStatus::Charging, now - Duration::minutes(10));

        let first = monitor().run_at(&mut store, now).unwrap();
        assert_eq!(first.marked_offline, 2);

        let second = monitor().run_at(&mut store, now).unwrap();
        assert_eq!(second.marked_offline, 0);
        assert_eq!(second.offline, 2);
        assert_eq!(second.total, 2);
    }

    #[test]
    fn test_maintenance_and_offline_untouched() {
        let mut store = FleetStore::open_in_memory().unwrap();
        let now = Utc::now();
        let old = now - Duration::hours(1);
        let maintenance = robot_at(&mut store, "R1", RobotStatus::Maintenance, old);
        robot_at(&mut store, "R2", RobotStatus::Offline, old);

        let report = monitor().run_at(&mut store, now).unwrap();

        assert_eq!(report.marked_offline, 0);
        assert_eq!(report.online, 1);
        assert_eq!(report.offline, 1);
        assert_eq!(
            load_robot(&mut store, maintenance.id).status,
            RobotStatus::Maintenance
        );
    }

    #[test]
    fn test_statistics() {
        let mut store = FleetStore::open_in_memory().unwrap();
        let low = robot(&mut store, "R1", RobotStatus::Idle);
        with_battery(&mut store, &low, 15.0);
        let edge = robot(&mut store, "R2", RobotStatus::Active);
        with_battery(&mut store, &edge, 20.0);
        robot(&mut store, "R3", RobotStatus::Offline);

        let report = monitor().run(&mut store).unwrap();

        assert_eq!(
            report,
            FleetHealthReport {
                total: 3,
                online: 2,
                offline: 1,
                low_battery: 1,
                marked_offline: 0,
                skipped: 0,
            }
        );
        // Low battery is a signal only
        assert_eq!(load_robot(&mut store, low.id).status, RobotStatus::Idle);
    }

    #[test]
    fn test_unreadable_record_skipped() {
        let mut store = FleetStore::open_in_memory().unwrap();
        robot(&mut store, "R1", RobotStatus::Idle);
        let broken = robot(&mut store, "R2", RobotStatus::Idle);
        store
            .__test_execute_raw_sql(
                "UPDATE robots SET status = 'flying' WHERE id = ?1",
                &[&broken.id.to_string()],
            )
            .unwrap();

        let report = monitor().run(&mut store).unwrap();

        assert_eq!(report.total, 1);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_window_beyond_calendar_range_marks_nothing() {
        let mut store = FleetStore::open_in_memory().unwrap();
        let now = Utc::now();
        robot_at(&mut store, "R1", RobotStatus::Active, now - Duration::days(3650));

        let report = FleetHealthMonitor::new(Duration::weeks(1_000_000_000), 20.0)
            .run_at(&mut store, now)
            .unwrap();

        assert_eq!(report.marked_offline, 0);
        assert_eq!(report.online, 1);
    }

    #[test]
    fn test_empty_fleet() {
        let mut store = FleetStore::open_in_memory().unwrap();
        let report = monitor().run(&mut store).unwrap();
        assert_eq!(report, FleetHealthReport::default());
    }
}
