//! Concurrent reconcilers on separate connections to one database

use crate::test_utils::TestFleet;
use chrono::{Duration, Utc};
use robofleet_core::{ErrorKind, MissionStatus, RobotStatus};
use robofleet_orchestrator::{MissionDispatcher, MissionProgressSimulator};
use robofleet_registry::{MissionQuery, MissionRegistry};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_concurrent_dispatch_never_shares_a_robot() {
    let fleet = TestFleet::new();
    let robots: Vec<_> = (0..3).map(|i| fleet.idle_robot(&format!("R{i}"))).collect();
    for i in 0..8 {
        fleet.due_mission(&format!("M{i}"), Utc::now() - Duration::minutes(10 - i));
    }

    let passes = 4;
    let barrier = Arc::new(Barrier::new(passes));
    let handles: Vec<_> = (0..passes)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let mut store = fleet.store();
            thread::spawn(move || {
                barrier.wait();
                MissionDispatcher::new().run(&mut store).unwrap()
            })
        })
        .collect();

    let reports: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let auto_assigned: usize = reports.iter().map(|r| r.auto_assigned).sum();
    let started: usize = reports.iter().map(|r| r.started).sum();
    assert_eq!(auto_assigned, robots.len());
    assert_eq!(started, robots.len());

    let mut store = fleet.store();
    let tx = store.begin().unwrap();
    let running = tx
        .scan_missions(&MissionQuery::with_status(MissionStatus::InProgress))
        .unwrap()
        .records;
    let pending = tx
        .scan_missions(&MissionQuery::with_status(MissionStatus::Pending))
        .unwrap()
        .records;
    drop(tx);

    let assigned: HashSet<_> = running.iter().filter_map(|m| m.robot_id).collect();
    assert_eq!(running.len(), robots.len());
    assert_eq!(assigned.len(), robots.len());
    assert_eq!(pending.len(), 5);
    assert!(pending.iter().all(|m| m.robot_id.is_none()));

    for robot in &robots {
        assert_eq!(fleet.robot(robot.id).status, RobotStatus::Active);
    }
}

#[test]
fn test_concurrent_progress_steps_never_double_count() {
    let fleet = TestFleet::new();
    let robot = fleet.idle_robot("R1");
    let mission = fleet.due_mission("M1", Utc::now() - Duration::minutes(1));
    fleet.orchestrator().run_mission_dispatch().unwrap();

    let steps = 6;
    let barrier = Arc::new(Barrier::new(steps));
    let handles: Vec<_> = (0..steps)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let mut store = fleet.store();
            let mission_id = mission.id;
            thread::spawn(move || {
                barrier.wait();
                MissionProgressSimulator::default().advance(&mut store, mission_id)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let succeeded: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(succeeded.len(), 4);
    assert_eq!(succeeded.iter().filter(|r| r.completed).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    let mission = fleet.mission(mission.id);
    assert_eq!(mission.progress, 100.0);
    assert_eq!(mission.status, MissionStatus::Completed);
    assert!(mission.completed_at.is_some());
    assert_eq!(fleet.robot(robot.id).status, RobotStatus::Idle);
}

#[test]
fn test_stale_robot_recovers_on_telemetry() {
    let fleet = TestFleet::new();
    let robot = fleet.idle_robot("R1");

    let mut store = fleet.store();
    let health = thread::spawn(move || {
        robofleet_orchestrator::FleetHealthMonitor::new(Duration::minutes(5), 20.0)
            .run_at(&mut store, Utc::now() + Duration::minutes(6))
            .unwrap()
    });
    let report = health.join().unwrap();
    assert_eq!(report.marked_offline, 1);
    assert_eq!(fleet.robot(robot.id).status, RobotStatus::Offline);

    // A fresh report brings the robot back
    fleet
        .orchestrator()
        .record_telemetry(
            robot.id,
            &robofleet_core::TelemetryUpdate {
                status: Some(RobotStatus::Idle),
                ..Default::default()
            },
        )
        .unwrap();
    let report = fleet.orchestrator().run_fleet_health_check().unwrap();
    assert_eq!(report.marked_offline, 0);
    assert_eq!(report.online, 1);
}
