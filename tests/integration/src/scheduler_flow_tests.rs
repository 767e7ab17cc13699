//! End-to-end flows through the task scheduler

use crate::test_utils::TestFleet;
use chrono::Utc;
use robofleet_core::{MissionStatus, RobotStatus};
use robofleet_orchestrator::{FleetOrchestrator, Job, TaskSubmitter};
use robofleet_scheduler::{LocalScheduler, TaskStatus};
use std::time::Duration;

async fn wait_for_status(fleet: &TestFleet, mission_id: uuid::Uuid, status: MissionStatus) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        if fleet.mission(mission_id).status == status {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dispatch_then_simulate_until_complete() {
    let fleet = TestFleet::new();
    let robot = fleet.idle_robot("R1");
    let mission = fleet.due_mission("Delivery Mission", Utc::now());
    let scheduler = LocalScheduler::new(fleet.config.clone()).unwrap();

    let dispatch = scheduler
        .submit(Job::ProcessScheduled, Duration::ZERO)
        .unwrap();
    match scheduler.wait(&dispatch, Duration::from_secs(5)).await {
        TaskStatus::Success { result } => {
            assert_eq!(result["processed"], 1);
            assert_eq!(result["auto_assigned"], 1);
            assert_eq!(result["started"], 1);
        }
        other => panic!("dispatch did not succeed: {other:?}"),
    }
    assert_eq!(fleet.robot(robot.id).status, RobotStatus::Active);

    scheduler
        .submit(
            Job::SimulateUntilComplete {
                mission_id: mission.id,
            },
            Duration::ZERO,
        )
        .unwrap();
    assert!(wait_for_status(&fleet, mission.id, MissionStatus::Completed).await);

    let done = fleet.mission(mission.id);
    assert_eq!(done.progress, 100.0);
    assert!(done.completed_at.is_some());
    assert_eq!(fleet.robot(robot.id).status, RobotStatus::Idle);

    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_periodic_dispatch_picks_up_new_missions() {
    let fleet = TestFleet::new();
    fleet.idle_robot("R1");
    let scheduler = LocalScheduler::new(fleet.config.clone()).unwrap();
    scheduler.spawn_periodic(Job::ProcessScheduled, Duration::from_millis(50));

    let mission = fleet.due_mission("Inspection", Utc::now());
    assert!(wait_for_status(&fleet, mission.id, MissionStatus::InProgress).await);

    scheduler.shutdown().await;
    assert!(scheduler.submit(Job::HealthCheck, Duration::ZERO).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_schedule_mission_start_with_delay() {
    let fleet = TestFleet::new();
    fleet.idle_robot("R1");
    let mission = fleet.due_mission("Survey", Utc::now());
    fleet.orchestrator().run_mission_dispatch().unwrap();

    let scheduler = LocalScheduler::new(fleet.config.clone()).unwrap();
    let fleet_ops: FleetOrchestrator = fleet.orchestrator();
    let report = fleet_ops
        .schedule_mission_start(mission.id, 1, &scheduler)
        .unwrap();
    assert!(report.scheduled);
    assert_eq!(report.delay, 1);

    // Nothing happens before the delay elapses
    assert_eq!(fleet.mission(mission.id).progress, 0.0);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while fleet.mission(mission.id).progress == 0.0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(fleet.mission(mission.id).progress, 25.0);

    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_send_command_job() {
    let fleet = TestFleet::new();
    let robot = fleet.idle_robot("R2");
    let scheduler = LocalScheduler::new(fleet.config.clone()).unwrap();

    let handle = scheduler
        .submit(
            Job::SendCommand {
                robot_id: robot.id,
                command: "start_charging".to_string(),
                payload: Some(serde_json::json!({ "dock": 3 })),
            },
            Duration::ZERO,
        )
        .unwrap();

    match scheduler.wait(&handle, Duration::from_secs(5)).await {
        TaskStatus::Success { result } => {
            assert_eq!(result["success"], true);
            assert_eq!(result["message"], "Robot R2 started charging");
        }
        other => panic!("command did not succeed: {other:?}"),
    }
    assert_eq!(fleet.robot(robot.id).status, RobotStatus::Charging);
}
