//! Test utilities for cross-crate fleet scenarios

use chrono::{DateTime, Utc};
use robofleet_core::{
    FleetConfig, Mission, MissionId, NewMission, NewRobot, Robot, RobotId, RobotStatus,
    TelemetryUpdate,
};
use robofleet_orchestrator::FleetOrchestrator;
use robofleet_registry::{FleetStore, MissionRegistry, RobotRegistry};
use std::path::PathBuf;

/// A fleet database in a temp file, removed on drop
pub struct TestFleet {
    pub config: FleetConfig,
    path: PathBuf,
}

impl TestFleet {
    pub fn new() -> Self {
        robofleet_core::logging::init_for_tests();

        let path = std::env::temp_dir().join(format!("test_fleet_{}.db", uuid::Uuid::new_v4()));
        let mut config = FleetConfig::default();
        config.store.path = path.clone();
        config.simulation.step_delay_secs = 0;

        Self { config, path }
    }

    /// Fresh connection to the shared database
    pub fn store(&self) -> FleetStore {
        FleetStore::open(&self.config.store).unwrap()
    }

    pub fn orchestrator(&self) -> FleetOrchestrator {
        FleetOrchestrator::open(&self.config).unwrap()
    }

    /// Register a robot and bring it IDLE through a telemetry report
    pub fn idle_robot(&self, name: &str) -> Robot {
        let mut fleet = self.orchestrator();
        let robot = fleet
            .register_robot(NewRobot::new(name, format!("SN-{name}")))
            .unwrap();
        fleet
            .record_telemetry(
                robot.id,
                &TelemetryUpdate {
                    status: Some(RobotStatus::Idle),
                    battery_level: Some(90.0),
                    ..Default::default()
                },
            )
            .unwrap();
        self.robot(robot.id)
    }

    pub fn due_mission(&self, name: &str, scheduled_at: DateTime<Utc>) -> Mission {
        self.orchestrator()
            .create_mission(NewMission::new(name).scheduled_at(scheduled_at))
            .unwrap()
    }

    pub fn robot(&self, id: RobotId) -> Robot {
        let mut store = self.store();
        let tx = store.begin().unwrap();
        tx.get_robot(id).unwrap().unwrap()
    }

    pub fn mission(&self, id: MissionId) -> Mission {
        let mut store = self.store();
        let tx = store.begin().unwrap();
        tx.get_mission(id).unwrap().unwrap()
    }
}

impl Default for TestFleet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestFleet {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            std::fs::remove_file(file).ok();
        }
    }
}
