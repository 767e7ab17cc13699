//! Record builders shared by the unit tests

use chrono::{DateTime, Utc};
use robofleet_core::{
    Mission, MissionStatus, NewMission, NewRobot, Robot, RobotId, RobotStatus,
};
use robofleet_registry::{FleetStore, MissionRegistry, RobotRegistry};

/// Insert a robot in `status` last touched at `updated_at`
pub fn robot_at(
    store: &mut FleetStore,
    name: &str,
    status: RobotStatus,
    updated_at: DateTime<Utc>,
) -> Robot {
    let mut robot = NewRobot::new(name, format!("SN-{name}")).into_robot(updated_at);
    robot.status = status;
    let tx = store.begin().unwrap();
    tx.insert_robot(&robot).unwrap();
    tx.commit().unwrap();
    robot
}

pub fn robot(store: &mut FleetStore, name: &str, status: RobotStatus) -> Robot {
    robot_at(store, name, status, Utc::now())
}

pub fn with_battery(store: &mut FleetStore, robot: &Robot, level: f64) {
    let patch = robofleet_registry::RobotPatch {
        battery_level: Some(level),
        ..Default::default()
    };
    let tx = store.begin_at(robot.updated_at).unwrap();
    tx.update_robot(robot.id, &patch).unwrap();
    tx.commit().unwrap();
}

/// Insert a pending mission due at `scheduled_at`
pub fn due_mission(store: &mut FleetStore, name: &str, scheduled_at: DateTime<Utc>) -> Mission {
    let tx = store.begin_at(scheduled_at).unwrap();
    let mission = tx
        .create_mission(NewMission::new(name).scheduled_at(scheduled_at))
        .unwrap();
    tx.commit().unwrap();
    mission
}

/// Insert a mission already running on `robot_id` at `progress`
pub fn running_mission(store: &mut FleetStore, robot_id: Option<RobotId>, progress: f64) -> Mission {
    let now = Utc::now();
    let mut mission = NewMission::new("Delivery Mission").into_mission(now);
    mission.status = MissionStatus::InProgress;
    mission.robot_id = robot_id;
    mission.progress = progress;
    mission.started_at = Some(now);
    let tx = store.begin().unwrap();
    tx.insert_mission(&mission).unwrap();
    tx.commit().unwrap();
    mission
}

pub fn load_robot(store: &mut FleetStore, id: RobotId) -> Robot {
    let tx = store.begin().unwrap();
    tx.get_robot(id).unwrap().unwrap()
}

pub fn load_mission(store: &mut FleetStore, id: robofleet_core::MissionId) -> Mission {
    let tx = store.begin().unwrap();
    tx.get_mission(id).unwrap().unwrap()
}
