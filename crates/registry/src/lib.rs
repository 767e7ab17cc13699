//! Robot and mission registries for Robofleet.
//!
//! Records live in a single SQLite database shared by every worker process.
//! All reads and writes happen inside a [`FleetTransaction`]; the
//! [`RobotRegistry`] and [`MissionRegistry`] traits are implemented on it so
//! one scope can touch both registries atomically.

pub mod error;
pub mod missions;
pub mod robots;
pub mod store;

pub use error::{RegistryError, Result};
pub use missions::{MissionPatch, MissionQuery, MissionRegistry};
pub use robots::{RobotPatch, RobotQuery, RobotRegistry};
pub use store::{FleetStore, FleetTransaction, Scan, SkippedRow};
