use crate::{ConfigError, GroupMask};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Robot type name used when a robot does not give one.
pub const DEFAULT_ROBOT_TYPE: &str = "cf21";

/// Connection of robot types that are actually flown. Any other connection
/// describes a virtual object that is not simulated.
pub const CRAZYFLIE_CONNECTION: &str = "crazyflie";

/// Fleet and simulation settings, loaded once at startup.
///
/// ```toml
/// [sim]
/// backend = "rigid_body"
/// controller = "pd"
/// dt = 0.001
///
/// [sim.observers.log]
/// every = 500
///
/// [[robots]]
/// name = "cf1"
/// initial_position = [0.0, 0.0, 0.0]
/// group_mask = 1
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sim: SimConfig,
    #[serde(default)]
    pub vehicle: VehicleParams,
    #[serde(default = "default_robot_types")]
    pub robot_types: BTreeMap<String, RobotType>,
    #[serde(default)]
    pub robots: Vec<RobotConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sim: SimConfig::default(),
            vehicle: VehicleParams::default(),
            robot_types: default_robot_types(),
            robots: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Name of the physics backend plugin.
    pub backend: String,
    /// Name of the controller plugin, instantiated once per robot.
    pub controller: String,
    /// Simulation step in seconds.
    pub dt: f32,
    /// Minimum wall-clock period between steps in seconds. Zero runs as fast as possible.
    pub max_dt: f32,
    pub observers: BTreeMap<String, ObserverConfig>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            backend: "none".into(),
            controller: "pd".into(),
            dt: 0.001,
            max_dt: 0.,
            observers: BTreeMap::new(),
        }
    }
}

/// One `[sim.observers.<name>]` table. Keys other than `enabled` are handed
/// to the observer factory untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverConfig {
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub params: toml::Table,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            params: toml::Table::new(),
        }
    }
}

/// Rigid body parameters shared by every robot. Defaults describe a Crazyflie 2.1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleParams {
    /// Total mass (kg)
    pub mass: f32,
    /// Principal moments of inertia (kg·m²)
    pub inertia: [f32; 3],
    /// Quadratic drag coefficient
    pub drag: f32,
    pub gravity: f32,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            mass: 0.034,
            inertia: [16.6e-6, 16.6e-6, 29.3e-6],
            drag: 0.,
            gravity: 9.81,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotType {
    #[serde(default = "crazyflie")]
    pub connection: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    pub name: String,
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(rename = "type", default = "default_robot_type")]
    pub kind: String,
    #[serde(default)]
    pub initial_position: [f32; 3],
    #[serde(default)]
    pub group_mask: GroupMask,
}

fn enabled() -> bool {
    true
}

fn crazyflie() -> String {
    CRAZYFLIE_CONNECTION.into()
}

fn default_robot_type() -> String {
    DEFAULT_ROBOT_TYPE.into()
}

fn default_robot_types() -> BTreeMap<String, RobotType> {
    BTreeMap::from([(
        DEFAULT_ROBOT_TYPE.to_owned(),
        RobotType {
            connection: crazyflie(),
        },
    )])
}

/// A robot to build at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotSpec {
    pub name: String,
    pub initial_position: Vector3<f32>,
    pub group_mask: GroupMask,
    pub enabled: bool,
}

/// Supplies the ordered fleet once at startup.
pub trait FleetConfigProvider {
    fn robots(&self) -> Result<Vec<RobotSpec>, ConfigError>;
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check everything that can be checked before plugins are resolved.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sim.dt > 0. && self.sim.dt.is_finite()) {
            return Err(invalid("sim.dt", format!("must be positive, got {}", self.sim.dt)));
        }
        if !(self.sim.max_dt >= 0. && self.sim.max_dt.is_finite()) {
            return Err(invalid(
                "sim.max_dt",
                format!("must not be negative, got {}", self.sim.max_dt),
            ));
        }
        if !(self.vehicle.mass > 0.) {
            return Err(invalid(
                "vehicle.mass",
                format!("must be positive, got {}", self.vehicle.mass),
            ));
        }
        if self.vehicle.inertia.iter().any(|i| !(*i > 0.)) {
            return Err(invalid(
                "vehicle.inertia",
                format!("must be positive, got {:?}", self.vehicle.inertia),
            ));
        }
        if self.vehicle.drag < 0. {
            return Err(invalid(
                "vehicle.drag",
                format!("must not be negative, got {}", self.vehicle.drag),
            ));
        }

        let mut names = HashSet::new();
        for robot in &self.robots {
            if robot.name.trim().is_empty() {
                return Err(ConfigError::EmptyName);
            }
            if !names.insert(robot.name.as_str()) {
                return Err(ConfigError::DuplicateRobot(robot.name.clone()));
            }
            if !self.robot_types.contains_key(&robot.kind) {
                return Err(ConfigError::UnknownRobotType {
                    robot: robot.name.clone(),
                    kind: robot.kind.clone(),
                });
            }
        }

        if !self.robots.iter().any(|robot| self.is_flown(robot)) {
            return Err(ConfigError::NoRobots);
        }
        Ok(())
    }

    fn is_flown(&self, robot: &RobotConfig) -> bool {
        robot.enabled
            && self
                .robot_types
                .get(&robot.kind)
                .map_or(false, |kind| kind.connection == CRAZYFLIE_CONNECTION)
    }
}

impl FleetConfigProvider for Config {
    /// Enabled robots whose type is flown, in file order.
    fn robots(&self) -> Result<Vec<RobotSpec>, ConfigError> {
        let mut specs = Vec::with_capacity(self.robots.len());
        for robot in &self.robots {
            let kind = self
                .robot_types
                .get(&robot.kind)
                .ok_or_else(|| ConfigError::UnknownRobotType {
                    robot: robot.name.clone(),
                    kind: robot.kind.clone(),
                })?;

            if !robot.enabled {
                log::debug!("skipping disabled robot {}", robot.name);
                continue;
            }
            if kind.connection != CRAZYFLIE_CONNECTION {
                log::warn!(
                    "skipping {}: connection {} is not simulated",
                    robot.name,
                    kind.connection
                );
                continue;
            }

            specs.push(RobotSpec {
                name: robot.name.clone(),
                initial_position: Vector3::from(robot.initial_position),
                group_mask: robot.group_mask,
                enabled: true,
            });
        }
        Ok(specs)
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}
