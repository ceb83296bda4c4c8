//! # fleet-flight
//! Command dispatch and fixed-step simulation for a fleet of quadrotors.
//!
//! # Commands
//! A [`Command`] targets one robot by name or the whole fleet, optionally
//! filtered by a [`GroupMask`]. The [`CommandRouter`](router::CommandRouter)
//! applies it to each robot's [`MotionState`](mode::MotionState), which turns it
//! into a time-varying [`Setpoint`].
//!
//! # Simulation
//! [`StepLoop`](step::StepLoop) advances the fleet one step at a time: sample
//! setpoints, run every robot's [`Controller`](control::Controller), advance the
//! [`PhysicsBackend`](physics::PhysicsBackend) once, commit, notify
//! [`Observer`](observer::Observer)s.
//!
//! [`Server`] ties it together from a [`Config`](config::Config) and a
//! [`PluginRegistry`](plugin::PluginRegistry); [`scheduler`] drives it.
//!
//! ```
//! use fleet_flight::{config::RobotSpec, Command, GroupMask, Server};
//! use nalgebra::Vector3;
//!
//! let robots = vec![RobotSpec {
//!     name: "cf1".into(),
//!     initial_position: Vector3::zeros(),
//!     group_mask: GroupMask::ALL,
//!     enabled: true,
//! }];
//! let mut server = Server::with_builtins(robots, "none", "none", 0.01).unwrap();
//!
//! server.dispatch(&Command::takeoff(1.0, 2.0)).unwrap();
//! for _ in 0..300 {
//!     server.step().unwrap();
//! }
//! assert!((server.robot("cf1").unwrap().state().position.z - 1.0).abs() < 1e-5);
//! ```

mod command;
pub use command::{Command, CommandKind, Target};

pub mod config;

pub mod control;

mod error;
pub use error::{BackendFailure, CommandError, ConfigError, StepError};

mod group;
pub use group::{GroupMask, GroupMaskRegistry};

pub mod mode;

pub mod observer;

pub mod physics;

pub mod plugin;

mod robot;
pub use robot::{Robot, RobotId};

pub mod router;

pub mod scheduler;

mod server;
pub use server::Server;

mod state;
pub use state::{shortest_angle, wrap_pi, Setpoint, State};

pub mod step;

pub mod trajectory;
