use crate::config::{Config, FleetConfigProvider, RobotSpec, VehicleParams};
use crate::control::Controller;
use crate::observer::Observer;
use crate::physics::PhysicsBackend;
use crate::plugin::{BackendContext, PluginRegistry};
use crate::router::{CommandRouter, DispatchReport};
use crate::step::StepLoop;
use crate::{Command, CommandError, ConfigError, Robot, RobotId, State, StepError};
use std::time::Duration;

/// The simulated fleet: every robot plus the router and step loop acting on them.
///
/// Commands and steps both take `&mut self`, so a command always lands
/// between two steps.
pub struct Server {
    robots: Vec<Robot>,
    router: CommandRouter,
    step_loop: StepLoop,
    max_dt: Duration,
}

impl Server {
    /// Build the fleet from a validated configuration, resolving every plugin
    /// name through `plugins`.
    pub fn from_config(config: &Config, plugins: &PluginRegistry) -> Result<Self, ConfigError> {
        config.validate()?;
        let specs = config.robots()?;

        let initial: Vec<State> = specs
            .iter()
            .map(|spec| State::at_rest(spec.initial_position))
            .collect();
        let backend = plugins.backend(
            &config.sim.backend,
            &BackendContext {
                dt: config.sim.dt,
                vehicle: &config.vehicle,
                initial: &initial,
            },
        )?;

        let mut server = Self::from_parts(specs, backend, |_| {
            plugins.controller(&config.sim.controller, &config.vehicle)
        })?;

        for (name, observer) in &config.sim.observers {
            if !observer.enabled {
                continue;
            }
            server.add_observer(plugins.observer(name, &observer.params)?);
        }
        server.max_dt = Duration::from_secs_f32(config.sim.max_dt);

        log::info!(
            "fleet of {} robot(s), backend {}, controller {}, dt {} s",
            server.robots.len(),
            config.sim.backend,
            config.sim.controller,
            config.sim.dt
        );
        Ok(server)
    }

    /// Build the fleet from an explicit robot list and backend. `controller`
    /// is called once per robot.
    pub fn from_parts<F>(
        specs: Vec<RobotSpec>,
        backend: Box<dyn PhysicsBackend>,
        mut controller: F,
    ) -> Result<Self, ConfigError>
    where
        F: FnMut(&RobotSpec) -> Result<Box<dyn Controller>, ConfigError>,
    {
        if specs.is_empty() {
            return Err(ConfigError::NoRobots);
        }

        let mut router = CommandRouter::new();
        let mut robots = Vec::with_capacity(specs.len());
        for spec in &specs {
            if spec.name.trim().is_empty() {
                return Err(ConfigError::EmptyName);
            }
            if router.resolve(&spec.name).is_some() {
                return Err(ConfigError::DuplicateRobot(spec.name.clone()));
            }

            let id = router.register(spec.name.clone(), spec.group_mask);
            let mut robot =
                Robot::new(id, spec.name.clone(), spec.initial_position, controller(spec)?);
            robot.enabled = spec.enabled;
            robots.push(robot);
        }

        Ok(Self {
            robots,
            router,
            step_loop: StepLoop::new(backend),
            max_dt: Duration::ZERO,
        })
    }

    /// Build a fleet with the default vehicle and the built-in plugins.
    pub fn with_builtins(
        specs: Vec<RobotSpec>,
        backend: &str,
        controller: &str,
        dt: f32,
    ) -> Result<Self, ConfigError> {
        let plugins = PluginRegistry::default();
        let vehicle = VehicleParams::default();
        let initial: Vec<State> = specs
            .iter()
            .map(|spec| State::at_rest(spec.initial_position))
            .collect();
        let backend = plugins.backend(
            backend,
            &BackendContext {
                dt,
                vehicle: &vehicle,
                initial: &initial,
            },
        )?;
        Self::from_parts(specs, backend, |_| plugins.controller(controller, &vehicle))
    }

    pub fn add_observer(&mut self, observer: Box<dyn Observer>) {
        self.step_loop.add_observer(observer);
    }

    /// Apply a command at the current simulation time.
    pub fn dispatch(&mut self, command: &Command) -> Result<DispatchReport, CommandError> {
        let now = self.step_loop.now();
        self.router.dispatch(&mut self.robots, now, command)
    }

    pub fn step(&mut self) -> Result<f32, StepError> {
        self.step_loop.step(&mut self.robots).map_err(|e| {
            log::error!("step failed: {e}");
            e
        })
    }

    /// Current simulation time in seconds.
    pub fn now(&self) -> f32 {
        self.step_loop.now()
    }

    /// Minimum wall-clock period between steps.
    pub fn max_dt(&self) -> Duration {
        self.max_dt
    }

    pub fn robots(&self) -> &[Robot] {
        &self.robots
    }

    pub fn robot(&self, name: &str) -> Option<&Robot> {
        self.router.resolve(name).and_then(|RobotId(index)| self.robots.get(index))
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut CommandRouter {
        &mut self.router
    }

    pub fn shutdown(&mut self) {
        log::info!("shutting down at t={:.3}", self.now());
        self.step_loop.shutdown();
    }
}
