use crate::config::VehicleParams;
use crate::control::{Controller, NoneController, PdController};
use crate::observer::{LogObserver, Observer};
use crate::physics::{NoneBackend, PhysicsBackend, RigidBodyBackend};
use crate::{ConfigError, State};
use std::collections::HashMap;

/// What a backend factory gets to build the fleet's physics.
#[derive(Clone, Copy, Debug)]
pub struct BackendContext<'a> {
    pub dt: f32,
    pub vehicle: &'a VehicleParams,
    /// Initial state of every robot, in fleet order.
    pub initial: &'a [State],
}

pub type ControllerFactory = Box<dyn Fn(&VehicleParams) -> Box<dyn Controller> + Send + Sync>;
pub type BackendFactory =
    Box<dyn Fn(&BackendContext<'_>) -> Result<Box<dyn PhysicsBackend>, ConfigError> + Send + Sync>;
pub type ObserverFactory =
    Box<dyn Fn(&toml::Table) -> Result<Box<dyn Observer>, ConfigError> + Send + Sync>;

/// Named plugin factories, resolved once when the server is built.
///
/// [`PluginRegistry::default`] knows the built-in plugins. Registering under an
/// existing name replaces the previous factory.
pub struct PluginRegistry {
    controllers: HashMap<String, ControllerFactory>,
    backends: HashMap<String, BackendFactory>,
    observers: HashMap<String, ObserverFactory>,
}

impl PluginRegistry {
    /// A registry without any plugin.
    pub fn empty() -> Self {
        Self {
            controllers: HashMap::new(),
            backends: HashMap::new(),
            observers: HashMap::new(),
        }
    }

    pub fn register_controller<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&VehicleParams) -> Box<dyn Controller> + Send + Sync + 'static,
    {
        self.controllers.insert(name.into(), Box::new(factory));
    }

    pub fn register_backend<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&BackendContext<'_>) -> Result<Box<dyn PhysicsBackend>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.backends.insert(name.into(), Box::new(factory));
    }

    pub fn register_observer<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&toml::Table) -> Result<Box<dyn Observer>, ConfigError> + Send + Sync + 'static,
    {
        self.observers.insert(name.into(), Box::new(factory));
    }

    /// Build one controller instance. Call once per robot.
    pub fn controller(
        &self,
        name: &str,
        vehicle: &VehicleParams,
    ) -> Result<Box<dyn Controller>, ConfigError> {
        let factory = self
            .controllers
            .get(name)
            .ok_or_else(|| ConfigError::UnknownController(name.to_owned()))?;
        Ok(factory(vehicle))
    }

    pub fn backend(
        &self,
        name: &str,
        context: &BackendContext<'_>,
    ) -> Result<Box<dyn PhysicsBackend>, ConfigError> {
        let factory = self
            .backends
            .get(name)
            .ok_or_else(|| ConfigError::UnknownBackend(name.to_owned()))?;
        factory(context)
    }

    pub fn observer(
        &self,
        name: &str,
        params: &toml::Table,
    ) -> Result<Box<dyn Observer>, ConfigError> {
        let factory = self
            .observers
            .get(name)
            .ok_or_else(|| ConfigError::UnknownObserver(name.to_owned()))?;
        factory(params)
    }

    pub fn has_controller(&self, name: &str) -> bool {
        self.controllers.contains_key(name)
    }

    /// List all registered controller names.
    pub fn controller_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.controllers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn backend_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.backends.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();

        registry.register_controller("none", |_| Box::new(NoneController));
        registry.register_controller("pd", |vehicle| Box::new(PdController::new(vehicle)));

        registry.register_backend("none", |context| Ok(Box::new(NoneBackend::new(context.dt))));
        registry.register_backend("rigid_body", |context| {
            let backend =
                RigidBodyBackend::new(context.dt, context.vehicle, context.initial.to_vec())
                    .map_err(|e| ConfigError::Invalid {
                        field: "vehicle.inertia",
                        reason: e.to_string(),
                    })?;
            Ok(Box::new(backend))
        });

        registry.register_observer("log", |params| {
            let every = match params.get("every") {
                None => 100,
                Some(value) => value
                    .as_integer()
                    .filter(|every| *every > 0)
                    .ok_or_else(|| ConfigError::Invalid {
                        field: "sim.observers.log.every",
                        reason: format!("expected a positive integer, got {value}"),
                    })? as u64,
            };
            Ok(Box::new(LogObserver::new(every)))
        });

        registry
    }
}
