use crate::control::Action;
use crate::{BackendFailure, Setpoint, State};

mod rigid_body;
pub use rigid_body::RigidBodyBackend;

/// Advances the true state of the whole fleet and owns the simulation clock.
pub trait PhysicsBackend: Send {
    /// Current simulation time in seconds.
    fn now(&self) -> f32;

    /// Advance every robot by one step. `desired` and `actions` are indexed like
    /// the fleet and the returned states must be too.
    fn step(
        &mut self,
        desired: &[Setpoint],
        actions: &[Action],
    ) -> Result<Vec<State>, BackendFailure>;

    fn shutdown(&mut self) {}
}

/// Fixed-step simulation clock.
///
/// Time is derived from an integer tick count so it never accumulates rounding error.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimClock {
    dt: f64,
    ticks: u64,
}

impl SimClock {
    pub fn new(dt: f32) -> Self {
        Self {
            dt: dt as f64,
            ticks: 0,
        }
    }

    pub fn dt(&self) -> f32 {
        self.dt as f32
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn now(&self) -> f32 {
        (self.ticks as f64 * self.dt) as f32
    }

    pub fn tick(&mut self) {
        self.ticks += 1;
    }
}

/// Moves every robot exactly onto its setpoint.
#[derive(Clone, Debug)]
pub struct NoneBackend {
    clock: SimClock,
}

impl NoneBackend {
    pub fn new(dt: f32) -> Self {
        Self {
            clock: SimClock::new(dt),
        }
    }
}

impl PhysicsBackend for NoneBackend {
    fn now(&self) -> f32 {
        self.clock.now()
    }

    fn step(
        &mut self,
        desired: &[Setpoint],
        _actions: &[Action],
    ) -> Result<Vec<State>, BackendFailure> {
        self.clock.tick();
        Ok(desired.iter().map(Setpoint::to_state).collect())
    }
}
