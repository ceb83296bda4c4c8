use crate::{BackendFailure, Setpoint, State};
use nalgebra::Vector3;

mod pd;
pub use pd::PdController;

/// Low level command for one robot: collective thrust along the body z axis
/// (N) and body torque (N·m).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Action {
    pub thrust: f32,
    pub torque: Vector3<f32>,
}

/// Maps the measured and desired state of one robot to an [`Action`].
///
/// Every robot owns its own instance, so implementations may keep integrator
/// or filter state between calls.
pub trait Controller: Send {
    fn compute(&mut self, state: &State, desired: &Setpoint) -> Result<Action, BackendFailure>;
}

/// Outputs nothing. Pairs with backends that follow the setpoint directly.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoneController;

impl Controller for NoneController {
    fn compute(&mut self, _state: &State, _desired: &Setpoint) -> Result<Action, BackendFailure> {
        Ok(Action::default())
    }
}

// From `t_rise` and `delta` returns kp and kd
fn pid_config(t_rise: f32, delta: f32) -> (f32, f32) {
    let w = 1. / (1.57 * t_rise);
    (w * w, 2. * delta * w)
}
