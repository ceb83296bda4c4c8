use super::{PhysicsBackend, SimClock};
use crate::config::VehicleParams;
use crate::control::Action;
use crate::{BackendFailure, Setpoint, State};
use nalgebra::{Matrix3, UnitQuaternion, Vector3};

/// Thrust and torque driven rigid body per robot, with a flat ground at z = 0.
#[derive(Clone, Debug)]
pub struct RigidBodyBackend {
    clock: SimClock,
    mass: f32,
    gravity: f32,
    drag_coefficient: f32,
    inertia_matrix: Matrix3<f32>,
    inertia_matrix_inv: Matrix3<f32>,
    states: Vec<State>,
}

impl RigidBodyBackend {
    pub fn new(
        dt: f32,
        vehicle: &VehicleParams,
        initial: Vec<State>,
    ) -> Result<Self, BackendFailure> {
        let inertia_matrix = Matrix3::from_diagonal(&Vector3::from(vehicle.inertia));
        let inertia_matrix_inv = inertia_matrix
            .try_inverse()
            .ok_or_else(|| BackendFailure::new("inertia matrix is not invertible"))?;

        Ok(Self {
            clock: SimClock::new(dt),
            mass: vehicle.mass,
            gravity: vehicle.gravity,
            drag_coefficient: vehicle.drag,
            inertia_matrix,
            inertia_matrix_inv,
            states: initial,
        })
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    fn integrate(&self, state: &mut State, action: &Action) {
        let dt = self.clock.dt();

        let gravity_force = Vector3::new(0., 0., -self.mass * self.gravity);
        let drag_force = -self.drag_coefficient * state.velocity.norm() * state.velocity;
        let thrust_world = state.orientation * Vector3::new(0., 0., action.thrust);
        let acceleration = (thrust_world + gravity_force + drag_force) / self.mass;
        state.velocity += acceleration * dt;
        state.position += state.velocity * dt;

        let inertia_angular_velocity = self.inertia_matrix * state.angular_velocity;
        let gyroscopic_torque = state.angular_velocity.cross(&inertia_angular_velocity);
        let angular_acceleration = self.inertia_matrix_inv * (action.torque - gyroscopic_torque);
        state.angular_velocity += angular_acceleration * dt;
        state.orientation *= UnitQuaternion::from_scaled_axis(state.angular_velocity * dt);
        state.orientation.renormalize();

        if state.position.z < 0. {
            // Resting on the ground: no penetration, no sliding, no spinning.
            state.position.z = 0.;
            state.velocity = Vector3::new(0., 0., state.velocity.z.max(0.));
            state.angular_velocity = Vector3::zeros();
            let (_, _, yaw) = state.orientation.euler_angles();
            state.orientation = UnitQuaternion::from_euler_angles(0., 0., yaw);
        }
    }
}

impl PhysicsBackend for RigidBodyBackend {
    fn now(&self) -> f32 {
        self.clock.now()
    }

    fn step(
        &mut self,
        desired: &[Setpoint],
        actions: &[Action],
    ) -> Result<Vec<State>, BackendFailure> {
        if actions.len() != self.states.len() || desired.len() != self.states.len() {
            return Err(BackendFailure::new(format!(
                "expected {} robots, got {} actions",
                self.states.len(),
                actions.len()
            )));
        }

        let mut next = self.states.clone();
        for (state, action) in next.iter_mut().zip(actions) {
            if !action.thrust.is_finite() || action.torque.iter().any(|v| !v.is_finite()) {
                return Err(BackendFailure::new("action is not finite"));
            }
            self.integrate(state, action);
        }

        self.states = next;
        self.clock.tick();
        Ok(self.states.clone())
    }
}
