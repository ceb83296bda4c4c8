use super::{pid_config, Action, Controller};
use crate::config::VehicleParams;
use crate::{BackendFailure, Setpoint, State};
use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector2, Vector3};

/// Cascaded position → attitude → body rate controller.
///
/// The outer loops are PD on position and velocity with feed-forward
/// acceleration and gravity compensation. The resulting acceleration fixes the
/// thrust direction, which together with the desired yaw gives the attitude
/// target. Attitude and body rate are then closed with proportional loops.
#[derive(Clone, Debug)]
pub struct PdController {
    mass: f32,
    gravity: f32,
    moi: Vector3<f32>,
    lateral_k_p: f32,
    lateral_k_d: f32,
    altitude_k_p: f32,
    altitude_k_d: f32,
    attitude_k_p: Vector3<f32>,
    body_rate_k_p: Vector3<f32>,
    max_tilt_angle: f32,
    max_thrust: f32,
    max_torque: f32,
}

impl PdController {
    pub fn new(vehicle: &VehicleParams) -> Self {
        let (lateral_k_p, lateral_k_d) = pid_config(0.5, 0.9);
        let (altitude_k_p, altitude_k_d) = pid_config(0.4, 0.9);

        Self {
            mass: vehicle.mass,
            gravity: vehicle.gravity,
            moi: Vector3::from(vehicle.inertia),
            lateral_k_p,
            lateral_k_d,
            altitude_k_p,
            altitude_k_d,
            attitude_k_p: Vector3::new(12., 12., 6.),
            body_rate_k_p: Vector3::new(60., 60., 30.),
            max_tilt_angle: 35f32.to_radians(),
            max_thrust: 2. * vehicle.mass * vehicle.gravity,
            max_torque: 1e-2,
        }
    }

    /// World frame acceleration command, gravity included.
    pub fn position_control(&self, state: &State, desired: &Setpoint) -> Vector3<f32> {
        let err_p = desired.position - state.position;
        let err_dot = desired.velocity - state.velocity;

        let lateral = self.lateral_k_p * Vector2::new(err_p.x, err_p.y)
            + self.lateral_k_d * Vector2::new(err_dot.x, err_dot.y)
            + Vector2::new(desired.acceleration.x, desired.acceleration.y);
        let vertical = self.altitude_k_p * err_p.z
            + self.altitude_k_d * err_dot.z
            + desired.acceleration.z
            + self.gravity;

        // Never ask for a thrust direction below the horizon.
        let vertical = vertical.max(0.1 * self.gravity);
        let max_lateral = vertical * self.max_tilt_angle.tan();
        let lateral = if lateral.norm() > max_lateral {
            lateral * max_lateral / lateral.norm()
        } else {
            lateral
        };

        Vector3::new(lateral.x, lateral.y, vertical)
    }

    /// Collective thrust projected on the current body z axis.
    pub fn thrust_control(
        &self,
        attitude: &UnitQuaternion<f32>,
        acceleration: &Vector3<f32>,
    ) -> f32 {
        let body_z = attitude * Vector3::z();
        (self.mass * acceleration.dot(&body_z)).max(0.).min(self.max_thrust)
    }

    /// Attitude whose z axis points along `acceleration` with heading `yaw`.
    pub fn attitude_target(&self, acceleration: &Vector3<f32>, yaw: f32) -> UnitQuaternion<f32> {
        let z_d = acceleration.normalize();
        let heading = Vector3::new(yaw.cos(), yaw.sin(), 0.);
        let y_d = z_d.cross(&heading).normalize();
        let x_d = y_d.cross(&z_d);

        let rotation = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[x_d, y_d, z_d]));
        UnitQuaternion::from_rotation_matrix(&rotation)
    }

    /// Body rate command (rad/s) from the rotation between the current and target attitude.
    pub fn attitude_control(
        &self,
        attitude: &UnitQuaternion<f32>,
        attitude_target: &UnitQuaternion<f32>,
        yaw_rate_ff: f32,
    ) -> Vector3<f32> {
        let attitude_error = (attitude.inverse() * attitude_target).scaled_axis();
        self.attitude_k_p.component_mul(&attitude_error) + Vector3::new(0., 0., yaw_rate_ff)
    }

    /// Generate the roll, pitch, yaw moment commands in the body frame in Newtons*meters
    pub fn body_rate_control(
        &self,
        body_rate_cmd: Vector3<f32>,
        body_rate: Vector3<f32>,
    ) -> Vector3<f32> {
        let taus = self
            .moi
            .component_mul(&self.body_rate_k_p.component_mul(&(body_rate_cmd - body_rate)))
            + body_rate.cross(&self.moi.component_mul(&body_rate));
        let taus_mod = taus.norm();

        if taus_mod > self.max_torque {
            taus * self.max_torque / taus_mod
        } else {
            taus
        }
    }
}

impl Controller for PdController {
    fn compute(&mut self, state: &State, desired: &Setpoint) -> Result<Action, BackendFailure> {
        let finite = state.position.iter().chain(state.velocity.iter()).all(|v| v.is_finite());
        if !finite {
            return Err(BackendFailure::new("measured state is not finite"));
        }

        let acceleration = self.position_control(state, desired);
        let thrust = self.thrust_control(&state.orientation, &acceleration);
        let attitude_target = self.attitude_target(&acceleration, desired.yaw);
        let body_rate_cmd =
            self.attitude_control(&state.orientation, &attitude_target, desired.yaw_rate);
        let torque = self.body_rate_control(body_rate_cmd, state.angular_velocity);

        Ok(Action { thrust, torque })
    }
}
