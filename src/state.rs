use nalgebra::{UnitQuaternion, Vector3};
use num_traits::Float;

/// A measured snapshot of one robot in the world frame (z up).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct State {
    pub position: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
    pub velocity: Vector3<f32>,
    /// Angular velocity in the body frame (rad/s).
    pub angular_velocity: Vector3<f32>,
}

impl State {
    /// A robot at rest at `position` with level attitude.
    pub fn at_rest(position: Vector3<f32>) -> Self {
        Self {
            position,
            orientation: UnitQuaternion::identity(),
            velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
        }
    }

    /// Heading around the world z axis in radians.
    pub fn yaw(&self) -> f32 {
        self.orientation.euler_angles().2
    }
}

impl Default for State {
    fn default() -> Self {
        Self::at_rest(Vector3::zeros())
    }
}

/// The desired instantaneous state fed to a controller.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Setpoint {
    pub position: Vector3<f32>,
    pub velocity: Vector3<f32>,
    pub acceleration: Vector3<f32>,
    pub yaw: f32,
    pub yaw_rate: f32,
}

impl Setpoint {
    /// Hold the position and heading of `state` with zero derivatives.
    pub fn hold(state: &State) -> Self {
        Self {
            position: state.position,
            yaw: state.yaw(),
            ..Default::default()
        }
    }

    /// The same pose with every derivative zeroed.
    pub fn at_rest(self) -> Self {
        Self {
            position: self.position,
            yaw: self.yaw,
            ..Default::default()
        }
    }

    /// Convert into a state with a yaw-only orientation.
    pub fn to_state(&self) -> State {
        State {
            position: self.position,
            orientation: UnitQuaternion::from_euler_angles(0., 0., self.yaw),
            velocity: self.velocity,
            angular_velocity: Vector3::new(0., 0., self.yaw_rate),
        }
    }
}

/// Wrap an angle into `[-PI, PI]` using `atan2(sin, cos)`.
pub fn wrap_pi<T: Float>(angle: T) -> T {
    angle.sin().atan2(angle.cos())
}

/// Signed shortest rotation that takes `from` onto `to`.
pub fn shortest_angle<T: Float>(from: T, to: T) -> T {
    wrap_pi(to - from)
}
