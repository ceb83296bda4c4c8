use crate::control::Controller;
use crate::mode::MotionState;
use crate::State;
use nalgebra::Vector3;

/// Index of a robot in the fleet, assigned in configuration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RobotId(pub usize);

/// One simulated quadrotor: its last committed state, motion state machine and controller.
pub struct Robot {
    id: RobotId,
    name: String,
    initial_position: Vector3<f32>,
    pub(crate) state: State,
    pub(crate) motion: MotionState,
    pub(crate) controller: Box<dyn Controller>,
    pub(crate) enabled: bool,
}

impl Robot {
    pub fn new(
        id: RobotId,
        name: impl Into<String>,
        initial_position: Vector3<f32>,
        controller: Box<dyn Controller>,
    ) -> Self {
        let state = State::at_rest(initial_position);
        Self {
            id,
            name: name.into(),
            initial_position,
            state,
            motion: MotionState::new(&state),
            controller,
            enabled: true,
        }
    }

    pub fn id(&self) -> RobotId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial_position(&self) -> Vector3<f32> {
        self.initial_position
    }

    /// The state committed by the last successful step.
    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn motion(&self) -> &MotionState {
        &self.motion
    }

    /// False once an emergency was received. Disabled robots are frozen in place.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl std::fmt::Debug for Robot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Robot")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("mode", &self.motion.mode().name())
            .field("enabled", &self.enabled)
            .finish()
    }
}
