//! Per-robot motion state machine.
//!
//! [`MotionState`] turns the most recent command into a setpoint that is a pure
//! function of the simulation time. Every new command preempts the current
//! motion; timed motions are completed into [`FlightMode::Hover`] by the step
//! loop once their end time has passed.

use crate::state::shortest_angle;
use crate::trajectory::{Trajectory, TrajectoryPiece};
use crate::{CommandError, Setpoint, State};
use nalgebra::Vector3;
use std::collections::HashMap;
use std::sync::Arc;

/// A linear climb or descent to `target_height`.
#[derive(Clone, Debug, PartialEq)]
pub struct VerticalRamp {
    pub target_height: f32,
    pub duration: f32,
    pub start_time: f32,
    pub start: State,
}

impl VerticalRamp {
    fn setpoint(&self, now: f32) -> Setpoint {
        let (s, moving) = progress(now, self.start_time, self.duration);
        let climb = self.target_height - self.start.position.z;

        let mut setpoint = Setpoint::hold(&self.start);
        setpoint.position.z = self.start.position.z + climb * s;
        if moving {
            setpoint.velocity.z = climb / self.duration;
        }
        setpoint
    }
}

/// A straight-line move to `goal` while turning to `yaw`.
#[derive(Clone, Debug, PartialEq)]
pub struct GoTo {
    pub goal: Vector3<f32>,
    pub yaw: f32,
    pub duration: f32,
    pub relative: bool,
    pub start_time: f32,
    pub start: State,
}

impl GoTo {
    /// The goal in world coordinates.
    pub fn effective_goal(&self) -> Vector3<f32> {
        if self.relative {
            self.start.position + self.goal
        } else {
            self.goal
        }
    }

    fn setpoint(&self, now: f32) -> Setpoint {
        let (s, moving) = progress(now, self.start_time, self.duration);
        let delta = self.effective_goal() - self.start.position;
        let start_yaw = self.start.yaw();
        let turn = shortest_angle(start_yaw, self.yaw);

        let mut setpoint = Setpoint {
            position: self.start.position + delta * s,
            yaw: start_yaw + turn * s,
            ..Default::default()
        };
        if moving {
            setpoint.velocity = delta / self.duration;
            setpoint.yaw_rate = turn / self.duration;
        }
        setpoint
    }
}

/// Playback of an uploaded trajectory.
#[derive(Clone, Debug, PartialEq)]
pub struct Playback {
    pub trajectory: Arc<Trajectory>,
    pub timescale: f32,
    pub reverse: bool,
    pub relative: bool,
    pub start_time: f32,
    /// Added to every sampled position; zero unless `relative`.
    pub offset: Vector3<f32>,
    /// Added to every sampled yaw; zero unless `relative`.
    pub yaw_offset: f32,
}

impl Playback {
    fn setpoint(&self, now: f32) -> Setpoint {
        let total = self.trajectory.duration();
        let tau = ((now - self.start_time) * self.timescale).max(0.).min(total);
        let (t, direction) = if self.reverse {
            (total - tau, -1.)
        } else {
            (tau, 1.)
        };

        let point = self.trajectory.evaluate(t);
        Setpoint {
            position: point.position + self.offset,
            velocity: point.velocity * self.timescale * direction,
            acceleration: point.acceleration * self.timescale * self.timescale,
            yaw: point.yaw + self.yaw_offset,
            yaw_rate: point.yaw_rate * self.timescale * direction,
        }
    }

    fn end_time(&self) -> f32 {
        self.start_time + self.trajectory.duration() / self.timescale
    }
}

/// The commanded motion of one robot.
#[derive(Clone, Debug, PartialEq)]
pub enum FlightMode {
    /// Hold the measured state captured on entry.
    Idle { hold: Setpoint },
    TakingOff(VerticalRamp),
    Landing(VerticalRamp),
    GoingTo(GoTo),
    FollowingTrajectory(Playback),
    /// Rest at the final desired value of a completed motion.
    Hover { held: Setpoint },
    /// An externally streamed setpoint.
    ManualSetpoint { target: Setpoint },
}

impl FlightMode {
    pub fn name(&self) -> &'static str {
        match self {
            FlightMode::Idle { .. } => "idle",
            FlightMode::TakingOff(_) => "taking-off",
            FlightMode::Landing(_) => "landing",
            FlightMode::GoingTo(_) => "going-to",
            FlightMode::FollowingTrajectory(_) => "following-trajectory",
            FlightMode::Hover { .. } => "hover",
            FlightMode::ManualSetpoint { .. } => "manual-setpoint",
        }
    }
}

/// What one robot is currently told to do, and the trajectories uploaded to it.
#[derive(Clone, Debug)]
pub struct MotionState {
    mode: FlightMode,
    trajectories: HashMap<u32, Arc<Trajectory>>,
}

impl MotionState {
    /// Start idle, holding `initial`.
    pub fn new(initial: &State) -> Self {
        Self {
            mode: FlightMode::Idle {
                hold: Setpoint::hold(initial),
            },
            trajectories: HashMap::new(),
        }
    }

    pub fn mode(&self) -> &FlightMode {
        &self.mode
    }

    pub fn trajectory(&self, id: u32) -> Option<&Trajectory> {
        self.trajectories.get(&id).map(|trajectory| trajectory.as_ref())
    }

    /// The desired state at `now`. Pure: the mode is never changed here.
    pub fn setpoint(&self, now: f32) -> Setpoint {
        match &self.mode {
            FlightMode::Idle { hold } => *hold,
            FlightMode::TakingOff(ramp) | FlightMode::Landing(ramp) => ramp.setpoint(now),
            FlightMode::GoingTo(go_to) => go_to.setpoint(now),
            FlightMode::FollowingTrajectory(playback) => playback.setpoint(now),
            FlightMode::Hover { held } => *held,
            FlightMode::ManualSetpoint { target } => *target,
        }
    }

    /// When the current timed motion ends, if it is one.
    pub fn end_time(&self) -> Option<f32> {
        match &self.mode {
            FlightMode::TakingOff(ramp) | FlightMode::Landing(ramp) => {
                Some(ramp.start_time + ramp.duration)
            }
            FlightMode::GoingTo(go_to) => Some(go_to.start_time + go_to.duration),
            FlightMode::FollowingTrajectory(playback) => Some(playback.end_time()),
            FlightMode::Idle { .. }
            | FlightMode::Hover { .. }
            | FlightMode::ManualSetpoint { .. } => None,
        }
    }

    pub fn takeoff(
        &mut self,
        now: f32,
        state: &State,
        height: f32,
        duration: f32,
    ) -> Result<(), CommandError> {
        validate_duration(duration)?;
        self.mode = FlightMode::TakingOff(VerticalRamp {
            target_height: height,
            duration,
            start_time: now,
            start: *state,
        });
        Ok(())
    }

    pub fn land(
        &mut self,
        now: f32,
        state: &State,
        height: f32,
        duration: f32,
    ) -> Result<(), CommandError> {
        validate_duration(duration)?;
        self.mode = FlightMode::Landing(VerticalRamp {
            target_height: height,
            duration,
            start_time: now,
            start: *state,
        });
        Ok(())
    }

    pub fn go_to(
        &mut self,
        now: f32,
        state: &State,
        goal: Vector3<f32>,
        yaw: f32,
        duration: f32,
        relative: bool,
    ) -> Result<(), CommandError> {
        validate_duration(duration)?;
        self.mode = FlightMode::GoingTo(GoTo {
            goal,
            yaw,
            duration,
            relative,
            start_time: now,
            start: *state,
        });
        Ok(())
    }

    /// Store `pieces` under `id`. A non-zero `piece_offset` splices them into
    /// the trajectory already stored under that id.
    pub fn upload_trajectory(
        &mut self,
        id: u32,
        piece_offset: usize,
        pieces: Vec<TrajectoryPiece>,
    ) -> Result<(), CommandError> {
        let trajectory = if piece_offset == 0 {
            Trajectory::new(id, pieces)?
        } else {
            let stored = self.trajectories.get(&id).ok_or_else(|| {
                CommandError::MalformedTrajectory(format!(
                    "piece offset {piece_offset} given but trajectory {id} is not stored"
                ))
            })?;
            stored.splice(piece_offset, pieces)?
        };

        self.trajectories.insert(id, Arc::new(trajectory));
        Ok(())
    }

    pub fn start_trajectory(
        &mut self,
        now: f32,
        state: &State,
        id: u32,
        timescale: f32,
        reverse: bool,
        relative: bool,
    ) -> Result<(), CommandError> {
        let trajectory = self
            .trajectories
            .get(&id)
            .cloned()
            .ok_or(CommandError::UndefinedTrajectory { id })?;

        if !(timescale > 0. && timescale.is_finite()) {
            return Err(CommandError::InvalidTimescale(timescale));
        }

        let (offset, yaw_offset) = if relative {
            let origin = trajectory.evaluate(0.);
            (state.position - origin.position, state.yaw() - origin.yaw)
        } else {
            (Vector3::zeros(), 0.)
        };

        self.mode = FlightMode::FollowingTrajectory(Playback {
            trajectory,
            timescale,
            reverse,
            relative,
            start_time: now,
            offset,
            yaw_offset,
        });
        Ok(())
    }

    /// Abort any motion and hold the measured state.
    pub fn stop(&mut self, state: &State) {
        self.mode = FlightMode::Idle {
            hold: Setpoint::hold(state),
        };
    }

    pub fn full_state(&mut self, target: Setpoint) {
        self.mode = FlightMode::ManualSetpoint { target };
    }

    /// Enter hover if the timed motion has ended by `now`.
    /// Returns true on transition.
    pub fn complete(&mut self, now: f32, desired: &Setpoint) -> bool {
        match self.end_time() {
            Some(end) if now >= end => {
                self.mode = FlightMode::Hover {
                    held: desired.at_rest(),
                };
                true
            }
            _ => false,
        }
    }
}

fn validate_duration(duration: f32) -> Result<(), CommandError> {
    if duration > 0. && duration.is_finite() {
        Ok(())
    } else {
        Err(CommandError::InvalidDuration(duration))
    }
}

/// Fraction of the interval elapsed at `now`, clamped to `[0, 1]`, and
/// whether `now` lies inside the interval.
fn progress(now: f32, start_time: f32, duration: f32) -> (f32, bool) {
    let elapsed = now - start_time;
    let s = (elapsed / duration).max(0.).min(1.);
    (s, elapsed >= 0. && elapsed < duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use core::f32::consts::PI;
    use nalgebra::UnitQuaternion;

    fn ground(x: f32, y: f32) -> State {
        State::at_rest(Vector3::new(x, y, 0.))
    }

    fn ramp_then_hold() -> Vec<TrajectoryPiece> {
        vec![
            TrajectoryPiece::new(vec![0., 0.5], vec![0.], vec![1.], vec![0., 0.1], 2.),
            TrajectoryPiece::new(vec![1.], vec![0.], vec![1.], vec![0.2], 3.),
        ]
    }

    #[test]
    fn takeoff_interpolates_height() {
        let mut motion = MotionState::new(&ground(0., 0.));
        motion.takeoff(0., &ground(0., 0.), 1., 2.).unwrap();

        assert_abs_diff_eq!(motion.setpoint(1.).position.z, 0.5);
        assert_abs_diff_eq!(motion.setpoint(1.).velocity.z, 0.5);
        assert_abs_diff_eq!(motion.setpoint(2.).position.z, 1.);
        assert_abs_diff_eq!(motion.setpoint(3.).position.z, 1.);
        assert_abs_diff_eq!(motion.setpoint(3.).velocity.z, 0.);
        assert_abs_diff_eq!(motion.setpoint(-1.).position.z, 0.);
    }

    #[test]
    fn takeoff_keeps_xy_and_yaw() {
        let mut start = ground(0.3, -0.4);
        start.orientation = UnitQuaternion::from_euler_angles(0., 0., 1.2);
        let mut motion = MotionState::new(&start);
        motion.takeoff(5., &start, 1., 2.).unwrap();

        let setpoint = motion.setpoint(6.);
        assert_abs_diff_eq!(setpoint.position.x, 0.3);
        assert_abs_diff_eq!(setpoint.position.y, -0.4);
        assert_abs_diff_eq!(setpoint.yaw, 1.2, epsilon = 1e-5);
    }

    #[test]
    fn invalid_duration_leaves_mode_alone() {
        let start = ground(0., 0.);
        let mut motion = MotionState::new(&start);
        motion.takeoff(0., &start, 1., 2.).unwrap();
        let before = motion.mode().clone();

        assert_eq!(
            motion.land(0., &start, 0., 0.),
            Err(CommandError::InvalidDuration(0.))
        );
        assert!(motion.go_to(0., &start, Vector3::zeros(), 0., -1., false).is_err());
        assert_eq!(motion.mode(), &before);
    }

    #[test]
    fn relative_go_to_offsets_from_start() {
        let start = State::at_rest(Vector3::new(1., 1., 1.));
        let mut motion = MotionState::new(&start);
        motion
            .go_to(0., &start, Vector3::new(1., 0., -0.5), 0., 2., true)
            .unwrap();

        let setpoint = motion.setpoint(1.);
        assert_abs_diff_eq!(setpoint.position, Vector3::new(1.5, 1., 0.75), epsilon = 1e-6);
        assert_abs_diff_eq!(
            motion.setpoint(2.).position,
            Vector3::new(2., 1., 0.5),
            epsilon = 1e-6
        );
    }

    #[test]
    fn go_to_yaw_takes_the_short_way() {
        let mut start = ground(0., 0.);
        start.orientation = UnitQuaternion::from_euler_angles(0., 0., 0.9 * PI);
        let mut motion = MotionState::new(&start);
        motion
            .go_to(0., &start, Vector3::zeros(), -0.9 * PI, 1., false)
            .unwrap();

        // Through +PI, not back through zero.
        let midway = motion.setpoint(0.5).yaw;
        assert_abs_diff_eq!(midway, PI, epsilon = 1e-4);

        let end = motion.setpoint(1.).yaw;
        assert_abs_diff_eq!(end - 0.9 * PI, 0.2 * PI, epsilon = 1e-4);
    }

    #[test]
    fn go_to_yaw_path_never_exceeds_pi() {
        let mut yaw = -3. * PI;
        while yaw < 3. * PI {
            let mut start = ground(0., 0.);
            start.orientation = UnitQuaternion::from_euler_angles(0., 0., yaw);
            let mut motion = MotionState::new(&start);
            motion
                .go_to(0., &start, Vector3::zeros(), -yaw * 1.7 + 0.3, 1., false)
                .unwrap();

            let travelled = motion.setpoint(1.).yaw - motion.setpoint(0.).yaw;
            assert!(travelled.abs() <= PI + 1e-4, "yaw {yaw} travelled {travelled}");
            yaw += 0.37;
        }
    }

    #[test]
    fn reversed_playback_mirrors_forward_playback() {
        let start = ground(0., 0.);
        let mut forward = MotionState::new(&start);
        forward.upload_trajectory(0, 0, ramp_then_hold()).unwrap();
        let mut reverse = forward.clone();

        forward.start_trajectory(0., &start, 0, 1., false, false).unwrap();
        reverse.start_trajectory(0., &start, 0, 1., true, false).unwrap();

        assert_abs_diff_eq!(reverse.setpoint(0.).position.x, 1.);
        assert_abs_diff_eq!(reverse.setpoint(5.).position.x, 0.);

        for k in 0..=20 {
            let tau = k as f32 * 0.25;
            let a = reverse.setpoint(tau);
            let b = forward.setpoint(5. - tau);
            assert_abs_diff_eq!(a.position, b.position, epsilon = 1e-5);
            assert_abs_diff_eq!(a.yaw, b.yaw, epsilon = 1e-5);
        }
    }

    #[test]
    fn relative_playback_adds_a_constant_offset() {
        let start = State::at_rest(Vector3::new(2., -1., 0.5));
        let mut absolute = MotionState::new(&start);
        absolute.upload_trajectory(4, 0, ramp_then_hold()).unwrap();
        let mut relative = absolute.clone();

        absolute.start_trajectory(0., &start, 4, 1., false, false).unwrap();
        relative.start_trajectory(0., &start, 4, 1., false, true).unwrap();

        let offset = start.position - Vector3::new(0., 0., 1.);
        for k in 0..=12 {
            let t = k as f32 * 0.5;
            assert_abs_diff_eq!(
                relative.setpoint(t).position,
                absolute.setpoint(t).position + offset,
                epsilon = 1e-5
            );
        }
    }

    #[test]
    fn relative_playback_offsets_yaw_from_the_start_heading() {
        let mut start = State::at_rest(Vector3::new(0.5, 0., 1.));
        start.orientation = UnitQuaternion::from_euler_angles(0., 0., 1.);
        let turning = vec![TrajectoryPiece::new(vec![0.], vec![0.], vec![1.], vec![0.2, 0.1], 4.)];

        let mut absolute = MotionState::new(&start);
        absolute.upload_trajectory(3, 0, turning).unwrap();
        let mut relative = absolute.clone();
        absolute.start_trajectory(0., &start, 3, 1., false, false).unwrap();
        relative.start_trajectory(0., &start, 3, 1., false, true).unwrap();

        let yaw_offset = start.yaw() - absolute.trajectory(3).unwrap().evaluate(0.).yaw;
        assert_abs_diff_eq!(yaw_offset, 0.8, epsilon = 1e-5);
        for k in 0..=8 {
            let t = k as f32 * 0.5;
            assert_abs_diff_eq!(
                relative.setpoint(t).yaw,
                absolute.setpoint(t).yaw + yaw_offset,
                epsilon = 1e-5
            );
            assert_abs_diff_eq!(relative.setpoint(t).yaw_rate, 0.1, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(relative.setpoint(0.).yaw, 1., epsilon = 1e-5);
        assert_abs_diff_eq!(relative.setpoint(1.).yaw, 1.1, epsilon = 1e-5);
    }

    #[test]
    fn timescale_stretches_playback() {
        let start = ground(0., 0.);
        let mut motion = MotionState::new(&start);
        motion.upload_trajectory(0, 0, ramp_then_hold()).unwrap();
        motion.start_trajectory(10., &start, 0, 0.5, false, false).unwrap();

        assert_abs_diff_eq!(motion.setpoint(12.).position.x, 0.5);
        assert_abs_diff_eq!(motion.setpoint(12.).velocity.x, 0.25);
        assert_eq!(motion.end_time(), Some(20.));
    }

    #[test]
    fn start_requires_upload_and_positive_timescale() {
        let start = ground(0., 0.);
        let mut motion = MotionState::new(&start);

        assert_eq!(
            motion.upload_trajectory(1, 0, vec![]),
            Err(CommandError::MalformedTrajectory("trajectory 1 has no pieces".into()))
        );
        assert_eq!(
            motion.start_trajectory(0., &start, 1, 1., false, false),
            Err(CommandError::UndefinedTrajectory { id: 1 })
        );

        motion.upload_trajectory(1, 0, ramp_then_hold()).unwrap();
        assert_eq!(
            motion.start_trajectory(0., &start, 1, 0., false, false),
            Err(CommandError::InvalidTimescale(0.))
        );
    }

    #[test]
    fn failed_upload_keeps_previous_trajectory() {
        let mut motion = MotionState::new(&ground(0., 0.));
        motion.upload_trajectory(2, 0, ramp_then_hold()).unwrap();

        let bad = vec![TrajectoryPiece::new(vec![], vec![], vec![], vec![], -1.)];
        assert!(motion.upload_trajectory(2, 0, bad).is_err());
        assert_abs_diff_eq!(motion.trajectory(2).unwrap().duration(), 5.);
    }

    #[test]
    fn piece_offset_splices_into_stored_trajectory() {
        let mut motion = MotionState::new(&ground(0., 0.));
        let extra = vec![TrajectoryPiece::new(vec![3.], vec![], vec![], vec![], 1.)];

        assert!(motion.upload_trajectory(5, 1, extra.clone()).is_err());

        motion.upload_trajectory(5, 0, ramp_then_hold()).unwrap();
        motion.upload_trajectory(5, 2, extra).unwrap();
        let trajectory = motion.trajectory(5).unwrap();
        assert_eq!(trajectory.pieces().len(), 3);
        assert_abs_diff_eq!(trajectory.evaluate(6.).position.x, 3.);
    }

    #[test]
    fn completion_enters_hover_at_rest() {
        let start = ground(0., 0.);
        let mut motion = MotionState::new(&start);
        motion.takeoff(0., &start, 1., 2.).unwrap();

        let desired = motion.setpoint(1.);
        assert!(!motion.complete(1., &desired));

        let desired = motion.setpoint(2.);
        assert!(motion.complete(2., &desired));
        match motion.mode() {
            FlightMode::Hover { held } => {
                assert_abs_diff_eq!(held.position.z, 1.);
                assert_eq!(held.velocity, Vector3::zeros());
            }
            other => panic!("expected hover, got {other:?}"),
        }
        assert_eq!(motion.end_time(), None);
    }

    #[test]
    fn landing_twice_does_not_descend_further() {
        let hovering = State::at_rest(Vector3::new(0., 0., 1.));
        let mut motion = MotionState::new(&hovering);
        motion.land(0., &hovering, 0.06, 2.).unwrap();

        let landed = motion.setpoint(2.).to_state();
        motion.land(2., &landed, 0.06, 2.).unwrap();

        for t in [2., 3., 4., 10.] {
            assert_abs_diff_eq!(motion.setpoint(t).position.z, 0.06, epsilon = 1e-6);
        }
    }

    #[test]
    fn stop_holds_measured_state() {
        let start = ground(0., 0.);
        let mut motion = MotionState::new(&start);
        motion.takeoff(0., &start, 1., 2.).unwrap();

        let measured = State::at_rest(Vector3::new(0.1, 0., 0.4));
        motion.stop(&measured);

        assert_eq!(motion.end_time(), None);
        assert_abs_diff_eq!(motion.setpoint(1.5).position, measured.position);
    }
}
