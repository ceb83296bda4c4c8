use crate::{
    Command, CommandError, CommandKind, GroupMask, GroupMaskRegistry, Robot, RobotId, Target,
};
use std::collections::HashMap;

/// Per-robot outcome of one dispatched command, in fleet order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DispatchReport {
    pub outcomes: Vec<(String, Result<(), CommandError>)>,
}

impl DispatchReport {
    /// True when every addressed robot accepted the command.
    /// A broadcast that matched nobody is a success.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &CommandError)> {
        self.outcomes
            .iter()
            .filter_map(|(name, outcome)| outcome.as_ref().err().map(|e| (name.as_str(), e)))
    }

    /// Names of the robots the command was applied to.
    pub fn accepted(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_ok())
            .map(|(name, _)| name.as_str())
    }
}

/// Resolves command targets to robots and applies the verb to each.
#[derive(Clone, Debug, Default)]
pub struct CommandRouter {
    names: HashMap<String, RobotId>,
    groups: GroupMaskRegistry,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the next robot of the fleet. Ids follow registration order
    /// and index the robot slice passed to [`CommandRouter::dispatch`].
    pub fn register(&mut self, name: impl Into<String>, mask: GroupMask) -> RobotId {
        let id = self.groups.register(mask);
        self.names.insert(name.into(), id);
        id
    }

    pub fn resolve(&self, name: &str) -> Option<RobotId> {
        self.names.get(name).copied()
    }

    pub fn groups(&self) -> &GroupMaskRegistry {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut GroupMaskRegistry {
        &mut self.groups
    }

    /// Apply `command` at simulation time `now`.
    ///
    /// Only an unknown named target rejects the whole command. Every other
    /// failure is reported for the robot it concerns and leaves that robot's
    /// mode untouched.
    pub fn dispatch(
        &self,
        robots: &mut [Robot],
        now: f32,
        command: &Command,
    ) -> Result<DispatchReport, CommandError> {
        let candidates: Vec<RobotId> = match &command.target {
            Target::All => self
                .groups
                .members(command.group_mask)
                .filter(|id| robots.get(id.0).map_or(false, |robot| robot.enabled))
                .collect(),
            Target::Robot(name) => {
                let id = self
                    .resolve(name)
                    .filter(|id| id.0 < robots.len())
                    .ok_or_else(|| CommandError::UnknownTarget(name.clone()))?;
                vec![id]
            }
        };

        log::info!(
            "{}: {:?} mask {:#04x}, {} robot(s)",
            command.kind.name(),
            command.target,
            command.group_mask.0,
            candidates.len()
        );

        let mut report = DispatchReport::default();
        for id in candidates {
            let robot = &mut robots[id.0];
            let outcome = apply(robot, now, &command.kind);
            if let Err(e) = &outcome {
                log::warn!("{} rejected {}: {}", robot.name(), command.kind.name(), e);
            }
            report.outcomes.push((robot.name().to_owned(), outcome));
        }

        Ok(report)
    }
}

fn apply(robot: &mut Robot, now: f32, kind: &CommandKind) -> Result<(), CommandError> {
    let accepted_while_disabled = matches!(
        kind,
        CommandKind::Emergency | CommandKind::UploadTrajectory { .. }
    );
    if !robot.enabled && !accepted_while_disabled {
        return Err(CommandError::RobotDisabled(robot.name().to_owned()));
    }

    let state = robot.state;
    let motion = &mut robot.motion;
    match kind {
        CommandKind::Takeoff { height, duration } => {
            motion.takeoff(now, &state, *height, *duration)?
        }
        CommandKind::Land { height, duration } => motion.land(now, &state, *height, *duration)?,
        CommandKind::GoTo {
            goal,
            yaw,
            duration,
            relative,
        } => motion.go_to(now, &state, *goal, *yaw, *duration, *relative)?,
        CommandKind::UploadTrajectory {
            trajectory_id,
            piece_offset,
            pieces,
        } => motion.upload_trajectory(*trajectory_id, *piece_offset, pieces.clone())?,
        CommandKind::StartTrajectory {
            trajectory_id,
            timescale,
            reverse,
            relative,
        } => motion.start_trajectory(now, &state, *trajectory_id, *timescale, *reverse, *relative)?,
        CommandKind::NotifySetpointsStop => motion.stop(&state),
        CommandKind::Emergency => {
            robot.enabled = false;
            log::warn!("{} disabled by emergency", robot.name());
            return Ok(());
        }
        CommandKind::FullState(setpoint) => motion.full_state(*setpoint),
    }

    log::debug!("{} -> {}", robot.name(), robot.motion.mode().name());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::NoneController;
    use crate::mode::FlightMode;
    use crate::Setpoint;
    use nalgebra::Vector3;

    fn fleet(masks: &[u8]) -> (CommandRouter, Vec<Robot>) {
        let mut router = CommandRouter::new();
        let robots = masks
            .iter()
            .enumerate()
            .map(|(i, mask)| {
                let name = format!("cf{}", i + 1);
                let id = router.register(name.clone(), GroupMask(*mask));
                Robot::new(id, name, Vector3::new(i as f32, 0., 0.), Box::new(NoneController))
            })
            .collect();
        (router, robots)
    }

    #[test]
    fn broadcast_stop_only_reaches_matching_groups() {
        let (router, mut robots) = fleet(&[0b0001, 0b0010, 0b0011]);
        router
            .dispatch(&mut robots, 0., &Command::takeoff(1., 2.))
            .unwrap();

        let report = router
            .dispatch(
                &mut robots,
                1.,
                &Command::notify_setpoints_stop().with_group_mask(GroupMask(0b0010)),
            )
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.accepted().collect::<Vec<_>>(), vec!["cf2", "cf3"]);
        assert!(matches!(robots[0].motion().mode(), FlightMode::TakingOff(_)));
        assert!(matches!(robots[1].motion().mode(), FlightMode::Idle { .. }));
        assert!(matches!(robots[2].motion().mode(), FlightMode::Idle { .. }));
    }

    #[test]
    fn zero_mask_broadcast_reaches_every_enabled_robot() {
        let (router, mut robots) = fleet(&[0, 0b0010, 0b1000]);
        router
            .dispatch(&mut robots, 0., &Command::emergency().to("cf3"))
            .unwrap();

        let report = router
            .dispatch(&mut robots, 0., &Command::takeoff(1., 2.))
            .unwrap();

        assert_eq!(report.accepted().collect::<Vec<_>>(), vec!["cf1", "cf2"]);
        assert!(!robots[2].is_enabled());
        assert!(matches!(robots[2].motion().mode(), FlightMode::Idle { .. }));
    }

    #[test]
    fn malformed_upload_then_undefined_start() {
        let (router, mut robots) = fleet(&[0]);

        let report = router
            .dispatch(&mut robots, 0., &Command::upload_trajectory(7, 0, vec![]))
            .unwrap();
        assert!(matches!(
            report.failures().next(),
            Some(("cf1", CommandError::MalformedTrajectory(_)))
        ));

        let report = router
            .dispatch(&mut robots, 0., &Command::start_trajectory(7).to("cf1"))
            .unwrap();
        assert_eq!(
            report.failures().next(),
            Some(("cf1", &CommandError::UndefinedTrajectory { id: 7 }))
        );
    }

    #[test]
    fn unknown_name_rejects_whole_command() {
        let (router, mut robots) = fleet(&[0, 0]);
        let result = router.dispatch(&mut robots, 0., &Command::land(0.05, 1.).to("cf9"));

        assert_eq!(result, Err(CommandError::UnknownTarget("cf9".into())));
    }

    #[test]
    fn named_target_ignores_group_mask() {
        let (router, mut robots) = fleet(&[0b0001, 0b0010]);
        let command = Command::takeoff(1., 2.)
            .with_group_mask(GroupMask(0b0010))
            .to("cf1");
        let report = router.dispatch(&mut robots, 0., &command).unwrap();

        assert!(report.is_success());
        assert!(matches!(robots[0].motion().mode(), FlightMode::TakingOff(_)));
        assert!(matches!(robots[1].motion().mode(), FlightMode::Idle { .. }));
    }

    #[test]
    fn one_failure_does_not_abort_siblings() {
        let (router, mut robots) = fleet(&[0, 0, 0]);
        let piece =
            crate::trajectory::TrajectoryPiece::new(vec![0., 1.], vec![], vec![1.], vec![], 1.);
        router
            .dispatch(&mut robots, 0., &Command::upload_trajectory(1, 0, vec![piece]).to("cf2"))
            .unwrap();

        let report = router
            .dispatch(&mut robots, 0., &Command::start_trajectory(1))
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.accepted().collect::<Vec<_>>(), vec!["cf2"]);
        assert_eq!(report.failures().count(), 2);
        assert!(matches!(
            robots[1].motion().mode(),
            FlightMode::FollowingTrajectory(_)
        ));
    }

    #[test]
    fn invalid_duration_leaves_mode_unchanged() {
        let (router, mut robots) = fleet(&[0]);
        router
            .dispatch(&mut robots, 0., &Command::takeoff(1., 2.))
            .unwrap();

        let report = router
            .dispatch(&mut robots, 1., &Command::go_to(Vector3::zeros(), 0., 0.))
            .unwrap();

        assert_eq!(
            report.failures().next(),
            Some(("cf1", &CommandError::InvalidDuration(0.)))
        );
        assert!(matches!(robots[0].motion().mode(), FlightMode::TakingOff(_)));
    }

    #[test]
    fn disabled_robot_still_accepts_uploads() {
        let (router, mut robots) = fleet(&[0]);
        router
            .dispatch(&mut robots, 0., &Command::emergency())
            .unwrap();

        let report = router
            .dispatch(&mut robots, 0., &Command::takeoff(1., 1.).to("cf1"))
            .unwrap();
        assert_eq!(
            report.failures().next(),
            Some(("cf1", &CommandError::RobotDisabled("cf1".into())))
        );

        let piece = crate::trajectory::TrajectoryPiece::new(vec![0.], vec![], vec![], vec![], 1.);
        let report = router
            .dispatch(&mut robots, 0., &Command::upload_trajectory(0, 0, vec![piece]).to("cf1"))
            .unwrap();
        assert!(report.is_success());
        assert!(robots[0].motion().trajectory(0).is_some());
    }

    #[test]
    fn full_state_holds_the_streamed_setpoint() {
        let (router, mut robots) = fleet(&[0b0001, 0b0010]);
        let target = Setpoint {
            position: Vector3::new(0.2, -0.1, 0.8),
            velocity: Vector3::new(0.1, 0., 0.),
            yaw: 0.4,
            ..Default::default()
        };

        let report = router
            .dispatch(&mut robots, 0., &Command::full_state(target).to("cf1"))
            .unwrap();
        assert!(report.is_success());
        assert!(matches!(robots[0].motion().mode(), FlightMode::ManualSetpoint { .. }));
        assert!(matches!(robots[1].motion().mode(), FlightMode::Idle { .. }));

        let report = router
            .dispatch(&mut robots, 1., &Command::full_state(target))
            .unwrap();
        assert_eq!(report.accepted().collect::<Vec<_>>(), vec!["cf1", "cf2"]);

        for robot in &robots {
            let motion = robot.motion();
            assert_eq!(motion.mode().name(), "manual-setpoint");
            assert_eq!(motion.end_time(), None);
            for t in [0., 1., 5., 100.] {
                assert_eq!(motion.setpoint(t), target);
            }
        }
    }
}
