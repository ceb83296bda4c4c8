use crate::control::Action;
use crate::observer::{Observer, StepFrame};
use crate::physics::PhysicsBackend;
use crate::{Robot, Setpoint, StepError};

/// Drives one discrete step of the whole fleet.
///
/// Every step samples setpoints, runs each robot's controller, calls the
/// physics backend once, commits the new states and finally notifies the
/// observers. A failing controller or backend aborts the step before anything
/// is committed.
pub struct StepLoop {
    backend: Box<dyn PhysicsBackend>,
    observers: Vec<Box<dyn Observer>>,
    names: Vec<String>,
}

impl StepLoop {
    pub fn new(backend: Box<dyn PhysicsBackend>) -> Self {
        Self {
            backend,
            observers: Vec::new(),
            names: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    pub fn now(&self) -> f32 {
        self.backend.now()
    }

    /// Run one step over `robots` and return the time it was sampled at.
    pub fn step(&mut self, robots: &mut [Robot]) -> Result<f32, StepError> {
        let now = self.backend.now();

        let desired: Vec<Setpoint> = robots
            .iter()
            .map(|robot| {
                if robot.enabled {
                    robot.motion.setpoint(now)
                } else {
                    Setpoint::hold(&robot.state)
                }
            })
            .collect();

        let mut actions = Vec::with_capacity(robots.len());
        for (robot, desired) in robots.iter_mut().zip(&desired) {
            let action = if robot.enabled {
                robot
                    .controller
                    .compute(&robot.state, desired)
                    .map_err(|source| StepError::Controller {
                        robot: robot.name().to_owned(),
                        source,
                    })?
            } else {
                Action::default()
            };
            actions.push(action);
        }

        let next = self.backend.step(&desired, &actions).map_err(StepError::Physics)?;
        if next.len() != robots.len() {
            return Err(StepError::StateCount {
                expected: robots.len(),
                got: next.len(),
            });
        }

        for ((robot, state), desired) in robots.iter_mut().zip(&next).zip(&desired) {
            if !robot.enabled {
                continue;
            }
            robot.state = *state;
            if robot.motion.complete(now, desired) {
                log::debug!("{} -> {} at t={:.3}", robot.name(), robot.motion.mode().name(), now);
            }
        }

        if !self.observers.is_empty() {
            if self.names.len() != robots.len() {
                self.names = robots.iter().map(|robot| robot.name().to_owned()).collect();
            }
            let states: Vec<_> = robots.iter().map(|robot| robot.state).collect();
            let frame = StepFrame {
                time: self.backend.now(),
                names: &self.names,
                states: &states,
                desired: &desired,
                actions: &actions,
            };
            for observer in &mut self.observers {
                observer.on_step(&frame);
            }
        }

        Ok(now)
    }

    pub fn shutdown(&mut self) {
        self.backend.shutdown();
        for observer in &mut self.observers {
            observer.shutdown();
        }
    }
}
