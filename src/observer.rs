use crate::control::Action;
use crate::{Setpoint, State};

/// Read-only view of one completed step.
#[derive(Clone, Copy, Debug)]
pub struct StepFrame<'a> {
    /// Simulation time once the step has been taken.
    pub time: f32,
    pub names: &'a [String],
    pub states: &'a [State],
    pub desired: &'a [Setpoint],
    pub actions: &'a [Action],
}

/// Notified synchronously after every committed step.
pub trait Observer: Send {
    fn on_step(&mut self, frame: &StepFrame<'_>);

    fn shutdown(&mut self) {}
}

/// Logs every robot's position at info level once every `every` steps.
#[derive(Clone, Debug)]
pub struct LogObserver {
    every: u64,
    steps: u64,
}

impl LogObserver {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            steps: 0,
        }
    }
}

impl Observer for LogObserver {
    fn on_step(&mut self, frame: &StepFrame<'_>) {
        let due = self.steps % self.every == 0;
        self.steps += 1;
        if !due {
            return;
        }

        for (name, state) in frame.names.iter().zip(frame.states) {
            let p = state.position;
            log::info!(
                "t={:.3} {}: ({:.3}, {:.3}, {:.3}) yaw {:.2}",
                frame.time,
                name,
                p.x,
                p.y,
                p.z,
                state.yaw()
            );
        }
    }

    fn shutdown(&mut self) {
        log::info!("log observer saw {} steps", self.steps);
    }
}
