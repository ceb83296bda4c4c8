use crate::router::DispatchReport;
use crate::{Command, CommandError, Server, StepError};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, MissedTickBehavior};

struct Request {
    command: Command,
    reply: oneshot::Sender<Result<DispatchReport, CommandError>>,
}

/// Owns the [`Server`] and steps it, applying queued commands between steps.
pub struct Runner {
    server: Server,
    inbox: mpsc::UnboundedReceiver<Request>,
    time: watch::Sender<f32>,
}

/// Cloneable command inbox of a running [`Runner`].
#[derive(Clone)]
pub struct ServerHandle {
    inbox: mpsc::UnboundedSender<Request>,
    time: watch::Receiver<f32>,
}

impl Runner {
    pub fn new(server: Server) -> (Self, ServerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (time_tx, time_rx) = watch::channel(server.now());

        let runner = Self {
            server,
            inbox: rx,
            time: time_tx,
        };
        let handle = ServerHandle {
            inbox: tx,
            time: time_rx,
        };
        (runner, handle)
    }

    /// Step until every [`ServerHandle`] is dropped, then shut the server down
    /// and hand it back. A failed step shuts down and returns the error.
    pub async fn run(mut self) -> Result<Server, StepError> {
        let period = self.server.max_dt();
        let mut interval = if period.is_zero() {
            None
        } else {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(interval)
        };

        loop {
            loop {
                match self.inbox.try_recv() {
                    Ok(request) => {
                        let report = self.server.dispatch(&request.command);
                        // The caller may have stopped waiting
                        let _ = request.reply.send(report);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.server.shutdown();
                        return Ok(self.server);
                    }
                }
            }

            if let Err(e) = self.server.step() {
                self.server.shutdown();
                return Err(e);
            }
            self.time.send_replace(self.server.now());

            match &mut interval {
                Some(interval) => {
                    interval.tick().await;
                }
                None => tokio::task::yield_now().await,
            }
        }
    }
}

impl ServerHandle {
    /// Queue `command` for the next step boundary and wait for its report.
    pub async fn send(&self, command: Command) -> Result<DispatchReport, CommandError> {
        let (reply, response) = oneshot::channel();
        self.inbox
            .send(Request { command, reply })
            .map_err(|_| CommandError::Shutdown)?;
        response.await.map_err(|_| CommandError::Shutdown)?
    }

    /// Latest simulation time published by the runner.
    pub fn now(&self) -> f32 {
        *self.time.borrow()
    }

    /// Wait until `seconds` of simulation time have passed.
    pub async fn sleep(&mut self, seconds: f32) -> Result<(), CommandError> {
        let until = *self.time.borrow_and_update() + seconds;
        while *self.time.borrow_and_update() < until {
            self.time.changed().await.map_err(|_| CommandError::Shutdown)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RobotSpec;
    use crate::control::{Action, NoneController};
    use crate::physics::PhysicsBackend;
    use crate::trajectory::Trajectory;
    use crate::{BackendFailure, GroupMask, Setpoint, State};
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;

    fn spec(name: &str) -> RobotSpec {
        RobotSpec {
            name: name.into(),
            initial_position: Vector3::zeros(),
            group_mask: GroupMask::ALL,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn applies_commands_between_steps() {
        let server = Server::with_builtins(vec![spec("cf1")], "none", "none", 0.01).unwrap();
        let (runner, mut handle) = Runner::new(server);
        let task = tokio::spawn(runner.run());

        let report = handle.send(Command::takeoff(1., 1.)).await.unwrap();
        assert!(report.is_success());
        handle.sleep(1.5).await.unwrap();
        assert!(handle.now() >= 1.5);

        let report = handle.send(Command::land(0.1, 1.).to("cf9")).await;
        assert_eq!(report, Err(CommandError::UnknownTarget("cf9".into())));

        drop(handle);
        let server = task.await.unwrap().unwrap();
        assert_abs_diff_eq!(server.robots()[0].state().position.z, 1., epsilon = 1e-5);
    }

    #[tokio::test]
    async fn flies_a_csv_trajectory_through_the_handle() {
        let csv = "duration,x^0,x^1,y^0,y^1,z^0,z^1,yaw^0,yaw^1\n\
                   2.0,0,0.5,0,0,1,0,0,0\n";
        let trajectory = Trajectory::from_csv(0, csv).unwrap();
        let robots = vec![spec("cf1"), spec("cf2")];
        let server = Server::with_builtins(robots, "none", "none", 0.01).unwrap();
        let (runner, mut handle) = Runner::new(server);
        let task = tokio::spawn(runner.run());

        handle.send(Command::takeoff(1., 1.)).await.unwrap();
        handle.sleep(1.).await.unwrap();

        let upload = Command::upload_trajectory(0, 0, trajectory.pieces().to_vec());
        assert!(handle.send(upload).await.unwrap().is_success());
        let start = Command::start_trajectory(0).timescale(2.);
        assert!(handle.send(start).await.unwrap().is_success());
        handle.sleep(trajectory.duration() / 2. + 0.05).await.unwrap();

        drop(handle);
        let server = task.await.unwrap().unwrap();
        for robot in server.robots() {
            assert_abs_diff_eq!(robot.state().position, Vector3::new(1., 0., 1.), epsilon = 1e-5);
            assert_eq!(robot.motion().mode().name(), "hover");
        }
    }

    struct Diverging;

    impl PhysicsBackend for Diverging {
        fn now(&self) -> f32 {
            0.
        }

        fn step(&mut self, _: &[Setpoint], _: &[Action]) -> Result<Vec<State>, BackendFailure> {
            Err(BackendFailure::new("diverged"))
        }
    }

    #[tokio::test]
    async fn step_failure_stops_the_runner() {
        let server = Server::from_parts(vec![spec("cf1")], Box::new(Diverging), |_| {
            Ok(Box::new(NoneController))
        })
        .unwrap();
        let (runner, handle) = Runner::new(server);

        let result = runner.run().await;
        assert!(matches!(result, Err(StepError::Physics(_))));
        assert_eq!(
            handle.send(Command::emergency()).await,
            Err(CommandError::Shutdown)
        );
    }
}
