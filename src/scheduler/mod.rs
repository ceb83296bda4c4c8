//! Tick sources driving [`Server::step`].

use crate::{Server, StepError};
use embedded_time::{clock, duration::Microseconds, Clock, ConversionError};

mod runner;
pub use runner::{Runner, ServerHandle};

/// A pacing error caused by clock timing or a failed step
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("clock error: {0:?}")]
    Clock(clock::Error),

    #[error("time conversion error: {0:?}")]
    Time(ConversionError),

    #[error(transparent)]
    Step(#[from] StepError),
}

impl From<clock::Error> for Error {
    fn from(clock_error: clock::Error) -> Self {
        Error::Clock(clock_error)
    }
}

impl From<ConversionError> for Error {
    fn from(time_error: ConversionError) -> Self {
        Error::Time(time_error)
    }
}

/// Steps as fast as possible, but never closer together than a minimum period
/// measured on `C`. A zero period makes every poll due.
pub struct Pacer<C> {
    clock: C,
    min_period_us: u32,
    last_step_us: Option<u32>,
}

impl<C> Pacer<C>
where
    C: Clock<T = u32>,
{
    pub fn new(clock: C, min_period: Microseconds<u32>) -> Self {
        Self {
            clock,
            min_period_us: min_period.0,
            last_step_us: None,
        }
    }

    /// Returns true, and starts a new period, when a step is due.
    pub fn poll(&mut self) -> Result<bool, Error> {
        let now_us = self.micros_since_epoch()?.0;

        let due = match self.last_step_us {
            None => true,
            Some(last) => now_us.wrapping_sub(last) >= self.min_period_us,
        };
        if due {
            self.last_step_us = Some(now_us);
        }
        Ok(due)
    }

    /// Busy-poll the clock and step `server` `steps` times.
    pub fn run_steps(&mut self, server: &mut Server, steps: usize) -> Result<(), Error> {
        let mut done = 0;
        while done < steps {
            if self.poll()? {
                server.step()?;
                done += 1;
            } else {
                core::hint::spin_loop();
            }
        }
        Ok(())
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn micros_since_epoch(&mut self) -> Result<Microseconds<u32>, Error> {
        let instant = self.clock.try_now()?;
        Microseconds::try_from(instant.duration_since_epoch()).map_err(Into::into)
    }
}
