//! Piecewise-polynomial trajectories.
//!
//! A [`Trajectory`] is a non-empty sequence of [`TrajectoryPiece`]s played back
//! one after another. Every piece carries one polynomial per axis (x, y, z and
//! yaw) with coefficients in ascending powers of the piece-local time.
//!
//! ```
//! use fleet_flight::trajectory::{Trajectory, TrajectoryPiece};
//!
//! let ramp = TrajectoryPiece::new(vec![0., 0.5], vec![], vec![1.], vec![], 2.);
//! let hold = TrajectoryPiece::new(vec![1.], vec![], vec![1.], vec![], 3.);
//! let trajectory = Trajectory::new(0, vec![ramp, hold]).unwrap();
//!
//! assert_eq!(trajectory.duration(), 5.);
//! assert_eq!(trajectory.evaluate(1.).position.x, 0.5);
//! assert_eq!(trajectory.evaluate(10.).position.x, 1.);
//! ```

use crate::CommandError;
use nalgebra::Vector3;

/// One polynomial segment of a trajectory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrajectoryPiece {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub z: Vec<f32>,
    pub yaw: Vec<f32>,
    /// Length of the piece in seconds.
    pub duration: f32,
}

impl TrajectoryPiece {
    pub fn new(x: Vec<f32>, y: Vec<f32>, z: Vec<f32>, yaw: Vec<f32>, duration: f32) -> Self {
        Self {
            x,
            y,
            z,
            yaw,
            duration,
        }
    }

    /// Evaluate the piece at local time `t` (not clamped).
    pub fn evaluate(&self, t: f32) -> TrajectoryPoint {
        let (x, vx, ax) = polyval(&self.x, t);
        let (y, vy, ay) = polyval(&self.y, t);
        let (z, vz, az) = polyval(&self.z, t);
        let (yaw, yaw_rate, _) = polyval(&self.yaw, t);

        TrajectoryPoint {
            position: Vector3::new(x, y, z),
            velocity: Vector3::new(vx, vy, vz),
            acceleration: Vector3::new(ax, ay, az),
            yaw,
            yaw_rate,
        }
    }
}

/// Position, its first two derivatives, yaw and yaw rate at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrajectoryPoint {
    pub position: Vector3<f32>,
    pub velocity: Vector3<f32>,
    pub acceleration: Vector3<f32>,
    pub yaw: f32,
    pub yaw_rate: f32,
}

/// An immutable, validated sequence of pieces.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    id: u32,
    pieces: Vec<TrajectoryPiece>,
    duration: f32,
}

impl Trajectory {
    /// Build a trajectory, rejecting an empty piece list or a piece whose
    /// duration is not strictly positive.
    pub fn new(id: u32, pieces: Vec<TrajectoryPiece>) -> Result<Self, CommandError> {
        if pieces.is_empty() {
            return Err(CommandError::MalformedTrajectory(format!(
                "trajectory {id} has no pieces"
            )));
        }

        if let Some((index, piece)) = pieces
            .iter()
            .enumerate()
            .find(|(_, piece)| !(piece.duration > 0. && piece.duration.is_finite()))
        {
            return Err(CommandError::MalformedTrajectory(format!(
                "piece {index} of trajectory {id} has duration {}",
                piece.duration
            )));
        }

        let duration = pieces.iter().map(|piece| piece.duration).sum();
        Ok(Self {
            id,
            pieces,
            duration,
        })
    }

    /// Parse the CSV layout `duration, x^0..x^n, y^0..y^n, z^0..z^n, yaw^0..yaw^n`,
    /// one piece per row. A leading header row is skipped.
    pub fn from_csv(id: u32, text: &str) -> Result<Self, TrajectoryParseError> {
        let mut pieces = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let cells: Vec<&str> = line.split(',').map(str::trim).collect();
            let values: Result<Vec<f32>, _> =
                cells.iter().map(|cell| cell.parse::<f32>()).collect();
            let values = match values {
                Ok(values) => values,
                // header
                Err(_) if pieces.is_empty() && cells[0].parse::<f32>().is_err() => continue,
                Err(err) => {
                    return Err(TrajectoryParseError {
                        line: line_no,
                        reason: err.to_string(),
                    })
                }
            };

            let coefficients = values.len().saturating_sub(1);
            if coefficients == 0 || coefficients % 4 != 0 {
                return Err(TrajectoryParseError {
                    line: line_no,
                    reason: format!("expected 1 + 4n columns, found {}", values.len()),
                });
            }

            let n = coefficients / 4;
            let axis = |k: usize| values[1 + k * n..1 + (k + 1) * n].to_vec();
            pieces.push(TrajectoryPiece::new(axis(0), axis(1), axis(2), axis(3), values[0]));
        }

        Trajectory::new(id, pieces).map_err(|err| TrajectoryParseError {
            line: 0,
            reason: err.to_string(),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn pieces(&self) -> &[TrajectoryPiece] {
        &self.pieces
    }

    /// Sum of all piece durations.
    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// Evaluate at global time `t`, holding the boundary values outside
    /// `[0, duration]`.
    pub fn evaluate(&self, t: f32) -> TrajectoryPoint {
        let t = t.max(0.).min(self.duration);

        let mut start = 0.;
        let last = self.pieces.len() - 1;
        for (index, piece) in self.pieces.iter().enumerate() {
            if index == last || t < start + piece.duration {
                let local = (t - start).max(0.).min(piece.duration);
                return piece.evaluate(local);
            }
            start += piece.duration;
        }

        unreachable!("trajectory pieces are never empty")
    }

    /// Replace every piece from `offset` on with `pieces`.
    pub(crate) fn splice(
        &self,
        offset: usize,
        pieces: Vec<TrajectoryPiece>,
    ) -> Result<Self, CommandError> {
        if offset > self.pieces.len() {
            return Err(CommandError::MalformedTrajectory(format!(
                "piece offset {offset} is past the {} stored pieces of trajectory {}",
                self.pieces.len(),
                self.id
            )));
        }

        let mut spliced = self.pieces[..offset].to_vec();
        spliced.extend(pieces);
        Trajectory::new(self.id, spliced)
    }
}

/// A CSV row that could not be turned into a piece.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("line {line}: {reason}")]
pub struct TrajectoryParseError {
    pub line: usize,
    pub reason: String,
}

/// Value, first and second derivative of the polynomial at `t`.
fn polyval(coefficients: &[f32], t: f32) -> (f32, f32, f32) {
    let (mut p, mut dp, mut ddp) = (0., 0., 0.);
    for &c in coefficients.iter().rev() {
        ddp = ddp * t + 2. * dp;
        dp = dp * t + p;
        p = p * t + c;
    }
    (p, dp, ddp)
}
