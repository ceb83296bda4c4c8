use crate::trajectory::TrajectoryPiece;
use crate::{GroupMask, Setpoint};
use nalgebra::Vector3;

/// Who a command is addressed to.
#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    /// Every enabled robot matched by the group mask.
    All,
    /// One robot by name; the group mask is ignored.
    Robot(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum CommandKind {
    Takeoff {
        height: f32,
        duration: f32,
    },
    Land {
        height: f32,
        duration: f32,
    },
    GoTo {
        goal: Vector3<f32>,
        yaw: f32,
        duration: f32,
        relative: bool,
    },
    UploadTrajectory {
        trajectory_id: u32,
        piece_offset: usize,
        pieces: Vec<TrajectoryPiece>,
    },
    StartTrajectory {
        trajectory_id: u32,
        timescale: f32,
        reverse: bool,
        relative: bool,
    },
    NotifySetpointsStop,
    Emergency,
    /// Stream one full-state setpoint.
    FullState(Setpoint),
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Takeoff { .. } => "takeoff",
            CommandKind::Land { .. } => "land",
            CommandKind::GoTo { .. } => "go_to",
            CommandKind::UploadTrajectory { .. } => "upload_trajectory",
            CommandKind::StartTrajectory { .. } => "start_trajectory",
            CommandKind::NotifySetpointsStop => "notify_setpoints_stop",
            CommandKind::Emergency => "emergency",
            CommandKind::FullState(_) => "cmd_full_state",
        }
    }
}

/// A flight command and its addressees.
///
/// Commands are built for the whole fleet and narrowed with [`Command::to`] or
/// [`Command::with_group_mask`]:
///
/// ```
/// use fleet_flight::{Command, GroupMask, Target};
///
/// let command = Command::takeoff(1.0, 2.0).with_group_mask(GroupMask(0b10));
/// assert_eq!(command.target, Target::All);
///
/// let command = Command::start_trajectory(0).timescale(0.5).reversed().to("cf2");
/// assert_eq!(command.target, Target::Robot("cf2".into()));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub target: Target,
    pub group_mask: GroupMask,
    pub kind: CommandKind,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            target: Target::All,
            group_mask: GroupMask::ALL,
            kind,
        }
    }

    pub fn takeoff(height: f32, duration: f32) -> Self {
        Self::new(CommandKind::Takeoff { height, duration })
    }

    pub fn land(height: f32, duration: f32) -> Self {
        Self::new(CommandKind::Land { height, duration })
    }

    pub fn go_to(goal: Vector3<f32>, yaw: f32, duration: f32) -> Self {
        Self::new(CommandKind::GoTo {
            goal,
            yaw,
            duration,
            relative: false,
        })
    }

    pub fn upload_trajectory(
        trajectory_id: u32,
        piece_offset: usize,
        pieces: Vec<TrajectoryPiece>,
    ) -> Self {
        Self::new(CommandKind::UploadTrajectory {
            trajectory_id,
            piece_offset,
            pieces,
        })
    }

    pub fn start_trajectory(trajectory_id: u32) -> Self {
        Self::new(CommandKind::StartTrajectory {
            trajectory_id,
            timescale: 1.,
            reverse: false,
            relative: false,
        })
    }

    pub fn notify_setpoints_stop() -> Self {
        Self::new(CommandKind::NotifySetpointsStop)
    }

    pub fn emergency() -> Self {
        Self::new(CommandKind::Emergency)
    }

    pub fn full_state(setpoint: Setpoint) -> Self {
        Self::new(CommandKind::FullState(setpoint))
    }

    /// Address a single robot by name.
    pub fn to(mut self, name: impl Into<String>) -> Self {
        self.target = Target::Robot(name.into());
        self
    }

    pub fn with_group_mask(mut self, group_mask: GroupMask) -> Self {
        self.group_mask = group_mask;
        self
    }

    /// Interpret a go-to goal or trajectory relative to the current position.
    /// No effect on other commands.
    pub fn relative(mut self) -> Self {
        match &mut self.kind {
            CommandKind::GoTo { relative, .. } | CommandKind::StartTrajectory { relative, .. } => {
                *relative = true
            }
            _ => {}
        }
        self
    }

    /// Play a trajectory backwards. No effect on other commands.
    pub fn reversed(mut self) -> Self {
        if let CommandKind::StartTrajectory { reverse, .. } = &mut self.kind {
            *reverse = true;
        }
        self
    }

    /// Playback speed of a trajectory. No effect on other commands.
    pub fn timescale(mut self, scale: f32) -> Self {
        if let CommandKind::StartTrajectory { timescale, .. } = &mut self.kind {
            *timescale = scale;
        }
        self
    }
}
