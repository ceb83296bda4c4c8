/// A per-robot rejection of a command.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown robot: {0}")]
    UnknownTarget(String),

    #[error("trajectory {id} has not been uploaded")]
    UndefinedTrajectory { id: u32 },

    #[error("invalid duration: {0} s")]
    InvalidDuration(f32),

    #[error("invalid timescale: {0}")]
    InvalidTimescale(f32),

    #[error("malformed trajectory: {0}")]
    MalformedTrajectory(String),

    #[error("robot is disabled: {0}")]
    RobotDisabled(String),

    #[error("server is no longer running")]
    Shutdown,
}

/// A failure raised by a controller or physics backend plugin.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct BackendFailure(pub String);

impl BackendFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// A step that could not be completed. Nothing from the step is committed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StepError {
    #[error("controller of {robot} failed: {source}")]
    Controller {
        robot: String,
        #[source]
        source: BackendFailure,
    },

    #[error("physics backend failed: {0}")]
    Physics(#[source] BackendFailure),

    #[error("physics backend returned {got} states for {expected} robots")]
    StateCount { expected: usize, got: usize },
}

/// Startup configuration problems. Raised before any robot is built.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("robot name must not be empty")]
    EmptyName,

    #[error("robot defined twice: {0}")]
    DuplicateRobot(String),

    #[error("no robots configured")]
    NoRobots,

    #[error("robot {robot} has unknown type {kind}")]
    UnknownRobotType { robot: String, kind: String },

    #[error("unknown controller: {0}")]
    UnknownController(String),

    #[error("unknown physics backend: {0}")]
    UnknownBackend(String),

    #[error("unknown observer: {0}")]
    UnknownObserver(String),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
