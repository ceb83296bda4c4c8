//! Fly every robot of a fleet: takeoff, hover and land, or play back a CSV
//! trajectory in between.

use clap::Parser;
use fleet_flight::config::Config;
use fleet_flight::plugin::PluginRegistry;
use fleet_flight::router::DispatchReport;
use fleet_flight::scheduler::{Runner, ServerHandle};
use fleet_flight::trajectory::Trajectory;
use fleet_flight::{Command, Server};
use std::path::PathBuf;

#[derive(clap::Parser)]
struct Args {
    /// Path to the fleet configuration file
    #[clap(default_value = "fleet.toml")]
    #[clap(short, long)]
    config: String,

    /// Takeoff height in meters
    #[clap(long, default_value_t = 1.0)]
    height: f32,

    /// Seconds to hover before landing
    #[clap(long, default_value_t = 3.0)]
    hover: f32,

    /// Trajectory CSV to fly after takeoff instead of hovering
    #[clap(short, long)]
    trajectory: Option<PathBuf>,

    /// Playback speed of the trajectory, 1 is real time
    #[clap(long, default_value_t = 1.0)]
    timescale: f32,
}

const TRAJECTORY_ID: u32 = 0;

fn warn_failures(verb: &str, report: &DispatchReport) {
    for (name, e) in report.failures() {
        log::warn!("{name} rejected {verb}: {e}");
    }
}

async fn fly_trajectory(
    handle: &mut ServerHandle,
    trajectory: &Trajectory,
    timescale: f32,
) -> Result<(), Box<dyn std::error::Error>> {
    let upload = Command::upload_trajectory(TRAJECTORY_ID, 0, trajectory.pieces().to_vec());
    warn_failures("upload", &handle.send(upload).await?);

    let start = Command::start_trajectory(TRAJECTORY_ID).timescale(timescale);
    warn_failures("start", &handle.send(start).await?);
    handle.sleep(trajectory.duration() / timescale).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let trajectory = match &args.trajectory {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let trajectory = Trajectory::from_csv(TRAJECTORY_ID, &text)?;
            log::info!(
                "{}: {} piece(s), {:.2} s",
                path.display(),
                trajectory.pieces().len(),
                trajectory.duration()
            );
            Some(trajectory)
        }
        None => None,
    };

    let config = Config::load(&args.config)?;
    let server = Server::from_config(&config, &PluginRegistry::default())?;
    let (runner, mut handle) = Runner::new(server);
    let simulation = tokio::spawn(runner.run());

    let ramp = 1.0 + args.height;
    warn_failures("takeoff", &handle.send(Command::takeoff(args.height, ramp)).await?);
    handle.sleep(ramp).await?;

    match &trajectory {
        Some(trajectory) => fly_trajectory(&mut handle, trajectory, args.timescale).await?,
        None => handle.sleep(args.hover).await?,
    }

    warn_failures("land", &handle.send(Command::land(0.03, ramp)).await?);
    handle.sleep(ramp).await?;
    drop(handle);

    let server = simulation.await??;
    for robot in server.robots() {
        let p = robot.state().position;
        log::info!("{} landed at ({:.2}, {:.2}, {:.2})", robot.name(), p.x, p.y, p.z);
    }
    Ok(())
}
