//! Main simulation server executable entry point.
//!
//! # Architecture
//!
//! The executable:
//!
//!     - Initialises the session, logging and parameters
//!     - Builds the physics world, the robot and the scene
//!     - Waits for a client, either over TCP or from a command script
//!     - Sends the robot configuration and waits for the acknowledgement
//!     - Runs the scheduler until the client exits or disconnects
//!     - Saves a summary of the run into the session directory

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{Report, eyre::WrapErr};
use log::{error, info, warn};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use structopt::StructOpt;

// Internal
use comms_if::net::{LineServer, LineStream, ReplayStream};
use sim_lib::{
    actuator::ActuatorConfig,
    controller::{ControllerError, SessionController},
    params::SimExecParams,
    physics::SimpleWorld,
    robot::StandardModels,
    scheduler::{RunSummary, Scheduler, SchedulerConfig},
    sim::Simulation,
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Modules whose per-step output is kept out of the log.
const QUIET_TARGETS: [&str; 2] = ["sim_lib::physics", "sim_lib::actuator::joint"];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "sim_exec", about = "Network controlled robot simulation server")]
struct Opts {
    /// Port to listen for the client on
    #[structopt(short, long)]
    port: Option<u16>,

    /// Robot model to build
    #[structopt(short, long)]
    robot: Option<i32>,

    /// Scene to build around the robot
    #[structopt(long)]
    scene: Option<u32>,

    /// Run as fast as possible instead of in real time
    #[structopt(long = "no-realtime")]
    no_realtime: bool,

    /// Length of one simulation step in seconds
    #[structopt(short = "s", long)]
    step_length: Option<f64>,

    /// Frames per second, `0` runs one step per frame
    #[structopt(long)]
    fps: Option<f64>,

    /// Replay a command script instead of waiting for a TCP client
    #[structopt(long, parse(from_os_str))]
    script: Option<PathBuf>,

    /// Parameter file to use instead of params/sim_exec.toml
    #[structopt(long, parse(from_os_str))]
    params: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new(
        "sim_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &QUIET_TARGETS, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Simulation Server Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params_result = match opts.params {
        Some(ref path) => util::params::load_path::<SimExecParams>(path),
        None => util::params::load::<SimExecParams>("sim_exec.toml"),
    };
    let mut params = params_result.wrap_err("Could not load sim_exec params")?;

    apply_overrides(&mut params, &opts);
    params.validate().wrap_err("Invalid sim_exec params")?;

    info!("Exec parameters loaded");

    // ---- BUILD THE WORLD ----

    let sim = Simulation::new(
        Box::new(SimpleWorld::new(params.initial_gravity)),
        Box::new(StandardModels),
        ActuatorConfig::from(&params),
        params.robot,
        params.scene
    ).wrap_err("Could not build the robot")?;

    // ---- RUN THE SESSION ----

    let summary = match opts.script {
        Some(ref path) => {
            info!("Replaying command script {:?}", path);

            let script = File::open(path)
                .wrap_err_with(|| format!("Could not open the script {:?}", path))?;
            let tm_path = session.session_root.join("telemetry.log");
            let telemetry = File::create(&tm_path)
                .wrap_err("Could not create the telemetry log")?;

            info!("Writing telemetry to {:?}", tm_path);

            let stream = LineStream::new(ReplayStream::new(BufReader::new(script), telemetry));
            run_session(&params, sim, stream)?
        },
        None => {
            let server = LineServer::bind(params.tcp_port)
                .wrap_err("Failed to start the server")?;

            info!("Waiting for a client on port {}", params.tcp_port);

            let stream = server.accept()
                .wrap_err("Failed to accept the client")?;
            run_session(&params, sim, stream)?
        }
    };

    // ---- SHUTDOWN ----

    if let Some(s) = summary {
        info!(
            "{} steps, {:.2} s simulated, last speed {:.2}x at {:.1} fps",
            s.num_steps, s.sim_time_s, s.sim_speed, s.fps
        );
        session.save("run_summary.json", s);
    }

    info!("End of execution");

    session.exit();

    Ok(())
}

/// Apply command line overrides to the loaded parameters.
fn apply_overrides(params: &mut SimExecParams, opts: &Opts) {
    if let Some(port) = opts.port {
        params.tcp_port = port;
    }
    if let Some(robot) = opts.robot {
        params.robot = robot;
    }
    if let Some(scene) = opts.scene {
        params.scene = scene;
    }
    if opts.no_realtime {
        params.real_time = false;
    }
    if let Some(step) = opts.step_length {
        params.step_length_s = step;
    }
    if let Some(fps) = opts.fps {
        if fps > 0.0 {
            params.fps = fps;
        }
        else {
            params.use_fps_control = false;
        }
    }
}

/// Run a session with a connected client.
///
/// Losing the client ends the session without an error, failing to build a requested robot does
/// not.
fn run_session<S>(
    params: &SimExecParams,
    sim: Simulation,
    stream: LineStream<S>
) -> Result<Option<RunSummary>, Report>
where
    S: Read + Write
{
    let mut controller = SessionController::new(stream, &sim);

    match controller.handshake(&sim) {
        Ok(true) => (),
        Ok(false) => {
            warn!("No acknowledgement from the client, ending the session");
            return Ok(None)
        },
        Err(e) => {
            error!("Handshake failed: {}", e);
            return Ok(None)
        }
    }

    let mut scheduler = Scheduler::new(SchedulerConfig::from(params), sim, controller);

    match scheduler.run() {
        Ok(s) => Ok(Some(s)),
        Err(ControllerError::Stream(e)) => {
            error!("Lost the client: {}", e);
            Ok(Some(scheduler.summary()))
        },
        Err(e) => Err(e).wrap_err("Simulation failed"),
    }
}
