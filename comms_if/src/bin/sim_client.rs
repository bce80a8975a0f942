//! Simple simulation client
//!
//! Connects to the simulation server, acknowledges the robot configuration and then holds every
//! joint at its default position using a proportional voltage law.

use comms_if::{
    net::{LineStream, EXIT_LINE},
    tm::{RobotConfiguration, Telemetry},
};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "sim_client", about = "Hold all joints of the simulated robot at their default positions")]
struct Opts {
    /// Host the simulation server runs on
    #[structopt(long, default_value = "localhost")]
    host: String,

    /// Port the simulation server listens on
    #[structopt(short, long, default_value = "8000")]
    port: u16,

    /// Proportional gain from normalised position error to normalised voltage
    #[structopt(short, long, default_value = "2.0")]
    gain: f64,

    /// Number of steps to run before sending EXIT
    #[structopt(short, long, default_value = "1000")]
    steps: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::from_args();

    let mut stream = match LineStream::connect((opts.host.as_str(), opts.port)) {
        Ok(s) => s,
        Err(e) => {
            println!("Could not connect to the server");
            return Err(e.into())
        }
    };

    // Read the configuration and acknowledge it
    let config = RobotConfiguration::parse(|| -> Result<String, Box<dyn std::error::Error>> {
        Ok(stream.receive_line()?)
    })?;
    stream.send("ACK\n")?;

    println!(
        "Connected: {} bodies, {} joints, {} accels",
        config.num_bodies(),
        config.num_joints(),
        config.num_accels
    );
    for joint in config.joints.iter() {
        println!("    joint {:2}: {} (default {:+.3})", joint.index, joint.name, joint.default_position);
    }

    for step in 0..opts.steps {
        let line = stream.receive_line()?;
        if line == EXIT_LINE {
            println!("Server closed the connection");
            return Ok(())
        }

        let tm = Telemetry::parse(
            &line,
            config.num_joints(),
            config.num_accels,
            config.num_bodies()
        )?;

        let voltages: Vec<String> = config
            .joints
            .iter()
            .zip(tm.joint_positions.iter())
            .map(|(j, p)| format!("{:.6}", (opts.gain * (j.default_position - p)).max(-1.0).min(1.0)))
            .collect();

        stream.send(&format!("UX {}\nDONE\n", voltages.join(" ")))?;

        if step % 100 == 0 {
            println!("t = {:8.3} s, positions: {:?}", tm.time, tm.joint_positions);
        }
    }

    stream.send("EXIT\n")?;

    Ok(())
}
