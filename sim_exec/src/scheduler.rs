//! # Scheduler
//!
//! The scheduler drives the simulation. One call to [`Scheduler::step_frame`] covers one visual
//! frame, inside which it repeats
//!
//! 1. Step the physics, unless paused by the caller or by the client.
//! 2. Run one control cycle of the session controller.
//! 3. Sleep to keep pace with the wall clock, in real time mode.
//!
//! until the frame interval is used up. With frame rate control off every frame is a single step.
//!
//! The achieved simulation speed (simulated seconds per real second) and frame rate are
//! recomputed once every whole real second.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::io::{Read, Write};
use std::time::{Duration, Instant};
use log::{debug, info, warn};
use serde::Serialize;

use util::time::seconds_to_std_duration;

use crate::controller::{ControllerError, SessionController};
use crate::params::SimExecParams;
use crate::sim::Simulation;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Longest allowed frame interval, i.e. a minimum of 2 frames per second.
///
/// Units: seconds
const MAX_FRAME_TIME_S: f64 = 0.5;

/// How long to idle per iteration while paused.
const PAUSE_SLEEP: Duration = Duration::from_millis(1);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The simulated time, as reported in telemetry.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationClock {
    sim_time: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Units: seconds
    pub step_length_s: f64,

    pub real_time: bool,

    /// Target interval between two visual frames.
    ///
    /// Units: seconds
    pub frame_time_s: f64,

    pub use_fps_control: bool,
}

/// Statistics saved at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub num_steps: u64,
    pub num_frames: u64,
    pub sim_time_s: f64,
    pub sim_speed: f64,
    pub fps: f64,
    pub recorded_frames: u64,
}

pub struct Scheduler<S> {
    config: SchedulerConfig,

    sim: Simulation,
    controller: SessionController<S>,
    clock: SimulationClock,

    /// Pause requested by the caller, stops both physics and the controller
    pause: bool,

    /// False once the session has ended
    running: bool,

    /// Wall clock time the simulation should have reached
    reference: Instant,

    /// Smoothed duration of one iteration
    ///
    /// Units: seconds
    iteration_s: f64,

    last_frame: Instant,

    interval_begin: Instant,
    interval_sim_time: f64,
    interval_frames: u32,

    sim_speed: f64,
    fps: f64,

    num_steps: u64,
    num_frames: u64,
    recorded_frames: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimulationClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Units: seconds
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn advance(&mut self, dt: f64) {
        self.sim_time += dt;
    }

    pub fn reset(&mut self) {
        self.sim_time = 0.0;
    }
}

impl From<&SimExecParams> for SchedulerConfig {
    fn from(params: &SimExecParams) -> Self {
        let frame_time_s = if params.fps > 0.0 {
            1.0 / params.fps
        }
        else {
            MAX_FRAME_TIME_S
        };

        if frame_time_s > MAX_FRAME_TIME_S {
            warn!("Minimum frame rate is 2 fps, limiting the frame interval");
        }

        Self {
            step_length_s: params.step_length_s,
            real_time: params.real_time,
            frame_time_s: frame_time_s.min(MAX_FRAME_TIME_S),
            use_fps_control: params.use_fps_control,
        }
    }
}

impl<S> Scheduler<S>
where
    S: Read + Write
{
    /// Create a scheduler for a session which has completed its handshake.
    pub fn new(config: SchedulerConfig, sim: Simulation, controller: SessionController<S>) -> Self {
        info!(
            "Starting simulation with step = {:.3} s and fps = {:.0}{}",
            config.step_length_s,
            1.0 / config.frame_time_s,
            if config.use_fps_control { "" } else { " (fps control off)" }
        );

        let now = Instant::now();

        Self {
            config,
            sim,
            controller,
            clock: SimulationClock::new(),
            pause: false,
            running: true,
            reference: now,
            iteration_s: 0.0,
            last_frame: now,
            interval_begin: now,
            interval_sim_time: 0.0,
            interval_frames: 0,
            sim_speed: 0.0,
            fps: 0.0,
            num_steps: 0,
            num_frames: 0,
            recorded_frames: 0,
        }
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn controller(&self) -> &SessionController<S> {
        &self.controller
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn set_pause(&mut self, pause: bool) {
        self.pause = pause;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Simulated seconds per real second over the last whole second.
    pub fn sim_speed(&self) -> f64 {
        self.sim_speed
    }

    /// Frames per second over the last whole second.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Run frames until the session ends.
    pub fn run(&mut self) -> Result<RunSummary, ControllerError> {
        while self.step_frame(false)? {}

        info!("Leaving the simulation loop");
        Ok(self.summary())
    }

    /// Run one frame. With `single_step` the frame is exactly one iteration.
    ///
    /// Returns `false` once the session has ended.
    pub fn step_frame(&mut self, single_step: bool) -> Result<bool, ControllerError> {
        if !self.running {
            return Ok(false)
        }

        let mut now;

        loop {
            let start = Instant::now();

            if !(self.pause || self.controller.is_paused()) {
                self.physics_step();
            }

            if !self.pause {
                let result = self.controller.control(&mut self.sim, &mut self.clock);
                self.running = matches!(result, Ok(true));
                result?;

                if self.controller.record_requested() {
                    self.recorded_frames += 1;
                }
            }

            if self.config.real_time && !(self.pause || self.controller.is_paused()) {
                self.pace();
            }

            now = Instant::now();
            self.iteration_s = 0.7 * self.iteration_s
                + 0.3 * now.duration_since(start).as_secs_f64();

            if self.pause {
                std::thread::sleep(PAUSE_SLEEP);
            }

            let frame_elapsed = now.duration_since(self.last_frame).as_secs_f64()
                + 0.5 * self.iteration_s;

            if !self.running
                || single_step
                || !self.config.use_fps_control
                || frame_elapsed >= self.config.frame_time_s
            {
                break
            }
        }

        self.last_frame = now;
        self.update_stats(now);
        self.interval_frames += 1;
        self.num_frames += 1;

        Ok(self.running)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            num_steps: self.num_steps,
            num_frames: self.num_frames,
            sim_time_s: self.clock.sim_time(),
            sim_speed: self.sim_speed,
            fps: self.fps,
            recorded_frames: self.recorded_frames,
        }
    }

    fn physics_step(&mut self) {
        self.sim.step(self.config.step_length_s);
        self.clock.advance(self.config.step_length_s);
        self.interval_sim_time += self.config.step_length_s;
        self.num_steps += 1;
    }

    /// Keep the simulation in step with the wall clock.
    fn pace(&mut self) {
        self.reference += seconds_to_std_duration(self.config.step_length_s);
        let now = Instant::now();

        if now < self.reference {
            std::thread::sleep(self.reference - now);
        }
        else if now.duration_since(self.reference) > Duration::from_secs(1) {
            debug!("More than a second behind real time, resetting the reference");
            self.reference = now;
        }
    }

    fn update_stats(&mut self, now: Instant) {
        let interval = now.duration_since(self.interval_begin);

        if interval.as_secs() >= 1 {
            let interval_s = interval.as_secs_f64();

            self.sim_speed = self.interval_sim_time / interval_s;
            self.fps = self.interval_frames as f64 / interval_s;

            debug!(
                "time: {:.2} s, speed: {:.2}x, fps: {:.2}",
                self.clock.sim_time(), self.sim_speed, self.fps
            );

            self.interval_sim_time = 0.0;
            self.interval_frames = 0;
            self.interval_begin = now;
        }
    }
}
