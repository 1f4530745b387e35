//! Lagrangian drift engine for fish larvae.
//!
//! A [`Simulation`] owns a hydrodynamic [`dataset::Dataset`], releases particles
//! on a schedule, moves every living particle through an ordered pipeline of
//! behaviour [`actions`] each time step, and records particle states through an
//! [`output::OutputSink`].

pub mod actions;
pub mod bus;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod dataset;
pub mod error;
pub mod io;
pub mod kernels;
pub mod output;
pub mod particle;
pub mod registry;
pub mod release;
pub mod rng;
pub mod simulation;
pub mod units;
pub mod zone;

use std::io::Write;
use std::path::Path;

pub use config::Configuration;
pub use error::{SimError, SimResult};
pub use particle::{Mortality, Particle};
pub use simulation::{Registries, RunSummary, Simulation, StopHandle};

/// Load a configuration file and run it to completion, writing NDJSON to `out`.
pub fn run_file<W>(path: &Path, out: W) -> SimResult<RunSummary>
where
    W: Write + Send + 'static,
{
    let config = Configuration::load_from_path(path)?;
    let mut simulation = Simulation::from_config(config, Box::new(io::frame::NdjsonSink::new(out)))?;
    simulation.run()
}
