//! Command-line tooling shared by the soothsayer binaries.

pub mod logging;
pub mod simulator;

pub use simulator::{tokenize, SimulationReport, Simulator};
