//! Judge worker for a Verilog online judge.
//!
//! The worker pops judging jobs from a shared Redis queue, compiles the
//! submitted design together with a hidden testbench, simulates it under a
//! wall-clock limit, grades the produced waveform dump, and publishes the
//! verdict on a per-submission result channel.

pub mod config;
pub mod data;
pub mod error;
pub mod judge;
pub mod queue;
pub mod run;
pub mod vcd;
pub mod worker;

pub use error::{Error, Result};

pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use log::{debug, error, info, trace, warn};
    pub use serde::{Deserialize, Serialize};
    pub use std::path::{Path, PathBuf};
    pub use std::time::Duration;
}
