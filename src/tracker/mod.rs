// src/tracker/mod.rs

//! Machine work-cycle tracking.
//!
//! The pure state machine lives in [`core`]; [`machine`] is the async polling
//! shell around it and [`fleet`] spawns one shell per machine on the roster.
//! [`monitor`] abstracts where machine signals come from.

pub mod core;
pub mod filter;
pub mod fleet;
pub mod job_log;
pub mod machine;
pub mod monitor;

pub use self::core::{MachineState, Observation, Phase, TrackerCore, TrackerEffect};
pub use filter::{ProgramFilter, program_name};
pub use fleet::{FleetLoop, FleetRoster, TaskSpawner, TrackerSpawner};
pub use job_log::{JobLog, ToolOperation};
pub use machine::{MachineTracker, TrackerContext, TrackerSettings};
pub use monitor::{GatewayMonitor, MachineMonitor, parse_roster};
