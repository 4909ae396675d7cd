//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the acomms runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Core shared primitives for the acomms workspace.
//! This crate exposes configuration loading, tracing initialisation and the
//! injectable time sources consumed by the codec and queue crates.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AcommsConfig, CodecConfig, Eviction, IdCodecConfig, LoggingConfig, Manipulator, QueueConfig,
    QueueEntryConfig, QueueManagerConfig, BROADCAST_ID,
};
pub use logging::{init_tracing, log_file_name, LogFormat};
pub use time::{Clock, ManualClock, SharedClock, SystemClock};
