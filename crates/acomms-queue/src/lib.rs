//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Per-type message queues and link-budget scheduling."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Transmission scheduling for low-rate links.
//!
//! Encoded messages wait in one [`Queue`] per message type. Whenever the link offers a
//! slot, the [`QueueManager`] fills it with acknowledgements and then with the highest
//! priority messages that still fit.

pub mod error;
pub mod manager;
pub mod metrics;
pub mod priority;
pub mod queue;

pub use error::{QueueError, Result};
pub use manager::{
    ack_schema, AckHandler, ExpireHandler, QueueManager, QueueSizeHandler, ReceiveHandler,
    ACK_MESSAGE,
};
pub use metrics::{QueueMetrics, QueueMetricsExporter};
pub use priority::{ConfiguredEviction, EvictionPolicy, ExponentialAging, LinearAging, PriorityPolicy};
pub use queue::{payload_checksum, PushOutcome, Queue, QueuedMessage};
