//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Error type for queue registration and scheduling."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use acomms_dccl::DcclError;
use thiserror::Error;

/// Shared result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors surfaced by the queue manager.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueueError {
    /// No queue has been registered for the message type.
    #[error("no queue registered for message id {0}")]
    UnknownQueueKey(u32),
    /// A queue for the message type already exists.
    #[error("a queue for message id {0} is already registered")]
    DuplicateQueue(u32),
    /// The payload header names a different message type than the target queue.
    #[error("payload carries message id {actual} but was pushed to queue {expected}")]
    KeyMismatch {
        /// Queue the caller asked for.
        expected: u32,
        /// Identifier found in the payload header.
        actual: u32,
    },
    /// Queue settings failed validation.
    #[error("invalid queue configuration: {0}")]
    InvalidConfig(String),
    /// The underlying codec rejected a schema or payload.
    #[error(transparent)]
    Codec(#[from] DcclError),
}
