//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Log context and lifecycle events for acomms nodes."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Contextual logging for the codec and queue layers.

use tracing::Level;

pub mod macros;

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Local modem identifier.
    pub modem: Option<u32>,
    /// Message type name.
    pub message: Option<&'a str>,
    /// Queue key (message identifier).
    pub queue: Option<u32>,
    /// Destination modem identifier.
    pub dest: Option<u32>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the local modem identifier.
    pub fn with_modem(mut self, modem: u32) -> Self {
        self.modem = Some(modem);
        self
    }

    /// Attach a message type name.
    pub fn with_message(mut self, message: &'a str) -> Self {
        self.message = Some(message);
        self
    }

    /// Attach a queue key.
    pub fn with_queue(mut self, queue: u32) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Attach a destination.
    pub fn with_dest(mut self, dest: u32) -> Self {
        self.dest = Some(dest);
        self
    }
}

/// Outcome of a lifecycle event such as a queue manager starting up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// The operation completed successfully.
    Success,
    /// The operation failed or was aborted.
    Fault,
}

impl SystemEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

/// Lifecycle event: `info` on success, `error` on fault.
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let default = LogContext::default();
    let ctx = context.unwrap_or(&default);
    match outcome {
        SystemEventOutcome::Success => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome.as_str(),
            modem = ctx.modem.unwrap_or_default(),
            msg_type = ctx.message.unwrap_or(""),
            queue = ctx.queue.unwrap_or_default(),
            dest = ctx.dest.unwrap_or_default(),
            message = %message
        ),
        SystemEventOutcome::Fault => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome.as_str(),
            modem = ctx.modem.unwrap_or_default(),
            msg_type = ctx.message.unwrap_or(""),
            queue = ctx.queue.unwrap_or_default(),
            dest = ctx.dest.unwrap_or_default(),
            message = %message
        ),
    }
}
