//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Contextual log macros for codec and queue events."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Every macro accepts an optional leading `context = <LogContext>` followed by format
//! arguments. Unset context fields are logged as `0` or an empty string so each event
//! carries the same field set.

#[doc(hidden)]
#[macro_export]
macro_rules! __acomms_event {
    ($level:ident, $ctx:expr, $($arg:tt)+) => {{
        let ctx: &$crate::LogContext<'_> = &$ctx;
        tracing::event!(
            tracing::Level::$level,
            modem = ctx.modem.unwrap_or_default(),
            msg_type = ctx.message.unwrap_or(""),
            queue = ctx.queue.unwrap_or_default(),
            dest = ctx.dest.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Informational event with modem, message type, queue and destination fields.
#[macro_export]
macro_rules! acomms_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__acomms_event!(INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__acomms_event!(INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Debug event.
#[macro_export]
macro_rules! acomms_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__acomms_event!(DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__acomms_event!(DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Warning event, used for dropped or undecodable traffic.
#[macro_export]
macro_rules! acomms_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__acomms_event!(WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__acomms_event!(WARN, $crate::LogContext::default(), $($arg)+)
    };
}

/// Error event.
#[macro_export]
macro_rules! acomms_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__acomms_event!(ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__acomms_event!(ERROR, $crate::LogContext::default(), $($arg)+)
    };
}
