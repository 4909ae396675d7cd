//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Queue activity counters and Prometheus export."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};

use prometheus::{IntCounter, Opts, Registry};

/// Snapshot of queue manager activity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueMetrics {
    /// Messages handed to the link, retransmissions included.
    pub sent: u64,
    /// Data messages decoded from the link.
    pub received: u64,
    /// Pending messages cleared by an acknowledgement.
    pub acked: u64,
    /// Messages dropped or rejected because a queue was full.
    pub evicted: u64,
    /// Messages removed after their time to live.
    pub expired: u64,
    /// Received byte strings that could not be decoded.
    pub decode_failures: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueEvent {
    Sent,
    Received,
    Acked,
    Evicted,
    Expired,
    DecodeFailure,
}

pub(crate) struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    acked: AtomicU64,
    evicted: AtomicU64,
    expired: AtomicU64,
    decode_failures: AtomicU64,
    exporter: Option<QueueMetricsExporter>,
}

impl Counters {
    pub(crate) fn new() -> Self {
        Self {
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            acked: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            exporter: None,
        }
    }

    pub(crate) fn attach(&mut self, exporter: QueueMetricsExporter) {
        self.exporter = Some(exporter);
    }

    fn counter(&self, event: QueueEvent) -> &AtomicU64 {
        match event {
            QueueEvent::Sent => &self.sent,
            QueueEvent::Received => &self.received,
            QueueEvent::Acked => &self.acked,
            QueueEvent::Evicted => &self.evicted,
            QueueEvent::Expired => &self.expired,
            QueueEvent::DecodeFailure => &self.decode_failures,
        }
    }

    pub(crate) fn record(&self, event: QueueEvent, count: u64) {
        if count == 0 {
            return;
        }
        self.counter(event).fetch_add(count, Ordering::Relaxed);
        if let Some(exporter) = &self.exporter {
            exporter.observe(event, count);
        }
    }

    pub(crate) fn snapshot(&self) -> QueueMetrics {
        QueueMetrics {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for Counters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Counters")
            .field("snapshot", &self.snapshot())
            .field("exported", &self.exporter.is_some())
            .finish()
    }
}

/// Prometheus counters mirroring [`QueueMetrics`].
#[derive(Clone)]
pub struct QueueMetricsExporter {
    sent: IntCounter,
    received: IntCounter,
    acked: IntCounter,
    evicted: IntCounter,
    expired: IntCounter,
    decode_failures: IntCounter,
}

impl QueueMetricsExporter {
    /// Register queue metrics with the provided registry.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let sent = IntCounter::with_opts(Opts::new(
            "acomms_messages_sent_total",
            "Messages handed to the link",
        ))?;
        let received = IntCounter::with_opts(Opts::new(
            "acomms_messages_received_total",
            "Messages decoded from the link",
        ))?;
        let acked = IntCounter::with_opts(Opts::new(
            "acomms_messages_acked_total",
            "Sent messages confirmed by an acknowledgement",
        ))?;
        let evicted = IntCounter::with_opts(Opts::new(
            "acomms_messages_evicted_total",
            "Messages lost to full queues",
        ))?;
        let expired = IntCounter::with_opts(Opts::new(
            "acomms_messages_expired_total",
            "Messages dropped after their time to live",
        ))?;
        let decode_failures = IntCounter::with_opts(Opts::new(
            "acomms_decode_failures_total",
            "Received frames that failed to decode",
        ))?;

        registry.register(Box::new(sent.clone()))?;
        registry.register(Box::new(received.clone()))?;
        registry.register(Box::new(acked.clone()))?;
        registry.register(Box::new(evicted.clone()))?;
        registry.register(Box::new(expired.clone()))?;
        registry.register(Box::new(decode_failures.clone()))?;

        Ok(Self {
            sent,
            received,
            acked,
            evicted,
            expired,
            decode_failures,
        })
    }

    pub(crate) fn observe(&self, event: QueueEvent, count: u64) {
        let counter = match event {
            QueueEvent::Sent => &self.sent,
            QueueEvent::Received => &self.received,
            QueueEvent::Acked => &self.acked,
            QueueEvent::Evicted => &self.evicted,
            QueueEvent::Expired => &self.expired,
            QueueEvent::DecodeFailure => &self.decode_failures,
        };
        counter.inc_by(count);
    }
}
