//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Bounded queue of encoded messages of a single type."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Per-type message queue.
//!
//! Messages are kept in arrival order. A message that was sent and expects an
//! acknowledgement stays in place, flagged as pending, until the ack arrives or the ack
//! timeout releases it for another attempt.
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use acomms_common::{Eviction, QueueConfig};
use bytes::Bytes;
use tracing::debug;

use crate::priority::{ConfiguredEviction, EvictionPolicy, PriorityPolicy};

/// Checksum carried in acknowledgements: the low 16 bits of the payload CRC-32.
pub fn payload_checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload) & 0xFFFF
}

/// An encoded message waiting for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub key: u32,
    pub payload: Bytes,
    pub dest: u32,
    pub enqueued_at: Instant,
    pub ack_requested: bool,
    pub checksum: u32,
    sent_at: Option<Instant>,
}

impl QueuedMessage {
    pub fn new(key: u32, payload: Bytes, dest: u32, enqueued_at: Instant, ack_requested: bool) -> Self {
        let checksum = payload_checksum(&payload);
        Self {
            key,
            payload,
            dest,
            enqueued_at,
            ack_requested,
            checksum,
            sent_at: None,
        }
    }

    /// Sent and still waiting for its acknowledgement.
    pub fn is_pending(&self) -> bool {
        self.sent_at.is_some()
    }

    pub fn sent_at(&self) -> Option<Instant> {
        self.sent_at
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Result of offering a message to a queue or to the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The message was appended.
    Queued,
    /// The message was appended after the returned one was dropped.
    Evicted(QueuedMessage),
    /// The queue was full and kept its contents; the returned message was not queued.
    Rejected(QueuedMessage),
    /// The message was addressed to this node and handed to the local subscriber.
    DeliveredLocally,
    /// The queue is configured not to hold messages.
    NotQueued,
}

#[derive(Debug)]
pub struct Queue {
    key: u32,
    name: String,
    config: QueueConfig,
    messages: VecDeque<QueuedMessage>,
    last_send_time: Option<Instant>,
    eviction: Arc<dyn EvictionPolicy>,
}

impl Queue {
    pub fn new(key: u32, name: impl Into<String>, config: QueueConfig) -> Self {
        Self {
            key,
            name: name.into(),
            config,
            messages: VecDeque::new(),
            last_send_time: None,
            eviction: Arc::new(ConfiguredEviction),
        }
    }

    pub fn with_eviction_policy(mut self, eviction: Arc<dyn EvictionPolicy>) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn set_eviction_policy(&mut self, eviction: Arc<dyn EvictionPolicy>) {
        self.eviction = eviction;
    }

    pub fn key(&self) -> u32 {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Replace the policy, dropping the oldest messages if the new limit is smaller.
    pub fn set_config(&mut self, config: QueueConfig) -> Vec<QueuedMessage> {
        self.config = config;
        let mut dropped = Vec::new();
        while self.config.max_queue != 0 && self.messages.len() > self.config.max_queue {
            if let Some(old) = self.messages.pop_front() {
                dropped.push(old);
            }
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_pending()).count()
    }

    pub fn messages(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.messages.iter()
    }

    pub fn last_send_time(&self) -> Option<Instant> {
        self.last_send_time
    }

    fn is_full(&self) -> bool {
        self.config.max_queue != 0 && self.messages.len() >= self.config.max_queue
    }

    pub fn push(&mut self, message: QueuedMessage) -> PushOutcome {
        if !self.is_full() {
            self.messages.push_back(message);
            return PushOutcome::Queued;
        }
        match self.eviction.on_full(&self.config) {
            Eviction::RejectIncoming => PushOutcome::Rejected(message),
            Eviction::DropOldest => match self.messages.pop_front() {
                Some(old) => {
                    self.messages.push_back(message);
                    PushOutcome::Evicted(old)
                }
                None => {
                    self.messages.push_back(message);
                    PushOutcome::Queued
                }
            },
        }
    }

    /// Still inside the blackout window that follows a send.
    pub fn in_blackout(&self, now: Instant) -> bool {
        self.last_send_time
            .is_some_and(|sent| now.saturating_duration_since(sent) < self.config.blackout_time)
    }

    /// Index of the message this queue would send next within `budget` bytes.
    pub fn candidate(&self, budget: usize) -> Option<usize> {
        let fits = |(_, message): &(usize, &QueuedMessage)| {
            !message.is_pending() && message.len() <= budget
        };
        let mut indexed = self.messages.iter().enumerate();
        let found = if self.config.newest_first {
            indexed.rev().find(fits)
        } else {
            indexed.find(fits)
        };
        found.map(|(index, _)| index)
    }

    /// Bid of the message at `index`.
    pub fn priority_at(&self, index: usize, now: Instant, policy: &dyn PriorityPolicy) -> Option<f64> {
        self.messages.get(index).map(|message| {
            policy.priority(&self.config, now.saturating_duration_since(message.enqueued_at))
        })
    }

    /// Hand out the message at `index` for transmission.
    ///
    /// Messages expecting an ack become pending; others are removed unless `retain` is set.
    pub fn take(&mut self, index: usize, now: Instant, retain: bool) -> Option<QueuedMessage> {
        let message = self.messages.get_mut(index)?;
        self.last_send_time = Some(now);
        if message.ack_requested {
            message.sent_at = Some(now);
            return Some(message.clone());
        }
        if retain {
            return Some(message.clone());
        }
        self.messages.remove(index)
    }

    /// Select the best fitting message and take it in one step.
    pub fn pop_best(
        &mut self,
        budget: usize,
        now: Instant,
        policy: &dyn PriorityPolicy,
    ) -> Option<(QueuedMessage, f64)> {
        if self.in_blackout(now) {
            return None;
        }
        let index = self.candidate(budget)?;
        let priority = self.priority_at(index, now, policy)?;
        self.take(index, now, false).map(|message| (message, priority))
    }

    /// Remove the oldest pending message whose payload checksum matches.
    pub fn acknowledge(&mut self, checksum: u32) -> Option<QueuedMessage> {
        let index = self
            .messages
            .iter()
            .position(|m| m.is_pending() && m.checksum == checksum)?;
        self.messages.remove(index)
    }

    /// Make messages whose ack did not arrive within `timeout` eligible again.
    pub fn release_expired_acks(&mut self, now: Instant, timeout: Duration) -> usize {
        let mut released = 0;
        for message in self.messages.iter_mut() {
            if let Some(sent) = message.sent_at {
                if now.saturating_duration_since(sent) >= timeout {
                    message.sent_at = None;
                    released += 1;
                }
            }
        }
        if released > 0 {
            debug!(queue = %self.name, released, "ack timeout elapsed");
        }
        released
    }

    /// Remove messages older than the configured time to live.
    pub fn expire(&mut self, now: Instant) -> Vec<QueuedMessage> {
        let Some(ttl) = self.config.ttl else {
            return Vec::new();
        };
        let (expired, kept): (Vec<_>, Vec<_>) = self
            .messages
            .drain(..)
            .partition(|m| now.saturating_duration_since(m.enqueued_at) >= ttl);
        self.messages = kept.into();
        expired
    }

    pub fn flush(&mut self) -> usize {
        let count = self.messages.len();
        self.messages.clear();
        count
    }

    pub fn info(&self, now: Instant) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "queue {} (id {})", self.name, self.key);
        let _ = writeln!(
            out,
            "  messages: {} ({} awaiting ack), max_queue: {}",
            self.len(),
            self.pending_count(),
            if self.config.max_queue == 0 {
                "unbounded".to_owned()
            } else {
                self.config.max_queue.to_string()
            }
        );
        let _ = writeln!(
            out,
            "  ack: {}, newest_first: {}, blackout: {:?}, ttl: {:?}",
            self.config.ack, self.config.newest_first, self.config.blackout_time, self.config.ttl
        );
        let _ = writeln!(
            out,
            "  priority_base: {}, priority_time_const: {:?}",
            self.config.priority_base, self.config.priority_time_const
        );
        match self.last_send_time {
            Some(sent) => {
                let _ = writeln!(out, "  last send: {:?} ago", now.saturating_duration_since(sent));
            }
            None => {
                let _ = writeln!(out, "  last send: never");
            }
        }
        out
    }
}
