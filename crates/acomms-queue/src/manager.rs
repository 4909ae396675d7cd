//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Queue manager: admission, link-budget scheduling and acknowledgements."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Queue manager.
//!
//! Owns one [`Queue`] per registered message type and the [`MessageCodec`] that frames
//! them. The link layer drives it through three calls: [`QueueManager::push_message`] on
//! the application side, [`QueueManager::handle_data_request`] when the modem has a slot
//! to fill and [`QueueManager::handle_receive`] for every frame that arrives.
//!
//! Acknowledgements travel in-band as the reserved [`ACK_MESSAGE`] type and are always
//! sent ahead of data.
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use acomms_common::{
    AcommsConfig, Manipulator, QueueConfig, QueueEntryConfig, QueueManagerConfig, SharedClock,
    BROADCAST_ID,
};
use acomms_dccl::{FieldCodecManager, FieldDescriptor, FieldType, FieldValue, Message, MessageCodec, MessageSchema};
use acomms_logging::{
    acomms_debug, acomms_info, acomms_warn, log_system_event, LogContext, SystemEventOutcome,
};
use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{QueueError, Result};
use crate::metrics::{Counters, QueueEvent, QueueMetrics, QueueMetricsExporter};
use crate::priority::{ConfiguredEviction, EvictionPolicy, ExponentialAging, PriorityPolicy};
use crate::queue::{payload_checksum, PushOutcome, Queue, QueuedMessage};

/// Name of the reserved acknowledgement message type.
pub const ACK_MESSAGE: &str = "acomms.Ack";

/// Schema of the acknowledgement message carried under `id`.
pub fn ack_schema(id: u32) -> MessageSchema {
    MessageSchema::new(ACK_MESSAGE)
        .with_id(id)
        .field(FieldDescriptor::new("acked_id", FieldType::UInt32).bounds(0.0, 32767.0))
        .field(FieldDescriptor::new("checksum", FieldType::UInt32).bounds(0.0, 65535.0))
}

pub type ReceiveHandler = Box<dyn FnMut(&Message) + Send>;
pub type AckHandler = Box<dyn FnMut(&QueuedMessage) + Send>;
pub type ExpireHandler = Box<dyn FnMut(&QueuedMessage) + Send>;
/// Called with the queue key and its new length.
pub type QueueSizeHandler = Box<dyn FnMut(u32, usize) + Send>;

#[derive(Debug, Clone)]
struct Registration {
    name: String,
    entry: QueueEntryConfig,
}

pub struct QueueManager {
    config: QueueManagerConfig,
    codec: MessageCodec,
    clock: SharedClock,
    registrations: BTreeMap<u32, Registration>,
    queues: BTreeMap<u32, Queue>,
    outbound_acks: VecDeque<Bytes>,
    priority: Arc<dyn PriorityPolicy>,
    eviction: Arc<dyn EvictionPolicy>,
    receive_handlers: HashMap<u32, ReceiveHandler>,
    ack_handler: Option<AckHandler>,
    expire_handler: Option<ExpireHandler>,
    size_handler: Option<QueueSizeHandler>,
    counters: Counters,
}

impl std::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("modem_id", &self.config.modem_id)
            .field("queues", &self.registrations.keys().collect::<Vec<_>>())
            .field("outbound_acks", &self.outbound_acks.len())
            .field("counters", &self.counters)
            .finish()
    }
}

impl QueueManager {
    /// Build a manager around `codec`, validating the acknowledgement schema if acks are on.
    pub fn new(config: QueueManagerConfig, mut codec: MessageCodec, clock: SharedClock) -> Result<Self> {
        config
            .validate()
            .map_err(|err| QueueError::InvalidConfig(format!("{err:#}")))?;
        if let Some(ack_id) = config.ack_id {
            codec.validate(&ack_schema(ack_id))?;
        }
        let ctx = LogContext::new().with_modem(config.modem_id);
        log_system_event(
            Some(&ctx),
            "queue_manager_start",
            &format!(
                "queue manager ready with {} configured queues",
                config.queues.len()
            ),
            SystemEventOutcome::Success,
        );
        Ok(Self {
            config,
            codec,
            clock,
            registrations: BTreeMap::new(),
            queues: BTreeMap::new(),
            outbound_acks: VecDeque::new(),
            priority: Arc::new(ExponentialAging),
            eviction: Arc::new(ConfiguredEviction),
            receive_handlers: HashMap::new(),
            ack_handler: None,
            expire_handler: None,
            size_handler: None,
            counters: Counters::new(),
        })
    }

    /// Build the codec and manager described by a loaded configuration.
    pub fn from_config(
        config: &AcommsConfig,
        manager: Arc<FieldCodecManager>,
        clock: SharedClock,
    ) -> Result<Self> {
        let codec = MessageCodec::from_config(manager, &config.codec);
        Self::new(config.queue.clone(), codec, clock)
    }

    pub fn modem_id(&self) -> u32 {
        self.config.modem_id
    }

    pub fn codec(&self) -> &MessageCodec {
        &self.codec
    }

    pub fn set_priority_policy(&mut self, policy: Arc<dyn PriorityPolicy>) {
        self.priority = policy;
    }

    pub fn set_eviction_policy(&mut self, policy: Arc<dyn EvictionPolicy>) {
        for queue in self.queues.values_mut() {
            queue.set_eviction_policy(policy.clone());
        }
        self.eviction = policy;
    }

    /// Mirror activity counters into Prometheus.
    pub fn attach_metrics(&mut self, exporter: QueueMetricsExporter) {
        self.counters.attach(exporter);
    }

    pub fn metrics(&self) -> QueueMetrics {
        self.counters.snapshot()
    }

    /// Register a queue for `schema` using its configured entry, or defaults when the
    /// configuration does not name it. Returns the queue key.
    pub fn register(&mut self, schema: &MessageSchema) -> Result<u32> {
        let entry = self
            .config
            .queue(&schema.name)
            .cloned()
            .unwrap_or_default();
        self.register_with(schema, entry)
    }

    pub fn register_with(
        &mut self,
        schema: &MessageSchema,
        entry: impl Into<QueueEntryConfig>,
    ) -> Result<u32> {
        let entry = entry.into();
        if let Some(id) = schema.id {
            if self.registrations.contains_key(&id) {
                return Err(QueueError::DuplicateQueue(id));
            }
        }
        entry
            .config
            .validate(&schema.name)
            .map_err(|err| QueueError::InvalidConfig(format!("{err:#}")))?;
        self.codec.validate(schema)?;
        let key = self.codec.id(&schema.name)?;

        let ctx = LogContext::new()
            .with_modem(self.config.modem_id)
            .with_message(&schema.name)
            .with_queue(key);
        acomms_info!(
            context = ctx,
            "queue registered (ack {}, max_queue {}, manipulators {:?})",
            entry.config.ack,
            entry.config.max_queue,
            entry.manipulators
        );
        self.registrations.insert(
            key,
            Registration {
                name: schema.name.clone(),
                entry,
            },
        );
        Ok(key)
    }

    /// Replace the policy of a registered queue. Messages beyond a reduced `max_queue` are
    /// dropped oldest first and returned.
    pub fn set_queue_config(&mut self, key: u32, config: QueueConfig) -> Result<Vec<QueuedMessage>> {
        let registration = self
            .registrations
            .get_mut(&key)
            .ok_or(QueueError::UnknownQueueKey(key))?;
        config
            .validate(&registration.name)
            .map_err(|err| QueueError::InvalidConfig(format!("{err:#}")))?;
        registration.entry.config = config.clone();
        let dropped = match self.queues.get_mut(&key) {
            Some(queue) => queue.set_config(config),
            None => Vec::new(),
        };
        if !dropped.is_empty() {
            self.counters.record(QueueEvent::Evicted, dropped.len() as u64);
            self.notify_size(key);
        }
        Ok(dropped)
    }

    pub fn on_receive<F>(&mut self, name: &str, handler: F) -> Result<()>
    where
        F: FnMut(&Message) + Send + 'static,
    {
        let key = self.codec.id(name)?;
        self.receive_handlers.insert(key, Box::new(handler));
        Ok(())
    }

    pub fn on_ack<F>(&mut self, handler: F)
    where
        F: FnMut(&QueuedMessage) + Send + 'static,
    {
        self.ack_handler = Some(Box::new(handler));
    }

    pub fn on_expire<F>(&mut self, handler: F)
    where
        F: FnMut(&QueuedMessage) + Send + 'static,
    {
        self.expire_handler = Some(Box::new(handler));
    }

    pub fn on_queue_size_change<F>(&mut self, handler: F)
    where
        F: FnMut(u32, usize) + Send + 'static,
    {
        self.size_handler = Some(Box::new(handler));
    }

    fn has_manipulator(&self, key: u32, manipulator: Manipulator) -> bool {
        self.registrations
            .get(&key)
            .is_some_and(|registration| registration.entry.has(manipulator))
    }

    fn queue_entry(&mut self, key: u32) -> Result<&mut Queue> {
        let registration = self
            .registrations
            .get(&key)
            .ok_or(QueueError::UnknownQueueKey(key))?;
        let eviction = self.eviction.clone();
        Ok(self.queues.entry(key).or_insert_with(|| {
            Queue::new(key, registration.name.clone(), registration.entry.config.clone())
                .with_eviction_policy(eviction)
        }))
    }

    /// Queue an already encoded message of type `key` for `dest`.
    pub fn push_message(&mut self, key: u32, payload: impl Into<Bytes>, dest: u32) -> Result<PushOutcome> {
        let payload = payload.into();
        let registration = self
            .registrations
            .get(&key)
            .ok_or(QueueError::UnknownQueueKey(key))?;
        let actual = self.codec.id_from_encoded(&payload)?;
        if actual != key {
            return Err(QueueError::KeyMismatch {
                expected: key,
                actual,
            });
        }
        let name = registration.name.clone();
        let ack = registration.entry.config.ack;
        let modem_id = self.config.modem_id;
        let ctx = LogContext::new()
            .with_modem(modem_id)
            .with_message(&name)
            .with_queue(key)
            .with_dest(dest);

        if dest == modem_id {
            acomms_debug!(context = ctx, "message addressed to this node, delivering locally");
            self.deliver_local(key, &payload);
            return Ok(PushOutcome::DeliveredLocally);
        }
        if self.has_manipulator(key, Manipulator::Loopback) {
            self.deliver_local(key, &payload);
        }
        if self.has_manipulator(key, Manipulator::NoQueue) {
            acomms_debug!(context = ctx, "queue holds no messages, push discarded");
            return Ok(PushOutcome::NotQueued);
        }

        let ack_requested = ack && dest != BROADCAST_ID && self.config.ack_id.is_some();
        if ack && dest == BROADCAST_ID {
            acomms_debug!(context = ctx, "broadcast messages are never acknowledged");
        }
        let size = payload.len();
        let message = QueuedMessage::new(key, payload, dest, self.clock.now(), ack_requested);
        let outcome = self.queue_entry(key)?.push(message);
        match &outcome {
            PushOutcome::Evicted(_) => {
                self.counters.record(QueueEvent::Evicted, 1);
                acomms_warn!(context = ctx, "queue full, oldest message dropped");
            }
            PushOutcome::Rejected(_) => {
                self.counters.record(QueueEvent::Evicted, 1);
                acomms_warn!(context = ctx, "queue full, new message rejected");
            }
            _ => {
                acomms_debug!(context = ctx, "queued {} byte message (ack {})", size, ack_requested);
            }
        }
        if !matches!(outcome, PushOutcome::Rejected(_)) {
            self.notify_size(key);
        }
        Ok(outcome)
    }

    /// Encode `message` and queue it for `dest`.
    pub fn push_value(&mut self, message: &Message, dest: u32) -> Result<PushOutcome> {
        let key = self.codec.id(message.name())?;
        let bytes = self.codec.encode(message)?;
        self.push_message(key, bytes, dest)
    }

    fn deliver_local(&mut self, key: u32, payload: &[u8]) {
        match self.codec.decode(payload) {
            Ok(message) => self.dispatch(key, &message),
            Err(err) => {
                self.counters.record(QueueEvent::DecodeFailure, 1);
                debug!(queue = key, error = %err, "local delivery failed to decode");
            }
        }
    }

    fn dispatch(&mut self, key: u32, message: &Message) {
        match self.receive_handlers.get_mut(&key) {
            Some(handler) => handler(message),
            None => trace!(queue = key, message = message.name(), "no subscriber for message"),
        }
    }

    fn notify_size(&mut self, key: u32) {
        let size = self.queues.get(&key).map_or(0, Queue::len);
        if let Some(handler) = self.size_handler.as_mut() {
            handler(key, size);
        }
    }

    fn release_expired_acks(&mut self, now: Instant) {
        let timeout: Duration = self.config.ack_timeout;
        for queue in self.queues.values_mut() {
            queue.release_expired_acks(now, timeout);
        }
    }

    /// Highest bidding queue with a message that fits `budget`.
    fn select(&self, budget: usize, now: Instant, skip: &HashSet<u32>) -> Option<(u32, usize, f64)> {
        let mut best: Option<(u32, usize, f64, Option<Instant>)> = None;
        for (key, queue) in &self.queues {
            if skip.contains(key) || queue.in_blackout(now) {
                continue;
            }
            let Some(index) = queue.candidate(budget) else {
                continue;
            };
            let Some(priority) = queue.priority_at(index, now, self.priority.as_ref()) else {
                continue;
            };
            trace!(queue = key, priority, "queue bid");
            let wins = match best {
                None => true,
                Some((_, _, best_priority, best_sent)) => {
                    priority > best_priority
                        || (priority == best_priority
                            && sent_earlier(queue.last_send_time(), best_sent))
                }
            };
            if wins {
                best = Some((*key, index, priority, queue.last_send_time()));
            }
        }
        best.map(|(key, index, priority, _)| (key, index, priority))
    }

    /// Fill up to `max_bytes` for the link: pending acks first, then data chosen by
    /// repeatedly taking the single highest priority message that still fits.
    pub fn handle_data_request(&mut self, max_bytes: usize) -> Vec<u8> {
        let now = self.clock.now();
        self.release_expired_acks(now);

        let mut out = Vec::with_capacity(max_bytes);
        while let Some(ack) = self.outbound_acks.front() {
            if out.len() + ack.len() > max_bytes {
                break;
            }
            if let Some(ack) = self.outbound_acks.pop_front() {
                out.extend_from_slice(&ack);
            }
        }

        let mut retained = HashSet::new();
        while let Some((key, index, priority)) = self.select(max_bytes - out.len(), now, &retained) {
            let retain = self.has_manipulator(key, Manipulator::NoDequeue);
            let Some(message) = self
                .queues
                .get_mut(&key)
                .and_then(|queue| queue.take(index, now, retain))
            else {
                break;
            };
            if retain && !message.ack_requested {
                retained.insert(key);
            }
            out.extend_from_slice(&message.payload);
            self.counters.record(QueueEvent::Sent, 1);
            debug!(
                queue = key,
                dest = message.dest,
                priority,
                awaiting_ack = message.is_pending(),
                payload = %hex::encode(&message.payload),
                "message selected for transmission"
            );
            if self.has_manipulator(key, Manipulator::LoopbackAsSent) {
                self.deliver_local(key, &message.payload);
            }
            if !message.ack_requested && !retain {
                self.notify_size(key);
            }
        }
        trace!(bytes = out.len(), max_bytes, "data request filled");
        out
    }

    /// Process a frame addressed to this node. Returns the number of messages decoded.
    pub fn handle_receive(&mut self, bytes: &[u8]) -> usize {
        self.handle_receive_addressed(bytes, self.config.modem_id)
    }

    /// Process a frame the link layer reports as addressed to `dest`.
    ///
    /// Frames for other nodes are only delivered to queues with the `promiscuous`
    /// manipulator and are never acknowledged. A frame that fails to decode part way is
    /// processed up to the failure.
    pub fn handle_receive_addressed(&mut self, bytes: &[u8], dest: u32) -> usize {
        let mut offset = 0;
        let mut handled = 0;
        while offset < bytes.len() {
            match self.codec.decode_prefix(&bytes[offset..]) {
                Ok((message, used)) => {
                    let frame = &bytes[offset..offset + used];
                    self.handle_message(message, frame, dest);
                    handled += 1;
                    if used == 0 {
                        break;
                    }
                    offset += used;
                }
                Err(err) => {
                    self.counters.record(QueueEvent::DecodeFailure, 1);
                    let ctx = LogContext::new().with_modem(self.config.modem_id).with_dest(dest);
                    acomms_warn!(
                        context = ctx,
                        "failed to decode received bytes at offset {}: {}",
                        offset,
                        err
                    );
                    break;
                }
            }
        }
        handled
    }

    fn handle_message(&mut self, message: Message, frame: &[u8], dest: u32) {
        let Ok(key) = self.codec.id(message.name()) else {
            return;
        };
        if Some(key) == self.config.ack_id {
            if dest == self.config.modem_id || dest == BROADCAST_ID {
                self.handle_ack(&message);
            }
            return;
        }
        let modem_id = self.config.modem_id;
        if dest != modem_id
            && dest != BROADCAST_ID
            && !self.has_manipulator(key, Manipulator::Promiscuous)
        {
            trace!(queue = key, dest, "ignoring message addressed to another node");
            return;
        }
        self.counters.record(QueueEvent::Received, 1);
        self.dispatch(key, &message);

        let wants_ack = self
            .registrations
            .get(&key)
            .is_some_and(|registration| registration.entry.config.ack);
        if dest == modem_id && wants_ack {
            self.queue_ack(key, payload_checksum(frame));
        }
    }

    fn queue_ack(&mut self, key: u32, checksum: u32) {
        if self.config.ack_id.is_none() {
            return;
        }
        let ack = Message::new(ACK_MESSAGE)
            .with("acked_id", key)
            .with("checksum", checksum);
        match self.codec.encode(&ack) {
            Ok(bytes) => {
                let bytes = Bytes::from(bytes);
                if !self.outbound_acks.contains(&bytes) {
                    debug!(queue = key, checksum, "acknowledgement scheduled");
                    self.outbound_acks.push_back(bytes);
                }
            }
            Err(err) => debug!(queue = key, error = %err, "cannot acknowledge message"),
        }
    }

    fn handle_ack(&mut self, ack: &Message) {
        let acked = ack.get("acked_id").and_then(FieldValue::as_u64);
        let checksum = ack.get("checksum").and_then(FieldValue::as_u64);
        let (Some(acked), Some(checksum)) = (acked, checksum) else {
            debug!("acknowledgement without acked_id or checksum");
            return;
        };
        let Ok(key) = u32::try_from(acked) else {
            return;
        };
        let Some(message) = self
            .queues
            .get_mut(&key)
            .and_then(|queue| queue.acknowledge(checksum as u32))
        else {
            debug!(queue = key, checksum, "acknowledgement matched no pending message");
            return;
        };
        self.counters.record(QueueEvent::Acked, 1);
        debug!(queue = key, checksum, "pending message acknowledged");
        if let Some(handler) = self.ack_handler.as_mut() {
            handler(&message);
        }
        self.notify_size(key);
    }

    /// Periodic housekeeping: expire messages past their time to live and release
    /// messages whose acknowledgement timed out. Returns the number expired.
    pub fn do_work(&mut self) -> usize {
        let now = self.clock.now();
        self.release_expired_acks(now);
        let keys: Vec<u32> = self.queues.keys().copied().collect();
        let mut total = 0;
        for key in keys {
            let expired = match self.queues.get_mut(&key) {
                Some(queue) => queue.expire(now),
                None => continue,
            };
            if expired.is_empty() {
                continue;
            }
            self.counters.record(QueueEvent::Expired, expired.len() as u64);
            if let Some(handler) = self.expire_handler.as_mut() {
                for message in &expired {
                    handler(message);
                }
            }
            debug!(queue = key, expired = expired.len(), "messages expired");
            self.notify_size(key);
            total += expired.len();
        }
        total
    }

    /// Drop every message of queue `key`. Returns how many were removed.
    pub fn flush_queue(&mut self, key: u32) -> Result<usize> {
        if !self.registrations.contains_key(&key) {
            return Err(QueueError::UnknownQueueKey(key));
        }
        let flushed = self.queues.get_mut(&key).map_or(0, Queue::flush);
        self.notify_size(key);
        Ok(flushed)
    }

    pub fn queue_len(&self, key: u32) -> usize {
        self.queues.get(&key).map_or(0, Queue::len)
    }

    pub fn pending_ack_count(&self, key: u32) -> usize {
        self.queues.get(&key).map_or(0, Queue::pending_count)
    }

    pub fn outbound_ack_count(&self) -> usize {
        self.outbound_acks.len()
    }

    /// Human readable state of queue `key`.
    pub fn info(&self, key: u32) -> Result<String> {
        let registration = self
            .registrations
            .get(&key)
            .ok_or(QueueError::UnknownQueueKey(key))?;
        let now = self.clock.now();
        let mut out = match self.queues.get(&key) {
            Some(queue) => queue.info(now),
            None => Queue::new(key, registration.name.clone(), registration.entry.config.clone())
                .info(now),
        };
        if !registration.entry.manipulators.is_empty() {
            let _ = writeln!(out, "  manipulators: {:?}", registration.entry.manipulators);
        }
        Ok(out)
    }

    pub fn info_all(&self) -> Result<String> {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "modem {}: {} queues, {} acknowledgements waiting",
            self.config.modem_id,
            self.registrations.len(),
            self.outbound_acks.len()
        );
        for key in self.registrations.keys() {
            out.push_str(&self.info(*key)?);
        }
        Ok(out)
    }
}

fn sent_earlier(candidate: Option<Instant>, incumbent: Option<Instant>) -> bool {
    match (candidate, incumbent) {
        (None, Some(_)) => true,
        (Some(candidate), Some(incumbent)) => candidate < incumbent,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acomms_common::ManualClock;
    use parking_lot::Mutex;

    fn status_schema() -> MessageSchema {
        MessageSchema::new("Status")
            .with_id(10)
            .field(FieldDescriptor::new("depth", FieldType::UInt32).bounds(0.0, 255.0))
    }

    fn command_schema() -> MessageSchema {
        MessageSchema::new("Command")
            .with_id(11)
            .field(FieldDescriptor::new("code", FieldType::UInt32).bounds(0.0, 255.0))
    }

    fn manager_for(modem_id: u32, clock: &ManualClock) -> QueueManager {
        let config = QueueManagerConfig {
            modem_id,
            ..QueueManagerConfig::default()
        };
        let codec = MessageCodec::new(Arc::new(FieldCodecManager::with_defaults()));
        QueueManager::new(config, codec, clock.shared()).unwrap()
    }

    fn status(depth: u32) -> Message {
        Message::new("Status").with("depth", depth)
    }

    #[test]
    fn unknown_key_and_mismatched_payload_are_rejected() {
        let clock = ManualClock::new();
        let mut manager = manager_for(1, &clock);
        assert_eq!(
            manager.push_message(10, vec![0u8; 2], 2),
            Err(QueueError::UnknownQueueKey(10))
        );
        manager.register(&status_schema()).unwrap();
        manager
            .register_with(&command_schema(), QueueConfig::default())
            .unwrap();
        let command = manager
            .codec()
            .encode(&Message::new("Command").with("code", 1u32))
            .unwrap();
        assert_eq!(
            manager.push_message(10, command, 2),
            Err(QueueError::KeyMismatch {
                expected: 10,
                actual: 11
            })
        );
        assert_eq!(
            manager.register(&status_schema()),
            Err(QueueError::DuplicateQueue(10))
        );
    }

    #[test]
    fn ack_id_is_reserved() {
        let clock = ManualClock::new();
        let mut manager = manager_for(1, &clock);
        let clash = MessageSchema::new("Clash").with_id(127);
        assert!(matches!(
            manager.register(&clash),
            Err(QueueError::Codec(_))
        ));
    }

    #[test]
    fn higher_priority_queue_is_served_first() {
        let clock = ManualClock::new();
        let mut manager = manager_for(1, &clock);
        manager
            .register_with(&status_schema(), QueueConfig::default().with_ack(false))
            .unwrap();
        manager
            .register_with(
                &command_schema(),
                QueueConfig::default().with_ack(false).with_priority_base(4.0),
            )
            .unwrap();
        manager.push_value(&status(5), 2).unwrap();
        manager
            .push_value(&Message::new("Command").with("code", 9u32), 2)
            .unwrap();

        let frame = manager.handle_data_request(2);
        assert_eq!(manager.codec().decode(&frame).unwrap().name(), "Command");
        let frame = manager.handle_data_request(2);
        assert_eq!(manager.codec().decode(&frame).unwrap().name(), "Status");
        assert!(manager.handle_data_request(2).is_empty());
        assert_eq!(manager.metrics().sent, 2);
    }

    #[test]
    fn one_request_packs_several_messages() {
        let clock = ManualClock::new();
        let mut manager = manager_for(1, &clock);
        manager
            .register_with(&status_schema(), QueueConfig::default().with_ack(false))
            .unwrap();
        for depth in 0..3 {
            manager.push_value(&status(depth), 2).unwrap();
        }
        let frame = manager.handle_data_request(5);
        assert_eq!(frame.len(), 4);
        assert_eq!(manager.queue_len(10), 1);
        assert_eq!(manager.codec().decode_repeated(&frame).unwrap().len(), 2);
    }

    #[test]
    fn local_destination_skips_the_queue() {
        let clock = ManualClock::new();
        let mut manager = manager_for(1, &clock);
        manager.register(&status_schema()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager
            .on_receive("Status", move |message| sink.lock().push(message.clone()))
            .unwrap();
        assert_eq!(
            manager.push_value(&status(7), 1).unwrap(),
            PushOutcome::DeliveredLocally
        );
        assert_eq!(manager.queue_len(10), 0);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn manipulators_change_queue_behaviour() {
        let clock = ManualClock::new();
        let mut manager = manager_for(1, &clock);
        let entry = QueueEntryConfig::from(QueueConfig::default().with_ack(false))
            .with_manipulator(Manipulator::NoQueue)
            .with_manipulator(Manipulator::Loopback);
        manager.register_with(&status_schema(), entry).unwrap();
        let entry = QueueEntryConfig::from(QueueConfig::default().with_ack(false))
            .with_manipulator(Manipulator::NoDequeue);
        manager.register_with(&command_schema(), entry).unwrap();

        let looped = Arc::new(Mutex::new(0));
        let counter = looped.clone();
        manager
            .on_receive("Status", move |_| *counter.lock() += 1)
            .unwrap();
        assert_eq!(
            manager.push_value(&status(1), 2).unwrap(),
            PushOutcome::NotQueued
        );
        assert_eq!(*looped.lock(), 1);

        manager
            .push_value(&Message::new("Command").with("code", 3u32), 2)
            .unwrap();
        assert_eq!(manager.handle_data_request(32).len(), 2);
        assert_eq!(manager.queue_len(11), 1);
        assert_eq!(manager.handle_data_request(32).len(), 2);
    }

    #[test]
    fn broadcast_never_waits_for_ack() {
        let clock = ManualClock::new();
        let mut manager = manager_for(1, &clock);
        manager.register(&status_schema()).unwrap();
        manager.push_value(&status(1), BROADCAST_ID).unwrap();
        assert_eq!(manager.handle_data_request(8).len(), 2);
        assert_eq!(manager.queue_len(10), 0);
        assert_eq!(manager.pending_ack_count(10), 0);
    }

    #[test]
    fn acknowledgement_round_trip_between_nodes() {
        let clock = ManualClock::new();
        let mut sender = manager_for(1, &clock);
        let mut receiver = manager_for(2, &clock);
        sender.register(&status_schema()).unwrap();
        receiver.register(&status_schema()).unwrap();

        let acked = Arc::new(Mutex::new(0));
        let counter = acked.clone();
        sender.on_ack(move |_| *counter.lock() += 1);

        sender.push_value(&status(42), 2).unwrap();
        let frame = sender.handle_data_request(8);
        assert_eq!(sender.pending_ack_count(10), 1);
        assert!(sender.handle_data_request(8).is_empty());

        assert_eq!(receiver.handle_receive(&frame), 1);
        assert_eq!(receiver.outbound_ack_count(), 1);
        let ack_frame = receiver.handle_data_request(8);
        assert_eq!(receiver.outbound_ack_count(), 0);

        assert_eq!(sender.handle_receive(&ack_frame), 1);
        assert_eq!(sender.queue_len(10), 0);
        assert_eq!(*acked.lock(), 1);
        assert_eq!(sender.metrics().acked, 1);
    }

    #[test]
    fn unacknowledged_message_is_resent_after_timeout() {
        let clock = ManualClock::new();
        let mut manager = manager_for(1, &clock);
        manager.register(&status_schema()).unwrap();
        manager.push_value(&status(3), 2).unwrap();
        let first = manager.handle_data_request(8);
        clock.advance(Duration::from_secs(5));
        assert!(manager.handle_data_request(8).is_empty());
        clock.advance(Duration::from_secs(5));
        assert_eq!(manager.handle_data_request(8), first);
    }

    #[test]
    fn do_work_expires_and_notifies() {
        let clock = ManualClock::new();
        let mut manager = manager_for(1, &clock);
        manager
            .register_with(
                &status_schema(),
                QueueConfig::default().with_ttl(Duration::from_secs(60)),
            )
            .unwrap();
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let sink = sizes.clone();
        manager.on_queue_size_change(move |key, len| sink.lock().push((key, len)));
        let expired = Arc::new(Mutex::new(0));
        let counter = expired.clone();
        manager.on_expire(move |_| *counter.lock() += 1);

        manager.push_value(&status(1), 2).unwrap();
        clock.advance(Duration::from_secs(59));
        assert_eq!(manager.do_work(), 0);
        clock.advance(Duration::from_secs(1));
        assert_eq!(manager.do_work(), 1);
        assert_eq!(*expired.lock(), 1);
        assert_eq!(sizes.lock().as_slice(), &[(10, 1), (10, 0)]);
        assert_eq!(manager.metrics().expired, 1);
    }

    #[test]
    fn undecodable_frames_are_counted_not_fatal() {
        let clock = ManualClock::new();
        let mut manager = manager_for(1, &clock);
        manager.register(&status_schema()).unwrap();
        assert_eq!(manager.handle_receive(&[0x7e, 0x00]), 0);
        assert_eq!(manager.metrics().decode_failures, 1);

        let mut frame = manager.codec().encode(&status(1)).unwrap();
        frame.push(0x7e);
        assert_eq!(manager.handle_receive(&frame), 1);
        assert_eq!(manager.metrics().received, 1);
        assert_eq!(manager.metrics().decode_failures, 2);
    }

    #[test]
    fn messages_for_other_nodes_need_promiscuous() {
        let clock = ManualClock::new();
        let mut manager = manager_for(1, &clock);
        manager.register(&status_schema()).unwrap();
        let frame = manager.codec().encode(&status(1)).unwrap();
        manager.handle_receive_addressed(&frame, 5);
        assert_eq!(manager.metrics().received, 0);
        assert_eq!(manager.outbound_ack_count(), 0);

        let mut promiscuous = manager_for(1, &clock);
        let entry = QueueEntryConfig::default().with_manipulator(Manipulator::Promiscuous);
        promiscuous.register_with(&status_schema(), entry).unwrap();
        promiscuous.handle_receive_addressed(&frame, 5);
        assert_eq!(promiscuous.metrics().received, 1);
        assert_eq!(promiscuous.outbound_ack_count(), 0);
    }

    #[test]
    fn flush_and_info() {
        let clock = ManualClock::new();
        let mut manager = manager_for(1, &clock);
        manager.register(&status_schema()).unwrap();
        manager.push_value(&status(1), 2).unwrap();
        manager.push_value(&status(2), 2).unwrap();
        assert!(manager.info(10).unwrap().contains("messages: 2"));
        assert_eq!(manager.flush_queue(10).unwrap(), 2);
        assert_eq!(manager.flush_queue(99), Err(QueueError::UnknownQueueKey(99)));
        assert!(manager.info_all().unwrap().starts_with("modem 1: 1 queues"));
    }
}
