//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "integration-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Priority, blackout and admission behaviour of the queue manager."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use acomms_common::{Eviction, ManualClock, QueueConfig, QueueManagerConfig};
use acomms_dccl::{FieldCodecManager, FieldDescriptor, FieldType, Message, MessageCodec, MessageSchema};
use acomms_queue::{
    EvictionPolicy, LinearAging, PushOutcome, QueueManager, QueueMetricsExporter,
};
use prometheus::Registry;

const PEER: u32 = 2;

fn schema(name: &str, id: u32) -> MessageSchema {
    MessageSchema::new(name)
        .with_id(id)
        .field(FieldDescriptor::new("seq", FieldType::UInt32).bounds(0.0, 255.0))
}

fn message(name: &str, seq: u32) -> Message {
    Message::new(name).with("seq", seq)
}

fn manager(clock: &ManualClock) -> QueueManager {
    let codec = MessageCodec::new(Arc::new(FieldCodecManager::with_defaults()));
    QueueManager::new(QueueManagerConfig::default(), codec, clock.shared()).unwrap()
}

fn unacked() -> QueueConfig {
    QueueConfig::default().with_ack(false)
}

/// Run a two byte data request and name the message it carried.
fn next_sent(manager: &mut QueueManager) -> String {
    let frame = manager.handle_data_request(2);
    manager.codec().decode(&frame).unwrap().name().to_owned()
}

#[test]
fn aged_low_priority_message_beats_fresh_high_priority() {
    let clock = ManualClock::new();
    let mut manager = manager(&clock);
    let time_const = Duration::from_secs(10);
    manager
        .register_with(
            &schema("Telemetry", 10),
            unacked().with_priority_base(1.0).with_priority_time_const(time_const),
        )
        .unwrap();
    manager
        .register_with(
            &schema("Alarm", 11),
            unacked().with_priority_base(5.0).with_priority_time_const(time_const),
        )
        .unwrap();

    manager.push_value(&message("Telemetry", 1), PEER).unwrap();
    manager.push_value(&message("Alarm", 1), PEER).unwrap();
    assert_eq!(next_sent(&mut manager), "Alarm");
    assert_eq!(next_sent(&mut manager), "Telemetry");

    manager.push_value(&message("Telemetry", 2), PEER).unwrap();
    clock.advance(Duration::from_secs(20));
    manager.push_value(&message("Alarm", 2), PEER).unwrap();
    assert_eq!(next_sent(&mut manager), "Telemetry");
}

#[test]
fn linear_policy_ages_more_slowly() {
    let clock = ManualClock::new();
    let mut manager = manager(&clock);
    manager.set_priority_policy(Arc::new(LinearAging));
    let time_const = Duration::from_secs(10);
    manager
        .register_with(
            &schema("Telemetry", 10),
            unacked().with_priority_base(1.0).with_priority_time_const(time_const),
        )
        .unwrap();
    manager
        .register_with(
            &schema("Alarm", 11),
            unacked().with_priority_base(5.0).with_priority_time_const(time_const),
        )
        .unwrap();

    manager.push_value(&message("Telemetry", 1), PEER).unwrap();
    clock.advance(Duration::from_secs(20));
    manager.push_value(&message("Alarm", 1), PEER).unwrap();
    assert_eq!(next_sent(&mut manager), "Alarm");
}

#[test]
fn ties_go_to_the_queue_that_waited_longest_then_lowest_key() {
    let clock = ManualClock::new();
    let mut manager = manager(&clock);
    manager.register_with(&schema("Alpha", 10), unacked()).unwrap();
    manager.register_with(&schema("Bravo", 11), unacked()).unwrap();
    for seq in 0..2 {
        manager.push_value(&message("Alpha", seq), PEER).unwrap();
        manager.push_value(&message("Bravo", seq), PEER).unwrap();
    }

    let order: Vec<String> = (0..4).map(|_| next_sent(&mut manager)).collect();
    assert_eq!(order, ["Alpha", "Bravo", "Alpha", "Bravo"]);
}

#[test]
fn blackout_holds_a_type_back_but_still_accepts_pushes() {
    let clock = ManualClock::new();
    let mut manager = manager(&clock);
    let key = manager
        .register_with(
            &schema("Telemetry", 10),
            unacked().with_blackout_time(Duration::from_secs(30)),
        )
        .unwrap();
    manager.push_value(&message("Telemetry", 1), PEER).unwrap();
    assert_eq!(manager.handle_data_request(16).len(), 2);

    assert_eq!(
        manager.push_value(&message("Telemetry", 2), PEER).unwrap(),
        PushOutcome::Queued
    );
    clock.advance(Duration::from_secs(29));
    assert!(manager.handle_data_request(16).is_empty());
    assert_eq!(manager.queue_len(key), 1);

    clock.advance(Duration::from_secs(1));
    assert_eq!(manager.handle_data_request(16).len(), 2);
    assert_eq!(manager.queue_len(key), 0);
}

#[test]
fn blackout_of_one_type_lets_others_through() {
    let clock = ManualClock::new();
    let mut manager = manager(&clock);
    manager
        .register_with(
            &schema("Telemetry", 10),
            unacked()
                .with_priority_base(10.0)
                .with_blackout_time(Duration::from_secs(60)),
        )
        .unwrap();
    manager.register_with(&schema("Status", 11), unacked()).unwrap();
    for seq in 0..2 {
        manager.push_value(&message("Telemetry", seq), PEER).unwrap();
    }
    manager.push_value(&message("Status", 0), PEER).unwrap();

    let frame = manager.handle_data_request(16);
    let names: Vec<String> = manager
        .codec()
        .decode_repeated(&frame)
        .unwrap()
        .iter()
        .map(|m| m.name().to_owned())
        .collect();
    assert_eq!(names, ["Telemetry", "Status"]);
}

#[test]
fn full_queue_drops_oldest_or_rejects_newcomer() {
    let clock = ManualClock::new();
    let mut manager = manager(&clock);
    let fifo = manager
        .register_with(
            &schema("Fifo", 10),
            unacked().with_max_queue(2).with_newest_first(false),
        )
        .unwrap();
    let lifo = manager
        .register_with(&schema("Lifo", 11), unacked().with_max_queue(2))
        .unwrap();

    for seq in 0..2 {
        manager.push_value(&message("Fifo", seq), PEER).unwrap();
        manager.push_value(&message("Lifo", seq), PEER).unwrap();
    }
    assert!(matches!(
        manager.push_value(&message("Fifo", 2), PEER).unwrap(),
        PushOutcome::Evicted(_)
    ));
    assert!(matches!(
        manager.push_value(&message("Lifo", 2), PEER).unwrap(),
        PushOutcome::Rejected(_)
    ));
    assert_eq!(manager.queue_len(fifo), 2);
    assert_eq!(manager.queue_len(lifo), 2);
    assert_eq!(manager.metrics().evicted, 2);

    manager.flush_queue(lifo).unwrap();
    let first = manager.handle_data_request(2);
    assert_eq!(
        manager.codec().decode(&first).unwrap().get("seq"),
        Some(&acomms_dccl::FieldValue::UInt(1))
    );
}

#[derive(Debug)]
struct AlwaysDropOldest;

impl EvictionPolicy for AlwaysDropOldest {
    fn on_full(&self, _config: &QueueConfig) -> Eviction {
        Eviction::DropOldest
    }
}

#[test]
fn eviction_strategy_is_replaceable() {
    let clock = ManualClock::new();
    let mut manager = manager(&clock);
    let key = manager
        .register_with(&schema("Lifo", 11), unacked().with_max_queue(1))
        .unwrap();
    manager.push_value(&message("Lifo", 0), PEER).unwrap();
    manager.set_eviction_policy(Arc::new(AlwaysDropOldest));
    assert!(matches!(
        manager.push_value(&message("Lifo", 1), PEER).unwrap(),
        PushOutcome::Evicted(_)
    ));
    assert_eq!(manager.queue_len(key), 1);
}

#[test]
fn shrinking_a_queue_through_its_setter() {
    let clock = ManualClock::new();
    let mut manager = manager(&clock);
    let key = manager.register_with(&schema("Status", 11), unacked()).unwrap();
    for seq in 0..5 {
        manager.push_value(&message("Status", seq), PEER).unwrap();
    }
    let dropped = manager
        .set_queue_config(key, unacked().with_max_queue(2))
        .unwrap();
    assert_eq!(dropped.len(), 3);
    assert_eq!(manager.queue_len(key), 2);
    assert!(manager
        .set_queue_config(key, unacked().with_priority_time_const(Duration::ZERO))
        .is_err());
}

#[test]
fn prometheus_exporter_tracks_sends() {
    let clock = ManualClock::new();
    let mut manager = manager(&clock);
    let registry = Registry::new();
    manager.attach_metrics(QueueMetricsExporter::register(&registry).unwrap());
    manager.register_with(&schema("Status", 11), unacked()).unwrap();
    manager.push_value(&message("Status", 1), PEER).unwrap();
    manager.handle_data_request(8);

    let sent = registry
        .gather()
        .into_iter()
        .find(|family| family.get_name() == "acomms_messages_sent_total")
        .unwrap();
    assert_eq!(sent.get_metric()[0].get_counter().get_value(), 1.0);
    assert_eq!(manager.metrics().sent, 1);
}
