//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Priority and eviction strategies for message queues."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Scheduling strategies.
//!
//! A queue bids for the link with the priority of its current candidate message. The
//! default strategy grows that bid exponentially with the candidate's age so a low base
//! priority type is never starved forever.
use std::fmt::Debug;
use std::time::Duration;

use acomms_common::{Eviction, QueueConfig};

/// Computes the bid of a queue for its candidate message.
pub trait PriorityPolicy: Send + Sync + Debug {
    fn priority(&self, config: &QueueConfig, age: Duration) -> f64;
}

/// `priority_base * exp(age / priority_time_const)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExponentialAging;

impl PriorityPolicy for ExponentialAging {
    fn priority(&self, config: &QueueConfig, age: Duration) -> f64 {
        let time_const = config.priority_time_const.as_secs_f64();
        if time_const <= 0.0 {
            return config.priority_base;
        }
        config.priority_base * (age.as_secs_f64() / time_const).exp()
    }
}

/// `priority_base * (1 + age / priority_time_const)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearAging;

impl PriorityPolicy for LinearAging {
    fn priority(&self, config: &QueueConfig, age: Duration) -> f64 {
        let time_const = config.priority_time_const.as_secs_f64();
        if time_const <= 0.0 {
            return config.priority_base;
        }
        config.priority_base * (1.0 + age.as_secs_f64() / time_const)
    }
}

/// Decides what gives way when a message arrives at a full queue.
pub trait EvictionPolicy: Send + Sync + Debug {
    fn on_full(&self, config: &QueueConfig) -> Eviction;
}

/// Follows [`QueueConfig::effective_eviction`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfiguredEviction;

impl EvictionPolicy for ConfiguredEviction {
    fn on_full(&self, config: &QueueConfig) -> Eviction {
        config.effective_eviction()
    }
}
