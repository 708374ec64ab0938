use core::fmt::Write;

use heapless::{String, Vec};

use crate::constants::{PAYLOAD_MAX, TOPIC_MAX};

pub const STATUS_TOPIC: &str = "boiler/status";
pub const VIBRATION_TOPIC: &str = "boiler/vibration";
pub const HEALTH_TOPIC: &str = "boiler/sensor/health";
pub const SENSITIVITY_TOPIC: &str = "boiler/sensitivity/set";

const ACK_SUFFIX: &str = "/ack";

pub type Topic = String<TOPIC_MAX>;
pub type Payload = Vec<u8, PAYLOAD_MAX>;

/// Message received from the broker, queued until the next drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: Topic,
    pub payload: Payload,
}

impl InboundMessage {
    /// Copies a received message. `None` when it does not fit the bounded buffers.
    pub fn new(topic: &str, payload: &[u8]) -> Option<Self> {
        Some(Self {
            topic: String::try_from(topic).ok()?,
            payload: Vec::from_slice(payload).ok()?,
        })
    }
}

pub fn ack_topic(topic: &str) -> Option<Topic> {
    let mut ack = Topic::new();
    ack.push_str(topic).ok()?;
    ack.push_str(ACK_SUFFIX).ok()?;
    Some(ack)
}

pub fn status_payload(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

pub fn health_payload(active: bool) -> &'static str {
    if active {
        "OK"
    } else {
        "FAILED"
    }
}

pub fn vibration_payload(magnitude: f32) -> String<16> {
    let mut payload = String::new();
    // a finite f32 with two decimals can exceed 16 chars only beyond 1e12
    if write!(payload, "{:.2}", magnitude).is_err() {
        payload.clear();
        let _ = payload.push_str("inf");
    }
    payload
}
