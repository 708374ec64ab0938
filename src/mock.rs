//! In-memory stand-ins for the hardware traits, shared by the unit tests.

use core::cell::Cell;
use core::net::Ipv4Addr;
use std::collections::VecDeque;
use std::string::{String, ToString};
use std::vec::Vec;

use embedded_hal_async::delay::DelayNs;

use crate::connectivity::{Broker, BrokerError, Inbox, LinkError, NetworkLink};
use crate::sensor::{Acceleration, Accelerometer, Range, SensorError};
use crate::settings::{Settings, SettingsBackend};
use crate::topics::InboundMessage;

/// Records every requested pause instead of sleeping.
#[derive(Default)]
pub struct RecordingDelay {
    pub waits_ms: Vec<u32>,
}

impl DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.waits_ms.push(ns / 1_000_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.waits_ms.push(ms);
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    pub data: Option<Vec<u8>>,
    pub fail_read: bool,
    pub fail_write: bool,
    pub writes: usize,
}

impl MemoryBackend {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_text(text: &str) -> Self {
        Self {
            data: Some(text.as_bytes().to_vec()),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct BackendFailure;

impl SettingsBackend for MemoryBackend {
    type Error = BackendFailure;

    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, Self::Error> {
        if self.fail_read {
            return Err(BackendFailure);
        }
        Ok(self.data.as_ref().map(|data| {
            let len = data.len().min(buf.len());
            buf[..len].copy_from_slice(&data[..len]);
            len
        }))
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if self.fail_write {
            return Err(BackendFailure);
        }
        self.writes += 1;
        self.data = Some(data.to_vec());
        Ok(())
    }
}

pub struct MockAccelerometer {
    pub present: bool,
    pub reading: Acceleration,
    pub fail_reads: bool,
    pub range: Option<Range>,
    pub init_calls: usize,
    pub reads: usize,
}

impl MockAccelerometer {
    /// A sensor at rest, upright.
    pub fn present() -> Self {
        Self {
            present: true,
            reading: Acceleration {
                x: 0.0,
                y: 0.0,
                z: 9.8,
            },
            fail_reads: false,
            range: None,
            init_calls: 0,
            reads: 0,
        }
    }

    pub fn absent() -> Self {
        Self {
            present: false,
            ..Self::present()
        }
    }
}

impl Accelerometer for MockAccelerometer {
    async fn init(&mut self) -> Result<(), SensorError> {
        self.init_calls += 1;
        if self.present {
            Ok(())
        } else {
            Err(SensorError::NotFound)
        }
    }

    async fn set_range(&mut self, range: Range) -> Result<(), SensorError> {
        self.range = Some(range);
        Ok(())
    }

    async fn acceleration(&mut self) -> Result<Acceleration, SensorError> {
        self.reads += 1;
        if self.fail_reads {
            Err(SensorError::MeasurementFailure)
        } else {
            Ok(self.reading)
        }
    }
}

/// Network that joins right away unless told otherwise.
pub struct MockLink {
    pub joined: Cell<bool>,
    pub accept: bool,
    /// Link checks answered "not yet" after a join was started.
    pub checks_before_join: Cell<u32>,
    pub begin_calls: usize,
    pub joined_with: Option<(String, String)>,
    pending: Cell<bool>,
}

impl Default for MockLink {
    fn default() -> Self {
        Self {
            joined: Cell::new(false),
            accept: true,
            checks_before_join: Cell::new(0),
            begin_calls: 0,
            joined_with: None,
            pending: Cell::new(false),
        }
    }
}

impl NetworkLink for MockLink {
    fn is_joined(&self) -> bool {
        if self.joined.get() {
            return true;
        }
        if !self.pending.get() {
            return false;
        }
        if !self.accept {
            // association refused, a new join has to be started
            self.pending.set(false);
            return false;
        }

        match self.checks_before_join.get() {
            0 => {
                self.joined.set(true);
                self.pending.set(false);
                true
            }
            n => {
                self.checks_before_join.set(n - 1);
                false
            }
        }
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.joined.get().then(|| Ipv4Addr::new(192, 168, 1, 50))
    }

    async fn begin_join(&mut self, network_id: &str, secret: &str) -> Result<(), LinkError> {
        self.begin_calls += 1;
        self.joined_with = Some((network_id.to_string(), secret.to_string()));
        self.pending.set(true);
        Ok(())
    }

    async fn leave(&mut self) {
        self.joined.set(false);
        self.pending.set(false);
    }
}

/// Broker that forgets subscriptions whenever the session drops.
#[derive(Default)]
pub struct MockBroker {
    pub connected: bool,
    pub refuse_connects: usize,
    pub fail_publish: bool,
    pub connect_calls: usize,
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, Vec<u8>)>,
    pub last_client_id: Option<String>,
    waiting: VecDeque<InboundMessage>,
}

impl MockBroker {
    /// Queues a message as if another client had published it.
    pub fn deliver(&mut self, message: InboundMessage) {
        self.waiting.push_back(message);
    }

    pub fn drop_connection(&mut self) {
        self.connected = false;
        self.subscriptions.clear();
    }

    pub fn published_text(&self) -> Vec<(String, String)> {
        self.published
            .iter()
            .map(|(topic, payload)| (topic.clone(), String::from_utf8_lossy(payload).into_owned()))
            .collect()
    }

    pub fn published_on(&self, topic: &str) -> Vec<String> {
        self.published_text()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload)
            .collect()
    }
}

impl Broker for MockBroker {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self, settings: &Settings) -> Result<(), BrokerError> {
        self.connect_calls += 1;
        if self.refuse_connects > 0 {
            self.refuse_connects -= 1;
            return Err(BrokerError::ConnectionRefused);
        }
        self.connected = true;
        self.last_client_id = Some(settings.client_identity.to_string());
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        if !self.connected || self.fail_publish {
            return Err(BrokerError::PublishMessageFailed);
        }
        self.published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn poll(&mut self, inbox: &mut Inbox) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }

        let mut kept = VecDeque::new();
        while let Some(message) = self.waiting.pop_front() {
            if self.subscriptions.iter().any(|t| t == message.topic.as_str()) {
                if let Err(message) = inbox.push_back(message) {
                    kept.push_back(message);
                    break;
                }
            } else {
                kept.push_back(message);
            }
        }
        kept.extend(self.waiting.drain(..));
        self.waiting = kept;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.drop_connection();
    }
}
