#![allow(async_fn_in_trait)]

//! Network join and broker session lifecycle.
//!
//! Both channels are re-checked on every tick. A missing connection is retried with a
//! bounded number of attempts, after which control goes back to the monitor until the
//! next tick.

use core::net::Ipv4Addr;

use embedded_hal_async::delay::DelayNs;
use heapless::Deque;
use log::{debug, info, warn};

use crate::constants::*;
use crate::retry::RetryPolicy;
use crate::settings::{is_valid_threshold, parse_f32_lenient, Settings};
use crate::topics::{self, InboundMessage, Payload, Topic};

pub const JOIN_POLICY: RetryPolicy = RetryPolicy::new(WIFI_JOIN_ATTEMPTS, WIFI_JOIN_DELAY_MS);
pub const BROKER_POLICY: RetryPolicy =
    RetryPolicy::new(MQTT_CONNECT_ATTEMPTS, MQTT_CONNECT_DELAY_MS);

pub type Inbox = Deque<InboundMessage, MQTT_INBOX_CAPACITY>;

#[derive(Debug)]
pub enum LinkError {
    InvalidCredentials,
    ConfigFailed,
    StartFailed,
    JoinFailed,
}

#[derive(Debug)]
pub enum BrokerError {
    DnsLookupFailed,
    SocketConnectionError,
    InvalidCredentials,
    ConnectionRefused,
    SubscribeFailed,
    PublishMessageFailed,
    ReceiveFailed,
    NotConnected,
}

/// Network-join primitive.
pub trait NetworkLink {
    /// True once associated and holding an IPv4 address.
    fn is_joined(&self) -> bool;

    fn local_ip(&self) -> Option<Ipv4Addr>;

    /// Starts associating with the given network. Returns once the attempt is under
    /// way; completion is observed through [`NetworkLink::is_joined`].
    async fn begin_join(&mut self, network_id: &str, secret: &str) -> Result<(), LinkError>;

    /// Drops the association, if any.
    async fn leave(&mut self);
}

/// Publish/subscribe transport.
pub trait Broker {
    fn is_connected(&self) -> bool;

    async fn connect(&mut self, settings: &Settings) -> Result<(), BrokerError>;

    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError>;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Moves the messages received since the last call into `inbox`.
    async fn poll(&mut self, inbox: &mut Inbox) -> Result<(), BrokerError>;

    async fn disconnect(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Disconnected,
    Connected,
}

/// State change requested by an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    Threshold {
        value: f32,
        ack_topic: Topic,
        ack_payload: Payload,
    },
}

/// Maps an inbound message to the change it asks for. Unknown topics and payloads
/// that are not a positive number yield `None`.
pub fn dispatch(message: &InboundMessage) -> Option<Delta> {
    if message.topic.as_str() != topics::SENSITIVITY_TOPIC {
        debug!("Ignoring message on {}", message.topic);
        return None;
    }

    let text = core::str::from_utf8(&message.payload).ok()?;
    let value = parse_f32_lenient(text);
    if !is_valid_threshold(value) {
        debug!("Ignoring sensitivity payload {:?}", text);
        return None;
    }

    Some(Delta::Threshold {
        value,
        ack_topic: topics::ack_topic(&message.topic)?,
        ack_payload: message.payload.clone(),
    })
}

pub struct ConnectivityManager<N, B, D> {
    link: N,
    broker: B,
    delay: D,
    network: NetworkState,
    broker_state: BrokerState,
    sessions: u32,
    inbox: Inbox,
}

impl<N, B, D> ConnectivityManager<N, B, D>
where
    N: NetworkLink,
    B: Broker,
    D: DelayNs,
{
    pub fn new(link: N, broker: B, delay: D) -> Self {
        Self {
            link,
            broker,
            delay,
            network: NetworkState::Disconnected,
            broker_state: BrokerState::Disconnected,
            sessions: 0,
            inbox: Inbox::new(),
        }
    }

    pub fn network_state(&self) -> NetworkState {
        self.network
    }

    pub fn broker_state(&self) -> BrokerState {
        self.broker_state
    }

    /// Number of broker sessions opened so far. Each one announced the status.
    pub fn sessions_opened(&self) -> u32 {
        self.sessions
    }

    pub fn is_broker_connected(&self) -> bool {
        self.broker_state == BrokerState::Connected
    }

    pub fn local_ip(&self) -> Option<Ipv4Addr> {
        match self.network {
            NetworkState::Connected => self.link.local_ip(),
            _ => None,
        }
    }

    pub fn link_mut(&mut self) -> &mut N {
        &mut self.link
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut B {
        &mut self.broker
    }

    /// Makes sure the device is on the network, joining it if needed.
    pub async fn ensure_joined(&mut self, settings: &Settings) -> NetworkState {
        if self.link.is_joined() {
            if self.network != NetworkState::Connected {
                self.network = NetworkState::Connected;
                log_joined(self.link.local_ip());
            }
            return self.network;
        }

        if self.network == NetworkState::Connected {
            warn!("WiFi connection lost");
            self.network = NetworkState::Disconnected;
        }

        if settings.network_id.is_empty() {
            debug!("WiFi not configured, skipping join");
            return self.network;
        }

        info!("Connecting to WiFi {:?}...", settings.network_id.as_str());
        self.network = NetworkState::Connecting;

        if let Err(e) = self
            .link
            .begin_join(&settings.network_id, &settings.network_secret)
            .await
        {
            warn!("Failed to start WiFi join: {:?}. Will retry later", e);
            self.network = NetworkState::Disconnected;
            return self.network;
        }

        let link = &self.link;
        let joined = JOIN_POLICY
            .run(&mut self.delay, async |_: u8| {
                if link.is_joined() {
                    Ok(())
                } else {
                    Err(())
                }
            })
            .await;

        match joined {
            Ok(()) => {
                self.network = NetworkState::Connected;
                log_joined(self.link.local_ip());
            }
            Err(()) => {
                warn!("Failed to connect to WiFi. Will retry later");
                self.network = NetworkState::Disconnected;
            }
        }

        self.network
    }

    /// Makes sure the broker session is up. A fresh session subscribes to the
    /// sensitivity topic and announces the current status and sensor health.
    pub async fn ensure_broker_connected(
        &mut self,
        settings: &Settings,
        boiler_on: bool,
        sensor_active: bool,
    ) -> BrokerState {
        if self.network != NetworkState::Connected {
            if self.broker_state == BrokerState::Connected {
                self.mark_broker_lost().await;
            }
            return self.broker_state;
        }

        if self.broker.is_connected() {
            self.broker_state = BrokerState::Connected;
            return self.broker_state;
        }

        if self.broker_state == BrokerState::Connected {
            warn!("MQTT connection lost");
            self.broker_state = BrokerState::Disconnected;
        }

        if settings.broker_address.is_empty() {
            debug!("MQTT broker not configured, skipping connect");
            return self.broker_state;
        }

        let broker = &mut self.broker;
        let connected = BROKER_POLICY
            .run(&mut self.delay, async |attempt: u8| {
                info!(
                    "Attempting MQTT connection to {}:{} ({}/{})...",
                    settings.broker_address.as_str(),
                    settings.broker_port,
                    attempt,
                    BROKER_POLICY.max_attempts
                );
                broker.connect(settings).await.inspect_err(|e| {
                    warn!(
                        "MQTT connect failed: {:?}, try again in {} ms",
                        e, BROKER_POLICY.delay_ms
                    );
                })
            })
            .await;

        if connected.is_err() {
            warn!("Giving up on MQTT for now");
            return self.broker_state;
        }

        info!("MQTT connected");

        if let Err(e) = self.broker.subscribe(topics::SENSITIVITY_TOPIC).await {
            log::error!("Failed to subscribe to {}: {:?}", topics::SENSITIVITY_TOPIC, e);
            self.broker.disconnect().await;
            return self.broker_state;
        }

        self.broker_state = BrokerState::Connected;
        self.sessions = self.sessions.wrapping_add(1);
        self.publish(topics::STATUS_TOPIC, topics::status_payload(boiler_on).as_bytes())
            .await;
        self.publish(topics::HEALTH_TOPIC, topics::health_payload(sensor_active).as_bytes())
            .await;

        self.broker_state
    }

    /// Fire-and-forget publish. A failure drops the session so the next tick reconnects.
    pub async fn publish(&mut self, topic: &str, payload: &[u8]) -> bool {
        if self.broker_state != BrokerState::Connected {
            debug!("Not connected, dropping message for {}", topic);
            return false;
        }

        match self.broker.publish(topic, payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to publish to {}: {:?}", topic, e);
                self.mark_broker_lost().await;
                false
            }
        }
    }

    /// Pulls pending inbound messages into the queue.
    pub async fn drain_inbound(&mut self) {
        if self.broker_state != BrokerState::Connected {
            return;
        }

        if let Err(e) = self.broker.poll(&mut self.inbox).await {
            warn!("Failed to receive messages: {:?}", e);
            self.mark_broker_lost().await;
        }
    }

    pub fn next_inbound(&mut self) -> Option<InboundMessage> {
        self.inbox.pop_front()
    }

    /// Drops the broker session and, with `network`, the WiFi association too.
    pub async fn reset(&mut self, network: bool) {
        self.mark_broker_lost().await;

        if network {
            info!("Leaving WiFi network");
            self.link.leave().await;
            self.network = NetworkState::Disconnected;
        }
    }

    async fn mark_broker_lost(&mut self) {
        self.broker.disconnect().await;
        self.broker_state = BrokerState::Disconnected;
        self.inbox.clear();
    }
}

fn log_joined(ip: Option<Ipv4Addr>) {
    match ip {
        Some(ip) => info!("Connected to WiFi. IP address: {}", ip),
        None => info!("Connected to WiFi"),
    }
}
