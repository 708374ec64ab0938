use core::net::Ipv4Addr;
use core::sync::atomic::{AtomicPtr, Ordering};

use embassy_net::{dns::DnsQueryType, tcp::TcpSocket, IpAddress, Stack};
use embassy_time::{with_timeout, Duration, Instant};
use heapless::String;
use log::{debug, warn};
use rust_mqtt::{
    client::{
        client::MqttClient,
        client_config::{ClientConfig, MqttVersion},
    },
    packet::v5::{publish_packet::QualityOfService, reason_codes::ReasonCode},
    utils::rng_generator::CountingRng,
};
use static_cell::StaticCell;

use crate::connectivity::{Broker, BrokerError, Inbox};
use crate::constants::*;
use crate::settings::Settings;
use crate::topics::InboundMessage;

/// Socket and client buffers plus the credentials the client borrows.
struct SessionBuffers {
    rx: [u8; RX_BUFFER_SIZE],
    tx: [u8; TX_BUFFER_SIZE],
    mqtt_rx: [u8; MQTT_RX_BUFFER_SIZE],
    mqtt_tx: [u8; MQTT_TX_BUFFER_SIZE],
    client_id: String<32>,
    username: String<32>,
    password: String<64>,
}

static SESSION_BUFFERS: StaticCell<SessionBuffers> = StaticCell::new();
static SESSION_PTR: AtomicPtr<SessionBuffers> = AtomicPtr::new(core::ptr::null_mut());

type Client = MqttClient<'static, TcpSocket<'static>, MQTT_MAX_PROPERTIES, CountingRng>;

struct Session {
    client: Client,
    last_ping: Instant,
}

/// MQTT v5 over plain TCP. At most one session is alive at a time.
pub struct MqttBroker {
    stack: Stack<'static>,
    session: Option<Session>,
}

impl MqttBroker {
    /// Must be called once; the session buffers are reserved here.
    pub fn new(stack: Stack<'static>) -> Self {
        let buffers = SESSION_BUFFERS.init(SessionBuffers {
            rx: [0; RX_BUFFER_SIZE],
            tx: [0; TX_BUFFER_SIZE],
            mqtt_rx: [0; MQTT_RX_BUFFER_SIZE],
            mqtt_tx: [0; MQTT_TX_BUFFER_SIZE],
            client_id: String::new(),
            username: String::new(),
            password: String::new(),
        });
        SESSION_PTR.store(buffers as *mut _, Ordering::Release);

        Self {
            stack,
            session: None,
        }
    }

    async fn resolve(&self, hostname: &str) -> Result<IpAddress, BrokerError> {
        if let Ok(ip) = hostname.parse::<Ipv4Addr>() {
            return Ok(IpAddress::Ipv4(ip));
        }

        self.stack
            .dns_query(hostname, DnsQueryType::A)
            .await
            .map_err(|_| BrokerError::DnsLookupFailed)?
            .first()
            .copied()
            .ok_or(BrokerError::DnsLookupFailed)
    }

    fn session(&mut self) -> Result<&mut Session, BrokerError> {
        self.session.as_mut().ok_or(BrokerError::NotConnected)
    }

    async fn keep_alive(&mut self) -> Result<(), BrokerError> {
        let session = self.session()?;
        let interval = Duration::from_secs(u64::from(MQTT_KEEP_ALIVE_SECS) / 2);
        if session.last_ping.elapsed() < interval {
            return Ok(());
        }

        session.client.send_ping().await.map_err(|e| {
            warn!("MQTT ping failed: {:?}", e);
            BrokerError::ReceiveFailed
        })?;
        session.last_ping = Instant::now();
        Ok(())
    }
}

impl Broker for MqttBroker {
    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    async fn connect(&mut self, settings: &Settings) -> Result<(), BrokerError> {
        // the previous client must release the buffers first
        self.disconnect().await;

        let addr = self.resolve(&settings.broker_address).await?;

        // SAFETY: SESSION_PTR was set in `new()` and no session is alive at this point,
        // so nothing else borrows the buffers.
        let buffers = unsafe { &mut *SESSION_PTR.load(Ordering::Acquire) };
        let SessionBuffers {
            rx,
            tx,
            mqtt_rx,
            mqtt_tx,
            client_id,
            username,
            password,
        } = buffers;

        client_id.clone_from(&settings.client_identity);
        username.clone_from(&settings.broker_user);
        password.clone_from(&settings.broker_secret);

        let mut socket = TcpSocket::new(self.stack, rx, tx);
        socket.set_timeout(Some(Duration::from_secs(u64::from(MQTT_KEEP_ALIVE_SECS) * 2)));
        socket
            .connect((addr, settings.broker_port))
            .await
            .map_err(|e| {
                debug!("TCP connect failed: {:?}", e);
                BrokerError::SocketConnectionError
            })?;

        let mut config = ClientConfig::new(MqttVersion::MQTTv5, CountingRng(20000));
        config.add_max_subscribe_qos(QualityOfService::QoS0);
        config.add_client_id(client_id.as_str());
        if !username.is_empty() {
            config.add_username(username.as_str());
            config.add_password(password.as_str());
        }
        config.max_packet_size = MQTT_RX_BUFFER_SIZE as u32;
        config.keep_alive = MQTT_KEEP_ALIVE_SECS;

        let mut client = MqttClient::<_, MQTT_MAX_PROPERTIES, _>::new(
            socket,
            mqtt_tx,
            MQTT_TX_BUFFER_SIZE,
            mqtt_rx,
            MQTT_RX_BUFFER_SIZE,
            config,
        );

        client.connect_to_broker().await.map_err(|code| match code {
            ReasonCode::NotAuthorized | ReasonCode::BadUserNameOrPassword => {
                BrokerError::InvalidCredentials
            }
            code => {
                debug!("CONNACK: {:?}", code);
                BrokerError::ConnectionRefused
            }
        })?;

        self.session = Some(Session {
            client,
            last_ping: Instant::now(),
        });
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        let session = self.session()?;
        if let Err(e) = session.client.subscribe_to_topic(topic).await {
            warn!("SUBACK for {}: {:?}", topic, e);
            self.session = None;
            return Err(BrokerError::SubscribeFailed);
        }
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let session = self.session()?;
        if let Err(e) = session
            .client
            .send_message(topic, payload, QualityOfService::QoS0, false)
            .await
        {
            warn!("Failed to publish message: {:?}", e);
            self.session = None;
            return Err(BrokerError::PublishMessageFailed);
        }
        Ok(())
    }

    async fn poll(&mut self, inbox: &mut Inbox) -> Result<(), BrokerError> {
        if let Err(e) = self.keep_alive().await {
            self.session = None;
            return Err(e);
        }

        let session = self.session()?;
        loop {
            // A window that expires mid-packet drops the bytes already read. The next
            // receive then fails to decode and the session is rebuilt, which costs a
            // reconnect but never blocks the sampling loop.
            let received = with_timeout(
                Duration::from_millis(MQTT_POLL_WINDOW_MS),
                session.client.receive_message(),
            )
            .await;

            match received {
                // nothing pending
                Err(_) => return Ok(()),
                Ok(Ok((topic, payload))) => match InboundMessage::new(topic, payload) {
                    Some(message) => {
                        if inbox.push_back(message).is_err() {
                            warn!("Inbound queue full, dropping message on {}", topic);
                        }
                    }
                    None => warn!("Oversized message on {}, dropped", topic),
                },
                Ok(Err(e)) => {
                    warn!("MQTT receive failed: {:?}", e);
                    self.session = None;
                    return Err(BrokerError::ReceiveFailed);
                }
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.client.disconnect().await {
                debug!("MQTT disconnect: {:?}", e);
            }
        }
    }
}
