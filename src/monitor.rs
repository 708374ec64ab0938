//! The monitor loop.
//!
//! One [`Monitor`] owns every piece of mutable state: settings, boiler status, the
//! sensor and connectivity. [`Monitor::tick`] runs one iteration and is expected to be
//! called in a loop with a short pause in between.

use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;
use log::{debug, info, warn};

use crate::connectivity::{dispatch, Broker, ConnectivityManager, Delta, NetworkLink};
use crate::constants::*;
use crate::detector;
use crate::management::Snapshot;
use crate::sensor::{Accelerometer, MonitoredSensor};
use crate::settings::{Settings, SettingsBackend, SettingsStore};
use crate::topics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoilerStatus {
    pub on: bool,
    pub last_published_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// A reboot was requested and its grace period is over.
    Reboot,
}

pub struct Monitor<A, N, B, D, S> {
    settings: Settings,
    store: SettingsStore<S>,
    sensor: MonitoredSensor<A>,
    link: ConnectivityManager<N, B, D>,
    status: BoilerStatus,
    last_sample: Option<Instant>,
    last_health_check: Option<Instant>,
    reboot_at: Option<Instant>,
}

impl<A, N, B, D, S> Monitor<A, N, B, D, S>
where
    A: Accelerometer,
    N: NetworkLink,
    B: Broker,
    D: DelayNs,
    S: SettingsBackend,
{
    /// Loads the persisted settings. The sensor is activated by [`Monitor::boot`].
    pub fn new(
        mut store: SettingsStore<S>,
        sensor: MonitoredSensor<A>,
        link: ConnectivityManager<N, B, D>,
    ) -> Self {
        let settings = store.load();
        Self {
            settings,
            store,
            sensor,
            link,
            status: BoilerStatus {
                on: false,
                last_published_at: None,
            },
            last_sample: None,
            last_health_check: None,
            reboot_at: None,
        }
    }

    /// First sensor activation. A missing sensor is reported and retried later.
    pub async fn boot(&mut self, now: Instant) {
        info!("Boiler monitor {} starting", VERSION);
        if !self.sensor.try_activate().await {
            warn!("Could not find a valid ADXL345 sensor, check wiring! Will retry");
        }
        self.last_health_check = Some(now);
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn status(&self) -> BoilerStatus {
        self.status
    }

    pub fn sensor_active(&self) -> bool {
        self.sensor.is_active()
    }

    pub fn connectivity(&mut self) -> &mut ConnectivityManager<N, B, D> {
        &mut self.link
    }

    pub fn sensor(&mut self) -> &mut MonitoredSensor<A> {
        &mut self.sensor
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            boiler_on: self.status.on,
            sensor_active: self.sensor.is_active(),
            vibration_threshold: self.settings.vibration_threshold,
            ip: self.link.local_ip(),
        }
    }

    /// Runs one loop iteration.
    pub async fn tick(&mut self, now: Instant) -> TickOutcome {
        self.link.ensure_joined(&self.settings).await;
        let sessions = self.link.sessions_opened();
        self.link
            .ensure_broker_connected(&self.settings, self.status.on, self.sensor.is_active())
            .await;
        if self.link.sessions_opened() != sessions {
            // the announcement restarts the heartbeat window
            self.status.last_published_at = Some(now);
        }
        self.process_inbound().await;

        if is_due(self.last_health_check, now, HEALTH_CHECK_INTERVAL_MS) {
            self.last_health_check = Some(now);
            self.check_sensor_health().await;
        }

        if is_due(self.last_sample, now, SAMPLING_INTERVAL_MS) {
            self.last_sample = Some(now);
            self.sample(now).await;
        }

        match self.reboot_at {
            Some(at) if now >= at => TickOutcome::Reboot,
            _ => TickOutcome::Continue,
        }
    }

    async fn process_inbound(&mut self) {
        self.link.drain_inbound().await;

        while let Some(message) = self.link.next_inbound() {
            info!(
                "Message arrived on topic: {}. Message: {:?}",
                message.topic,
                core::str::from_utf8(&message.payload).unwrap_or("<binary>")
            );
            if let Some(delta) = dispatch(&message) {
                self.apply(delta).await;
            }
        }
    }

    async fn apply(&mut self, delta: Delta) {
        match delta {
            Delta::Threshold {
                value,
                ack_topic,
                ack_payload,
            } => {
                self.settings.vibration_threshold = value;
                info!("Sensitivity threshold updated to: {}", value);
                self.link.publish(&ack_topic, &ack_payload).await;
            }
        }
    }

    async fn check_sensor_health(&mut self) {
        let active = self.sensor.try_activate().await;
        self.link
            .publish(topics::HEALTH_TOPIC, topics::health_payload(active).as_bytes())
            .await;
    }

    async fn sample(&mut self, now: Instant) {
        let running = if self.sensor.is_active() {
            self.detect_vibration(now).await
        } else {
            None
        };

        match running {
            Some(on) if on != self.status.on => {
                self.status.on = on;
                self.publish_status(now).await;
            }
            _ => {
                if is_due(self.status.last_published_at, now, REPORT_INTERVAL_MS) {
                    self.publish_status(now).await;
                }
            }
        }
    }

    async fn detect_vibration(&mut self, now: Instant) -> Option<bool> {
        let sample = match self.sensor.read_sample(now).await {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Failed to read accelerometer: {:?}", e);
                return None;
            }
        };

        let magnitude = detector::magnitude(&sample);
        debug!("Vibration magnitude: {}", magnitude);

        let payload = topics::vibration_payload(magnitude);
        self.link
            .publish(topics::VIBRATION_TOPIC, payload.as_bytes())
            .await;

        Some(detector::is_running(
            magnitude,
            self.settings.vibration_threshold,
        ))
    }

    async fn publish_status(&mut self, now: Instant) {
        let status = topics::status_payload(self.status.on);
        if self.link.publish(topics::STATUS_TOPIC, status.as_bytes()).await {
            info!("Published boiler status: {}", status);
        }
        self.status.last_published_at = Some(now);
    }

    /// Validates, persists and applies new settings. Connections whose credentials
    /// changed are dropped and re-established on the next tick.
    pub async fn save_settings(&mut self, settings: Settings) -> bool {
        if let Err(e) = settings.validate() {
            warn!("Refusing settings: {:?}", e);
            return false;
        }

        if !self.store.save(&settings) {
            return false;
        }

        let network_changed = settings.network_changed(&self.settings);
        let broker_changed = settings.broker_changed(&self.settings);
        self.settings = settings;

        if network_changed || broker_changed {
            info!("Credentials changed, reconnecting");
            self.link.reset(network_changed).await;
        }

        true
    }

    /// Schedules a restart once the reply to the requester had time to go out.
    pub fn request_reboot(&mut self, now: Instant) {
        info!("Reboot requested");
        self.reboot_at = Some(now + Duration::from_millis(REBOOT_DELAY_MS));
    }
}

fn is_due(last: Option<Instant>, now: Instant, interval_ms: u64) -> bool {
    match last {
        None => true,
        Some(last) => now.saturating_duration_since(last) >= Duration::from_millis(interval_ms),
    }
}
