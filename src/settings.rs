//! Persisted device settings.
//!
//! Settings are stored as UTF-8 text, one `KEY=VALUE` pair per line. Blank lines
//! and lines starting with `#` are ignored, unknown keys are dropped. Text values
//! are taken as written, numeric
//! values are parsed leniently: a malformed number reads as zero and the field
//! falls back to its provisioning default.

use core::fmt::Write;

use heapless::String;

use crate::config::CONFIG;
use crate::constants::SETTINGS_MAX_SIZE;

#[derive(Debug)]
pub enum Error {
    Overflow,
    Backend,
}

/// Reason a settings candidate was refused.
#[derive(Debug, PartialEq, Eq)]
pub enum Invalid {
    Threshold,
    LineBreak(SettingsKey),
}

/// Raw byte storage holding the serialized settings.
pub trait SettingsBackend {
    type Error: core::fmt::Debug;

    /// Reads the stored record into `buf`. `Ok(None)` means nothing was ever saved.
    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, Self::Error>;

    /// Replaces the stored record.
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsKey {
    WifiSsid,
    WifiPassword,
    MqttServer,
    MqttPort,
    MqttUser,
    MqttPassword,
    MqttClientId,
    VibrationThreshold,
}

impl SettingsKey {
    pub const ALL: [SettingsKey; 8] = [
        SettingsKey::WifiSsid,
        SettingsKey::WifiPassword,
        SettingsKey::MqttServer,
        SettingsKey::MqttPort,
        SettingsKey::MqttUser,
        SettingsKey::MqttPassword,
        SettingsKey::MqttClientId,
        SettingsKey::VibrationThreshold,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SettingsKey::WifiSsid => "WIFI_SSID",
            SettingsKey::WifiPassword => "WIFI_PASSWORD",
            SettingsKey::MqttServer => "MQTT_SERVER",
            SettingsKey::MqttPort => "MQTT_PORT",
            SettingsKey::MqttUser => "MQTT_USER",
            SettingsKey::MqttPassword => "MQTT_PASSWORD",
            SettingsKey::MqttClientId => "MQTT_CLIENT_ID",
            SettingsKey::VibrationThreshold => "VIBRATION_THRESHOLD",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub network_id: String<32>,
    pub network_secret: String<64>,
    pub broker_address: String<64>,
    pub broker_port: u16,
    pub broker_user: String<32>,
    pub broker_secret: String<64>,
    pub client_identity: String<32>,
    pub vibration_threshold: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            network_id: bounded(CONFIG.wifi_ssid).unwrap_or_default(),
            network_secret: bounded(CONFIG.wifi_psk).unwrap_or_default(),
            broker_address: bounded(CONFIG.mqtt_hostname).unwrap_or_default(),
            broker_port: CONFIG.mqtt_port,
            broker_user: bounded(CONFIG.mqtt_username).unwrap_or_default(),
            broker_secret: bounded(CONFIG.mqtt_password).unwrap_or_default(),
            client_identity: bounded(CONFIG.mqtt_client_id).unwrap_or_default(),
            vibration_threshold: CONFIG.vibration_threshold,
        }
    }
}

impl Settings {
    /// Builds settings from the persisted text, starting from the defaults.
    pub fn parse(text: &str) -> Self {
        let mut settings = Self::default();
        for line in text.lines() {
            if let Some((key, value)) = parse_line(line) {
                settings.apply(key, value);
            }
        }
        settings
    }

    /// Assigns a single field from its textual value.
    pub fn apply(&mut self, key: SettingsKey, value: &str) {
        let applied = match key {
            SettingsKey::WifiSsid => assign(&mut self.network_id, value),
            SettingsKey::WifiPassword => assign(&mut self.network_secret, value),
            SettingsKey::MqttServer => assign(&mut self.broker_address, value),
            SettingsKey::MqttUser => assign(&mut self.broker_user, value),
            SettingsKey::MqttPassword => assign(&mut self.broker_secret, value),
            SettingsKey::MqttClientId => assign(&mut self.client_identity, value),
            SettingsKey::MqttPort => {
                self.broker_port = parse_port(value);
                true
            }
            SettingsKey::VibrationThreshold => {
                self.vibration_threshold = parse_threshold(value);
                true
            }
        };

        if !applied {
            log::warn!("Value for {} is too long, keeping default", key.name());
        }
    }

    pub fn validate(&self) -> Result<(), Invalid> {
        if !is_valid_threshold(self.vibration_threshold) {
            return Err(Invalid::Threshold);
        }

        for key in SettingsKey::ALL {
            if let Some(text) = self.text(key) {
                if text.contains(['\n', '\r']) {
                    return Err(Invalid::LineBreak(key));
                }
            }
        }

        Ok(())
    }

    /// True when the network credentials differ.
    pub fn network_changed(&self, other: &Settings) -> bool {
        self.network_id != other.network_id || self.network_secret != other.network_secret
    }

    /// True when anything used to reach the broker differs.
    pub fn broker_changed(&self, other: &Settings) -> bool {
        self.broker_address != other.broker_address
            || self.broker_port != other.broker_port
            || self.broker_user != other.broker_user
            || self.broker_secret != other.broker_secret
            || self.client_identity != other.client_identity
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> core::fmt::Result {
        writeln!(out, "# WiFi")?;
        self.write_entry(out, SettingsKey::WifiSsid)?;
        self.write_entry(out, SettingsKey::WifiPassword)?;
        writeln!(out)?;
        writeln!(out, "# MQTT")?;
        self.write_entry(out, SettingsKey::MqttServer)?;
        self.write_entry(out, SettingsKey::MqttPort)?;
        self.write_entry(out, SettingsKey::MqttUser)?;
        self.write_entry(out, SettingsKey::MqttPassword)?;
        self.write_entry(out, SettingsKey::MqttClientId)?;
        writeln!(out)?;
        writeln!(out, "# Sensor")?;
        self.write_entry(out, SettingsKey::VibrationThreshold)
    }

    fn write_entry<W: Write>(&self, out: &mut W, key: SettingsKey) -> core::fmt::Result {
        match key {
            SettingsKey::MqttPort => writeln!(out, "{}={}", key.name(), self.broker_port),
            SettingsKey::VibrationThreshold => {
                writeln!(out, "{}={}", key.name(), self.vibration_threshold)
            }
            _ => writeln!(out, "{}={}", key.name(), self.text(key).unwrap_or_default()),
        }
    }

    fn text(&self, key: SettingsKey) -> Option<&str> {
        match key {
            SettingsKey::WifiSsid => Some(&self.network_id),
            SettingsKey::WifiPassword => Some(&self.network_secret),
            SettingsKey::MqttServer => Some(&self.broker_address),
            SettingsKey::MqttUser => Some(&self.broker_user),
            SettingsKey::MqttPassword => Some(&self.broker_secret),
            SettingsKey::MqttClientId => Some(&self.client_identity),
            SettingsKey::MqttPort | SettingsKey::VibrationThreshold => None,
        }
    }
}

pub struct SettingsStore<B> {
    backend: B,
}

impl<B: SettingsBackend> SettingsStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Loads the stored settings. Never fails: a missing or unreadable store yields the defaults.
    pub fn load(&mut self) -> Settings {
        let mut buf = [0u8; SETTINGS_MAX_SIZE];

        let len = match self.backend.read(&mut buf) {
            Ok(Some(len)) => len.min(buf.len()),
            Ok(None) => {
                log::info!("No stored settings, using defaults");
                return Settings::default();
            }
            Err(e) => {
                log::warn!("Failed to read settings: {:?}. Using defaults", e);
                return Settings::default();
            }
        };

        let text = match core::str::from_utf8(&buf[..len]) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Stored settings are not valid UTF-8 after {} bytes", e.valid_up_to());
                // valid_up_to always lands on a character boundary
                core::str::from_utf8(&buf[..e.valid_up_to()]).unwrap_or_default()
            }
        };

        let settings = Settings::parse(text);
        log::info!("Settings loaded ({} bytes)", len);
        settings
    }

    /// Persists `settings`, overwriting the previous record.
    pub fn save(&mut self, settings: &Settings) -> bool {
        match self.try_save(settings) {
            Ok(()) => {
                log::info!("Settings saved");
                true
            }
            Err(e) => {
                log::error!("Failed to save settings: {:?}", e);
                false
            }
        }
    }

    fn try_save(&mut self, settings: &Settings) -> Result<(), Error> {
        let mut text: String<SETTINGS_MAX_SIZE> = String::new();
        settings.write_to(&mut text).map_err(|_| Error::Overflow)?;

        self.backend.write(text.as_bytes()).map_err(|e| {
            log::error!("Settings backend write failed: {:?}", e);
            Error::Backend
        })
    }
}

/// Splits a `KEY=VALUE` line. Comments, blank lines and unknown keys yield `None`.
///
/// The value is kept verbatim up to the line terminator: surrounding spaces are part
/// of passphrases.
pub fn parse_line(line: &str) -> Option<(SettingsKey, &str)> {
    let line = line.trim_end_matches('\r');
    let head = line.trim_start();
    if head.is_empty() || head.starts_with('#') {
        return None;
    }

    let (key, value) = head.split_once('=')?;
    let key = SettingsKey::from_name(key.trim())?;
    Some((key, value))
}

pub fn is_valid_threshold(threshold: f32) -> bool {
    threshold.is_finite() && threshold > 0.0
}

/// Parses the leading decimal number of `s`, like C `atof`. Returns 0 when there is none.
pub fn parse_f32_lenient(s: &str) -> f32 {
    let s = s.trim();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }

    let int_digits = count_digits(&bytes[end..]);
    end += int_digits;

    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = count_digits(&bytes[end + 1..]);
        end += 1 + frac_digits;
    }

    if int_digits + frac_digits == 0 {
        return 0.0;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = count_digits(&bytes[exp_end..]);
        if exp_digits > 0 {
            end = exp_end + exp_digits;
        }
    }

    s[..end].parse().unwrap_or(0.0)
}

/// Parses the leading unsigned integer of `s`, like C `atoi`. Returns 0 when there is
/// none or when it does not fit.
pub fn parse_u16_lenient(s: &str) -> u16 {
    let s = s.trim();
    let digits = s.strip_prefix('+').unwrap_or(s);
    let len = count_digits(digits.as_bytes());
    digits[..len].parse().unwrap_or(0)
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

fn parse_port(value: &str) -> u16 {
    match parse_u16_lenient(value) {
        0 => CONFIG.mqtt_port,
        port => port,
    }
}

fn parse_threshold(value: &str) -> f32 {
    let threshold = parse_f32_lenient(value);
    if is_valid_threshold(threshold) {
        threshold
    } else {
        CONFIG.vibration_threshold
    }
}

fn bounded<const N: usize>(value: &str) -> Option<String<N>> {
    String::try_from(value).ok()
}

fn assign<const N: usize>(field: &mut String<N>, value: &str) -> bool {
    match bounded(value) {
        Some(v) => {
            *field = v;
            true
        }
        None => false,
    }
}
