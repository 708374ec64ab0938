//! JSON documents served by the management surface.

use core::fmt::{self, Write};
use core::net::Ipv4Addr;

use heapless::String;

use crate::settings::Settings;
use crate::topics;

/// Rendered in place of a stored secret.
const SECRET_MASK: &str = "********";

pub const STATUS_JSON_MAX: usize = 128;
pub const CONFIG_JSON_MAX: usize = 768;

/// Point-in-time view of the monitor, taken by [`crate::monitor::Monitor::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub boiler_on: bool,
    pub sensor_active: bool,
    pub vibration_threshold: f32,
    pub ip: Option<Ipv4Addr>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Overflow,
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Error::Overflow
    }
}

pub fn status_json(snapshot: &Snapshot) -> Result<String<STATUS_JSON_MAX>, Error> {
    let mut out = String::new();
    write!(
        out,
        "{{\"boiler\":\"{}\",\"sensor\":\"{}\",\"vibrationThreshold\":{:.2},\"ip\":\"",
        topics::status_payload(snapshot.boiler_on),
        topics::health_payload(snapshot.sensor_active),
        snapshot.vibration_threshold,
    )?;
    if let Some(ip) = snapshot.ip {
        write!(out, "{}", ip)?;
    }
    out.push_str("\"}").map_err(|_| Error::Overflow)?;
    Ok(out)
}

/// Current settings keyed by field name. Secrets are masked when set.
pub fn config_json(settings: &Settings) -> Result<String<CONFIG_JSON_MAX>, Error> {
    let mut out = String::new();
    out.push('{').map_err(|_| Error::Overflow)?;
    field(&mut out, "network_id", &settings.network_id)?;
    out.push(',').map_err(|_| Error::Overflow)?;
    field(&mut out, "network_secret", masked(&settings.network_secret))?;
    out.push(',').map_err(|_| Error::Overflow)?;
    field(&mut out, "broker_address", &settings.broker_address)?;
    write!(out, ",\"broker_port\":{},", settings.broker_port)?;
    field(&mut out, "broker_user", &settings.broker_user)?;
    out.push(',').map_err(|_| Error::Overflow)?;
    field(&mut out, "broker_secret", masked(&settings.broker_secret))?;
    out.push(',').map_err(|_| Error::Overflow)?;
    field(&mut out, "client_identity", &settings.client_identity)?;
    write!(
        out,
        ",\"vibration_threshold\":{:.2}}}",
        settings.vibration_threshold
    )?;
    Ok(out)
}

fn masked(secret: &str) -> &str {
    if secret.is_empty() {
        ""
    } else {
        SECRET_MASK
    }
}

fn field<W: Write>(out: &mut W, name: &str, value: &str) -> fmt::Result {
    write!(out, "\"{}\":\"", name)?;
    escape(out, value)?;
    out.write_char('"')
}

fn escape<W: Write>(out: &mut W, value: &str) -> fmt::Result {
    for c in value.chars() {
        match c {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '\t' => out.write_str("\\t")?,
            c if (c as u32) < 0x20 => write!(out, "\\u{:04x}", c as u32)?,
            c => out.write_char(c)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_when_joined() {
        let snapshot = Snapshot {
            boiler_on: true,
            sensor_active: true,
            vibration_threshold: 1.5,
            ip: Some(Ipv4Addr::new(192, 168, 1, 50)),
        };

        assert_eq!(
            status_json(&snapshot).unwrap().as_str(),
            r#"{"boiler":"ON","sensor":"OK","vibrationThreshold":1.50,"ip":"192.168.1.50"}"#
        );
    }

    #[test]
    fn status_without_network() {
        let snapshot = Snapshot {
            boiler_on: false,
            sensor_active: false,
            vibration_threshold: 1.0,
            ip: None,
        };

        assert_eq!(
            status_json(&snapshot).unwrap().as_str(),
            r#"{"boiler":"OFF","sensor":"FAILED","vibrationThreshold":1.00,"ip":""}"#
        );
    }

    #[test]
    fn config_masks_secrets_and_escapes_text() {
        let settings = Settings {
            network_id: String::try_from("my \"home\"").unwrap(),
            network_secret: String::try_from("hunter2").unwrap(),
            broker_address: String::try_from("10.0.0.2").unwrap(),
            broker_port: 1884,
            broker_user: String::try_from("boiler").unwrap(),
            broker_secret: String::new(),
            client_identity: String::try_from("ESP32H2_Boiler").unwrap(),
            vibration_threshold: 0.75,
        };

        assert_eq!(
            config_json(&settings).unwrap().as_str(),
            concat!(
                r#"{"network_id":"my \"home\"","network_secret":"********","#,
                r#""broker_address":"10.0.0.2","broker_port":1884,"broker_user":"boiler","#,
                r#""broker_secret":"","client_identity":"ESP32H2_Boiler","#,
                r#""vibration_threshold":0.75}"#
            )
        );
    }

    #[test]
    fn control_characters_are_escaped() {
        let mut out = std::string::String::new();
        escape(&mut out, "a\\b\u{1}").unwrap();
        assert_eq!(out, "a\\\\b\\u0001");
    }
}
