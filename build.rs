use std::{env, error::Error, fs, path::Path};

use serde::Deserialize;

#[derive(Deserialize)]
struct RawConfig {
    device_id: String,
    wifi_ssid: Option<String>,
    wifi_psk: Option<String>,
    mqtt_hostname: Option<String>,
    mqtt_port: u16,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    mqtt_client_id: String,
    vibration_threshold: f32,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Tell Cargo to rerun if toml changes
    println!("cargo:rerun-if-changed=cfg.toml");

    // Read and parse
    let toml_str = fs::read_to_string("cfg.toml")?;
    let raw: RawConfig = toml::from_str(&toml_str)?;

    if raw.vibration_threshold <= 0.0 {
        return Err("cfg.toml: vibration_threshold must be greater than zero".into());
    }

    // Generate Rust code
    let code = format!(
        r#"
        pub const CONFIG: Config = Config {{
            device_id: {id:?},
            wifi_ssid: {ssid:?},
            wifi_psk: {psk:?},
            mqtt_hostname: {mh:?},
            mqtt_port: {mp},
            mqtt_username: {mu:?},
            mqtt_password: {mpw:?},
            mqtt_client_id: {mc:?},
            vibration_threshold: {vt:?},
        }};
    "#,
        id = raw.device_id,
        ssid = raw.wifi_ssid.unwrap_or_default(),
        psk = raw.wifi_psk.unwrap_or_default(),
        mh = raw.mqtt_hostname.unwrap_or_default(),
        mp = raw.mqtt_port,
        mu = raw.mqtt_username.unwrap_or_default(),
        mpw = raw.mqtt_password.unwrap_or_default(),
        mc = raw.mqtt_client_id,
        vt = raw.vibration_threshold,
    );

    let out_dir = env::var("OUT_DIR")?;
    let dest_path = Path::new(&out_dir).join("config.rs");

    fs::write(dest_path, code)?;
    Ok(())
}
