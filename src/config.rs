pub struct Config {
    // Device ID (used as DHCP hostname)
    pub device_id: &'static str,

    // Wi-Fi SSID used until one is saved in flash
    pub wifi_ssid: &'static str,

    // Wi-Fi pre-shared key (password)
    pub wifi_psk: &'static str,

    // MQTT broker hostname or IP address
    pub mqtt_hostname: &'static str,

    // MQTT port (usually 1883)
    pub mqtt_port: u16,

    // MQTT username for authentication
    pub mqtt_username: &'static str,

    // MQTT password for authentication
    pub mqtt_password: &'static str,

    // MQTT client identifier
    pub mqtt_client_id: &'static str,

    // Vibration magnitude threshold (m/s^2)
    pub vibration_threshold: f32,
}

// config values are generated at compile time
include!(concat!(env!("OUT_DIR"), "/config.rs"));
