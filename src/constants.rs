/// Current firmware version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Size of the heap in DRAM (internal memory)
pub const HEAP_SIZE: usize = 72 * 1024;

/// Pause between two monitor ticks
pub const TICK_INTERVAL_MS: u64 = 50;

/// Interval between accelerometer samples
pub const SAMPLING_INTERVAL_MS: u64 = 1_000;
/// Interval between two status publications when the status does not change
pub const REPORT_INTERVAL_MS: u64 = 10_000;
/// Interval between sensor health checks
pub const HEALTH_CHECK_INTERVAL_MS: u64 = 30_000;
/// Delay between a reboot request and the actual reset
pub const REBOOT_DELAY_MS: u64 = 1_000;

/// Number of link checks before giving up on a WiFi join for this tick
pub const WIFI_JOIN_ATTEMPTS: u8 = 20;
/// Delay after each unsuccessful WiFi link check
pub const WIFI_JOIN_DELAY_MS: u32 = 500;

/// Number of broker connection attempts before yielding back to the loop
pub const MQTT_CONNECT_ATTEMPTS: u8 = 5;
/// Delay after each failed broker connection attempt
pub const MQTT_CONNECT_DELAY_MS: u32 = 5_000;
/// MQTT keep alive, in seconds
pub const MQTT_KEEP_ALIVE_SECS: u16 = 60;
/// Time spent waiting for inbound messages on each drain
pub const MQTT_POLL_WINDOW_MS: u64 = 10;
/// Maximum number of inbound messages queued between two drains
pub const MQTT_INBOX_CAPACITY: usize = 8;
/// Maximum MQTT properties held by the client
pub const MQTT_MAX_PROPERTIES: usize = 5;

/// Size of the TCP socket receive buffer
pub const RX_BUFFER_SIZE: usize = 2048;
/// Size of the TCP socket transmit buffer
pub const TX_BUFFER_SIZE: usize = 2048;
/// Size of the MQTT client receive buffer for application data
pub const MQTT_RX_BUFFER_SIZE: usize = 512;
/// Size of the MQTT client transmit buffer for application data
pub const MQTT_TX_BUFFER_SIZE: usize = 512;

/// Maximum size of a topic name
pub const TOPIC_MAX: usize = 64;
/// Maximum size of an inbound or outbound payload
pub const PAYLOAD_MAX: usize = 32;

/// Maximum size of the serialized settings file
pub const SETTINGS_MAX_SIZE: usize = 512;
/// Flash offset of the settings record (last 4 KiB sector below 4 MiB)
pub const SETTINGS_FLASH_OFFSET: u32 = 0x3F_F000;
