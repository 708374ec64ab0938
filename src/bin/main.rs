#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_time::{Delay, Duration, Instant, Timer};

use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::{self as hal};
use esp_println::logger::init_logger;
use esp_storage::FlashStorage;
use static_cell::StaticCell;

use hal::{
    i2c::master::{BusTimeout, I2c},
    rng::Rng,
    time::Rate,
    timer::timg::TimerGroup,
};

use boiler_monitor::adxl345::Adxl345;
use boiler_monitor::connectivity::ConnectivityManager;
use boiler_monitor::constants::*;
use boiler_monitor::flash::FlashBackend;
use boiler_monitor::management;
use boiler_monitor::monitor::{Monitor, TickOutcome};
use boiler_monitor::mqtt::MqttBroker;
use boiler_monitor::sensor::MonitoredSensor;
use boiler_monitor::settings::SettingsStore;
use boiler_monitor::wifi::WifiLink;

esp_bootloader_esp_idf::esp_app_desc!();

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();

#[esp_rtos::main]
async fn main(spawner: Spawner) {
    init_logger(log::LevelFilter::Info);

    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_alloc::heap_allocator!(size: HEAP_SIZE);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let i2c_config = hal::i2c::master::Config::default()
        .with_frequency(Rate::from_khz(100))
        .with_timeout(BusTimeout::BusCycles(24));

    let i2c = I2c::new(peripherals.I2C0, i2c_config)
        .expect("Failed to configure I2C")
        .with_sda(peripherals.GPIO21)
        .with_scl(peripherals.GPIO22)
        .into_async();

    let radio = RADIO.init(esp_radio::init().expect("Failed to initialize radio"));
    let wifi = WifiLink::new(radio, peripherals.WIFI, Rng::new(), spawner)
        .expect("Failed to initialize WiFi");
    let broker = MqttBroker::new(wifi.stack());

    let store = SettingsStore::new(FlashBackend::new(FlashStorage::new(peripherals.FLASH)));

    let mut monitor = Monitor::new(
        store,
        MonitoredSensor::new(Adxl345::new(i2c)),
        ConnectivityManager::new(wifi, broker, Delay),
    );

    match management::config_json(monitor.settings()) {
        Ok(config) => log::info!("Settings: {}", config),
        Err(e) => log::warn!("Settings could not be rendered: {:?}", e),
    }

    monitor.boot(Instant::now()).await;

    let mut last_report = Instant::now();
    loop {
        if monitor.tick(Instant::now()).await == TickOutcome::Reboot {
            log::info!("Rebooting");
            esp_hal::system::software_reset();
        }

        if last_report.elapsed() >= Duration::from_millis(REPORT_INTERVAL_MS) {
            last_report = Instant::now();
            if let Ok(status) = management::status_json(&monitor.snapshot()) {
                log::debug!("{}", status);
            }
        }

        Timer::after(Duration::from_millis(TICK_INTERVAL_MS)).await;
    }
}
