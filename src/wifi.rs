use core::net::Ipv4Addr;
use core::str::FromStr;

use embassy_executor::Spawner;
use embassy_net::{Runner, Stack, StackResources};
use esp_hal::rng::Rng;
use esp_radio::{
    wifi::{ClientConfig, Config, ModeConfig, WifiController, WifiDevice},
    Controller,
};
use heapless::String;
use log::{debug, info};
use static_cell::StaticCell;

use crate::config::CONFIG;
use crate::connectivity::{LinkError, NetworkLink};

static RESOURCES: StaticCell<StackResources<5>> = StaticCell::new();

#[derive(Debug)]
pub enum Error {
    WifiInitFailed,
    HostnameTooLong,
    TaskSpawnFailed,
}

/// Station-mode WiFi with a DHCP network stack on top.
pub struct WifiLink {
    controller: WifiController<'static>,
    stack: Stack<'static>,
}

impl WifiLink {
    pub fn new(
        init: &'static Controller<'static>,
        wifi: esp_hal::peripherals::WIFI<'static>,
        rng: Rng,
        spawner: Spawner,
    ) -> Result<Self, Error> {
        let (controller, interfaces) = esp_radio::wifi::new(init, wifi, Config::default())
            .map_err(|_| Error::WifiInitFailed)?;

        let mut dhcp_config = embassy_net::DhcpConfig::default();
        dhcp_config.hostname = Some(
            String::<32>::from_str(CONFIG.device_id).map_err(|_| Error::HostnameTooLong)?,
        );

        let seed = (rng.random() as u64) << 32 | rng.random() as u64;
        let config = embassy_net::Config::dhcpv4(dhcp_config);

        let resources = RESOURCES.init(StackResources::new());
        let (stack, runner) = embassy_net::new(interfaces.sta, config, resources, seed);

        spawner
            .spawn(net_task(runner))
            .map_err(|_| Error::TaskSpawnFailed)?;

        Ok(Self { controller, stack })
    }

    /// Network stack used by the broker session.
    pub fn stack(&self) -> Stack<'static> {
        self.stack
    }
}

impl NetworkLink for WifiLink {
    fn is_joined(&self) -> bool {
        self.stack.is_link_up() && self.stack.config_v4().is_some()
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.stack.config_v4().map(|config| config.address.address())
    }

    async fn begin_join(&mut self, network_id: &str, secret: &str) -> Result<(), LinkError> {
        if !matches!(self.controller.is_started(), Ok(true)) {
            let client_config = ClientConfig::default()
                .with_ssid(network_id.into())
                .with_password(secret.into());
            self.controller
                .set_config(&ModeConfig::Client(client_config))
                .map_err(|e| {
                    log::error!("Failed to set WiFi config: {:?}", e);
                    LinkError::ConfigFailed
                })?;

            info!("Starting wifi");
            self.controller.start_async().await.map_err(|e| {
                log::error!("Failed to start WiFi: {:?}", e);
                LinkError::StartFailed
            })?;
        }

        // association and DHCP complete in the background; the caller polls `is_joined`
        debug!("About to connect to {:?}...", network_id);
        self.controller.connect().map_err(|e| {
            info!("Failed to connect to wifi: {e:?}");
            LinkError::JoinFailed
        })
    }

    async fn leave(&mut self) {
        if let Err(e) = self.controller.disconnect_async().await {
            debug!("WiFi disconnect: {:?}", e);
        }
        // credentials are applied on the next start
        if let Err(e) = self.controller.stop_async().await {
            debug!("WiFi stop: {:?}", e);
        }
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}
