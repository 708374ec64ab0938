#![cfg_attr(not(test), no_std)]

pub mod adxl345;
pub mod config;
pub mod connectivity;
pub mod constants;
pub mod detector;
pub mod management;
pub mod monitor;
pub mod retry;
pub mod sensor;
pub mod settings;
pub mod topics;

#[cfg(feature = "esp32")]
pub mod flash;
#[cfg(feature = "esp32")]
pub mod mqtt;
#[cfg(feature = "esp32")]
pub mod wifi;

#[cfg(test)]
mod mock;
