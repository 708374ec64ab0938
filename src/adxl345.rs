//! ADXL345 three-axis accelerometer over I2C.
//!
//! Register-level driver: the device runs in full resolution mode, where every range
//! scales at 4 mg per LSB.

use embedded_hal_async::i2c::I2c;
use log::info;

use crate::sensor::{Acceleration, Accelerometer, Range, SensorError};

/// Default address with the ALT ADDRESS pin tied low
pub const DEFAULT_ADDRESS: u8 = 0x53;

const REG_DEVID: u8 = 0x00;
const REG_POWER_CTL: u8 = 0x2D;
const REG_DATA_FORMAT: u8 = 0x31;
const REG_DATAX0: u8 = 0x32;

const DEVICE_ID: u8 = 0xE5;
const POWER_CTL_MEASURE: u8 = 0x08;
const DATA_FORMAT_FULL_RES: u8 = 0x08;
const DATA_FORMAT_RANGE_MASK: u8 = 0x03;

const G_PER_LSB: f32 = 0.004;
const STANDARD_GRAVITY: f32 = 9.80665;

pub struct Adxl345<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Adxl345<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    async fn read_register(&mut self, register: u8) -> Result<u8, I2C::Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .await?;
        Ok(buf[0])
    }

    async fn write_register(&mut self, register: u8, value: u8) -> Result<(), I2C::Error> {
        self.i2c.write(self.address, &[register, value]).await
    }
}

impl<I2C: I2c> Accelerometer for Adxl345<I2C> {
    async fn init(&mut self) -> Result<(), SensorError> {
        let id = self
            .read_register(REG_DEVID)
            .await
            .map_err(|_| SensorError::NotFound)?;

        if id != DEVICE_ID {
            log::warn!("Unexpected ADXL345 device id {:#04x}", id);
            return Err(SensorError::NotFound);
        }

        self.write_register(REG_POWER_CTL, POWER_CTL_MEASURE)
            .await
            .map_err(|_| SensorError::InitFailure)?;

        info!("Initialised ADXL345");
        Ok(())
    }

    async fn set_range(&mut self, range: Range) -> Result<(), SensorError> {
        let bits = match range {
            Range::G2 => 0b00,
            Range::G4 => 0b01,
            Range::G8 => 0b10,
            Range::G16 => 0b11,
        };

        let format = self
            .read_register(REG_DATA_FORMAT)
            .await
            .map_err(|_| SensorError::InitFailure)?;
        let format = (format & !(DATA_FORMAT_RANGE_MASK | DATA_FORMAT_FULL_RES))
            | DATA_FORMAT_FULL_RES
            | bits;

        self.write_register(REG_DATA_FORMAT, format)
            .await
            .map_err(|_| SensorError::InitFailure)
    }

    async fn acceleration(&mut self) -> Result<Acceleration, SensorError> {
        let mut raw = [0u8; 6];
        self.i2c
            .write_read(self.address, &[REG_DATAX0], &mut raw)
            .await
            .map_err(|_| SensorError::MeasurementFailure)?;

        let scale = |lo: u8, hi: u8| i16::from_le_bytes([lo, hi]) as f32 * G_PER_LSB * STANDARD_GRAVITY;

        Ok(Acceleration {
            x: scale(raw[0], raw[1]),
            y: scale(raw[2], raw[3]),
            z: scale(raw[4], raw[5]),
        })
    }
}
