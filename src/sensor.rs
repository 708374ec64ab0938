#![allow(async_fn_in_trait)]

use embassy_time::Instant;
use log::{info, warn};

#[derive(Debug, PartialEq, Eq)]
pub enum SensorError {
    NotFound,
    InitFailure,
    MeasurementFailure,
}

/// Measurement range of the accelerometer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Range {
    G2,
    G4,
    G8,
    G16,
}

/// One three-axis reading, in m/s^2.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub timestamp: Instant,
}

/// Acceleration on each axis, in m/s^2
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acceleration {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

pub trait Accelerometer {
    /// Checks the device id and enables measurements.
    async fn init(&mut self) -> Result<(), SensorError>;

    async fn set_range(&mut self, range: Range) -> Result<(), SensorError>;

    async fn acceleration(&mut self) -> Result<Acceleration, SensorError>;
}

/// Range applied after every successful activation
pub const MEASUREMENT_RANGE: Range = Range::G2;

/// Health tracking around a single accelerometer.
pub struct MonitoredSensor<A> {
    sensor: A,
    active: bool,
}

impl<A: Accelerometer> MonitoredSensor<A> {
    pub fn new(sensor: A) -> Self {
        Self {
            sensor,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn sensor_mut(&mut self) -> &mut A {
        &mut self.sensor
    }

    /// Initialises the accelerometer. Safe to call repeatedly.
    pub async fn try_activate(&mut self) -> bool {
        let result = match self.sensor.init().await {
            Ok(()) => self.sensor.set_range(MEASUREMENT_RANGE).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                if !self.active {
                    info!("Accelerometer active");
                }
                self.active = true;
            }
            Err(e) => {
                warn!("Accelerometer unavailable: {:?}", e);
                self.active = false;
            }
        }

        self.active
    }

    /// Reads one sample. Only meaningful after a successful activation; the caller
    /// checks [`MonitoredSensor::is_active`] first.
    pub async fn read_sample(&mut self, now: Instant) -> Result<Sample, SensorError> {
        let acceleration = self.sensor.acceleration().await?;
        Ok(Sample {
            x: acceleration.x,
            y: acceleration.y,
            z: acceleration.z,
            timestamp: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAccelerometer;
    use embassy_futures::block_on;

    #[test]
    fn activation_applies_measurement_range() {
        let mut monitored = MonitoredSensor::new(MockAccelerometer::present());

        assert!(block_on(monitored.try_activate()));
        assert!(monitored.is_active());
        assert_eq!(monitored.sensor.range, Some(MEASUREMENT_RANGE));
    }

    #[test]
    fn activation_is_repeatable() {
        let mut monitored = MonitoredSensor::new(MockAccelerometer::present());

        assert!(block_on(monitored.try_activate()));
        assert!(block_on(monitored.try_activate()));
        assert_eq!(monitored.sensor.init_calls, 2);
        assert!(monitored.is_active());
    }

    #[test]
    fn missing_sensor_stays_inactive() {
        let mut monitored = MonitoredSensor::new(MockAccelerometer::absent());

        assert!(!block_on(monitored.try_activate()));
        assert!(!monitored.is_active());
        assert_eq!(monitored.sensor.range, None);
    }

    #[test]
    fn losing_the_sensor_clears_the_flag() {
        let mut monitored = MonitoredSensor::new(MockAccelerometer::present());
        assert!(block_on(monitored.try_activate()));

        monitored.sensor.present = false;
        assert!(!block_on(monitored.try_activate()));
        assert!(!monitored.is_active());
    }

    #[test]
    fn sample_carries_reading_and_timestamp() {
        let mut sensor = MockAccelerometer::present();
        sensor.reading = Acceleration {
            x: 0.1,
            y: -0.2,
            z: 9.9,
        };
        let mut monitored = MonitoredSensor::new(sensor);
        block_on(monitored.try_activate());

        let sample = block_on(monitored.read_sample(Instant::from_millis(1500))).unwrap();
        assert_eq!(sample.x, 0.1);
        assert_eq!(sample.y, -0.2);
        assert_eq!(sample.z, 9.9);
        assert_eq!(sample.timestamp, Instant::from_millis(1500));
    }
}
