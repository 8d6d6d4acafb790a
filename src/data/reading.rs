//! Sensor reading data structures.
//!
//! Contains the snapshot of last-known values reported by the device.

use std::fmt;

use crate::utils::{celsius_to_fahrenheit, round_to};

/// Snapshot of every value decoded from one status payload.
///
/// Each field is `None` until the first successful decode. A decode
/// produces a fully populated snapshot, so after the first one all
/// fields are `Some`.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorReading {
    /// Air temperature in degrees Celsius.
    pub temperature: Option<f64>,
    /// Heat index in degrees Celsius.
    pub heat_index: Option<f64>,
    /// Relative humidity in percent.
    pub humidity: Option<f64>,
    /// CO₂ concentration in ppm.
    pub co2: Option<u32>,
    /// Total volatile organic compounds in µg/m³.
    pub tvoc: Option<u32>,
    /// PM2.5 concentration in µg/m³.
    pub pm25: Option<f64>,
    /// Air quality index.
    pub aqi: Option<u32>,
    /// Grease filter state in percent.
    pub grease_filter: Option<u32>,
    /// Light level (0-n steps).
    pub light: Option<f64>,
    /// Fan level (0-n steps).
    pub fan: Option<f64>,
    /// Cooking activity indicator.
    pub activity: Option<u32>,
    /// Alarm level in percent.
    pub alarm_level: Option<u32>,
    /// Power draw in watts.
    pub power: Option<u32>,
    /// Device uptime in seconds.
    pub uptime: Option<u32>,
}

impl SensorReading {
    /// Create an empty reading with every value unknown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if no payload has been decoded into this reading yet.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Temperature in degrees Fahrenheit.
    pub fn temperature_fahrenheit(&self) -> Option<f64> {
        self.temperature.map(celsius_to_fahrenheit)
    }

    /// Uptime as a duration.
    pub fn uptime_duration(&self) -> Option<std::time::Duration> {
        self.uptime
            .map(|secs| std::time::Duration::from_secs(u64::from(secs)))
    }
}

fn write_value<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    label: &str,
    value: Option<T>,
    unit: &str,
) -> fmt::Result {
    match value {
        Some(v) => write!(f, "{}: {}{}", label, v, unit),
        None => write!(f, "{}: --", label),
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, "temperature", self.temperature.map(|v| round_to(v, 1)), "°C")?;
        f.write_str(", ")?;
        write_value(f, "heat index", self.heat_index.map(|v| round_to(v, 1)), "°C")?;
        f.write_str(", ")?;
        write_value(f, "humidity", self.humidity.map(|v| round_to(v, 1)), "%")?;
        f.write_str(", ")?;
        write_value(f, "CO₂", self.co2, " ppm")?;
        f.write_str(", ")?;
        write_value(f, "tVOC", self.tvoc, " µg/m³")?;
        f.write_str(", ")?;
        write_value(f, "PM2.5", self.pm25.map(|v| round_to(v, 1)), " µg/m³")?;
        f.write_str(", ")?;
        write_value(f, "AQI", self.aqi, "")?;
        f.write_str(", ")?;
        write_value(f, "grease filter", self.grease_filter, "%")?;
        f.write_str(", ")?;
        write_value(f, "light", self.light.map(f64::round), "")?;
        f.write_str(", ")?;
        write_value(f, "fan", self.fan.map(f64::round), "")?;
        f.write_str(", ")?;
        write_value(f, "activity", self.activity, "")?;
        f.write_str(", ")?;
        write_value(f, "alarm", self.alarm_level, "%")?;
        f.write_str(", ")?;
        write_value(f, "power", self.power, " W")?;
        f.write_str(", ")?;
        write_value(f, "uptime", self.uptime, " s")
    }
}
