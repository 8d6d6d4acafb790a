//! Environmental status parsing.
//!
//! Parses notifications from the environmental status characteristic.

use bytes::Buf;
use tracing::{debug, trace};

use crate::data::SensorReading;
use crate::error::{Error, Result};
use crate::utils::hex_dump;

/// Minimum size of a status payload (through the grease filter byte at 59).
pub const MIN_STATUS_SIZE: usize = 60;

/// Offset used by both temperature encodings.
const TEMPERATURE_OFFSET: f64 = 10_000.0;

/// Read an unsigned little-endian integer of `width` bytes at `offset`.
///
/// Callers must have checked the payload length.
fn read_uint_le(data: &[u8], offset: usize, width: usize) -> u32 {
    let mut field = &data[offset..offset + width];
    field.get_uint_le(width) as u32
}

fn temperature_from_raw(raw: u32) -> f64 {
    (f64::from(raw) + TEMPERATURE_OFFSET) / 100.0 - 150.0
}

/// Parse an environmental status payload into a fresh reading.
///
/// The status packet layout (all fields unsigned little-endian):
/// - Bytes 0-1: Temperature, `(raw + 10000) / 100 - 150` °C
/// - Bytes 2-3: Heat index, same encoding as temperature
/// - Bytes 4-5: Humidity, `raw / 100` %
/// - Bytes 10-11: Air quality index
/// - Bytes 13-14: PM2.5, `raw / 1000` µg/m³
/// - Bytes 15-16: CO₂ ppm
/// - Bytes 17-18: tVOC µg/m³
/// - Bytes 36-38: Uptime seconds (24-bit)
/// - Byte 44: Alarm level
/// - Byte 45: Activity
/// - Bytes 46-47: Power W
/// - Byte 53: Light level, `raw / 30`
/// - Byte 56: Fan level, `raw / 30`
/// - Byte 59: Grease filter
///
/// All other bytes are unassigned and ignored, including any trailing bytes
/// past byte 59.
///
/// # Errors
///
/// Returns [`Error::InvalidData`] if the payload is shorter than
/// [`MIN_STATUS_SIZE`]. Callers treat this as "keep the previous reading".
pub fn parse_status(data: &[u8]) -> Result<SensorReading> {
    trace!("Status payload ({} bytes): {}", data.len(), hex_dump(data));

    if data.len() < MIN_STATUS_SIZE {
        return Err(Error::InvalidData {
            context: format!(
                "Status data too short: {} bytes (need at least {})",
                data.len(),
                MIN_STATUS_SIZE
            ),
        });
    }

    let reading = SensorReading {
        temperature: Some(temperature_from_raw(read_uint_le(data, 0, 2))),
        heat_index: Some(temperature_from_raw(read_uint_le(data, 2, 2))),
        humidity: Some(f64::from(read_uint_le(data, 4, 2)) / 100.0),
        aqi: Some(read_uint_le(data, 10, 2)),
        pm25: Some(f64::from(read_uint_le(data, 13, 2)) / 1000.0),
        co2: Some(read_uint_le(data, 15, 2)),
        tvoc: Some(read_uint_le(data, 17, 2)),
        uptime: Some(read_uint_le(data, 36, 3)),
        alarm_level: Some(read_uint_le(data, 44, 1)),
        activity: Some(read_uint_le(data, 45, 1)),
        power: Some(read_uint_le(data, 46, 2)),
        light: Some(f64::from(read_uint_le(data, 53, 1)) / 30.0),
        fan: Some(f64::from(read_uint_le(data, 56, 1)) / 30.0),
        grease_filter: Some(read_uint_le(data, 59, 1)),
    };

    debug!(
        "Parsed status: temperature={:.2}°C, humidity={:.1}%, CO2={} ppm, TVOC={}, PM2.5={:.2}, uptime={} s",
        reading.temperature.unwrap_or_default(),
        reading.humidity.unwrap_or_default(),
        reading.co2.unwrap_or_default(),
        reading.tvoc.unwrap_or_default(),
        reading.pm25.unwrap_or_default(),
        reading.uptime.unwrap_or_default(),
    );

    Ok(reading)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    /// A captured payload with every known field set to a distinct value.
    fn fixture() -> Vec<u8> {
        let mut data = vec![0u8; MIN_STATUS_SIZE];
        data[0..2].copy_from_slice(&7_150u16.to_le_bytes()); // 21.5 °C
        data[2..4].copy_from_slice(&7_300u16.to_le_bytes()); // 23.0 °C
        data[4..6].copy_from_slice(&4_525u16.to_le_bytes()); // 45.25 %
        data[10..12].copy_from_slice(&42u16.to_le_bytes());
        data[13..15].copy_from_slice(&12_345u16.to_le_bytes()); // 12.345
        data[15..17].copy_from_slice(&612u16.to_le_bytes());
        data[17..19].copy_from_slice(&87u16.to_le_bytes());
        data[36..39].copy_from_slice(&[0x40, 0xE2, 0x01]); // 123456 s
        data[44] = 20;
        data[45] = 3;
        data[46..48].copy_from_slice(&310u16.to_le_bytes());
        data[53] = 60; // level 2
        data[56] = 90; // level 3
        data[59] = 42;
        data
    }

    #[test]
    fn test_parse_fixture() {
        let reading = parse_status(&fixture()).unwrap();

        assert_eq!(
            reading,
            SensorReading {
                temperature: Some((7_150.0 + 10_000.0) / 100.0 - 150.0),
                heat_index: Some((7_300.0 + 10_000.0) / 100.0 - 150.0),
                humidity: Some(4_525.0 / 100.0),
                co2: Some(612),
                tvoc: Some(87),
                pm25: Some(12_345.0 / 1000.0),
                aqi: Some(42),
                grease_filter: Some(42),
                light: Some(60.0 / 30.0),
                fan: Some(90.0 / 30.0),
                activity: Some(3),
                alarm_level: Some(20),
                power: Some(310),
                uptime: Some(123_456),
            }
        );
    }

    #[test]
    fn test_scaling_uses_float_division() {
        let reading = parse_status(&fixture()).unwrap();
        assert!((reading.temperature.unwrap() - 21.5).abs() < 1e-9);
        assert!((reading.humidity.unwrap() - 45.25).abs() < 1e-9);
        assert!((reading.pm25.unwrap() - 12.345).abs() < 1e-9);

        let mut data = fixture();
        data[53] = 1;
        let reading = parse_status(&data).unwrap();
        assert!((reading.light.unwrap() - 1.0 / 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_temperature_raw_10000_is_50_degrees() {
        let mut data = vec![0u8; MIN_STATUS_SIZE];
        data[0..2].copy_from_slice(&0x2710u16.to_le_bytes());
        let reading = parse_status(&data).unwrap();
        assert_eq!(reading.temperature, Some(50.0));
    }

    #[test]
    fn test_zeroed_payload() {
        let reading = parse_status(&[0u8; MIN_STATUS_SIZE]).unwrap();
        assert_eq!(reading.temperature, Some(-50.0));
        assert_eq!(reading.heat_index, Some(-50.0));
        assert_eq!(reading.grease_filter, Some(0));
        assert_eq!(reading.uptime, Some(0));
    }

    #[test]
    fn test_max_field_values() {
        let reading = parse_status(&[0xFF; MIN_STATUS_SIZE]).unwrap();
        assert_eq!(reading.uptime, Some(0x00FF_FFFF));
        assert_eq!(reading.co2, Some(u32::from(u16::MAX)));
        assert_eq!(reading.alarm_level, Some(255));
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut data = fixture();
        data.extend_from_slice(&[0xAB; 12]);
        assert_eq!(parse_status(&data).unwrap(), parse_status(&fixture()).unwrap());
    }

    #[test]
    fn test_unassigned_bytes_ignored() {
        let mut data = fixture();
        for index in [6, 7, 8, 9, 12, 19, 35, 39, 43, 48, 52, 54, 55, 57, 58] {
            data[index] = 0x5A;
        }
        assert_eq!(parse_status(&data).unwrap(), parse_status(&fixture()).unwrap());
    }

    #[test]
    fn test_short_payload_rejected() {
        let data = &fixture()[..MIN_STATUS_SIZE - 1];
        assert!(matches!(
            parse_status(data),
            Err(Error::InvalidData { .. })
        ));
        assert!(parse_status(&[]).is_err());
    }

    proptest! {
        #[test]
        fn prop_short_payloads_never_decode(data in proptest::collection::vec(any::<u8>(), 0..MIN_STATUS_SIZE)) {
            prop_assert!(parse_status(&data).is_err());
        }

        #[test]
        fn prop_long_payloads_fully_populate(data in proptest::collection::vec(any::<u8>(), MIN_STATUS_SIZE..128)) {
            let reading = parse_status(&data).unwrap();
            prop_assert!(reading.temperature.is_some());
            prop_assert!(reading.grease_filter.is_some());
            prop_assert_eq!(reading.grease_filter, Some(u32::from(data[59])));
        }
    }
}
