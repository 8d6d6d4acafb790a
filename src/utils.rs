//! Utility functions for the sense-rust-ble crate.

/// Convert Celsius to Fahrenheit.
///
/// # Example
///
/// ```
/// use sense_rust_ble::celsius_to_fahrenheit;
///
/// let fahrenheit = celsius_to_fahrenheit(100.0);
/// assert!((fahrenheit - 212.0).abs() < 0.001);
/// ```
#[inline]
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Round a value to a fixed number of decimal places.
///
/// # Example
///
/// ```
/// use sense_rust_ble::utils::round_to;
///
/// assert_eq!(round_to(21.456, 1), 21.5);
/// ```
#[inline]
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Format a byte slice as space-separated hex, for trace output.
pub fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_celsius_to_fahrenheit() {
        assert!((celsius_to_fahrenheit(0.0) - 32.0).abs() < 0.001);
        assert!((celsius_to_fahrenheit(-40.0) - (-40.0)).abs() < 0.001);
        assert!((celsius_to_fahrenheit(37.0) - 98.6).abs() < 0.001);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.04, 1), 1.0);
        assert_eq!(round_to(1.05001, 1), 1.1);
        assert_eq!(round_to(-150.0, 1), -150.0);
        assert_eq!(round_to(2.5, 0), 3.0);
    }

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(&[0x00, 0xBE, 0xEF]), "00 BE EF");
        assert_eq!(hex_dump(&[]), "");
    }
}
