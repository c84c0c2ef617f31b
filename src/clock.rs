//! Server clock readings in floating-point Unix seconds.

use chrono::Utc;

/// Current time as seconds since the Unix epoch, with sub-second precision.
///
/// Read from a nanosecond clock and divided down to seconds.
pub fn unix_time_now() -> f64 {
    let now = Utc::now();
    match now.timestamp_nanos_opt() {
        Some(nanos) => nanos as f64 / 1e9,
        // Outside the i64 nanosecond range (year 2262+).
        None => now.timestamp_micros() as f64 / 1e6,
    }
}

/// Render seconds as a plain decimal string, never in exponent form.
///
/// Uses the shortest representation that round-trips to the same `f64`.
pub fn format_unix_time(seconds: f64) -> String {
    seconds.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_time_now_is_recent_and_fractional() {
        let now = unix_time_now();
        // 2023-11-14 and well before year 2100
        assert!(now > 1_700_000_000.0);
        assert!(now < 4_102_444_800.0);
    }

    #[test]
    fn test_unix_time_now_is_monotonic_enough() {
        let a = unix_time_now();
        let b = unix_time_now();
        assert!(b >= a);
    }

    #[test]
    fn test_format_unix_time() {
        assert_eq!(format_unix_time(1_700_000_000.123456), "1700000000.123456");
        assert_eq!(format_unix_time(1_700_000_000.0), "1700000000");
        assert!(!format_unix_time(1e21).contains('e'));
    }
}
