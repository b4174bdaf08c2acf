//! Units formatting and conversion utilities
//!
//! Provides functions for human-readable formatting of sizes, durations,
//! rates and latencies.

use std::time::Duration;

/// Format bytes into human-readable size with appropriate units
///
/// # Examples
/// ```
/// use netorb::util::units::format_bytes;
///
/// assert_eq!(format_bytes(1024), "1.0 KiB");
/// assert_eq!(format_bytes(1048576), "1.0 MiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Parse human-readable size string into bytes
///
/// Supports units: B, KB, MB, GB, KiB, MiB, GiB
///
/// # Examples
/// ```
/// use netorb::util::units::parse_bytes;
///
/// assert_eq!(parse_bytes("1 KiB").unwrap(), 1024);
/// assert_eq!(parse_bytes("512").unwrap(), 512);
/// ```
pub fn parse_bytes(input: &str) -> Result<u64, String> {
    let input = input.trim();

    let (number_part, unit_part) = match input.find(|c: char| c.is_alphabetic()) {
        Some(pos) => (input[..pos].trim(), &input[pos..]),
        None => (input, ""),
    };

    let number: f64 = number_part
        .parse()
        .map_err(|_| format!("Invalid number: {}", number_part))?;

    if number < 0.0 || !number.is_finite() {
        return Err("Size must be a non-negative number".to_string());
    }

    let multiplier = match unit_part.to_uppercase().as_str() {
        "" | "B" => 1u64,
        "KB" => 1_000u64,
        "MB" => 1_000_000u64,
        "GB" => 1_000_000_000u64,
        "KIB" => 1_024u64,
        "MIB" => 1_048_576u64,
        "GIB" => 1_073_741_824u64,
        _ => return Err(format!("Unknown unit: {}", unit_part)),
    };

    Ok((number * multiplier as f64) as u64)
}

/// Format duration into human-readable string
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use netorb::util::units::format_duration;
///
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs >= 3600 {
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if total_secs >= 60 {
        format!("{}m {}s", total_secs / 60, total_secs % 60)
    } else if total_secs > 0 {
        if millis > 0 {
            format!("{}.{:02}s", total_secs, millis / 10)
        } else {
            format!("{}s", total_secs)
        }
    } else {
        format!("{}ms", millis)
    }
}

/// Parse a duration such as "30s", "1m 30s" or "500ms"
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use netorb::util::units::parse_duration;
///
/// assert_eq!(parse_duration("1m 30s").unwrap(), Duration::from_secs(90));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    humantime::parse_duration(input.trim()).map_err(|e| format!("Invalid duration '{}': {}", input, e))
}

/// Events per second over `duration`; zero for an empty window
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use netorb::util::units::calculate_rate;
///
/// assert_eq!(calculate_rate(500, Duration::from_millis(500)), 1000.0);
/// assert_eq!(calculate_rate(10, Duration::ZERO), 0.0);
/// ```
pub fn calculate_rate(count: u64, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 0.0;
    }
    count as f64 / duration.as_secs_f64()
}

/// Format an events-per-second value
///
/// # Examples
/// ```
/// use netorb::util::units::format_rate;
///
/// assert_eq!(format_rate(1500.0), "1.5K/s");
/// assert_eq!(format_rate(42.0), "42/s");
/// ```
pub fn format_rate(rate: f64) -> String {
    if rate >= 1_000_000.0 {
        format!("{:.1}M/s", rate / 1_000_000.0)
    } else if rate >= 1_000.0 {
        format!("{:.1}K/s", rate / 1_000.0)
    } else if rate >= 10.0 {
        format!("{:.0}/s", rate)
    } else {
        format!("{:.1}/s", rate)
    }
}

/// Format a bytes-per-second value
pub fn format_byte_rate(bytes: u64, duration: Duration) -> String {
    let per_sec = calculate_rate(bytes, duration);
    format!("{}/s", format_bytes(per_sec as u64))
}

/// Format latency duration with appropriate precision
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use netorb::util::units::format_latency;
///
/// assert_eq!(format_latency(Duration::from_millis(5)), "5.00ms");
/// assert_eq!(format_latency(Duration::from_micros(500)), "500μs");
/// ```
pub fn format_latency(duration: Duration) -> String {
    let micros = duration.as_micros();

    if micros >= 1000 {
        format!("{:.2}ms", micros as f64 / 1000.0)
    } else {
        format!("{}μs", micros)
    }
}
