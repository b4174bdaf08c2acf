//! Utility functions module
//!
//! Contains helper functions for units formatting, duration parsing,
//! and process resource limit checks.

pub mod limits;
pub mod units;

// Re-export commonly used functions
pub use limits::{check_descriptor_budget, open_file_limit};
pub use units::{
    calculate_rate, format_byte_rate, format_bytes, format_duration, format_latency, format_rate,
    parse_bytes, parse_duration,
};
