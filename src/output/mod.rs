//! Stats sinks
//!
//! Destinations for the reporter's interval lines: the terminal and an
//! optional append-only log file.

pub mod console;
pub mod log_file;

pub use console::ConsoleSink;
pub use log_file::LogFileSink;
