//! Data models module
//!
//! Contains the reporter's interval samples and the final run summary.

pub mod summary;

// Re-export commonly used types
pub use summary::{IntervalStats, RunSummary};
