//! Output writers for summary data.
//!
//! Summaries are written as pretty-printed JSON and can be read back for
//! validation.

pub mod json;

// Re-export main functions
pub use json::{read_summary, summary_to_string, write_summary};
