//! Trace parsing and schema definitions.
//!
//! This module handles:
//! - Raw event records and their classification
//! - Time units and windows
//! - Derived entities and their stable keys
//! - Loading trace files
//! - Defining output schema

pub mod entity;
pub mod event;
pub mod schema;
pub mod summary;
pub mod timing;
pub mod trace_file;

// Re-export main types
pub use entity::{EventKey, ProfileCall, SyntheticEvent, TraceEntity};
pub use event::{EventKind, Phase, RawEvent, ThreadKey};
pub use schema::{HotPath, TraceSummary};
pub use summary::to_summary;
pub use timing::{MicroSeconds, MilliSeconds, TraceWindow};
pub use trace_file::{load_trace, parse_trace_value, Trace};
