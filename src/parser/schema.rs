//! Output JSON schema definitions for trace summaries.
//!
//! This module defines the structure of JSON files we write to disk.
//! Schema is versioned to allow future evolution.

use serde::{Deserialize, Serialize};

/// Top-level summary structure written to JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Schema version for compatibility checking
    pub version: String,

    /// Trace file the summary was built from
    pub source_file: String,

    /// Number of records in the loaded trace
    pub event_count: usize,

    /// Time span covered by the trace
    pub trace_bounds: TraceBoundsSummary,

    /// Main frame of the inspected page, if recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_frame_id: Option<String>,

    /// Handlers that ran, in execution order
    pub handlers: Vec<String>,

    /// Per-domain counts
    pub domains: DomainCounts,

    /// Longest user interaction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longest_interaction: Option<InteractionSummary>,

    /// Cumulative layout shift (score of the worst cluster)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cumulative_layout_shift: Option<f64>,

    /// Top call paths (ranked by self time)
    pub hot_paths: Vec<HotPath>,

    /// State of an applied annotations document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<AnnotationsSummary>,

    /// Timestamp when summary was generated
    pub generated_at: String,
}

/// Trace bounds in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceBoundsSummary {
    pub min_us: i64,
    pub max_us: i64,
    pub duration_ms: f64,
}

/// Number of domain entities produced by each handler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainCounts {
    pub threads: usize,
    pub renderer_entries: usize,
    pub profile_calls: usize,
    pub frames: FrameCounts,
    pub interactions: usize,
    pub performance_measures: usize,
    pub performance_marks: usize,
    pub console_timings: usize,
    pub network_requests: usize,
    pub layout_shifts: usize,
    pub layout_shift_clusters: usize,
    pub web_sockets: usize,
    pub server_timings: usize,
    pub initiator_links: usize,
}

/// Frames by final status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameCounts {
    pub total: usize,
    pub drawn: usize,
    pub committed: usize,
    pub dropped: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionSummary {
    pub interaction_id: i64,
    pub event_type: String,
    pub ts_us: i64,
    pub duration_ms: f64,
}

/// A hot call path (collapsed stack with self time)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotPath {
    /// Collapsed stack representation (e.g., "RunTask;FunctionCall;render")
    pub stack: String,

    /// Self time spent in the innermost frame of this path
    pub self_time_us: u64,

    /// Percentage of total self time
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationsSummary {
    pub hidden_entries: usize,
    pub expandable_entries: usize,
    pub breadcrumbs: usize,
    pub skipped_keys: usize,
}
