//! Configuration and constants for the engine and CLI.

use crate::handlers::HandlerName;
use crate::utils::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Current summary schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// First two bytes of any gzip stream
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// Field names for the event array when the trace is an object
// (DevTools exports use "traceEvents", some tools write "events")
pub const TRACE_EVENT_FIELD_NAMES: &[&str] = &["traceEvents", "events"];

/// Number of events between two progress log lines during ingest
pub const PROGRESS_CHUNK_SIZE: usize = 50_000;

/// EventTiming starts shorter than this (in ms) are not interactions
pub const MIN_INTERACTION_DURATION_MS: f64 = 1.0;

// Layout shift session windows (µs)
pub const LAYOUT_SHIFT_GAP_US: i64 = 1_000_000;
pub const LAYOUT_SHIFT_MAX_CLUSTER_US: i64 = 5_000_000;

/// Default number of call paths included in summaries
pub const DEFAULT_TOP_PATHS: usize = 20;

// Server-Timing header and the two clock-sync markers
pub const SERVER_TIMING_HEADER: &str = "server-timing";
pub const RESPONSE_START_METRIC: &str = "response-start";
pub const RESPONSE_END_METRIC: &str = "response-end";

/// Complete engine configuration, loaded from TOML
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Which handlers run
    #[serde(default)]
    pub handlers: HandlerSelection,

    /// Layout shift clustering
    #[serde(default)]
    pub layout_shifts: LayoutShiftConfig,

    /// Summary output
    #[serde(default)]
    pub summary: SummaryConfig,
}

/// Handler subset selection
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HandlerSelection {
    /// Handlers to run; `None` runs every handler
    pub enabled: Option<Vec<HandlerName>>,
}

/// Session window limits for layout shift clusters
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct LayoutShiftConfig {
    /// Maximum gap between two shifts of one cluster (ms)
    #[serde(default = "default_gap_ms")]
    pub gap_ms: f64,

    /// Maximum duration of a cluster (ms)
    #[serde(default = "default_max_cluster_ms")]
    pub max_cluster_ms: f64,
}

impl Default for LayoutShiftConfig {
    fn default() -> Self {
        Self {
            gap_ms: default_gap_ms(),
            max_cluster_ms: default_max_cluster_ms(),
        }
    }
}

/// Summary output settings
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct SummaryConfig {
    /// Number of hot call paths to include
    #[serde(default = "default_top_paths")]
    pub top_paths: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            top_paths: DEFAULT_TOP_PATHS,
        }
    }
}

fn default_gap_ms() -> f64 {
    LAYOUT_SHIFT_GAP_US as f64 / 1000.0
}

fn default_max_cluster_ms() -> f64 {
    LAYOUT_SHIFT_MAX_CLUSTER_US as f64 / 1000.0
}

fn default_top_paths() -> usize {
    DEFAULT_TOP_PATHS
}

/// Load engine configuration from a TOML file
///
/// # Errors
/// * `ConfigError::IoError` - If file cannot be read
/// * `ConfigError::ParseFailed` - If TOML is invalid
/// * `ConfigError::Invalid` - If values are out of range
pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate engine configuration from a TOML string
pub fn parse_config(contents: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = toml::from_str(contents)?;

    let shifts = &config.layout_shifts;
    if shifts.gap_ms <= 0.0 || shifts.max_cluster_ms <= 0.0 {
        return Err(ConfigError::Invalid(
            "layout_shifts windows must be positive".to_string(),
        ));
    }
    if let Some(enabled) = &config.handlers.enabled {
        if enabled.is_empty() {
            return Err(ConfigError::Invalid(
                "handlers.enabled must name at least one handler".to_string(),
            ));
        }
    }

    Ok(config)
}
