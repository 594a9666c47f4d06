//! Aggregation of call trees into collapsed stacks and metrics.
//!
//! This module transforms renderer trees into:
//! - Collapsed stack format, weighted by self time
//! - Hot path analysis (top self time paths)
//! - Self time distribution statistics

pub mod metrics;
pub mod stack_builder;

// Re-export main types and functions
pub use metrics::{
    calculate_hot_paths, calculate_self_time_distribution, create_hot_path, FunctionSelfTime,
    SelfTimeDistribution,
};
pub use stack_builder::{build_collapsed_stacks, CollapsedStack};
