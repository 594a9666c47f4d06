use crate::output::read_summary;
use crate::utils::config::SCHEMA_VERSION;
use anyhow::Result;
use std::path::PathBuf;

/// Validate a summary JSON file
pub fn validate_summary_file(file_path: PathBuf) -> Result<()> {
    println!("Validating summary: {}", file_path.display());

    let summary = read_summary(&file_path)?;

    println!("✓ Valid summary JSON");
    println!("  Version: {}", summary.version);
    println!("  Source: {}", summary.source_file);
    println!("  Events: {}", summary.event_count);
    println!("  Handlers: {}", summary.handlers.join(", "));
    println!("  Hot Paths: {}", summary.hot_paths.len());

    if summary.version != SCHEMA_VERSION {
        println!(
            "  ! Schema version {} differs from current {}",
            summary.version, SCHEMA_VERSION
        );
    }

    Ok(())
}

/// Display schema information
pub fn display_schema(show_details: bool) {
    println!("Trace Engine Summary Schema");
    println!("Current Version: {}", SCHEMA_VERSION);
    println!();

    if show_details {
        println!("Schema Structure:");
        println!("  version: string            - Schema version (e.g., '1.0.0')");
        println!("  source_file: string        - Trace file path");
        println!("  event_count: number        - Records in the trace");
        println!("  trace_bounds: object       - min_us, max_us, duration_ms");
        println!("  main_frame_id: string?     - Main frame of the page");
        println!("  handlers: array            - Handlers in execution order");
        println!("  domains: object            - Per-domain entity counts");
        println!("    frames: object           - total, drawn, committed, dropped, pending");
        println!("  longest_interaction: object? - interaction_id, event_type, ts_us, duration_ms");
        println!("  cumulative_layout_shift: number? - Worst layout shift cluster score");
        println!("  hot_paths: array           - Top self time call paths");
        println!("    stack: string            - Collapsed stack");
        println!("    self_time_us: number     - Self time of the innermost frame");
        println!("    percentage: number       - Percentage of total self time");
        println!("  annotations: object?       - Applied annotations document state");
        println!("  generated_at: string       - ISO 8601 timestamp");
    } else {
        println!("Use --show for detailed schema information");
    }
}

/// Display version information
pub fn display_version() {
    println!("Trace Engine v{}", env!("CARGO_PKG_VERSION"));
    println!("Summary Schema: v{}", SCHEMA_VERSION);
    println!();
    println!("Multi-pass processing of captured performance traces.");
}
