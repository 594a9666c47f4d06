//! Process command implementation.
//!
//! The process command:
//! 1. Loads the engine configuration
//! 2. Loads the trace
//! 3. Runs the handler pipeline
//! 4. Builds collapsed stacks and hot paths
//! 5. Resolves an annotations document (if given)
//! 6. Writes the summary

use super::models::ProcessArgs;
use crate::aggregator::{
    build_collapsed_stacks, calculate_hot_paths, calculate_self_time_distribution,
};
use crate::annotations::{load_modifications, EventKeyMap, ModificationsManager};
use crate::output::write_summary;
use crate::parser::schema::AnnotationsSummary;
use crate::parser::{load_trace, to_summary, Trace, TraceSummary};
use crate::processor::{Processor, TraceParseData};
use crate::utils::config::{load_config, EngineConfig};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::Path;
use std::time::Instant;

/// Execute the process command
///
/// **Public** - main entry point called from main.rs
///
/// # Arguments
/// * `args` - Process command arguments
///
/// # Returns
/// The summary that was written
///
/// # Errors
/// * Configuration or trace loading failures
/// * Handler pipeline errors
/// * File write errors
pub async fn execute_process(args: ProcessArgs) -> Result<TraceSummary> {
    let start_time = Instant::now();

    info!("Processing trace: {}", args.trace_path.display());

    // Step 1: Configuration
    info!("Step 1/6: Loading configuration...");
    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(top_paths) = args.top_paths {
        config.summary.top_paths = top_paths;
    }

    // Step 2: Load trace
    info!("Step 2/6: Loading trace...");
    let trace = load_trace(&args.trace_path).context("Failed to load trace")?;

    // Step 3: Run handlers
    info!("Step 3/6: Running handlers...");
    let mut processor =
        Processor::with_config(&config).context("Failed to build handler pipeline")?;
    let data = processor
        .parse(&trace)
        .await
        .context("Failed to process trace")?;

    // Step 4: Hot paths
    info!(
        "Step 4/6: Calculating top {} hot paths...",
        config.summary.top_paths
    );
    let stacks = data
        .renderer
        .as_ref()
        .map(|r| build_collapsed_stacks(r))
        .unwrap_or_default();
    let distribution = calculate_self_time_distribution(&stacks);
    info!("Self time distribution: {}", distribution.summary());
    if distribution.is_concentrated() {
        warn!(
            "{} of {} call paths hold 80% of self time",
            distribution.stacks_for_80_percent, distribution.stack_count
        );
    }
    let hot_paths = calculate_hot_paths(
        &stacks,
        distribution.total_self_time_us,
        config.summary.top_paths,
    );

    debug!("Top 3 hot paths:");
    for (i, path) in hot_paths.iter().take(3).enumerate() {
        debug!(
            "  {}. {} µs ({:.1}%): {}",
            i + 1,
            path.self_time_us,
            path.percentage,
            path.stack
        );
    }

    let handlers = processor
        .handler_order()
        .iter()
        .map(|h| h.to_string())
        .collect();
    let mut summary = to_summary(
        &args.trace_path.display().to_string(),
        &trace,
        &data,
        handlers,
        hot_paths,
    );

    // Step 5: Annotations
    match &args.annotations {
        Some(path) => {
            info!("Step 5/6: Resolving annotations...");
            summary.annotations = resolve_annotations(path, &trace, &data)?;
        }
        None => info!("Step 5/6: Skipping annotations (not requested)"),
    }

    // Step 6: Write output
    info!("Step 6/6: Writing summary...");
    write_summary(&summary, &args.output_json).context("Failed to write summary JSON")?;
    info!("✓ Summary written to: {}", args.output_json.display());

    if args.print_summary {
        print_summary(&summary);
    }

    let elapsed = start_time.elapsed();
    info!("Processing completed in {:.2}s", elapsed.as_secs_f64());

    Ok(summary)
}

/// **Private** - apply a saved document and report what resolved
fn resolve_annotations(
    path: &Path,
    trace: &Trace,
    data: &TraceParseData,
) -> Result<Option<AnnotationsSummary>> {
    let (Some(renderer), Some(meta)) = (&data.renderer, &data.meta) else {
        warn!("Annotations need the Renderer and Meta handlers; skipping");
        return Ok(None);
    };

    let modifications = load_modifications(path)
        .with_context(|| format!("Failed to load annotations {}", path.display()))?;

    let keys = EventKeyMap::new(trace, data);
    let mut manager = ModificationsManager::new(keys, renderer.clone(), meta.trace_bounds);
    let report = manager.apply_modifications(&modifications);

    Ok(Some(AnnotationsSummary {
        hidden_entries: manager.filter().invisible_entries().len(),
        expandable_entries: manager.filter().expandable_entries().len(),
        breadcrumbs: manager.breadcrumbs().windows().len(),
        skipped_keys: report.skipped,
    }))
}

/// **Private** - text summary on stdout
fn print_summary(summary: &TraceSummary) {
    println!("\n{}", "=".repeat(80));
    println!("TRACE SUMMARY");
    println!("{}", "=".repeat(80));
    println!("Source:        {}", summary.source_file);
    println!("Events:        {}", summary.event_count);
    println!("Duration:      {:.1} ms", summary.trace_bounds.duration_ms);
    println!("Threads:       {}", summary.domains.threads);
    println!(
        "Frames:        {} ({} drawn, {} dropped)",
        summary.domains.frames.total, summary.domains.frames.drawn, summary.domains.frames.dropped
    );
    println!("Interactions:  {}", summary.domains.interactions);
    println!("Requests:      {}", summary.domains.network_requests);
    if let Some(cls) = summary.cumulative_layout_shift {
        println!("CLS:           {:.4}", cls);
    }
    if let Some(interaction) = &summary.longest_interaction {
        println!(
            "Longest interaction: {} ({:.1} ms)",
            interaction.event_type, interaction.duration_ms
        );
    }
    println!("\nTop call paths by self time:");
    for (i, path) in summary.hot_paths.iter().take(10).enumerate() {
        println!(
            "{:>3}. {:>10} µs {:>6.2}%  {}",
            i + 1,
            path.self_time_us,
            path.percentage,
            path.stack
        );
    }
    println!("{}", "=".repeat(80));
}

/// Validate process arguments
///
/// **Public** - can be called before execute_process for early validation
pub fn validate_args(args: &ProcessArgs) -> Result<()> {
    if args.trace_path.as_os_str().is_empty() {
        anyhow::bail!("Trace path cannot be empty");
    }

    if !args.trace_path.exists() {
        anyhow::bail!("Trace file not found: {}", args.trace_path.display());
    }

    if let Some(top_paths) = args.top_paths {
        if top_paths == 0 {
            anyhow::bail!("top_paths must be greater than 0");
        }

        if top_paths > 1000 {
            anyhow::bail!("top_paths is too large (max 1000)");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_args_empty_trace_path() {
        let args = ProcessArgs::default();
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_missing_trace() {
        let args = ProcessArgs {
            trace_path: PathBuf::from("/definitely/not/here.json"),
            ..Default::default()
        };
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_top_paths_bounds() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut args = ProcessArgs {
            trace_path: file.path().to_path_buf(),
            ..Default::default()
        };
        assert!(validate_args(&args).is_ok());

        args.top_paths = Some(0);
        assert!(validate_args(&args).is_err());

        args.top_paths = Some(2000);
        assert!(validate_args(&args).is_err());
    }
}
