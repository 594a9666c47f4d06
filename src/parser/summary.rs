//! Build the JSON summary from a finished parse.

use super::schema::{
    DomainCounts, FrameCounts, HotPath, InteractionSummary, TraceBoundsSummary, TraceSummary,
};
use super::trace_file::Trace;
use crate::processor::TraceParseData;
use crate::utils::config::SCHEMA_VERSION;

/// Convert parsed trace data to the summary format
///
/// **Public** - used by the process command
///
/// # Arguments
/// * `source_file` - Path the trace was loaded from, as displayed
/// * `trace` - The loaded trace
/// * `data` - Handler outputs for `trace`
/// * `handlers` - Handler names in execution order
/// * `hot_paths` - Top call paths from the aggregator
///
/// # Returns
/// Summary ready to be written; handlers that did not run count as zero
pub fn to_summary(
    source_file: &str,
    trace: &Trace,
    data: &TraceParseData,
    handlers: Vec<String>,
    hot_paths: Vec<HotPath>,
) -> TraceSummary {
    use chrono::Utc;

    let bounds = data
        .meta
        .as_ref()
        .map(|m| m.trace_bounds)
        .unwrap_or_default();

    TraceSummary {
        version: SCHEMA_VERSION.to_string(),
        source_file: source_file.to_string(),
        event_count: trace.len(),
        trace_bounds: TraceBoundsSummary {
            min_us: bounds.min.value(),
            max_us: bounds.max.value(),
            duration_ms: bounds.range.to_millis().value(),
        },
        main_frame_id: data.meta.as_ref().and_then(|m| m.main_frame_id.clone()),
        handlers,
        domains: domain_counts(data),
        longest_interaction: data
            .user_interactions
            .as_ref()
            .and_then(|i| i.longest_interaction.as_ref())
            .map(|i| InteractionSummary {
                interaction_id: i.interaction_id,
                event_type: i.event_type.clone(),
                ts_us: i.ts.value(),
                duration_ms: i.dur.to_millis().value(),
            }),
        cumulative_layout_shift: data
            .layout_shifts
            .as_ref()
            .map(|l| l.cumulative_layout_shift),
        hot_paths,
        annotations: None,
        generated_at: Utc::now().to_rfc3339(),
    }
}

/// **Private** - per-domain counts
fn domain_counts(data: &TraceParseData) -> DomainCounts {
    let mut counts = DomainCounts::default();

    if let Some(renderer) = &data.renderer {
        counts.threads = renderer.threads.len();
        counts.renderer_entries = renderer.entry_count();
    }
    if let Some(samples) = &data.samples {
        counts.profile_calls = samples.total_calls();
    }
    if let Some(frames) = &data.frames {
        counts.frames = FrameCounts {
            total: frames.frames.len(),
            drawn: frames.count_with_status("drawn"),
            committed: frames.count_with_status("committed"),
            dropped: frames.count_with_status("dropped"),
            pending: frames.count_with_status("pending"),
        };
    }
    if let Some(interactions) = &data.user_interactions {
        counts.interactions = interactions.interactions.len();
    }
    if let Some(timings) = &data.user_timings {
        counts.performance_measures = timings.performance_measures.len();
        counts.performance_marks = timings.performance_marks.len();
        counts.console_timings = timings.console_timings.len();
    }
    if let Some(network) = &data.network {
        counts.network_requests = network.requests.len();
    }
    if let Some(shifts) = &data.layout_shifts {
        counts.layout_shifts = shifts.shifts.len();
        counts.layout_shift_clusters = shifts.clusters.len();
    }
    if let Some(sockets) = &data.web_sockets {
        counts.web_sockets = sockets.connections.len();
    }
    if let Some(server) = &data.server_timings {
        counts.server_timings = server.server_timings.len();
    }
    if let Some(initiators) = &data.initiators {
        counts.initiator_links = initiators.link_count();
    }

    counts
}
