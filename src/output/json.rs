//! JSON summary output writer.
//!
//! Writes TraceSummary structs to JSON files with proper formatting.

use crate::parser::schema::TraceSummary;
use crate::utils::error::OutputError;
use log::{debug, info};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Write a summary to a JSON file
///
/// **Public** - main entry point for JSON output
///
/// # Arguments
/// * `summary` - Summary data to write
/// * `output_path` - Path to output JSON file
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
pub fn write_summary(
    summary: &TraceSummary,
    output_path: impl AsRef<Path>,
) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing summary to: {}", output_path.display());

    validate_output_path(output_path)?;

    // Create parent directories if needed
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!(
                    "Cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let file = File::create(output_path)?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, summary)?;

    info!(
        "Summary written successfully ({} bytes)",
        calculate_file_size(output_path)
    );

    Ok(())
}

/// Write summary to a string
///
/// **Public** - used when printing to stdout
pub fn summary_to_string(summary: &TraceSummary) -> Result<String, OutputError> {
    Ok(serde_json::to_string_pretty(summary)?)
}

/// Validate that output path is writable
///
/// **Private** - internal validation
fn validate_output_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }

    // Check if we're trying to overwrite a directory
    if path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}

/// **Private** - internal utility
fn calculate_file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Read a summary from a JSON file
///
/// **Public** - used by the validate command and tests
///
/// # Errors
/// * `OutputError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `OutputError::SerializationFailed` - JSON parse error
pub fn read_summary(input_path: impl AsRef<Path>) -> Result<TraceSummary, OutputError> {
    let input_path = input_path.as_ref();

    debug!("Reading summary from: {}", input_path.display());

    let file = File::open(input_path)?;
    let summary: TraceSummary = serde_json::from_reader(file)?;

    debug!(
        "Summary loaded: version {}, source {}",
        summary.version, summary.source_file
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::schema::{DomainCounts, HotPath, TraceBoundsSummary};
    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    fn create_test_summary() -> TraceSummary {
        TraceSummary {
            version: "1.0.0".to_string(),
            source_file: "trace.json".to_string(),
            event_count: 12,
            trace_bounds: TraceBoundsSummary {
                min_us: 100,
                max_us: 2100,
                duration_ms: 2.0,
            },
            main_frame_id: Some("F1".to_string()),
            handlers: vec!["Meta".to_string()],
            domains: DomainCounts::default(),
            longest_interaction: None,
            cumulative_layout_shift: Some(0.1),
            hot_paths: vec![HotPath {
                stack: "RunTask;Layout".to_string(),
                self_time_us: 500,
                percentage: 25.0,
            }],
            annotations: None,
            generated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_write_and_read_summary() {
        let summary = create_test_summary();
        let temp_file = NamedTempFile::new().unwrap();

        write_summary(&summary, temp_file.path()).unwrap();
        let loaded = read_summary(temp_file.path()).unwrap();

        assert_eq!(loaded, summary);
    }

    #[test]
    fn test_optional_fields_omitted() {
        let mut summary = create_test_summary();
        summary.main_frame_id = None;
        summary.cumulative_layout_shift = None;

        let text = summary_to_string(&summary).unwrap();
        assert!(!text.contains("main_frame_id"));
        assert!(!text.contains("cumulative_layout_shift"));
    }

    #[test]
    fn test_validate_output_path_empty() {
        assert!(validate_output_path(Path::new("")).is_err());
    }

    #[test]
    fn test_validate_output_path_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(validate_output_path(temp_dir.path()).is_err());
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested_path = temp_dir.path().join("nested/dirs/summary.json");

        write_summary(&create_test_summary(), &nested_path).unwrap();

        assert!(nested_path.exists());
    }
}
