use std::path::PathBuf;

/// Arguments for the process command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct ProcessArgs {
    /// Trace file to load (`.json` or gzip-compressed)
    pub trace_path: PathBuf,

    /// Output path for JSON summary
    pub output_json: PathBuf,

    /// Annotations document to resolve against the trace (optional)
    pub annotations: Option<PathBuf>,

    /// Engine configuration file (optional)
    pub config: Option<PathBuf>,

    /// Number of top hot paths; overrides the configuration file
    pub top_paths: Option<usize>,

    /// Print text summary to stdout
    pub print_summary: bool,
}

impl Default for ProcessArgs {
    fn default() -> Self {
        Self {
            trace_path: PathBuf::new(),
            output_json: PathBuf::from("summary.json"),
            annotations: None,
            config: None,
            top_paths: None,
            print_summary: false,
        }
    }
}
