//! Trace-wide metadata: time bounds, main frame, process and thread names.

use super::{FinalizeContext, Handler, HandlerName, HandlerOutput, Lifecycle};
use crate::parser::event::{EventKind, MetadataSignal, Phase, ProcessId, RawEvent, ThreadKey};
use crate::parser::timing::{MicroSeconds, TraceWindow};
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct MetaData {
    pub trace_bounds: TraceWindow,
    pub main_frame_id: Option<String>,
    pub browser_process_id: Option<ProcessId>,
    pub process_names: BTreeMap<ProcessId, String>,
    pub thread_names: BTreeMap<ThreadKey, String>,
    pub event_count: usize,
}

impl MetaData {
    pub fn trace_end(&self) -> MicroSeconds {
        self.trace_bounds.max
    }

    pub fn thread_name(&self, thread: ThreadKey) -> Option<&str> {
        self.thread_names.get(&thread).map(String::as_str)
    }
}

pub struct MetaHandler {
    lifecycle: Lifecycle,
    min_ts: Option<MicroSeconds>,
    max_ts: Option<MicroSeconds>,
    main_frame_id: Option<String>,
    browser_process_id: Option<ProcessId>,
    process_names: BTreeMap<ProcessId, String>,
    thread_names: BTreeMap<ThreadKey, String>,
    event_count: usize,
    output: Arc<MetaData>,
}

impl MetaHandler {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(HandlerName::Meta),
            min_ts: None,
            max_ts: None,
            main_frame_id: None,
            browser_process_id: None,
            process_names: BTreeMap::new(),
            thread_names: BTreeMap::new(),
            event_count: 0,
            output: Arc::default(),
        }
    }

    /// **Private** - picks the outermost main frame out of `args.data.frames`
    fn main_frame_from(event: &RawEvent) -> Option<String> {
        let frames = event.data()?.get("frames")?.as_array()?;
        frames
            .iter()
            .find(|f| {
                f.get("isOutermostMainFrame")
                    .and_then(|v| v.as_bool())
                    .unwrap_or_else(|| f.get("parent").is_none())
            })
            .and_then(|f| f.get("frame")?.as_str())
            .map(str::to_string)
    }
}

impl Default for MetaHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for MetaHandler {
    fn name(&self) -> HandlerName {
        HandlerName::Meta
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn initialize(&mut self) {
        self.lifecycle.initialize();
    }

    fn handle_event(&mut self, event: &Arc<RawEvent>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;
        self.event_count += 1;

        if let EventKind::Metadata(signal) = event.kind() {
            match signal {
                MetadataSignal::ThreadName { name } => {
                    self.thread_names.insert(event.thread_key(), name);
                }
                MetadataSignal::ProcessName { name } => {
                    self.process_names.insert(event.pid, name);
                }
                MetadataSignal::TracingStartedInBrowser => {
                    self.browser_process_id = Some(event.pid);
                    if let Some(frame) = Self::main_frame_from(event) {
                        self.main_frame_id = Some(frame);
                    }
                }
            }
        }

        // Metadata records carry ts 0 and would drag the lower bound down
        if event.ph == Phase::Metadata {
            return Ok(());
        }
        self.min_ts = Some(self.min_ts.map_or(event.ts, |m| m.min(event.ts)));
        let end = event.end_ts();
        self.max_ts = Some(self.max_ts.map_or(end, |m| m.max(end)));
        Ok(())
    }

    async fn finalize(&mut self, _ctx: &FinalizeContext<'_>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;

        let min = self.min_ts.unwrap_or(MicroSeconds::ZERO);
        let max = self.max_ts.unwrap_or(min);
        let trace_bounds = TraceWindow::new(min, max);
        debug!(
            "Trace bounds {}..{} ({} events)",
            trace_bounds.min, trace_bounds.max, self.event_count
        );

        self.output = Arc::new(MetaData {
            trace_bounds,
            main_frame_id: self.main_frame_id.take(),
            browser_process_id: self.browser_process_id,
            process_names: std::mem::take(&mut self.process_names),
            thread_names: std::mem::take(&mut self.thread_names),
            event_count: self.event_count,
        });
        self.lifecycle.finish();
        Ok(())
    }

    fn data(&self) -> Result<HandlerOutput, HandlerError> {
        self.lifecycle.ensure_finalized()?;
        Ok(HandlerOutput::Meta(self.output.clone()))
    }
}
