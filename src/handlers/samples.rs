//! CPU profile samples and the profile calls derived from them.
//!
//! A profile arrives as one `Profile` record (start time) followed by any
//! number of `ProfileChunk` records, all sharing an id. Chunks append to the
//! node table, the sample stream and the time deltas. At finalize each
//! profile's sample stream is walked in order; the stack of every sample is
//! compared with the previous one and:
//! - frames shared with the previous stack stay open
//! - frames no longer present are closed at the new sample's time
//! - new frames are opened at the new sample's time
//!
//! Every opened frame becomes one [`ProfileCall`].

use super::{FinalizeContext, Handler, HandlerName, HandlerOutput, Lifecycle};
use crate::helpers::tree::{build_entry_tree, EntryTree};
use crate::parser::entity::ProfileCall;
use crate::parser::event::{EventKind, ProcessId, ProfileSignal, RawEvent, ThreadKey};
use crate::parser::timing::MicroSeconds;
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

// V8 bookkeeping nodes that never correspond to user code
const SKIPPED_NODE_NAMES: &[&str] = &["(root)", "(program)", "(idle)"];

/// Profile calls and their call tree for one thread
#[derive(Debug, Clone, Default)]
pub struct ProfileThread {
    pub profile_ids: Vec<String>,
    pub sample_count: usize,
    /// Sorted by `ts`
    pub calls: Vec<Arc<ProfileCall>>,
    /// Node `i` wraps `calls[i]`
    pub tree: EntryTree,
}

#[derive(Debug, Clone, Default)]
pub struct SamplesData {
    pub threads: BTreeMap<ThreadKey, ProfileThread>,
}

impl SamplesData {
    pub fn calls_for_thread(&self, thread: ThreadKey) -> &[Arc<ProfileCall>] {
        self.threads
            .get(&thread)
            .map(|t| t.calls.as_slice())
            .unwrap_or_default()
    }

    pub fn total_calls(&self) -> usize {
        self.threads.values().map(|t| t.calls.len()).sum()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkPayload {
    #[serde(default)]
    cpu_profile: Option<CpuProfilePayload>,
    #[serde(default)]
    time_deltas: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct CpuProfilePayload {
    #[serde(default)]
    nodes: Vec<CpuProfileNode>,
    #[serde(default)]
    samples: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CpuProfileNode {
    id: i64,
    #[serde(default)]
    call_frame: CallFrame,
    #[serde(default)]
    parent: Option<i64>,
    #[serde(default)]
    children: Vec<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallFrame {
    #[serde(default)]
    function_name: String,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Clone, Default)]
struct ProfileNode {
    call_frame: CallFrame,
    parent: Option<i64>,
}

/// Accumulated state of one profile while chunks arrive
#[derive(Debug, Default)]
struct ProfileBuilder {
    thread: Option<ThreadKey>,
    start_time: Option<MicroSeconds>,
    nodes: HashMap<i64, ProfileNode>,
    samples: Vec<i64>,
    time_deltas: Vec<f64>,
}

impl ProfileBuilder {
    fn add_chunk(&mut self, payload: ChunkPayload) {
        if let Some(profile) = payload.cpu_profile {
            for node in profile.nodes {
                let entry = self.nodes.entry(node.id).or_default();
                entry.call_frame = node.call_frame;
                if node.parent.is_some() {
                    entry.parent = node.parent;
                }
                // Older exporters link parents through `children` only
                for child in node.children {
                    self.nodes
                        .entry(child)
                        .or_default()
                        .parent
                        .get_or_insert(node.id);
                }
            }
            self.samples.extend(profile.samples);
        }
        self.time_deltas.extend(payload.time_deltas);
    }

    /// Root-first node ids of the stack ending at `leaf`
    fn stack_for(&self, leaf: i64) -> Vec<i64> {
        let mut stack = Vec::new();
        let mut current = Some(leaf);
        while let Some(id) = current {
            // A parent loop would never terminate
            if stack.len() > self.nodes.len() {
                break;
            }
            let Some(node) = self.nodes.get(&id) else {
                break;
            };
            if !SKIPPED_NODE_NAMES.contains(&node.call_frame.function_name.as_str()) {
                stack.push(id);
            }
            current = node.parent;
        }
        stack.reverse();
        stack
    }

    /// Walk the sample stream and emit one call per opened frame
    ///
    /// Sample indices start at `sample_offset`, the number of samples earlier
    /// profiles already contributed to the thread, so call keys stay unique
    /// per thread.
    fn build_calls(
        &self,
        thread: ThreadKey,
        start: MicroSeconds,
        sample_offset: usize,
    ) -> Vec<Arc<ProfileCall>> {
        let mut calls: Vec<ProfileCall> = Vec::new();
        // (node id, index into calls) for every open frame, root first
        let mut open: Vec<(i64, usize)> = Vec::new();
        let mut timestamp = start.value() as f64;
        let mut last_ts = start;

        for (local_index, &leaf) in self.samples.iter().enumerate() {
            timestamp += self.time_deltas.get(local_index).copied().unwrap_or(0.0);
            let ts = MicroSeconds::from_f64(timestamp);
            last_ts = ts;

            let stack = self.stack_for(leaf);
            let shared = open
                .iter()
                .zip(stack.iter())
                .take_while(|((open_id, _), id)| open_id == *id)
                .count();

            for (_, index) in open.drain(shared..) {
                calls[index].dur = ts.saturating_span(calls[index].ts);
            }

            for &node_id in &stack[shared..] {
                let frame = &self.nodes[&node_id].call_frame;
                open.push((node_id, calls.len()));
                calls.push(ProfileCall {
                    pid: thread.pid,
                    tid: thread.tid,
                    sample_index: sample_offset + local_index,
                    node_id,
                    function_name: frame.function_name.clone(),
                    url: frame.url.clone(),
                    ts,
                    dur: MicroSeconds::ZERO,
                });
            }
        }

        for (_, index) in open {
            calls[index].dur = last_ts.saturating_span(calls[index].ts);
        }

        calls.into_iter().map(Arc::new).collect()
    }
}

pub struct SamplesHandler {
    lifecycle: Lifecycle,
    profiles: BTreeMap<(ProcessId, String), ProfileBuilder>,
    output: Arc<SamplesData>,
}

impl SamplesHandler {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(HandlerName::Samples),
            profiles: BTreeMap::new(),
            output: Arc::default(),
        }
    }
}

impl Default for SamplesHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for SamplesHandler {
    fn name(&self) -> HandlerName {
        HandlerName::Samples
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn initialize(&mut self) {
        self.lifecycle.initialize();
    }

    fn handle_event(&mut self, event: &Arc<RawEvent>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;

        let EventKind::Profile(signal) = event.kind() else {
            return Ok(());
        };

        match signal {
            ProfileSignal::Profile { id } => {
                let builder = self.profiles.entry((event.pid, id)).or_default();
                builder.thread = Some(event.thread_key());
                let start = event
                    .data_f64("startTime")
                    .map(MicroSeconds::from_f64)
                    .unwrap_or(event.ts);
                builder.start_time = Some(start);
            }
            ProfileSignal::ProfileChunk { id } => {
                let Some(data) = event.data() else {
                    return Ok(());
                };
                match serde_json::from_value::<ChunkPayload>(data.clone()) {
                    Ok(payload) => {
                        let builder = self.profiles.entry((event.pid, id)).or_default();
                        builder.thread.get_or_insert(event.thread_key());
                        builder.add_chunk(payload);
                    }
                    Err(e) => warn!("Skipping malformed ProfileChunk at {}: {}", event.ts, e),
                }
            }
        }
        Ok(())
    }

    async fn finalize(&mut self, _ctx: &FinalizeContext<'_>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;

        let mut threads: BTreeMap<ThreadKey, ProfileThread> = BTreeMap::new();

        for ((pid, id), builder) in std::mem::take(&mut self.profiles) {
            let Some(thread) = builder.thread else {
                continue;
            };
            if builder.samples.len() != builder.time_deltas.len() {
                debug!(
                    "Profile {}:{} has {} samples but {} time deltas",
                    pid,
                    id,
                    builder.samples.len(),
                    builder.time_deltas.len()
                );
            }
            let start = builder.start_time.unwrap_or(MicroSeconds::ZERO);
            let entry = threads.entry(thread).or_default();
            let calls = builder.build_calls(thread, start, entry.sample_count);
            entry.profile_ids.push(id);
            entry.sample_count += builder.samples.len();
            entry.calls.extend(calls);
        }

        for (thread, profile) in threads.iter_mut() {
            profile.calls.sort_by_key(|c| c.ts);
            profile.tree = build_entry_tree(&profile.calls);
            debug!(
                "Thread {}: {} profile calls from {} samples",
                thread,
                profile.calls.len(),
                profile.sample_count
            );
        }

        self.output = Arc::new(SamplesData { threads });
        self.lifecycle.finish();
        Ok(())
    }

    fn data(&self) -> Result<HandlerOutput, HandlerError> {
        self.lifecycle.ensure_finalized()?;
        Ok(HandlerOutput::Samples(self.output.clone()))
    }
}
