//! Rendering frame lifecycles.
//!
//! Each thread runs its own state machine keyed by frame sequence id:
//!
//! ```text
//! BeginFrame ──> Pending ──┬── DroppedFrame ──> Dropped
//!                          ├── Commit ────────> Committed
//!                          └── DrawFrame ─────> Drawn
//! ```
//!
//! Terminal states never change again. Signals for unknown or already
//! resolved sequence ids, and signals from a layer tree other than the
//! thread's active one, are discarded.

use super::{FinalizeContext, Handler, HandlerName, HandlerOutput, Lifecycle};
use crate::parser::event::{EventKind, FrameSignal, RawEvent, ThreadKey};
use crate::parser::timing::MicroSeconds;
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum FrameStatus {
    Pending(Arc<RawEvent>),
    Dropped {
        event: Arc<RawEvent>,
        is_partial: bool,
    },
    Committed(Arc<RawEvent>),
    Drawn(Arc<RawEvent>),
}

impl FrameStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending(_) => "pending",
            Self::Dropped { .. } => "dropped",
            Self::Committed(_) => "committed",
            Self::Drawn(_) => "drawn",
        }
    }

    fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub seq_id: u64,
    pub thread: ThreadKey,
    pub ts: MicroSeconds,
    pub dur: MicroSeconds,
    pub is_partial: bool,
    pub status: FrameStatus,
}

#[derive(Debug, Clone, Default)]
pub struct FramesData {
    /// Every frame, sorted by begin time
    pub frames: Vec<Frame>,
}

impl FramesData {
    pub fn frames_for_thread(&self, thread: ThreadKey) -> impl Iterator<Item = &Frame> {
        self.frames.iter().filter(move |f| f.thread == thread)
    }

    pub fn count_with_status(&self, label: &str) -> usize {
        self.frames
            .iter()
            .filter(|f| f.status.label() == label)
            .count()
    }
}

/// Frame state of a single thread
#[derive(Debug, Default)]
struct ThreadFrames {
    active_layer: Option<i64>,
    frames: Vec<Frame>,
    by_seq: HashMap<u64, usize>,
}

impl ThreadFrames {
    /// A thread that never saw `SetLayerTreeId` accepts every layer; once a
    /// layer is active, signals without a `layerTreeId` no longer match.
    fn accepts(&self, layer_tree_id: Option<i64>) -> bool {
        match self.active_layer {
            Some(active) => layer_tree_id == Some(active),
            None => true,
        }
    }

    fn pending_index(&self, seq_id: u64) -> Option<usize> {
        let index = *self.by_seq.get(&seq_id)?;
        self.frames[index].status.is_pending().then_some(index)
    }

    fn latest_pending_index(&self) -> Option<usize> {
        self.frames.iter().rposition(|f| f.status.is_pending())
    }

    fn resolve(&mut self, index: usize, event: &Arc<RawEvent>, status: FrameStatus) {
        let frame = &mut self.frames[index];
        frame.dur = event.ts.saturating_span(frame.ts);
        if let FrameStatus::Dropped { is_partial, .. } = &status {
            frame.is_partial = *is_partial;
        }
        frame.status = status;
    }
}

pub struct FramesHandler {
    lifecycle: Lifecycle,
    threads: BTreeMap<ThreadKey, ThreadFrames>,
    discarded: usize,
    output: Arc<FramesData>,
}

impl FramesHandler {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(HandlerName::Frames),
            threads: BTreeMap::new(),
            discarded: 0,
            output: Arc::default(),
        }
    }

    /// **Private** - applies one signal to the thread's state machine
    fn apply(&mut self, event: &Arc<RawEvent>, signal: FrameSignal) {
        let thread = event.thread_key();
        let state = self.threads.entry(thread).or_default();

        let applied = match signal {
            FrameSignal::SetLayerTreeId { layer_tree_id, .. } => {
                state.active_layer = Some(layer_tree_id);
                true
            }
            FrameSignal::BeginFrame {
                seq_id,
                layer_tree_id,
            } => {
                if !state.accepts(layer_tree_id) || state.by_seq.contains_key(&seq_id) {
                    false
                } else {
                    state.by_seq.insert(seq_id, state.frames.len());
                    state.frames.push(Frame {
                        seq_id,
                        thread,
                        ts: event.ts,
                        dur: MicroSeconds::ZERO,
                        is_partial: false,
                        status: FrameStatus::Pending(event.clone()),
                    });
                    true
                }
            }
            FrameSignal::DroppedFrame {
                seq_id,
                layer_tree_id,
                is_partial,
            } => match state.pending_index(seq_id) {
                Some(index) if state.accepts(layer_tree_id) => {
                    let status = FrameStatus::Dropped {
                        event: event.clone(),
                        is_partial,
                    };
                    state.resolve(index, event, status);
                    true
                }
                _ => false,
            },
            FrameSignal::Commit {
                seq_id,
                layer_tree_id,
            } => {
                let index = match seq_id {
                    Some(seq_id) => state.pending_index(seq_id),
                    None => state.latest_pending_index(),
                };
                match index {
                    Some(index) if state.accepts(layer_tree_id) => {
                        state.resolve(index, event, FrameStatus::Committed(event.clone()));
                        true
                    }
                    _ => false,
                }
            }
            FrameSignal::DrawFrame {
                seq_id,
                layer_tree_id,
            } => match state.pending_index(seq_id) {
                Some(index) if state.accepts(layer_tree_id) => {
                    state.resolve(index, event, FrameStatus::Drawn(event.clone()));
                    true
                }
                _ => false,
            },
        };

        if !applied {
            self.discarded += 1;
        }
    }
}

impl Default for FramesHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for FramesHandler {
    fn name(&self) -> HandlerName {
        HandlerName::Frames
    }

    fn deps(&self) -> &'static [HandlerName] {
        &[HandlerName::Meta]
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn initialize(&mut self) {
        self.lifecycle.initialize();
    }

    fn handle_event(&mut self, event: &Arc<RawEvent>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;
        if let EventKind::Frame(signal) = event.kind() {
            self.apply(event, signal);
        }
        Ok(())
    }

    async fn finalize(&mut self, ctx: &FinalizeContext<'_>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;
        let trace_end = ctx.meta()?.trace_end();

        let mut frames: Vec<Frame> = std::mem::take(&mut self.threads)
            .into_values()
            .flat_map(|t| t.frames)
            .collect();
        for frame in frames.iter_mut().filter(|f| f.status.is_pending()) {
            frame.dur = trace_end.saturating_span(frame.ts);
        }
        frames.sort_by_key(|f| f.ts);

        debug!(
            "{} frames, {} frame signals discarded",
            frames.len(),
            self.discarded
        );
        self.output = Arc::new(FramesData { frames });
        self.lifecycle.finish();
        Ok(())
    }

    fn data(&self) -> Result<HandlerOutput, HandlerError> {
        self.lifecycle.ensure_finalized()?;
        Ok(HandlerOutput::Frames(self.output.clone()))
    }
}
