//! Per-thread call trees of complete events and profile calls.

use super::{FinalizeContext, Handler, HandlerName, HandlerOutput, Lifecycle};
use crate::helpers::tree::{build_entry_tree, EntryNode, EntryTree, NodeId};
use crate::parser::entity::{EventKey, TraceEntity};
use crate::parser::event::{Phase, RawEvent, ThreadKey};
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// One thread's entries and the tree built over them
#[derive(Debug, Clone, Default)]
pub struct RendererThread {
    pub name: Option<String>,
    /// Sorted by `ts`; node `i` of `tree` wraps `entries[i]`
    pub entries: Vec<TraceEntity>,
    pub tree: EntryTree,
}

impl RendererThread {
    pub fn entity(&self, node: &EntryNode) -> Option<&TraceEntity> {
        self.entries.get(node.entry_index)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RendererData {
    pub threads: BTreeMap<ThreadKey, RendererThread>,
    entry_to_node: HashMap<EventKey, (ThreadKey, NodeId)>,
}

impl RendererData {
    /// Tree node holding `entity`, if it was placed in a tree
    pub fn node_for(&self, entity: &TraceEntity) -> Option<(ThreadKey, &EntryNode)> {
        let (thread, node_id) = *self.entry_to_node.get(&entity.key())?;
        let renderer_thread = self.threads.get(&thread)?;
        let node = renderer_thread.tree.node(node_id)?;
        // Keys are only unique per trace; make sure it is this very entity
        (renderer_thread.entity(node)? == entity).then_some((thread, node))
    }

    /// The tree entity stored under `key`
    pub fn entity_for_key(&self, key: &EventKey) -> Option<&TraceEntity> {
        let (thread, node_id) = self.entry_to_node.get(key)?;
        let renderer_thread = self.threads.get(thread)?;
        renderer_thread.entity(renderer_thread.tree.node(*node_id)?)
    }

    pub fn parent_of(&self, entity: &TraceEntity) -> Option<TraceEntity> {
        let (thread, node) = self.node_for(entity)?;
        let renderer_thread = &self.threads[&thread];
        let parent = renderer_thread.tree.node(node.parent?)?;
        renderer_thread.entity(parent).cloned()
    }

    pub fn children_of(&self, entity: &TraceEntity) -> Vec<TraceEntity> {
        let Some((thread, node)) = self.node_for(entity) else {
            return Vec::new();
        };
        let renderer_thread = &self.threads[&thread];
        renderer_thread
            .tree
            .children(node.id)
            .filter_map(|child| renderer_thread.entity(child).cloned())
            .collect()
    }

    pub fn entry_count(&self) -> usize {
        self.entry_to_node.len()
    }
}

pub struct RendererHandler {
    lifecycle: Lifecycle,
    complete_events: BTreeMap<ThreadKey, Vec<Arc<RawEvent>>>,
    output: Arc<RendererData>,
}

impl RendererHandler {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(HandlerName::Renderer),
            complete_events: BTreeMap::new(),
            output: Arc::default(),
        }
    }
}

impl Default for RendererHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for RendererHandler {
    fn name(&self) -> HandlerName {
        HandlerName::Renderer
    }

    fn deps(&self) -> &'static [HandlerName] {
        &[HandlerName::Meta, HandlerName::Samples]
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn initialize(&mut self) {
        self.lifecycle.initialize();
    }

    fn handle_event(&mut self, event: &Arc<RawEvent>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;
        if event.ph == Phase::Complete {
            self.complete_events
                .entry(event.thread_key())
                .or_default()
                .push(event.clone());
        }
        Ok(())
    }

    async fn finalize(&mut self, ctx: &FinalizeContext<'_>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;
        let meta = ctx.meta()?;
        let samples = ctx.samples()?;

        let mut per_thread: BTreeMap<ThreadKey, Vec<TraceEntity>> = BTreeMap::new();
        for (thread, events) in std::mem::take(&mut self.complete_events) {
            per_thread
                .entry(thread)
                .or_default()
                .extend(events.into_iter().map(TraceEntity::Raw));
        }
        for (thread, profile) in &samples.threads {
            per_thread
                .entry(*thread)
                .or_default()
                .extend(profile.calls.iter().cloned().map(TraceEntity::ProfileCall));
        }

        let mut threads = BTreeMap::new();
        let mut entry_to_node = HashMap::new();

        for (thread, mut entries) in per_thread {
            // Same start: the longer entry is the parent. Stable otherwise, so
            // trace events stay ahead of equal profile calls.
            entries.sort_by(|a, b| a.ts().cmp(&b.ts()).then_with(|| b.dur().cmp(&a.dur())));
            let tree = build_entry_tree(&entries);

            for node in tree.nodes() {
                entry_to_node.insert(entries[node.entry_index].key(), (thread, node.id));
            }
            debug!(
                "Thread {}: {} entries, depth {}",
                thread,
                entries.len(),
                tree.max_depth()
            );

            threads.insert(
                thread,
                RendererThread {
                    name: meta.thread_name(thread).map(str::to_string),
                    entries,
                    tree,
                },
            );
        }

        self.output = Arc::new(RendererData {
            threads,
            entry_to_node,
        });
        self.lifecycle.finish();
        Ok(())
    }

    fn data(&self) -> Result<HandlerOutput, HandlerError> {
        self.lifecycle.ensure_finalized()?;
        Ok(HandlerOutput::Renderer(self.output.clone()))
    }
}
